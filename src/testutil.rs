//! In-process fakes for tests: a Netdata agent and a Dozzle instance served
//! by axum, and a RouterOS API speaker (plain or TLS) on a raw TCP listener.
//! All bind `127.0.0.1:0`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{stream, SinkExt, StreamExt};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;

use crate::config::{DozzleConfig, RouterConfig, ServerConfig};
use crate::routeros::codec::{Sentence, SentenceCodec};

/// Timestamp of the newest row in every fake chart.
pub const NEWEST: i64 = 1_700_000_000;

// ── Netdata ───────────────────────────────────────────────────────

/// Behaviour knobs for a fake Netdata agent.
#[derive(Debug, Clone)]
pub struct FakeAgent {
    pub hostname: String,
    /// Added to every response.
    pub delay: Duration,
    /// `/api/v1/info` answers 200 with a non-JSON body.
    pub garbage_info: bool,
    /// `/api/v1/data` answers 500 for every chart.
    pub broken_data: bool,
}

impl Default for FakeAgent {
    fn default() -> Self {
        Self {
            hostname: "burger".into(),
            delay: Duration::ZERO,
            garbage_info: false,
            broken_data: false,
        }
    }
}

/// `(chart id, family, labels, newest row)`.
type FixtureChart = (&'static str, &'static str, &'static [&'static str], &'static [f64]);

/// Charts served by every fake agent.
const FIXTURE_CHARTS: &[FixtureChart] = &[
        ("system.cpu", "cpu", &["user", "system", "nice"], &[30.25, 11.25, 0.5]),
        ("system.ram", "ram", &["free", "used", "cached", "buffers"], &[4096.0, 8192.0, 3072.0, 1024.0]),
        ("disk_space._", "/", &["avail", "used", "reserved_for_root"], &[60.0, 35.0, 5.0]),
        ("disk_space._mnt_data", "/mnt/data", &["avail", "used", "reserved_for_root"], &[200.0, 800.0, 0.0]),
        ("net.eth0", "eth0", &["received", "sent"], &[800.0, -400.0]),
        ("net_packets.eth0", "eth0", &["received", "sent"], &[100.0, -50.0]),
        ("net_errors.eth0", "eth0", &["inbound", "outbound"], &[0.01, 0.0]),
        ("net.bond0", "bond0", &["received", "sent"], &[1000.0, -2000.0]),
        ("cgroup_nginx.cpu", "cpu", &["user", "system"], &[1.5, 0.75]),
        ("cgroup_nginx.mem_usage", "mem", &["ram", "swap"], &[128.0, 0.0]),
        ("cgroup_nginx.mem_usage_limit", "mem", &["available", "used"], &[384.0, 128.0]),
        ("cgroup_redis.cpu", "cpu", &["user", "system"], &[0.5, 0.25]),
        ("cgroup_redis.mem_usage", "mem", &["ram", "swap"], &[64.0, 0.0]),
];

/// Start a fake agent and return its base URL.
pub async fn spawn_agent(agent: FakeAgent) -> String {
    let app = Router::new()
        .route("/api/v1/info", get(agent_info))
        .route("/api/v1/charts", get(agent_charts))
        .route("/api/v1/data", get(agent_data))
        .with_state(Arc::new(agent));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn agent_info(State(agent): State<Arc<FakeAgent>>) -> Response {
    tokio::time::sleep(agent.delay).await;
    if agent.garbage_info {
        return "<html>netdata is starting</html>".into_response();
    }
    Json(json!({
        "version": "v1.44.0",
        "mirrored_hosts": [agent.hostname],
        "os_name": "Debian GNU/Linux",
        "os_version": "12 (bookworm)",
        "kernel_name": "Linux",
        "kernel_version": "6.1.0-18-amd64",
        "architecture": "x86_64",
        "cores_total": "8",
    }))
    .into_response()
}

async fn agent_charts(State(agent): State<Arc<FakeAgent>>) -> Response {
    tokio::time::sleep(agent.delay).await;
    let charts: serde_json::Map<String, Value> = FIXTURE_CHARTS
        .iter()
        .map(|&(id, family, _, _)| (id.to_string(), json!({ "id": id, "family": family })))
        .collect();
    Json(json!({ "hostname": agent.hostname, "charts": charts })).into_response()
}

async fn agent_data(
    State(agent): State<Arc<FakeAgent>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    tokio::time::sleep(agent.delay).await;
    if agent.broken_data {
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
    }
    let chart = params.get("chart").cloned().unwrap_or_default();
    let Some(&(_, _, labels, values)) = FIXTURE_CHARTS.iter().find(|(id, ..)| *id == chart) else {
        return (StatusCode::NOT_FOUND, format!("Chart is not found: {chart}")).into_response();
    };

    let points: usize = params
        .get("points")
        .and_then(|p| p.parse().ok())
        .unwrap_or(2);
    // Newest first; older rows are half the newest values.
    let rows: Vec<Value> = (0..points)
        .map(|i| {
            let scale = if i == 0 { 1.0 } else { 0.5 };
            let mut row = vec![json!(NEWEST - i as i64)];
            row.extend(values.iter().map(|v| json!(v * scale)));
            Value::Array(row)
        })
        .collect();

    let mut all_labels = vec!["time"];
    all_labels.extend_from_slice(labels);
    Json(json!({ "labels": all_labels, "data": rows })).into_response()
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn closed_port_url() -> String {
    format!("http://127.0.0.1:{}", closed_port().await)
}

pub fn server_config(name: &str, url: &str) -> ServerConfig {
    ServerConfig {
        name: name.into(),
        netdata_url: url.into(),
        role: "docker host".into(),
        description: format!("{name} box"),
        hardware_notes: None,
    }
}

// ── RouterOS ──────────────────────────────────────────────────────

/// Behaviour knobs for a fake router.
#[derive(Debug, Clone)]
pub struct FakeRouter {
    pub username: String,
    pub password: String,
    /// Answer `/login` with a legacy `=ret=` challenge.
    pub legacy_login: bool,
    /// Never answer this command.
    pub stall_on: Option<String>,
    /// Serve `api-ssl` with a freshly generated self-signed certificate.
    pub tls: bool,
}

impl Default for FakeRouter {
    fn default() -> Self {
        Self {
            username: "monitor".into(),
            password: "secret".into(),
            legacy_login: false,
            stall_on: None,
            tls: false,
        }
    }
}

/// Handle to a running fake router.
pub struct RouterHandle {
    addr: SocketAddr,
    username: String,
    password: String,
    tls: bool,
    connections: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl RouterHandle {
    /// Router config pointing at this fake, with matching credentials.
    pub fn config(&self) -> RouterConfig {
        RouterConfig {
            enabled: true,
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            username: self.username.clone(),
            password: self.password.clone(),
            model: "RB5009".into(),
            description: "Core router".into(),
            tls: self.tls,
            tls_verify: false,
        }
    }

    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Command words received so far, across all connections.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

pub async fn spawn_router(router: FakeRouter) -> RouterHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = RouterHandle {
        addr: listener.local_addr().unwrap(),
        username: router.username.clone(),
        password: router.password.clone(),
        tls: router.tls,
        connections: Arc::new(AtomicUsize::new(0)),
        commands: Arc::new(Mutex::new(Vec::new())),
    };

    let acceptor = router.tls.then(self_signed_acceptor);
    let connections = Arc::clone(&handle.connections);
    let commands = Arc::clone(&handle.commands);
    let router = Arc::new(router);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            connections.fetch_add(1, Ordering::SeqCst);
            let router = Arc::clone(&router);
            let commands = Arc::clone(&commands);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                match acceptor {
                    Some(acceptor) => {
                        // A client that rejects the certificate just hangs up.
                        if let Ok(tls) = acceptor.accept(stream).await {
                            serve_router(tls, router, commands).await;
                        }
                    }
                    None => serve_router(stream, router, commands).await,
                }
            });
        }
    });
    handle
}

/// TLS acceptor with a self-signed certificate for `localhost`.
fn self_signed_acceptor() -> TlsAcceptor {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert.der().clone()], key)
    .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

async fn serve_router<S>(stream: S, router: Arc<FakeRouter>, commands: Arc<Mutex<Vec<String>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Framed::new(stream, SentenceCodec);
    let mut logged_in = false;

    while let Some(Ok(sentence)) = conn.next().await {
        let sentence: Vec<String> = sentence
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect();
        let Some((command, args)) = sentence.split_first() else {
            continue;
        };
        commands.lock().unwrap().push(command.clone());
        if router.stall_on.as_deref() == Some(command.as_str()) {
            continue;
        }

        let replies = if command == "/login" {
            let attrs = args_of(args);
            if router.legacy_login {
                vec![words(&["!done", "=ret=ebddd18303a54111e2dea05a92ab46b4"])]
            } else if attrs.get("name") == Some(&router.username)
                && attrs.get("password") == Some(&router.password)
            {
                logged_in = true;
                vec![words(&["!done"])]
            } else {
                vec![
                    words(&["!trap", "=message=invalid user name or password (6)"]),
                    words(&["!done"]),
                ]
            }
        } else if !logged_in {
            vec![words(&["!fatal", "not logged in"])]
        } else {
            router_reply(command, args)
        };

        for reply in replies {
            if conn.send(reply).await.is_err() {
                return;
            }
        }
    }
}

fn router_reply(command: &str, args: &[String]) -> Vec<Sentence> {
    let interfaces = [
        vec![("name", "ether1"), ("type", "ether"), ("mtu", "1500"), ("actual-mtu", "1500"),
             ("mac-address", "48:A9:8A:00:00:01"), ("running", "true"), ("disabled", "false"),
             ("rx-byte", "123456789"), ("tx-byte", "987654321"), ("rx-packet", "1000"),
             ("tx-packet", "2000"), ("rx-error", "0"), ("tx-error", "0"), ("comment", "WAN")],
        vec![("name", "ether2"), ("type", "ether"), ("mtu", "1500"), ("running", "true"),
             ("disabled", "false"), ("rx-byte", "500"), ("tx-byte", "700")],
        vec![("name", "ether3"), ("type", "ether"), ("mtu", "auto"), ("running", "false"),
             ("disabled", "true")],
        vec![("name", "bond1"), ("type", "bond"), ("mtu", "1500"), ("running", "true"),
             ("disabled", "false"), ("rx-byte", "500"), ("tx-byte", "700"),
             ("rx-packet", "5"), ("tx-packet", "7")],
    ];

    if command == "/interface/monitor-traffic" {
        let attrs = args_of(args);
        let name = attrs.get("interface").cloned().unwrap_or_default();
        if !interfaces.iter().any(|i| i[0].1 == name) {
            return vec![words(&["!trap", "=message=no such interface"]), words(&["!done"])];
        }
        let name_word = format!("=name={name}");
        return vec![
            words(&["!re", name_word.as_str(), "=rx-bits-per-second=8000", "=tx-bits-per-second=16000"]),
            words(&["!done"]),
        ];
    }

    let records: Vec<Vec<(&str, &str)>> = match command {
        "/system/resource/print" => vec![vec![
            ("uptime", "3w2d04:11:09"), ("version", "7.14.2 (stable)"), ("cpu-load", "7"),
            ("cpu-count", "4"), ("cpu-frequency", "1400"), ("cpu", "ARM64"),
            ("architecture-name", "arm64"), ("board-name", "RB5009UG+S+"),
            ("free-memory", "845324288"), ("total-memory", "1073741824"),
            ("free-hdd-space", "900000000"), ("total-hdd-space", "1073741824"),
        ]],
        "/interface/print" => {
            let filter = args.iter().find_map(|a| a.strip_prefix("?name="));
            interfaces
                .iter()
                .filter(|i| filter.map_or(true, |f| i[0].1 == f))
                .cloned()
                .collect()
        }
        "/interface/bonding/print" => vec![vec![("name", "bond1"), ("slaves", "ether2,ether3"), ("mode", "802.3ad")]],
        "/ip/dhcp-server/lease/print" => vec![
            vec![("address", "10.0.0.50"), ("mac-address", "AA:BB:CC:DD:EE:FF"),
                 ("active-address", "10.0.0.50"), ("active-mac-address", "AA:BB:CC:DD:EE:FF"),
                 ("host-name", "printer"), ("server", "defconf"), ("status", "bound"),
                 ("dynamic", "true"), ("expires-after", "9m12s")],
            vec![("address", "10.0.0.60"), ("mac-address", "11:22:33:44:55:66"),
                 ("server", "defconf"), ("status", "waiting"), ("dynamic", "false"),
                 ("comment", "nas")],
        ],
        _ => return vec![words(&["!trap", "=message=no such command prefix"]), words(&["!done"])],
    };

    let mut replies: Vec<Sentence> = records
        .into_iter()
        .map(|rec| {
            let mut s = vec![Bytes::from_static(b"!re")];
            s.extend(rec.into_iter().map(|(k, v)| Bytes::from(format!("={k}={v}"))));
            s
        })
        .collect();
    if command == "/ip/dhcp-server/lease/print" {
        // Host names arrive in the router's codepage, not UTF-8.
        replies[1].push(Bytes::from_static(b"=host-name=caf\xe9"));
    }
    replies.push(words(&["!done"]));
    replies
}

fn args_of(args: &[String]) -> HashMap<String, String> {
    args.iter()
        .filter_map(|a| a.strip_prefix('=')?.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn words(w: &[&str]) -> Sentence {
    w.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
}

// ── Dozzle ────────────────────────────────────────────────────────

/// Behaviour knobs for a fake Dozzle.
#[derive(Debug, Clone, Default)]
pub struct FakeDozzle {
    /// Never send `containers-changed`; keep the stream open.
    pub silent: bool,
    /// Never send `containers-changed`; close the stream.
    pub closes_early: bool,
    /// Bytes of `container-stat` events sent before anything else.
    pub noise_bytes: usize,
}

/// Handle to a running fake Dozzle.
pub struct DozzleHandle {
    pub url: String,
    log_requests: Arc<Mutex<Vec<String>>>,
}

impl DozzleHandle {
    pub fn config(&self) -> DozzleConfig {
        dozzle_config(&self.url)
    }

    /// `{host}/{id}?{raw query}` of every log request so far.
    pub fn log_requests(&self) -> Vec<String> {
        self.log_requests.lock().unwrap().clone()
    }
}

pub fn dozzle_config(url: &str) -> DozzleConfig {
    DozzleConfig {
        enabled: true,
        url: url.into(),
        description: "all docker hosts".into(),
    }
}

struct DozzleState {
    fake: FakeDozzle,
    log_requests: Arc<Mutex<Vec<String>>>,
}

const DOZZLE_CONTAINERS: &str = r#"[
{"id":"abc123","name":"nginx","image":"nginx:1.25","state":"running","health":"healthy","host":"burger-host","created":"2024-01-01T00:00:00Z","startedAt":"2024-01-02T00:00:00Z","stats":[{"cpu":1.5,"memory":2.0}],"labels":{"com.docker.compose.project":"web"}},
{"id":"def456","name":"redis","image":"redis:7","state":"running","host":"burger-host","created":"2024-01-01T00:00:00Z","startedAt":"2024-01-02T00:00:00Z"},
{"id":"0fa789","name":"jellyfin","image":"jellyfin/jellyfin","state":"exited","host":"cheese-host","created":"2024-03-01T00:00:00Z"}
]"#;

/// JSON lines served for `abc123`; one line is not JSON.
const NGINX_LOGS: &str = concat!(
    r#"{"m":"starting nginx","ts":1730000000000,"s":"stdout","l":"info"}"#, "\n",
    r#"{"m":"connect() failed (111: Connection refused)","ts":1730000001000,"s":"stderr","l":"error"}"#, "\n",
    r#"{"m":{"event":"reload","ok":true},"ts":1730000002000,"s":"stdout","l":"info"}"#, "\n",
    "nginx: [warn] truncated\n",
    r#"{"m":"upstream timed out","ts":1730000003000,"s":"stderr","l":"warn"}"#, "\n",
);

pub async fn spawn_dozzle(fake: FakeDozzle) -> DozzleHandle {
    let log_requests = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(DozzleState {
        fake,
        log_requests: Arc::clone(&log_requests),
    });
    let app = Router::new()
        .route("/api/events/stream", get(dozzle_events))
        .route("/api/hosts/{host}/containers/{id}/logs", get(dozzle_logs))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    DozzleHandle {
        url: format!("http://{addr}"),
        log_requests,
    }
}

async fn dozzle_events(State(state): State<Arc<DozzleState>>) -> Response {
    let fake = &state.fake;
    let mut chunks = vec![": connected\n\n".to_string()];
    if fake.noise_bytes > 0 {
        let event = "event: container-stat\ndata: {\"id\":\"abc123\",\"cpu\":1.5,\"memory\":2.0}\n\n";
        chunks.push(event.repeat(fake.noise_bytes / event.len() + 1));
    }
    if !fake.silent && !fake.closes_early {
        let data = DOZZLE_CONTAINERS.replace('\n', "");
        chunks.push(format!("event: containers-changed\ndata: {data}\n\n"));
    }

    let head = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
    let body = if fake.closes_early {
        Body::from_stream(head)
    } else {
        // Dozzle keeps the stream open after the event.
        Body::from_stream(head.chain(stream::pending()))
    };
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn dozzle_logs(
    State(state): State<Arc<DozzleState>>,
    Path((host, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    state
        .log_requests
        .lock()
        .unwrap()
        .push(format!("{host}/{id}?{}", query.unwrap_or_default()));
    match (host.as_str(), id.as_str()) {
        ("burger-host", "abc123") => NGINX_LOGS.into_response(),
        ("burger-host", "def456") | ("cheese-host", "0fa789") => "".into_response(),
        _ => (StatusCode::NOT_FOUND, "container not found").into_response(),
    }
}
