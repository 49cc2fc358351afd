//! HTTP client for a Dozzle log viewer.
//!
//! Dozzle has no endpoint that lists containers. Its UI learns the container
//! set from the `containers-changed` event on the server-sent event stream,
//! so [`DozzleClient::fetch_containers`] reads that stream until the first
//! such event and hangs up. Logs come back as JSON lines.
//!
//! | Endpoint                                    | Method                              |
//! |---------------------------------------------|-------------------------------------|
//! | `/api/events/stream`                        | [`DozzleClient::fetch_containers`]  |
//! | `/api/hosts/{host}/containers/{id}/logs`    | [`DozzleClient::fetch_logs`]        |

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::DozzleConfig;
use crate::error::{ErrorDescriptor, ErrorKind};

/// Bytes read from the event stream before giving up on `containers-changed`.
pub const MAX_STREAM_BYTES: usize = 500_000;

const CONTAINERS_EVENT: &str = "containers-changed";

/// Errors returned by [`DozzleClient`] methods.
#[derive(Debug, thiserror::Error)]
pub enum DozzleError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("event stream sent {} bytes without a {} event", MAX_STREAM_BYTES, CONTAINERS_EVENT)]
    TooLarge,
    #[error("event stream closed without a {} event", CONTAINERS_EVENT)]
    NoContainers,
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
}

impl DozzleError {
    pub fn to_descriptor(&self) -> ErrorDescriptor {
        match self {
            DozzleError::Request(e) if e.is_timeout() => {
                ErrorDescriptor::new(ErrorKind::BackendUnreachable, "Request timed out")
            }
            DozzleError::Request(_) | DozzleError::Status(_) | DozzleError::Timeout => {
                ErrorDescriptor::new(ErrorKind::BackendUnreachable, self.to_string())
            }
            DozzleError::TooLarge | DozzleError::NoContainers | DozzleError::Decode { .. } => {
                ErrorDescriptor::new(ErrorKind::MalformedResponse, self.to_string())
            }
        }
    }
}

/// One container from a `containers-changed` event (only the fields we keep;
/// `stats` and `labels` are large and dropped).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDozzleContainer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub image: Option<String>,
    pub state: Option<String>,
    pub health: Option<String>,
    pub host: Option<String>,
    pub created: Option<Value>,
    #[serde(rename = "startedAt")]
    pub started_at: Option<Value>,
}

/// One JSON line of a log response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLogLine {
    /// Message: a string, or an object for structured logs.
    #[serde(default)]
    pub m: Value,
    /// Unix milliseconds.
    pub ts: Option<i64>,
    /// `stdout` or `stderr`.
    pub s: Option<String>,
    /// Detected level.
    pub l: Option<String>,
}

/// Filters for a log query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogQuery {
    /// RFC 3339 `(from, to)`. `None` asks for everything Dozzle has.
    pub range: Option<(String, String)>,
    /// Regex applied by Dozzle to each message.
    pub filter: Option<String>,
    pub levels: Vec<String>,
}

impl LogQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("stdout", "true".to_string()), ("stderr", "true".to_string())];
        match &self.range {
            Some((from, to)) => {
                params.push(("from", from.clone()));
                params.push(("to", to.clone()));
            }
            None => params.push(("everything", "true".to_string())),
        }
        if let Some(filter) = &self.filter {
            params.push(("filter", filter.clone()));
        }
        params.extend(self.levels.iter().map(|l| ("levels", l.clone())));
        params
    }
}

/// HTTP client for one Dozzle instance.
#[derive(Clone)]
pub struct DozzleClient {
    http: reqwest::Client,
    base_url: String,
    description: String,
    timeout: Duration,
}

impl DozzleClient {
    /// `timeout` bounds each call, including the wait for the event.
    pub fn new(config: &DozzleConfig, timeout: Duration) -> Result<Self, DozzleError> {
        // No total timeout on the client: the event stream never ends by itself.
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("home-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            description: config.description.clone(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Every container Dozzle currently sees, across all of its hosts.
    pub async fn fetch_containers(&self) -> Result<Vec<RawDozzleContainer>, DozzleError> {
        let url = format!("{}/api/events/stream", self.base_url);
        debug!(%url, "dozzle event stream request");
        tokio::time::timeout(self.timeout, self.read_containers_event(&url))
            .await
            .map_err(|_| DozzleError::Timeout)?
    }

    async fn read_containers_event(&self, url: &str) -> Result<Vec<RawDozzleContainer>, DozzleError> {
        let mut resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DozzleError::Status(status.as_u16()));
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut received = 0usize;
        while let Some(chunk) = resp.chunk().await? {
            received += chunk.len();
            buffer.extend_from_slice(&chunk);

            let mut start = 0;
            while let Some(len) = event_end(&buffer[start..]) {
                let event = parse_event(&String::from_utf8_lossy(&buffer[start..start + len]));
                start += len;
                if event.name.as_deref() == Some(CONTAINERS_EVENT) {
                    return serde_json::from_str(&event.data).map_err(|e| DozzleError::Decode {
                        endpoint: "events/stream",
                        message: e.to_string(),
                    });
                }
            }
            buffer.drain(..start);
            if received > MAX_STREAM_BYTES {
                return Err(DozzleError::TooLarge);
            }
        }
        Err(DozzleError::NoContainers)
    }

    /// Log lines of one container, oldest first.
    pub async fn fetch_logs(
        &self,
        host: &str,
        container_id: &str,
        query: &LogQuery,
    ) -> Result<Vec<RawLogLine>, DozzleError> {
        let url = format!(
            "{}/api/hosts/{}/containers/{}/logs",
            self.base_url, host, container_id
        );
        debug!(%url, ?query, "dozzle logs request");

        let resp = self
            .http
            .get(&url)
            .query(&query.params())
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DozzleError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        Ok(parse_log_lines(&String::from_utf8_lossy(&body)))
    }
}

/// One server-sent event: its name and its `data:` lines joined by `\n`.
#[derive(Debug, Default, PartialEq)]
pub struct SseEvent {
    pub name: Option<String>,
    pub data: String,
}

/// Parse one event block (the text between blank lines).
pub fn parse_event(block: &str) -> SseEvent {
    let mut name = None;
    let mut data = Vec::new();
    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    SseEvent {
        name,
        data: data.join("\n"),
    }
}

/// Offset just past the first blank line in `buf`, if a whole event is buffered.
fn event_end(buf: &[u8]) -> Option<usize> {
    (0..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\n\n") {
            Some(i + 2)
        } else if rest.starts_with(b"\r\n\r\n") {
            Some(i + 4)
        } else {
            None
        }
    })
}

/// JSON-lines body into entries. Lines that are not JSON objects are skipped.
pub fn parse_log_lines(body: &str) -> Vec<RawLogLine> {
    let mut skipped = 0usize;
    let lines: Vec<RawLogLine> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(entry) => Some(entry),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        debug!(skipped, "skipped unparseable log lines");
    }
    lines
}
