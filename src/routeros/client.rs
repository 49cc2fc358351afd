//! RouterOS API session.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──tcp/tls up──▶ Authenticating
//!       ▲                                                    │ !done
//!       │ any error                                          ▼
//!       └──────────────────── Executing ◀──command──▶ Ready
//! ```
//!
//! A single session is shared by every tool call and guarded by an async
//! mutex, so commands are serialized: a second caller waits for the first.
//! Any error (including a timeout or a `!trap`) drops the socket and leaves
//! the session `Disconnected`; the next command reconnects and logs in again.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::codec::SentenceCodec;
use super::{parse_reply, tls, Record, Reply, RouterError};
use crate::config::RouterConfig;

/// Where the shared session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Executing,
}

trait RouterIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> RouterIo for T {}

type Connection = Framed<Box<dyn RouterIo>, SentenceCodec>;

struct Link {
    state: SessionState,
    conn: Option<Connection>,
}

impl Link {
    fn reset(&mut self) {
        self.conn = None;
        self.state = SessionState::Disconnected;
    }
}

/// Client for one router, owning at most one live API session.
pub struct RouterClient {
    config: RouterConfig,
    timeout: Duration,
    link: Mutex<Link>,
}

impl RouterClient {
    /// Create a client. No connection is made until the first command.
    pub fn new(config: RouterConfig, timeout: Duration) -> Self {
        Self {
            config,
            timeout,
            link: Mutex::new(Link {
                state: SessionState::Disconnected,
                conn: None,
            }),
        }
    }

    /// Router model string from the config, echoed in tool responses.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Current session state (waits for any in-flight command to finish).
    pub async fn state(&self) -> SessionState {
        self.link.lock().await.state
    }

    /// Run `command` with extra `args` words and collect its `!re` records.
    pub async fn execute(&self, command: &str, args: &[String]) -> Result<Vec<Record>, RouterError> {
        let mut link = self.link.lock().await;
        let result = self.execute_locked(&mut link, command, args).await;
        if let Err(e) = &result {
            warn!(router = %self.address(), command, error = %e, "router command failed, dropping session");
            link.reset();
        }
        result
    }

    async fn execute_locked(
        &self,
        link: &mut Link,
        command: &str,
        args: &[String],
    ) -> Result<Vec<Record>, RouterError> {
        // A session left mid-command (caller cancelled) cannot be trusted.
        if link.state != SessionState::Ready || link.conn.is_none() {
            link.reset();
            self.connect(link).await?;
        }

        link.state = SessionState::Executing;
        let conn = link
            .conn
            .as_mut()
            .ok_or_else(|| self.unreachable("session lost"))?;

        let mut sentence = Vec::with_capacity(args.len() + 1);
        sentence.push(command.to_string());
        sentence.extend(args.iter().cloned());

        debug!(router = %self.address(), command, "router command");
        let records = tokio::time::timeout(self.timeout, self.run(conn, command, sentence))
            .await
            .map_err(|_| self.unreachable("command timed out"))??;

        link.state = SessionState::Ready;
        Ok(records)
    }

    async fn connect(&self, link: &mut Link) -> Result<(), RouterError> {
        link.state = SessionState::Connecting;
        let addr = self.address();

        let tcp = tokio::time::timeout(
            self.timeout,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| self.unreachable("connect timed out"))?
        .map_err(|e| self.unreachable(&e.to_string()))?;

        let io: Box<dyn RouterIo> = if self.config.use_tls() {
            let stream = tokio::time::timeout(
                self.timeout,
                tls::connect(tcp, &self.config.host, self.config.tls_verify),
            )
            .await
            .map_err(|_| self.unreachable("TLS handshake timed out"))?
            .map_err(|e| self.unreachable(&e))?;
            Box::new(stream)
        } else {
            Box::new(tcp)
        };

        link.state = SessionState::Authenticating;
        let mut conn = Framed::new(io, SentenceCodec);
        tokio::time::timeout(self.timeout, self.login(&mut conn))
            .await
            .map_err(|_| self.unreachable("login timed out"))??;

        info!(router = %addr, tls = self.config.use_tls(), "router session established");
        link.conn = Some(conn);
        link.state = SessionState::Ready;
        Ok(())
    }

    /// Post-6.43 plaintext login.
    async fn login(&self, conn: &mut Connection) -> Result<(), RouterError> {
        let sentence = vec![
            "/login".to_string(),
            format!("=name={}", self.config.username),
            format!("=password={}", self.config.password),
        ];
        self.send(conn, sentence).await?;

        loop {
            match self.receive(conn).await? {
                Reply::Done(attrs) if attrs.contains_key("ret") => {
                    return Err(RouterError::AuthFailed(
                        "router requested legacy challenge login (RouterOS < 6.43), which is not supported"
                            .into(),
                    ));
                }
                Reply::Done(_) => return Ok(()),
                Reply::Trap(attrs) => {
                    let message = attrs
                        .get("message")
                        .cloned()
                        .unwrap_or_else(|| "login rejected".into());
                    return Err(RouterError::AuthFailed(message));
                }
                Reply::Fatal(reason) => return Err(self.unreachable(&reason)),
                Reply::Re(_) | Reply::Empty => {}
            }
        }
    }

    async fn run(
        &self,
        conn: &mut Connection,
        command: &str,
        sentence: Vec<String>,
    ) -> Result<Vec<Record>, RouterError> {
        self.send(conn, sentence).await?;

        let mut records = Vec::new();
        loop {
            match self.receive(conn).await? {
                Reply::Re(record) => records.push(record),
                Reply::Done(_) => return Ok(records),
                Reply::Empty => {}
                Reply::Trap(attrs) => {
                    return Err(RouterError::Command {
                        command: command.to_string(),
                        message: attrs
                            .get("message")
                            .cloned()
                            .unwrap_or_else(|| "command failed".into()),
                    });
                }
                Reply::Fatal(reason) => return Err(self.unreachable(&reason)),
            }
        }
    }

    async fn send(&self, conn: &mut Connection, sentence: Vec<String>) -> Result<(), RouterError> {
        conn.send(sentence)
            .await
            .map_err(|e| self.unreachable(&e.to_string()))
    }

    async fn receive(&self, conn: &mut Connection) -> Result<Reply, RouterError> {
        match conn.next().await {
            Some(Ok(sentence)) => parse_reply(&sentence),
            Some(Err(e)) => Err(self.unreachable(&e.to_string())),
            None => Err(self.unreachable("connection closed by router")),
        }
    }

    fn unreachable(&self, reason: &str) -> RouterError {
        RouterError::Unreachable {
            addr: self.address(),
            reason: reason.to_string(),
        }
    }
}
