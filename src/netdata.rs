//! HTTP client for the Netdata agent REST API.
//!
//! [`NetdataClient`] wraps a connection-pooled `reqwest::Client` for one
//! server and exposes typed fetches for the three endpoints the gateway
//! uses:
//!
//! | Endpoint          | Method                        |
//! |-------------------|-------------------------------|
//! | `/api/v1/info`    | [`NetdataClient::fetch_info`]   |
//! | `/api/v1/charts`  | [`NetdataClient::fetch_charts`] |
//! | `/api/v1/data`    | [`NetdataClient::fetch_chart`]  |
//!
//! Every request carries the configured timeout. There are no retries here;
//! a failed request is reported once and the caller decides what to do.

use std::time::Duration;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{ErrorDescriptor, ErrorKind};

/// Errors returned by [`NetdataClient`] methods.
#[derive(Debug, thiserror::Error)]
pub enum NetdataError {
    /// Connection refused, DNS failure, timeout, body read failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The agent returned a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// The body was not the JSON shape we expected.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl NetdataError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetdataError::Request(e) if e.is_timeout())
    }

    /// Convert into the caller-facing error, attributed to `server`.
    pub fn to_descriptor(&self, server: &str) -> ErrorDescriptor {
        let kind = match self {
            NetdataError::Request(_) | NetdataError::Status { .. } => ErrorKind::BackendUnreachable,
            NetdataError::Decode { .. } => ErrorKind::MalformedResponse,
        };
        let message = if self.is_timeout() {
            "Request timed out".to_string()
        } else {
            self.to_string()
        };
        ErrorDescriptor::new(kind, message).for_server(server)
    }
}

/// `/api/v1/info` response (only the fields we surface).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInfo {
    pub version: Option<String>,
    pub hostname: Option<String>,
    #[serde(default)]
    pub mirrored_hosts: Vec<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_name: Option<String>,
    pub kernel_version: Option<String>,
    pub architecture: Option<String>,
    /// Reported as a string by most agent versions, a number by some.
    pub cores_total: Option<Value>,
}

/// `/api/v1/charts` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCharts {
    pub hostname: Option<String>,
    #[serde(default)]
    pub charts: IndexMap<String, RawChartMeta>,
}

/// One entry of the `charts` map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChartMeta {
    #[serde(default)]
    pub family: String,
}

/// `/api/v1/data?format=json` response: rows are newest first, column 0 is time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChartData {
    pub labels: Vec<String>,
    pub data: Vec<Vec<Option<f64>>>,
}

/// Time window for a data query. Negative `after` means "N seconds before now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub after: i64,
    pub before: i64,
    pub points: Option<u32>,
}

impl Window {
    /// Last `seconds`, collapsed into `points` averaged rows.
    pub fn last(seconds: u64, points: Option<u32>) -> Self {
        Self {
            after: -(seconds as i64),
            before: 0,
            points,
        }
    }
}

/// HTTP client for a single Netdata agent.
#[derive(Clone)]
pub struct NetdataClient {
    http: reqwest::Client,
    server: String,
    base_url: String,
}

impl NetdataClient {
    /// Create a client for `server` with a per-request `timeout`.
    pub fn new(server: &ServerConfig, timeout: Duration) -> Result<Self, NetdataError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("home-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            server: server.name.clone(),
            base_url: server.netdata_url.trim_end_matches('/').to_string(),
        })
    }

    /// Name of the configured server this client talks to.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// The agent's base URL (without trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/v1/info`: liveness and agent identity.
    pub async fn fetch_info(&self) -> Result<RawInfo, NetdataError> {
        self.get_json("info", &[]).await
    }

    /// `GET /api/v1/charts`: every chart the agent collects.
    pub async fn fetch_charts(&self) -> Result<RawCharts, NetdataError> {
        self.get_json("charts", &[]).await
    }

    /// `GET /api/v1/data` for one chart over `window`, averaged per point.
    pub async fn fetch_chart(
        &self,
        chart_id: &str,
        window: Window,
    ) -> Result<RawChartData, NetdataError> {
        let mut query = vec![
            ("chart", chart_id.to_string()),
            ("after", window.after.to_string()),
            ("before", window.before.to_string()),
            ("group", "average".to_string()),
            ("format", "json".to_string()),
        ];
        if let Some(points) = window.points {
            query.push(("points", points.to_string()));
        }
        self.get_json("data", &query).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, NetdataError> {
        let url = format!("{}/api/v1/{}", self.base_url, endpoint);
        debug!(server = %self.server, %url, ?query, "netdata request");

        let resp = self.http.get(&url).query(query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            // Netdata sends plain-text bodies on errors, e.g. "Chart is not found: x".
            let message = body.trim();
            let message = if message.is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                message.chars().take(200).collect()
            };
            return Err(NetdataError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| NetdataError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}
