//! Fleet-wide fan-out.
//!
//! [`query_all`] runs one operation against every configured Netdata server
//! at once and reassembles the answers in configured order. Each server's
//! slot has its own timeout; a slow or dead server turns into an error entry
//! for that server only. Partial success is success: the call as a whole
//! fails only when there is nothing to query.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ErrorDescriptor, ErrorKind};
use crate::netdata::NetdataClient;

/// One server's slot in a fleet result: the value, or why there is none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerOutcome<T> {
    Ok(T),
    Err(ErrorDescriptor),
}

impl<T> ServerOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ServerOutcome::Ok(_))
    }
}

impl<T> From<Result<T, ErrorDescriptor>> for ServerOutcome<T> {
    fn from(result: Result<T, ErrorDescriptor>) -> Self {
        match result {
            Ok(v) => ServerOutcome::Ok(v),
            Err(e) => ServerOutcome::Err(e),
        }
    }
}

/// Server name → outcome, in configured order. Always one entry per server.
pub type FleetQueryResult<T> = IndexMap<String, ServerOutcome<T>>;

/// Fan-out limits.
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    /// Ceiling for one server's whole operation.
    pub server_timeout: Duration,
    /// Servers in flight at once; `None` queries all of them together.
    pub max_concurrency: Option<usize>,
}

/// Run `op` against every client concurrently.
///
/// Results come back in the order `clients` yields them, regardless of
/// completion order.
pub async fn query_all<'a, I, T, F, Fut>(
    clients: I,
    fan_out: FanOut,
    op: F,
) -> Result<FleetQueryResult<T>, ErrorDescriptor>
where
    I: IntoIterator<Item = &'a NetdataClient>,
    F: Fn(&'a NetdataClient) -> Fut,
    Fut: Future<Output = Result<T, ErrorDescriptor>>,
{
    let clients: Vec<&NetdataClient> = clients.into_iter().collect();
    if clients.is_empty() {
        return Err(ErrorDescriptor::config("No servers configured"));
    }

    let limit = fan_out.max_concurrency.unwrap_or(clients.len()).max(1);
    let timeout = fan_out.server_timeout;
    debug!(servers = clients.len(), limit, ?timeout, "fleet query");

    let results: Vec<(String, ServerOutcome<T>)> = stream::iter(clients)
        .map(|client| {
            let work = op(client);
            async move {
                let name = client.server().to_string();
                let outcome = match tokio::time::timeout(timeout, work).await {
                    Ok(result) => result,
                    Err(_) => Err(ErrorDescriptor::new(
                        ErrorKind::BackendUnreachable,
                        format!("No response within {}s", timeout.as_secs_f32()),
                    )
                    .for_server(&name)),
                };
                if let Err(e) = &outcome {
                    warn!(server = %name, error = %e, "server failed in fleet query");
                }
                (name, ServerOutcome::from(outcome))
            }
        })
        .buffered(limit)
        .collect()
        .await;

    Ok(results.into_iter().collect())
}
