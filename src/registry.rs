//! Server registry.
//!
//! [`ServerRegistry`] is built once from the resolved config and owns one
//! pooled [`NetdataClient`] per configured server plus the optional
//! [`RouterClient`] and [`DozzleClient`]. Every tool handler resolves its
//! target through here, so an unknown server name or a disabled backend is
//! reported as `config_error` before anything is contacted.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::config::{Limits, ResolvedConfig, ServerConfig};
use crate::dozzle::{DozzleClient, DozzleError};
use crate::error::ErrorDescriptor;
use crate::fleet::FanOut;
use crate::netdata::{NetdataClient, NetdataError};
use crate::routeros::{RouterClient, SessionState};

/// A configured server and its HTTP client.
pub struct ServerHandle {
    pub config: ServerConfig,
    pub client: NetdataClient,
}

/// An HTTP client could not be built.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("server '{server}': {source}")]
    Netdata {
        server: String,
        #[source]
        source: NetdataError,
    },
    #[error("dozzle: {0}")]
    Dozzle(#[from] DozzleError),
}

/// Summary of the dozzle section, for `list_servers`.
#[derive(Debug, Clone, Serialize)]
pub struct DozzleSummary {
    pub url: String,
    pub description: String,
}

/// Summary of the router section, for `list_servers`.
#[derive(Debug, Clone, Serialize)]
pub struct RouterSummary {
    pub model: String,
    pub description: String,
    pub address: String,
    pub session: SessionState,
}

/// Registry of configured servers and the optional router.
pub struct ServerRegistry {
    servers: IndexMap<String, ServerHandle>,
    router: Option<RouterClient>,
    dozzle: Option<DozzleClient>,
    limits: Limits,
}

impl ServerRegistry {
    /// Build clients for every configured server. No connections are made.
    pub fn from_config(config: ResolvedConfig) -> Result<Self, RegistryError> {
        let timeout = config.limits.request_timeout();
        let mut servers = IndexMap::with_capacity(config.servers.len());
        for server in config.servers {
            let client =
                NetdataClient::new(&server, timeout).map_err(|source| RegistryError::Netdata {
                    server: server.name.clone(),
                    source,
                })?;
            debug!(server = %server.name, url = client.base_url(), "netdata client ready");
            servers.insert(
                server.name.clone(),
                ServerHandle {
                    config: server,
                    client,
                },
            );
        }

        let router = config
            .router
            .map(|r| RouterClient::new(r, config.limits.router_timeout()));

        let dozzle = config
            .dozzle
            .as_ref()
            .map(|d| DozzleClient::new(d, config.limits.dozzle_timeout()))
            .transpose()?;
        if let Some(d) = &dozzle {
            debug!(url = d.base_url(), "dozzle client ready");
        }

        Ok(Self {
            servers,
            router,
            dozzle,
            limits: config.limits,
        })
    }

    /// Look up a server by name.
    pub fn resolve(&self, name: &str) -> Result<&ServerHandle, ErrorDescriptor> {
        self.servers
            .get(name)
            .ok_or_else(|| ErrorDescriptor::config(format!("Unknown server: '{name}'")))
    }

    /// Every server, in configured order.
    pub fn servers(&self) -> impl Iterator<Item = &ServerHandle> {
        self.servers.values()
    }

    pub fn clients(&self) -> impl Iterator<Item = &NetdataClient> {
        self.servers.values().map(|h| &h.client)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// The router client, if the router section is enabled.
    pub fn router(&self) -> Result<&RouterClient, ErrorDescriptor> {
        self.router
            .as_ref()
            .ok_or_else(|| ErrorDescriptor::config("MikroTik not enabled in config"))
    }

    pub fn router_enabled(&self) -> bool {
        self.router.is_some()
    }

    pub async fn router_summary(&self) -> Option<RouterSummary> {
        let router = self.router.as_ref()?;
        Some(RouterSummary {
            model: router.model().to_string(),
            description: router.description().to_string(),
            address: router.address(),
            session: router.state().await,
        })
    }

    /// The Dozzle client, if the dozzle section is enabled.
    pub fn dozzle(&self) -> Result<&DozzleClient, ErrorDescriptor> {
        self.dozzle
            .as_ref()
            .ok_or_else(|| ErrorDescriptor::config("Dozzle not enabled in config"))
    }

    pub fn dozzle_enabled(&self) -> bool {
        self.dozzle.is_some()
    }

    pub fn dozzle_summary(&self) -> Option<DozzleSummary> {
        self.dozzle.as_ref().map(|d| DozzleSummary {
            url: d.base_url().to_string(),
            description: d.description().to_string(),
        })
    }

    pub fn fan_out(&self) -> FanOut {
        FanOut {
            server_timeout: self.limits.server_timeout(),
            max_concurrency: self.limits.max_concurrency,
        }
    }
}
