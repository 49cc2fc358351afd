//! Read-only router queries used by the `get_mikrotik_*` tools.

use tracing::debug;

use super::{Record, RouterClient};
use crate::error::ErrorDescriptor;
use crate::model::{DhcpLease, RouterInterface, RouterResource, TrafficStat};
use crate::normalize::{self, NormalizeError};

impl RouterClient {
    async fn print(&self, command: &str, args: &[String]) -> Result<Vec<Record>, ErrorDescriptor> {
        self.execute(command, args)
            .await
            .map_err(|e| e.to_descriptor())
    }

    /// Every interface, in router order.
    pub async fn interfaces(&self) -> Result<Vec<RouterInterface>, ErrorDescriptor> {
        let records = self.print("/interface/print", &[]).await?;
        normalize_all(&records, normalize::raw_mikrotik_to_interface)
    }

    pub async fn resources(&self) -> Result<RouterResource, ErrorDescriptor> {
        let records = self.print("/system/resource/print", &[]).await?;
        let first = records.first().ok_or_else(|| {
            NormalizeError::new("/system/resource/print returned no records").to_descriptor()
        })?;
        normalize::raw_mikrotik_to_resource(first).map_err(|e| e.to_descriptor())
    }

    pub async fn dhcp_leases(&self) -> Result<Vec<DhcpLease>, ErrorDescriptor> {
        let records = self.print("/ip/dhcp-server/lease/print", &[]).await?;
        normalize_all(&records, normalize::raw_mikrotik_to_lease)
    }

    /// Traffic counters for one interface (with live rates) or for all.
    ///
    /// For a single interface `monitor-traffic` runs first: the router traps
    /// on an unknown name, and that message is returned as-is.
    pub async fn traffic(&self, interface: Option<&str>) -> Result<Vec<TrafficStat>, ErrorDescriptor> {
        match interface {
            Some(name) => {
                let monitor = self
                    .print(
                        "/interface/monitor-traffic",
                        &[format!("=interface={name}"), "=once=".to_string()],
                    )
                    .await?;
                let ifaces = self
                    .print("/interface/print", &[format!("?name={name}")])
                    .await?;
                let bonding = self.print("/interface/bonding/print", &[]).await?;
                debug!(interface = name, bonds = bonding.len(), "router traffic query");

                let iface = ifaces.first().ok_or_else(|| {
                    ErrorDescriptor::invalid_argument(format!("Unknown interface: '{name}'"))
                })?;
                let stat = normalize::raw_mikrotik_to_traffic(iface, &bonding, monitor.first())
                    .map_err(|e| e.to_descriptor())?;
                Ok(vec![stat])
            }
            None => {
                let ifaces = self.print("/interface/print", &[]).await?;
                let bonding = self.print("/interface/bonding/print", &[]).await?;
                ifaces
                    .iter()
                    .map(|iface| {
                        normalize::raw_mikrotik_to_traffic(iface, &bonding, None)
                            .map_err(|e| e.to_descriptor())
                    })
                    .collect()
            }
        }
    }
}

fn normalize_all<T>(
    records: &[Record],
    f: impl Fn(&Record) -> Result<T, NormalizeError>,
) -> Result<Vec<T>, ErrorDescriptor> {
    records
        .iter()
        .map(|r| f(r).map_err(|e| e.to_descriptor()))
        .collect()
}
