//! Per-server Netdata operations.
//!
//! Each function runs against one [`NetdataClient`]: it lists the agent's
//! charts, fetches the charts it needs concurrently, and hands the raw
//! responses to the normalizer. Every failure comes back as an
//! [`ErrorDescriptor`] already attributed to the server.

use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::try_join_all;
use serde::Serialize;

use crate::error::ErrorDescriptor;
use crate::model::{AgentInfo, ContainerInfo, HealthSnapshot, NetworkSample};
use crate::netdata::{NetdataClient, NetdataError, RawChartData, RawCharts, Window};
use crate::normalize::netdata::{container_chart, container_names, disk_charts, network_interfaces};
use crate::normalize::{self, NormalizeError, RawContainer, RawHealth, RawInterface, RawNetwork};

/// Window for point-in-time readings: the last minute averaged into one row.
const SNAPSHOT_SECONDS: u64 = 60;

/// Health snapshot plus agent identity, as returned by `get_server_health`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
    pub agent: Option<AgentInfo>,
}

fn netdata_err(client: &NetdataClient) -> impl Fn(NetdataError) -> ErrorDescriptor + '_ {
    move |e| e.to_descriptor(client.server())
}

fn normalize_err(client: &NetdataClient) -> impl Fn(NormalizeError) -> ErrorDescriptor + '_ {
    move |e| e.to_descriptor().for_server(client.server())
}

/// A chart with the right layout and no rows; normalizes to all-`None`.
fn empty_chart() -> RawChartData {
    RawChartData {
        labels: vec!["time".to_string()],
        data: Vec::new(),
    }
}

/// Fetch `chart_id` if the agent collects it.
async fn fetch_if_present(
    client: &NetdataClient,
    charts: &RawCharts,
    chart_id: &str,
    window: Window,
) -> Result<Option<RawChartData>, NetdataError> {
    if !charts.charts.contains_key(chart_id) {
        return Ok(None);
    }
    client.fetch_chart(chart_id, window).await.map(Some)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// CPU, RAM and every disk of one server. `/api/v1/info` is best-effort.
pub async fn collect_health(client: &NetdataClient) -> Result<ServerHealth, ErrorDescriptor> {
    let charts = client.fetch_charts().await.map_err(netdata_err(client))?;
    let window = Window::last(SNAPSHOT_SECONDS, Some(1));

    let disk_ids = disk_charts(&charts);
    let disks = try_join_all(disk_ids.iter().map(|id| async move {
        client
            .fetch_chart(id, window)
            .await
            .map(|data| (id.clone(), data))
    }));

    let (cpu, ram, disks, info) = tokio::join!(
        fetch_if_present(client, &charts, "system.cpu", window),
        fetch_if_present(client, &charts, "system.ram", window),
        disks,
        client.fetch_info(),
    );

    let info = match info {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::debug!(server = client.server(), error = %e, "agent info unavailable");
            None
        }
    };

    let raw = RawHealth {
        server_name: client.server().to_string(),
        cpu: cpu.map_err(netdata_err(client))?.unwrap_or_else(empty_chart),
        ram: ram.map_err(netdata_err(client))?.unwrap_or_else(empty_chart),
        disks: disks.map_err(netdata_err(client))?,
        charts,
        info,
    };
    let snapshot = normalize::raw_netdata_to_health(&raw, unix_now()).map_err(normalize_err(client))?;
    Ok(ServerHealth {
        snapshot,
        agent: raw.info.as_ref().map(normalize::raw_netdata_to_agent_info),
    })
}

/// Traffic per interface over the last `seconds`, optionally one interface.
pub async fn collect_network(
    client: &NetdataClient,
    interface: Option<&str>,
    seconds: u64,
) -> Result<Vec<NetworkSample>, ErrorDescriptor> {
    let charts = client.fetch_charts().await.map_err(netdata_err(client))?;
    let names = network_interfaces(&charts, interface);
    if let Some(iface) = interface {
        if names.is_empty() {
            return Err(
                ErrorDescriptor::invalid_argument(format!("Unknown interface: '{iface}'"))
                    .for_server(client.server()),
            );
        }
    }

    let window = Window::last(seconds, Some(1));
    let charts = &charts;
    let interfaces = try_join_all(names.into_iter().map(|name| async move {
        let (traffic_id, packets_id, errors_id) = (
            format!("net.{name}"),
            format!("net_packets.{name}"),
            format!("net_errors.{name}"),
        );
        let (traffic, packets, errors) = tokio::join!(
            client.fetch_chart(&traffic_id, window),
            fetch_if_present(client, charts, &packets_id, window),
            fetch_if_present(client, charts, &errors_id, window),
        );
        Ok::<_, NetdataError>(RawInterface {
            traffic: traffic?,
            packets: packets?,
            errors: errors?,
            name,
        })
    }))
    .await
    .map_err(netdata_err(client))?;

    let raw = RawNetwork { seconds, interfaces };
    normalize::raw_netdata_to_network(&raw, interface).map_err(normalize_err(client))
}

/// Names of the containers the agent collects cgroup charts for.
pub async fn list_containers(client: &NetdataClient) -> Result<Vec<String>, ErrorDescriptor> {
    let charts = client.fetch_charts().await.map_err(netdata_err(client))?;
    Ok(container_names(&charts))
}

/// CPU and memory of one container.
pub async fn collect_container(
    client: &NetdataClient,
    container: &str,
) -> Result<ContainerInfo, ErrorDescriptor> {
    let charts = client.fetch_charts().await.map_err(netdata_err(client))?;
    if !container_names(&charts).iter().any(|c| c == container) {
        return Err(
            ErrorDescriptor::invalid_argument(format!("Unknown container: '{container}'"))
                .for_server(client.server()),
        );
    }

    let window = Window::last(SNAPSHOT_SECONDS, Some(1));
    let cpu_id = container_chart(container, "cpu");
    let usage_id = container_chart(container, "mem_usage");
    let limit_id = container_chart(container, "mem_usage_limit");
    let (cpu, mem_usage, mem_limit) = tokio::join!(
        fetch_if_present(client, &charts, &cpu_id, window),
        fetch_if_present(client, &charts, &usage_id, window),
        fetch_if_present(client, &charts, &limit_id, window),
    );
    let raw = RawContainer {
        name: container.to_string(),
        cpu: cpu.map_err(netdata_err(client))?,
        mem_usage: mem_usage.map_err(netdata_err(client))?,
        mem_limit: mem_limit.map_err(netdata_err(client))?,
    };
    normalize::raw_netdata_to_container(&raw).map_err(normalize_err(client))
}
