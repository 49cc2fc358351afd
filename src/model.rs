//! Tool-facing value types.
//!
//! Everything here is built per request by the normalizers, serialized into
//! the tool response and dropped. Sizes are bytes, rates are per second,
//! percentages are 0-100. Fields an upstream did not report are `None` and
//! serialize as `null`.

use serde::Serialize;
use serde_json::Value;

/// Point-in-time health of one Netdata-monitored server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub server_name: String,
    pub hostname: Option<String>,
    pub cpu_pct: Option<f64>,
    pub ram_used: Option<u64>,
    pub ram_total: Option<u64>,
    pub disks: Vec<DiskUsage>,
    /// Unix seconds of the newest CPU sample (or of collection, if none).
    pub timestamp: i64,
}

/// Space usage of one mount point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsage {
    pub mount: String,
    pub used: Option<u64>,
    pub total: Option<u64>,
}

/// Netdata agent identity, from `/api/v1/info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentInfo {
    pub version: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel: Option<String>,
    pub architecture: Option<String>,
    pub cores: Option<u64>,
}

/// Traffic on one interface over the requested window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSample {
    pub interface_name: String,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub rx_kbps: Option<f64>,
    pub tx_kbps: Option<f64>,
    pub rx_packets: Option<u64>,
    pub tx_packets: Option<u64>,
    pub errors: Option<u64>,
    pub bonding_members: Option<Vec<String>>,
}

/// CPU and memory of one container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerInfo {
    pub container_name: String,
    pub cpu_pct: Option<f64>,
    pub mem_used: Option<u64>,
    pub mem_limit: Option<u64>,
}

/// `/system/resource` of the router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterResource {
    pub board_name: Option<String>,
    pub version: Option<String>,
    pub architecture: Option<String>,
    pub uptime: Option<String>,
    pub cpu: Option<String>,
    pub cpu_count: Option<u64>,
    pub cpu_frequency_mhz: Option<u64>,
    pub cpu_load_pct: Option<f64>,
    pub free_memory: Option<u64>,
    pub total_memory: Option<u64>,
    pub free_hdd_space: Option<u64>,
    pub total_hdd_space: Option<u64>,
}

/// One `/interface` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterInterface {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub mac_address: Option<String>,
    pub mtu: Option<u64>,
    pub running: bool,
    pub disabled: bool,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub comment: Option<String>,
}

/// One `/ip/dhcp-server/lease` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DhcpLease {
    pub address: Option<String>,
    pub mac_address: Option<String>,
    pub active_address: Option<String>,
    pub active_mac_address: Option<String>,
    pub host_name: Option<String>,
    pub server: Option<String>,
    pub status: Option<String>,
    pub dynamic: bool,
    pub expires_after: Option<String>,
    pub comment: Option<String>,
}

/// Counters (and optionally live rates) for one router interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficStat {
    pub interface_name: String,
    pub running: bool,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub rx_packets: Option<u64>,
    pub tx_packets: Option<u64>,
    pub rx_errors: Option<u64>,
    pub tx_errors: Option<u64>,
    pub rx_bits_per_second: Option<u64>,
    pub tx_bits_per_second: Option<u64>,
    pub bonding_members: Option<Vec<String>>,
}

/// One container as Dozzle sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogContainer {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub state: Option<String>,
    pub health: Option<String>,
    /// Dozzle host id; pass it back through `get_dozzle_container_logs`.
    pub host: Option<String>,
    /// Passed through as Dozzle reports it (timestamp string or number).
    pub created: Option<Value>,
    pub started_at: Option<Value>,
}

/// A Docker host known to Dozzle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogHost {
    pub id: String,
    pub container_count: usize,
}

/// One container log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub message: String,
    /// Unix milliseconds.
    pub timestamp: Option<i64>,
    pub stream: String,
    pub level: Option<String>,
}
