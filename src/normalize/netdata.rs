//! Netdata chart responses → tool schema.

use indexmap::IndexMap;
use serde_json::Value;

use super::NormalizeError;
use crate::model::{AgentInfo, ContainerInfo, DiskUsage, HealthSnapshot, NetworkSample};
use crate::netdata::{RawChartData, RawCharts, RawInfo};

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
/// Bytes in one kilobit (Netdata's `net.*` unit is kilobits/s).
const BYTES_PER_KILOBIT: f64 = 125.0;

const DISK_PREFIX: &str = "disk_space.";
const NET_PREFIX: &str = "net.";
const CGROUP_PREFIX: &str = "cgroup_";

/// Newest row of a chart, keyed by dimension label. `None` values are dropped.
#[derive(Debug, Default)]
pub struct LatestRow<'a> {
    pub time: Option<i64>,
    pub values: IndexMap<&'a str, f64>,
}

impl LatestRow<'_> {
    pub fn get(&self, dim: &str) -> Option<f64> {
        self.values.get(dim).copied()
    }

    /// Sum of every present dimension, or `None` if the row is empty.
    pub fn sum(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.values().sum())
        }
    }
}

/// Extract the newest row of `raw`, checking the column layout.
pub fn latest_row<'a>(chart: &str, raw: &'a RawChartData) -> Result<LatestRow<'a>, NormalizeError> {
    if raw.labels.first().map(String::as_str) != Some("time") {
        return Err(NormalizeError::new(format!(
            "chart {chart}: first label must be 'time'"
        )));
    }
    let Some(row) = raw.data.first() else {
        return Ok(LatestRow::default());
    };
    if row.len() != raw.labels.len() {
        return Err(NormalizeError::new(format!(
            "chart {chart}: row has {} columns, expected {}",
            row.len(),
            raw.labels.len()
        )));
    }

    let values = raw.labels[1..]
        .iter()
        .zip(&row[1..])
        .filter_map(|(label, v)| v.map(|v| (label.as_str(), v)))
        .collect();
    Ok(LatestRow {
        time: row[0].map(|t| t as i64),
        values,
    })
}

/// Raw inputs for one health snapshot.
#[derive(Debug, Default)]
pub struct RawHealth {
    pub server_name: String,
    pub charts: RawCharts,
    pub info: Option<RawInfo>,
    pub cpu: RawChartData,
    pub ram: RawChartData,
    /// `(chart_id, data)` for every `disk_space.*` chart.
    pub disks: Vec<(String, RawChartData)>,
}

/// Build a [`HealthSnapshot`]. `now` is used when the CPU chart has no rows.
pub fn raw_netdata_to_health(raw: &RawHealth, now: i64) -> Result<HealthSnapshot, NormalizeError> {
    let cpu = latest_row("system.cpu", &raw.cpu)?;
    let ram = latest_row("system.ram", &raw.ram)?;

    let disks = raw
        .disks
        .iter()
        .map(|(chart_id, data)| {
            let row = latest_row(chart_id, data)?;
            let used = match (row.get("used"), row.get("reserved_for_root")) {
                (None, None) => None,
                (used, reserved) => Some(used.unwrap_or(0.0) + reserved.unwrap_or(0.0)),
            };
            Ok(DiskUsage {
                mount: disk_mount(&raw.charts, chart_id),
                used: used.map(|v| to_bytes(v, GIB)),
                total: row.sum().map(|v| to_bytes(v, GIB)),
            })
        })
        .collect::<Result<Vec<_>, NormalizeError>>()?;

    Ok(HealthSnapshot {
        server_name: raw.server_name.clone(),
        hostname: hostname(&raw.charts, raw.info.as_ref()),
        cpu_pct: cpu.sum().map(round2),
        ram_used: ram.get("used").map(|v| to_bytes(v, MIB)),
        ram_total: ram.sum().map(|v| to_bytes(v, MIB)),
        disks,
        timestamp: cpu.time.unwrap_or(now),
    })
}

/// Agent identity. Every field is optional.
pub fn raw_netdata_to_agent_info(info: &RawInfo) -> AgentInfo {
    let kernel = match (&info.kernel_name, &info.kernel_version) {
        (Some(name), Some(version)) => Some(format!("{name} {version}")),
        (Some(name), None) => Some(name.clone()),
        (None, version) => version.clone(),
    };
    AgentInfo {
        version: info.version.clone(),
        os_name: info.os_name.clone(),
        os_version: info.os_version.clone(),
        kernel,
        architecture: info.architecture.clone(),
        cores: info.cores_total.as_ref().and_then(value_as_u64),
    }
}

/// Hostname from the charts listing, else from `/api/v1/info`.
pub fn hostname(charts: &RawCharts, info: Option<&RawInfo>) -> Option<String> {
    charts.hostname.clone().or_else(|| {
        info.and_then(|i| i.hostname.clone().or_else(|| i.mirrored_hosts.first().cloned()))
    })
}

/// Chart ids of every mounted filesystem.
pub fn disk_charts(charts: &RawCharts) -> Vec<String> {
    charts
        .charts
        .keys()
        .filter(|id| id.starts_with(DISK_PREFIX))
        .cloned()
        .collect()
}

fn disk_mount(charts: &RawCharts, chart_id: &str) -> String {
    charts
        .charts
        .get(chart_id)
        .map(|meta| meta.family.clone())
        .filter(|family| !family.is_empty())
        .unwrap_or_else(|| chart_id.trim_start_matches(DISK_PREFIX).to_string())
}

/// Interfaces that have a `net.<if>` chart, optionally narrowed to one name.
pub fn network_interfaces(charts: &RawCharts, iface_filter: Option<&str>) -> Vec<String> {
    charts
        .charts
        .keys()
        .filter_map(|id| id.strip_prefix(NET_PREFIX))
        .filter(|iface| iface_filter.map_or(true, |f| *iface == f))
        .map(str::to_string)
        .collect()
}

/// Raw charts for one interface, each collapsed to a single averaged row.
#[derive(Debug, Default)]
pub struct RawInterface {
    pub name: String,
    pub traffic: RawChartData,
    pub packets: Option<RawChartData>,
    pub errors: Option<RawChartData>,
}

/// Raw inputs for a network query over the last `seconds`.
#[derive(Debug, Default)]
pub struct RawNetwork {
    pub seconds: u64,
    pub interfaces: Vec<RawInterface>,
}

/// Turn averaged rates into totals over the window.
pub fn raw_netdata_to_network(
    raw: &RawNetwork,
    iface_filter: Option<&str>,
) -> Result<Vec<NetworkSample>, NormalizeError> {
    let secs = raw.seconds as f64;
    raw.interfaces
        .iter()
        .filter(|iface| iface_filter.map_or(true, |f| iface.name == f))
        .map(|iface| {
            let traffic = latest_row(&format!("net.{}", iface.name), &iface.traffic)?;
            // Netdata plots outbound dimensions as negative values.
            let rx_kbps = traffic.get("received").map(f64::abs);
            let tx_kbps = traffic.get("sent").map(f64::abs);

            let (rx_packets, tx_packets) = match &iface.packets {
                Some(data) => {
                    let row = latest_row(&format!("net_packets.{}", iface.name), data)?;
                    (
                        row.get("received").map(|v| total(v, secs)),
                        row.get("sent").map(|v| total(v, secs)),
                    )
                }
                None => (None, None),
            };
            let errors = match &iface.errors {
                Some(data) => latest_row(&format!("net_errors.{}", iface.name), data)?
                    .values
                    .values()
                    .map(|v| total(*v, secs))
                    .reduce(|a, b| a + b),
                None => None,
            };

            Ok(NetworkSample {
                interface_name: iface.name.clone(),
                rx_bytes: rx_kbps.map(|v| total(v * BYTES_PER_KILOBIT, secs)),
                tx_bytes: tx_kbps.map(|v| total(v * BYTES_PER_KILOBIT, secs)),
                rx_kbps: rx_kbps.map(round2),
                tx_kbps: tx_kbps.map(round2),
                rx_packets,
                tx_packets,
                errors,
                bonding_members: None,
            })
        })
        .collect()
}

/// Sorted, de-duplicated container names from `cgroup_<name>.<metric>` charts.
pub fn container_names(charts: &RawCharts) -> Vec<String> {
    let mut names: Vec<String> = charts
        .charts
        .keys()
        .filter_map(|id| container_of(id))
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    names
}

fn container_of(chart_id: &str) -> Option<&str> {
    let (kind, _metric) = chart_id.rsplit_once('.')?;
    kind.strip_prefix(CGROUP_PREFIX).filter(|n| !n.is_empty())
}

/// Chart id of `metric` for `container`.
pub fn container_chart(container: &str, metric: &str) -> String {
    format!("{CGROUP_PREFIX}{container}.{metric}")
}

/// Raw inputs for one container.
#[derive(Debug, Default)]
pub struct RawContainer {
    pub name: String,
    pub cpu: Option<RawChartData>,
    pub mem_usage: Option<RawChartData>,
    pub mem_limit: Option<RawChartData>,
}

pub fn raw_netdata_to_container(raw: &RawContainer) -> Result<ContainerInfo, NormalizeError> {
    let cpu_pct = match &raw.cpu {
        Some(data) => latest_row(&container_chart(&raw.name, "cpu"), data)?
            .sum()
            .map(round2),
        None => None,
    };
    let mem_used = match &raw.mem_usage {
        Some(data) => latest_row(&container_chart(&raw.name, "mem_usage"), data)?
            .get("ram")
            .map(|v| to_bytes(v, MIB)),
        None => None,
    };
    let mem_limit = match &raw.mem_limit {
        Some(data) => latest_row(&container_chart(&raw.name, "mem_usage_limit"), data)?
            .sum()
            .map(|v| to_bytes(v, MIB)),
        None => None,
    };
    Ok(ContainerInfo {
        container_name: raw.name.clone(),
        cpu_pct,
        mem_used,
        mem_limit,
    })
}

fn to_bytes(value: f64, unit: f64) -> u64 {
    (value.max(0.0) * unit).round() as u64
}

fn total(rate: f64, secs: f64) -> u64 {
    (rate.abs() * secs).round() as u64
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn value_as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netdata::RawChartMeta;

    fn chart(labels: &[&str], row: &[Option<f64>]) -> RawChartData {
        RawChartData {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            data: vec![row.to_vec()],
        }
    }

    fn charts(ids: &[(&str, &str)]) -> RawCharts {
        RawCharts {
            hostname: Some("burger".into()),
            charts: ids
                .iter()
                .map(|(id, family)| {
                    (
                        id.to_string(),
                        RawChartMeta {
                            family: family.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn cpu_percent_is_sum_of_dimensions() {
        let raw = RawHealth {
            server_name: "burger".into(),
            cpu: chart(
                &["time", "softirq", "user", "system", "iowait"],
                &[Some(1_700_000_000.0), Some(0.5), Some(30.25), Some(11.25), None],
            ),
            ram: chart(&["time"], &[Some(1_700_000_000.0)]),
            ..RawHealth::default()
        };
        let snap = raw_netdata_to_health(&raw, 0).unwrap();
        assert_eq!(snap.cpu_pct, Some(42.0));
        assert_eq!(snap.timestamp, 1_700_000_000);
    }

    #[test]
    fn fractional_cpu_is_not_rescaled() {
        let raw = RawHealth {
            cpu: chart(&["time", "user"], &[Some(1.0), Some(0.42)]),
            ram: chart(&["time"], &[Some(1.0)]),
            ..RawHealth::default()
        };
        assert_eq!(raw_netdata_to_health(&raw, 0).unwrap().cpu_pct, Some(0.42));
    }

    #[test]
    fn ram_and_disk_in_bytes() {
        let raw = RawHealth {
            server_name: "cheese".into(),
            charts: charts(&[("disk_space._", "/"), ("disk_space._srv", "")]),
            cpu: chart(&["time", "user"], &[Some(5.0), Some(1.0)]),
            ram: chart(
                &["time", "free", "used", "cached", "buffers"],
                &[Some(5.0), Some(1024.0), Some(2048.0), Some(896.0), Some(128.0)],
            ),
            disks: vec![
                (
                    "disk_space._".into(),
                    chart(
                        &["time", "avail", "used", "reserved_for_root"],
                        &[Some(5.0), Some(60.0), Some(35.0), Some(5.0)],
                    ),
                ),
                (
                    "disk_space._srv".into(),
                    chart(&["time", "avail", "used"], &[Some(5.0), Some(1.0), Some(1.0)]),
                ),
            ],
            ..RawHealth::default()
        };
        let snap = raw_netdata_to_health(&raw, 0).unwrap();
        assert_eq!(snap.ram_used, Some(2048 * 1024 * 1024));
        assert_eq!(snap.ram_total, Some(4096 * 1024 * 1024));
        assert_eq!(snap.disks[0].mount, "/");
        assert_eq!(snap.disks[0].used, Some(40 * 1024 * 1024 * 1024));
        assert_eq!(snap.disks[0].total, Some(100 * 1024 * 1024 * 1024));
        // Empty family falls back to the chart id suffix.
        assert_eq!(snap.disks[1].mount, "_srv");
        assert_eq!(snap.hostname.as_deref(), Some("burger"));
    }

    #[test]
    fn empty_charts_give_nulls() {
        let raw = RawHealth {
            cpu: RawChartData {
                labels: vec!["time".into()],
                data: vec![],
            },
            ram: RawChartData {
                labels: vec!["time".into(), "used".into()],
                data: vec![],
            },
            ..RawHealth::default()
        };
        let snap = raw_netdata_to_health(&raw, 99).unwrap();
        assert_eq!(snap.cpu_pct, None);
        assert_eq!(snap.ram_used, None);
        assert_eq!(snap.ram_total, None);
        assert_eq!(snap.timestamp, 99);
        assert!(snap.hostname.is_none());
    }

    #[test]
    fn ragged_row_is_malformed() {
        let raw = RawHealth {
            cpu: chart(&["time", "user", "system"], &[Some(1.0), Some(2.0)]),
            ram: chart(&["time"], &[Some(1.0)]),
            ..RawHealth::default()
        };
        let err = raw_netdata_to_health(&raw, 0).unwrap_err();
        assert!(err.to_string().contains("system.cpu"));
    }

    #[test]
    fn missing_time_label_is_malformed() {
        let raw = chart(&["user"], &[Some(1.0)]);
        assert!(latest_row("system.cpu", &raw).is_err());
    }

    #[test]
    fn hostname_falls_back_to_mirrored_hosts() {
        let info = RawInfo {
            mirrored_hosts: vec!["fries".into()],
            ..RawInfo::default()
        };
        assert_eq!(
            hostname(&RawCharts::default(), Some(&info)).as_deref(),
            Some("fries")
        );
    }

    #[test]
    fn agent_info_parses_string_cores() {
        let info = RawInfo {
            kernel_name: Some("Linux".into()),
            kernel_version: Some("6.8.0".into()),
            cores_total: Some(Value::String("16".into())),
            ..RawInfo::default()
        };
        let agent = raw_netdata_to_agent_info(&info);
        assert_eq!(agent.cores, Some(16));
        assert_eq!(agent.kernel.as_deref(), Some("Linux 6.8.0"));
    }

    #[test]
    fn network_totals_from_average_rates() {
        let raw = RawNetwork {
            seconds: 600,
            interfaces: vec![
                RawInterface {
                    name: "eth0".into(),
                    traffic: chart(
                        &["time", "received", "sent"],
                        &[Some(1.0), Some(800.0), Some(-400.0)],
                    ),
                    packets: Some(chart(
                        &["time", "received", "sent", "multicast"],
                        &[Some(1.0), Some(100.0), Some(-50.0), Some(0.0)],
                    )),
                    errors: Some(chart(
                        &["time", "inbound", "outbound"],
                        &[Some(1.0), Some(0.01), Some(0.0)],
                    )),
                },
                RawInterface {
                    name: "bond0".into(),
                    traffic: chart(&["time", "received", "sent"], &[Some(1.0), Some(1.0), None]),
                    ..RawInterface::default()
                },
            ],
        };
        let samples = raw_netdata_to_network(&raw, None).unwrap();
        assert_eq!(samples.len(), 2);
        let eth0 = &samples[0];
        assert_eq!(eth0.rx_bytes, Some(60_000_000));
        assert_eq!(eth0.tx_bytes, Some(30_000_000));
        assert_eq!(eth0.tx_kbps, Some(400.0));
        assert_eq!(eth0.rx_packets, Some(60_000));
        assert_eq!(eth0.tx_packets, Some(30_000));
        assert_eq!(eth0.errors, Some(6));
        // An absent dimension stays absent rather than reading as zero traffic.
        let bond = &samples[1];
        assert_eq!(bond.rx_bytes, Some(75_000));
        assert_eq!(bond.tx_bytes, None);
        assert_eq!(bond.tx_kbps, None);
        assert_eq!(bond.rx_packets, None);
        assert_eq!(bond.errors, None);

        let only_bond = raw_netdata_to_network(&raw, Some("bond0")).unwrap();
        assert_eq!(only_bond.len(), 1);
        assert_eq!(only_bond[0].interface_name, "bond0");
    }

    #[test]
    fn selects_interfaces_and_disks() {
        let c = charts(&[
            ("net.eth0", "eth0"),
            ("net_packets.eth0", "eth0"),
            ("net.bond0", "bond0"),
            ("disk_space._", "/"),
            ("system.cpu", "cpu"),
        ]);
        assert_eq!(network_interfaces(&c, None), ["eth0", "bond0"]);
        assert_eq!(network_interfaces(&c, Some("bond0")), ["bond0"]);
        assert!(network_interfaces(&c, Some("wlan0")).is_empty());
        assert_eq!(disk_charts(&c), ["disk_space._"]);
    }

    #[test]
    fn container_names_from_cgroup_charts() {
        let c = charts(&[
            ("cgroup_redis.cpu", ""),
            ("cgroup_nginx.cpu", ""),
            ("cgroup_nginx.mem_usage", ""),
            ("cgroup_my.app.cpu", ""),
            ("system.cpu", ""),
            ("cgroup_.cpu", ""),
        ]);
        assert_eq!(container_names(&c), ["my.app", "nginx", "redis"]);
    }

    #[test]
    fn container_stats() {
        let raw = RawContainer {
            name: "nginx".into(),
            cpu: Some(chart(&["time", "user", "system"], &[Some(1.0), Some(2.5), Some(1.0)])),
            mem_usage: Some(chart(&["time", "ram", "swap"], &[Some(1.0), Some(256.0), Some(0.0)])),
            mem_limit: None,
        };
        let info = raw_netdata_to_container(&raw).unwrap();
        assert_eq!(info.cpu_pct, Some(3.5));
        assert_eq!(info.mem_used, Some(256 * 1024 * 1024));
        assert_eq!(info.mem_limit, None);
    }
}
