//! RouterOS reply records → tool schema.
//!
//! RouterOS sends every attribute as a string (`cpu-load=3`, `running=true`).
//! Numeric attributes that are present but unparsable are treated as a
//! malformed response; absent ones become `None`.

use super::NormalizeError;
use crate::model::{DhcpLease, RouterInterface, RouterResource, TrafficStat};
use crate::routeros::Record;

fn text(rec: &Record, key: &str) -> Option<String> {
    rec.get(key).filter(|v| !v.is_empty()).cloned()
}

fn flag(rec: &Record, key: &str) -> bool {
    matches!(rec.get(key).map(String::as_str), Some("true" | "yes"))
}

fn number(rec: &Record, key: &str) -> Result<Option<u64>, NormalizeError> {
    match rec.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| {
            NormalizeError::new(format!("attribute '{key}' is not a number: '{v}'"))
        }),
    }
}

fn required(rec: &Record, key: &str) -> Result<String, NormalizeError> {
    text(rec, key).ok_or_else(|| NormalizeError::new(format!("record has no '{key}' attribute")))
}

pub fn raw_mikrotik_to_resource(rec: &Record) -> Result<RouterResource, NormalizeError> {
    Ok(RouterResource {
        board_name: text(rec, "board-name"),
        version: text(rec, "version"),
        architecture: text(rec, "architecture-name"),
        uptime: text(rec, "uptime"),
        cpu: text(rec, "cpu"),
        cpu_count: number(rec, "cpu-count")?,
        cpu_frequency_mhz: number(rec, "cpu-frequency")?,
        cpu_load_pct: number(rec, "cpu-load")?.map(|v| v as f64),
        free_memory: number(rec, "free-memory")?,
        total_memory: number(rec, "total-memory")?,
        free_hdd_space: number(rec, "free-hdd-space")?,
        total_hdd_space: number(rec, "total-hdd-space")?,
    })
}

pub fn raw_mikrotik_to_interface(rec: &Record) -> Result<RouterInterface, NormalizeError> {
    // `mtu` may be "auto"; `actual-mtu` is always numeric when present.
    let mtu = number(rec, "actual-mtu")
        .ok()
        .flatten()
        .or_else(|| number(rec, "mtu").ok().flatten());
    Ok(RouterInterface {
        name: required(rec, "name")?,
        kind: text(rec, "type"),
        mac_address: text(rec, "mac-address"),
        mtu,
        running: flag(rec, "running"),
        disabled: flag(rec, "disabled"),
        rx_bytes: number(rec, "rx-byte")?,
        tx_bytes: number(rec, "tx-byte")?,
        comment: text(rec, "comment"),
    })
}

pub fn raw_mikrotik_to_lease(rec: &Record) -> Result<DhcpLease, NormalizeError> {
    Ok(DhcpLease {
        address: text(rec, "address"),
        mac_address: text(rec, "mac-address"),
        active_address: text(rec, "active-address"),
        active_mac_address: text(rec, "active-mac-address"),
        host_name: text(rec, "host-name"),
        server: text(rec, "server"),
        status: text(rec, "status"),
        dynamic: flag(rec, "dynamic"),
        expires_after: text(rec, "expires-after"),
        comment: text(rec, "comment"),
    })
}

/// Members of bond `name`, from `/interface/bonding` records.
pub fn bonding_members(name: &str, bonding: &[Record]) -> Option<Vec<String>> {
    bonding
        .iter()
        .find(|b| b.get("name").map(String::as_str) == Some(name))
        .map(|b| {
            b.get("slaves")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        })
}

/// Counters from an `/interface` record, bond members from `/interface/bonding`,
/// and live rates from `/interface/monitor-traffic` when available.
pub fn raw_mikrotik_to_traffic(
    iface: &Record,
    bonding: &[Record],
    monitor: Option<&Record>,
) -> Result<TrafficStat, NormalizeError> {
    let name = required(iface, "name")?;
    let (rx_bps, tx_bps) = match monitor {
        Some(m) => (
            number(m, "rx-bits-per-second")?,
            number(m, "tx-bits-per-second")?,
        ),
        None => (None, None),
    };
    Ok(TrafficStat {
        running: flag(iface, "running"),
        rx_bytes: number(iface, "rx-byte")?,
        tx_bytes: number(iface, "tx-byte")?,
        rx_packets: number(iface, "rx-packet")?,
        tx_packets: number(iface, "tx-packet")?,
        rx_errors: number(iface, "rx-error")?,
        tx_errors: number(iface, "tx-error")?,
        rx_bits_per_second: rx_bps,
        tx_bits_per_second: tx_bps,
        bonding_members: bonding_members(&name, bonding),
        interface_name: name,
    })
}
