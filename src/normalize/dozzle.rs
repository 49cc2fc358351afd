//! Dozzle containers and log lines → tool schema.

use serde_json::Value;

use crate::dozzle::{RawDozzleContainer, RawLogLine};
use crate::model::{LogContainer, LogHost, LogLine};

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.is_empty()).cloned()
}

pub fn raw_dozzle_to_container(raw: &RawDozzleContainer) -> LogContainer {
    LogContainer {
        id: raw.id.clone(),
        name: raw.name.clone(),
        image: non_empty(&raw.image),
        state: non_empty(&raw.state),
        health: non_empty(&raw.health),
        host: non_empty(&raw.host),
        created: raw.created.clone().filter(|v| !v.is_null()),
        started_at: raw.started_at.clone().filter(|v| !v.is_null()),
    }
}

/// Hosts in the order their first container appears. Containers without a
/// host are not counted.
pub fn dozzle_hosts(containers: &[RawDozzleContainer]) -> Vec<LogHost> {
    let mut hosts: Vec<LogHost> = Vec::new();
    for host in containers.iter().filter_map(|c| non_empty(&c.host)) {
        match hosts.iter_mut().find(|h| h.id == host) {
            Some(known) => known.container_count += 1,
            None => hosts.push(LogHost {
                id: host,
                container_count: 1,
            }),
        }
    }
    hosts
}

/// Match by exact id, then by name, then by id prefix (the 12-character
/// short id `docker ps` prints).
pub fn find_container<'a>(
    containers: &'a [RawDozzleContainer],
    id_or_name: &str,
) -> Option<&'a RawDozzleContainer> {
    containers
        .iter()
        .find(|c| c.id == id_or_name)
        .or_else(|| containers.iter().find(|c| c.name == id_or_name))
        .or_else(|| {
            (id_or_name.len() >= 4)
                .then(|| containers.iter().find(|c| c.id.starts_with(id_or_name)))
                .flatten()
        })
}

/// Log lines of one request, cut to the newest `tail`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerLogs {
    /// Lines Dozzle returned before the cut.
    pub total: usize,
    pub lines: Vec<LogLine>,
}

pub fn raw_dozzle_to_logs(raw: &[RawLogLine], tail: usize) -> ContainerLogs {
    let skip = raw.len().saturating_sub(tail);
    ContainerLogs {
        total: raw.len(),
        lines: raw[skip..].iter().map(raw_dozzle_to_log_line).collect(),
    }
}

fn raw_dozzle_to_log_line(raw: &RawLogLine) -> LogLine {
    let message = match &raw.m {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        // Structured (JSON) log entries are kept as compact JSON text.
        other => other.to_string(),
    };
    LogLine {
        message,
        timestamp: raw.ts,
        stream: non_empty(&raw.s).unwrap_or_else(|| "unknown".to_string()),
        level: non_empty(&raw.l),
    }
}
