//! MCP tool definitions and handlers.
//!
//! Each tool is defined as a JSON schema (returned by [`tool_definitions`])
//! and handled by an async function dispatched from [`handle_tool_call`].
//!
//! ## Tool categories
//!
//! **Fleet tools** read Netdata agents through the [`ServerRegistry`]:
//! - `list_servers`, `get_all_servers_overview`
//! - `get_server_health`, `get_network_stats`
//! - `list_containers`, `get_container_stats`
//!
//! **Router tools** (only listed when `mikrotik.enabled` is true):
//! - `get_mikrotik_interfaces`, `get_mikrotik_resources`
//! - `get_mikrotik_dhcp_leases`, `get_mikrotik_traffic`
//!
//! **Log tools** read Dozzle (only listed when `dozzle.enabled` is true):
//! - `get_dozzle_hosts`, `get_dozzle_containers`, `get_dozzle_container_logs`
//!
//! Handlers return `Result<Value, ErrorDescriptor>`; a failure becomes a
//! tool result with `isError: true` whose text is the descriptor as JSON.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::collect;
use crate::dozzle::LogQuery;
use crate::error::{ErrorDescriptor, ErrorKind};
use crate::fleet;
use crate::normalize;
use crate::registry::{ServerHandle, ServerRegistry};

/// Default window for `get_network_stats`, in seconds.
pub const DEFAULT_NETWORK_SECONDS: u64 = 600;
/// Longest window `get_network_stats` accepts (one day).
pub const MAX_NETWORK_SECONDS: u64 = 86_400;
/// Default `tail` for `get_dozzle_container_logs`.
pub const DEFAULT_LOG_TAIL: u64 = 100;
/// Larger `tail` values are clamped to this.
pub const MAX_LOG_TAIL: u64 = 500;

/// Tool definitions for `tools/list`. Router and log tools appear only when
/// their section is enabled.
pub fn tool_definitions(registry: &ServerRegistry) -> Vec<Value> {
    let mut tools = server_tool_definitions();
    if registry.router_enabled() {
        tools.extend(router_tool_definitions());
    }
    if registry.dozzle_enabled() {
        tools.extend(dozzle_tool_definitions());
    }
    tools
}

fn server_name_property() -> Value {
    json!({
        "type": "string",
        "description": "Server name as configured (see list_servers)."
    })
}

fn server_tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "list_servers",
            "description": "List configured servers with their role, description and hardware notes, plus the router if enabled.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_all_servers_overview",
            "description": "CPU, RAM and disk usage of every configured server, queried concurrently. Unreachable servers are reported individually and do not fail the call.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_server_health",
            "description": "Detailed health of one server: CPU, RAM, per-mount disk usage and Netdata agent info (version, OS, kernel, cores).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "server_name": server_name_property()
                },
                "required": ["server_name"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_network_stats",
            "description": "Bytes, packets and errors per network interface over the last N seconds, with average rates.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "server_name": server_name_property(),
                    "interface": {
                        "type": "string",
                        "description": "Only this interface (e.g. \"eth0\"). Omit for all interfaces."
                    },
                    "seconds": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_NETWORK_SECONDS,
                        "description": "Window length in seconds (default: 600)."
                    }
                },
                "required": ["server_name"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "list_containers",
            "description": "Names of the Docker containers Netdata monitors on a server.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "server_name": server_name_property()
                },
                "required": ["server_name"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_container_stats",
            "description": "CPU and memory usage of one container on a server.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "server_name": server_name_property(),
                    "container_name": {
                        "type": "string",
                        "description": "Container name as returned by list_containers."
                    }
                },
                "required": ["server_name", "container_name"],
                "additionalProperties": false
            }
        }),
    ]
}

fn router_tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_mikrotik_interfaces",
            "description": "All router interfaces: type, MAC, MTU, running/disabled flags and byte counters.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_mikrotik_resources",
            "description": "Router system resources: board, RouterOS version, uptime, CPU load, memory and storage.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_mikrotik_dhcp_leases",
            "description": "DHCP server leases: address, MAC, host name, status and expiry.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_mikrotik_traffic",
            "description": "Traffic counters per router interface with bond members. With an interface, also live rx/tx bits per second.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "interface": {
                        "type": "string",
                        "description": "Only this interface (e.g. \"ether1\"). Omit for all interfaces."
                    }
                },
                "additionalProperties": false
            }
        }),
    ]
}

fn dozzle_tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_dozzle_hosts",
            "description": "Docker hosts known to Dozzle, with the number of containers on each.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_dozzle_containers",
            "description": "Every container Dozzle sees across its hosts: id, name, image, state, health, host and start time.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_dozzle_container_logs",
            "description": "Recent log lines of one container, newest last. Optionally limited to a time range, a regex filter or log levels.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "container_id": {
                        "type": "string",
                        "description": "Container id, short id or name (see get_dozzle_containers)."
                    },
                    "tail": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LOG_TAIL,
                        "description": "Number of newest lines to return (default: 100)."
                    },
                    "from_time": {
                        "type": "string",
                        "format": "date-time",
                        "description": "Start of the range, RFC 3339 (e.g. \"2025-10-28T00:00:00Z\"). Requires to_time."
                    },
                    "to_time": {
                        "type": "string",
                        "format": "date-time",
                        "description": "End of the range, RFC 3339. Requires from_time."
                    },
                    "filter": {
                        "type": "string",
                        "description": "Regular expression matched against each message (e.g. \"error|failed\")."
                    },
                    "levels": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Only these levels: error, warn, info, debug, trace, fatal, unknown."
                    }
                },
                "required": ["container_id"],
                "additionalProperties": false
            }
        }),
    ]
}

/// Route a `tools/call` to its handler.
pub async fn handle_tool_call(name: &str, args: &Value, registry: &ServerRegistry) -> ToolResult {
    let result = match name {
        "list_servers" => handle_list_servers(registry).await,
        "get_all_servers_overview" => handle_overview(registry).await,
        "get_server_health" => handle_server_health(args, registry).await,
        "get_network_stats" => handle_network_stats(args, registry).await,
        "list_containers" => handle_list_containers(args, registry).await,
        "get_container_stats" => handle_container_stats(args, registry).await,
        "get_mikrotik_interfaces" => handle_router_interfaces(registry).await,
        "get_mikrotik_resources" => handle_router_resources(registry).await,
        "get_mikrotik_dhcp_leases" => handle_router_leases(registry).await,
        "get_mikrotik_traffic" => handle_router_traffic(args, registry).await,
        "get_dozzle_hosts" => handle_dozzle_hosts(registry).await,
        "get_dozzle_containers" => handle_dozzle_containers(registry).await,
        "get_dozzle_container_logs" => handle_dozzle_logs(args, registry).await,
        _ => Err(ErrorDescriptor::invalid_argument(format!("Unknown tool: {name}"))),
    };
    match result {
        Ok(value) => ToolResult::success(value),
        Err(e) => {
            debug!(tool = name, error = %e, "tool call failed");
            ToolResult::error(&e)
        }
    }
}

/// Result of an MCP tool call, ready to be serialized into a JSON-RPC response.
#[derive(Debug)]
pub struct ToolResult {
    /// MCP content blocks (a single `{"type":"text","text":"..."}` entry).
    pub content: Vec<Value>,
    /// Maps to `isError` in the MCP response.
    pub is_error: bool,
}

impl ToolResult {
    fn success(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        Self {
            content: vec![json!({ "type": "text", "text": text })],
            is_error: false,
        }
    }

    fn error(error: &ErrorDescriptor) -> Self {
        let text = serde_json::to_string_pretty(error).unwrap_or_else(|_| error.to_string());
        Self {
            content: vec![json!({ "type": "text", "text": text })],
            is_error: true,
        }
    }
}

// ── Argument parsing ──────────────────────────────────────────────

fn arg<'a>(args: &'a Value, key: &str) -> Result<Option<&'a Value>, ErrorDescriptor> {
    match args {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(map.get(key).filter(|v| !v.is_null())),
        _ => Err(ErrorDescriptor::invalid_argument("Arguments must be an object")),
    }
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ErrorDescriptor> {
    match arg(args, key)? {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ErrorDescriptor::invalid_argument(
            format!("Parameter '{key}' must not be empty"),
        )),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ErrorDescriptor::invalid_argument(format!(
            "Parameter '{key}' must be a string"
        ))),
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ErrorDescriptor> {
    optional_str(args, key)?.ok_or_else(|| {
        ErrorDescriptor::invalid_argument(format!("Missing required parameter: {key}"))
    })
}

fn seconds_arg(args: &Value) -> Result<u64, ErrorDescriptor> {
    let Some(value) = arg(args, "seconds")? else {
        return Ok(DEFAULT_NETWORK_SECONDS);
    };
    match value.as_u64() {
        Some(secs) if (1..=MAX_NETWORK_SECONDS).contains(&secs) => Ok(secs),
        _ => Err(ErrorDescriptor::invalid_argument(format!(
            "Parameter 'seconds' must be an integer between 1 and {MAX_NETWORK_SECONDS}"
        ))),
    }
}

fn tail_arg(args: &Value) -> Result<u64, ErrorDescriptor> {
    let Some(value) = arg(args, "tail")? else {
        return Ok(DEFAULT_LOG_TAIL);
    };
    match value.as_u64() {
        Some(tail) if tail >= 1 => Ok(tail.min(MAX_LOG_TAIL)),
        _ => Err(ErrorDescriptor::invalid_argument(
            "Parameter 'tail' must be a positive integer",
        )),
    }
}

fn levels_arg(args: &Value) -> Result<Vec<String>, ErrorDescriptor> {
    let invalid = || ErrorDescriptor::invalid_argument("Parameter 'levels' must be an array of strings");
    match arg(args, "levels")? {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item.as_str() {
                Some(level) if !level.trim().is_empty() => Ok(level.to_string()),
                _ => Err(invalid()),
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

fn log_query_arg(args: &Value) -> Result<LogQuery, ErrorDescriptor> {
    let range = match (optional_str(args, "from_time")?, optional_str(args, "to_time")?) {
        (Some(from), Some(to)) => Some((from.to_string(), to.to_string())),
        (None, None) => None,
        _ => {
            return Err(ErrorDescriptor::invalid_argument(
                "Parameters 'from_time' and 'to_time' must be given together",
            ))
        }
    };
    Ok(LogQuery {
        range,
        filter: optional_str(args, "filter")?.map(String::from),
        levels: levels_arg(args)?,
    })
}

fn resolve_server<'a>(args: &Value, registry: &'a ServerRegistry) -> Result<&'a ServerHandle, ErrorDescriptor> {
    let name = required_str(args, "server_name")?;
    registry.resolve(name)
}

// ── Fleet handlers ────────────────────────────────────────────────

async fn handle_list_servers(registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let servers: Vec<Value> = registry
        .servers()
        .map(|s| {
            json!({
                "name": s.config.name,
                "netdata_url": s.config.netdata_url,
                "role": s.config.role,
                "description": s.config.description,
                "hardware_notes": s.config.hardware_notes,
                "context": s.config.context(),
            })
        })
        .collect();

    Ok(json!({
        "servers": servers,
        "mikrotik": registry.router_summary().await,
        "dozzle": registry.dozzle_summary(),
    }))
}

/// A fleet entry annotated with the server's context line.
#[derive(Debug, Serialize)]
struct WithContext<T> {
    context: String,
    #[serde(flatten)]
    data: T,
}

async fn handle_overview(registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let results = fleet::query_all(registry.clients(), registry.fan_out(), |client| async move {
        let health = collect::collect_health(client).await?;
        let context = registry
            .resolve(client.server())
            .map(|h| h.config.context())
            .unwrap_or_default();
        Ok::<_, ErrorDescriptor>(WithContext {
            context,
            data: health.snapshot,
        })
    })
    .await?;

    let reachable = results.values().filter(|o| o.is_ok()).count();
    Ok(json!({
        "queried": results.len(),
        "reachable": reachable,
        "servers": results,
    }))
}

async fn handle_server_health(args: &Value, registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let server = resolve_server(args, registry)?;
    let health = collect::collect_health(&server.client).await?;
    Ok(json!({
        "server": server.config.name,
        "context": server.config.context(),
        "hardware_notes": server.config.hardware_notes,
        "health": health,
    }))
}

async fn handle_network_stats(args: &Value, registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let interface = optional_str(args, "interface")?;
    let seconds = seconds_arg(args)?;
    let server = resolve_server(args, registry)?;

    let samples = collect::collect_network(&server.client, interface, seconds).await?;
    Ok(json!({
        "server": server.config.name,
        "context": server.config.context(),
        "seconds": seconds,
        "interfaces": samples,
    }))
}

async fn handle_list_containers(args: &Value, registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let server = resolve_server(args, registry)?;
    let containers = collect::list_containers(&server.client).await?;
    Ok(json!({
        "server": server.config.name,
        "context": server.config.context(),
        "count": containers.len(),
        "containers": containers,
    }))
}

async fn handle_container_stats(args: &Value, registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let container = required_str(args, "container_name")?;
    let server = resolve_server(args, registry)?;
    let info = collect::collect_container(&server.client, container).await?;
    Ok(json!({
        "server": server.config.name,
        "context": server.config.context(),
        "container": info,
    }))
}

// ── Router handlers ───────────────────────────────────────────────

async fn handle_router_interfaces(registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let router = registry.router()?;
    let interfaces = router.interfaces().await?;
    Ok(json!({
        "model": router.model(),
        "count": interfaces.len(),
        "interfaces": interfaces,
    }))
}

async fn handle_router_resources(registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let router = registry.router()?;
    let resources = router.resources().await?;
    Ok(json!({
        "model": router.model(),
        "resources": resources,
    }))
}

async fn handle_router_leases(registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let router = registry.router()?;
    let leases = router.dhcp_leases().await?;
    Ok(json!({
        "model": router.model(),
        "count": leases.len(),
        "leases": leases,
    }))
}

async fn handle_router_traffic(args: &Value, registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let interface = optional_str(args, "interface")?;
    let router = registry.router()?;
    let traffic = router.traffic(interface).await?;
    Ok(json!({
        "model": router.model(),
        "interface": interface,
        "traffic": traffic,
    }))
}

// ── Log handlers ──────────────────────────────────────────────────

async fn handle_dozzle_hosts(registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let dozzle = registry.dozzle()?;
    let containers = dozzle.fetch_containers().await.map_err(|e| e.to_descriptor())?;
    let hosts = normalize::dozzle_hosts(&containers);
    Ok(json!({
        "description": dozzle.description(),
        "host_count": hosts.len(),
        "hosts": hosts,
    }))
}

async fn handle_dozzle_containers(registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let dozzle = registry.dozzle()?;
    let containers: Vec<_> = dozzle
        .fetch_containers()
        .await
        .map_err(|e| e.to_descriptor())?
        .iter()
        .map(normalize::raw_dozzle_to_container)
        .collect();
    Ok(json!({
        "description": dozzle.description(),
        "container_count": containers.len(),
        "containers": containers,
    }))
}

fn describe_query(query: &LogQuery) -> Value {
    let mut described = serde_json::Map::new();
    if let Some((from, to)) = &query.range {
        described.insert("time_range".into(), json!({ "from": from, "to": to }));
    } else {
        described.insert("scope".into(), json!("all available logs"));
    }
    if let Some(filter) = &query.filter {
        described.insert("filter".into(), json!(filter));
    }
    if !query.levels.is_empty() {
        described.insert("levels".into(), json!(query.levels));
    }
    Value::Object(described)
}

async fn handle_dozzle_logs(args: &Value, registry: &ServerRegistry) -> Result<Value, ErrorDescriptor> {
    let wanted = required_str(args, "container_id")?;
    let tail = tail_arg(args)?;
    let query = log_query_arg(args)?;
    let dozzle = registry.dozzle()?;

    // Logs are addressed by host, which only the container list knows.
    let containers = dozzle.fetch_containers().await.map_err(|e| e.to_descriptor())?;
    let container = normalize::find_container(&containers, wanted).ok_or_else(|| {
        ErrorDescriptor::invalid_argument(format!(
            "Unknown container: '{wanted}' (see get_dozzle_containers)"
        ))
    })?;
    let host = container
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            ErrorDescriptor::new(
                ErrorKind::MalformedResponse,
                format!("Dozzle reports no host for container '{}'", container.name),
            )
        })?;

    let lines = dozzle
        .fetch_logs(host, &container.id, &query)
        .await
        .map_err(|e| e.to_descriptor())?;
    let logs = normalize::raw_dozzle_to_logs(&lines, tail as usize);
    let note = (logs.total > logs.lines.len()).then(|| {
        format!(
            "Showing the newest {} of {} lines. Narrow the time range or filter to see older ones.",
            logs.lines.len(),
            logs.total
        )
    });

    Ok(json!({
        "container_id": container.id,
        "container_name": container.name,
        "host_id": host,
        "requested_tail": tail,
        "log_count": logs.lines.len(),
        "total_available": logs.total,
        "query": describe_query(&query),
        "logs": logs.lines,
        "note": note,
    }))
}
