// ── Device and link merge engine ──
//
// Pure functions that fold an agent's reports into its stored record:
// upsert-by-MAC for visible devices, latest-per-pair for links.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::model::{Device, InterfaceReport, Link, LinkStatus, NodeStatus};
use crate::schema::{
    bandwidth_or_zero, build_device, coerce_f64, coerce_i64, coerce_string, hostname_or_ip,
};

// ── Devices ────────────────────────────────────────────────────────

/// Fold one devices report into an agent's visible devices.
///
/// Known MACs are updated in place with whatever fields the report
/// carries; fields the report omits keep their stored value. Unknown
/// MACs are created fresh.
pub fn merge_device_report(
    mut existing: IndexMap<String, Device>,
    incoming: &Map<String, Value>,
    vlan: &str,
) -> IndexMap<String, Device> {
    for (mac, data) in incoming {
        match existing.get_mut(mac) {
            Some(device) => apply_device_update(device, data),
            None => {
                existing.insert(mac.clone(), build_device(mac, data, vlan));
            }
        }
    }
    existing
}

fn apply_device_update(device: &mut Device, data: &Value) {
    if let Some(ip) = coerce_string(data.get("ip")) {
        device.ip = ip;
    }
    if data.get("hostname").is_some() {
        device.hostname = hostname_or_ip(data, &device.ip);
    }
    if data.get("bandwidth").is_some() {
        device.bandwidth = bandwidth_or_zero(data.get("bandwidth"));
    }
    if let Some(iface) = coerce_string(data.get("iface")) {
        device.iface = iface;
    }
    if let Some(ts) = coerce_i64(data.get("last_update")) {
        device.last_update = ts;
    }
    if let Some(ports) = coerce_string(data.get("open_tcp_ports")) {
        device.open_tcp_ports = ports;
    }
    if let Some(ts) = coerce_i64(data.get("last_tcp_update")) {
        device.last_tcp_update = ts;
    }
    if let Some(ports) = coerce_string(data.get("open_udp_ports")) {
        device.open_udp_ports = ports;
    }
    if let Some(ts) = coerce_i64(data.get("last_udp_update")) {
        device.last_udp_update = ts;
    }
}

// ── Links ──────────────────────────────────────────────────────────

/// One link entry as an agent reported it, before identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkObservation {
    pub src_ip: String,
    pub dst_ip: String,
    pub attributes: Map<String, Value>,
    pub timestamp: Value,
}

impl LinkObservation {
    /// Read one raw link entry. `attributes` may arrive as an object or
    /// as a JSON-encoded string; anything else becomes empty.
    pub fn from_raw(raw: &Value) -> Self {
        let attributes = match raw.get("attributes") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(encoded)) => serde_json::from_str(encoded).unwrap_or_default(),
            _ => Map::new(),
        };
        Self {
            src_ip: coerce_string(raw.get("src_ip")).unwrap_or_default(),
            dst_ip: coerce_string(raw.get("dst_ip")).unwrap_or_default(),
            attributes,
            timestamp: raw.get("timestamp").cloned().unwrap_or(Value::Null),
        }
    }

    /// Reported time, if it parses.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    fn link_quality(&self) -> Option<f64> {
        coerce_f64(self.attributes.get("linkQuality"))
    }
}

/// Parse a link timestamp: epoch milliseconds, RFC 3339, or a naive
/// `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC.
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    s.parse::<i64>()
                        .ok()
                        .and_then(DateTime::<Utc>::from_timestamp_millis)
                })
        }
        _ => None,
    }
}

/// Keep only the latest entry per `(src_ip, dst_ip)` pair, in first-seen
/// pair order. On equal timestamps the later entry wins; an unparseable
/// timestamp loses to any parseable one.
pub fn deduplicate_links(raw: Vec<LinkObservation>) -> Vec<LinkObservation> {
    let mut latest: IndexMap<(String, String), LinkObservation> = IndexMap::new();
    for observation in raw {
        let key = (observation.src_ip.clone(), observation.dst_ip.clone());
        match latest.get_mut(&key) {
            Some(kept) if observation.observed_at() >= kept.observed_at() => *kept = observation,
            Some(_) => {}
            None => {
                latest.insert(key, observation);
            }
        }
    }
    latest.into_values().collect()
}

/// Identity of the endpoint owning `ip`: the agent whose interface
/// report lists it, or the raw IP when no known agent does.
pub fn resolve_link_identity(
    ip: &str,
    agent_ids: &HashSet<&str>,
    reports: &[InterfaceReport],
) -> String {
    reports
        .iter()
        .find(|report| report.owns_ip(ip))
        .filter(|report| agent_ids.contains(report.agent_id.as_str()))
        .map_or_else(|| ip.to_owned(), |report| report.agent_id.clone())
}

/// Hash of `src_id` then `dst_id`, suffixed `_1`, `_2`, ... until it is
/// not in `assigned`. The returned id is recorded in `assigned`.
pub fn assign_stable_link_id(assigned: &mut HashSet<String>, src_id: &str, dst_id: &str) -> String {
    let digest = Sha256::new()
        .chain_update(src_id.as_bytes())
        .chain_update(dst_id.as_bytes())
        .finalize();
    let base = hex::encode(&digest[..16]);

    let mut id = base.clone();
    let mut suffix = 1u32;
    while assigned.contains(&id) {
        id = format!("{base}_{suffix}");
        suffix += 1;
    }
    assigned.insert(id.clone());
    id
}

/// Status from link quality alone. Missing or unparseable quality is up.
pub fn classify_link_quality(quality: Option<f64>) -> LinkStatus {
    match quality {
        Some(q) if q < 0.5 => LinkStatus::Down,
        Some(q) if q <= 0.75 => LinkStatus::Low,
        _ => LinkStatus::Up,
    }
}

/// Whether a record last updated at `last_update_ms` is older than `window`.
pub fn is_stale(last_update_ms: i64, now_ms: i64, window: Duration) -> bool {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(last_update_ms) > window_ms
}

/// Link status with liveness applied: stale links are down whatever
/// their quality.
pub fn classify_with_staleness(
    status: LinkStatus,
    last_update_ms: i64,
    now_ms: i64,
    window: Duration,
) -> LinkStatus {
    if is_stale(last_update_ms, now_ms, window) {
        LinkStatus::Down
    } else {
        status
    }
}

/// Node liveness: a node is up only if stored up and not stale.
pub fn node_status(stored: NodeStatus, last_update_ms: i64, now_ms: i64, window: Duration) -> NodeStatus {
    if stored.is_up() && !is_stale(last_update_ms, now_ms, window) {
        NodeStatus::Up
    } else {
        NodeStatus::Down
    }
}

/// Turn a raw link report into the agent's new `link_data`: dedup per
/// pair, resolve endpoint identities, assign batch-unique ids, classify.
pub fn build_links(
    raw: &[Value],
    agent_ids: &HashSet<&str>,
    reports: &[InterfaceReport],
) -> Vec<Link> {
    let observations = raw.iter().map(LinkObservation::from_raw).collect();
    let mut assigned = HashSet::new();

    deduplicate_links(observations)
        .into_iter()
        .map(|obs| {
            let src_id = resolve_link_identity(&obs.src_ip, agent_ids, reports);
            let dst_id = resolve_link_identity(&obs.dst_ip, agent_ids, reports);
            let id = assign_stable_link_id(&mut assigned, &src_id, &dst_id);
            let status = classify_link_quality(obs.link_quality());
            Link {
                id,
                src_ip: obs.src_ip,
                dst_ip: obs.dst_ip,
                src_id,
                dst_id,
                attributes: obs.attributes,
                timestamp: obs.timestamp,
                status,
            }
        })
        .collect()
}
