// ── Canonical record construction ──
//
// Pure builders that turn raw agent payloads into stored records. Raw
// payloads are loosely typed (numbers arrive as strings, fields go
// missing), so every builder coerces and fills defaults instead of
// failing. Validation happens before these are called.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::model::{
    Agent, Device, DeviceKind, IdsBundle, IdsEvent, InterfaceReport, Notification, NodeStatus,
    Severity, TimeSeries, TrafficRollup, TrafficScope, TrafficTotals,
};
use crate::registry::AgentHandshake;

// ── Coercion helpers ───────────────────────────────────────────────

/// Render a scalar as a string. `null` and missing become `None`;
/// arrays and objects are JSON-encoded.
pub fn coerce_string(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Parse a number from a JSON number or numeric string.
pub fn coerce_f64(raw: Option<&Value>) -> Option<f64> {
    let n = match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Integer view of a number; fractional values are truncated.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub fn coerce_i64(raw: Option<&Value>) -> Option<i64> {
    match raw? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        other => coerce_f64(Some(other)).map(|f| f as i64),
    }
}

/// Non-negative counter; anything unparseable counts as zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub fn coerce_u64(raw: Option<&Value>) -> u64 {
    match raw {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        other => coerce_f64(other).filter(|f| *f > 0.0).map_or(0, |f| f as u64),
    }
}

/// Whether a value counts as "provided": not missing, null, false,
/// zero, NaN, or the empty string.
pub fn is_truthy(raw: Option<&Value>) -> bool {
    match raw {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Strict integer check: `5` and `5.0` qualify, `5.5` and `"5"` don't.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn as_integer(raw: Option<&Value>) -> Option<i64> {
    let Some(Value::Number(n)) = raw else {
        return None;
    };
    n.as_i64()
        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

// ── Devices and agents ─────────────────────────────────────────────

/// Hostname for a device record: the reported hostname, or the IP
/// when the hostname is missing or empty.
pub(crate) fn hostname_or_ip(raw: &Value, ip: &str) -> String {
    if is_truthy(raw.get("hostname")) {
        coerce_string(raw.get("hostname")).unwrap_or_else(|| ip.to_owned())
    } else {
        ip.to_owned()
    }
}

/// Bandwidth with falsy values collapsed to zero.
pub(crate) fn bandwidth_or_zero(raw: Option<&Value>) -> f64 {
    coerce_f64(raw).unwrap_or(0.0)
}

/// Build a freshly discovered device. Status always starts up.
pub fn build_device(mac: &str, raw: &Value, vlan: &str) -> Device {
    let ip = coerce_string(raw.get("ip")).unwrap_or_default();
    Device {
        id: Uuid::new_v4().simple().to_string(),
        status: NodeStatus::Up,
        kind: DeviceKind::Device,
        mac: mac.to_owned(),
        hostname: hostname_or_ip(raw, &ip),
        ip,
        iface: coerce_string(raw.get("iface")).unwrap_or_default(),
        vlan: vlan.to_owned(),
        bandwidth: bandwidth_or_zero(raw.get("bandwidth")),
        last_update: coerce_i64(raw.get("last_update")).unwrap_or(0),
        registration_ts: coerce_i64(raw.get("registration_ts")).unwrap_or(0),
        open_tcp_ports: coerce_string(raw.get("open_tcp_ports")).unwrap_or_default(),
        last_tcp_update: coerce_i64(raw.get("last_tcp_update")).unwrap_or(0),
        open_udp_ports: coerce_string(raw.get("open_udp_ports")).unwrap_or_default(),
        last_udp_update: coerce_i64(raw.get("last_udp_update")).unwrap_or(0),
    }
}

/// Build the stored record for a newly registered agent.
pub fn build_agent(handshake: &AgentHandshake, now_ms: i64) -> Agent {
    let raw = serde_json::json!({
        "ip": handshake.ip,
        "hostname": handshake.hostname,
    });
    let mut device = build_device(&handshake.mac, &raw, &handshake.vlan);
    device.id.clone_from(&handshake.id);
    device.kind = DeviceKind::PhoenixBox;
    device.iface = handshake.iface.encoded();
    device.last_update = now_ms;
    device.registration_ts = now_ms;

    Agent {
        device,
        substation_name: handshake
            .substation_name
            .clone()
            .filter(|name| !name.is_empty()),
        visible_devices: indexmap::IndexMap::new(),
        link_data: Vec::new(),
    }
}

// ── Notifications ──────────────────────────────────────────────────

pub fn build_notification(message: impl Into<String>, severity: Severity, ts: i64) -> Notification {
    Notification {
        ts,
        severity,
        message: message.into(),
    }
}

// ── Interface data and traffic ─────────────────────────────────────

pub fn build_interface_report(
    agent_id: &str,
    vlan: &str,
    ifaces_data: Value,
    now_ms: i64,
) -> InterfaceReport {
    InterfaceReport {
        agent_id: agent_id.to_owned(),
        vlan: vlan.to_owned(),
        ifaces_data,
        last_update: now_ms,
    }
}

/// First rollup for a scope: a single seed point holding the raw totals.
pub fn build_traffic_rollup(
    totals: TrafficTotals,
    scope: TrafficScope,
    vlan: &str,
    hostname: Option<&str>,
    today: String,
    now_ms: i64,
) -> TrafficRollup {
    TrafficRollup {
        scope,
        vlan: vlan.to_owned(),
        hostname: hostname.map(str::to_owned),
        total_traffic: totals,
        time_series: TimeSeries::seeded(today, totals.point()),
        last_update: now_ms,
    }
}

// ── IDS ────────────────────────────────────────────────────────────

const IDS_KNOWN_FIELDS: [&str; 4] = ["last_update", "blocked_on", "vlan", "phx_box"];

/// Annotate one raw IDS event with its VLAN and reporting agent.
pub fn build_ids_event(raw: &Value, vlan: &str, phx_box: &str) -> IdsEvent {
    let extra: Map<String, Value> = raw
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, _)| !IDS_KNOWN_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    IdsEvent {
        last_update: coerce_i64(raw.get("last_update")),
        blocked_on: as_integer(raw.get("blocked_on")).unwrap_or(0),
        vlan: vlan.to_owned(),
        phx_box: phx_box.to_owned(),
        extra,
    }
}

pub fn build_ids_bundle(
    agent_id: &str,
    vlan: &str,
    ids_events: Vec<IdsEvent>,
    now_ms: i64,
) -> IdsBundle {
    IdsBundle {
        agent_id: agent_id.to_owned(),
        vlan: vlan.to_owned(),
        last_update: now_ms,
        ids_events,
    }
}
