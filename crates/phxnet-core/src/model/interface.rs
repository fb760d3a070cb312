// ── Interface descriptors and counters ──
//
// Interface payloads are per-vendor JSON blobs. They stay opaque and are
// only picked apart where a specific field (IP lists, byte counters) is
// needed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traffic::TrafficTotals;

/// Registration-time interface descriptor, parsed but uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceDescriptor(pub Value);

impl InterfaceDescriptor {
    /// Stored form: store keys may not contain `.` or `$`, so the blob
    /// is kept as an encoded string.
    pub fn encoded(&self) -> String {
        self.0.to_string()
    }
}

/// Latest per-interface counters reported by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceReport {
    pub agent_id: String,
    pub vlan: String,
    /// Interface name -> counters object.
    pub ifaces_data: Value,
    /// Epoch milliseconds.
    pub last_update: i64,
}

impl InterfaceReport {
    /// Whether any interface lists `ip` among its addresses.
    ///
    /// Agents send the address list either as a JSON array or as a
    /// comma-joined string.
    pub fn owns_ip(&self, ip: &str) -> bool {
        self.interfaces().any(|iface| match iface.get("ip") {
            Some(Value::Array(list)) => list.iter().any(|v| v.as_str() == Some(ip)),
            Some(Value::String(joined)) => joined.split(',').any(|s| s.trim() == ip),
            _ => false,
        })
    }

    /// Sum of the counters across every interface in this report.
    pub fn totals(&self) -> TrafficTotals {
        self.interfaces()
            .map(TrafficTotals::from_counters)
            .fold(TrafficTotals::default(), |acc, t| acc + t)
    }

    fn interfaces(&self) -> impl Iterator<Item = &Value> {
        self.ifaces_data
            .as_object()
            .into_iter()
            .flat_map(|map| map.values())
    }
}
