// ── Device and agent domain types ──

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::link::Link;

/// What kind of endpoint a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// A device discovered by an agent but not reporting itself.
    Device,
    /// A reporting agent.
    #[serde(rename = "Phoenix Box")]
    PhoenixBox,
}

/// Liveness of a node (agent or visible device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeStatus {
    Up,
    Down,
}

impl NodeStatus {
    pub fn is_up(self) -> bool {
        matches!(self, Self::Up)
    }
}

/// A network endpoint as stored in an agent's `visible_devices` map.
///
/// Identity within an agent is the MAC address; `id` is a generated
/// identifier so the same MAC seen by two agents still renders as two
/// distinct nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub status: NodeStatus,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub mac: String,
    pub ip: String,
    pub hostname: String,
    pub iface: String,
    pub vlan: String,
    pub bandwidth: f64,
    /// Epoch milliseconds.
    pub last_update: i64,
    /// Epoch milliseconds.
    pub registration_ts: i64,
    pub open_tcp_ports: String,
    pub last_tcp_update: i64,
    pub open_udp_ports: String,
    pub last_udp_update: i64,
}

/// A registered reporting agent ("node", "Phoenix Box").
///
/// Shares every device field, plus the state only agents own. Agents
/// are never deleted; disconnects flip `status` to down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub device: Device,
    #[serde(default)]
    pub substation_name: Option<String>,
    /// Discovered devices keyed by MAC, in first-seen order.
    #[serde(default)]
    pub visible_devices: IndexMap<String, Device>,
    /// Latest link snapshot, one entry per (src_ip, dst_ip) pair.
    #[serde(default)]
    pub link_data: Vec<Link>,
}

impl Agent {
    pub fn id(&self) -> &str {
        &self.device.id
    }

    pub fn hostname(&self) -> &str {
        &self.device.hostname
    }

    pub fn vlan(&self) -> &str {
        &self.device.vlan
    }

    /// Copy of this agent with the nested collections emptied, as shown
    /// in flattened inventory views.
    pub fn without_children(&self) -> Self {
        Self {
            device: self.device.clone(),
            substation_name: self.substation_name.clone(),
            visible_devices: IndexMap::new(),
            link_data: Vec::new(),
        }
    }
}
