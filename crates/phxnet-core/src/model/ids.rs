// ── Intrusion-detection events ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One IDS event, annotated with the VLAN and the agent that saw it.
///
/// Fields the agent sends beyond the ones we interpret are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdsEvent {
    /// Unix seconds; events without one are never shown.
    #[serde(default)]
    pub last_update: Option<i64>,
    #[serde(default)]
    pub blocked_on: i64,
    pub vlan: String,
    pub phx_box: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// All IDS events reported by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdsBundle {
    pub agent_id: String,
    pub vlan: String,
    /// Epoch milliseconds.
    pub last_update: i64,
    pub ids_events: Vec<IdsEvent>,
}
