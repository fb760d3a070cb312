// ── Link domain types ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health of a link (or of a visible-device edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkStatus {
    Up,
    Low,
    Down,
}

/// A discovered connection between two endpoints, as reported by one agent.
///
/// Links are ephemeral: every link report replaces the owning agent's
/// whole `link_data`. `id` is only unique within that batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub src_ip: String,
    pub dst_ip: String,
    /// Owning agent id, or the raw IP when unresolved.
    pub src_id: String,
    pub dst_id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Timestamp exactly as the agent sent it.
    #[serde(default)]
    pub timestamp: Value,
    pub status: LinkStatus,
}
