// ── Operator notifications ──

use serde::{Deserialize, Serialize};

/// Severity colour tag rendered by viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Green,
    Yellow,
    Red,
}

/// Append-only operator notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Epoch milliseconds.
    pub ts: i64,
    #[serde(rename = "type")]
    pub severity: Severity,
    pub message: String,
}
