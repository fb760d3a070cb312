// ── Runtime service configuration ──
//
// Tuning knobs for the pipeline and publisher. The config crate builds
// a `ServiceConfig` from files and environment and hands it in; core
// never touches disk.

use std::time::Duration;

/// Runtime configuration for ingestion, views, and broadcasting.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Pause between snapshot broadcasts.
    pub broadcast_interval: Duration,
    /// Nodes and links older than this render as down.
    pub staleness: Duration,
    /// IDS events older than this are hidden from views.
    pub ids_retention: Duration,
    /// How many notifications the notifications view returns.
    pub notification_limit: usize,
    /// Domain suffix stripped from hostnames in per-node traffic labels.
    pub hostname_suffix: String,
    /// Queue depth per subscriber; a full queue drops that push.
    pub subscriber_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: Duration::from_millis(8000),
            staleness: Duration::from_secs(60),
            ids_retention: Duration::from_secs(720 * 3600),
            notification_limit: 50,
            hostname_suffix: ".phxnet.org".into(),
            subscriber_buffer: 16,
        }
    }
}
