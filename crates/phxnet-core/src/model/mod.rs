// ── Canonical domain model ──
//
// Every type in this module is the stored (and published) shape of a
// record. Raw agent payloads are normalized into these types by
// `crate::schema`; nothing else in the crate reads raw JSON.

pub mod device;
pub mod ids;
pub mod interface;
pub mod link;
pub mod notification;
pub mod traffic;

// ── Re-exports ──────────────────────────────────────────────────────

pub use device::{Agent, Device, DeviceKind, NodeStatus};
pub use ids::{IdsBundle, IdsEvent};
pub use interface::{InterfaceDescriptor, InterfaceReport};
pub use link::{Link, LinkStatus};
pub use notification::{Notification, Severity};
pub use traffic::{TrafficPoint, TimeSeries, TrafficRollup, TrafficScope, TrafficTotals};
