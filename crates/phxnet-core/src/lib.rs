//! Telemetry ingestion and aggregation for phxnet agents.
//!
//! Agents hold a persistent connection per VLAN and stream reports about
//! themselves, the devices they see, the links between them, interface
//! counters, and intrusion-detection events. This crate turns that
//! stream into stored state and periodically published views:
//!
//! - **[`AgentRegistry`]**: registration, identity-change notices, and
//!   liveness on connect/disconnect.
//! - **[`Ingestor`]**: decodes agent frames ([`AgentReport`]) and folds
//!   them into the store through the [`merge`] and [`rollup`] engines,
//!   serialized per agent.
//! - **[`ViewBuilder`]**: device inventory, per-VLAN topology, traffic
//!   charts, notifications, and IDS events.
//! - **[`SnapshotPublisher`]**: pushes every view to joined subscribers
//!   on a fixed interval; [`ReadApi`] serves the same views on request.
//! - **[`DocumentStore`]**: the persistence contract, with the bundled
//!   [`MemoryStore`] backend.
//!
//! [`Service`] wires all of it over one store and clock.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod model;
pub mod publisher;
pub mod registry;
pub mod rollup;
pub mod schema;
pub mod service;
pub mod store;
pub mod views;

// ── Primary re-exports ──────────────────────────────────────────────
pub use api::{ApiReply, ApiResponse, ApiStatus, ReadApi, ReadRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServiceConfig;
pub use error::CoreError;
pub use ingest::{AgentReport, Ingestor};
pub use publisher::{SnapshotPublisher, SubscriberId, Subscription, ViewMessage};
pub use registry::{AgentHandshake, AgentRegistry, Registration, RegistrationOutcome};
pub use rollup::TrafficRollups;
pub use service::Service;
pub use store::{Collection, DocumentStore, Filter, KeyedLocks, MemoryStore, Repository, StoreError};
pub use views::{InventoryRecord, TopologyNode, TopologyView, TrafficView, ViewBuilder, ViewLabel, VlanTopology};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Agent, Device, DeviceKind, IdsBundle, IdsEvent, InterfaceDescriptor, InterfaceReport, Link,
    LinkStatus, NodeStatus, Notification, Severity, TimeSeries, TrafficPoint, TrafficRollup,
    TrafficScope, TrafficTotals,
};
