// ── Aggregate views ──
//
// Read-only projections over the stored collections, recomputed on
// every broadcast and read request.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::error::CoreError;
use crate::merge::{classify_with_staleness, node_status, parse_timestamp};
use crate::model::{
    Agent, Device, DeviceKind, IdsBundle, IdsEvent, Link, NodeStatus, Notification, TimeSeries,
    TrafficRollup,
};
use crate::store::{Collection, Filter, Repository};

// ── View labels ────────────────────────────────────────────────────

/// Names of the published views, as they appear on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ViewLabel {
    Devices,
    NetworkTopology,
    Traffic,
    Notifications,
    IdsEvents,
}

// ── View shapes ────────────────────────────────────────────────────

/// One row of the flattened inventory: a visible device or an agent
/// with its nested collections cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InventoryRecord {
    Device(Device),
    Agent(Agent),
}

impl InventoryRecord {
    pub fn id(&self) -> &str {
        match self {
            Self::Device(d) => &d.id,
            Self::Agent(a) => a.id(),
        }
    }
}

/// Display record for one topology node, with liveness recomputed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologyNode {
    pub status: NodeStatus,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub mac: String,
    pub ip: String,
    pub hostname: String,
    pub substation_name: Option<String>,
    pub vlan: String,
    pub iface: String,
    pub bandwidth: f64,
    pub last_update: i64,
}

/// Everything drawn for one VLAN.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VlanTopology {
    /// Agents and their visible devices, by id.
    pub nodes: IndexMap<String, TopologyNode>,
    pub links: Vec<Link>,
    /// Agent id -> ids of the devices that agent sees.
    pub visible_devs: IndexMap<String, Vec<String>>,
}

pub type TopologyView = BTreeMap<String, VlanTopology>;

/// Traffic rollups, plus a per-VLAN chart with one point per node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficView {
    pub vlans: IndexMap<String, TrafficRollup>,
    pub nodes: IndexMap<String, TrafficRollup>,
    pub per_node_vlan: IndexMap<String, TrafficRollup>,
}

// ── Builder ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ViewBuilder {
    repo: Repository,
    clock: Arc<dyn Clock>,
    config: Arc<ServiceConfig>,
}

impl ViewBuilder {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>, config: Arc<ServiceConfig>) -> Self {
        Self {
            repo,
            clock,
            config,
        }
    }

    /// Render one view as JSON.
    pub async fn render(&self, label: ViewLabel) -> Result<Value, CoreError> {
        let value = match label {
            ViewLabel::Devices => serde_json::to_value(self.devices().await?),
            ViewLabel::NetworkTopology => serde_json::to_value(self.network_topology().await?),
            ViewLabel::Traffic => serde_json::to_value(self.traffic().await?),
            ViewLabel::Notifications => serde_json::to_value(self.notifications().await?),
            ViewLabel::IdsEvents => serde_json::to_value(self.ids_events().await?),
        };
        value.map_err(|e| CoreError::Internal(format!("encode {label} view: {e}")))
    }

    /// Every agent's visible devices followed by the agent itself, in
    /// store order.
    pub async fn devices(&self) -> Result<Vec<InventoryRecord>, CoreError> {
        let agents = self.agents().await?;
        let mut records = Vec::new();
        for agent in &agents {
            records.extend(
                agent
                    .visible_devices
                    .values()
                    .cloned()
                    .map(InventoryRecord::Device),
            );
            records.push(InventoryRecord::Agent(agent.without_children()));
        }
        Ok(records)
    }

    /// Agents, devices, and links folded per VLAN.
    pub async fn network_topology(&self) -> Result<TopologyView, CoreError> {
        let agents = self.agents().await?;
        let now = self.clock.now_millis();
        let window = self.config.staleness;

        let mut view = TopologyView::new();
        for agent in agents {
            let bucket = view.entry(agent.vlan().to_owned()).or_default();

            bucket.nodes.insert(
                agent.id().to_owned(),
                topology_node(&agent.device, agent.substation_name.clone(), now, window),
            );

            let mut seen = Vec::with_capacity(agent.visible_devices.len());
            for device in agent.visible_devices.values() {
                bucket
                    .nodes
                    .insert(device.id.clone(), topology_node(device, None, now, window));
                seen.push(device.id.clone());
            }
            bucket.visible_devs.insert(agent.id().to_owned(), seen);

            let agent_seen = agent.device.last_update;
            bucket.links.extend(agent.link_data.into_iter().map(|mut link| {
                let observed = parse_timestamp(&link.timestamp)
                    .map_or(agent_seen, |ts| ts.timestamp_millis());
                link.status = classify_with_staleness(link.status, observed, now, window);
                link
            }));
        }
        Ok(view)
    }

    /// VLAN and node rollups with totals recomputed from their series.
    pub async fn traffic(&self) -> Result<TrafficView, CoreError> {
        let vlans: IndexMap<String, TrafficRollup> = self
            .repo
            .all::<TrafficRollup>(Collection::VlanTraffic, &Filter::All)
            .await?
            .into_iter()
            .collect();
        let nodes: IndexMap<String, TrafficRollup> = self
            .repo
            .all::<TrafficRollup>(Collection::NodeTraffic, &Filter::All)
            .await?
            .into_iter()
            .collect();

        let mut per_node_vlan: IndexMap<String, TrafficRollup> = vlans
            .iter()
            .map(|(key, rollup)| {
                let mut chart = rollup.clone();
                chart.time_series = TimeSeries::default();
                (key.clone(), chart)
            })
            .collect();

        for node in nodes.values() {
            let Some(latest) = node.time_series.last_value() else {
                continue;
            };
            let Some(chart) = per_node_vlan.get_mut(&node.vlan) else {
                debug!(vlan = %node.vlan, "node rollup without a vlan rollup");
                continue;
            };
            let hostname = node.hostname.as_deref().unwrap_or_else(|| node.scope.key());
            chart
                .time_series
                .date
                .push(hostname.replacen(&self.config.hostname_suffix, "", 1));
            chart.time_series.value.push(latest);
        }

        Ok(TrafficView {
            vlans: vlans.into_iter().map(|(k, r)| (k, with_series_totals(r))).collect(),
            nodes: nodes.into_iter().map(|(k, r)| (k, with_series_totals(r))).collect(),
            per_node_vlan,
        })
    }

    /// The most recent notifications, oldest first.
    pub async fn notifications(&self) -> Result<Vec<Notification>, CoreError> {
        let mut all: Vec<Notification> = self
            .repo
            .all::<Notification>(Collection::Notifications, &Filter::All)
            .await?
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        let skip = all.len().saturating_sub(self.config.notification_limit);
        Ok(all.split_off(skip))
    }

    /// IDS events inside the retention window, across all agents.
    pub async fn ids_events(&self) -> Result<Vec<IdsEvent>, CoreError> {
        let now_secs = self.clock.now().timestamp();
        let retention = i64::try_from(self.config.ids_retention.as_secs()).unwrap_or(i64::MAX);

        Ok(self
            .repo
            .all::<IdsBundle>(Collection::IdsEvents, &Filter::All)
            .await?
            .into_iter()
            .flat_map(|(_, bundle)| bundle.ids_events)
            .filter(|event| {
                event
                    .last_update
                    .is_some_and(|ts| now_secs.saturating_sub(ts) <= retention)
            })
            .collect())
    }

    async fn agents(&self) -> Result<Vec<Agent>, CoreError> {
        Ok(self
            .repo
            .all::<Agent>(Collection::Agents, &Filter::All)
            .await?
            .into_iter()
            .map(|(_, agent)| agent)
            .collect())
    }
}

fn topology_node(
    device: &Device,
    substation_name: Option<String>,
    now_ms: i64,
    window: std::time::Duration,
) -> TopologyNode {
    TopologyNode {
        status: node_status(device.status, device.last_update, now_ms, window),
        id: device.id.clone(),
        kind: device.kind,
        mac: device.mac.clone(),
        ip: device.ip.clone(),
        hostname: device.hostname.clone(),
        substation_name: substation_name.filter(|_| device.kind == DeviceKind::PhoenixBox),
        vlan: device.vlan.clone(),
        iface: device.iface.clone(),
        bandwidth: device.bandwidth,
        last_update: device.last_update,
    }
}

/// Stored totals are the agent's latest cumulative counters; the view
/// shows the sum of the daily deltas instead.
fn with_series_totals(mut rollup: TrafficRollup) -> TrafficRollup {
    let (rx, tx) = rollup
        .time_series
        .value
        .iter()
        .fold((0u64, 0u64), |(rx, tx), p| {
            (rx.saturating_add(p.rx), tx.saturating_add(p.tx))
        });
    rollup.total_traffic.rx_bytes = rx;
    rollup.total_traffic.tx_bytes = tx;
    rollup
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{Severity, TrafficPoint, TrafficScope, TrafficTotals};
    use crate::schema::{build_ids_bundle, build_ids_event, build_notification};
    use crate::store::MemoryStore;

    fn builder(config: ServiceConfig) -> (ViewBuilder, Repository, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
        ));
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let views = ViewBuilder::new(repo.clone(), clock.clone(), Arc::new(config));
        (views, repo, clock)
    }

    #[test]
    fn labels_round_trip_through_strings() {
        let names: Vec<String> = ViewLabel::iter().map(|l| l.to_string()).collect();
        assert_eq!(
            names,
            ["devices", "network-topology", "traffic", "notifications", "ids-events"]
        );
        assert_eq!(ViewLabel::from_str("ids-events").unwrap(), ViewLabel::IdsEvents);
    }

    #[tokio::test]
    async fn empty_store_gives_empty_views() {
        let (views, _, _) = builder(ServiceConfig::default());
        assert!(views.devices().await.unwrap().is_empty());
        assert!(views.network_topology().await.unwrap().is_empty());
        assert_eq!(views.traffic().await.unwrap(), TrafficView::default());
        assert!(views.notifications().await.unwrap().is_empty());
        assert!(views.ids_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifications_keep_most_recent_ascending() {
        let config = ServiceConfig {
            notification_limit: 3,
            ..ServiceConfig::default()
        };
        let (views, repo, _) = builder(config);
        for i in 0..5 {
            let n = build_notification(format!("n{i}"), Severity::Green, i);
            repo.insert(Collection::Notifications, None, &n).await.unwrap();
        }

        let messages: Vec<String> = views
            .notifications()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(messages, ["n2", "n3", "n4"]);
    }

    #[tokio::test]
    async fn ids_retention_window_is_inclusive() {
        let (views, repo, clock) = builder(ServiceConfig::default());
        let now = clock.now().timestamp();
        let window = 720 * 3600;
        let events = vec![
            build_ids_event(&json!({"last_update": now - window - 1, "sig": "old"}), "v1", "h1"),
            build_ids_event(&json!({"last_update": now - window + 1, "sig": "fresh"}), "v1", "h1"),
            build_ids_event(&json!({"last_update": now - window, "sig": "edge"}), "v1", "h1"),
            build_ids_event(&json!({"sig": "undated"}), "v1", "h1"),
        ];
        let bundle = build_ids_bundle("a1", "v1", events, 0);
        repo.insert(Collection::IdsEvents, Some("a1"), &bundle).await.unwrap();

        let kept: Vec<Value> = views
            .ids_events()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.extra["sig"].clone())
            .collect();
        assert_eq!(kept, [json!("fresh"), json!("edge")]);
    }

    fn rollup(scope: TrafficScope, vlan: &str, hostname: Option<&str>, points: &[(u64, u64)]) -> TrafficRollup {
        TrafficRollup {
            scope,
            vlan: vlan.into(),
            hostname: hostname.map(str::to_owned),
            total_traffic: TrafficTotals {
                rx_bytes: 999,
                tx_bytes: 999,
                ..TrafficTotals::default()
            },
            time_series: TimeSeries {
                date: (0..points.len()).map(|i| format!("3/{}/2024", i + 1)).collect(),
                value: points.iter().map(|&(rx, tx)| TrafficPoint { rx, tx }).collect(),
            },
            last_update: 0,
        }
    }

    #[tokio::test]
    async fn traffic_view_sums_series_and_charts_nodes() {
        let (views, repo, _) = builder(ServiceConfig::default());
        repo.insert(
            Collection::VlanTraffic,
            Some("v1"),
            &rollup(TrafficScope::Vlan("v1".into()), "v1", None, &[(100, 50), (20, 5)]),
        )
        .await
        .unwrap();
        repo.insert(
            Collection::NodeTraffic,
            Some("a1"),
            &rollup(TrafficScope::Node("a1".into()), "v1", Some("box1.phxnet.org"), &[(7, 3), (9, 4)]),
        )
        .await
        .unwrap();

        let view = views.traffic().await.unwrap();

        assert_eq!(view.vlans["v1"].total_traffic.rx_bytes, 120);
        assert_eq!(view.vlans["v1"].total_traffic.tx_bytes, 55);
        assert_eq!(view.nodes["a1"].total_traffic.rx_bytes, 16);

        let chart = &view.per_node_vlan["v1"].time_series;
        assert_eq!(chart.date, ["box1"]);
        assert_eq!(chart.value, [TrafficPoint { rx: 9, tx: 4 }]);
    }
}
