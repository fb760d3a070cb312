// ── Agent report ingestion ──
//
// Decodes inbound agent frames and applies them to the store. Every
// report runs under its agent's lock so read-modify-write cycles for
// one agent never interleave.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::merge::{build_links, merge_device_report};
use crate::model::{Agent, IdsBundle, InterfaceReport, NodeStatus};
use crate::registry::AgentRegistry;
use crate::rollup::TrafficRollups;
use crate::schema::{
    bandwidth_or_zero, build_ids_bundle, build_ids_event, build_interface_report, coerce_string,
    is_truthy,
};
use crate::store::{Collection, Filter, KeyedLocks, Repository};

// ── Inbound frames ─────────────────────────────────────────────────

/// A decoded agent report.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReport {
    /// `devices_data`: visible devices keyed by MAC.
    Devices {
        agent_id: String,
        devices: Map<String, Value>,
        agent_bandwidth: f64,
    },
    /// `link_data`: raw link observations.
    Links { agent_id: String, links: Vec<Value> },
    /// `ids_data`: raw IDS events.
    Ids { agent_id: String, events: Vec<Value> },
    /// `iface_data`: interface name -> counters.
    Interfaces { agent_id: String, ifaces: Value },
}

impl AgentReport {
    /// Decode one frame. `Ok(None)` is an unknown message type, which is
    /// ignored; errors mean the frame is dropped.
    pub fn parse(text: &str) -> Result<Option<Self>, CoreError> {
        let frame: Value = serde_json::from_str(text).map_err(|e| CoreError::InvalidInput {
            message: format!("frame is not JSON: {e}"),
        })?;

        let (Some(msg_type), true, true) = (
            frame.get("msg_type").and_then(Value::as_str),
            is_truthy(frame.get("agent_id")),
            is_truthy(frame.get("data")),
        ) else {
            return Err(invalid("frame needs msg_type, agent_id, and data"));
        };
        let agent_id = coerce_string(frame.get("agent_id")).unwrap_or_default();
        let data = frame.get("data").cloned().unwrap_or(Value::Null);

        let report = match msg_type {
            "devices_data" => {
                let Value::Object(devices) = data else {
                    return Err(invalid("devices_data payload must be an object"));
                };
                Self::Devices {
                    agent_id,
                    devices,
                    agent_bandwidth: bandwidth_or_zero(frame.get("agent_bandwidth")),
                }
            }
            "link_data" => Self::Links {
                agent_id,
                links: into_list(data, "link_data")?,
            },
            "ids_data" => Self::Ids {
                agent_id,
                events: into_list(data, "ids_data")?,
            },
            "iface_data" => Self::Interfaces {
                agent_id,
                ifaces: data,
            },
            _ => return Ok(None),
        };
        Ok(Some(report))
    }

    pub fn agent_id(&self) -> &str {
        match self {
            Self::Devices { agent_id, .. }
            | Self::Links { agent_id, .. }
            | Self::Ids { agent_id, .. }
            | Self::Interfaces { agent_id, .. } => agent_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Devices { .. } => "devices_data",
            Self::Links { .. } => "link_data",
            Self::Ids { .. } => "ids_data",
            Self::Interfaces { .. } => "iface_data",
        }
    }
}

fn invalid(message: &str) -> CoreError {
    CoreError::InvalidInput {
        message: message.to_owned(),
    }
}

fn into_list(data: Value, kind: &str) -> Result<Vec<Value>, CoreError> {
    match data {
        Value::Array(list) => Ok(list),
        _ => Err(CoreError::InvalidInput {
            message: format!("{kind} payload must be a list"),
        }),
    }
}

// ── Ingestor ───────────────────────────────────────────────────────

/// Applies agent reports to the store. A devices or links report is
/// proof of life: it marks the agent up, whatever an earlier socket's
/// close recorded.
#[derive(Clone)]
pub struct Ingestor {
    repo: Repository,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
    registry: AgentRegistry,
    rollups: TrafficRollups,
}

impl Ingestor {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        Self {
            registry: AgentRegistry::new(repo.clone(), Arc::clone(&clock), Arc::clone(&locks)),
            rollups: TrafficRollups::new(repo.clone(), Arc::clone(&clock), Arc::clone(&locks)),
            repo,
            clock,
            locks,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Decode and apply one inbound frame. Nothing is returned to the
    /// sender; drops and failures are logged.
    pub async fn handle_text(&self, text: &str, vlan: &str) {
        let report = match AgentReport::parse(text) {
            Ok(Some(report)) => report,
            Ok(None) => {
                debug!(vlan, "ignoring unknown message type");
                return;
            }
            Err(e) => {
                debug!(vlan, error = %e, "dropping agent frame");
                return;
            }
        };

        let agent_id = report.agent_id().to_owned();
        let kind = report.kind();
        if let Err(e) = self.apply(report, vlan).await {
            warn!(agent_id, vlan, kind, error = %e, "agent report dropped");
        }
    }

    /// Apply one decoded report reported on `vlan`.
    pub async fn apply(&self, report: AgentReport, vlan: &str) -> Result<(), CoreError> {
        let _guard = self.locks.agent(report.agent_id()).await;
        let agent = self.load_agent(report.agent_id()).await?;

        match report {
            AgentReport::Devices {
                devices,
                agent_bandwidth,
                ..
            } => self.apply_devices(agent, &devices, agent_bandwidth, vlan).await,
            AgentReport::Links { links, .. } => self.apply_links(agent, &links, vlan).await,
            AgentReport::Ids { events, .. } => self.apply_ids(&agent, &events, vlan).await,
            AgentReport::Interfaces { ifaces, .. } => {
                self.apply_interfaces(&agent, ifaces, vlan).await
            }
        }
    }

    async fn load_agent(&self, agent_id: &str) -> Result<Agent, CoreError> {
        self.repo
            .get::<Agent>(Collection::Agents, agent_id)
            .await?
            .ok_or_else(|| CoreError::AgentNotRegistered {
                agent_id: agent_id.to_owned(),
            })
    }

    async fn apply_devices(
        &self,
        mut agent: Agent,
        devices: &Map<String, Value>,
        agent_bandwidth: f64,
        vlan: &str,
    ) -> Result<(), CoreError> {
        let existing = std::mem::take(&mut agent.visible_devices);
        agent.visible_devices = merge_device_report(existing, devices, vlan);
        agent.device.bandwidth = agent_bandwidth;
        agent.device.status = NodeStatus::Up;
        agent.device.last_update = self.clock.now_millis();

        self.repo
            .replace(Collection::Agents, agent.id(), &agent)
            .await?;
        debug!(agent_id = %agent.id(), devices = agent.visible_devices.len(), "devices merged");
        Ok(())
    }

    async fn apply_links(&self, mut agent: Agent, raw: &[Value], vlan: &str) -> Result<(), CoreError> {
        let vlan_filter = Filter::eq("vlan", vlan);
        let peers = self
            .repo
            .all::<Agent>(Collection::Agents, &vlan_filter)
            .await?;
        let reports: Vec<InterfaceReport> = self
            .repo
            .all::<InterfaceReport>(Collection::InterfaceData, &vlan_filter)
            .await?
            .into_iter()
            .map(|(_, report)| report)
            .collect();
        let agent_ids: HashSet<&str> = peers.iter().map(|(id, _)| id.as_str()).collect();

        agent.link_data = build_links(raw, &agent_ids, &reports);
        agent.device.status = NodeStatus::Up;
        agent.device.last_update = self.clock.now_millis();

        self.repo
            .replace(Collection::Agents, agent.id(), &agent)
            .await?;
        debug!(agent_id = %agent.id(), links = agent.link_data.len(), "links replaced");
        Ok(())
    }

    async fn apply_ids(&self, agent: &Agent, raw: &[Value], vlan: &str) -> Result<(), CoreError> {
        let now = self.clock.now_millis();
        let events: Vec<_> = raw
            .iter()
            .map(|event| build_ids_event(event, vlan, agent.hostname()))
            .collect();
        let added = events.len();

        let bundle = match self
            .repo
            .get::<IdsBundle>(Collection::IdsEvents, agent.id())
            .await?
        {
            Some(mut bundle) => {
                bundle.ids_events.extend(events);
                bundle.last_update = now;
                bundle
            }
            None => build_ids_bundle(agent.id(), vlan, events, now),
        };

        self.repo
            .upsert(Collection::IdsEvents, agent.id(), &bundle)
            .await?;
        debug!(agent_id = %agent.id(), added, total = bundle.ids_events.len(), "ids events stored");
        Ok(())
    }

    async fn apply_interfaces(
        &self,
        agent: &Agent,
        ifaces: Value,
        vlan: &str,
    ) -> Result<(), CoreError> {
        let report = build_interface_report(agent.id(), vlan, ifaces, self.clock.now_millis());
        self.repo
            .upsert(Collection::InterfaceData, agent.id(), &report)
            .await?;

        let vlan_result = self.rollups.rollup_vlan(vlan).await;
        if let Err(e) = &vlan_result {
            warn!(vlan, error = %e, "vlan traffic rollup failed");
        }
        self.rollups.rollup_node(&report, agent.hostname()).await?;
        vlan_result.map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_devices_frame() {
        let text = json!({
            "msg_type": "devices_data",
            "agent_id": "a1",
            "agent_bandwidth": "12.5",
            "data": {"aa:bb": {"ip": "10.0.0.5"}}
        })
        .to_string();
        let report = AgentReport::parse(&text).unwrap().unwrap();

        let AgentReport::Devices {
            agent_id,
            devices,
            agent_bandwidth,
        } = report
        else {
            panic!("expected devices report");
        };
        assert_eq!(agent_id, "a1");
        assert!(devices.contains_key("aa:bb"));
        assert!((agent_bandwidth - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_type_is_ignored() {
        let text = r#"{"msg_type": "hello", "agent_id": "a1", "data": {"x": 1}}"#;
        assert_eq!(AgentReport::parse(text).unwrap(), None);
    }

    #[test]
    fn missing_or_empty_fields_drop_the_frame() {
        for text in [
            r#"{"msg_type": "iface_data", "data": {"x": 1}}"#,
            r#"{"msg_type": "iface_data", "agent_id": "a1"}"#,
            r#"{"msg_type": "iface_data", "agent_id": "", "data": {"x": 1}}"#,
            r#"{"msg_type": "iface_data", "agent_id": "a1", "data": null}"#,
            r#"{"agent_id": "a1", "data": {"x": 1}}"#,
            "not json",
        ] {
            assert!(AgentReport::parse(text).is_err(), "{text}");
        }
    }

    #[test]
    fn list_payloads_must_be_lists() {
        let text = r#"{"msg_type": "link_data", "agent_id": "a1", "data": {"x": 1}}"#;
        assert!(matches!(
            AgentReport::parse(text),
            Err(CoreError::InvalidInput { .. })
        ));
    }
}
