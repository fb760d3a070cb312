// ── Agent registry ──
//
// Tracks agent identity and liveness. Agents register when their
// connection opens, flip to down when it closes, and are never deleted.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::model::{Agent, InterfaceDescriptor, NodeStatus, Severity};
use crate::schema::{build_agent, build_notification};
use crate::store::{Collection, KeyedLocks, Repository};

/// Connection-time metadata an agent presents when it connects.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentHandshake {
    pub id: String,
    pub hostname: String,
    pub substation_name: Option<String>,
    pub mac: String,
    pub ip: String,
    pub iface: InterfaceDescriptor,
    /// VLAN of the listener the agent connected to.
    pub vlan: String,
}

impl AgentHandshake {
    /// Assemble a handshake from connection metadata (`field` looks up
    /// one named header). The interface descriptor must be a JSON object
    /// or array; anything else rejects the connection.
    pub fn from_metadata<'a>(
        field: impl Fn(&str) -> Option<&'a str>,
        vlan: &str,
    ) -> Result<Self, CoreError> {
        let iface = field("ifaces")
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .filter(|v| v.is_object() || v.is_array())
            .ok_or_else(|| CoreError::InvalidInput {
                message: "interface descriptor is not a valid JSON object".into(),
            })?;

        let text = |name: &str| field(name).unwrap_or_default().trim().to_owned();
        Ok(Self {
            id: text("id"),
            hostname: text("hostname"),
            substation_name: field("substation_name").map(str::to_owned),
            mac: text("mac"),
            ip: text("ip"),
            iface: InterfaceDescriptor(iface),
            vlan: vlan.to_owned(),
        })
    }

    /// Every identity field must be present.
    pub fn validate(&self) -> Result<(), CoreError> {
        let missing: Vec<&str> = [
            ("id", &self.id),
            ("mac", &self.mac),
            ("ip", &self.ip),
            ("hostname", &self.hostname),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidAgentData {
                message: format!("missing {}", missing.join(", ")),
            })
        }
    }
}

/// Whether a registration created the agent or found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Registration {
    New,
    Exists,
}

#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub status: Registration,
    pub record: Agent,
}

/// Describe an identity change, or `None` when mac and ip are unchanged.
pub fn identity_change_message(stored: &Agent, incoming: &AgentHandshake) -> Option<String> {
    let ip_changed = stored.device.ip != incoming.ip;
    let mac_changed = stored.device.mac != incoming.mac;
    let ip_part = || {
        format!(
            "IP address from {} to {}",
            stored.device.ip, incoming.ip
        )
    };
    let mac_part = || {
        format!(
            "MAC address from {} to {}",
            stored.device.mac, incoming.mac
        )
    };

    let change = match (ip_changed, mac_changed) {
        (false, false) => return None,
        (true, false) => ip_part(),
        (false, true) => mac_part(),
        (true, true) => format!("{} and {}", ip_part(), mac_part()),
    };
    Some(format!("Agent {} changed {change}", incoming.id))
}

/// Agent lifecycle: registration, identity-change detection, liveness.
#[derive(Clone)]
pub struct AgentRegistry {
    repo: Repository,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
}

impl AgentRegistry {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>, locks: Arc<KeyedLocks>) -> Self {
        Self { repo, clock, locks }
    }

    /// Register a new agent or refresh an existing one.
    ///
    /// An existing agent whose mac or ip changed is still accepted; the
    /// change is announced as a yellow notification and the stored
    /// identity follows the report.
    pub async fn register_or_touch(
        &self,
        handshake: &AgentHandshake,
    ) -> Result<RegistrationOutcome, CoreError> {
        handshake.validate()?;
        let _guard = self.locks.agent(&handshake.id).await;
        let now = self.clock.now_millis();

        let Some(mut agent) = self
            .repo
            .get::<Agent>(Collection::Agents, &handshake.id)
            .await?
        else {
            let agent = build_agent(handshake, now);
            self.repo
                .insert(Collection::Agents, Some(&handshake.id), &agent)
                .await?;
            info!(agent_id = %handshake.id, vlan = %handshake.vlan, "agent registered");
            self.notify_or_log(format!("{} registered", handshake.hostname), Severity::Green)
                .await;
            return Ok(RegistrationOutcome {
                status: Registration::New,
                record: agent,
            });
        };

        if let Some(message) = identity_change_message(&agent, handshake) {
            warn!(agent_id = %handshake.id, %message, "agent identity changed");
            self.notify_or_log(message, Severity::Yellow).await;
            agent.device.ip.clone_from(&handshake.ip);
            agent.device.mac.clone_from(&handshake.mac);
        }
        agent.device.hostname.clone_from(&handshake.hostname);
        agent.device.vlan.clone_from(&handshake.vlan);
        agent.device.status = NodeStatus::Up;
        agent.device.last_update = now;

        self.repo
            .replace(Collection::Agents, &handshake.id, &agent)
            .await?;
        debug!(agent_id = %handshake.id, "agent reconnected");

        Ok(RegistrationOutcome {
            status: Registration::Exists,
            record: agent,
        })
    }

    /// Mark an agent down after its connection closed.
    ///
    /// Fire-and-forget: failures are logged, never returned.
    pub async fn mark_disconnected(&self, agent_id: &str) {
        let _guard = self.locks.agent(agent_id).await;

        let agent = match self.repo.get::<Agent>(Collection::Agents, agent_id).await {
            Ok(Some(agent)) => agent,
            Ok(None) => {
                warn!(agent_id, "disconnect for unknown agent");
                return;
            }
            Err(e) => {
                warn!(agent_id, error = %e, "failed to load agent on disconnect");
                return;
            }
        };

        self.notify_or_log(
            format!("{} disconnected. It may connect again!", agent.hostname()),
            Severity::Red,
        )
        .await;

        let mut agent = agent;
        agent.device.status = NodeStatus::Down;
        agent.device.last_update = self.clock.now_millis();
        if let Err(e) = self.repo.replace(Collection::Agents, agent_id, &agent).await {
            warn!(agent_id, error = %e, "failed to mark agent down");
        } else {
            info!(agent_id, "agent disconnected");
        }
    }

    /// Append a notification stamped with the current time.
    pub async fn notify(&self, message: String, severity: Severity) -> Result<(), CoreError> {
        let notification = build_notification(message, severity, self.clock.now_millis());
        self.repo
            .insert(Collection::Notifications, None, &notification)
            .await?;
        Ok(())
    }

    async fn notify_or_log(&self, message: String, severity: Severity) {
        if let Err(e) = self.notify(message, severity).await {
            warn!(error = %e, %severity, "failed to store notification");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::model::Notification;
    use crate::store::{Document, DocumentStore, Filter, MemoryStore, Record, StoreError};

    /// Reads and inserts succeed; every update fails.
    #[derive(Default)]
    struct ReadOnlyUpdates {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for ReadOnlyUpdates {
        async fn find_all(&self, c: Collection, f: &Filter) -> Result<Vec<Record>, StoreError> {
            self.inner.find_all(c, f).await
        }

        async fn find_one(&self, c: Collection, key: &str) -> Result<Option<Document>, StoreError> {
            self.inner.find_one(c, key).await
        }

        async fn insert(
            &self,
            c: Collection,
            key: Option<&str>,
            doc: Document,
        ) -> Result<String, StoreError> {
            self.inner.insert(c, key, doc).await
        }

        async fn update(&self, _: Collection, _: &str, _: Document) -> Result<(), StoreError> {
            Err(StoreError::Backend("write timed out".into()))
        }
    }

    fn handshake(mac: &str, ip: &str) -> AgentHandshake {
        AgentHandshake {
            id: "a1".into(),
            hostname: "h1".into(),
            substation_name: None,
            mac: mac.into(),
            ip: ip.into(),
            iface: InterfaceDescriptor(json!({})),
            vlan: "v1".into(),
        }
    }

    fn registry() -> (AgentRegistry, Repository, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
        ));
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let reg = AgentRegistry::new(repo.clone(), clock.clone(), Arc::new(KeyedLocks::new()));
        (reg, repo, clock)
    }

    async fn notifications(repo: &Repository) -> Vec<Notification> {
        repo.all::<Notification>(Collection::Notifications, &Filter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|(_, n)| n)
            .collect()
    }

    #[tokio::test]
    async fn second_registration_is_quiet() {
        let (reg, repo, _) = registry();
        let first = reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();
        let second = reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();

        assert_eq!(first.status, Registration::New);
        assert_eq!(second.status, Registration::Exists);
        assert_eq!(notifications(&repo).await.len(), 1);
    }

    #[tokio::test]
    async fn ip_change_emits_one_yellow_notification() {
        let (reg, repo, _) = registry();
        reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();
        reg.register_or_touch(&handshake("00:11", "10.0.0.9")).await.unwrap();

        let notes = notifications(&repo).await;
        let yellow: Vec<_> = notes.iter().filter(|n| n.severity == Severity::Yellow).collect();
        assert_eq!(yellow.len(), 1);
        assert!(yellow[0].message.contains("10.0.0.1"));
        assert!(yellow[0].message.contains("10.0.0.9"));

        let stored: Agent = repo.get(Collection::Agents, "a1").await.unwrap().unwrap();
        assert_eq!(stored.device.ip, "10.0.0.9");
    }

    #[tokio::test]
    async fn mac_and_ip_change_cites_both() {
        let (reg, repo, _) = registry();
        reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();
        reg.register_or_touch(&handshake("00:22", "10.0.0.2")).await.unwrap();

        let notes = notifications(&repo).await;
        let msg = &notes.last().unwrap().message;
        assert!(msg.contains("from 10.0.0.1 to 10.0.0.2"));
        assert!(msg.contains("from 00:11 to 00:22"));
    }

    #[tokio::test]
    async fn missing_identity_fields_are_rejected() {
        let (reg, repo, _) = registry();
        let mut bad = handshake("", "10.0.0.1");
        bad.hostname.clear();

        let err = reg.register_or_touch(&bad).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidAgentData { .. }));
        assert!(err.to_string().contains("mac"));
        assert!(err.to_string().contains("hostname"));
        assert!(repo.get::<Agent>(Collection::Agents, "a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disconnect_marks_down_and_notifies_red() {
        let (reg, repo, clock) = registry();
        reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();
        clock.advance(chrono::Duration::seconds(30));

        reg.mark_disconnected("a1").await;

        let stored: Agent = repo.get(Collection::Agents, "a1").await.unwrap().unwrap();
        assert_eq!(stored.device.status, NodeStatus::Down);
        assert_eq!(stored.device.last_update, clock.now_millis());

        let last = notifications(&repo).await.pop().unwrap();
        assert_eq!(last.severity, Severity::Red);
        assert_eq!(last.message, "h1 disconnected. It may connect again!");
    }

    #[tokio::test]
    async fn reconnect_brings_agent_back_up() {
        let (reg, repo, _) = registry();
        reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();
        reg.mark_disconnected("a1").await;
        reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();

        let stored: Agent = repo.get(Collection::Agents, "a1").await.unwrap().unwrap();
        assert_eq!(stored.device.status, NodeStatus::Up);
    }

    #[tokio::test]
    async fn disconnect_swallows_store_failures() {
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
        ));
        let repo = Repository::new(Arc::new(ReadOnlyUpdates::default()));
        let reg = AgentRegistry::new(repo.clone(), clock, Arc::new(KeyedLocks::new()));
        reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();

        reg.mark_disconnected("a1").await;
        reg.mark_disconnected("never-registered").await;

        let stored: Agent = repo.get(Collection::Agents, "a1").await.unwrap().unwrap();
        assert_eq!(stored.device.status, NodeStatus::Up);
        let last = notifications(&repo).await.pop().unwrap();
        assert_eq!(last.severity, Severity::Red);
    }

    #[tokio::test]
    async fn reconnect_on_another_vlan_moves_the_agent() {
        let (reg, repo, _) = registry();
        reg.register_or_touch(&handshake("00:11", "10.0.0.1")).await.unwrap();

        let mut moved = handshake("00:11", "10.0.0.1");
        moved.vlan = "v2".into();
        let outcome = reg.register_or_touch(&moved).await.unwrap();
        assert_eq!(outcome.status, Registration::Exists);

        let stored: Agent = repo.get(Collection::Agents, "a1").await.unwrap().unwrap();
        assert_eq!(stored.vlan(), "v2");
        assert_eq!(notifications(&repo).await.len(), 1);
    }

    #[test]
    fn handshake_rejects_malformed_descriptor() {
        let headers: HashMap<&str, &str> = HashMap::from([
            ("id", "a1"),
            ("hostname", "h1"),
            ("mac", "00:11"),
            ("ip", "10.0.0.1"),
            ("ifaces", "{not json"),
        ]);
        let err = AgentHandshake::from_metadata(|k| headers.get(k).copied(), "v1").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
    }

    #[test]
    fn handshake_parses_descriptor() {
        let headers: HashMap<&str, &str> = HashMap::from([
            ("id", "a1"),
            ("hostname", "h1"),
            ("substation_name", "north"),
            ("mac", "00:11"),
            ("ip", "10.0.0.1"),
            ("ifaces", r#"{"eth0": {"ip": ["10.0.0.1"]}}"#),
        ]);
        let hs = AgentHandshake::from_metadata(|k| headers.get(k).copied(), "v1").unwrap();
        assert_eq!(hs.vlan, "v1");
        assert_eq!(hs.substation_name.as_deref(), Some("north"));
        assert!(hs.validate().is_ok());
        assert_eq!(hs.iface.0["eth0"]["ip"][0], "10.0.0.1");
    }
}
