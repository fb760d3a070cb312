// ── Traffic rollup engine ──
//
// Turns cumulative interface counters into a daily delta series. Two
// tracks run per interface report: one per VLAN (all agents on it) and
// one per node.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::model::{InterfaceReport, TimeSeries, TrafficRollup, TrafficScope, TrafficTotals};
use crate::schema::build_traffic_rollup;
use crate::store::{Collection, Filter, KeyedLocks, Repository};

/// Series key for the UTC calendar day of `now`, e.g. `3/5/2024`.
pub fn today_key(now: DateTime<Utc>) -> String {
    now.format("%-m/%-d/%Y").to_string()
}

/// Fold the latest cumulative totals into a series for `today`.
///
/// - today absent: append `|totals - last point|`
/// - today is the first point: overwrite it with the raw totals
/// - today at a later index: overwrite with `|totals - previous point|`
pub fn rollup_time_series(totals: TrafficTotals, series: &mut TimeSeries, today: &str) {
    let len = series.len();
    series.date.truncate(len);
    series.value.truncate(len);

    let current = totals.point();
    match series.date.iter().position(|d| d == today) {
        None => {
            let value = series
                .last_value()
                .map_or(current, |last| current.abs_diff(last));
            series.date.push(today.to_owned());
            series.value.push(value);
        }
        Some(0) => series.value[0] = current,
        Some(idx) => series.value[idx] = current.abs_diff(series.value[idx - 1]),
    }
}

/// Apply new totals to a prior rollup, or seed a new one.
pub fn apply_rollup(
    prior: Option<TrafficRollup>,
    totals: TrafficTotals,
    scope: TrafficScope,
    vlan: &str,
    hostname: Option<&str>,
    now: DateTime<Utc>,
) -> TrafficRollup {
    let today = today_key(now);
    let now_ms = now.timestamp_millis();

    let Some(mut rollup) = prior else {
        return build_traffic_rollup(totals, scope, vlan, hostname, today, now_ms);
    };
    rollup_time_series(totals, &mut rollup.time_series, &today);
    rollup.total_traffic = totals;
    rollup.last_update = now_ms;
    if let Some(hostname) = hostname {
        rollup.hostname = Some(hostname.to_owned());
    }
    rollup
}

/// Persists the VLAN and node rollup tracks.
#[derive(Clone)]
pub struct TrafficRollups {
    repo: Repository,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
}

impl TrafficRollups {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>, locks: Arc<KeyedLocks>) -> Self {
        Self { repo, clock, locks }
    }

    /// Recompute a VLAN's rollup from every interface report on it.
    pub async fn rollup_vlan(&self, vlan: &str) -> Result<TrafficRollup, CoreError> {
        let _guard = self.locks.vlan(vlan).await;

        let totals = self
            .repo
            .all::<InterfaceReport>(Collection::InterfaceData, &Filter::eq("vlan", vlan))
            .await?
            .iter()
            .map(|(_, report)| report.totals())
            .fold(TrafficTotals::default(), |acc, t| acc + t);

        self.store(Collection::VlanTraffic, TrafficScope::Vlan(vlan.to_owned()), vlan, None, totals)
            .await
    }

    /// Recompute one agent's rollup from its own interface report.
    /// The caller holds the agent's lock.
    pub async fn rollup_node(
        &self,
        report: &InterfaceReport,
        hostname: &str,
    ) -> Result<TrafficRollup, CoreError> {
        self.store(
            Collection::NodeTraffic,
            TrafficScope::Node(report.agent_id.clone()),
            &report.vlan,
            Some(hostname),
            report.totals(),
        )
        .await
    }

    async fn store(
        &self,
        collection: Collection,
        scope: TrafficScope,
        vlan: &str,
        hostname: Option<&str>,
        totals: TrafficTotals,
    ) -> Result<TrafficRollup, CoreError> {
        let key = scope.key().to_owned();
        let prior = self.repo.get::<TrafficRollup>(collection, &key).await?;
        let rollup = apply_rollup(prior, totals, scope, vlan, hostname, self.clock.now());
        self.repo.upsert(collection, &key, &rollup).await?;
        debug!(%collection, key, points = rollup.time_series.len(), "traffic rollup stored");
        Ok(rollup)
    }
}
