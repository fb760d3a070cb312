// ── Traffic rollup types ──

use std::ops::Add;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::coerce_u64;

/// Cumulative interface counters, as reported (summed over interfaces).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficTotals {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_dropped: u64,
}

impl TrafficTotals {
    /// Read one interface's counters object. Missing or unparseable
    /// counters count as zero.
    pub fn from_counters(raw: &Value) -> Self {
        Self {
            rx_bytes: coerce_u64(raw.get("rx_bytes")),
            rx_packets: coerce_u64(raw.get("rx_packets")),
            rx_dropped: coerce_u64(raw.get("rx_dropped")),
            tx_bytes: coerce_u64(raw.get("tx_bytes")),
            tx_packets: coerce_u64(raw.get("tx_packets")),
            tx_dropped: coerce_u64(raw.get("tx_dropped")),
        }
    }

    pub fn point(&self) -> TrafficPoint {
        TrafficPoint {
            rx: self.rx_bytes,
            tx: self.tx_bytes,
        }
    }
}

impl Add for TrafficTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            rx_bytes: self.rx_bytes.saturating_add(rhs.rx_bytes),
            rx_packets: self.rx_packets.saturating_add(rhs.rx_packets),
            rx_dropped: self.rx_dropped.saturating_add(rhs.rx_dropped),
            tx_bytes: self.tx_bytes.saturating_add(rhs.tx_bytes),
            tx_packets: self.tx_packets.saturating_add(rhs.tx_packets),
            tx_dropped: self.tx_dropped.saturating_add(rhs.tx_dropped),
        }
    }
}

/// One day's received/transmitted bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPoint {
    pub rx: u64,
    pub tx: u64,
}

impl TrafficPoint {
    /// Elementwise absolute difference.
    pub fn abs_diff(self, other: Self) -> Self {
        Self {
            rx: self.rx.abs_diff(other.rx),
            tx: self.tx.abs_diff(other.tx),
        }
    }
}

/// Daily series. `date[i]` pairs with `value[i]`; dates are `M/D/YYYY`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub date: Vec<String>,
    pub value: Vec<TrafficPoint>,
}

impl TimeSeries {
    /// A series with a single seed point.
    pub fn seeded(date: String, value: TrafficPoint) -> Self {
        Self {
            date: vec![date],
            value: vec![value],
        }
    }

    pub fn len(&self) -> usize {
        self.date.len().min(self.value.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_value(&self) -> Option<TrafficPoint> {
        self.value.last().copied()
    }
}

/// Which track a rollup belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "lowercase")]
pub enum TrafficScope {
    /// Every agent sharing a VLAN, keyed by VLAN name.
    Vlan(String),
    /// One agent, keyed by agent id.
    Node(String),
}

impl TrafficScope {
    pub fn key(&self) -> &str {
        match self {
            Self::Vlan(k) | Self::Node(k) => k,
        }
    }
}

/// Daily traffic rollup for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRollup {
    pub scope: TrafficScope,
    pub vlan: String,
    /// Only set on node rollups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub total_traffic: TrafficTotals,
    pub time_series: TimeSeries,
    /// Epoch milliseconds.
    pub last_update: i64,
}
