// ── Snapshot publisher ──
//
// Periodically recomputes every view and pushes it to all active
// subscribers. Each subscriber owns a bounded queue; a full or closed
// queue only costs that subscriber its copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::views::{ViewBuilder, ViewLabel};

/// One labelled view, as pushed to subscribers: `{"event": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewMessage {
    pub event: ViewLabel,
    pub data: Value,
}

impl ViewMessage {
    pub fn to_text(&self) -> String {
        // A struct of a unit enum and a Value always encodes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A joined subscriber's end of the feed.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub messages: mpsc::Receiver<Arc<ViewMessage>>,
}

pub struct SnapshotPublisher {
    views: ViewBuilder,
    subscribers: DashMap<SubscriberId, mpsc::Sender<Arc<ViewMessage>>>,
    next_id: AtomicU64,
    interval: Duration,
    buffer: usize,
}

impl SnapshotPublisher {
    pub fn new(views: ViewBuilder, interval: Duration, buffer: usize) -> Self {
        Self {
            views,
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            interval,
            buffer: buffer.max(1),
        }
    }

    /// Add a subscriber. Nothing is pushed until the next broadcast.
    pub fn join(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, tx);
        debug!(subscriber = %id, "subscriber joined");
        Subscription { id, messages: rx }
    }

    pub fn leave(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber = %id, "subscriber left");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Recompute every view and push each to every subscriber. Returns
    /// the number of messages queued.
    ///
    /// A view that fails to render is skipped for this cycle only.
    pub async fn broadcast_once(&self) -> usize {
        if self.subscribers.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for label in ViewLabel::iter() {
            let data = match self.views.render(label).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(view = %label, error = %e, "view recompute failed, skipping");
                    continue;
                }
            };
            delivered += self.push(&Arc::new(ViewMessage { event: label, data }));
        }
        delivered
    }

    fn push(&self, message: &Arc<ViewMessage>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        for entry in &self.subscribers {
            match entry.value().try_send(Arc::clone(message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = %entry.key(), view = %message.event, "subscriber queue full, dropping");
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }
        for id in closed {
            self.leave(id);
        }
        delivered
    }

    /// Sleep, broadcast, repeat until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval = ?self.interval, "snapshot publisher started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {
                    let sent = self.broadcast_once().await;
                    if sent > 0 {
                        debug!(sent, subscribers = self.subscriber_count(), "snapshot broadcast");
                    }
                }
            }
        }
        self.subscribers.clear();
        info!("snapshot publisher stopped");
    }
}
