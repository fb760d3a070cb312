// ── Service facade ──
//
// Wires the registry, ingestion, views, read API, and publisher over
// one shared store and clock.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ReadApi;
use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::ingest::Ingestor;
use crate::publisher::SnapshotPublisher;
use crate::registry::AgentRegistry;
use crate::store::{DocumentStore, MemoryStore, Repository};
use crate::views::ViewBuilder;

/// Every pipeline component over one store.
#[derive(Clone)]
pub struct Service {
    config: Arc<ServiceConfig>,
    ingestor: Ingestor,
    views: ViewBuilder,
    api: ReadApi,
    publisher: Arc<SnapshotPublisher>,
}

impl Service {
    pub fn new(config: ServiceConfig, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(config);
        let repo = Repository::new(store);
        let views = ViewBuilder::new(repo.clone(), Arc::clone(&clock), Arc::clone(&config));
        let publisher = Arc::new(SnapshotPublisher::new(
            views.clone(),
            config.broadcast_interval,
            config.subscriber_buffer,
        ));

        Self {
            ingestor: Ingestor::new(repo, clock),
            api: ReadApi::new(views.clone()),
            views,
            publisher,
            config,
        }
    }

    /// In-memory store, wall clock.
    pub fn in_memory(config: ServiceConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        self.ingestor.registry()
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn views(&self) -> &ViewBuilder {
        &self.views
    }

    pub fn api(&self) -> &ReadApi {
        &self.api
    }

    pub fn publisher(&self) -> &Arc<SnapshotPublisher> {
        &self.publisher
    }

    /// Start the broadcast loop; it stops when `cancel` fires.
    pub fn spawn_publisher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.publisher).run(cancel))
    }
}
