//! Host-facing entry point
//!
//! Wires the session controller, event bus and translator together. Hosts
//! feed lifecycle signals and domain events in; statements and state writes
//! come out through the transport.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::content::{ContentTree, ProgressRestorer};
use crate::error::Result;
use crate::events::{DomainEvent, EventBus, EventTranslator};
use crate::session::{Phase, SessionController};
use crate::signals::{Signals, TrackerSignal};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::Transport;
use crate::verbs::VerbCatalog;

/// Builder for [`Tracker`]
pub struct TrackerBuilder {
    config: Arc<TrackerConfig>,
    transport: Arc<dyn Transport>,
    content: Arc<dyn ContentTree>,
    storage: Option<Arc<dyn KeyValueStore>>,
    restorer: Option<Arc<dyn ProgressRestorer>>,
    verbs: Option<Arc<VerbCatalog>>,
}

impl TrackerBuilder {
    /// Key-value store for the learner locale and restored offline storage
    /// (in-memory by default)
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_restorer(mut self, restorer: Arc<dyn ProgressRestorer>) -> Self {
        self.restorer = Some(restorer);
        self
    }

    /// Replace the ADL verb catalog
    pub fn with_verbs(mut self, verbs: Arc<VerbCatalog>) -> Self {
        self.verbs = Some(verbs);
        self
    }

    pub fn build(self) -> Tracker {
        let signals = Signals::new();
        let storage = self.storage.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let mut session = SessionController::new(
            self.config.clone(),
            self.transport,
            self.content,
            storage,
            signals.clone(),
        );
        if let Some(restorer) = self.restorer {
            session = session.with_restorer(restorer);
        }
        if let Some(verbs) = self.verbs {
            session = session.with_verbs(verbs);
        }
        let session = Arc::new(session);

        Tracker {
            translator: Arc::new(EventTranslator::new(self.config.clone(), session.clone())),
            config: self.config,
            session,
            bus: EventBus::new(),
            signals,
        }
    }
}

/// One tracked learner session
pub struct Tracker {
    config: Arc<TrackerConfig>,
    session: Arc<SessionController>,
    translator: Arc<EventTranslator>,
    bus: EventBus,
    signals: Signals,
}

impl Tracker {
    pub fn builder(
        config: Arc<TrackerConfig>,
        transport: Arc<dyn Transport>,
        content: Arc<dyn ContentTree>,
    ) -> TrackerBuilder {
        TrackerBuilder {
            config,
            transport,
            content,
            storage: None,
            restorer: None,
            verbs: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn phase(&self) -> Phase {
        self.session.phase().await
    }

    /// Receive failure and progress signals
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerSignal> {
        self.signals.subscribe()
    }

    /// Host content is ready. Event handlers are registered once the session
    /// has started.
    pub async fn data_ready(&self) -> Result<()> {
        let was_uninitialised = self.session.phase().await == Phase::Uninitialised;
        self.session.data_ready().await?;

        if was_uninitialised && self.session.phase().await.allows_tracking() {
            self.translator.register(&self.bus).await;
            debug!("Event handlers registered");
        }
        Ok(())
    }

    pub async fn visibility_changed(&self, visible: bool) -> Result<()> {
        self.session.visibility_changed(visible).await
    }

    pub async fn unload(&self) -> Result<()> {
        self.session.unload().await
    }

    /// Dispatch one event, then send any deferred statements
    pub async fn dispatch(&self, event: DomainEvent) -> Result<()> {
        self.bus.emit(event).await;
        self.translator.flush_deferred().await
    }

    /// Dispatch events in order; deferred statements are sent after the
    /// whole batch
    pub async fn dispatch_batch(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.bus.emit(event).await;
        }
        self.translator.flush_deferred().await
    }
}
