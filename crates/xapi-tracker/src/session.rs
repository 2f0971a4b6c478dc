//! Session lifecycle
//!
//! ```text
//! Uninitialised -> Bootstrapping -> Failed
//!                               \-> Ready -> Active <-> Suspended
//!                                              \           /
//!                                               Terminated
//! ```
//!
//! Completion and termination are read from the phase rather than kept as
//! separate flags. Terminated and Failed are absorbing.

use lrs_client::{Agent, Statement, StatementResult};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{FailureBehaviour, TrackerConfig};
use crate::content::{ContentTree, ProgressRestorer};
use crate::error::{Result, TrackerError};
use crate::signals::{Signals, TrackerSignal};
use crate::sink::{terminal_sink, AsyncSink, StatementSink};
use crate::state::{State, StateKey, StateStore, ID_FIELD};
use crate::statement::{CourseVerb, Elapsed, StatementBuilder, TrackingContext};
use crate::storage::{KeyValueStore, LANG_KEY};
use crate::transport::{LaunchData, Transport};
use crate::verbs::VerbCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialised,
    Bootstrapping,
    /// Identity could not be established; nothing is ever tracked
    Failed,
    /// Identity known, state not yet restored
    Ready,
    Active,
    Suspended,
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Uninitialised => "uninitialised",
            Phase::Bootstrapping => "bootstrapping",
            Phase::Failed => "failed",
            Phase::Ready => "ready",
            Phase::Active => "active",
            Phase::Suspended => "suspended",
            Phase::Terminated => "terminated",
        }
    }

    /// Whether statements and state writes are allowed
    pub fn allows_tracking(&self) -> bool {
        matches!(self, Phase::Ready | Phase::Active | Phase::Suspended)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseProgress {
    InProgress,
    Complete,
}

/// Session and attempt start times
#[derive(Debug, Clone, Copy)]
struct SessionClock {
    session_started: Instant,
    attempt_started: Instant,
}

impl SessionClock {
    fn start() -> Self {
        let now = Instant::now();
        Self {
            session_started: now,
            attempt_started: now,
        }
    }

    fn restart_attempt(&mut self) {
        self.attempt_started = Instant::now();
    }

    fn elapsed(&self) -> Elapsed {
        Elapsed {
            attempt: self.attempt_started.elapsed(),
            session: self.session_started.elapsed(),
        }
    }
}

/// Everything built once identity is known
pub struct SessionRuntime {
    pub context: Arc<TrackingContext>,
    pub builder: StatementBuilder,
    /// Absent when state tracking is disabled
    pub state: Option<Arc<StateStore>>,
    pub async_sink: Arc<dyn StatementSink>,
    /// Keepalive delivery for statements sent during teardown
    pub terminal_sink: Arc<dyn StatementSink>,
}

struct SessionInner {
    phase: Phase,
    progress: CourseProgress,
    clock: SessionClock,
    runtime: Option<Arc<SessionRuntime>>,
}

/// Drives the session through its lifecycle and owns the course statements
/// tied to it
pub struct SessionController {
    config: Arc<TrackerConfig>,
    transport: Arc<dyn Transport>,
    content: Arc<dyn ContentTree>,
    storage: Arc<dyn KeyValueStore>,
    restorer: Option<Arc<dyn ProgressRestorer>>,
    verbs: Arc<VerbCatalog>,
    signals: Signals,
    inner: RwLock<SessionInner>,
}

impl SessionController {
    pub fn new(
        config: Arc<TrackerConfig>,
        transport: Arc<dyn Transport>,
        content: Arc<dyn ContentTree>,
        storage: Arc<dyn KeyValueStore>,
        signals: Signals,
    ) -> Self {
        Self {
            config,
            transport,
            content,
            storage,
            restorer: None,
            verbs: Arc::new(VerbCatalog::adl()),
            signals,
            inner: RwLock::new(SessionInner {
                phase: Phase::Uninitialised,
                progress: CourseProgress::InProgress,
                clock: SessionClock::start(),
                runtime: None,
            }),
        }
    }

    /// Hand restored node state to the host
    pub fn with_restorer(mut self, restorer: Arc<dyn ProgressRestorer>) -> Self {
        self.restorer = Some(restorer);
        self
    }

    pub fn with_verbs(mut self, verbs: Arc<VerbCatalog>) -> Self {
        self.verbs = verbs;
        self
    }

    pub async fn phase(&self) -> Phase {
        self.inner.read().await.phase
    }

    pub async fn progress(&self) -> CourseProgress {
        self.inner.read().await.progress
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Learner language: the stored one, else the configured one
    pub async fn locale(&self) -> String {
        self.storage
            .get_string(LANG_KEY)
            .await
            .unwrap_or_else(|| self.config.lang.clone())
    }

    /// Runtime of a session that may track
    pub async fn runtime(&self) -> Result<Arc<SessionRuntime>> {
        let inner = self.inner.read().await;
        match inner.runtime {
            Some(ref runtime) if inner.phase.allows_tracking() => Ok(runtime.clone()),
            _ => Err(TrackerError::Inactive(format!("session is {}", inner.phase))),
        }
    }

    // === Lifecycle ===

    /// Host content is ready: bootstrap identity and restore state.
    ///
    /// Only the first call does anything. A disabled tracker stays
    /// uninitialised.
    pub async fn data_ready(&self) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            if inner.phase != Phase::Uninitialised {
                debug!(phase = %inner.phase, "Session already started");
                return Ok(());
            }
            if !self.config.enabled {
                info!("Tracking disabled");
                return Ok(());
            }
            inner.phase = Phase::Bootstrapping;
        }

        let runtime = match self.bootstrap().await {
            Ok(runtime) => Arc::new(runtime),
            Err(e) => {
                self.inner.write().await.phase = Phase::Failed;
                error!(error = %e, "Failed to initialise tracking");
                self.signals.emit(TrackerSignal::InitializeFailed {
                    reason: e.to_string(),
                    notify_learner: self.config.lrs_failure_behaviour == FailureBehaviour::Show,
                });
                return Err(e);
            }
        };

        {
            let mut inner = self.inner.write().await;
            inner.phase = Phase::Ready;
            inner.clock = SessionClock::start();
            inner.runtime = Some(runtime.clone());
        }

        if let Some(ref state) = runtime.state {
            match state.load().await {
                Ok(loaded) => self.restore(&loaded).await,
                Err(e) => warn!(error = %e, "State restore failed, starting with empty state"),
            }
        }

        {
            let mut inner = self.inner.write().await;
            // A teardown may have raced the load
            if inner.phase == Phase::Ready {
                inner.phase = Phase::Active;
            }
        }

        info!(
            activity = %runtime.context.activity_id,
            registration = ?runtime.context.registration,
            "Tracking initialised"
        );
        self.signals.emit(TrackerSignal::Initialized);
        Ok(())
    }

    /// Page visibility changed.
    ///
    /// Hiding an active session suspends it, reporting `suspended` unless the
    /// course is complete. Showing a suspended session resumes it.
    pub async fn visibility_changed(&self, visible: bool) -> Result<()> {
        if !self.config.commit_on_visibility_change_hidden {
            return Ok(());
        }

        if visible {
            let (runtime, elapsed) = {
                let mut inner = self.inner.write().await;
                if inner.phase != Phase::Suspended {
                    return Ok(());
                }
                inner.phase = Phase::Active;
                (inner.runtime.clone(), inner.clock.elapsed())
            };
            let Some(runtime) = runtime else {
                return Ok(());
            };

            debug!("Session resumed");
            let statement = self.build_course_statement(&runtime, CourseVerb::Resumed, None, &elapsed).await?;
            return runtime.async_sink.deliver(vec![statement]).await;
        }

        let (runtime, progress, elapsed) = {
            let mut inner = self.inner.write().await;
            if inner.phase != Phase::Active {
                return Ok(());
            }
            inner.phase = Phase::Suspended;
            (inner.runtime.clone(), inner.progress, inner.clock.elapsed())
        };
        let Some(runtime) = runtime else {
            return Ok(());
        };

        debug!("Session suspended");
        if progress == CourseProgress::Complete {
            return Ok(());
        }
        let statement = self.build_course_statement(&runtime, CourseVerb::Suspended, None, &elapsed).await?;
        runtime.terminal_sink.deliver(vec![statement]).await
    }

    /// Page is unloading: report `suspended` (if incomplete) and
    /// `terminated` through the terminal sink.
    ///
    /// Runs at most once.
    pub async fn unload(&self) -> Result<()> {
        let (runtime, progress, elapsed) = {
            let mut inner = self.inner.write().await;
            if !inner.phase.allows_tracking() {
                debug!(phase = %inner.phase, "Unload ignored");
                return Ok(());
            }
            inner.phase = Phase::Terminated;
            (inner.runtime.clone(), inner.progress, inner.clock.elapsed())
        };
        let Some(runtime) = runtime else {
            return Ok(());
        };

        let mut statements = Vec::with_capacity(2);
        if progress == CourseProgress::InProgress {
            statements.push(
                self.build_course_statement(&runtime, CourseVerb::Suspended, None, &elapsed)
                    .await?,
            );
        }
        statements.push(
            self.build_course_statement(&runtime, CourseVerb::Terminated, None, &elapsed)
                .await?,
        );

        info!(count = statements.len(), "Session terminated");
        runtime.terminal_sink.deliver(statements).await
    }

    /// A new language starts a new attempt: stored state is cleared and
    /// `launched` is reported again
    pub async fn change_locale(&self, lang: &str) -> Result<()> {
        self.storage.set(LANG_KEY, Value::String(lang.to_string())).await;

        let runtime = self.runtime().await?;
        info!(lang = %lang, "Language changed, starting a new attempt");

        if let Some(ref state) = runtime.state {
            if let Err(e) = state.clear().await {
                warn!(error = %e, "Failed to clear state for new attempt");
            }
        }

        {
            let mut inner = self.inner.write().await;
            inner.progress = CourseProgress::InProgress;
            inner.clock.restart_attempt();
        }

        let statement = self.course_statement(CourseVerb::Launched, None).await?;
        runtime.async_sink.deliver(vec![statement]).await
    }

    /// The course reached a completion status
    pub async fn mark_complete(&self) {
        self.inner.write().await.progress = CourseProgress::Complete;
    }

    /// Course statement with the duration for the current session
    pub async fn course_statement(
        &self,
        verb: CourseVerb,
        result: Option<StatementResult>,
    ) -> Result<Statement> {
        let runtime = self.runtime().await?;
        let elapsed = self.inner.read().await.clock.elapsed();
        self.build_course_statement(&runtime, verb, result, &elapsed).await
    }

    // === Private Implementation ===

    async fn build_course_statement(
        &self,
        runtime: &SessionRuntime,
        verb: CourseVerb,
        result: Option<StatementResult>,
        elapsed: &Elapsed,
    ) -> Result<Statement> {
        let lang = self.locale().await;
        runtime.builder.course_statement(verb, result, elapsed, &lang)
    }

    async fn bootstrap(&self) -> Result<SessionRuntime> {
        let launch = self.transport.launch().await?;
        let context = Arc::new(self.identify(launch)?);

        let builder = StatementBuilder::new(
            context.clone(),
            self.verbs.clone(),
            self.content.clone(),
            self.config.lang.clone(),
            self.config.generate_ids,
        );

        let state = self.config.track_state.then(|| {
            Arc::new(StateStore::new(
                self.transport.clone(),
                context.state_query(),
                self.signals.clone(),
            ))
        });

        Ok(SessionRuntime {
            context,
            builder,
            state,
            async_sink: Arc::new(AsyncSink::new(self.transport.clone(), self.signals.clone())),
            terminal_sink: terminal_sink(self.transport.clone(), self.signals.clone()),
        })
    }

    /// Validate the launch identity and settle the activity id.
    ///
    /// The activity id is the first non-empty of the launch value, the
    /// configured id, and the base URL.
    fn identify(&self, launch: LaunchData) -> Result<TrackingContext> {
        let actor = launch
            .actor
            .filter(Agent::is_identified)
            .ok_or_else(|| TrackerError::Identity("no identified actor".into()))?;

        let activity_id = [
            launch.activity_id,
            self.config.activity_id.clone(),
            self.config.base_url.clone(),
        ]
        .into_iter()
        .flatten()
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
        .ok_or_else(|| TrackerError::Identity("no activity id".into()))?;

        let registration = if self.config.use_registration {
            launch.registration.filter(|r| !r.is_empty())
        } else {
            None
        };

        Ok(TrackingContext {
            actor,
            activity_id,
            registration,
        })
    }

    /// Push loaded state back into the host
    async fn restore(&self, state: &State) {
        if let Some(Value::Object(stored)) = state.get(StateKey::OfflineStorage) {
            for (key, value) in stored {
                self.storage.set(key, value.clone()).await;
            }
        }

        let Some(ref restorer) = self.restorer else {
            return;
        };

        let mut restored = 0usize;
        for key in [StateKey::Components, StateKey::Blocks] {
            for entry in state.list(key) {
                let Some(id) = entry.get(ID_FIELD).and_then(Value::as_str) else {
                    continue;
                };
                if restorer.restore(id, entry).await {
                    restored += 1;
                } else {
                    warn!(key = %key, id = %id, "Restored state for unknown node");
                }
            }
        }
        debug!(restored, "Progress restored");
    }
}

/// Phase transitions are unit tested here; statement content is covered by
/// the integration tests.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentNode, CourseTree};
    use crate::storage::MemoryStore;
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::time::Duration;

    fn controller(config: TrackerConfig, transport: Arc<MockTransport>) -> SessionController {
        let tree = CourseTree::from_nodes(vec![ContentNode::new("course", "course").with_title("Course")]).unwrap();
        SessionController::new(
            Arc::new(config),
            transport,
            Arc::new(tree),
            Arc::new(MemoryStore::new()),
            Signals::new(),
        )
    }

    fn transport() -> Arc<MockTransport> {
        Arc::new(MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course"))
    }

    #[tokio::test]
    async fn test_data_ready_activates_once() {
        let transport = transport();
        let session = controller(TrackerConfig::default(), transport.clone());

        session.data_ready().await.unwrap();
        assert_eq!(session.phase().await, Phase::Active);

        let gets = transport.calls().await.len();
        session.data_ready().await.unwrap();
        assert_eq!(transport.calls().await.len(), gets);
    }

    #[tokio::test]
    async fn test_disabled_tracker_stays_uninitialised() {
        let transport = transport();
        let config = TrackerConfig {
            enabled: false,
            ..Default::default()
        };
        let session = controller(config, transport.clone());

        session.data_ready().await.unwrap();

        assert_eq!(session.phase().await, Phase::Uninitialised);
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_launch_failure_is_absorbing() {
        let transport = Arc::new(
            MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course")
                .with_launch_error("no actor in launch"),
        );
        let session = controller(TrackerConfig::default(), transport.clone());
        let mut signals = session.signals().subscribe();

        assert!(session.data_ready().await.is_err());
        assert_eq!(session.phase().await, Phase::Failed);
        assert!(matches!(
            signals.try_recv().unwrap(),
            TrackerSignal::InitializeFailed { notify_learner: true, .. }
        ));

        session.unload().await.unwrap();
        assert!(transport.statements().await.is_empty());
        assert!(matches!(session.runtime().await, Err(TrackerError::Inactive(_))));
    }

    #[tokio::test]
    async fn test_missing_activity_id_is_identity_error() {
        let transport = Arc::new(
            MockTransport::new(Agent::mbox("mailto:a@example.com"), "").with_launch(LaunchData {
                actor: Some(Agent::mbox("mailto:a@example.com")),
                activity_id: None,
                registration: None,
            }),
        );
        let session = controller(TrackerConfig::default(), transport);

        let err = session.data_ready().await.unwrap_err();
        assert!(matches!(err, TrackerError::Identity(_)));
    }

    #[tokio::test]
    async fn test_activity_id_falls_back_to_base_url() {
        let transport = Arc::new(
            MockTransport::new(Agent::mbox("mailto:a@example.com"), "").with_launch(LaunchData {
                actor: Some(Agent::mbox("mailto:a@example.com")),
                activity_id: Some("  ".into()),
                registration: Some("reg-1".into()),
            }),
        );
        let config = TrackerConfig {
            base_url: Some("https://courses.example.com/safety/".into()),
            use_registration: false,
            ..Default::default()
        };
        let session = controller(config, transport);

        session.data_ready().await.unwrap();

        let runtime = session.runtime().await.unwrap();
        assert_eq!(runtime.context.activity_id, "https://courses.example.com/safety/");
        assert_eq!(runtime.context.registration, None);
    }

    #[tokio::test]
    async fn test_restore_offline_storage_into_store() {
        let transport = Arc::new(
            MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course")
                .with_state_json(StateKey::OfflineStorage, json!({"lang": "de-DE", "mode": "review"})),
        );
        let session = controller(TrackerConfig::default(), transport);

        session.data_ready().await.unwrap();

        assert_eq!(session.locale().await, "de-DE");
        assert_eq!(session.storage.get_string("mode").await.as_deref(), Some("review"));
    }

    #[tokio::test]
    async fn test_hidden_is_ignored_when_disabled() {
        let transport = transport();
        let config = TrackerConfig {
            commit_on_visibility_change_hidden: false,
            track_state: false,
            ..Default::default()
        };
        let session = controller(config, transport.clone());
        session.data_ready().await.unwrap();

        session.visibility_changed(false).await.unwrap();

        assert_eq!(session.phase().await, Phase::Active);
        assert!(transport.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_suspend_and_resume() {
        let transport = transport();
        let config = TrackerConfig {
            track_state: false,
            ..Default::default()
        };
        let session = controller(config, transport.clone());
        session.data_ready().await.unwrap();

        session.visibility_changed(false).await.unwrap();
        assert_eq!(session.phase().await, Phase::Suspended);

        // Hidden twice is not suspended twice
        session.visibility_changed(false).await.unwrap();

        session.visibility_changed(true).await.unwrap();
        assert_eq!(session.phase().await, Phase::Active);

        assert_eq!(
            transport.verbs().await,
            vec![
                "http://adlnet.gov/expapi/verbs/suspended",
                "http://adlnet.gov/expapi/verbs/resumed"
            ]
        );
    }

    #[test]
    fn test_phase_allows_tracking() {
        assert!(Phase::Ready.allows_tracking());
        assert!(Phase::Suspended.allows_tracking());
        assert!(!Phase::Failed.allows_tracking());
        assert!(!Phase::Terminated.allows_tracking());
        assert!(!Phase::Bootstrapping.allows_tracking());
    }

    #[test]
    fn test_clock_restart_attempt() {
        let mut clock = SessionClock::start();
        std::thread::sleep(Duration::from_millis(5));
        clock.restart_attempt();

        let elapsed = clock.elapsed();
        assert!(elapsed.session >= elapsed.attempt);
        assert!(elapsed.session >= Duration::from_millis(5));
    }
}
