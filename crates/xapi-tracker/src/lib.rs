//! xAPI Tracker - learner progress reporting over xAPI
//!
//! Turns course events into xAPI statements and keeps learner progress in
//! the LRS state API:
//! - Verb and activity resolution for the content hierarchy
//! - Statements with course, lesson and assessment context
//! - Per-collection state load, write-through and reset
//! - Session lifecycle with guaranteed delivery of terminal statements
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Tracker                   │
//! │   (lifecycle signals + domain events)   │
//! └──────────┬───────────────────┬──────────┘
//!            ▼                   ▼
//! ┌───────────────────┐  ┌────────────────┐
//! │ SessionController │◄─│ EventTranslator│
//! └─────────┬─────────┘  └────────────────┘
//!           │
//!    ┌──────┴───────────────┬──────────────┐
//!    ▼                      ▼              ▼
//! ┌──────────────────┐ ┌────────────┐ ┌──────────────┐
//! │ StatementBuilder │ │ StateStore │ │ StatementSink│
//! └──────────────────┘ └─────┬──────┘ └──────┬───────┘
//!                            └──────┬────────┘
//!                                   ▼
//!                         ┌───────────────────┐
//!                         │ Transport (LRS)   │
//!                         └───────────────────┘
//! ```

pub mod activity;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod session;
pub mod signals;
pub mod sink;
pub mod state;
pub mod statement;
pub mod storage;
pub mod tracker;
pub mod transport;
pub mod util;
pub mod verbs;

// Re-export main types for convenience
pub use activity::{ActivityResolver, AssessmentRef, ResolvedActivity};
pub use config::{CoreEvents, FailureBehaviour, TrackerConfig};
pub use content::{ContentNode, ContentTree, CourseTree, NodeKind, ProgressRestorer};
pub use error::{Result, TrackerError};
pub use events::{DomainEvent, EventBus, EventKind, EventTranslator};
pub use session::{CourseProgress, Phase, SessionController};
pub use signals::{Signals, TrackerSignal};
pub use sink::{AsyncSink, KeepaliveSink, StatementSink};
pub use state::{State, StateKey, StateStore};
pub use statement::{CourseVerb, StatementBuilder, TrackingContext};
pub use storage::{KeyValueStore, MemoryStore};
pub use tracker::{Tracker, TrackerBuilder};
pub use transport::{HttpTransport, MockTransport, Transport};
pub use verbs::VerbCatalog;
