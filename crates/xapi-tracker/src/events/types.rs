//! Domain events emitted by the host framework

use lrs_client::{Score, StatementResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::activity::AssessmentRef;
use crate::content::NodeKind;
use crate::state::StateKey;

/// Something that happened in the course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    PageVisited {
        node_id: String,
    },
    MenuVisited {
        node_id: String,
    },
    QuestionAnswered(QuestionInteraction),
    AssessmentCompleted(AssessmentOutcome),
    /// Completion flag of a node changed
    ItemCompleted {
        node_id: String,
        kind: NodeKind,
        is_complete: bool,
    },
    CustomStatement(CustomStatement),
    /// The course as a whole reached a completion status
    TrackingComplete(CompletionData),
    LanguageChanged {
        lang: String,
    },
    StateChanged(StateChange),
}

/// Subscription key of a [`DomainEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PageVisited,
    MenuVisited,
    QuestionAnswered,
    AssessmentCompleted,
    ContentObjectCompleted,
    ArticleCompleted,
    BlockCompleted,
    ComponentCompleted,
    OtherCompleted,
    CustomStatement,
    TrackingComplete,
    LanguageChanged,
    StateChanged,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::PageVisited { .. } => EventKind::PageVisited,
            DomainEvent::MenuVisited { .. } => EventKind::MenuVisited,
            DomainEvent::QuestionAnswered(_) => EventKind::QuestionAnswered,
            DomainEvent::AssessmentCompleted(_) => EventKind::AssessmentCompleted,
            DomainEvent::ItemCompleted { kind, .. } => match kind {
                NodeKind::Menu | NodeKind::Page => EventKind::ContentObjectCompleted,
                NodeKind::Article => EventKind::ArticleCompleted,
                NodeKind::Block => EventKind::BlockCompleted,
                NodeKind::Component => EventKind::ComponentCompleted,
                _ => EventKind::OtherCompleted,
            },
            DomainEvent::CustomStatement(_) => EventKind::CustomStatement,
            DomainEvent::TrackingComplete(_) => EventKind::TrackingComplete,
            DomainEvent::LanguageChanged { .. } => EventKind::LanguageChanged,
            DomainEvent::StateChanged(_) => EventKind::StateChanged,
        }
    }
}

/// A learner's answer to a question component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionInteraction {
    pub node_id: String,
    /// xAPI interaction type, e.g. `choice`
    pub interaction_type: String,
    /// Response as recorded by the host
    pub response: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub is_complete: bool,
    /// Extra interaction definition members (choices, source, target, ...)
    #[serde(default)]
    pub interaction: Map<String, Value>,
}

/// Final state of an assessment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentOutcome {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub article_id: Option<String>,
    #[serde(default)]
    pub page_id: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub score_as_percent: f64,
    pub is_pass: bool,
    #[serde(default)]
    pub is_complete: bool,
}

impl AssessmentOutcome {
    pub fn reference(&self) -> AssessmentRef {
        AssessmentRef {
            id: self.id.clone(),
            article_id: self.article_id.clone(),
            page_id: self.page_id.clone(),
        }
    }

    pub fn result(&self) -> StatementResult {
        StatementResult {
            score: Some(Score {
                scaled: Some(self.score_as_percent / 100.0),
                raw: Some(self.score),
                min: Some(0.0),
                max: Some(self.max_score),
            }),
            success: Some(self.is_pass),
            completion: Some(self.is_complete),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Passed,
    Failed,
    Completed,
}

/// Course completion reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionData {
    pub status: CompletionStatus,
    #[serde(default)]
    pub assessment: Option<AssessmentOutcome>,
}

/// Statement requested by a host plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomStatement {
    /// Catalog verb key
    pub verb: String,
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Component plugin name when the subject is a component
    #[serde(default)]
    pub component: Option<String>,
    /// Derive the object IRI from the id instead of using it verbatim
    #[serde(default)]
    pub generate_iri: bool,
    #[serde(default)]
    pub is_part_of_assessment: bool,
    #[serde(default)]
    pub assessment: Option<AssessmentOutcome>,
    #[serde(default)]
    pub result: Option<StatementResult>,
}

/// New trackable state for a node or a whole collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub key: Option<StateKey>,
    pub value: Value,
}
