//! Turns domain events into statements and state writes

use lrs_client::{language_map, Activity, ActivityDefinition, Score, Statement, StatementResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::bus::EventBus;
use super::types::*;
use crate::activity::{activity_types, ActivityResolver};
use crate::config::TrackerConfig;
use crate::content::{ContentNode, NodeKind};
use crate::error::{Result, TrackerError};
use crate::session::{SessionController, SessionRuntime};
use crate::statement::CourseVerb;
use crate::util::{process_interaction_response, strip_html};

/// Translates events for one session.
///
/// Assessment and course completion statements are held back and sent by
/// [`flush_deferred`](Self::flush_deferred) after the rest of the batch, so
/// component completions reach the LRS first where it preserves order.
pub struct EventTranslator {
    config: Arc<TrackerConfig>,
    session: Arc<SessionController>,
    deferred: Mutex<Vec<Statement>>,
}

impl EventTranslator {
    pub fn new(config: Arc<TrackerConfig>, session: Arc<SessionController>) -> Self {
        Self {
            config,
            session,
            deferred: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe handlers for the events enabled in configuration
    pub async fn register(self: &Arc<Self>, bus: &EventBus) {
        let events = &self.config.core_events;
        let toggles = [
            (EventKind::MenuVisited, events.router_menu),
            (EventKind::PageVisited, events.router_page),
            (EventKind::QuestionAnswered, events.question_interaction),
            (EventKind::AssessmentCompleted, events.assessment_complete),
            (EventKind::CustomStatement, events.custom_statement),
            (EventKind::ContentObjectCompleted, events.content_objects_complete),
            (EventKind::ArticleCompleted, events.articles_complete),
            (EventKind::BlockCompleted, events.blocks_complete),
            (EventKind::ComponentCompleted, events.components_complete),
            (EventKind::TrackingComplete, true),
            (EventKind::LanguageChanged, true),
            (EventKind::StateChanged, self.config.track_state),
        ];

        for (kind, enabled) in toggles {
            if !enabled {
                continue;
            }
            let translator = Arc::clone(self);
            bus.subscribe(kind, move |event| {
                let translator = translator.clone();
                async move {
                    match translator.handle(event).await {
                        Ok(()) => {}
                        Err(TrackerError::Inactive(reason)) => debug!(kind = ?kind, reason = %reason, "Event ignored"),
                        Err(e) => warn!(kind = ?kind, error = %e, "Failed to handle event"),
                    }
                }
            })
            .await;
        }
    }

    /// Handle one event
    pub async fn handle(&self, event: DomainEvent) -> Result<()> {
        match event {
            DomainEvent::PageVisited { node_id } | DomainEvent::MenuVisited { node_id } => {
                self.on_item_experienced(&node_id).await
            }
            DomainEvent::QuestionAnswered(interaction) => self.on_question_answered(interaction).await,
            DomainEvent::AssessmentCompleted(outcome) => self.on_assessment_completed(&outcome).await,
            DomainEvent::ItemCompleted { node_id, is_complete, .. } => {
                self.on_item_completed(&node_id, is_complete).await
            }
            DomainEvent::CustomStatement(custom) => self.on_custom_statement(custom).await,
            DomainEvent::TrackingComplete(data) => self.on_tracking_complete(&data).await,
            DomainEvent::LanguageChanged { lang } => self.session.change_locale(&lang).await,
            DomainEvent::StateChanged(change) => self.on_state_changed(change).await,
        }
    }

    /// Send statements held back during the current batch
    pub async fn flush_deferred(&self) -> Result<()> {
        let statements = std::mem::take(&mut *self.deferred.lock().await);
        if statements.is_empty() {
            return Ok(());
        }

        let runtime = match self.session.runtime().await {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(dropped = statements.len(), error = %e, "Dropping deferred statements");
                return Err(e);
            }
        };
        debug!(count = statements.len(), "Sending deferred statements");
        runtime.async_sink.deliver(statements).await
    }

    // === Handlers ===

    async fn on_item_experienced(&self, node_id: &str) -> Result<()> {
        let runtime = self.session.runtime().await?;
        let node = lookup(&runtime, node_id)?;
        if node.kind == NodeKind::Course {
            return Ok(());
        }

        let lang = self.session.locale().await;
        let builder = &runtime.builder;
        let mut statement = builder.build("experienced", builder.node_activity(&node, &lang)?, None)?;
        builder.attach_grouping(&mut statement, &node, &lang)?;

        runtime.async_sink.deliver(vec![statement]).await
    }

    async fn on_question_answered(&self, interaction: QuestionInteraction) -> Result<()> {
        let runtime = self.session.runtime().await?;
        let node = lookup(&runtime, &interaction.node_id)?;
        if node.kind != NodeKind::Component {
            debug!(node = %node.id, kind = %node.kind, "Interaction on a non-component ignored");
            return Ok(());
        }
        if self.is_blacklisted(&node) {
            return Ok(());
        }

        let lang = self.session.locale().await;
        let builder = &runtime.builder;

        let mut extra = interaction.interaction;
        localize_descriptions(&mut extra, &lang);

        let object = Activity::new(builder.activities().iri(&node.id, &node.kind)?).with_definition(
            ActivityDefinition {
                name: Some(language_map(&lang, node.name())),
                description: Some(language_map(&lang, strip_html(node.body.as_deref().unwrap_or_default()))),
                activity_type: Some(activity_types::QUESTION.to_string()),
                interaction_type: Some(interaction.interaction_type.clone()),
                extra,
            },
        );

        let result = StatementResult {
            score: Some(Score {
                raw: Some(interaction.score.unwrap_or(0.0)),
                ..Default::default()
            }),
            success: interaction.is_correct,
            completion: Some(interaction.is_complete),
            response: Some(process_interaction_response(
                &interaction.interaction_type,
                &interaction.response,
            )),
            ..Default::default()
        };

        let mut statement = builder.build("answered", object, Some(result))?;
        builder.attach_grouping(&mut statement, &node, &lang)?;

        runtime.async_sink.deliver(vec![statement]).await
    }

    async fn on_assessment_completed(&self, outcome: &AssessmentOutcome) -> Result<()> {
        let runtime = self.session.runtime().await?;
        let lang = self.session.locale().await;
        let builder = &runtime.builder;
        let assessment = outcome.reference();

        let verb = if outcome.is_pass { "passed" } else { "failed" };
        let object = builder.assessment_activity(&assessment, &lang)?;
        let mut statement = builder.build(verb, object, Some(outcome.result()))?;
        builder.attach_assessment_grouping(&mut statement, &assessment, &lang)?;

        self.defer(statement).await;
        Ok(())
    }

    async fn on_item_completed(&self, node_id: &str, is_complete: bool) -> Result<()> {
        // A reset, not a completion
        if !is_complete {
            return Ok(());
        }

        let runtime = self.session.runtime().await?;
        let node = lookup(&runtime, node_id)?;

        // Answered already covers the question
        let events = &self.config.core_events;
        if node.is_question_component() && events.question_interaction && events.components_complete {
            return Ok(());
        }
        if self.is_blacklisted(&node) {
            return Ok(());
        }

        let lang = self.session.locale().await;
        let builder = &runtime.builder;
        let mut statement = builder.build(
            "completed",
            builder.node_activity(&node, &lang)?,
            Some(StatementResult::completed()),
        )?;
        builder.attach_grouping(&mut statement, &node, &lang)?;

        runtime.async_sink.deliver(vec![statement]).await
    }

    async fn on_custom_statement(&self, custom: CustomStatement) -> Result<()> {
        let runtime = self.session.runtime().await?;

        let mut node = ContentNode::new(custom.id.clone(), custom.kind.clone()).with_title(custom.title.clone());
        node.parent_id = custom.parent_id.clone();
        node.component = custom.component.clone();
        node.is_part_of_assessment = custom.is_part_of_assessment;

        if self.is_blacklisted(&node) {
            return Ok(());
        }

        let lang = self.session.locale().await;
        let builder = &runtime.builder;

        let iri = if custom.generate_iri {
            builder.activities().iri(&node.id, &node.kind)?
        } else {
            node.id.clone()
        };
        let object = Activity::new(iri).with_definition(ActivityDefinition {
            name: Some(language_map(&lang, node.name())),
            activity_type: Some(ActivityResolver::activity_type(&node)?),
            ..Default::default()
        });

        let mut statement = builder.build(custom.verb.as_str(), object, custom.result.clone())?;

        if custom.is_part_of_assessment {
            if let Some(ref assessment) = custom.assessment {
                statement.add_parent_activity(builder.assessment_activity(&assessment.reference(), &lang)?);
            }
        }
        builder.attach_grouping(&mut statement, &node, &lang)?;

        runtime.async_sink.deliver(vec![statement]).await
    }

    async fn on_tracking_complete(&self, data: &CompletionData) -> Result<()> {
        let (verb, result) = match (data.status, &data.assessment) {
            (CompletionStatus::Completed, _) => (CourseVerb::Completed, Some(StatementResult::completed())),
            (CompletionStatus::Passed, assessment) => (CourseVerb::Passed, assessment.as_ref().map(|a| a.result())),
            (CompletionStatus::Failed, assessment) => (CourseVerb::Failed, assessment.as_ref().map(|a| a.result())),
        };

        self.session.mark_complete().await;
        let statement = self.session.course_statement(verb, result).await?;
        self.defer(statement).await;
        Ok(())
    }

    async fn on_state_changed(&self, change: StateChange) -> Result<()> {
        let runtime = self.session.runtime().await?;
        let Some(ref state) = runtime.state else {
            return Ok(());
        };

        match (change.node_id, change.key) {
            (Some(node_id), _) => {
                let node = lookup(&runtime, &node_id)?;
                state.record(&node, change.value).await
            }
            (None, Some(key)) => {
                state.apply(key, change.value).await?;
                state.flush(key).await
            }
            (None, None) => Err(TrackerError::Config("state change names neither a node nor a key".into())),
        }
    }

    // === Private Implementation ===

    async fn defer(&self, statement: Statement) {
        self.deferred.lock().await.push(statement);
    }

    fn is_blacklisted(&self, node: &ContentNode) -> bool {
        if node.kind != NodeKind::Component {
            return false;
        }
        let blacklisted = node
            .component
            .as_deref()
            .is_some_and(|c| self.config.is_component_blacklisted(c));
        if blacklisted {
            debug!(node = %node.id, "Component is blacklisted");
        }
        blacklisted
    }
}

fn lookup(runtime: &SessionRuntime, node_id: &str) -> Result<ContentNode> {
    runtime
        .builder
        .content()
        .node(node_id)
        .ok_or_else(|| TrackerError::UnresolvableActivity(node_id.to_string()))
}

/// Lift string `description` members of interaction components into
/// language maps
fn localize_descriptions(definition: &mut Map<String, Value>, lang: &str) {
    for value in definition.values_mut() {
        let Value::Array(items) = value else {
            continue;
        };
        for item in items.iter_mut() {
            let Value::Object(member) = item else {
                continue;
            };
            if let Some(Value::String(text)) = member.get("description") {
                let mut localized = Map::new();
                localized.insert(lang.to_string(), Value::String(text.clone()));
                member.insert("description".to_string(), Value::Object(localized));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CourseTree;
    use crate::signals::Signals;
    use crate::storage::MemoryStore;
    use crate::transport::MockTransport;
    use lrs_client::Agent;
    use serde_json::json;

    #[tokio::test]
    async fn test_deferred_statements_dropped_after_termination() {
        let transport = Arc::new(MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course"));
        let tree = CourseTree::from_nodes(vec![ContentNode::new("course", "course").with_title("Course")]).unwrap();
        let config = Arc::new(TrackerConfig::default());
        let session = Arc::new(SessionController::new(
            config.clone(),
            transport.clone(),
            Arc::new(tree),
            Arc::new(MemoryStore::new()),
            Signals::new(),
        ));
        let translator = EventTranslator::new(config, session.clone());
        session.data_ready().await.unwrap();

        let statement = session.course_statement(CourseVerb::Completed, None).await.unwrap();
        translator.deferred.lock().await.push(statement);
        session.unload().await.unwrap();
        transport.reset().await;

        let result = translator.flush_deferred().await;

        assert!(matches!(result, Err(TrackerError::Inactive(_))));
        assert!(translator.deferred.lock().await.is_empty());
        assert!(transport.statements().await.is_empty());
    }

    #[test]
    fn test_localize_descriptions() {
        let mut definition = json!({
            "choices": [
                {"id": "1", "description": "Red"},
                {"id": "2", "description": {"en-US": "Blue"}}
            ],
            "correctResponsesPattern": ["1"]
        })
        .as_object()
        .cloned()
        .unwrap();

        localize_descriptions(&mut definition, "fr-FR");

        assert_eq!(definition["choices"][0]["description"], json!({"fr-FR": "Red"}));
        assert_eq!(definition["choices"][1]["description"], json!({"en-US": "Blue"}));
        assert_eq!(definition["correctResponsesPattern"], json!(["1"]));
    }
}
