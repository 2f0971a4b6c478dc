//! Statement assembly
//!
//! Builds statements for the tracked learner and attaches context
//! activities from the content hierarchy.

use chrono::Utc;
use lrs_client::{Activity, Agent, Context, Statement, StatementResult};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::activity::{ActivityResolver, AssessmentRef};
use crate::content::{ContentNode, ContentTree, NodeKind};
use crate::error::{Result, TrackerError};
use crate::util::iso8601_duration;
use crate::verbs::{VerbCatalog, VerbRef};

/// Identity every statement and state call is made for
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingContext {
    pub actor: Agent,
    pub activity_id: String,
    /// Present only when registrations are in use
    pub registration: Option<String>,
}

impl TrackingContext {
    pub fn state_query(&self) -> lrs_client::StateQuery {
        lrs_client::StateQuery {
            activity_id: self.activity_id.clone(),
            agent: self.actor.clone(),
            registration: self.registration.clone(),
        }
    }
}

/// Verbs used for statements about the course itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseVerb {
    Launched,
    Initialized,
    Attempted,
    Completed,
    Passed,
    Failed,
    Suspended,
    Resumed,
    Terminated,
}

impl CourseVerb {
    pub fn key(&self) -> &'static str {
        match self {
            CourseVerb::Launched => "launched",
            CourseVerb::Initialized => "initialized",
            CourseVerb::Attempted => "attempted",
            CourseVerb::Completed => "completed",
            CourseVerb::Passed => "passed",
            CourseVerb::Failed => "failed",
            CourseVerb::Suspended => "suspended",
            CourseVerb::Resumed => "resumed",
            CourseVerb::Terminated => "terminated",
        }
    }

    /// Duration reported in the result, if the verb carries one
    fn duration(&self, elapsed: &Elapsed) -> Option<Duration> {
        match self {
            CourseVerb::Launched | CourseVerb::Initialized | CourseVerb::Attempted => Some(Duration::ZERO),
            CourseVerb::Failed | CourseVerb::Passed | CourseVerb::Suspended => Some(elapsed.attempt),
            CourseVerb::Terminated => Some(elapsed.session),
            CourseVerb::Completed | CourseVerb::Resumed => None,
        }
    }
}

/// Time spent in the current attempt and session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Elapsed {
    pub attempt: Duration,
    pub session: Duration,
}

/// Builds statements for one tracking context
pub struct StatementBuilder {
    context: Arc<TrackingContext>,
    verbs: Arc<VerbCatalog>,
    activities: ActivityResolver,
    content: Arc<dyn ContentTree>,
    statement_lang: String,
    generate_ids: bool,
}

impl StatementBuilder {
    pub fn new(
        context: Arc<TrackingContext>,
        verbs: Arc<VerbCatalog>,
        content: Arc<dyn ContentTree>,
        statement_lang: impl Into<String>,
        generate_ids: bool,
    ) -> Self {
        let activities = ActivityResolver::new(context.activity_id.clone());
        Self {
            context,
            verbs,
            activities,
            content,
            statement_lang: statement_lang.into(),
            generate_ids,
        }
    }

    pub fn context(&self) -> &TrackingContext {
        &self.context
    }

    pub fn activities(&self) -> &ActivityResolver {
        &self.activities
    }

    pub fn content(&self) -> &dyn ContentTree {
        self.content.as_ref()
    }

    /// Build a statement about `object`.
    ///
    /// An empty result is dropped.
    pub fn build<'a>(
        &self,
        verb: impl Into<VerbRef<'a>>,
        object: Activity,
        result: Option<StatementResult>,
    ) -> Result<Statement> {
        let verb = self.verbs.resolve(verb, &self.statement_lang)?;
        let mut statement = Statement::new(self.context.actor.clone(), verb, object);
        statement.timestamp = Some(Utc::now());

        statement.result = result.filter(|r| !r.is_empty());

        if let Some(ref registration) = self.context.registration {
            statement.context = Some(Context {
                registration: Some(registration.clone()),
                context_activities: None,
            });
        }

        if self.generate_ids {
            statement.id = Some(Uuid::new_v4().to_string());
        }

        Ok(statement)
    }

    /// The course as an activity, named in `lang`
    pub fn course_activity(&self, lang: &str) -> Activity {
        let course = self
            .content
            .course()
            .unwrap_or_else(|| ContentNode::new("course", NodeKind::Course));

        match self.activities.resolve(&course, lang) {
            Ok(resolved) => resolved.into_activity(),
            Err(_) => Activity::new(self.context.activity_id.clone()),
        }
    }

    /// Build a statement about the course, adding the duration the verb
    /// reports to `result`
    pub fn course_statement(
        &self,
        verb: CourseVerb,
        result: Option<StatementResult>,
        elapsed: &Elapsed,
        lang: &str,
    ) -> Result<Statement> {
        let mut result = result.unwrap_or_default();
        if let Some(duration) = verb.duration(elapsed) {
            result.duration = Some(iso8601_duration(duration.as_millis() as i64));
        }

        self.build(verb.key(), self.course_activity(lang), Some(result))
    }

    /// Activity for a content node, named in `lang`
    pub fn node_activity(&self, node: &ContentNode, lang: &str) -> Result<Activity> {
        Ok(self.activities.resolve(node, lang)?.into_activity())
    }

    /// Lesson activity for a page
    pub fn lesson_activity(&self, page: &ContentNode, lang: &str) -> Result<Activity> {
        let mut resolved = self.activities.resolve(page, lang)?;
        resolved.activity_type = crate::activity::activity_types::LESSON.to_string();
        Ok(resolved.into_activity())
    }

    /// Activity for an assessment pseudo-node
    pub fn assessment_activity(&self, assessment: &AssessmentRef, lang: &str) -> Result<Activity> {
        Ok(self.activities.resolve_assessment(assessment, lang)?.into_activity())
    }

    /// Attach context activities for `node`.
    ///
    /// Non-course nodes are grouped under the course; articles, blocks and
    /// components also under their page. A question component inside an
    /// enabled assessment gets the assessment as parent.
    pub fn attach_grouping(&self, statement: &mut Statement, node: &ContentNode, lang: &str) -> Result<()> {
        if node.kind == NodeKind::Course {
            return Ok(());
        }

        statement.add_grouping_activity(self.course_activity(lang));

        if matches!(node.kind, NodeKind::Article | NodeKind::Block | NodeKind::Component) {
            let page = self.content.find_ancestor(node, &NodeKind::Page).ok_or_else(|| {
                TrackerError::UnresolvableActivity(format!("no page above {} '{}'", node.kind, node.id))
            })?;
            statement.add_grouping_activity(self.lesson_activity(&page, lang)?);
        }

        if node.kind == NodeKind::Component && node.is_part_of_assessment {
            if let Some(article) = self
                .content
                .find_ancestor(node, &NodeKind::Article)
                .filter(ContentNode::has_enabled_assessment)
            {
                let assessment = AssessmentRef::for_article(&article);
                statement.add_parent_activity(self.assessment_activity(&assessment, lang)?);
            }
        }

        Ok(())
    }

    /// Group an assessment statement under the course and its page
    pub fn attach_assessment_grouping(
        &self,
        statement: &mut Statement,
        assessment: &AssessmentRef,
        lang: &str,
    ) -> Result<()> {
        statement.add_grouping_activity(self.course_activity(lang));

        if let Some(page) = assessment.page_id.as_deref().and_then(|id| self.content.node(id)) {
            statement.add_grouping_activity(self.lesson_activity(&page, lang)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::activity_types;
    use crate::content::CourseTree;

    fn tree() -> Arc<CourseTree> {
        Arc::new(
            CourseTree::from_nodes(vec![
                ContentNode::new("course", "course")
                    .with_title("Safety")
                    .with_description("Site safety"),
                ContentNode::new("co-1", "page").with_parent("course").with_title("Intro"),
                ContentNode::new("a-1", "article").with_parent("co-1").with_assessment("quiz"),
                ContentNode::new("b-1", "block").with_parent("a-1"),
                ContentNode::new("c-1", "component")
                    .with_parent("b-1")
                    .with_component("mcq")
                    .question()
                    .in_assessment(),
                ContentNode::new("c-2", "component").with_parent("b-1").with_component("text"),
            ])
            .unwrap(),
        )
    }

    fn builder(registration: Option<&str>, generate_ids: bool) -> StatementBuilder {
        StatementBuilder::new(
            Arc::new(TrackingContext {
                actor: Agent::mbox("mailto:a@example.com"),
                activity_id: "https://x/course".into(),
                registration: registration.map(str::to_string),
            }),
            Arc::new(VerbCatalog::adl()),
            tree(),
            "en-US",
            generate_ids,
        )
    }

    #[test]
    fn test_build_sets_registration_and_id() {
        let statement = builder(Some("reg-1"), true)
            .build("experienced", Activity::new("https://x/course#/id/co-1"), None)
            .unwrap();

        assert_eq!(statement.context.unwrap().registration.as_deref(), Some("reg-1"));
        assert!(Uuid::parse_str(statement.id.as_deref().unwrap()).is_ok());
        assert!(statement.result.is_none());
    }

    #[test]
    fn test_unknown_verb_aborts_build() {
        let err = builder(None, false)
            .build("teleported", Activity::new("https://x/course"), None)
            .unwrap_err();
        assert!(matches!(err, TrackerError::UnknownVerb(_)));
    }

    #[test]
    fn test_course_statement_durations() {
        let b = builder(None, false);
        let elapsed = Elapsed {
            attempt: Duration::from_millis(61_050),
            session: Duration::from_secs(3_600),
        };
        let duration = |verb| {
            b.course_statement(verb, None, &elapsed, "en-US")
                .unwrap()
                .result
                .and_then(|r| r.duration)
        };

        assert_eq!(duration(CourseVerb::Launched).as_deref(), Some("PT0S"));
        assert_eq!(duration(CourseVerb::Attempted).as_deref(), Some("PT0S"));
        assert_eq!(duration(CourseVerb::Suspended).as_deref(), Some("PT1M1.05S"));
        assert_eq!(duration(CourseVerb::Passed).as_deref(), Some("PT1M1.05S"));
        assert_eq!(duration(CourseVerb::Terminated).as_deref(), Some("PT1H0S"));
        assert_eq!(duration(CourseVerb::Resumed), None);
    }

    #[test]
    fn test_course_activity_uses_learner_language() {
        let activity = builder(None, false).course_activity("fr-FR");
        let definition = activity.definition.unwrap();

        assert_eq!(activity.id, "https://x/course");
        assert_eq!(definition.activity_type.as_deref(), Some(activity_types::COURSE));
        assert_eq!(definition.name, Some(lrs_client::language_map("fr-FR", "Safety")));
        assert_eq!(definition.description, Some(lrs_client::language_map("fr-FR", "Site safety")));
    }

    #[test]
    fn test_grouping_for_component_in_assessment() {
        let b = builder(None, false);
        let node = b.content().node("c-1").unwrap();
        let mut statement = b.build("answered", b.node_activity(&node, "en-US").unwrap(), None).unwrap();

        b.attach_grouping(&mut statement, &node, "en-US").unwrap();

        let grouping: Vec<_> = statement.grouping().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(grouping, vec!["https://x/course", "https://x/course#/id/co-1"]);
        assert_eq!(statement.grouping()[1].activity_type(), Some(activity_types::LESSON));

        let parent: Vec<_> = statement.parent().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(parent, vec!["https://x/course#/assessment/quiz"]);
    }

    #[test]
    fn test_grouping_without_assessment() {
        let b = builder(None, false);
        let node = b.content().node("c-2").unwrap();
        let mut statement = b.build("completed", b.node_activity(&node, "en-US").unwrap(), None).unwrap();

        b.attach_grouping(&mut statement, &node, "en-US").unwrap();

        assert_eq!(statement.grouping().len(), 2);
        assert!(statement.parent().is_empty());
    }

    #[test]
    fn test_page_grouped_by_course_only() {
        let b = builder(None, false);
        let node = b.content().node("co-1").unwrap();
        let mut statement = b.build("experienced", b.node_activity(&node, "en-US").unwrap(), None).unwrap();

        b.attach_grouping(&mut statement, &node, "en-US").unwrap();

        assert_eq!(statement.grouping().len(), 1);
        assert_eq!(statement.grouping()[0].id, "https://x/course");
    }
}
