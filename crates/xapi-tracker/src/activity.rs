//! Activity IRIs and types for content nodes

use crate::content::{ContentNode, NodeKind};
use crate::error::{Result, TrackerError};
use lrs_client::{language_map, Activity, ActivityDefinition, LanguageMap};

/// ADL activity type IRIs
pub mod activity_types {
    pub const ASSESSMENT: &str = "http://adlnet.gov/expapi/activities/assessment";
    pub const COURSE: &str = "http://adlnet.gov/expapi/activities/course";
    pub const FILE: &str = "http://adlnet.gov/expapi/activities/file";
    pub const INTERACTION: &str = "http://adlnet.gov/expapi/activities/interaction";
    pub const LESSON: &str = "http://adlnet.gov/expapi/activities/lesson";
    pub const LINK: &str = "http://adlnet.gov/expapi/activities/link";
    pub const MEDIA: &str = "http://adlnet.gov/expapi/activities/media";
    pub const MEETING: &str = "http://adlnet.gov/expapi/activities/meeting";
    pub const MODULE: &str = "http://adlnet.gov/expapi/activities/module";
    pub const OBJECTIVE: &str = "http://adlnet.gov/expapi/activities/objective";
    pub const PERFORMANCE: &str = "http://adlnet.gov/expapi/activities/performance";
    pub const PROFILE: &str = "http://adlnet.gov/expapi/activities/profile";
    pub const QUESTION: &str = "http://adlnet.gov/expapi/activities/question";
    pub const SIMULATION: &str = "http://adlnet.gov/expapi/activities/simulation";
    pub const CMI_INTERACTION: &str = "http://adlnet.gov/expapi/activities/cmi.interaction";

    pub(crate) const BASE: &str = "http://adlnet.gov/expapi/activities/";
}

/// Identifies an assessment pseudo-node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentRef {
    /// Assessment id from the article's settings
    pub id: Option<String>,
    pub article_id: Option<String>,
    /// Page containing the assessment
    pub page_id: Option<String>,
}

impl AssessmentRef {
    /// Assessment configured on an article
    pub fn for_article(article: &ContentNode) -> Self {
        Self {
            id: article.assessment.as_ref().and_then(|a| a.id.clone()),
            article_id: Some(article.id.clone()),
            page_id: article.parent_id.clone(),
        }
    }

    fn node_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or(self.article_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Everything needed to describe a node as an xAPI activity
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedActivity {
    pub iri: String,
    pub activity_type: String,
    pub name: LanguageMap,
    pub description: Option<LanguageMap>,
}

impl ResolvedActivity {
    pub fn into_activity(self) -> Activity {
        Activity::new(self.iri).with_definition(ActivityDefinition {
            name: Some(self.name),
            description: self.description,
            activity_type: Some(self.activity_type),
            ..Default::default()
        })
    }
}

/// Derives IRIs below the course activity id
#[derive(Debug, Clone)]
pub struct ActivityResolver {
    activity_id: String,
}

impl ActivityResolver {
    pub fn new(activity_id: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
        }
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    /// IRI for a node id of the given kind.
    ///
    /// The course is the bare activity id; assessments live under
    /// `#/assessment/` so they never collide with `#/id/` nodes.
    pub fn iri(&self, id: &str, kind: &NodeKind) -> Result<String> {
        match kind {
            NodeKind::Course => Ok(self.activity_id.clone()),
            _ if id.is_empty() => Err(TrackerError::UnresolvableActivity(format!("{} without id", kind))),
            NodeKind::ArticleAssessment => Ok(format!("{}#/assessment/{}", self.activity_id, id)),
            _ => Ok(format!("{}#/id/{}", self.activity_id, id)),
        }
    }

    /// Activity type IRI for a node
    pub fn activity_type(node: &ContentNode) -> Result<String> {
        let iri = match node.kind {
            NodeKind::Component if node.is_question_type => activity_types::INTERACTION,
            NodeKind::Component => activity_types::MEDIA,
            NodeKind::Block | NodeKind::Article => activity_types::INTERACTION,
            NodeKind::Course => activity_types::COURSE,
            NodeKind::Menu => activity_types::MODULE,
            NodeKind::Page => activity_types::LESSON,
            NodeKind::ArticleAssessment => activity_types::ASSESSMENT,
            NodeKind::Other(ref kind) if kind.trim().is_empty() => {
                return Err(TrackerError::UnresolvableActivity(node.id.clone()))
            }
            NodeKind::Other(ref kind) => return Ok(format!("{}{}", activity_types::BASE, kind.trim())),
        };
        Ok(iri.to_string())
    }

    /// Resolve a content node in the learner's language
    pub fn resolve(&self, node: &ContentNode, lang: &str) -> Result<ResolvedActivity> {
        let description = match node.kind {
            NodeKind::Course => node.description.as_ref().map(|d| language_map(lang, d.clone())),
            _ => None,
        };

        Ok(ResolvedActivity {
            iri: self.iri(&node.id, &node.kind)?,
            activity_type: Self::activity_type(node)?,
            name: language_map(lang, node.name()),
            description,
        })
    }

    /// Resolve an assessment pseudo-node
    pub fn resolve_assessment(&self, assessment: &AssessmentRef, lang: &str) -> Result<ResolvedActivity> {
        let id = assessment.node_id().ok_or_else(|| {
            TrackerError::UnresolvableActivity("assessment without id or article".into())
        })?;
        let name = assessment
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or("Assessment");

        Ok(ResolvedActivity {
            iri: self.iri(id, &NodeKind::ArticleAssessment)?,
            activity_type: activity_types::ASSESSMENT.to_string(),
            name: language_map(lang, name),
            description: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ActivityResolver {
        ActivityResolver::new("https://x/course")
    }

    #[test]
    fn test_iris() {
        let r = resolver();
        assert_eq!(r.iri("course", &NodeKind::Course).unwrap(), "https://x/course");
        assert_eq!(r.iri("comp-1", &NodeKind::Component).unwrap(), "https://x/course#/id/comp-1");
        assert_eq!(
            r.iri("quiz", &NodeKind::ArticleAssessment).unwrap(),
            "https://x/course#/assessment/quiz"
        );
        assert!(r.iri("", &NodeKind::Page).is_err());
    }

    #[test]
    fn test_iri_is_deterministic() {
        let r = resolver();
        let node = ContentNode::new("b-7", "block").with_title("Block");
        assert_eq!(r.resolve(&node, "en-US").unwrap(), r.resolve(&node, "en-US").unwrap());
    }

    #[test]
    fn test_activity_types() {
        let of = |node: ContentNode| ActivityResolver::activity_type(&node).unwrap();
        assert_eq!(of(ContentNode::new("c", "component").question()), activity_types::INTERACTION);
        assert_eq!(of(ContentNode::new("c", "component")), activity_types::MEDIA);
        assert_eq!(of(ContentNode::new("a", "article")), activity_types::INTERACTION);
        assert_eq!(of(ContentNode::new("m", "menu")), activity_types::MODULE);
        assert_eq!(of(ContentNode::new("p", "page")), activity_types::LESSON);
        assert_eq!(of(ContentNode::new("course", "course")), activity_types::COURSE);
        assert_eq!(of(ContentNode::new("s", "simulation")), activity_types::SIMULATION);
        assert_eq!(
            of(ContentNode::new("w", "widget")),
            "http://adlnet.gov/expapi/activities/widget"
        );
        assert!(ActivityResolver::activity_type(&ContentNode::new("x", "")).is_err());
    }

    #[test]
    fn test_course_carries_description() {
        let course = ContentNode::new("course", "course")
            .with_title("Safety")
            .with_description("Site safety basics");
        let activity = resolver().resolve(&course, "de-DE").unwrap();

        assert_eq!(activity.iri, "https://x/course");
        assert_eq!(activity.name, language_map("de-DE", "Safety"));
        assert_eq!(activity.description, Some(language_map("de-DE", "Site safety basics")));
    }

    #[test]
    fn test_assessment_falls_back_to_article_id() {
        let r = resolver();
        let named = r
            .resolve_assessment(
                &AssessmentRef {
                    id: Some("final".into()),
                    article_id: Some("a-3".into()),
                    page_id: None,
                },
                "en-US",
            )
            .unwrap();
        assert_eq!(named.iri, "https://x/course#/assessment/final");
        assert_eq!(named.name, language_map("en-US", "final"));

        let unnamed = r
            .resolve_assessment(
                &AssessmentRef {
                    id: None,
                    article_id: Some("a-3".into()),
                    page_id: None,
                },
                "en-US",
            )
            .unwrap();
        assert_eq!(unnamed.iri, "https://x/course#/assessment/a-3");
        assert_eq!(unnamed.name, language_map("en-US", "Assessment"));

        assert!(r.resolve_assessment(&AssessmentRef::default(), "en-US").is_err());
    }
}
