//! Host content tree
//!
//! The host framework owns the course structure; the tracker only reads
//! nodes and walks ancestry. Restored progress is handed back through
//! [`ProgressRestorer`].

use crate::error::{Result, TrackerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Kind of a content node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Course,
    Menu,
    Page,
    Article,
    Block,
    Component,
    /// Assessment pseudo-node attached to an article
    ArticleAssessment,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Course => "course",
            NodeKind::Menu => "menu",
            NodeKind::Page => "page",
            NodeKind::Article => "article",
            NodeKind::Block => "block",
            NodeKind::Component => "component",
            NodeKind::ArticleAssessment => "article-assessment",
            NodeKind::Other(kind) => kind,
        }
    }

    /// Menus and pages
    pub fn is_content_object(&self) -> bool {
        matches!(self, NodeKind::Menu | NodeKind::Page)
    }
}

impl From<String> for NodeKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "course" => NodeKind::Course,
            "menu" => NodeKind::Menu,
            "page" => NodeKind::Page,
            "article" => NodeKind::Article,
            "block" => NodeKind::Block,
            "component" => NodeKind::Component,
            "article-assessment" => NodeKind::ArticleAssessment,
            _ => NodeKind::Other(kind),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(kind: &str) -> Self {
        NodeKind::from(kind.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assessment settings of an article
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
}

/// A node of the course structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// HTML body text
    #[serde(default)]
    pub body: Option<String>,
    /// Component plugin name, e.g. `mcq`
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub is_question_type: bool,
    #[serde(default)]
    pub is_part_of_assessment: bool,
    #[serde(default)]
    pub assessment: Option<AssessmentConfig>,
}

impl ContentNode {
    pub fn new(id: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parent_id: None,
            title: String::new(),
            display_title: None,
            description: None,
            body: None,
            component: None,
            is_question_type: false,
            is_part_of_assessment: false,
            assessment: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Mark as a component of the given plugin
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn question(mut self) -> Self {
        self.is_question_type = true;
        self
    }

    pub fn in_assessment(mut self) -> Self {
        self.is_part_of_assessment = true;
        self
    }

    pub fn with_assessment(mut self, id: impl Into<String>) -> Self {
        self.assessment = Some(AssessmentConfig {
            id: Some(id.into()),
            is_enabled: true,
        });
        self
    }

    /// Display title, or the plain title when none is set
    pub fn name(&self) -> &str {
        self.display_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.title)
    }

    pub fn is_question_component(&self) -> bool {
        self.kind == NodeKind::Component && self.is_question_type
    }

    /// Whether assessment tracking is switched on for this node
    pub fn has_enabled_assessment(&self) -> bool {
        self.assessment.as_ref().is_some_and(|a| a.is_enabled)
    }
}

/// Read-only access to the host's course structure
pub trait ContentTree: Send + Sync {
    fn node(&self, id: &str) -> Option<ContentNode>;

    /// The course root
    fn course(&self) -> Option<ContentNode>;

    /// Nearest ancestor of `node` with the given kind
    fn find_ancestor(&self, node: &ContentNode, kind: &NodeKind) -> Option<ContentNode> {
        let mut next = node.parent_id.clone();
        let mut depth = 0;

        while let Some(id) = next {
            // Guard against cycles in host data
            depth += 1;
            if depth > 64 {
                return None;
            }

            let parent = self.node(&id)?;
            if &parent.kind == kind {
                return Some(parent);
            }
            next = parent.parent_id;
        }

        None
    }
}

/// Applies restored progress to host content
#[async_trait]
pub trait ProgressRestorer: Send + Sync {
    /// Restore a node's trackable state; false if the id is unknown
    async fn restore(&self, id: &str, state: &Value) -> bool;
}

/// In-memory content tree
pub struct CourseTree {
    course_id: String,
    nodes: HashMap<String, ContentNode>,
    restored: RwLock<HashMap<String, Value>>,
}

impl CourseTree {
    /// Build a tree; exactly one node must be the course
    pub fn from_nodes(nodes: Vec<ContentNode>) -> Result<Self> {
        let mut courses = nodes.iter().filter(|n| n.kind == NodeKind::Course);
        let course_id = match (courses.next(), courses.next()) {
            (Some(course), None) => course.id.clone(),
            (None, _) => return Err(TrackerError::Config("content tree has no course node".into())),
            (Some(_), Some(_)) => {
                return Err(TrackerError::Config("content tree has more than one course node".into()))
            }
        };

        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        Ok(Self {
            course_id,
            nodes,
            restored: RwLock::new(HashMap::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// State most recently restored for a node
    pub async fn restored(&self, id: &str) -> Option<Value> {
        self.restored.read().await.get(id).cloned()
    }
}

impl ContentTree for CourseTree {
    fn node(&self, id: &str) -> Option<ContentNode> {
        self.nodes.get(id).cloned()
    }

    fn course(&self) -> Option<ContentNode> {
        self.nodes.get(&self.course_id).cloned()
    }
}

#[async_trait]
impl ProgressRestorer for CourseTree {
    async fn restore(&self, id: &str, state: &Value) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.restored.write().await.insert(id.to_string(), state.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> CourseTree {
        CourseTree::from_nodes(vec![
            ContentNode::new("course", "course").with_title("Safety"),
            ContentNode::new("co-1", "page").with_parent("course").with_title("Intro"),
            ContentNode::new("a-1", "article").with_parent("co-1").with_assessment("quiz"),
            ContentNode::new("b-1", "block").with_parent("a-1"),
            ContentNode::new("c-1", "component")
                .with_parent("b-1")
                .with_component("mcq")
                .question(),
        ])
        .unwrap()
    }

    #[test]
    fn test_node_kind_names() {
        assert_eq!(NodeKind::from("article-assessment"), NodeKind::ArticleAssessment);
        assert_eq!(NodeKind::from("simulation"), NodeKind::Other("simulation".into()));
        assert_eq!(String::from(NodeKind::Menu), "menu");
        assert!(NodeKind::Page.is_content_object());
        assert!(!NodeKind::Article.is_content_object());
    }

    #[test]
    fn test_node_deserializes_kind_from_string() {
        let node: ContentNode = serde_json::from_value(json!({
            "id": "c-9",
            "kind": "component",
            "parent_id": "b-1",
            "title": "Q",
            "is_question_type": true
        }))
        .unwrap();
        assert_eq!(node.kind, NodeKind::Component);
        assert!(node.is_question_component());
    }

    #[test]
    fn test_find_ancestor() {
        let tree = tree();
        let component = tree.node("c-1").unwrap();

        assert_eq!(tree.find_ancestor(&component, &NodeKind::Page).unwrap().id, "co-1");
        assert_eq!(tree.find_ancestor(&component, &NodeKind::Article).unwrap().id, "a-1");
        assert!(tree.find_ancestor(&component, &NodeKind::Menu).is_none());
        assert_eq!(tree.course().unwrap().title, "Safety");
    }

    #[test]
    fn test_name_prefers_display_title() {
        let mut node = ContentNode::new("p", "page").with_title("Plain");
        assert_eq!(node.name(), "Plain");
        node.display_title = Some("Shown".into());
        assert_eq!(node.name(), "Shown");
    }

    #[test]
    fn test_tree_requires_single_course() {
        assert!(CourseTree::from_nodes(vec![ContentNode::new("p", "page")]).is_err());
        assert!(CourseTree::from_nodes(vec![
            ContentNode::new("a", "course"),
            ContentNode::new("b", "course")
        ])
        .is_err());
    }

    #[tokio::test]
    async fn test_restore_known_and_unknown_ids() {
        let tree = tree();
        assert!(tree.restore("c-1", &json!({"_id": "c-1", "_isComplete": true})).await);
        assert!(!tree.restore("ghost", &json!({})).await);
        assert_eq!(tree.restored("c-1").await.unwrap()["_isComplete"], true);
    }
}
