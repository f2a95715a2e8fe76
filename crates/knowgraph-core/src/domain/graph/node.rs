//! Knowledge node types
//!
//! Nodes are short text-bearing records with an embedding. They are created
//! once and never mutated; changes are recorded as evolution entries instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Workspace-defined node type tag.
///
/// The set of tags is open; tags are normalised to upper case so
/// `"insight"` and `"INSIGHT"` name the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(String);

impl NodeType {
    pub const INSIGHT: &'static str = "INSIGHT";
    pub const DECISION: &'static str = "DECISION";
    pub const QUESTION: &'static str = "QUESTION";
    pub const FACT: &'static str = "FACT";
    pub const HYPOTHESIS: &'static str = "HYPOTHESIS";

    /// Create a node type from any tag, normalising case and whitespace
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_uppercase().replace(char::is_whitespace, "_"))
    }

    pub fn insight() -> Self {
        Self::new(Self::INSIGHT)
    }

    pub fn decision() -> Self {
        Self::new(Self::DECISION)
    }

    pub fn question() -> Self {
        Self::new(Self::QUESTION)
    }

    pub fn fact() -> Self {
        Self::new(Self::FACT)
    }

    pub fn hypothesis() -> Self {
        Self::new(Self::HYPOTHESIS)
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for NodeType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive metadata attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Confidence in the node's content (0.0 to 1.0)
    pub confidence: f32,
    /// Where the content came from
    #[serde(default)]
    pub source: Option<String>,
    /// Content version
    pub version: u32,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            confidence: 1.0,
            source: None,
            version: 1,
        }
    }
}

impl NodeMetadata {
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set confidence score (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Reject metadata that cannot be persisted
    pub fn validate(&self) -> Result<()> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidInput(format!(
                "confidence {} must lie within [0.0, 1.0]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    /// Unique identifier for the node
    pub id: String,
    /// Workspace (tenant) the node belongs to
    pub workspace: String,
    /// Type tag
    pub node_type: NodeType,
    /// Text content
    pub content: String,
    /// Embedding of `content`; dimension is fixed per workspace
    pub embedding: Vec<f32>,
    /// Descriptive metadata
    pub metadata: NodeMetadata,
    /// Who created the node
    pub created_by: String,
    /// When the node was created
    pub created_at: DateTime<Utc>,
}

impl KnowledgeNode {
    /// Create a new node with a fresh id
    pub fn new(
        workspace: impl Into<String>,
        node_type: NodeType,
        content: impl Into<String>,
        embedding: Vec<f32>,
        metadata: NodeMetadata,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace: workspace.into(),
            node_type,
            content: content.into(),
            embedding,
            metadata,
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }

    /// JSON snapshot used by the evolution log (the embedding is omitted)
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "node_type": self.node_type,
            "content": self.content,
            "metadata": self.metadata,
            "created_by": self.created_by,
            "created_at": self.created_at,
        })
    }
}
