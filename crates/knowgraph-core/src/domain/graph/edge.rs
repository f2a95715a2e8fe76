//! Knowledge edges and the adjacency index
//!
//! Edges are directed, weighted and immutable once created. The adjacency
//! index only references edges by id; it never owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Types of relationships between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Generic topical relation
    RelatesTo,
    /// Source lends support to target
    Supports,
    /// Source and target disagree
    Contradicts,
    /// Source depends on target
    DependsOn,
    /// Source refers to target
    References,
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatesTo => "RELATES_TO",
            Self::Supports => "SUPPORTS",
            Self::Contradicts => "CONTRADICTS",
            Self::DependsOn => "DEPENDS_ON",
            Self::References => "REFERENCES",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "RELATES_TO" | "RELATESTO" => Some(Self::RelatesTo),
            "SUPPORTS" => Some(Self::Supports),
            "CONTRADICTS" => Some(Self::Contradicts),
            "DEPENDS_ON" | "DEPENDSON" => Some(Self::DependsOn),
            "REFERENCES" => Some(Self::References),
            _ => None,
        }
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::RelatesTo,
            Self::Supports,
            Self::Contradicts,
            Self::DependsOn,
            Self::References,
        ]
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Check that a strength value may be persisted
pub fn validate_strength(strength: f32) -> Result<()> {
    if strength.is_finite() && (0.0..=1.0).contains(&strength) {
        Ok(())
    } else {
        Err(Error::InvalidStrength(strength))
    }
}

/// A directed, weighted edge between two nodes of the same workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    /// Unique identifier for the edge
    pub id: String,
    /// Workspace both endpoints belong to
    pub workspace: String,
    /// ID of the source node
    pub source_id: String,
    /// ID of the target node
    pub target_id: String,
    /// Type of relationship
    pub relationship: RelationshipType,
    /// Strength of the relationship (0.0 to 1.0)
    pub strength: f32,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEdge {
    /// Create a new edge, rejecting strengths outside [0, 1]
    pub fn new(
        workspace: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship: RelationshipType,
        strength: f32,
    ) -> Result<Self> {
        validate_strength(strength)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            workspace: workspace.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship,
            strength,
            created_at: Utc::now(),
        })
    }

    /// Whether the edge touches `node_id` at either end
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    /// Whether the edge joins `a` and `b`, in either direction
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_id == a && self.target_id == b) || (self.source_id == b && self.target_id == a)
    }

    /// The endpoint opposite `node_id`, if the edge touches it
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_id == node_id {
            Some(&self.target_id)
        } else if self.target_id == node_id {
            Some(&self.source_id)
        } else {
            None
        }
    }

    /// JSON snapshot used by the evolution log
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "source_id": self.source_id,
            "target_id": self.target_id,
            "relationship": self.relationship,
            "strength": self.strength,
            "created_at": self.created_at,
        })
    }
}

/// Direction of an adjacency entry relative to the indexed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Indexed node is the edge source
    Outgoing,
    /// Indexed node is the edge target
    Incoming,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outgoing => "out",
            Self::Incoming => "in",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "out" => Some(Self::Outgoing),
            "in" => Some(Self::Incoming),
            _ => None,
        }
    }
}

/// Outgoing and incoming edge ids of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAdjacency {
    pub node_id: String,
    pub outgoing: Vec<String>,
    pub incoming: Vec<String>,
}

impl NodeAdjacency {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Total degree (in + out)
    pub fn degree(&self) -> usize {
        self.outgoing.len() + self.incoming.len()
    }
}
