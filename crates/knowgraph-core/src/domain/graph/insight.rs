//! Derived insights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightType {
    /// Coherent group of same-typed nodes
    Pattern,
    /// Poorly connected nodes
    Gap,
    /// Nodes joined by a CONTRADICTS edge
    Contradiction,
    /// Dominant kind of recent change
    Trend,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "PATTERN",
            Self::Gap => "GAP",
            Self::Contradiction => "CONTRADICTION",
            Self::Trend => "TREND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PATTERN" => Some(Self::Pattern),
            "GAP" => Some(Self::Gap),
            "CONTRADICTION" => Some(Self::Contradiction),
            "TREND" => Some(Self::Trend),
            _ => None,
        }
    }
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scoring dimensions of an insight, each in [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightImpact {
    pub relevance: f32,
    pub novelty: f32,
    pub actionability: f32,
    pub confidence: f32,
}

/// A higher-level observation mined from the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeInsight {
    pub id: String,
    pub workspace: String,
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    /// Supporting node ids
    pub evidence: Vec<String>,
    pub confidence: f32,
    pub impact: InsightImpact,
    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl KnowledgeInsight {
    pub fn new(
        workspace: impl Into<String>,
        insight_type: InsightType,
        title: impl Into<String>,
        description: impl Into<String>,
        evidence: Vec<String>,
        confidence: f32,
        impact: InsightImpact,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace: workspace.into(),
            insight_type,
            title: title.into(),
            description: description.into(),
            evidence,
            confidence: confidence.clamp(0.0, 1.0),
            impact,
            generated_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Expire `ttl` after generation
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.expires_at = Some(self.generated_at + ttl);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Sort insights by descending confidence
pub fn sort_by_confidence(insights: &mut [KnowledgeInsight]) {
    insights.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insight(confidence: f32) -> KnowledgeInsight {
        KnowledgeInsight::new(
            "ws",
            InsightType::Gap,
            "t",
            "d",
            vec![],
            confidence,
            InsightImpact::default(),
        )
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(insight(1.7).confidence, 1.0);
        assert_eq!(insight(-0.2).confidence, 0.0);
    }

    #[test]
    fn test_sort_by_confidence() {
        let mut insights = vec![insight(0.2), insight(0.9), insight(0.5)];
        sort_by_confidence(&mut insights);
        let order: Vec<f32> = insights.iter().map(|i| i.confidence).collect();
        assert_eq!(order, vec![0.9, 0.5, 0.2]);
    }

    #[test]
    fn test_ttl() {
        let fresh = insight(0.5);
        assert!(!fresh.is_expired(Utc::now() + chrono::Duration::days(365)));

        let bounded = insight(0.5).with_ttl(chrono::Duration::days(7));
        assert!(!bounded.is_expired(Utc::now()));
        assert!(bounded.is_expired(Utc::now() + chrono::Duration::days(8)));
    }

    #[test]
    fn test_insight_type_names() {
        assert_eq!(InsightType::parse("CONTRADICTION"), Some(InsightType::Contradiction));
        assert_eq!(InsightType::Trend.to_string(), "TREND");
    }
}
