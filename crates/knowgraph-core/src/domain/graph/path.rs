//! Bounded path finding
//!
//! Breadth-first search over the adjacency index in both directions. A single
//! visited set is shared by the whole run, so each run yields at most one
//! path: the first one reached at the shallowest depth.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::edge::KnowledgeEdge;
use super::store::GraphStore;
use crate::error::Result;

/// Per-hop score decay
const HOP_PENALTY: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathType {
    /// One hop
    Direct,
    /// Two or more hops
    Indirect,
}

/// A scored route between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgePath {
    /// Node ids from source to target
    pub node_ids: Vec<String>,
    /// Edge ids along the route
    pub edge_ids: Vec<String>,
    pub score: f32,
    pub path_type: PathType,
    pub hops: usize,
}

impl KnowledgePath {
    /// Build a path from its node sequence and the edges between them
    pub fn from_edges(node_ids: Vec<String>, edges: &[KnowledgeEdge]) -> Self {
        let hops = edges.len();
        Self {
            node_ids,
            edge_ids: edges.iter().map(|e| e.id.clone()).collect(),
            score: path_score(edges),
            path_type: if hops == 1 {
                PathType::Direct
            } else {
                PathType::Indirect
            },
            hops,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.node_ids.first().map(String::as_str)
    }

    pub fn target(&self) -> Option<&str> {
        self.node_ids.last().map(String::as_str)
    }
}

/// Mean edge strength discounted by hop count
pub fn path_score(edges: &[KnowledgeEdge]) -> f32 {
    if edges.is_empty() {
        return 0.0;
    }
    let hops = edges.len() as f32;
    let mean = edges.iter().map(|e| e.strength).sum::<f32>() / hops;
    mean * (1.0 / (1.0 + HOP_PENALTY * hops))
}

/// Breadth-first path search over a store
pub struct PathFinder<S: GraphStore> {
    store: Arc<S>,
}

impl<S: GraphStore> Clone for PathFinder<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: GraphStore> PathFinder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Find at most one path from `source_id` to `target_id` within `max_depth` hops
    pub async fn find_paths(
        &self,
        workspace: &str,
        source_id: &str,
        target_id: &str,
        max_depth: u32,
    ) -> Result<Vec<KnowledgePath>> {
        if source_id == target_id || max_depth == 0 {
            return Ok(Vec::new());
        }

        let mut visited: HashSet<String> = HashSet::new();
        // node -> (previous node, edge used to reach it)
        let mut parents: HashMap<String, (String, KnowledgeEdge)> = HashMap::new();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();

        visited.insert(source_id.to_string());
        queue.push_back((source_id.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            for edge in self.store.edges_for_node(workspace, &current).await? {
                let Some(next) = edge.other_end(&current).map(str::to_string) else {
                    continue;
                };
                if !visited.insert(next.clone()) {
                    continue;
                }
                parents.insert(next.clone(), (current.clone(), edge));

                if next == target_id {
                    let path = reconstruct(&parents, source_id, target_id);
                    tracing::debug!(
                        workspace = workspace,
                        source = source_id,
                        target = target_id,
                        hops = path.hops,
                        score = path.score,
                        "Found path"
                    );
                    return Ok(vec![path]);
                }

                queue.push_back((next, depth + 1));
            }
        }

        Ok(Vec::new())
    }
}

fn reconstruct(
    parents: &HashMap<String, (String, KnowledgeEdge)>,
    source_id: &str,
    target_id: &str,
) -> KnowledgePath {
    let mut node_ids = vec![target_id.to_string()];
    let mut edges = Vec::new();
    let mut cursor = target_id;

    while cursor != source_id {
        let Some((previous, edge)) = parents.get(cursor) else {
            break;
        };
        edges.push(edge.clone());
        node_ids.push(previous.clone());
        cursor = previous.as_str();
    }

    node_ids.reverse();
    edges.reverse();
    KnowledgePath::from_edges(node_ids, &edges)
}
