//! `SearchGraphV1`: the deterministic derived view of a tape.
//!
//! Derivation is a pure function of the parsed tape: no engine state, no
//! frontier, no scorer. Cert verification re-derives the graph from the
//! persisted tape and compares canonical JSON byte-for-byte, so everything
//! here must be reproducible from tape events alone.

use std::collections::BTreeMap;

use sterling_kernel::proof::canon::{canonical_json_bytes, CanonError};
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;

use crate::event::{TapeEventV1, TapeHeaderV1, TerminalOutcome};
use crate::tape_reader::SearchTapeV1;

/// One node of the derived graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNodeV1 {
    pub node_id: u64,
    pub parent_id: Option<u64>,
    pub state_id: String,
    pub depth: u32,
    pub score: i64,
    pub insertion_seq: u64,
    /// Expansion order if the node was ever popped.
    pub expansion_order: Option<u64>,
    pub is_goal: bool,
    /// Expanded but produced no children.
    pub dead_end: bool,
}

/// One applied edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdgeV1 {
    pub from_node: u64,
    pub to_node: u64,
    pub op_hex: String,
    pub args_hex: String,
}

/// Informational health metrics. Never feed back into ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthMetrics {
    pub expansions: u64,
    pub unique_states: u64,
    pub frontier_peak: u64,
    /// Count of pushed nodes per depth; index = depth.
    pub depth_histogram: Vec<u64>,
    pub dead_end_count: u64,
    pub budget_exhausted: bool,
}

/// The derived graph artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchGraphV1 {
    /// Digest bindings copied verbatim from the tape header.
    pub bindings: TapeHeaderV1,
    pub nodes: Vec<GraphNodeV1>,
    pub edges: Vec<GraphEdgeV1>,
    pub health: HealthMetrics,
    /// Terminal outcome string (`goal_found`, `exhausted`, ...).
    pub outcome: String,
    /// Applied transitions, from the terminal event.
    pub steps: u64,
}

/// Typed derivation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The tape ends without a terminal event.
    MissingTerminal,
    /// The tape's event stream contradicts itself.
    InconsistentTape { detail: String },
    /// Canonical JSON serialization failed.
    Canonicalization { detail: String },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTerminal => write!(f, "tape has no terminal event"),
            Self::InconsistentTape { detail } => write!(f, "inconsistent tape: {detail}"),
            Self::Canonicalization { detail } => write!(f, "canonicalization: {detail}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Derive the graph from a parsed tape. Pure.
///
/// # Errors
///
/// Returns [`GraphError`] for tapes that are internally inconsistent
/// (duplicate node ids, edges from unexpanded nodes, missing terminal).
#[allow(clippy::too_many_lines)]
pub fn derive_graph(tape: &SearchTapeV1) -> Result<SearchGraphV1, GraphError> {
    let mut nodes: BTreeMap<u64, GraphNodeV1> = BTreeMap::new();
    let mut edges: Vec<GraphEdgeV1> = Vec::new();
    let mut expansion_node: BTreeMap<u64, u64> = BTreeMap::new();
    let mut children_in_expansion: BTreeMap<u64, u64> = BTreeMap::new();
    let mut unique_states: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    let mut depth_histogram: Vec<u64> = Vec::new();
    let mut frontier_size: u64 = 0;
    let mut frontier_peak: u64 = 0;
    let mut expansions: u64 = 0;
    let mut budget_exhausted = false;
    let mut terminal: Option<(String, u64, u64)> = None;

    for event in &tape.events {
        if terminal.is_some() {
            return Err(GraphError::InconsistentTape {
                detail: "event after terminal".into(),
            });
        }
        match event {
            TapeEventV1::FrontierPush {
                node_id,
                parent_id,
                state_id,
                depth,
                score,
                insertion_seq,
            } => {
                let inserted = nodes.insert(
                    *node_id,
                    GraphNodeV1 {
                        node_id: *node_id,
                        parent_id: *parent_id,
                        state_id: state_id.clone(),
                        depth: *depth,
                        score: *score,
                        insertion_seq: *insertion_seq,
                        expansion_order: None,
                        is_goal: false,
                        dead_end: false,
                    },
                );
                if inserted.is_some() {
                    return Err(GraphError::InconsistentTape {
                        detail: format!("duplicate node_id {node_id}"),
                    });
                }
                unique_states.insert(state_id.as_str());
                let depth_idx = *depth as usize;
                if depth_histogram.len() <= depth_idx {
                    depth_histogram.resize(depth_idx + 1, 0);
                }
                depth_histogram[depth_idx] += 1;
                frontier_size += 1;
                frontier_peak = frontier_peak.max(frontier_size);
            }
            TapeEventV1::NodeExpand {
                expansion_order,
                node_id,
                ..
            } => {
                let node = nodes.get_mut(node_id).ok_or_else(|| {
                    GraphError::InconsistentTape {
                        detail: format!("expand of unknown node {node_id}"),
                    }
                })?;
                if node.expansion_order.is_some() {
                    return Err(GraphError::InconsistentTape {
                        detail: format!("node {node_id} expanded twice"),
                    });
                }
                node.expansion_order = Some(*expansion_order);
                expansion_node.insert(*expansion_order, *node_id);
                children_in_expansion.insert(*expansion_order, 0);
                expansions += 1;
                frontier_size = frontier_size.saturating_sub(1);
            }
            TapeEventV1::OperatorApply {
                expansion_order,
                op_hex,
                args_hex,
                child_node_id,
                ..
            } => {
                let from_node = *expansion_node.get(expansion_order).ok_or_else(|| {
                    GraphError::InconsistentTape {
                        detail: format!("apply in unknown expansion {expansion_order}"),
                    }
                })?;
                edges.push(GraphEdgeV1 {
                    from_node,
                    to_node: *child_node_id,
                    op_hex: op_hex.clone(),
                    args_hex: args_hex.clone(),
                });
                if let Some(count) = children_in_expansion.get_mut(expansion_order) {
                    *count += 1;
                }
            }
            TapeEventV1::Prune { expansion_order, .. }
            | TapeEventV1::IdentityFault { expansion_order, .. } => {
                if !expansion_node.contains_key(expansion_order) {
                    return Err(GraphError::InconsistentTape {
                        detail: format!("prune in unknown expansion {expansion_order}"),
                    });
                }
            }
            TapeEventV1::GoalFound { node_id, .. } => {
                let node = nodes.get_mut(node_id).ok_or_else(|| {
                    GraphError::InconsistentTape {
                        detail: format!("goal on unknown node {node_id}"),
                    }
                })?;
                node.is_goal = true;
            }
            TapeEventV1::BudgetExhausted { .. } => {
                budget_exhausted = true;
            }
            TapeEventV1::Terminal {
                outcome,
                expansions: term_expansions,
                steps,
            } => {
                if *term_expansions != expansions {
                    return Err(GraphError::InconsistentTape {
                        detail: format!(
                            "terminal claims {term_expansions} expansions, tape shows {expansions}"
                        ),
                    });
                }
                terminal = Some((outcome_string(outcome), *term_expansions, *steps));
            }
        }
    }

    let (outcome, _, steps) = terminal.ok_or(GraphError::MissingTerminal)?;

    // Dead ends: expanded with zero applied children.
    let mut dead_end_count = 0;
    for (expansion_order, node_id) in &expansion_node {
        if children_in_expansion.get(expansion_order).copied() == Some(0) {
            if let Some(node) = nodes.get_mut(node_id) {
                if !node.is_goal {
                    node.dead_end = true;
                    dead_end_count += 1;
                }
            }
        }
    }

    edges.sort_by(|a, b| (a.from_node, a.to_node).cmp(&(b.from_node, b.to_node)));

    Ok(SearchGraphV1 {
        bindings: tape.header.clone(),
        nodes: nodes.into_values().collect(),
        edges,
        health: HealthMetrics {
            expansions,
            unique_states: unique_states.len() as u64,
            frontier_peak,
            depth_histogram,
            dead_end_count,
            budget_exhausted,
        },
        outcome,
        steps,
    })
}

fn outcome_string(outcome: &TerminalOutcome) -> String {
    outcome.as_str().to_string()
}

impl SearchGraphV1 {
    /// Canonical JSON bytes (the Cert equivalence surface).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Canonicalization`] on serialization failure.
    pub fn to_canonical_json_bytes(&self) -> Result<Vec<u8>, GraphError> {
        canonical_json_bytes(&self.to_json()).map_err(|e: CanonError| {
            GraphError::Canonicalization {
                detail: e.to_string(),
            }
        })
    }

    /// Content digest under the search-graph domain.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Canonicalization`] on serialization failure.
    pub fn digest(&self) -> Result<ContentHash, GraphError> {
        Ok(canonical_hash(
            HashDomain::SearchGraph,
            &self.to_canonical_json_bytes()?,
        ))
    }

    fn to_json(&self) -> serde_json::Value {
        let bindings = {
            let mut map = serde_json::Map::new();
            map.insert("domain_id".into(), self.bindings.domain_id.clone().into());
            map.insert(
                "fixture_hash".into(),
                self.bindings.fixture_hash.clone().into(),
            );
            if let Some(digest) = &self.bindings.index_digest {
                map.insert("index_digest".into(), digest.clone().into());
            }
            map.insert(
                "operator_set_digest".into(),
                self.bindings.operator_set_digest.clone().into(),
            );
            map.insert(
                "policy_digest".into(),
                self.bindings.policy_digest.clone().into(),
            );
            map.insert(
                "registry_digest".into(),
                self.bindings.registry_digest.clone().into(),
            );
            if let Some(digest) = &self.bindings.scorer_digest {
                map.insert("scorer_digest".into(), digest.clone().into());
            }
            serde_json::Value::Object(map)
        };

        let nodes: Vec<serde_json::Value> = self
            .nodes
            .iter()
            .map(|n| {
                let mut map = serde_json::Map::new();
                map.insert("dead_end".into(), n.dead_end.into());
                map.insert("depth".into(), u64::from(n.depth).into());
                if let Some(order) = n.expansion_order {
                    map.insert("expansion_order".into(), order.into());
                }
                map.insert("insertion_seq".into(), n.insertion_seq.into());
                map.insert("is_goal".into(), n.is_goal.into());
                map.insert("node_id".into(), n.node_id.into());
                if let Some(parent) = n.parent_id {
                    map.insert("parent_id".into(), parent.into());
                }
                map.insert("score".into(), n.score.into());
                map.insert("state_id".into(), n.state_id.clone().into());
                serde_json::Value::Object(map)
            })
            .collect();

        let edges: Vec<serde_json::Value> = self
            .edges
            .iter()
            .map(|e| {
                serde_json::json!({
                    "args_hex": e.args_hex,
                    "from_node": e.from_node,
                    "op_hex": e.op_hex,
                    "to_node": e.to_node,
                })
            })
            .collect();

        serde_json::json!({
            "bindings": bindings,
            "edges": edges,
            "nodes": nodes,
            "outcome": self.outcome,
            "schema_version": "search_graph.v1",
            "search_health_metrics": {
                "budget_exhausted": self.health.budget_exhausted,
                "dead_end_count": self.health.dead_end_count,
                "depth_histogram": self.health.depth_histogram,
                "expansions": self.health.expansions,
                "frontier_peak": self.health.frontier_peak,
                "unique_states": self.health.unique_states,
            },
            "steps": self.steps,
        })
    }
}
