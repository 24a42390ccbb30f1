//! The best-first expansion loop.
//!
//! Single-threaded and cooperative: one episode, one logical thread, so
//! interleavings cannot affect byte output. Collaborator callbacks (candidate
//! source, scorer, goal predicate) run under `catch_unwind`; a panic
//! finalizes the tape with an error outcome instead of losing it.
//!
//! Engine states: `Idle -> Running -> (GoalFound | Exhausted |
//! BudgetExhausted | Error) -> Finalized`. Finalization always writes the
//! terminal event and seals the tape.

use std::panic::{catch_unwind, AssertUnwindSafe};

use sterling_kernel::carrier::bytestate::ByteStateV1;
use sterling_kernel::carrier::registry::RegistryV1;
use sterling_kernel::operators::apply::{apply, ApplyError};
use sterling_kernel::operators::operator_registry::OperatorSetV1;
use sterling_kernel::profile::ExecutionProfile;

use crate::error::SearchError;
use crate::event::{PruneReason, TapeEventV1, TapeHeaderV1, TerminalOutcome};
use crate::frontier::FrontierV1;
use crate::node::{state_id, CandidateOp, SearchNodeV1};
use crate::policy::{BudgetKind, SearchBudgets};
use crate::scorer::ValueScorer;
use crate::source::CandidateSource;
use crate::tape_writer::{TapeOutput, TapeWriter};

/// Digest bindings the engine stamps into the tape header.
#[derive(Debug, Clone)]
pub struct SearchBindings {
    pub domain_id: String,
    pub registry_digest: String,
    pub operator_set_digest: String,
    pub policy_digest: String,
    pub fixture_hash: String,
    pub index_digest: Option<String>,
}

/// Why the search stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTermination {
    GoalFound { node_id: u64 },
    Exhausted,
    BudgetExhausted { kind: BudgetKind },
    /// Collaborator panic or contract breach; the tape is still complete.
    Error { detail: String },
}

/// A finalized search episode.
#[derive(Debug)]
pub struct SearchOutcome {
    pub termination: SearchTermination,
    /// The sealed tape.
    pub tape: TapeOutput,
    /// Every created node, indexed by `node_id`, step records included.
    pub nodes: Vec<SearchNodeV1>,
    pub goal_node_id: Option<u64>,
    pub expansions: u64,
    pub steps: u64,
}

impl SearchOutcome {
    /// Node ids from the root to `node_id`, root first.
    #[must_use]
    pub fn path_to(&self, node_id: u64) -> Vec<u64> {
        let mut path = Vec::new();
        let mut cursor = Some(node_id);
        while let Some(id) = cursor {
            path.push(id);
            cursor = self
                .nodes
                .get(id as usize)
                .and_then(|n| n.parent_id);
        }
        path.reverse();
        path
    }

    /// The goal node's path, or the path to the deepest node (oldest wins
    /// ties) when no goal was reached. Deterministic either way.
    #[must_use]
    pub fn principal_path(&self) -> Vec<u64> {
        if let Some(goal) = self.goal_node_id {
            return self.path_to(goal);
        }
        // Deepest node wins; the oldest insertion wins depth ties.
        let best = self
            .nodes
            .iter()
            .max_by(|a, b| {
                a.depth
                    .cmp(&b.depth)
                    .then(b.insertion_seq.cmp(&a.insertion_seq))
            })
            .map_or(0, |n| n.node_id);
        self.path_to(best)
    }
}

/// Run best-first search from `initial`.
///
/// # Errors
///
/// Returns [`SearchError`] only for pre-flight failures (invalid budgets,
/// tape header serialization). Every runtime stop (goal, exhaustion,
/// budgets, collaborator panics) finalizes the tape and returns `Ok`.
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
pub fn run_search(
    initial: ByteStateV1,
    source: &dyn CandidateSource,
    scorer: &dyn ValueScorer,
    registry: &RegistryV1,
    operator_set: &OperatorSetV1,
    budgets: &SearchBudgets,
    bindings: &SearchBindings,
    profile: ExecutionProfile,
) -> Result<SearchOutcome, SearchError> {
    budgets.validate()?;

    let header = TapeHeaderV1 {
        domain_id: bindings.domain_id.clone(),
        registry_digest: bindings.registry_digest.clone(),
        operator_set_digest: bindings.operator_set_digest.clone(),
        policy_digest: bindings.policy_digest.clone(),
        scorer_digest: scorer.digest().map(|d| d.as_str().to_string()),
        fixture_hash: bindings.fixture_hash.clone(),
        index_digest: bindings.index_digest.clone(),
    };
    let mut tape = TapeWriter::new(&header)?;

    let mut frontier = FrontierV1::new();
    let mut nodes: Vec<SearchNodeV1> = Vec::new();
    let mut insertion_seq: u64 = 0;
    let mut expansions: u64 = 0;
    let mut steps: u64 = 0;

    // Root.
    let root_sid = state_id(&initial);
    let root = SearchNodeV1 {
        node_id: 0,
        parent_id: None,
        incoming: None,
        step_record: None,
        state: initial,
        state_id: root_sid,
        depth: 0,
        score: 0,
        insertion_seq,
    };
    insertion_seq += 1;
    tape.append(&TapeEventV1::FrontierPush {
        node_id: root.node_id,
        parent_id: None,
        state_id: root.state_id.hex_digest().to_string(),
        depth: 0,
        score: 0,
        insertion_seq: root.insertion_seq,
    })?;

    // Root goal check.
    match catch_unwind(AssertUnwindSafe(|| source.is_goal(&root.state))) {
        Ok(true) => {
            tape.append(&TapeEventV1::GoalFound {
                expansion_order: 0,
                node_id: 0,
                state_id: root.state_id.hex_digest().to_string(),
            })?;
            nodes.push(root);
            return finalize(
                tape,
                nodes,
                SearchTermination::GoalFound { node_id: 0 },
                Some(0),
                expansions,
                steps,
            );
        }
        Ok(false) => {}
        Err(_) => {
            nodes.push(root);
            return finalize(
                tape,
                nodes,
                SearchTermination::Error {
                    detail: "goal predicate panicked on root".into(),
                },
                None,
                expansions,
                steps,
            );
        }
    }

    frontier.push(root.clone());
    nodes.push(root);

    let termination;
    let mut goal_node_id: Option<u64> = None;

    'search: loop {
        if budgets.cancel.is_cancelled() {
            tape.append(&TapeEventV1::BudgetExhausted {
                kind: BudgetKind::WallClock,
            })?;
            termination = SearchTermination::BudgetExhausted {
                kind: BudgetKind::WallClock,
            };
            break 'search;
        }
        if expansions >= budgets.max_expansions {
            tape.append(&TapeEventV1::BudgetExhausted {
                kind: BudgetKind::Expansion,
            })?;
            termination = SearchTermination::BudgetExhausted {
                kind: BudgetKind::Expansion,
            };
            break 'search;
        }
        let Some(current) = frontier.pop() else {
            termination = SearchTermination::Exhausted;
            break 'search;
        };

        let expansion_order = expansions;
        tape.append(&TapeEventV1::NodeExpand {
            expansion_order,
            node_id: current.node_id,
            state_id: current.state_id.hex_digest().to_string(),
        })?;

        // Candidate enumeration (panic-guarded).
        let candidates = match catch_unwind(AssertUnwindSafe(|| {
            source.candidates(&current.state, registry)
        })) {
            Ok(mut list) => {
                list.sort();
                list
            }
            Err(_) => {
                termination = SearchTermination::Error {
                    detail: "candidate source panicked".into(),
                };
                break 'search;
            }
        };

        // Scoring (panic- and arity-guarded). Advisory only.
        let bonuses = match catch_unwind(AssertUnwindSafe(|| {
            scorer.score_candidates(&current.state, &candidates)
        })) {
            Ok(b) if b.len() == candidates.len() => b,
            Ok(b) => {
                termination = SearchTermination::Error {
                    detail: format!(
                        "scorer returned {} scores for {} candidates",
                        b.len(),
                        candidates.len()
                    ),
                };
                break 'search;
            }
            Err(_) => {
                termination = SearchTermination::Error {
                    detail: "scorer panicked".into(),
                };
                break 'search;
            }
        };

        // Order by descending bonus; stable sort keeps content order on ties.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(bonuses[i]));

        let mut goal_this_expansion: Option<u64> = None;

        for &idx in &order {
            let candidate = &candidates[idx];
            if steps >= budgets.max_steps {
                tape.append(&TapeEventV1::BudgetExhausted {
                    kind: BudgetKind::Step,
                })?;
                termination = SearchTermination::BudgetExhausted {
                    kind: BudgetKind::Step,
                };
                break 'search;
            }

            match apply(
                &current.state,
                candidate.op_id,
                &candidate.args,
                registry,
                operator_set,
                profile,
            ) {
                Err(ApplyError::PreconditionFailed { .. }) => {
                    tape.append(&prune(expansion_order, candidate, PruneReason::PreconditionFailed))?;
                }
                Err(ApplyError::RelationalFault { .. }) => {
                    tape.append(&prune(expansion_order, candidate, PruneReason::ApplyRejected))?;
                }
                Err(ApplyError::RegistryMissing { code, .. }) => {
                    if profile == ExecutionProfile::Cert {
                        termination = SearchTermination::Error {
                            detail: format!("unknown identity {code} under Cert"),
                        };
                        break 'search;
                    }
                    tape.append(&TapeEventV1::IdentityFault {
                        expansion_order,
                        code_hex: hex::encode(code.to_le_bytes()),
                        detail: "arg code not allocated in registry epoch".into(),
                    })?;
                    tape.append(&prune(expansion_order, candidate, PruneReason::ApplyRejected))?;
                }
                Err(e) => {
                    // UnknownOperator / ArgsArity / ShapeMismatch /
                    // EffectMaskViolation: the source or operator set broke
                    // its contract. Hard stop with evidence.
                    termination = SearchTermination::Error {
                        detail: format!("contract breach: {e}"),
                    };
                    break 'search;
                }
                Ok((new_state, record)) => {
                    steps += 1;
                    let child_sid = state_id(&new_state);
                    let child_hex = child_sid.hex_digest().to_string();
                    if frontier.is_visited(&child_hex) {
                        tape.append(&prune(expansion_order, candidate, PruneReason::DuplicateState))?;
                        continue;
                    }

                    let child = SearchNodeV1 {
                        node_id: nodes.len() as u64,
                        parent_id: Some(current.node_id),
                        incoming: Some(candidate.clone()),
                        step_record: Some(record),
                        state: new_state,
                        state_id: child_sid,
                        depth: current.depth + 1,
                        score: i64::from(current.depth) + 1 - bonuses[idx],
                        insertion_seq,
                    };
                    insertion_seq += 1;

                    tape.append(&TapeEventV1::OperatorApply {
                        expansion_order,
                        op_hex: candidate.op_hex(),
                        args_hex: candidate.args_hex(),
                        child_node_id: child.node_id,
                        child_state_id: child_hex.clone(),
                    })?;
                    tape.append(&TapeEventV1::FrontierPush {
                        node_id: child.node_id,
                        parent_id: child.parent_id,
                        state_id: child_hex.clone(),
                        depth: child.depth,
                        score: child.score,
                        insertion_seq: child.insertion_seq,
                    })?;

                    match catch_unwind(AssertUnwindSafe(|| source.is_goal(&child.state))) {
                        Ok(true) => {
                            goal_this_expansion = Some(child.node_id);
                        }
                        Ok(false) => {}
                        Err(_) => {
                            frontier.push(child.clone());
                            nodes.push(child);
                            termination = SearchTermination::Error {
                                detail: "goal predicate panicked during expansion".into(),
                            };
                            break 'search;
                        }
                    }

                    frontier.push(child.clone());
                    nodes.push(child);
                }
            }
        }

        if let Some(goal_id) = goal_this_expansion {
            tape.append(&TapeEventV1::GoalFound {
                expansion_order,
                node_id: goal_id,
                state_id: nodes[goal_id as usize].state_id.hex_digest().to_string(),
            })?;
            expansions += 1;
            goal_node_id = Some(goal_id);
            termination = SearchTermination::GoalFound { node_id: goal_id };
            break 'search;
        }

        expansions += 1;
    }

    finalize(tape, nodes, termination, goal_node_id, expansions, steps)
}

fn prune(expansion_order: u64, candidate: &CandidateOp, reason: PruneReason) -> TapeEventV1 {
    TapeEventV1::Prune {
        expansion_order,
        op_hex: candidate.op_hex(),
        args_hex: candidate.args_hex(),
        reason,
    }
}

fn finalize(
    mut tape: TapeWriter,
    nodes: Vec<SearchNodeV1>,
    termination: SearchTermination,
    goal_node_id: Option<u64>,
    expansions: u64,
    steps: u64,
) -> Result<SearchOutcome, SearchError> {
    let outcome = match &termination {
        SearchTermination::GoalFound { .. } => TerminalOutcome::GoalFound,
        SearchTermination::Exhausted => TerminalOutcome::Exhausted,
        SearchTermination::BudgetExhausted { .. } => TerminalOutcome::BudgetExhausted,
        SearchTermination::Error { detail } => TerminalOutcome::Error {
            detail: detail.clone(),
        },
    };
    tape.append(&TapeEventV1::Terminal {
        outcome,
        expansions,
        steps,
    })?;
    let tape = tape.finish()?;
    Ok(SearchOutcome {
        termination,
        tape,
        nodes,
        goal_node_id,
        expansions,
        steps,
    })
}
