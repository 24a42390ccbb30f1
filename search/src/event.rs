//! Tape events: typed, canonical-JSON-payload records.
//!
//! Every event renders to a canonical JSON object whose `kind` field matches
//! the frame's tag byte; the chain hash is computed over exactly those
//! payload bytes. Fixed per-expansion order:
//! `NodeExpand -> (OperatorApply | Prune | IdentityFault)* -> (GoalFound)?`.

use sterling_kernel::proof::canon::{canonical_json_bytes, CanonError};

use crate::policy::BudgetKind;

/// File magic of a `.stap` tape.
pub const TAPE_MAGIC: [u8; 4] = *b"STAP";

/// Footer magic (reversed header magic; doubles as a truncation sentinel).
pub const TAPE_FOOTER_MAGIC: [u8; 4] = *b"PATS";

/// Wire version. Readers reject anything else.
pub const TAPE_VERSION: u16 = 1;

/// Fixed footer size: `record_count:u64` + 32-byte chain + 4-byte magic.
pub const TAPE_FOOTER_LEN: usize = 8 + 32 + 4;

/// Tape header: digest bindings for the whole episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeHeaderV1 {
    pub domain_id: String,
    pub registry_digest: String,
    pub operator_set_digest: String,
    pub policy_digest: String,
    /// `None` for the uniform scorer.
    pub scorer_digest: Option<String>,
    pub fixture_hash: String,
    /// Present iff the operator set carries relational operators.
    pub index_digest: Option<String>,
}

impl TapeHeaderV1 {
    /// Canonical header bytes (the chain seed input).
    ///
    /// # Errors
    ///
    /// Returns [`CanonError`] on serialization failure.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CanonError> {
        let mut map = serde_json::Map::new();
        map.insert("domain_id".into(), self.domain_id.clone().into());
        map.insert("fixture_hash".into(), self.fixture_hash.clone().into());
        if let Some(digest) = &self.index_digest {
            map.insert("index_digest".into(), digest.clone().into());
        }
        map.insert(
            "operator_set_digest".into(),
            self.operator_set_digest.clone().into(),
        );
        map.insert("policy_digest".into(), self.policy_digest.clone().into());
        map.insert(
            "registry_digest".into(),
            self.registry_digest.clone().into(),
        );
        if let Some(digest) = &self.scorer_digest {
            map.insert("scorer_digest".into(), digest.clone().into());
        }
        canonical_json_bytes(&serde_json::Value::Object(map))
    }
}

/// Why a candidate was pruned instead of applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    /// The child state was already visited (first-seen-wins).
    DuplicateState,
    /// The operator's masked precondition did not hold.
    PreconditionFailed,
    /// `apply()` rejected the candidate for another declared reason.
    ApplyRejected,
}

impl PruneReason {
    /// Canonical string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateState => "duplicate_state",
            Self::PreconditionFailed => "precondition_failed",
            Self::ApplyRejected => "apply_rejected",
        }
    }

    /// Parse from canonical string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "duplicate_state" => Some(Self::DuplicateState),
            "precondition_failed" => Some(Self::PreconditionFailed),
            "apply_rejected" => Some(Self::ApplyRejected),
            _ => None,
        }
    }
}

/// How the episode ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    GoalFound,
    Exhausted,
    BudgetExhausted,
    /// Collaborator panic or Cert contract breach; detail is diagnostic only.
    Error { detail: String },
}

impl TerminalOutcome {
    /// Canonical string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GoalFound => "goal_found",
            Self::Exhausted => "exhausted",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Error { .. } => "error",
        }
    }
}

/// A typed tape event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeEventV1 {
    FrontierPush {
        node_id: u64,
        parent_id: Option<u64>,
        state_id: String,
        depth: u32,
        score: i64,
        insertion_seq: u64,
    },
    NodeExpand {
        expansion_order: u64,
        node_id: u64,
        state_id: String,
    },
    OperatorApply {
        expansion_order: u64,
        op_hex: String,
        args_hex: String,
        child_node_id: u64,
        child_state_id: String,
    },
    Prune {
        expansion_order: u64,
        op_hex: String,
        args_hex: String,
        reason: PruneReason,
    },
    IdentityFault {
        expansion_order: u64,
        code_hex: String,
        detail: String,
    },
    GoalFound {
        expansion_order: u64,
        node_id: u64,
        state_id: String,
    },
    BudgetExhausted {
        kind: BudgetKind,
    },
    Terminal {
        outcome: TerminalOutcome,
        expansions: u64,
        steps: u64,
    },
}

/// Record tags. Contiguous from 1 so 0 stays "never a record".
pub const TAG_FRONTIER_PUSH: u8 = 1;
pub const TAG_NODE_EXPAND: u8 = 2;
pub const TAG_OPERATOR_APPLY: u8 = 3;
pub const TAG_PRUNE: u8 = 4;
pub const TAG_IDENTITY_FAULT: u8 = 5;
pub const TAG_GOAL_FOUND: u8 = 6;
pub const TAG_BUDGET_EXHAUSTED: u8 = 7;
pub const TAG_TERMINAL: u8 = 8;

impl TapeEventV1 {
    /// The frame tag byte.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::FrontierPush { .. } => TAG_FRONTIER_PUSH,
            Self::NodeExpand { .. } => TAG_NODE_EXPAND,
            Self::OperatorApply { .. } => TAG_OPERATOR_APPLY,
            Self::Prune { .. } => TAG_PRUNE,
            Self::IdentityFault { .. } => TAG_IDENTITY_FAULT,
            Self::GoalFound { .. } => TAG_GOAL_FOUND,
            Self::BudgetExhausted { .. } => TAG_BUDGET_EXHAUSTED,
            Self::Terminal { .. } => TAG_TERMINAL,
        }
    }

    /// The `kind` string embedded in the payload.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::FrontierPush { .. } => "frontier_push",
            Self::NodeExpand { .. } => "node_expand",
            Self::OperatorApply { .. } => "operator_apply",
            Self::Prune { .. } => "prune",
            Self::IdentityFault { .. } => "identity_fault",
            Self::GoalFound { .. } => "goal_found",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Terminal { .. } => "terminal",
        }
    }

    /// Canonical payload bytes (the chain-hash input).
    ///
    /// # Errors
    ///
    /// Returns [`CanonError`] on serialization failure.
    pub fn payload(&self) -> Result<Vec<u8>, CanonError> {
        canonical_json_bytes(&self.to_json())
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::FrontierPush {
                node_id,
                parent_id,
                state_id,
                depth,
                score,
                insertion_seq,
            } => {
                let mut map = serde_json::Map::new();
                map.insert("depth".into(), u64::from(*depth).into());
                map.insert("insertion_seq".into(), (*insertion_seq).into());
                map.insert("kind".into(), self.kind_str().into());
                map.insert("node_id".into(), (*node_id).into());
                if let Some(parent) = parent_id {
                    map.insert("parent_id".into(), (*parent).into());
                }
                map.insert("score".into(), (*score).into());
                map.insert("state_id".into(), state_id.clone().into());
                serde_json::Value::Object(map)
            }
            Self::NodeExpand {
                expansion_order,
                node_id,
                state_id,
            } => serde_json::json!({
                "expansion_order": expansion_order,
                "kind": self.kind_str(),
                "node_id": node_id,
                "state_id": state_id,
            }),
            Self::OperatorApply {
                expansion_order,
                op_hex,
                args_hex,
                child_node_id,
                child_state_id,
            } => serde_json::json!({
                "args_hex": args_hex,
                "child_node_id": child_node_id,
                "child_state_id": child_state_id,
                "expansion_order": expansion_order,
                "kind": self.kind_str(),
                "op_hex": op_hex,
            }),
            Self::Prune {
                expansion_order,
                op_hex,
                args_hex,
                reason,
            } => serde_json::json!({
                "args_hex": args_hex,
                "expansion_order": expansion_order,
                "kind": self.kind_str(),
                "op_hex": op_hex,
                "reason": reason.as_str(),
            }),
            Self::IdentityFault {
                expansion_order,
                code_hex,
                detail,
            } => serde_json::json!({
                "code_hex": code_hex,
                "detail": detail,
                "expansion_order": expansion_order,
                "kind": self.kind_str(),
            }),
            Self::GoalFound {
                expansion_order,
                node_id,
                state_id,
            } => serde_json::json!({
                "expansion_order": expansion_order,
                "kind": self.kind_str(),
                "node_id": node_id,
                "state_id": state_id,
            }),
            Self::BudgetExhausted { kind } => serde_json::json!({
                "budget": kind.as_str(),
                "kind": self.kind_str(),
            }),
            Self::Terminal {
                outcome,
                expansions,
                steps,
            } => {
                let mut map = serde_json::Map::new();
                if let TerminalOutcome::Error { detail } = outcome {
                    map.insert("detail".into(), detail.clone().into());
                }
                map.insert("expansions".into(), (*expansions).into());
                map.insert("kind".into(), self.kind_str().into());
                map.insert("outcome".into(), outcome.as_str().into());
                map.insert("steps".into(), (*steps).into());
                serde_json::Value::Object(map)
            }
        }
    }

    /// Reconstruct an event from its tag and parsed payload.
    ///
    /// # Errors
    ///
    /// Returns a detail string for unknown tags, kind/tag mismatches, or
    /// missing fields; the reader wraps it into its typed error.
    pub fn from_payload(tag: u8, value: &serde_json::Value) -> Result<Self, String> {
        let obj = value.as_object().ok_or("payload is not an object")?;
        let kind = str_field(obj, "kind")?;

        let event = match tag {
            TAG_FRONTIER_PUSH => Self::FrontierPush {
                node_id: u64_field(obj, "node_id")?,
                parent_id: match obj.get("parent_id") {
                    None => None,
                    Some(v) => Some(v.as_u64().ok_or("parent_id must be an integer")?),
                },
                state_id: str_field(obj, "state_id")?.to_string(),
                depth: u32::try_from(u64_field(obj, "depth")?)
                    .map_err(|_| "depth exceeds u32".to_string())?,
                score: obj
                    .get("score")
                    .and_then(serde_json::Value::as_i64)
                    .ok_or("missing integer 'score'")?,
                insertion_seq: u64_field(obj, "insertion_seq")?,
            },
            TAG_NODE_EXPAND => Self::NodeExpand {
                expansion_order: u64_field(obj, "expansion_order")?,
                node_id: u64_field(obj, "node_id")?,
                state_id: str_field(obj, "state_id")?.to_string(),
            },
            TAG_OPERATOR_APPLY => Self::OperatorApply {
                expansion_order: u64_field(obj, "expansion_order")?,
                op_hex: str_field(obj, "op_hex")?.to_string(),
                args_hex: str_field(obj, "args_hex")?.to_string(),
                child_node_id: u64_field(obj, "child_node_id")?,
                child_state_id: str_field(obj, "child_state_id")?.to_string(),
            },
            TAG_PRUNE => Self::Prune {
                expansion_order: u64_field(obj, "expansion_order")?,
                op_hex: str_field(obj, "op_hex")?.to_string(),
                args_hex: str_field(obj, "args_hex")?.to_string(),
                reason: PruneReason::parse(str_field(obj, "reason")?)
                    .ok_or("unknown prune reason")?,
            },
            TAG_IDENTITY_FAULT => Self::IdentityFault {
                expansion_order: u64_field(obj, "expansion_order")?,
                code_hex: str_field(obj, "code_hex")?.to_string(),
                detail: str_field(obj, "detail")?.to_string(),
            },
            TAG_GOAL_FOUND => Self::GoalFound {
                expansion_order: u64_field(obj, "expansion_order")?,
                node_id: u64_field(obj, "node_id")?,
                state_id: str_field(obj, "state_id")?.to_string(),
            },
            TAG_BUDGET_EXHAUSTED => Self::BudgetExhausted {
                kind: BudgetKind::parse(str_field(obj, "budget")?)
                    .ok_or("unknown budget kind")?,
            },
            TAG_TERMINAL => {
                let outcome = match str_field(obj, "outcome")? {
                    "goal_found" => TerminalOutcome::GoalFound,
                    "exhausted" => TerminalOutcome::Exhausted,
                    "budget_exhausted" => TerminalOutcome::BudgetExhausted,
                    "error" => TerminalOutcome::Error {
                        detail: obj
                            .get("detail")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    },
                    other => return Err(format!("unknown terminal outcome '{other}'")),
                };
                Self::Terminal {
                    outcome,
                    expansions: u64_field(obj, "expansions")?,
                    steps: u64_field(obj, "steps")?,
                }
            }
            other => return Err(format!("unknown record tag {other}")),
        };

        if event.kind_str() != kind {
            return Err(format!(
                "tag {tag} disagrees with payload kind '{kind}'"
            ));
        }
        Ok(event)
    }
}

fn str_field<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str, String> {
    obj.get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| format!("missing string '{key}'"))
}

fn u64_field(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<u64, String> {
    obj.get(key)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| format!("missing integer '{key}'"))
}
