//! Search nodes and candidate operator applications.

use sterling_kernel::carrier::bytestate::ByteStateV1;
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::operators::apply::StepRecord;
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;

/// Compute a node's state id: the identity bytes hashed under the
/// search-node namespace (status never participates).
#[must_use]
pub fn state_id(state: &ByteStateV1) -> ContentHash {
    canonical_hash(HashDomain::SearchNode, &state.identity_bytes())
}

/// A candidate `(op, args)` application proposed by the domain.
///
/// Candidates order by `(op_id bytes, arg bytes)`: a total, content-derived
/// order that makes enumeration ties deterministic before any scorer bias.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateOp {
    pub op_id: Code32,
    pub args: Vec<Code32>,
}

impl CandidateOp {
    /// Construct a candidate.
    #[must_use]
    pub fn new(op_id: Code32, args: Vec<Code32>) -> Self {
        Self { op_id, args }
    }

    /// Hex rendering of the op code (tape/graph serialization).
    #[must_use]
    pub fn op_hex(&self) -> String {
        hex::encode(self.op_id.to_le_bytes())
    }

    /// Hex rendering of the packed args.
    #[must_use]
    pub fn args_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(self.args.len() * 4);
        for arg in &self.args {
            bytes.extend_from_slice(&arg.to_le_bytes());
        }
        hex::encode(bytes)
    }

    /// Stable string key for scorer tables: `"<op_hex>:<args_hex>"`.
    #[must_use]
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.op_hex(), self.args_hex())
    }
}

/// An immutable search node.
#[derive(Debug, Clone)]
pub struct SearchNodeV1 {
    /// Monotonic id in creation order.
    pub node_id: u64,
    /// Parent node (`None` for the root).
    pub parent_id: Option<u64>,
    /// The candidate that produced this node (`None` for the root).
    pub incoming: Option<CandidateOp>,
    /// The step record of the producing application (`None` for the root).
    /// Carries exactly the bytes a trace frame needs.
    pub step_record: Option<StepRecord>,
    /// Full state at this node.
    pub state: ByteStateV1,
    /// Identity hash under the search-node namespace.
    pub state_id: ContentHash,
    /// Tree depth (root = 0).
    pub depth: u32,
    /// Frontier ordering score (lower pops first). Advisory-scorer output
    /// folds in here and nowhere else.
    pub score: i64,
    /// Global insertion counter; the deterministic tie-break.
    pub insertion_seq: u64,
}

/// The frontier ordering key: `(score, insertion_seq)`, lower first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrontierKey {
    pub score: i64,
    pub insertion_seq: u64,
}

impl From<&SearchNodeV1> for FrontierKey {
    fn from(node: &SearchNodeV1) -> Self {
        Self {
            score: node.score,
            insertion_seq: node.insertion_seq,
        }
    }
}
