//! Advisory candidate scoring.
//!
//! Scorer output biases frontier ordering and nothing else: legality,
//! dedup, and the recorded event set never depend on it. The scorer's
//! identity is digest-bound into the tape header so two runs are comparable
//! only when their scorer bindings match.

use std::collections::BTreeMap;

use sterling_kernel::carrier::bytestate::ByteStateV1;
use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_kernel::proof::hash::ContentHash;

use crate::node::CandidateOp;

/// Advisory scorer: integer bonuses, one per candidate.
pub trait ValueScorer: Send + Sync {
    /// Digest binding for the tape header (`None` for the uniform scorer).
    fn digest(&self) -> Option<&ContentHash>;

    /// Score a batch of candidates at `state`. Must return exactly
    /// `candidates.len()` bonuses; higher bonus = expanded earlier.
    fn score_candidates(&self, state: &ByteStateV1, candidates: &[CandidateOp]) -> Vec<i64>;
}

/// Default scorer: zero bonus everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformScorer;

impl ValueScorer for UniformScorer {
    fn digest(&self) -> Option<&ContentHash> {
        None
    }

    fn score_candidates(&self, _state: &ByteStateV1, candidates: &[CandidateOp]) -> Vec<i64> {
        vec![0; candidates.len()]
    }
}

/// Table scorer: bonus looked up by candidate table key
/// (`"<op_hex>:<args_hex>"`); unknown candidates score 0.
///
/// The digest is injected by the evidence layer (it owns the artifact
/// domain), not self-computed here.
#[derive(Debug, Clone)]
pub struct TableScorer {
    table: BTreeMap<String, i64>,
    digest: ContentHash,
}

impl TableScorer {
    /// Build from a table and its evidence-layer digest.
    #[must_use]
    pub fn new(table: BTreeMap<String, i64>, digest: ContentHash) -> Self {
        Self { table, digest }
    }

    /// The score table (read-only).
    #[must_use]
    pub fn table(&self) -> &BTreeMap<String, i64> {
        &self.table
    }

    /// Canonical descriptor bytes for the `scorer_descriptor.json` artifact.
    ///
    /// # Errors
    ///
    /// Returns [`sterling_kernel::proof::canon::CanonError`] on serialization
    /// failure.
    pub fn descriptor_bytes(
        &self,
    ) -> Result<Vec<u8>, sterling_kernel::proof::canon::CanonError> {
        let entries: Vec<serde_json::Value> = self
            .table
            .iter()
            .map(|(key, bonus)| serde_json::json!({"bonus": bonus, "candidate": key}))
            .collect();
        canonical_json_bytes(&serde_json::json!({
            "entries": entries,
            "kind": "table",
            "schema_version": "scorer.v1",
        }))
    }
}

impl ValueScorer for TableScorer {
    fn digest(&self) -> Option<&ContentHash> {
        Some(&self.digest)
    }

    fn score_candidates(&self, _state: &ByteStateV1, candidates: &[CandidateOp]) -> Vec<i64> {
        candidates
            .iter()
            .map(|c| self.table.get(&c.table_key()).copied().unwrap_or(0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sterling_kernel::carrier::code32::Code32;
    use sterling_kernel::carrier::schema::ByteStateSchema;

    fn state() -> ByteStateV1 {
        let schema =
            ByteStateSchema::new("bytestate.v1", "t", 1, 2, vec!["only".into()]).unwrap();
        ByteStateV1::from_schema(&schema)
    }

    fn digest() -> ContentHash {
        ContentHash::parse(
            "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        )
        .unwrap()
    }

    #[test]
    fn uniform_scores_zero_with_no_digest() {
        let candidates = vec![
            CandidateOp::new(Code32::new(1, 1, 1), vec![]),
            CandidateOp::new(Code32::new(1, 1, 2), vec![]),
        ];
        let scores = UniformScorer.score_candidates(&state(), &candidates);
        assert_eq!(scores, vec![0, 0]);
        assert!(UniformScorer.digest().is_none());
    }

    #[test]
    fn table_scorer_looks_up_by_key() {
        let c = CandidateOp::new(Code32::new(2, 64, 1), vec![Code32::new(2, 1, 3)]);
        let mut table = BTreeMap::new();
        table.insert(c.table_key(), 42);
        let scorer = TableScorer::new(table, digest());
        let scores = scorer.score_candidates(&state(), &[c.clone()]);
        assert_eq!(scores, vec![42]);
        assert_eq!(scorer.digest().unwrap(), &digest());

        let unknown = CandidateOp::new(Code32::new(9, 9, 9), vec![]);
        assert_eq!(scorer.score_candidates(&state(), &[unknown]), vec![0]);
    }

    #[test]
    fn descriptor_bytes_canonical_and_sorted() {
        let mut table = BTreeMap::new();
        table.insert("bb:00".into(), 1);
        table.insert("aa:00".into(), 2);
        let scorer = TableScorer::new(table, digest());
        let bytes = scorer.descriptor_bytes().unwrap();
        assert!(sterling_kernel::proof::canon::is_canonical(&bytes));
        let s = std::str::from_utf8(&bytes).unwrap();
        assert!(s.find("aa:00").unwrap() < s.find("bb:00").unwrap());
    }
}
