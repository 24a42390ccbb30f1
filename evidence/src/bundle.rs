//! `ArtifactBundleV1`: a content-addressed set of episode artifacts plus the
//! verification report that lists each artifact's digest and hash domain.
//!
//! The report is itself canonical JSON (`verification_report.v1`). Every read
//! path recomputes every listed hash before content is exposed.

use std::collections::BTreeMap;

use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;

/// Fixed artifact filenames.
pub const ARTIFACT_REPORT: &str = "verification_report.json";
pub const ARTIFACT_BYTETRACE: &str = "bytetrace.bst1";
pub const ARTIFACT_SEARCH_TAPE: &str = "search_tape.bin";
pub const ARTIFACT_SEARCH_GRAPH: &str = "search_graph.json";
pub const ARTIFACT_OPERATOR_REGISTRY: &str = "operator_registry.json";
pub const ARTIFACT_REGISTRY_SNAPSHOT: &str = "registry_snapshot.json";
pub const ARTIFACT_POLICY_SNAPSHOT: &str = "policy_snapshot.json";
pub const ARTIFACT_SCHEMA_BUNDLE: &str = "schema_bundle.json";
pub const ARTIFACT_FIXTURE: &str = "fixture.json";
pub const ARTIFACT_SCORER_DESCRIPTOR: &str = "scorer_descriptor.json";

/// One content-addressed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifact {
    pub path: String,
    pub content: Vec<u8>,
    /// `sha256(BUNDLE_ARTIFACT || content)`.
    pub content_hash: ContentHash,
}

/// The assembled bundle: artifacts + canonical report bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundleV1 {
    pub artifacts: BTreeMap<String, BundleArtifact>,
    /// Canonical `verification_report.json` bytes.
    pub report: Vec<u8>,
}

/// What went wrong, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleVerifyErrorKind {
    MissingArtifact,
    HashMismatch,
    TapeGraphNonEquivalent,
    HeaderBindingMismatch,
    ReportInconsistent,
}

impl BundleVerifyErrorKind {
    /// Canonical string for reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingArtifact => "missing_artifact",
            Self::HashMismatch => "hash_mismatch",
            Self::TapeGraphNonEquivalent => "tape_graph_non_equivalent",
            Self::HeaderBindingMismatch => "header_binding_mismatch",
            Self::ReportInconsistent => "report_inconsistent",
        }
    }
}

/// Typed bundle verification failure, localized to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleVerifyError {
    pub kind: BundleVerifyErrorKind,
    pub path: String,
    pub detail: String,
}

impl std::fmt::Display for BundleVerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.kind.as_str(), self.path, self.detail)
    }
}

impl std::error::Error for BundleVerifyError {}

/// Hash one artifact's content.
#[must_use]
pub fn artifact_hash(content: &[u8]) -> ContentHash {
    canonical_hash(HashDomain::BundleArtifact, content)
}

/// The artifact domain prefix as the report records it (without the
/// terminator byte, which is not printable JSON).
#[must_use]
pub fn artifact_domain_label() -> String {
    let bytes = HashDomain::BundleArtifact.as_bytes();
    String::from_utf8_lossy(&bytes[..bytes.len() - 1]).into_owned()
}

/// Assemble a bundle: hash every artifact and build the report.
///
/// # Errors
///
/// Returns [`BundleVerifyError`] with kind `ReportInconsistent` for duplicate
/// paths or report serialization failure.
pub fn build_bundle(
    artifacts: Vec<(String, Vec<u8>)>,
    profile: ExecutionProfile,
    truncated: bool,
) -> Result<ArtifactBundleV1, BundleVerifyError> {
    let mut map = BTreeMap::new();
    for (path, content) in artifacts {
        let artifact = BundleArtifact {
            content_hash: artifact_hash(&content),
            path: path.clone(),
            content,
        };
        if map.insert(path.clone(), artifact).is_some() {
            return Err(BundleVerifyError {
                kind: BundleVerifyErrorKind::ReportInconsistent,
                path,
                detail: "duplicate artifact path".into(),
            });
        }
    }

    let listed: Vec<serde_json::Value> = map
        .values()
        .map(|a| {
            serde_json::json!({
                "content_hash": a.content_hash.as_str(),
                "domain": artifact_domain_label(),
                "path": a.path,
            })
        })
        .collect();
    let report_value = serde_json::json!({
        "artifacts": listed,
        "profile": profile.as_str(),
        "schema_version": "verification_report.v1",
        "truncated": truncated,
    });
    let report =
        canonical_json_bytes(&report_value).map_err(|e| BundleVerifyError {
            kind: BundleVerifyErrorKind::ReportInconsistent,
            path: ARTIFACT_REPORT.into(),
            detail: e.to_string(),
        })?;

    Ok(ArtifactBundleV1 {
        artifacts: map,
        report,
    })
}

/// Parsed view of a verification report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub path: String,
    pub content_hash: String,
    pub domain: String,
}

/// Parsed report header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport {
    pub entries: Vec<ReportEntry>,
    pub profile: String,
    pub truncated: bool,
}

/// Parse `verification_report.json` bytes.
///
/// # Errors
///
/// Returns [`BundleVerifyError`] with kind `ReportInconsistent` for any
/// structural defect, including non-canonical bytes.
pub fn parse_report(report: &[u8]) -> Result<ParsedReport, BundleVerifyError> {
    let inconsistent = |detail: String| BundleVerifyError {
        kind: BundleVerifyErrorKind::ReportInconsistent,
        path: ARTIFACT_REPORT.into(),
        detail,
    };
    if !sterling_kernel::proof::canon::is_canonical(report) {
        return Err(inconsistent("report is not canonical JSON".into()));
    }
    let value: serde_json::Value =
        serde_json::from_slice(report).map_err(|e| inconsistent(format!("parse: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| inconsistent("expected object".into()))?;
    if obj.get("schema_version").and_then(serde_json::Value::as_str)
        != Some("verification_report.v1")
    {
        return Err(inconsistent("unknown report schema_version".into()));
    }
    let profile = obj
        .get("profile")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| inconsistent("missing 'profile'".into()))?
        .to_string();
    let truncated = obj
        .get("truncated")
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| inconsistent("missing 'truncated'".into()))?;
    let listed = obj
        .get("artifacts")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| inconsistent("missing 'artifacts'".into()))?;

    let mut entries = Vec::with_capacity(listed.len());
    for (i, entry) in listed.iter().enumerate() {
        let obj = entry
            .as_object()
            .ok_or_else(|| inconsistent(format!("artifacts[{i}] not an object")))?;
        let field = |key: &str| -> Result<String, BundleVerifyError> {
            obj.get(key)
                .and_then(serde_json::Value::as_str)
                .map(String::from)
                .ok_or_else(|| inconsistent(format!("artifacts[{i}] missing '{key}'")))
        };
        entries.push(ReportEntry {
            path: field("path")?,
            content_hash: field("content_hash")?,
            domain: field("domain")?,
        });
    }
    Ok(ParsedReport {
        entries,
        profile,
        truncated,
    })
}
