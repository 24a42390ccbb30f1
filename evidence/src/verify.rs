//! Verification profiles over an `ArtifactBundleV1`.
//!
//! - **Base**: recompute every listed content hash; digest equality only.
//! - **Cert**: additionally verify the tape chain, assert the tape and trace
//!   header digest bindings equal the digests recomputed from the persisted
//!   artifacts, and re-derive the search graph from the tape, comparing
//!   canonical JSON byte-for-byte against `search_graph.json`.
//!
//! Cert stops at the first failure and refuses to expose the bundle. Dev
//! callers use [`audit`], which records every failure and keeps going.

use sterling_kernel::proof::canon::is_canonical;
use sterling_kernel::proof::hash::canonical_hash;
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_search::graph::derive_graph;
use sterling_search::tape_reader::parse_tape;

use crate::bundle::{
    parse_report, ArtifactBundleV1, BundleVerifyError, BundleVerifyErrorKind, ARTIFACT_BYTETRACE,
    ARTIFACT_FIXTURE, ARTIFACT_OPERATOR_REGISTRY, ARTIFACT_POLICY_SNAPSHOT,
    ARTIFACT_REGISTRY_SNAPSHOT, ARTIFACT_SCORER_DESCRIPTOR, ARTIFACT_SEARCH_GRAPH,
    ARTIFACT_SEARCH_TAPE,
};

fn fail(kind: BundleVerifyErrorKind, path: &str, detail: impl Into<String>) -> BundleVerifyError {
    BundleVerifyError {
        kind,
        path: path.to_string(),
        detail: detail.into(),
    }
}

/// Base profile: digest equality for every artifact the report lists.
///
/// # Errors
///
/// Returns the first [`BundleVerifyError`] found.
pub fn verify_base(bundle: &ArtifactBundleV1) -> Result<(), BundleVerifyError> {
    let parsed = parse_report(&bundle.report)?;
    for entry in &parsed.entries {
        let artifact = bundle.artifacts.get(&entry.path).ok_or_else(|| {
            fail(
                BundleVerifyErrorKind::MissingArtifact,
                &entry.path,
                "listed in report but absent from bundle",
            )
        })?;
        let recomputed = crate::bundle::artifact_hash(&artifact.content);
        if recomputed.as_str() != entry.content_hash {
            return Err(fail(
                BundleVerifyErrorKind::HashMismatch,
                &entry.path,
                format!(
                    "report says {}, content gives {}",
                    entry.content_hash,
                    recomputed.as_str()
                ),
            ));
        }
        if entry.domain != crate::bundle::artifact_domain_label() {
            return Err(fail(
                BundleVerifyErrorKind::ReportInconsistent,
                &entry.path,
                format!("unexpected hash domain '{}'", entry.domain),
            ));
        }
    }
    // Anything in the bundle but not in the report is inconsistent.
    for path in bundle.artifacts.keys() {
        if !parsed.entries.iter().any(|e| &e.path == path) {
            return Err(fail(
                BundleVerifyErrorKind::ReportInconsistent,
                path,
                "present in bundle but unlisted in report",
            ));
        }
    }
    Ok(())
}

/// Cert profile: Base plus chain, bindings, and tape<->graph equivalence.
///
/// # Errors
///
/// Returns the first [`BundleVerifyError`] found; the bundle must not be
/// exposed on failure.
pub fn verify_cert(bundle: &ArtifactBundleV1) -> Result<(), BundleVerifyError> {
    verify_base(bundle)?;

    let content = |path: &str| -> Result<&[u8], BundleVerifyError> {
        bundle
            .artifacts
            .get(path)
            .map(|a| a.content.as_slice())
            .ok_or_else(|| {
                fail(
                    BundleVerifyErrorKind::MissingArtifact,
                    path,
                    "required by Cert profile",
                )
            })
    };

    // Canonical-form gate on the JSON artifacts that feed digests.
    for path in [
        ARTIFACT_REGISTRY_SNAPSHOT,
        ARTIFACT_OPERATOR_REGISTRY,
        ARTIFACT_POLICY_SNAPSHOT,
        ARTIFACT_FIXTURE,
        ARTIFACT_SEARCH_GRAPH,
    ] {
        if !is_canonical(content(path)?) {
            return Err(fail(
                BundleVerifyErrorKind::ReportInconsistent,
                path,
                "artifact is not canonical JSON",
            ));
        }
    }

    // Tape: parse verifies framing and the full hash chain.
    let tape_bytes = content(ARTIFACT_SEARCH_TAPE)?;
    let tape = parse_tape(tape_bytes).map_err(|e| {
        fail(
            BundleVerifyErrorKind::HashMismatch,
            ARTIFACT_SEARCH_TAPE,
            format!("tape chain/framing: {e}"),
        )
    })?;

    // Header bindings must equal digests recomputed from the persisted
    // artifacts themselves.
    let registry_digest =
        canonical_hash(HashDomain::RegistrySnapshot, content(ARTIFACT_REGISTRY_SNAPSHOT)?);
    let operator_digest =
        canonical_hash(HashDomain::OperatorRegistry, content(ARTIFACT_OPERATOR_REGISTRY)?);
    let policy_digest =
        canonical_hash(HashDomain::PolicySnapshot, content(ARTIFACT_POLICY_SNAPSHOT)?);
    let fixture_digest = canonical_hash(HashDomain::Fixture, content(ARTIFACT_FIXTURE)?);

    let bindings = [
        (
            "registry_digest",
            tape.header.registry_digest.as_str(),
            registry_digest.as_str(),
        ),
        (
            "operator_set_digest",
            tape.header.operator_set_digest.as_str(),
            operator_digest.as_str(),
        ),
        (
            "policy_digest",
            tape.header.policy_digest.as_str(),
            policy_digest.as_str(),
        ),
        (
            "fixture_hash",
            tape.header.fixture_hash.as_str(),
            fixture_digest.as_str(),
        ),
    ];
    for (name, bound, recomputed) in bindings {
        if bound != recomputed {
            return Err(fail(
                BundleVerifyErrorKind::HeaderBindingMismatch,
                ARTIFACT_SEARCH_TAPE,
                format!("{name}: header has {bound}, artifacts give {recomputed}"),
            ));
        }
    }

    // Scorer binding: a bound digest requires the descriptor artifact, and
    // the descriptor must reproduce the digest.
    if let Some(bound) = &tape.header.scorer_digest {
        let descriptor = content(ARTIFACT_SCORER_DESCRIPTOR)?;
        let recomputed = crate::bundle::artifact_hash(descriptor);
        if bound.as_str() != recomputed.as_str() {
            return Err(fail(
                BundleVerifyErrorKind::HeaderBindingMismatch,
                ARTIFACT_SCORER_DESCRIPTOR,
                format!("scorer_digest: header has {bound}, descriptor gives {recomputed}"),
            ));
        }
    }

    // Trace header must carry the same bindings.
    let trace_bytes = content(ARTIFACT_BYTETRACE)?;
    let trace = sterling_kernel::carrier::trace_reader::bytes_to_trace(trace_bytes)
        .map_err(|e| {
            fail(
                BundleVerifyErrorKind::HashMismatch,
                ARTIFACT_BYTETRACE,
                format!("trace parse: {e}"),
            )
        })?;
    let trace_bindings = [
        (
            "registry_digest",
            trace.header.registry_digest.as_str(),
            registry_digest.as_str(),
        ),
        (
            "operator_set_digest",
            trace.header.operator_set_digest.as_str(),
            operator_digest.as_str(),
        ),
        (
            "policy_digest",
            trace.header.policy_digest.as_str(),
            policy_digest.as_str(),
        ),
        (
            "fixture_hash",
            trace.header.fixture_hash.as_str(),
            fixture_digest.as_str(),
        ),
    ];
    for (name, bound, recomputed) in trace_bindings {
        if bound != recomputed {
            return Err(fail(
                BundleVerifyErrorKind::HeaderBindingMismatch,
                ARTIFACT_BYTETRACE,
                format!("{name}: header has {bound}, artifacts give {recomputed}"),
            ));
        }
    }
    if trace.header.index_digest != tape.header.index_digest {
        return Err(fail(
            BundleVerifyErrorKind::HeaderBindingMismatch,
            ARTIFACT_BYTETRACE,
            "index_digest differs between trace and tape headers",
        ));
    }

    // Tape -> graph equivalence, byte-for-byte over canonical JSON.
    let derived = derive_graph(&tape).map_err(|e| {
        fail(
            BundleVerifyErrorKind::TapeGraphNonEquivalent,
            ARTIFACT_SEARCH_TAPE,
            format!("derivation: {e}"),
        )
    })?;
    let derived_bytes = derived.to_canonical_json_bytes().map_err(|e| {
        fail(
            BundleVerifyErrorKind::TapeGraphNonEquivalent,
            ARTIFACT_SEARCH_GRAPH,
            format!("serialization: {e}"),
        )
    })?;
    if derived_bytes != content(ARTIFACT_SEARCH_GRAPH)? {
        return Err(fail(
            BundleVerifyErrorKind::TapeGraphNonEquivalent,
            ARTIFACT_SEARCH_GRAPH,
            "persisted graph differs from the tape-derived graph",
        ));
    }

    Ok(())
}

/// Dev-mode audit: run both profiles, collecting every failure instead of
/// stopping at the first. An empty vector means the bundle verifies under
/// Cert.
#[must_use]
pub fn audit(bundle: &ArtifactBundleV1) -> Vec<BundleVerifyError> {
    let mut failures = Vec::new();
    if let Err(e) = verify_base(bundle) {
        failures.push(e);
    }
    if let Err(e) = verify_cert(bundle) {
        // Don't double-record the base failure.
        if !failures.contains(&e) {
            failures.push(e);
        }
    }
    failures
}
