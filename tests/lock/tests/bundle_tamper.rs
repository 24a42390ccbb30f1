//! Poisoned-bundle behavior: one flipped byte anywhere must surface as a
//! typed failure naming the exact artifact, and Cert must refuse the bundle.

use sterling_evidence::bundle::{
    BundleVerifyErrorKind, ARTIFACT_REGISTRY_SNAPSHOT, ARTIFACT_SEARCH_GRAPH,
    ARTIFACT_SEARCH_TAPE,
};
use sterling_evidence::bundle_dir::{read_bundle_dir, BundleDirError};
use sterling_evidence::runner::{run_episode, EpisodeScorer};
use sterling_evidence::verify::{audit, verify_base, verify_cert};
use sterling_evidence::worlds::rome::RomeWorld;
use sterling_kernel::profile::ExecutionProfile;
use sterling_search::policy::SearchBudgets;

fn write_episode(dir: &std::path::Path) {
    run_episode(
        &RomeWorld::new(),
        &EpisodeScorer::Uniform,
        &SearchBudgets::default(),
        ExecutionProfile::Cert,
        dir,
    )
    .unwrap();
}

fn flip_byte(dir: &std::path::Path, file: &str, offset: usize) {
    let path = dir.join(file);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[offset] ^= 0x01;
    std::fs::write(&path, bytes).unwrap();
}

#[test]
fn tampered_registry_snapshot_fails_base_with_exact_path() {
    let dir = tempfile::tempdir().unwrap();
    write_episode(dir.path());
    flip_byte(dir.path(), ARTIFACT_REGISTRY_SNAPSHOT, 3);

    let bundle = read_bundle_dir(dir.path()).unwrap();
    let err = verify_base(&bundle).unwrap_err();
    assert_eq!(err.kind, BundleVerifyErrorKind::HashMismatch);
    assert_eq!(err.path, ARTIFACT_REGISTRY_SNAPSHOT);

    // Cert refuses the bundle outright.
    assert!(verify_cert(&bundle).is_err());
}

#[test]
fn every_artifact_is_tamper_evident() {
    let dir = tempfile::tempdir().unwrap();
    write_episode(dir.path());
    let bundle = read_bundle_dir(dir.path()).unwrap();

    for (path, artifact) in &bundle.artifacts {
        let mut tampered = bundle.clone();
        let content = &mut tampered.artifacts.get_mut(path).unwrap().content;
        let mid = artifact.content.len() / 2;
        content[mid] ^= 0x01;

        let err = verify_base(&tampered).unwrap_err();
        assert_eq!(err.kind, BundleVerifyErrorKind::HashMismatch, "for {path}");
        assert_eq!(&err.path, path);
    }
}

#[test]
fn tampered_tape_breaks_chain_under_cert() {
    let dir = tempfile::tempdir().unwrap();
    write_episode(dir.path());
    let mut bundle = read_bundle_dir(dir.path()).unwrap();

    // Re-point the report-level hash so Base passes, then Cert must still
    // catch the broken chain. Simulate by tampering content and rebuilding
    // the artifact hash (an attacker who can rewrite the report).
    let artifact = bundle.artifacts.get_mut(ARTIFACT_SEARCH_TAPE).unwrap();
    let mid = artifact.content.len() / 2;
    artifact.content[mid] ^= 0x01;
    artifact.content_hash = sterling_evidence::bundle::artifact_hash(&artifact.content);
    let report_str = String::from_utf8(bundle.report.clone()).unwrap();
    // The report still lists the old hash, so Base flags it; rebuild the
    // report line to get past Base and test the Cert chain gate.
    let bundle_with_fixed_report = {
        let old_hash = {
            let parsed = sterling_evidence::bundle::parse_report(&bundle.report).unwrap();
            parsed
                .entries
                .iter()
                .find(|e| e.path == ARTIFACT_SEARCH_TAPE)
                .unwrap()
                .content_hash
                .clone()
        };
        let fixed = report_str.replace(&old_hash, artifact.content_hash.as_str());
        sterling_evidence::bundle::ArtifactBundleV1 {
            artifacts: bundle.artifacts.clone(),
            report: fixed.into_bytes(),
        }
    };

    verify_base(&bundle_with_fixed_report).unwrap();
    let err = verify_cert(&bundle_with_fixed_report).unwrap_err();
    assert!(
        matches!(
            err.kind,
            BundleVerifyErrorKind::HashMismatch | BundleVerifyErrorKind::HeaderBindingMismatch
        ),
        "chain tamper must fail Cert, got {err:?}"
    );
}

#[test]
fn tampered_graph_is_non_equivalent_under_cert() {
    let dir = tempfile::tempdir().unwrap();
    write_episode(dir.path());
    let mut bundle = read_bundle_dir(dir.path()).unwrap();

    // Rewrite the graph artifact (still canonical JSON) and its report hash.
    let graph = bundle.artifacts.get_mut(ARTIFACT_SEARCH_GRAPH).unwrap();
    let mut value: serde_json::Value = serde_json::from_slice(&graph.content).unwrap();
    value["steps"] = serde_json::json!(999);
    graph.content =
        sterling_kernel::proof::canon::canonical_json_bytes(&value).unwrap();
    graph.content_hash = sterling_evidence::bundle::artifact_hash(&graph.content);

    let report_str = String::from_utf8(bundle.report.clone()).unwrap();
    let parsed = sterling_evidence::bundle::parse_report(&bundle.report).unwrap();
    let old_hash = parsed
        .entries
        .iter()
        .find(|e| e.path == ARTIFACT_SEARCH_GRAPH)
        .unwrap()
        .content_hash
        .clone();
    bundle.report = report_str
        .replace(&old_hash, bundle.artifacts[ARTIFACT_SEARCH_GRAPH].content_hash.as_str())
        .into_bytes();

    verify_base(&bundle).unwrap();
    let err = verify_cert(&bundle).unwrap_err();
    assert_eq!(err.kind, BundleVerifyErrorKind::TapeGraphNonEquivalent);
    assert_eq!(err.path, ARTIFACT_SEARCH_GRAPH);
}

#[test]
fn missing_artifact_on_disk_is_fail_closed() {
    let dir = tempfile::tempdir().unwrap();
    write_episode(dir.path());
    std::fs::remove_file(dir.path().join(ARTIFACT_REGISTRY_SNAPSHOT)).unwrap();
    let err = read_bundle_dir(dir.path()).unwrap_err();
    match err {
        BundleDirError::Verify(e) => {
            assert_eq!(e.kind, BundleVerifyErrorKind::MissingArtifact);
            assert_eq!(e.path, ARTIFACT_REGISTRY_SNAPSHOT);
        }
        BundleDirError::Io { .. } => panic!("expected a verify error"),
    }
}

#[test]
fn dev_audit_records_tamper_without_blocking() {
    let dir = tempfile::tempdir().unwrap();
    write_episode(dir.path());
    flip_byte(dir.path(), ARTIFACT_REGISTRY_SNAPSHOT, 3);
    let bundle = read_bundle_dir(dir.path()).unwrap();
    let findings = audit(&bundle);
    assert!(!findings.is_empty());
    assert!(findings
        .iter()
        .any(|f| f.path == ARTIFACT_REGISTRY_SNAPSHOT));
}
