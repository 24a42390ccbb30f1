//! Bundle directory persistence: atomic write, fail-closed read.
//!
//! Layout: the artifact files named in `bundle.rs` plus
//! `verification_report.json`. The directory path never enters any hash
//! surface; the report's listing is the source of truth. Undeclared extra
//! files and missing declared files both fail the read.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use crate::bundle::{
    parse_report, ArtifactBundleV1, BundleArtifact, BundleVerifyError, BundleVerifyErrorKind,
    ARTIFACT_REPORT,
};

/// I/O-level bundle directory failure.
#[derive(Debug)]
pub enum BundleDirError {
    Io { detail: String },
    Verify(BundleVerifyError),
}

impl std::fmt::Display for BundleDirError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { detail } => write!(f, "bundle dir I/O: {detail}"),
            Self::Verify(e) => write!(f, "bundle dir verify: {e}"),
        }
    }
}

impl std::error::Error for BundleDirError {}

impl From<BundleVerifyError> for BundleDirError {
    fn from(e: BundleVerifyError) -> Self {
        Self::Verify(e)
    }
}

/// Write a bundle to `dir`: every artifact and the report, each via
/// temp-file + fsync + rename, then a full read-back verification.
///
/// # Errors
///
/// Returns [`BundleDirError`] on I/O failure or read-back mismatch.
pub fn write_bundle_dir(bundle: &ArtifactBundleV1, dir: &Path) -> Result<(), BundleDirError> {
    std::fs::create_dir_all(dir).map_err(|e| BundleDirError::Io {
        detail: format!("create_dir_all {}: {e}", dir.display()),
    })?;

    for artifact in bundle.artifacts.values() {
        write_atomic(&dir.join(&artifact.path), &artifact.content)?;
    }
    write_atomic(&dir.join(ARTIFACT_REPORT), &bundle.report)?;

    // Read back before declaring success.
    let reloaded = read_bundle_dir(dir)?;
    crate::verify::verify_base(&reloaded)?;
    Ok(())
}

/// Read a bundle directory fail-closed.
///
/// - Missing declared artifact: `MissingArtifact { path }`.
/// - Undeclared extra file: `ReportInconsistent { path }`.
///
/// Content hashes are re-checked by `verify::verify_base`, which every
/// consumer calls after this.
///
/// # Errors
///
/// Returns [`BundleDirError`] on I/O failure or structural mismatch.
pub fn read_bundle_dir(dir: &Path) -> Result<ArtifactBundleV1, BundleDirError> {
    let report = std::fs::read(dir.join(ARTIFACT_REPORT)).map_err(|_| {
        BundleDirError::Verify(BundleVerifyError {
            kind: BundleVerifyErrorKind::MissingArtifact,
            path: ARTIFACT_REPORT.into(),
            detail: "verification report missing".into(),
        })
    })?;
    let parsed = parse_report(&report)?;

    let mut artifacts = std::collections::BTreeMap::new();
    let mut declared: BTreeSet<String> = BTreeSet::new();
    for entry in &parsed.entries {
        declared.insert(entry.path.clone());
        let content = std::fs::read(dir.join(&entry.path)).map_err(|_| {
            BundleDirError::Verify(BundleVerifyError {
                kind: BundleVerifyErrorKind::MissingArtifact,
                path: entry.path.clone(),
                detail: "declared artifact missing from directory".into(),
            })
        })?;
        artifacts.insert(
            entry.path.clone(),
            BundleArtifact {
                path: entry.path.clone(),
                content_hash: crate::bundle::artifact_hash(&content),
                content,
            },
        );
    }

    // Reject undeclared files.
    let entries = std::fs::read_dir(dir).map_err(|e| BundleDirError::Io {
        detail: format!("read_dir {}: {e}", dir.display()),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| BundleDirError::Io {
            detail: format!("dir entry: {e}"),
        })?;
        let is_file = entry
            .file_type()
            .map_err(|e| BundleDirError::Io {
                detail: format!("file_type: {e}"),
            })?
            .is_file();
        if !is_file {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            continue;
        };
        if name.starts_with(".tmp_") || name == ARTIFACT_REPORT {
            continue;
        }
        if !declared.contains(&name) {
            return Err(BundleDirError::Verify(BundleVerifyError {
                kind: BundleVerifyErrorKind::ReportInconsistent,
                path: name,
                detail: "undeclared file in bundle directory".into(),
            }));
        }
    }

    Ok(ArtifactBundleV1 { artifacts, report })
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), BundleDirError> {
    let dir = path.parent().ok_or_else(|| BundleDirError::Io {
        detail: "artifact path has no parent".into(),
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".tmp_{file_name}"));

    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(BundleDirError::Io {
            detail: format!("write {}: {e}", path.display()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::build_bundle;
    use sterling_kernel::profile::ExecutionProfile;

    fn sample() -> ArtifactBundleV1 {
        build_bundle(
            vec![
                ("fixture.json".into(), br#"{"a":1}"#.to_vec()),
                ("search_tape.bin".into(), vec![1, 2, 3, 4]),
            ],
            ExecutionProfile::Cert,
            false,
        )
        .unwrap()
    }

    #[test]
    fn write_read_round_trip() {
        let bundle = sample();
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(&bundle, dir.path()).unwrap();
        let loaded = read_bundle_dir(dir.path()).unwrap();
        assert_eq!(loaded, bundle);
        // No temp droppings.
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(!name.to_string_lossy().starts_with(".tmp_"));
        }
    }

    #[test]
    fn missing_report_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bundle_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            BundleDirError::Verify(BundleVerifyError {
                kind: BundleVerifyErrorKind::MissingArtifact,
                ..
            })
        ));
    }

    #[test]
    fn missing_declared_artifact_fails_closed() {
        let bundle = sample();
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(&bundle, dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("fixture.json")).unwrap();
        let err = read_bundle_dir(dir.path()).unwrap_err();
        match err {
            BundleDirError::Verify(e) => {
                assert_eq!(e.kind, BundleVerifyErrorKind::MissingArtifact);
                assert_eq!(e.path, "fixture.json");
            }
            BundleDirError::Io { .. } => panic!("expected verify error"),
        }
    }

    #[test]
    fn undeclared_extra_file_fails_closed() {
        let bundle = sample();
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(&bundle, dir.path()).unwrap();
        std::fs::write(dir.path().join("rogue.txt"), b"surprise").unwrap();
        let err = read_bundle_dir(dir.path()).unwrap_err();
        match err {
            BundleDirError::Verify(e) => {
                assert_eq!(e.kind, BundleVerifyErrorKind::ReportInconsistent);
                assert_eq!(e.path, "rogue.txt");
            }
            BundleDirError::Io { .. } => panic!("expected verify error"),
        }
    }
}
