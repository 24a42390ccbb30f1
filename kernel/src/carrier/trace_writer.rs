//! `TraceWriter`: stateful `.bst1` production with atomic persistence.
//!
//! # State machine
//!
//! ```text
//! Empty --open()--> Open --append_initial()--> Active --close()--> Closed
//!                                   |                    |
//!                                   +---- I/O error -----+--> Failed
//! ```
//!
//! No backward transitions. The header freezes at `open()`; any later
//! mutation attempt is a [`TraceError::HeaderImmutableViolation`]. A persist
//! failure deletes the partial file and parks the writer in `Failed`.
//!
//! Serialization is a pure byte transform over the assembled trace; header
//! and footer JSON come exclusively from `proof::canon`.

use std::io::Write;
use std::path::Path;

use crate::carrier::bytestate::ByteStateV1;
use crate::carrier::bytetrace::{
    ByteTraceV1, TraceEnvelopeV1, TraceError, TraceFooterV1, TraceFrameV1, TraceHeaderV1,
    BYTETRACE_V1_MAGIC, MAX_SECTION_LEN,
};
use crate::carrier::code32::Code32;
use crate::operators::apply::StepRecord;
use crate::proof::canon::canonical_json_bytes;
use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Writer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Empty,
    Open,
    Active,
    Closed,
    Failed,
}

/// Stateful trace writer.
#[derive(Debug)]
pub struct TraceWriter {
    envelope: TraceEnvelopeV1,
    header: TraceHeaderV1,
    frames: Vec<TraceFrameV1>,
    state: WriterState,
}

impl TraceWriter {
    /// Create a writer in `Empty` with a header whose `step_count` is 0
    /// (filled at close).
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::DimensionOverflow`] if the header geometry does
    /// not produce a finite stride.
    pub fn new(envelope: TraceEnvelopeV1, header: TraceHeaderV1) -> Result<Self, TraceError> {
        if header.bytes_per_step().is_none() {
            return Err(TraceError::DimensionOverflow);
        }
        Ok(Self {
            envelope,
            header,
            frames: Vec::new(),
            state: WriterState::Empty,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Replace the header. Only legal before `open()`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::HeaderImmutableViolation`] in any later state.
    pub fn bind_header(&mut self, header: TraceHeaderV1) -> Result<(), TraceError> {
        if self.state != WriterState::Empty {
            return Err(TraceError::HeaderImmutableViolation);
        }
        if header.bytes_per_step().is_none() {
            return Err(TraceError::DimensionOverflow);
        }
        self.header = header;
        Ok(())
    }

    /// Freeze the header: `Empty -> Open`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::HeaderImmutableViolation`] if not in `Empty`.
    pub fn open(&mut self) -> Result<(), TraceError> {
        if self.state != WriterState::Empty {
            return Err(TraceError::HeaderImmutableViolation);
        }
        self.state = WriterState::Open;
        Ok(())
    }

    /// Emit frame 0 (the `INITIAL_STATE` sentinel): `Open -> Active`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError`] if not in `Open` or the state's planes disagree
    /// with the header geometry.
    pub fn append_initial(&mut self, initial: &ByteStateV1) -> Result<(), TraceError> {
        if self.state != WriterState::Open {
            return Err(TraceError::HeaderImmutableViolation);
        }
        let frame = TraceFrameV1 {
            op_code: Code32::INITIAL_STATE.to_le_bytes(),
            op_args: vec![0; self.header.arg_slot_count * 4],
            result_identity: initial.identity_bytes(),
            result_status: initial.status_bytes(),
        };
        self.check_frame_widths(&frame, 0)?;
        self.frames.push(frame);
        self.state = WriterState::Active;
        Ok(())
    }

    /// Append a transition frame from a [`StepRecord`]: `Active -> Active`.
    ///
    /// Args shorter than the header's `arg_slot_count` are zero-padded so the
    /// stride stays constant.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::StrideMismatch`] if the record's planes or args
    /// disagree with the header geometry.
    pub fn append_step(&mut self, record: &StepRecord) -> Result<(), TraceError> {
        if self.state != WriterState::Active {
            return Err(TraceError::HeaderImmutableViolation);
        }
        let arg_bytes = self.header.arg_slot_count * 4;
        if record.op_args.len() > arg_bytes {
            return Err(TraceError::StrideMismatch {
                frame_index: self.frames.len(),
                detail: format!(
                    "op_args {} bytes exceeds header arg capacity {arg_bytes}",
                    record.op_args.len()
                ),
            });
        }
        let mut op_args = record.op_args.clone();
        op_args.resize(arg_bytes, 0);
        let frame = TraceFrameV1 {
            op_code: record.op_code,
            op_args,
            result_identity: record.result_identity.clone(),
            result_status: record.result_status.clone(),
        };
        self.check_frame_widths(&frame, self.frames.len())?;
        self.frames.push(frame);
        Ok(())
    }

    /// Close the trace: `Active -> Closed`. Computes the footer from the last
    /// frame's planes and stamps the final `step_count` into the header.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::HeaderImmutableViolation`] if not in `Active`.
    pub fn close(&mut self, truncated: bool) -> Result<ByteTraceV1, TraceError> {
        if self.state != WriterState::Active {
            return Err(TraceError::HeaderImmutableViolation);
        }
        // frames is non-empty in Active by construction.
        let last = &self.frames[self.frames.len() - 1];
        let final_identity_hash =
            canonical_hash(HashDomain::BytestateIdentity, &last.result_identity);
        let mut evidence = last.result_identity.clone();
        evidence.extend_from_slice(&last.result_status);
        let final_evidence_hash = canonical_hash(HashDomain::BytestateEvidence, &evidence);

        let mut header = self.header.clone();
        header.step_count = self.frames.len();
        self.state = WriterState::Closed;
        Ok(ByteTraceV1 {
            envelope: self.envelope.clone(),
            header,
            frames: self.frames.clone(),
            footer: TraceFooterV1 {
                final_identity_hash: final_identity_hash.as_str().to_string(),
                final_evidence_hash: final_evidence_hash.as_str().to_string(),
                truncated,
            },
        })
    }

    /// Close, persist atomically, and return `(trace, payload_hash)`.
    ///
    /// On any persistence failure the writer transitions to `Failed` and the
    /// partial file is removed.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::IoError`] or [`TraceError::TraceHashMismatch`]
    /// from the read-back verification.
    pub fn close_and_persist(
        &mut self,
        truncated: bool,
        path: &Path,
    ) -> Result<(ByteTraceV1, ContentHash), TraceError> {
        let trace = self.close(truncated)?;
        match persist_trace(&trace, path) {
            Ok(hash) => Ok((trace, hash)),
            Err(e) => {
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }

    fn check_frame_widths(&self, frame: &TraceFrameV1, index: usize) -> Result<(), TraceError> {
        let lanes = self.header.layer_count * self.header.slot_count;
        if frame.op_args.len() != self.header.arg_slot_count * 4 {
            return Err(TraceError::StrideMismatch {
                frame_index: index,
                detail: format!(
                    "op_args {} bytes, expected {}",
                    frame.op_args.len(),
                    self.header.arg_slot_count * 4
                ),
            });
        }
        if frame.result_identity.len() != lanes * 4 {
            return Err(TraceError::StrideMismatch {
                frame_index: index,
                detail: format!(
                    "identity {} bytes, expected {}",
                    frame.result_identity.len(),
                    lanes * 4
                ),
            });
        }
        if frame.result_status.len() != lanes {
            return Err(TraceError::StrideMismatch {
                frame_index: index,
                detail: format!(
                    "status {} bytes, expected {lanes}",
                    frame.result_status.len()
                ),
            });
        }
        Ok(())
    }
}

/// Serialize a trace to `.bst1` bytes.
///
/// # Errors
///
/// Returns [`TraceError`] on step-count mismatch, stride mismatch, bad frame
/// 0 sentinel, oversized sections, or overflow.
pub fn trace_to_bytes(trace: &ByteTraceV1) -> Result<Vec<u8>, TraceError> {
    validate_trace(trace)?;

    let envelope_json = envelope_to_json(&trace.envelope);
    check_section("envelope", envelope_json.len())?;
    let header_json = header_to_canonical_json(&trace.header)?;
    check_section("header", header_json.len())?;
    let footer_json = footer_to_canonical_json(&trace.footer)?;
    check_section("footer", footer_json.len())?;

    let body_len = trace.header.body_len().ok_or(TraceError::DimensionOverflow)?;
    let mut buf =
        Vec::with_capacity(2 + envelope_json.len() + 4 + 2 + header_json.len() + body_len + 2 + footer_json.len());

    push_u16_section(&mut buf, &envelope_json);
    buf.extend_from_slice(&BYTETRACE_V1_MAGIC);
    push_u16_section(&mut buf, &header_json);
    for frame in &trace.frames {
        buf.extend_from_slice(&frame.op_code);
        buf.extend_from_slice(&frame.op_args);
        buf.extend_from_slice(&frame.result_identity);
        buf.extend_from_slice(&frame.result_status);
    }
    push_u16_section(&mut buf, &footer_json);
    Ok(buf)
}

/// The hashed payload bytes: `magic || header_len || header || body || footer_len || footer`.
///
/// The envelope and its length prefix are excluded; the header/footer length
/// prefixes are part of the hashed surface.
///
/// # Errors
///
/// Returns [`TraceError`] under the same conditions as [`trace_to_bytes`].
pub fn extract_payload_bytes(trace: &ByteTraceV1) -> Result<Vec<u8>, TraceError> {
    let full = trace_to_bytes(trace)?;
    let envelope_len = u16::from_le_bytes([full[0], full[1]]) as usize;
    Ok(full[2 + envelope_len..].to_vec())
}

/// Persist a trace atomically: temp file, fsync, rename, read-back verify.
///
/// Returns the payload hash confirmed by the read-back.
///
/// # Errors
///
/// Returns [`TraceError::IoError`] on filesystem failure (the partial file is
/// deleted) and [`TraceError::TraceHashMismatch`] if the read-back bytes do
/// not reproduce the in-memory payload hash.
pub fn persist_trace(trace: &ByteTraceV1, path: &Path) -> Result<ContentHash, TraceError> {
    let bytes = trace_to_bytes(trace)?;
    let payload = extract_payload_bytes(trace)?;
    let expected = canonical_hash(HashDomain::ByteTrace, &payload);

    let dir = path.parent().ok_or_else(|| TraceError::IoError {
        detail: "trace path has no parent directory".into(),
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".tmp_{file_name}"));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();
    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(TraceError::IoError {
            detail: format!("persist {}: {e}", path.display()),
        });
    }

    // Read-back verification before declaring success.
    let read_back = std::fs::read(path).map_err(|e| TraceError::IoError {
        detail: format!("read-back {}: {e}", path.display()),
    })?;
    let envelope_len = if read_back.len() >= 2 {
        u16::from_le_bytes([read_back[0], read_back[1]]) as usize
    } else {
        0
    };
    let actual = if read_back.len() >= 2 + envelope_len {
        canonical_hash(HashDomain::ByteTrace, &read_back[2 + envelope_len..])
    } else {
        canonical_hash(HashDomain::ByteTrace, b"")
    };
    if actual != expected {
        let _ = std::fs::remove_file(path);
        return Err(TraceError::TraceHashMismatch {
            expected: expected.as_str().to_string(),
            actual: actual.as_str().to_string(),
            site: None,
        });
    }
    Ok(expected)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_trace(trace: &ByteTraceV1) -> Result<(), TraceError> {
    if trace.frames.len() != trace.header.step_count {
        return Err(TraceError::StepCountMismatch {
            header: trace.header.step_count,
            actual: trace.frames.len(),
        });
    }
    let stride = trace
        .header
        .bytes_per_step()
        .ok_or(TraceError::DimensionOverflow)?;
    let lanes = trace.header.layer_count * trace.header.slot_count;
    let arg_bytes = trace.header.arg_slot_count * 4;

    if let Some(first) = trace.frames.first() {
        if !first.is_initial() {
            return Err(TraceError::BadInitialFrame {
                detail: format!(
                    "frame 0 op_code {:?} with nonzero args is not INITIAL_STATE",
                    first.op_code
                ),
            });
        }
    }
    for (i, frame) in trace.frames.iter().enumerate() {
        let width = 4 + frame.op_args.len() + frame.result_identity.len() + frame.result_status.len();
        if width != stride
            || frame.op_args.len() != arg_bytes
            || frame.result_identity.len() != lanes * 4
            || frame.result_status.len() != lanes
        {
            return Err(TraceError::StrideMismatch {
                frame_index: i,
                detail: format!("frame width {width}, stride {stride}"),
            });
        }
    }
    Ok(())
}

fn check_section(section: &'static str, len: usize) -> Result<(), TraceError> {
    if len > MAX_SECTION_LEN {
        return Err(TraceError::SectionTooLong { section, len });
    }
    Ok(())
}

fn push_u16_section(buf: &mut Vec<u8>, section: &[u8]) {
    #[allow(clippy::cast_possible_truncation)]
    let len = section.len() as u16; // checked by check_section
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(section);
}

/// Envelope JSON (not canonical; the envelope is never hashed).
fn envelope_to_json(envelope: &TraceEnvelopeV1) -> Vec<u8> {
    let value = serde_json::json!({
        "created_at": envelope.created_at,
        "trace_id": envelope.trace_id,
        "wall_time_ms": envelope.wall_time_ms,
        "writer_version": envelope.writer_version,
    });
    serde_json::to_vec(&value).unwrap_or_default()
}

pub(crate) fn header_to_canonical_json(header: &TraceHeaderV1) -> Result<Vec<u8>, TraceError> {
    let mut map = serde_json::Map::new();
    map.insert("arg_slot_count".into(), (header.arg_slot_count as u64).into());
    map.insert("domain_id".into(), header.domain_id.clone().into());
    map.insert("fixture_hash".into(), header.fixture_hash.clone().into());
    if let Some(digest) = &header.index_digest {
        map.insert("index_digest".into(), digest.clone().into());
    }
    map.insert("layer_count".into(), (header.layer_count as u64).into());
    map.insert(
        "operator_set_digest".into(),
        header.operator_set_digest.clone().into(),
    );
    map.insert("policy_digest".into(), header.policy_digest.clone().into());
    map.insert(
        "registry_digest".into(),
        header.registry_digest.clone().into(),
    );
    map.insert(
        "schema_version".into(),
        header.schema_version.clone().into(),
    );
    map.insert("slot_count".into(), (header.slot_count as u64).into());
    map.insert("step_count".into(), (header.step_count as u64).into());
    canonical_json_bytes(&serde_json::Value::Object(map)).map_err(|_| TraceError::NonCanonical {
        section: "header",
    })
}

pub(crate) fn footer_to_canonical_json(footer: &TraceFooterV1) -> Result<Vec<u8>, TraceError> {
    let value = serde_json::json!({
        "final_evidence_hash": footer.final_evidence_hash,
        "final_identity_hash": footer.final_identity_hash,
        "truncated": footer.truncated,
    });
    canonical_json_bytes(&value).map_err(|_| TraceError::NonCanonical { section: "footer" })
}
