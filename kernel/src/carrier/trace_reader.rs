//! `.bst1` reader: fail-closed parsing with canonical enforcement.
//!
//! Rejects truncated input, bad magic, non-canonical header/footer bytes,
//! invalid status bytes, geometry mismatches, bad frame-0 sentinels, and
//! trailing bytes. No partial frames, no panics on malformed input.
//!
//! Header and footer bytes must re-serialize byte-for-byte through
//! `proof::canon`, so "hash of the bytes in the file" and "hash of the
//! canonicalized semantics" are the same claim.

use std::path::Path;

use crate::carrier::bytestate::SlotStatus;
use crate::carrier::bytetrace::{
    ByteTraceV1, TraceEnvelopeV1, TraceError, TraceFooterV1, TraceFrameV1, TraceHeaderV1,
    BYTETRACE_V1_MAGIC, MAX_SECTION_LEN,
};
use crate::proof::canon::is_canonical;
use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Parse `.bst1` bytes into a trace.
///
/// # Errors
///
/// Returns a typed [`TraceError`] on any structural defect.
pub fn bytes_to_trace(data: &[u8]) -> Result<ByteTraceV1, TraceError> {
    let mut cursor = Cursor { data, pos: 0 };

    // Envelope (unhashed, still structurally validated).
    let envelope_len = cursor.read_u16_len("envelope")?;
    check_section("envelope", envelope_len)?;
    let envelope_bytes = cursor.read_slice(envelope_len, "envelope")?;
    let envelope = parse_envelope(envelope_bytes)?;

    // Magic.
    let magic = cursor.read_slice(4, "magic")?;
    if magic != BYTETRACE_V1_MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(TraceError::BadMagic { found });
    }

    // Header, canonical-enforced.
    let header_len = cursor.read_u16_len("header")?;
    check_section("header", header_len)?;
    let header_bytes = cursor.read_slice(header_len, "header")?;
    if !is_canonical(header_bytes) {
        return Err(TraceError::NonCanonical { section: "header" });
    }
    let header = parse_header(header_bytes)?;

    // Body.
    let stride = header
        .bytes_per_step()
        .ok_or(TraceError::DimensionOverflow)?;
    let body_len = header.body_len().ok_or(TraceError::DimensionOverflow)?;
    let body = cursor.read_slice(body_len, "body")?;
    let frames = parse_frames(body, &header, stride)?;
    if let Some(first) = frames.first() {
        if !first.is_initial() {
            return Err(TraceError::BadInitialFrame {
                detail: "frame 0 is not the INITIAL_STATE sentinel with zero args".into(),
            });
        }
    }

    // Footer, canonical-enforced.
    let footer_len = cursor.read_u16_len("footer")?;
    check_section("footer", footer_len)?;
    let footer_bytes = cursor.read_slice(footer_len, "footer")?;
    if !is_canonical(footer_bytes) {
        return Err(TraceError::NonCanonical { section: "footer" });
    }
    let footer = parse_footer(footer_bytes)?;

    if cursor.pos != data.len() {
        return Err(TraceError::TrailingBytes {
            excess: data.len() - cursor.pos,
        });
    }

    Ok(ByteTraceV1 {
        envelope,
        header,
        frames,
        footer,
    })
}

/// The payload slice of serialized trace bytes (magic onward).
///
/// # Errors
///
/// Returns [`TraceError::Truncated`] if even the envelope frame is short.
pub fn payload_slice(data: &[u8]) -> Result<&[u8], TraceError> {
    if data.len() < 2 {
        return Err(TraceError::Truncated {
            detail: "missing envelope length".into(),
        });
    }
    let envelope_len = u16::from_le_bytes([data[0], data[1]]) as usize;
    if data.len() < 2 + envelope_len {
        return Err(TraceError::Truncated {
            detail: "envelope shorter than declared".into(),
        });
    }
    Ok(&data[2 + envelope_len..])
}

/// Read and validate a trace file.
///
/// Always recomputes the payload hash; when `expected_payload_hash` is given
/// (from a verification report), a mismatch is fail-closed and the content is
/// not exposed.
///
/// # Errors
///
/// Returns [`TraceError::IoError`], any parse error, or
/// [`TraceError::TraceHashMismatch`].
pub fn read_trace_file(
    path: &Path,
    expected_payload_hash: Option<&ContentHash>,
) -> Result<(ByteTraceV1, ContentHash), TraceError> {
    let data = std::fs::read(path).map_err(|e| TraceError::IoError {
        detail: format!("read {}: {e}", path.display()),
    })?;
    let payload = payload_slice(&data)?;
    let actual = canonical_hash(HashDomain::ByteTrace, payload);
    if let Some(expected) = expected_payload_hash {
        if &actual != expected {
            return Err(TraceError::TraceHashMismatch {
                expected: expected.as_str().to_string(),
                actual: actual.as_str().to_string(),
                site: None,
            });
        }
    }
    let trace = bytes_to_trace(&data)?;
    Ok((trace, actual))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_u16_len(&mut self, section: &'static str) -> Result<usize, TraceError> {
        let bytes = self.read_slice(2, section)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
    }

    fn read_slice(&mut self, len: usize, section: &'static str) -> Result<&'a [u8], TraceError> {
        let end = self.pos.checked_add(len).ok_or(TraceError::DimensionOverflow)?;
        if end > self.data.len() {
            return Err(TraceError::Truncated {
                detail: format!(
                    "{section}: need {len} bytes at offset {}, {} remain",
                    self.pos,
                    self.data.len() - self.pos
                ),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

fn check_section(section: &'static str, len: usize) -> Result<(), TraceError> {
    if len > MAX_SECTION_LEN {
        return Err(TraceError::SectionTooLong { section, len });
    }
    Ok(())
}

fn parse_envelope(bytes: &[u8]) -> Result<TraceEnvelopeV1, TraceError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| TraceError::InvalidSection {
            section: "envelope",
            detail: format!("JSON parse: {e}"),
        })?;
    let obj = value.as_object().ok_or(TraceError::InvalidSection {
        section: "envelope",
        detail: "expected JSON object".into(),
    })?;
    Ok(TraceEnvelopeV1 {
        trace_id: get_string(obj, "trace_id", "envelope")?,
        created_at: get_string(obj, "created_at", "envelope")?,
        writer_version: get_string(obj, "writer_version", "envelope")?,
        wall_time_ms: get_u64(obj, "wall_time_ms", "envelope")?,
    })
}

fn parse_header(bytes: &[u8]) -> Result<TraceHeaderV1, TraceError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| TraceError::InvalidSection {
            section: "header",
            detail: format!("JSON parse: {e}"),
        })?;
    let obj = value.as_object().ok_or(TraceError::InvalidSection {
        section: "header",
        detail: "expected JSON object".into(),
    })?;

    let index_digest = match obj.get("index_digest") {
        None => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(TraceError::InvalidSection {
                section: "header",
                detail: "index_digest must be a string when present".into(),
            })
        }
    };

    Ok(TraceHeaderV1 {
        schema_version: get_string(obj, "schema_version", "header")?,
        domain_id: get_string(obj, "domain_id", "header")?,
        registry_digest: get_string(obj, "registry_digest", "header")?,
        operator_set_digest: get_string(obj, "operator_set_digest", "header")?,
        policy_digest: get_string(obj, "policy_digest", "header")?,
        fixture_hash: get_string(obj, "fixture_hash", "header")?,
        step_count: get_usize(obj, "step_count", "header")?,
        layer_count: get_usize(obj, "layer_count", "header")?,
        slot_count: get_usize(obj, "slot_count", "header")?,
        arg_slot_count: get_usize(obj, "arg_slot_count", "header")?,
        index_digest,
    })
}

fn parse_footer(bytes: &[u8]) -> Result<TraceFooterV1, TraceError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| TraceError::InvalidSection {
            section: "footer",
            detail: format!("JSON parse: {e}"),
        })?;
    let obj = value.as_object().ok_or(TraceError::InvalidSection {
        section: "footer",
        detail: "expected JSON object".into(),
    })?;
    let truncated = obj
        .get("truncated")
        .and_then(serde_json::Value::as_bool)
        .ok_or(TraceError::InvalidSection {
            section: "footer",
            detail: "missing or non-bool 'truncated'".into(),
        })?;
    Ok(TraceFooterV1 {
        final_identity_hash: get_string(obj, "final_identity_hash", "footer")?,
        final_evidence_hash: get_string(obj, "final_evidence_hash", "footer")?,
        truncated,
    })
}

fn parse_frames(
    body: &[u8],
    header: &TraceHeaderV1,
    stride: usize,
) -> Result<Vec<TraceFrameV1>, TraceError> {
    let lanes = header.layer_count * header.slot_count;
    let arg_bytes = header.arg_slot_count * 4;
    let identity_bytes = lanes * 4;

    let mut frames = Vec::with_capacity(header.step_count);
    for i in 0..header.step_count {
        let frame_bytes = &body[i * stride..(i + 1) * stride];
        let mut op_code = [0u8; 4];
        op_code.copy_from_slice(&frame_bytes[..4]);
        let op_args = frame_bytes[4..4 + arg_bytes].to_vec();
        let result_identity = frame_bytes[4 + arg_bytes..4 + arg_bytes + identity_bytes].to_vec();
        let status_slice = &frame_bytes[4 + arg_bytes + identity_bytes..];
        for &byte in status_slice {
            if SlotStatus::from_byte(byte).is_none() {
                return Err(TraceError::InvalidStatusByte {
                    frame_index: i,
                    byte,
                });
            }
        }
        frames.push(TraceFrameV1 {
            op_code,
            op_args,
            result_identity,
            result_status: status_slice.to_vec(),
        });
    }
    Ok(frames)
}

fn get_string(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    section: &'static str,
) -> Result<String, TraceError> {
    obj.get(key)
        .and_then(serde_json::Value::as_str)
        .map(String::from)
        .ok_or_else(|| TraceError::InvalidSection {
            section,
            detail: format!("missing or non-string '{key}'"),
        })
}

fn get_u64(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    section: &'static str,
) -> Result<u64, TraceError> {
    obj.get(key)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| TraceError::InvalidSection {
            section,
            detail: format!("missing or non-integer '{key}'"),
        })
}

fn get_usize(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    section: &'static str,
) -> Result<usize, TraceError> {
    usize::try_from(get_u64(obj, key, section)?).map_err(|_| TraceError::InvalidSection {
        section,
        detail: format!("'{key}' exceeds platform usize"),
    })
}
