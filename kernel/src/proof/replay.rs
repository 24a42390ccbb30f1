//! `replay_verify()`: deterministic re-execution of a trace.
//!
//! Replay starts from the frame-0 planes, re-applies every recorded operator
//! through the same `apply()` the original episode used, and compares the
//! produced planes byte-for-byte against the recorded frames. Two traces with
//! identical header, operator set, registry, and initial state must produce
//! byte-identical payloads; anything else is a localized divergence.

use crate::carrier::bytestate::{ByteStateV1, SlotStatus};
use crate::carrier::bytetrace::{ByteTraceV1, TraceFrameV1, TraceHeaderV1};
use crate::carrier::code32::Code32;
use crate::carrier::registry::RegistryV1;
use crate::carrier::trace_writer::header_to_canonical_json;
use crate::operators::apply::apply;
use crate::operators::operator_registry::OperatorSetV1;
use crate::profile::ExecutionProfile;
use crate::proof::divergence::{first_differing_byte, frame_region, locate, DivergenceSite};
use crate::proof::hash::ContentHash;
use crate::proof::trace_hash::payload_hash;

/// Replay could not run at all (distinct from a divergence verdict).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The trace is structurally unusable for replay.
    MalformedTrace { detail: String },
    /// A header digest binding does not match the supplied artifacts.
    BindingMismatch {
        binding: &'static str,
        expected: String,
        actual: String,
    },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedTrace { detail } => write!(f, "malformed trace: {detail}"),
            Self::BindingMismatch {
                binding,
                expected,
                actual,
            } => write!(f, "{binding} binding mismatch: header has {expected}, artifacts give {actual}"),
        }
    }
}

impl std::error::Error for ReplayError {}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayVerdict {
    /// Byte-identical re-execution.
    Match { payload_hash: ContentHash },
    /// First mismatch, localized.
    Divergence { site: DivergenceSite, detail: String },
}

/// Result type for replay verification.
pub type ReplayResult = Result<ReplayVerdict, ReplayError>;

/// Re-execute `trace` against `registry` and `operator_set`.
///
/// Under [`ExecutionProfile::Cert`] the header's digest bindings
/// (`registry_digest`, `operator_set_digest`, `index_digest`) must match the
/// supplied artifacts before a single frame is replayed; `Dev` skips the
/// binding gate but replays identically.
///
/// # Errors
///
/// Returns [`ReplayError`] when replay cannot run; a completed replay that
/// found a mismatch is `Ok(ReplayVerdict::Divergence { .. })`.
pub fn replay_verify(
    trace: &ByteTraceV1,
    registry: &RegistryV1,
    operator_set: &OperatorSetV1,
    profile: ExecutionProfile,
) -> ReplayResult {
    if profile == ExecutionProfile::Cert {
        check_bindings(&trace.header, registry, operator_set)?;
    }

    if trace.frames.is_empty() {
        return Err(ReplayError::MalformedTrace {
            detail: "trace has no frames".into(),
        });
    }
    if !trace.frames[0].is_initial() {
        return Err(ReplayError::MalformedTrace {
            detail: "frame 0 is not the INITIAL_STATE sentinel".into(),
        });
    }

    let header = &trace.header;
    let mut state = state_from_frame(&trace.frames[0], header)?;

    for (index, frame) in trace.frames.iter().enumerate().skip(1) {
        let op_id = Code32::from_le_bytes(frame.op_code);
        let def = operator_set
            .get(&op_id)
            .ok_or_else(|| ReplayError::MalformedTrace {
                detail: format!("frame {index}: operator {op_id} not in the set"),
            })?;
        let args = parse_args(frame, def.arg_slot_count, index)?;

        let (new_state, record) = apply(&state, op_id, &args, registry, operator_set, profile)
            .map_err(|e| ReplayError::MalformedTrace {
                detail: format!("frame {index}: re-apply failed: {e}"),
            })?;

        if record.result_identity != frame.result_identity
            || record.result_status != frame.result_status
        {
            let site = localize_frame_mismatch(trace, index, &record.result_identity, &record.result_status, frame)?;
            return Ok(ReplayVerdict::Divergence {
                site,
                detail: format!("frame {index}: replayed planes differ from recorded planes"),
            });
        }
        state = new_state;
    }

    let hash = payload_hash(trace).map_err(|e| ReplayError::MalformedTrace {
        detail: format!("payload extraction failed: {e}"),
    })?;
    Ok(ReplayVerdict::Match { payload_hash: hash })
}

/// Compare two payloads byte-for-byte, localizing the first difference.
#[must_use]
pub fn compare_payloads(
    payload_a: &[u8],
    payload_b: &[u8],
    header: &TraceHeaderV1,
) -> ReplayVerdict {
    match locate(payload_a, payload_b, header) {
        None => ReplayVerdict::Match {
            payload_hash: crate::proof::trace_hash::payload_hash_of_bytes(payload_a),
        },
        Some(site) => ReplayVerdict::Divergence {
            site,
            detail: format!(
                "payloads diverge at byte {} (step {}, {:?})",
                site.payload_offset, site.step, site.region
            ),
        },
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn check_bindings(
    header: &TraceHeaderV1,
    registry: &RegistryV1,
    operator_set: &OperatorSetV1,
) -> Result<(), ReplayError> {
    let registry_digest = registry
        .digest()
        .map_err(|e| ReplayError::MalformedTrace {
            detail: format!("registry digest: {e}"),
        })?;
    if registry_digest.as_str() != header.registry_digest {
        return Err(ReplayError::BindingMismatch {
            binding: "registry_digest",
            expected: header.registry_digest.clone(),
            actual: registry_digest.as_str().to_string(),
        });
    }

    let set_digest = operator_set
        .digest()
        .map_err(|e| ReplayError::MalformedTrace {
            detail: format!("operator set digest: {e}"),
        })?;
    if set_digest.as_str() != header.operator_set_digest {
        return Err(ReplayError::BindingMismatch {
            binding: "operator_set_digest",
            expected: header.operator_set_digest.clone(),
            actual: set_digest.as_str().to_string(),
        });
    }

    let index_digest = operator_set
        .relational_index_digest()
        .map_err(|e| ReplayError::MalformedTrace {
            detail: format!("relational index digest: {e}"),
        })?;
    let actual = index_digest.as_ref().map(|d| d.as_str().to_string());
    if header.index_digest != actual {
        return Err(ReplayError::BindingMismatch {
            binding: "index_digest",
            expected: header.index_digest.clone().unwrap_or_else(|| "absent".into()),
            actual: actual.unwrap_or_else(|| "absent".into()),
        });
    }
    Ok(())
}

fn state_from_frame(
    frame: &TraceFrameV1,
    header: &TraceHeaderV1,
) -> Result<ByteStateV1, ReplayError> {
    let lanes = header.layer_count * header.slot_count;
    if frame.result_identity.len() != lanes * 4 || frame.result_status.len() != lanes {
        return Err(ReplayError::MalformedTrace {
            detail: "frame planes disagree with header geometry".into(),
        });
    }
    let mut identity = Vec::with_capacity(lanes);
    for chunk in frame.result_identity.chunks_exact(4) {
        identity.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    for &byte in &frame.result_status {
        if SlotStatus::from_byte(byte).is_none() {
            return Err(ReplayError::MalformedTrace {
                detail: format!("invalid status byte {byte} in initial frame"),
            });
        }
    }
    Ok(ByteStateV1::from_planes(
        header.layer_count,
        header.slot_count,
        identity,
        frame.result_status.clone(),
    ))
}

fn parse_args(
    frame: &TraceFrameV1,
    arg_slot_count: usize,
    index: usize,
) -> Result<Vec<Code32>, ReplayError> {
    if frame.op_args.len() < arg_slot_count * 4 {
        return Err(ReplayError::MalformedTrace {
            detail: format!("frame {index}: args shorter than operator arity"),
        });
    }
    let mut args = Vec::with_capacity(arg_slot_count);
    for chunk in frame.op_args[..arg_slot_count * 4].chunks_exact(4) {
        args.push(Code32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    if frame.op_args[arg_slot_count * 4..].iter().any(|&b| b != 0) {
        return Err(ReplayError::MalformedTrace {
            detail: format!("frame {index}: nonzero padding past operator arity"),
        });
    }
    Ok(args)
}

fn localize_frame_mismatch(
    trace: &ByteTraceV1,
    frame_index: usize,
    computed_identity: &[u8],
    computed_status: &[u8],
    recorded: &TraceFrameV1,
) -> Result<DivergenceSite, ReplayError> {
    let header = &trace.header;
    let arg_bytes = header.arg_slot_count * 4;
    let identity_len = recorded.result_identity.len();

    let offset_in_frame = match first_differing_byte(computed_identity, &recorded.result_identity)
    {
        Some(k) => 4 + arg_bytes + k,
        None => match first_differing_byte(computed_status, &recorded.result_status) {
            Some(k) => 4 + arg_bytes + identity_len + k,
            None => {
                return Err(ReplayError::MalformedTrace {
                    detail: "mismatch reported but planes compare equal".into(),
                })
            }
        },
    };

    let header_json = header_to_canonical_json(header).map_err(|e| ReplayError::MalformedTrace {
        detail: format!("header serialization: {e}"),
    })?;
    let body_start = 4 + 2 + header_json.len();
    let stride = header
        .bytes_per_step()
        .ok_or_else(|| ReplayError::MalformedTrace {
            detail: "header dimensions overflow".into(),
        })?;

    Ok(DivergenceSite {
        step: frame_index,
        region: frame_region(offset_in_frame, header),
        offset_in_frame,
        payload_offset: body_start + frame_index * stride + offset_in_frame,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::bytestate::ByteStateBuilder;
    use crate::carrier::bytetrace::TraceEnvelopeV1;
    use crate::carrier::schema::ByteStateSchema;
    use crate::carrier::trace_writer::TraceWriter;
    use crate::operators::operator_registry::{CostModel, OperatorDefV1};
    use crate::operators::signature::{ArgBinding, BindSite, OperatorCategory, PlaneMaskU32};
    use crate::proof::divergence::FrameRegion;

    fn schema() -> ByteStateSchema {
        ByteStateSchema::new("bytestate.v1", "test", 1, 2, vec!["only".into()]).unwrap()
    }

    fn registry() -> RegistryV1 {
        RegistryV1::new(
            "epoch-0",
            vec![
                (Code32::new(2, 1, 0), "node:zero".into()),
                (Code32::new(2, 1, 3), "node:three".into()),
            ],
        )
        .unwrap()
    }

    fn operator_set() -> OperatorSetV1 {
        let mut effect = PlaneMaskU32::new(2);
        effect.set(0, u32::MAX, 0);
        OperatorSetV1::new(
            "operator_registry.v1",
            vec![OperatorDefV1 {
                op_id: Code32::new(2, 64, 1),
                name: "MOVE".into(),
                category: OperatorCategory::Seek,
                arg_slot_count: 1,
                precondition: PlaneMaskU32::new(2),
                effect,
                status_effect: None,
                arg_bindings: vec![ArgBinding {
                    arg_index: 0,
                    lane: 0,
                    site: BindSite::EffectValue,
                }],
                relational: None,
                cost_model: CostModel::Unit,
                contract_epoch: "v1".into(),
            }],
        )
        .unwrap()
    }

    fn bound_header() -> TraceHeaderV1 {
        TraceHeaderV1 {
            schema_version: "bytestate.v1".into(),
            domain_id: "test".into(),
            registry_digest: registry().digest().unwrap().as_str().to_string(),
            operator_set_digest: operator_set().digest().unwrap().as_str().to_string(),
            policy_digest: "sha256:cc".into(),
            fixture_hash: "sha256:dd".into(),
            step_count: 0,
            layer_count: 1,
            slot_count: 2,
            arg_slot_count: 1,
            index_digest: None,
        }
    }

    fn episode_trace() -> ByteTraceV1 {
        let mut writer = TraceWriter::new(
            TraceEnvelopeV1 {
                trace_id: "t".into(),
                created_at: "2026-01-01T00:00:00Z".into(),
                writer_version: "0.1.0".into(),
                wall_time_ms: 0,
            },
            bound_header(),
        )
        .unwrap();
        writer.open().unwrap();

        let mut builder = ByteStateBuilder::from_schema(&schema());
        builder.set_identity(0, 0, Code32::new(2, 1, 0));
        let initial = builder.finish();
        writer.append_initial(&initial).unwrap();

        let (next, record) = apply(
            &initial,
            Code32::new(2, 64, 1),
            &[Code32::new(2, 1, 3)],
            &registry(),
            &operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap();
        writer.append_step(&record).unwrap();
        let _ = next;
        writer.close(false).unwrap()
    }

    #[test]
    fn clean_replay_matches() {
        let trace = episode_trace();
        let verdict = replay_verify(
            &trace,
            &registry(),
            &operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap();
        let expected = payload_hash(&trace).unwrap();
        assert_eq!(
            verdict,
            ReplayVerdict::Match {
                payload_hash: expected
            }
        );
    }

    #[test]
    fn tampered_identity_byte_is_localized() {
        let mut trace = episode_trace();
        // Flip bit 7 of identity byte 0 in frame 1 (slot 0, layer 0).
        trace.frames[1].result_identity[0] ^= 0x80;
        let verdict = replay_verify(
            &trace,
            &registry(),
            &operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap();
        match verdict {
            ReplayVerdict::Divergence { site, .. } => {
                assert_eq!(site.step, 1);
                assert_eq!(
                    site.region,
                    FrameRegion::Identity {
                        layer: 0,
                        slot: 0,
                        byte: 0
                    }
                );
            }
            ReplayVerdict::Match { .. } => panic!("tampered trace must diverge"),
        }
    }

    #[test]
    fn tampered_status_byte_is_localized() {
        let mut trace = episode_trace();
        trace.frames[1].result_status[1] = SlotStatus::Shadow.to_byte();
        let verdict = replay_verify(
            &trace,
            &registry(),
            &operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap();
        match verdict {
            ReplayVerdict::Divergence { site, .. } => {
                assert_eq!(site.step, 1);
                assert_eq!(site.region, FrameRegion::Status { layer: 0, slot: 1 });
            }
            ReplayVerdict::Match { .. } => panic!("tampered trace must diverge"),
        }
    }

    #[test]
    fn cert_rejects_unbound_registry() {
        let trace = episode_trace();
        let other_registry =
            RegistryV1::new("epoch-1", vec![(Code32::new(2, 1, 0), "n".into())]).unwrap();
        let err = replay_verify(
            &trace,
            &other_registry,
            &operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::BindingMismatch {
                binding: "registry_digest",
                ..
            }
        ));
    }

    #[test]
    fn dev_skips_binding_gate_but_replays() {
        let trace = episode_trace();
        let mut tampered_header = trace.clone();
        tampered_header.header.registry_digest = "sha256:ff".into();
        // Dev profile: binding not checked, replay still byte-exact.
        let verdict = replay_verify(
            &tampered_header,
            &registry(),
            &operator_set(),
            ExecutionProfile::Dev,
        )
        .unwrap();
        assert!(matches!(verdict, ReplayVerdict::Match { .. }));
    }

    #[test]
    fn empty_trace_is_malformed() {
        let mut trace = episode_trace();
        trace.frames.clear();
        trace.header.step_count = 0;
        let err = replay_verify(
            &trace,
            &registry(),
            &operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::MalformedTrace { .. }));
    }

    #[test]
    fn unknown_operator_in_frame_is_malformed() {
        let mut trace = episode_trace();
        trace.frames[1].op_code = Code32::new(9, 9, 9).to_le_bytes();
        let err = replay_verify(
            &trace,
            &registry(),
            &operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::MalformedTrace { .. }));
    }

    #[test]
    fn compare_payloads_localizes_like_replay() {
        let trace = episode_trace();
        let a = crate::carrier::trace_writer::extract_payload_bytes(&trace).unwrap();
        let mut b = a.clone();
        assert!(matches!(
            compare_payloads(&a, &b, &trace.header),
            ReplayVerdict::Match { .. }
        ));
        // Flip an identity byte of frame 1.
        let header_json = header_to_canonical_json(&trace.header).unwrap();
        let stride = trace.header.bytes_per_step().unwrap();
        let body_start = 4 + 2 + header_json.len();
        b[body_start + stride + 8] ^= 0x80;
        match compare_payloads(&a, &b, &trace.header) {
            ReplayVerdict::Divergence { site, .. } => {
                assert_eq!(site.step, 1);
                assert!(matches!(site.region, FrameRegion::Identity { .. }));
            }
            ReplayVerdict::Match { .. } => panic!("expected divergence"),
        }
    }
}
