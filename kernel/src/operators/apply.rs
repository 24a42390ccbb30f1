//! `apply()`: masked operator application over `ByteState`.
//!
//! The whole semantics is three branchless lane loops:
//!
//! ```text
//! sat    = AND_i ((id_i & pre_mask_i) == (pre_val_i & pre_mask_i))
//! new_id = (id & !eff_mask) | (eff_val & eff_mask)
//! new_st = (st & !st_mask)  | (st_val & st_mask)
//! ```
//!
//! plus an optional relational resolve step whose writes are confined to the
//! operator's declared region. Fail-closed on every contract breach; the old
//! state is never touched (value semantics).

use crate::carrier::bytestate::ByteStateV1;
use crate::carrier::code32::Code32;
use crate::carrier::registry::RegistryV1;
use crate::operators::operator_registry::{OperatorDefV1, OperatorSetV1};
use crate::operators::signature::BindSite;
use crate::profile::ExecutionProfile;

/// The bytes written into one trace frame for one applied operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Operator code, little-endian bytes.
    pub op_code: [u8; 4],
    /// Args serialized little-endian, exactly `arg_slot_count * 4` bytes.
    pub op_args: Vec<u8>,
    /// Resulting identity plane bytes.
    pub result_identity: Vec<u8>,
    /// Resulting status plane bytes.
    pub result_status: Vec<u8>,
}

impl StepRecord {
    /// The frame bytes in trace order: `op_code || op_args || identity || status`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            4 + self.op_args.len() + self.result_identity.len() + self.result_status.len(),
        );
        buf.extend_from_slice(&self.op_code);
        buf.extend_from_slice(&self.op_args);
        buf.extend_from_slice(&self.result_identity);
        buf.extend_from_slice(&self.result_status);
        buf
    }
}

/// Typed application failure. Fail-closed; no partial state escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// `op_id` not present in the operator set.
    UnknownOperator { op_id: Code32 },
    /// Arg count differs from the declared `arg_slot_count`.
    ArgsArity {
        op_id: Code32,
        expected: usize,
        actual: usize,
    },
    /// A masked precondition lane did not match.
    PreconditionFailed { op_id: Code32, lane: usize },
    /// A write landed outside the declared effect masks.
    EffectMaskViolation { op_id: Code32, lane: usize },
    /// A non-sentinel arg code is not allocated in the registry.
    RegistryMissing { op_id: Code32, code: Code32 },
    /// The relational callback failed to resolve.
    RelationalFault { op_id: Code32, detail: String },
    /// Operator masks and state disagree on lane count.
    ShapeMismatch {
        op_id: Code32,
        mask_lanes: usize,
        state_lanes: usize,
    },
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOperator { op_id } => write!(f, "unknown operator {op_id}"),
            Self::ArgsArity {
                op_id,
                expected,
                actual,
            } => write!(f, "{op_id}: expected {expected} args, got {actual}"),
            Self::PreconditionFailed { op_id, lane } => {
                write!(f, "{op_id}: precondition failed at lane {lane}")
            }
            Self::EffectMaskViolation { op_id, lane } => {
                write!(f, "{op_id}: effect outside declared mask at lane {lane}")
            }
            Self::RegistryMissing { op_id, code } => {
                write!(f, "{op_id}: arg {code} not in registry")
            }
            Self::RelationalFault { op_id, detail } => {
                write!(f, "{op_id}: relational fault: {detail}")
            }
            Self::ShapeMismatch {
                op_id,
                mask_lanes,
                state_lanes,
            } => write!(
                f,
                "{op_id}: masks cover {mask_lanes} lanes, state has {state_lanes}"
            ),
        }
    }
}

impl std::error::Error for ApplyError {}

/// Result type for [`apply`].
pub type ApplyResult = Result<(ByteStateV1, StepRecord), ApplyError>;

/// Apply `op_id` with `args` to `state`.
///
/// Pure with respect to its inputs; the input state is untouched. The
/// returned [`StepRecord`] holds exactly the bytes the trace writer frames.
///
/// `profile` governs only the post-apply delta audit: under
/// [`ExecutionProfile::Cert`] the computed identity/status delta is checked
/// against the declared write set and any excess is an
/// [`ApplyError::EffectMaskViolation`]. The produced bytes never depend on
/// the profile.
///
/// # Errors
///
/// Returns [`ApplyError`] on any contract breach; see the variants.
pub fn apply(
    state: &ByteStateV1,
    op_id: Code32,
    args: &[Code32],
    registry: &RegistryV1,
    operator_set: &OperatorSetV1,
    profile: ExecutionProfile,
) -> ApplyResult {
    let def = operator_set
        .get(&op_id)
        .ok_or(ApplyError::UnknownOperator { op_id })?;

    if args.len() != def.arg_slot_count {
        return Err(ApplyError::ArgsArity {
            op_id,
            expected: def.arg_slot_count,
            actual: args.len(),
        });
    }

    let identity = state.view_identity_u32();
    let lanes = identity.len();
    if def.precondition.lanes() != lanes {
        return Err(ApplyError::ShapeMismatch {
            op_id,
            mask_lanes: def.precondition.lanes(),
            state_lanes: lanes,
        });
    }

    for &arg in args {
        if !arg.is_sentinel() && !registry.contains(&arg) {
            return Err(ApplyError::RegistryMissing { op_id, code: arg });
        }
    }

    // Instantiate value planes: patch arg-bound lanes with the arg's u32 view.
    let mut pre_value: Vec<u32> = def.precondition.value().to_vec();
    let mut eff_value: Vec<u32> = def.effect.value().to_vec();
    for binding in &def.arg_bindings {
        let patched = args[binding.arg_index].to_u32_le();
        match binding.site {
            BindSite::PreconditionValue => pre_value[binding.lane] = patched,
            BindSite::EffectValue => eff_value[binding.lane] = patched,
        }
    }

    // Branchless precondition accumulation over all lanes.
    let pre_mask = def.precondition.mask();
    let mut unsat: u32 = 0;
    for i in 0..lanes {
        unsat |= (identity[i] & pre_mask[i]) ^ (pre_value[i] & pre_mask[i]);
    }
    if unsat != 0 {
        let lane = first_unsat_lane(identity, pre_mask, &pre_value);
        return Err(ApplyError::PreconditionFailed { op_id, lane });
    }

    // Masked identity effect.
    let eff_mask = def.effect.mask();
    let mut new_identity: Vec<u32> = Vec::with_capacity(lanes);
    for i in 0..lanes {
        new_identity.push((identity[i] & !eff_mask[i]) | (eff_value[i] & eff_mask[i]));
    }

    // Masked status effect.
    let status = state.view_status_u8();
    let mut new_status: Vec<u8> = status.to_vec();
    if let Some(status_effect) = &def.status_effect {
        let st_mask = status_effect.mask();
        let st_value = status_effect.value();
        for i in 0..lanes {
            new_status[i] = (status[i] & !st_mask[i]) | (st_value[i] & st_mask[i]);
        }
    }

    // Relational resolve: identity-keyed writes confined to the declared region.
    if let Some(rel) = &def.relational {
        let resolved = rel
            .effect
            .resolve(identity, args)
            .map_err(|fault| ApplyError::RelationalFault {
                op_id,
                detail: fault.detail,
            })?;
        for write in &resolved.identity {
            if write.lane >= lanes {
                return Err(ApplyError::EffectMaskViolation {
                    op_id,
                    lane: write.lane,
                });
            }
            if write.mask & !rel.identity_region[write.lane] != 0 {
                return Err(ApplyError::EffectMaskViolation {
                    op_id,
                    lane: write.lane,
                });
            }
            new_identity[write.lane] =
                (new_identity[write.lane] & !write.mask) | (write.value & write.mask);
        }
        for write in &resolved.status {
            if write.lane >= lanes {
                return Err(ApplyError::EffectMaskViolation {
                    op_id,
                    lane: write.lane,
                });
            }
            if write.mask & !rel.status_region[write.lane] != 0 {
                return Err(ApplyError::EffectMaskViolation {
                    op_id,
                    lane: write.lane,
                });
            }
            new_status[write.lane] =
                (new_status[write.lane] & !write.mask) | (write.value & write.mask);
        }
    }

    // Cert-only delta audit: nothing may change outside the declared write set.
    if profile == ExecutionProfile::Cert {
        audit_delta(op_id, def, identity, &new_identity, status, &new_status)?;
    }

    let record = StepRecord {
        op_code: op_id.to_le_bytes(),
        op_args: encode_args(args),
        result_identity: lanes_to_le_bytes(&new_identity),
        result_status: new_status.clone(),
    };
    let new_state = ByteStateV1::from_planes(
        state.layer_count(),
        state.slot_count(),
        new_identity,
        new_status,
    );
    Ok((new_state, record))
}

/// Serialize args little-endian, `arg_slot_count * 4` bytes.
#[must_use]
pub fn encode_args(args: &[Code32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(args.len() * 4);
    for arg in args {
        buf.extend_from_slice(&arg.to_le_bytes());
    }
    buf
}

fn lanes_to_le_bytes(lanes: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(lanes.len() * 4);
    for lane in lanes {
        buf.extend_from_slice(&lane.to_le_bytes());
    }
    buf
}

fn first_unsat_lane(identity: &[u32], mask: &[u32], value: &[u32]) -> usize {
    identity
        .iter()
        .enumerate()
        .find(|&(i, &id)| (id & mask[i]) != (value[i] & mask[i]))
        .map_or(0, |(i, _)| i)
}

fn audit_delta(
    op_id: Code32,
    def: &OperatorDefV1,
    old_identity: &[u32],
    new_identity: &[u32],
    old_status: &[u8],
    new_status: &[u8],
) -> Result<(), ApplyError> {
    let eff_mask = def.effect.mask();
    for (lane, (&old, &new)) in old_identity.iter().zip(new_identity).enumerate() {
        let allowed = eff_mask[lane]
            | def
                .relational
                .as_ref()
                .map_or(0, |rel| rel.identity_region[lane]);
        if (old ^ new) & !allowed != 0 {
            return Err(ApplyError::EffectMaskViolation { op_id, lane });
        }
    }
    for (lane, (&old, &new)) in old_status.iter().zip(new_status).enumerate() {
        let allowed = def.status_effect.as_ref().map_or(0, |se| se.mask()[lane])
            | def
                .relational
                .as_ref()
                .map_or(0, |rel| rel.status_region[lane]);
        if (old ^ new) & !allowed != 0 {
            return Err(ApplyError::EffectMaskViolation { op_id, lane });
        }
    }
    Ok(())
}
