//! The compilation boundary: domain payload -> initial `ByteState`.
//!
//! Domains own their encoders; the kernel owns the contract. A compiler is a
//! pure function of `(payload, schema, registry, policy_digest)`: equal
//! inputs must produce equal bytes. Every compiler must also be able to
//! invert itself (`decompile`) for Cert round-trip verification.
//!
//! [`JsonPayloadCompiler`] is the reference implementation: a canonical-JSON
//! plane dump. Worlds with richer payloads implement [`DomainCompiler`]
//! themselves and reuse the same fail-closed validation posture.

use crate::carrier::bytestate::{ByteStateBuilder, ByteStateV1, SlotStatus};
use crate::carrier::code32::Code32;
use crate::carrier::registry::RegistryV1;
use crate::carrier::schema::ByteStateSchema;
use crate::proof::canon::{canonical_json_bytes, CanonError};
use crate::proof::hash::ContentHash;

/// Typed compilation failure. Fail-closed: no partial state is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Payload dimensions or fields disagree with the schema.
    SchemaMismatch { detail: String },
    /// Payload references a code the registry does not allocate.
    RegistryMissing { detail: String },
    /// A registry bucket was exhausted while compiling.
    CapacityExceeded { detail: String },
    /// Payload is structurally invalid (bad JSON, wrong shapes, bad bytes).
    PayloadInvalid { detail: String },
    /// Payload contains content the deterministic surface cannot admit
    /// (floats and other non-canonical numbers).
    NonDeterministicInput { detail: String },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaMismatch { detail } => write!(f, "schema mismatch: {detail}"),
            Self::RegistryMissing { detail } => write!(f, "registry missing: {detail}"),
            Self::CapacityExceeded { detail } => write!(f, "capacity exceeded: {detail}"),
            Self::PayloadInvalid { detail } => write!(f, "invalid payload: {detail}"),
            Self::NonDeterministicInput { detail } => {
                write!(f, "non-deterministic input: {detail}")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Domain collaborator interface for the compile boundary.
pub trait DomainCompiler {
    /// Compile a payload into the initial state. Pure: equal inputs produce
    /// equal bytes. The policy digest is input only so compilers can bind it
    /// into derived commitments; it must not alter the produced planes.
    ///
    /// # Errors
    ///
    /// Returns a typed [`CompileError`]; never a partial state.
    fn compile(
        &self,
        payload: &[u8],
        schema: &ByteStateSchema,
        registry: &RegistryV1,
        policy_digest: &ContentHash,
    ) -> Result<ByteStateV1, CompileError>;

    /// Invert [`Self::compile`]: recover payload bytes from a state.
    ///
    /// Required for Cert round-trip tests; `decompile(compile(p)) == canonical(p)`.
    ///
    /// # Errors
    ///
    /// Returns a typed [`CompileError`] if the state cannot be expressed as a
    /// payload of this domain.
    fn decompile(
        &self,
        state: &ByteStateV1,
        schema: &ByteStateSchema,
        registry: &RegistryV1,
    ) -> Result<Vec<u8>, CompileError>;
}

/// Reference compiler: canonical-JSON plane dump.
///
/// Payload shape:
///
/// ```json
/// {
///   "domain_id": "rome",
///   "identity": [[d, k, lo, hi], ...],
///   "status": [b, ...]
/// }
/// ```
///
/// Both arrays have exactly `layer_count * slot_count` entries in lane order.
/// Non-sentinel codes must be allocated in the registry. Key order and
/// whitespace in the input are irrelevant: the payload is re-canonicalized
/// before anything is read from it.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadCompiler;

impl DomainCompiler for JsonPayloadCompiler {
    fn compile(
        &self,
        payload: &[u8],
        schema: &ByteStateSchema,
        registry: &RegistryV1,
        _policy_digest: &ContentHash,
    ) -> Result<ByteStateV1, CompileError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| CompileError::PayloadInvalid {
                detail: format!("JSON parse: {e}"),
            })?;

        // Reject floats up front: they poison every downstream hash surface.
        canonical_json_bytes(&value).map_err(|e| match e {
            CanonError::NonIntegerNumber { raw } => CompileError::NonDeterministicInput {
                detail: format!("non-integer number in payload: {raw}"),
            },
        })?;

        let obj = value
            .as_object()
            .ok_or_else(|| CompileError::PayloadInvalid {
                detail: "payload must be a JSON object".into(),
            })?;

        let domain_id = obj
            .get("domain_id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CompileError::PayloadInvalid {
                detail: "missing 'domain_id'".into(),
            })?;
        if domain_id != schema.domain_id {
            return Err(CompileError::SchemaMismatch {
                detail: format!(
                    "payload domain '{domain_id}' != schema domain '{}'",
                    schema.domain_id
                ),
            });
        }

        let lanes = schema.lane_count();
        let identity = parse_identity(obj, lanes, registry)?;
        let status = parse_status(obj, lanes)?;

        let mut builder = ByteStateBuilder::from_schema(schema);
        for (lane, code) in identity.into_iter().enumerate() {
            let (layer, slot) = schema.lane_position(lane);
            builder.set_identity(layer, slot, code);
        }
        for (lane, st) in status.into_iter().enumerate() {
            let (layer, slot) = schema.lane_position(lane);
            builder.set_status(layer, slot, st);
        }
        Ok(builder.finish())
    }

    fn decompile(
        &self,
        state: &ByteStateV1,
        schema: &ByteStateSchema,
        registry: &RegistryV1,
    ) -> Result<Vec<u8>, CompileError> {
        if state.layer_count() != schema.layer_count || state.slot_count() != schema.slot_count {
            return Err(CompileError::SchemaMismatch {
                detail: format!(
                    "state is {}x{}, schema is {}x{}",
                    state.layer_count(),
                    state.slot_count(),
                    schema.layer_count,
                    schema.slot_count
                ),
            });
        }
        let mut identity = Vec::with_capacity(schema.lane_count());
        for &lane in state.view_identity_u32() {
            let code = Code32::from_u32_le(lane);
            if !code.is_sentinel() && !registry.contains(&code) {
                return Err(CompileError::RegistryMissing {
                    detail: format!("state holds unregistered {code}"),
                });
            }
            let b = code.to_le_bytes();
            identity.push(serde_json::json!([
                u64::from(b[0]),
                u64::from(b[1]),
                u64::from(b[2]),
                u64::from(b[3])
            ]));
        }
        let status: Vec<serde_json::Value> = state
            .view_status_u8()
            .iter()
            .map(|&b| serde_json::json!(u64::from(b)))
            .collect();
        let value = serde_json::json!({
            "domain_id": schema.domain_id,
            "identity": identity,
            "status": status,
        });
        canonical_json_bytes(&value).map_err(|e| CompileError::PayloadInvalid {
            detail: format!("decompile canonicalization: {e}"),
        })
    }
}

fn parse_identity(
    obj: &serde_json::Map<String, serde_json::Value>,
    lanes: usize,
    registry: &RegistryV1,
) -> Result<Vec<Code32>, CompileError> {
    let arr = obj
        .get("identity")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CompileError::PayloadInvalid {
            detail: "missing or non-array 'identity'".into(),
        })?;
    if arr.len() != lanes {
        return Err(CompileError::SchemaMismatch {
            detail: format!("identity has {} lanes, schema needs {lanes}", arr.len()),
        });
    }
    let mut out = Vec::with_capacity(lanes);
    for (i, entry) in arr.iter().enumerate() {
        let quad = entry
            .as_array()
            .ok_or_else(|| CompileError::PayloadInvalid {
                detail: format!("identity[{i}]: expected [d,k,lo,hi]"),
            })?;
        if quad.len() != 4 {
            return Err(CompileError::PayloadInvalid {
                detail: format!("identity[{i}]: expected 4 bytes, got {}", quad.len()),
            });
        }
        let mut bytes = [0u8; 4];
        for (j, v) in quad.iter().enumerate() {
            let n = v.as_u64().ok_or_else(|| CompileError::PayloadInvalid {
                detail: format!("identity[{i}][{j}]: expected integer"),
            })?;
            bytes[j] = u8::try_from(n).map_err(|_| CompileError::PayloadInvalid {
                detail: format!("identity[{i}][{j}]: {n} > 255"),
            })?;
        }
        let code = Code32::from_le_bytes(bytes);
        if !code.is_sentinel() && !registry.contains(&code) {
            return Err(CompileError::RegistryMissing {
                detail: format!(
                    "identity[{i}]: {code} not allocated in epoch '{}'",
                    registry.epoch()
                ),
            });
        }
        out.push(code);
    }
    Ok(out)
}

fn parse_status(
    obj: &serde_json::Map<String, serde_json::Value>,
    lanes: usize,
) -> Result<Vec<SlotStatus>, CompileError> {
    let arr = obj
        .get("status")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CompileError::PayloadInvalid {
            detail: "missing or non-array 'status'".into(),
        })?;
    if arr.len() != lanes {
        return Err(CompileError::SchemaMismatch {
            detail: format!("status has {} lanes, schema needs {lanes}", arr.len()),
        });
    }
    let mut out = Vec::with_capacity(lanes);
    for (i, entry) in arr.iter().enumerate() {
        let n = entry
            .as_u64()
            .ok_or_else(|| CompileError::PayloadInvalid {
                detail: format!("status[{i}]: expected integer"),
            })?;
        let byte = u8::try_from(n).map_err(|_| CompileError::PayloadInvalid {
            detail: format!("status[{i}]: {n} > 255"),
        })?;
        let status = SlotStatus::from_byte(byte).ok_or_else(|| CompileError::PayloadInvalid {
            detail: format!("status[{i}]: {byte} is not a SlotStatus"),
        })?;
        out.push(status);
    }
    Ok(out)
}
