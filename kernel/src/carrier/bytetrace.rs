//! `ByteTraceV1`: the byte-for-byte replayable episode record.
//!
//! # Wire layout
//!
//! ```text
//! [envelope_len:u16le][envelope:JSON]          -- NOT hashed (observability)
//! [magic:4 = "BST1"]                           -- hashed
//! [header_len:u16le][header:canonical JSON]    -- hashed (length included)
//! [body: fixed-stride frames]                  -- hashed
//! [footer_len:u16le][footer:canonical JSON]    -- hashed (length included)
//! ```
//!
//! The payload hash covers `magic || header_len || header || body || footer_len  || 
//! footer` under the `BYTETRACE` domain. The envelope and its length prefix
//! are excluded: timestamps and trace ids may differ between byte-identical
//! episodes.
//!
//! # Frames
//!
//! Constant stride: `bytes_per_step = 4 + 4*arg_slot_count + 5*L*S`
//! (`op_code || op_args || identity plane || status plane`). Frame 0 is the
//! `INITIAL_STATE` sentinel with zero-filled args.

use crate::carrier::code32::Code32;
use crate::proof::divergence::DivergenceSite;

/// Magic bytes of a `.bst1` stream.
pub const BYTETRACE_V1_MAGIC: [u8; 4] = *b"BST1";

/// Maximum byte length of any u16-framed JSON section.
pub const MAX_SECTION_LEN: usize = u16::MAX as usize;

/// Unhashed observability metadata. Free-form by design; nothing here may
/// influence replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEnvelopeV1 {
    pub trace_id: String,
    pub created_at: String,
    pub writer_version: String,
    pub wall_time_ms: u64,
}

/// Hashed header: binds the episode to its schema, registries, policy, and
/// fixture, and fixes the frame geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeaderV1 {
    pub schema_version: String,
    pub domain_id: String,
    pub registry_digest: String,
    pub operator_set_digest: String,
    pub policy_digest: String,
    pub fixture_hash: String,
    pub step_count: usize,
    pub layer_count: usize,
    pub slot_count: usize,
    pub arg_slot_count: usize,
    /// Combined relational-index digest; present iff the operator set carries
    /// relational operators.
    pub index_digest: Option<String>,
}

impl TraceHeaderV1 {
    /// Frame stride: `4 + 4*arg_slot_count + 5*L*S`, checked arithmetic.
    #[must_use]
    pub fn bytes_per_step(&self) -> Option<usize> {
        let lanes = self.layer_count.checked_mul(self.slot_count)?;
        let planes = lanes.checked_mul(5)?;
        let args = self.arg_slot_count.checked_mul(4)?;
        4usize.checked_add(args)?.checked_add(planes)
    }

    /// Expected body length: `step_count * bytes_per_step`, checked.
    #[must_use]
    pub fn body_len(&self) -> Option<usize> {
        self.step_count.checked_mul(self.bytes_per_step()?)
    }
}

/// One fixed-stride frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrameV1 {
    pub op_code: [u8; 4],
    /// Zero-padded to `arg_slot_count * 4` bytes.
    pub op_args: Vec<u8>,
    pub result_identity: Vec<u8>,
    pub result_status: Vec<u8>,
}

impl TraceFrameV1 {
    /// Frame bytes in wire order.
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

    /// Whether this is a well-formed frame-0 sentinel.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.op_code == Code32::INITIAL_STATE.to_le_bytes()
            && self.op_args.iter().all(|&b| b == 0)
    }
}

/// Hashed footer: terminal digests of the episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFooterV1 {
    pub final_identity_hash: String,
    pub final_evidence_hash: String,
    /// True when the episode stopped on a budget rather than a terminal state.
    pub truncated: bool,
}

/// A complete trace: envelope + header + ordered frames + footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteTraceV1 {
    pub envelope: TraceEnvelopeV1,
    pub header: TraceHeaderV1,
    pub frames: Vec<TraceFrameV1>,
    pub footer: TraceFooterV1,
}

/// Typed trace failure: lifecycle breaches plus the structural parse
/// variants a fail-closed reader needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// A header mutation was attempted after the first frame was emitted.
    HeaderImmutableViolation,
    /// A frame's size or field widths disagree with the header geometry.
    StrideMismatch { frame_index: usize, detail: String },
    /// Filesystem failure during persist/read; partial files are removed.
    IoError { detail: String },
    /// Recomputed payload hash differs from the expected one.
    TraceHashMismatch {
        expected: String,
        actual: String,
        site: Option<DivergenceSite>,
    },
    /// A u16-framed JSON section exceeds [`MAX_SECTION_LEN`].
    SectionTooLong { section: &'static str, len: usize },
    /// Input ended before a declared section was complete.
    Truncated { detail: String },
    /// Magic bytes are not `BST1`.
    BadMagic { found: [u8; 4] },
    /// Header/footer bytes are not canonical JSON.
    NonCanonical { section: &'static str },
    /// A JSON section is missing fields or has wrong types.
    InvalidSection {
        section: &'static str,
        detail: String,
    },
    /// A status byte in a frame is not a `SlotStatus` discriminant.
    InvalidStatusByte { frame_index: usize, byte: u8 },
    /// Frame 0 is not the `INITIAL_STATE` sentinel with zero args.
    BadInitialFrame { detail: String },
    /// Bytes remain after the footer.
    TrailingBytes { excess: usize },
    /// Header geometry overflows size arithmetic.
    DimensionOverflow,
    /// Header `step_count` does not match the frame count.
    StepCountMismatch { header: usize, actual: usize },
}

impl std::fmt::Display for TraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HeaderImmutableViolation => {
                write!(f, "trace header is immutable once frames exist")
            }
            Self::StrideMismatch {
                frame_index,
                detail,
            } => write!(f, "frame {frame_index}: stride mismatch: {detail}"),
            Self::IoError { detail } => write!(f, "trace I/O: {detail}"),
            Self::TraceHashMismatch {
                expected, actual, ..
            } => write!(f, "payload hash mismatch: expected {expected}, got {actual}"),
            Self::SectionTooLong { section, len } => {
                write!(f, "{section} section is {len} bytes, exceeds u16 framing")
            }
            Self::Truncated { detail } => write!(f, "truncated trace: {detail}"),
            Self::BadMagic { found } => write!(f, "bad magic {found:?}"),
            Self::NonCanonical { section } => {
                write!(f, "{section} bytes are not canonical JSON")
            }
            Self::InvalidSection { section, detail } => {
                write!(f, "invalid {section}: {detail}")
            }
            Self::InvalidStatusByte { frame_index, byte } => {
                write!(f, "frame {frame_index}: invalid status byte {byte}")
            }
            Self::BadInitialFrame { detail } => write!(f, "bad initial frame: {detail}"),
            Self::TrailingBytes { excess } => {
                write!(f, "{excess} trailing bytes after footer")
            }
            Self::DimensionOverflow => write!(f, "header dimensions overflow"),
            Self::StepCountMismatch { header, actual } => {
                write!(f, "header says {header} steps, body has {actual}")
            }
        }
    }
}

impl std::error::Error for TraceError {}
