//! Shared fixtures for the criterion benches.
//!
//! Inputs are fixed and content-addressed so regressions compare like with
//! like across machines.

#![forbid(unsafe_code)]

use sterling_kernel::carrier::bytestate::{ByteStateBuilder, ByteStateV1};
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::carrier::schema::ByteStateSchema;

/// The default 4x32 bench schema.
///
/// # Panics
///
/// Panics only if the static definition is inconsistent.
#[must_use]
pub fn bench_schema() -> ByteStateSchema {
    ByteStateSchema::new(
        "bytestate.v1",
        "bench",
        4,
        32,
        vec![
            "current".into(),
            "goal".into(),
            "visited".into(),
            "path".into(),
        ],
    )
    .expect("bench schema is static")
}

/// A deterministic non-trivial state: every lane derived from its index.
#[must_use]
pub fn bench_state() -> ByteStateV1 {
    let schema = bench_schema();
    let mut builder = ByteStateBuilder::from_schema(&schema);
    for layer in 0..schema.layer_count {
        for slot in 0..schema.slot_count {
            #[allow(clippy::cast_possible_truncation)]
            let local = (layer * 31 + slot) as u16;
            #[allow(clippy::cast_possible_truncation)]
            builder.set_identity(layer, slot, Code32::new(9, layer as u8 + 1, local));
        }
    }
    builder.finish()
}
