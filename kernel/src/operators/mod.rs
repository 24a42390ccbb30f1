//! Operator layer: governed, mask-declared transformations of `ByteState`.

pub mod apply;
pub mod operator_registry;
pub mod signature;
