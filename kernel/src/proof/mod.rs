//! Proof layer: canonical serialization, domain-separated hashing,
//! trace hashing, divergence localization, and replay verification.

pub mod canon;
pub mod divergence;
pub mod hash;
pub mod hash_domain;
pub mod replay;
pub mod trace_hash;
