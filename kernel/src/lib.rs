//! Sterling Kernel: the sealed deterministic substrate of the carrier core.
//!
//! # API Surface
//!
//! The kernel exposes three load-bearing entry points:
//!
//! - [`carrier::compile::DomainCompiler`] -- compile a domain payload into `ByteState`
//! - [`operators::apply::apply`] -- apply a governed operator, producing a new state + step record
//! - [`proof::replay::replay_verify`] -- re-execute a trace and localize any divergence
//!
//! # Module Dependency Direction
//!
//! `proof::canon`/`proof::hash` are leaves. `carrier` builds on them.
//! `operators` builds on `carrier`. `proof::replay` builds on both.
//! One-way only, no cycles.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod carrier;
pub mod operators;
pub mod profile;
pub mod proof;
