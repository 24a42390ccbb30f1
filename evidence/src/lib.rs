//! Sterling Evidence: content-addressed artifact bundles with fail-closed
//! verification, plus the episode runner and the reference worlds.
//!
//! ```text
//! sterling-kernel  <-  sterling-search  <-  sterling-evidence
//! ```
//!
//! An episode flows `compile -> search -> trace -> bundle`; the bundle is a
//! directory of content-addressed artifacts whose `verification_report.json`
//! is re-checked on every read. `Base` verification is digest equality;
//! `Cert` additionally re-derives the search graph from the tape and demands
//! byte equality.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bundle;
pub mod bundle_dir;
pub mod fixture;
pub mod policy;
pub mod runner;
pub mod verify;
pub mod worlds;
