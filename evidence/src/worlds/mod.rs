//! Reference worlds: domain collaborators used by the scenario tests.
//!
//! Each world owns its schema, registry epoch, operator set, and payload
//! encoder, and implements the search candidate contract.

pub mod escape;
pub mod mastermind;
pub mod rome;
pub mod wordnet;
