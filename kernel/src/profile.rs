//! Execution profiles: how strictly the core reacts to recoverable faults.
//!
//! `Cert` is fail-closed everywhere. `Dev` converts a specific set of faults
//! (unknown identities, verification mismatches) into typed values that are
//! recorded to the tape or the verification report, and continues best-effort.
//! Nothing else differs between the profiles; hashed bytes never depend on
//! the profile.

/// Strictness profile for compilation, application, and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionProfile {
    /// Record recoverable faults and continue best-effort.
    Dev,
    /// Every fault is a hard, typed error. No partial results are exposed.
    Cert,
}

impl ExecutionProfile {
    /// Canonical string for report serialization.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Cert => "cert",
        }
    }
}
