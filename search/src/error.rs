//! Typed search-layer errors.

/// Failure that prevents a search from running or finalizing.
///
/// Runtime terminations (budget exhaustion, dead frontiers, collaborator
/// panics) are NOT errors: they finalize the tape with a terminal event and
/// surface through `engine::SearchTermination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// Budgets failed pre-flight validation.
    PolicyInvalid { detail: String },
    /// The tape writer could not serialize an event.
    TapeFailure { detail: String },
    /// A Cert-profile contract was breached mid-search (hard stop).
    CertContractViolation { detail: String },
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PolicyInvalid { detail } => write!(f, "invalid search policy: {detail}"),
            Self::TapeFailure { detail } => write!(f, "tape failure: {detail}"),
            Self::CertContractViolation { detail } => {
                write!(f, "cert contract violation: {detail}")
            }
        }
    }
}

impl std::error::Error for SearchError {}
