//! Search budgets and the clock-free cancellation surface.
//!
//! The core never reads a clock: the wall-clock budget is rendered as a
//! caller-owned [`CancelFlag`] checked at expansion boundaries. External
//! cancellation and wall-clock exhaustion are therefore byte-identical
//! terminations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SearchError;

/// Which budget stopped the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    /// Applied-transition budget (`max_steps`).
    Step,
    /// Frontier-pop budget (`max_expansions`).
    Expansion,
    /// Caller-owned cancellation (wall-clock by convention).
    WallClock,
}

impl BudgetKind {
    /// Canonical string for tape/report serialization.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Expansion => "expansion",
            Self::WallClock => "wall_clock",
        }
    }

    /// Parse from canonical string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "step" => Some(Self::Step),
            "expansion" => Some(Self::Expansion),
            "wall_clock" => Some(Self::WallClock),
            _ => None,
        }
    }
}

/// Shared cancellation flag. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Pre-declared search budgets.
#[derive(Debug, Clone)]
pub struct SearchBudgets {
    /// Hard cap on applied transitions (trace frames past the sentinel).
    pub max_steps: u64,
    /// Hard cap on frontier pops.
    pub max_expansions: u64,
    /// Clock-free stand-in for the wall-clock budget.
    pub cancel: CancelFlag,
}

impl SearchBudgets {
    /// Budgets with the given caps and a fresh cancel flag.
    #[must_use]
    pub fn new(max_steps: u64, max_expansions: u64) -> Self {
        Self {
            max_steps,
            max_expansions,
            cancel: CancelFlag::new(),
        }
    }

    /// Pre-flight validation: zero budgets are misconfigurations, not
    /// instantly-exhausted searches.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::PolicyInvalid`] for a zero cap.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_steps == 0 {
            return Err(SearchError::PolicyInvalid {
                detail: "max_steps must be nonzero".into(),
            });
        }
        if self.max_expansions == 0 {
            return Err(SearchError::PolicyInvalid {
                detail: "max_expansions must be nonzero".into(),
            });
        }
        Ok(())
    }
}

impl Default for SearchBudgets {
    fn default() -> Self {
        Self::new(10_000, 10_000)
    }
}
