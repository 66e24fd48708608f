// Response validation: recursive body matcher, status bridge, and the
// fixed predicate registry.

pub mod engine;
pub mod predicates;

pub use engine::ResponseChecker;
pub use predicates::{Kind, Predicate};

use serde_json::Value;
use thiserror::Error;

/// One assertion that did not hold. Diagnostic only; accumulated, never
/// thrown.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFail {
    pub path: String,
    /// Predicate name, `equal` for scalar mismatches, `slice` for list
    /// mismatches, empty for structural status fails.
    pub predicate: String,
    pub expected: Value,
    pub actual: String,
}

impl ValidationFail {
    pub fn new(
        path: impl Into<String>,
        predicate: impl Into<String>,
        expected: Value,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            predicate: predicate.into(),
            expected,
            actual: actual.into(),
        }
    }
}

/// A hard error while evaluating expectations: the expectation tree itself
/// is malformed or applied to a value it cannot describe. Unlike a
/// [`ValidationFail`] this aborts the run.
#[derive(Debug, Error, PartialEq)]
pub enum CheckError {
    #[error("predicate {0} does not exist")]
    UnknownPredicate(String),
    #[error("field {path} is neither a predicate nor a response field")]
    UnknownField { path: String },
    #[error("unsupported kind {kind} for predicate {predicate}")]
    UnsupportedKind {
        predicate: &'static str,
        kind: &'static str,
    },
    #[error("expected list length {expected} is not equal to actual list length {actual} at {path}")]
    LengthMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("{0}")]
    Malformed(String),
}

impl CheckError {
    /// Whether the error points at the test configuration (printed plainly
    /// in non-verbose mode) rather than at an internal contract violation.
    pub fn is_user(&self) -> bool {
        matches!(
            self,
            CheckError::UnknownPredicate(_) | CheckError::UnknownField { .. }
        )
    }
}
