use thiserror::Error;

use crate::validate::InputError;
use crate::verify::Violation;

/// Terminal failures of the solve entry point.
///
/// Model infeasibility is deliberately absent: an unsatisfiable rule set is a
/// regular outcome (`SolveStatus::Infeasible`), not an error.
#[derive(Debug, Error)]
pub enum SolveError {
    /// The domain snapshot or configuration is structurally broken. Detected
    /// before any decision variable is created.
    #[error("invalid domain snapshot: {}", summarize(.0))]
    InvalidInput(Vec<InputError>),

    /// The underlying ILP backend failed for a reason other than
    /// infeasibility (unbounded model, solver-library error).
    #[error("solver backend failure: {0}")]
    Backend(String),

    /// The independent verifier found hard violations in solver output.
    /// The constraint encoding and the rule set disagree; this is an
    /// internal consistency bug and must never be swallowed.
    #[error("solver output failed verification with {} hard violation(s)", .0.len())]
    UnsoundSchedule(Vec<Violation>),
}

fn summarize(errors: &[InputError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
