use thiserror::Error;

/// Errors reported by the fixed-point solvers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The update map changed the number of flattened elements.
    #[error("shape mismatch: expected {expected} elements, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// The iteration budget ran out before the tolerance was met. Only
    /// produced on request (see `FixedPointResult::into_converged`).
    #[error("fixed-point iteration did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
