use std::fmt;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a fixed-point iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Termination {
    /// Two successive iterates were within tolerance.
    Converged,
    /// The iteration ceiling was reached first.
    MaxIterations,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged within tolerance"),
            Termination::MaxIterations => write!(f, "maximum iterations reached"),
        }
    }
}

/// Outcome of a forward fixed-point solve.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixedPointResult<S> {
    /// Last iterate.
    pub value: S,
    /// Loop iterations after the first application of the map.
    pub iterations: usize,
    pub termination: Termination,
}

impl<S> FixedPointResult<S> {
    #[inline]
    pub fn is_converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    /// The value if the solve converged, [`Error::NotConverged`] otherwise.
    pub fn into_converged(self) -> Result<S> {
        match self.termination {
            Termination::Converged => Ok(self.value),
            Termination::MaxIterations => Err(Error::NotConverged {
                iterations: self.iterations,
            }),
        }
    }

    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> FixedPointResult<T> {
        FixedPointResult {
            value: f(self.value),
            iterations: self.iterations,
            termination: self.termination,
        }
    }
}

/// Outcome of the adjoint solve at a fixed point.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjointResult<F> {
    /// `dL/du`.
    pub u_bar: Vec<F>,
    /// Adjoint variable ζ solving `ζ = dL/dx* + ζᵀ ∂g/∂x`.
    pub zeta: Vec<F>,
    /// Iterations of the adjoint loop.
    pub iterations: usize,
    pub termination: Termination,
}
