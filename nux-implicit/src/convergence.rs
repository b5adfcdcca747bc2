use nux::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stopping rule shared by the forward and adjoint iterations.
///
/// Two successive iterates `prev`, `curr` are close when every flattened
/// element satisfies `|prev - curr| <= atol + rtol * |curr|`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvergenceParams<F> {
    /// Iteration ceiling, not counting the first application of the map
    /// (default: 100).
    pub max_iters: usize,
    /// Absolute tolerance (default: 1e-5).
    pub atol: F,
    /// Relative tolerance (default: 0, a purely absolute test).
    ///
    /// NumPy-style `allclose` also applies `rtol = 1e-5` by default; set it
    /// with [`ConvergenceParams::with_rtol`] to get that behavior.
    pub rtol: F,
}

impl<F: Float> Default for ConvergenceParams<F> {
    fn default() -> Self {
        ConvergenceParams {
            max_iters: 100,
            atol: F::lit(1e-5),
            rtol: F::zero(),
        }
    }
}

impl<F: Float> ConvergenceParams<F> {
    /// Default tolerances with the given iteration ceiling.
    pub fn new(max_iters: usize) -> Self {
        ConvergenceParams {
            max_iters,
            ..Self::default()
        }
    }

    pub fn with_atol(mut self, atol: F) -> Self {
        self.atol = atol;
        self
    }

    pub fn with_rtol(mut self, rtol: F) -> Self {
        self.rtol = rtol;
        self
    }

    /// Elementwise closeness of two flattened iterates. Any NaN fails.
    pub fn allclose(&self, prev: &[F], curr: &[F]) -> bool {
        debug_assert_eq!(prev.len(), curr.len());
        prev.iter()
            .zip(curr)
            .all(|(&a, &b)| (a - b).abs() <= self.atol + self.rtol * b.abs())
    }
}

/// Largest elementwise change between two flattened iterates.
pub fn max_abs_diff<F: Float>(prev: &[F], curr: &[F]) -> F {
    prev.iter()
        .zip(curr)
        .fold(F::zero(), |acc, (&a, &b)| acc.max((a - b).abs()))
}
