//! Differentiable fixed-point iteration.
//!
//! [`solve`] iterates an update map until two successive iterates agree to
//! within a tolerance or an iteration ceiling is hit. [`fixed_point`] wraps the
//! solve for a parameterized map `x ← f(u, x, extra)` so that gradients with
//! respect to `u` are computed by implicit differentiation: a second, adjoint
//! fixed-point iteration ([`fixed_point_vjp`]) instead of backpropagating
//! through every forward step.
//!
//! ```
//! use nux::Scalar;
//! use nux_implicit::{fixed_point, FixedPointMap};
//!
//! #[derive(Clone)]
//! struct Affine {
//!     a: f64,
//! }
//!
//! impl FixedPointMap<f64> for Affine {
//!     type Extra = ();
//!
//!     fn apply<T: Scalar<Float = f64>>(&self, u: &[T], x: &[T], _extra: &()) -> Vec<T> {
//!         vec![T::from_f(self.a) * x[0] + u[0]]
//!     }
//! }
//!
//! // x* = u / (1 - a), so dx*/du = 1 / (1 - a) = 2.
//! let map = Affine { a: 0.5 };
//! let g = nux::grad(|u| fixed_point(&map, u, &[nux::Reverse::constant(0.0)], 200, &()).unwrap()[0], &[3.0]);
//! assert!((g[0] - 2.0).abs() < 1e-4);
//! ```

pub mod adjoint;
pub mod convergence;
pub mod error;
pub mod fixed_point;
pub mod flatten;
pub mod map;
pub mod result;
pub mod solve;

pub use adjoint::fixed_point_vjp;
pub use convergence::ConvergenceParams;
pub use error::{Error, Result};
pub use fixed_point::{fixed_point, fixed_point_with, FixedPointContext, FixedPointOp};
pub use flatten::Flatten;
pub use map::{FixedPointMap, Real};
pub use result::{AdjointResult, FixedPointResult, Termination};
pub use solve::{solve, solve_with};
