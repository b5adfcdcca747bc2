//! Operations with hand-written gradients.
//!
//! A [`DifferentiableOp`] pairs a forward computation on primal values with a
//! backward rule that maps output cotangents to input cotangents. [`apply_op`]
//! evaluates the forward rule and registers the backward rule with whatever
//! scalar type the caller is using: plain floats ignore it, [`crate::Reverse`]
//! records it on the active tape, so ordinary calls to [`crate::grad`] over a
//! computation containing the op run the custom rule instead of differentiating
//! through its internals.
//!
//! ```
//! use nux::op::{apply_op, DifferentiableOp};
//!
//! /// y = x³ with the derivative written by hand.
//! struct Cube;
//!
//! impl DifferentiableOp<f64> for Cube {
//!     type Context = f64;
//!     type Error = std::convert::Infallible;
//!
//!     fn forward(&self, inputs: &[f64]) -> Result<(Vec<f64>, f64), Self::Error> {
//!         Ok((vec![inputs[0].powi(3)], inputs[0]))
//!     }
//!
//!     fn backward(&self, x: &f64, upstream: &[f64]) -> Vec<f64> {
//!         vec![3.0 * x * x * upstream[0]]
//!     }
//! }
//!
//! let g = nux::grad(|v| apply_op(Cube, v).unwrap()[0], &[2.0]);
//! assert!((g[0] - 12.0).abs() < 1e-12);
//! ```

use crate::scalar::Scalar;
use crate::Float;

/// A forward/backward pair registered as one node of a computation.
pub trait DifferentiableOp<F: Float>: 'static {
    /// Whatever the backward rule needs from the forward pass.
    type Context: 'static;
    /// Failure of the forward computation.
    type Error;

    /// Evaluate the op on primal values.
    fn forward(&self, inputs: &[F]) -> Result<(Vec<F>, Self::Context), Self::Error>;

    /// Map output cotangents to input cotangents (one per forward input).
    fn backward(&self, ctx: &Self::Context, upstream: &[F]) -> Vec<F>;
}

/// Evaluate `op` on `inputs` and register its backward rule.
pub fn apply_op<T, O>(op: O, inputs: &[T]) -> Result<Vec<T>, O::Error>
where
    T: Scalar,
    O: DifferentiableOp<T::Float>,
{
    let values: Vec<T::Float> = inputs.iter().map(Scalar::value).collect();
    let (outputs, ctx) = op.forward(&values)?;
    Ok(attach(op, ctx, inputs, &outputs))
}

/// Register the backward rule of an op whose forward pass already ran.
///
/// Useful when the caller needs more from the forward pass than the outputs
/// (diagnostics kept in the context, for instance) before handing the context
/// over.
pub fn attach<T, O>(op: O, ctx: O::Context, inputs: &[T], outputs: &[T::Float]) -> Vec<T>
where
    T: Scalar,
    O: DifferentiableOp<T::Float>,
{
    T::record_pullback(
        inputs,
        outputs,
        Box::new(move |upstream| op.backward(&ctx, upstream)),
    )
}
