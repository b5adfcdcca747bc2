//! Reverse-mode automatic differentiation with custom-gradient operations.
//!
//! This is the differentiation substrate of the `nux` workspace: a thread-local
//! [`tape::Tape`] of precomputed partials, the [`Reverse`] variable that records
//! onto it, the AD-generic [`Scalar`] trait, and [`op::DifferentiableOp`] for
//! operations whose gradient is supplied by hand (the hook used by the
//! fixed-point solver in `nux-implicit`).

pub mod api;
pub mod float;
pub mod op;
pub mod reverse;
pub mod scalar;
pub mod tape;
mod traits;

pub use api::{grad, value_and_grad, vjp};
pub use float::Float;
pub use op::{apply_op, DifferentiableOp};
pub use reverse::Reverse;
pub use scalar::Scalar;
pub use tape::TapeThreadLocal;

/// Type alias for reverse-mode variables over `f64`.
pub type Reverse64 = Reverse<f64>;
/// Type alias for reverse-mode variables over `f32`.
pub type Reverse32 = Reverse<f32>;
