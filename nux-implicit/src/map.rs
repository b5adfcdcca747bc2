use nux::{Scalar, TapeThreadLocal};

use crate::flatten::Flatten;

/// Primitive float usable on both sides of a fixed-point solve: as a plain
/// scalar, as a tape float, and as a flattenable state.
pub trait Real: TapeThreadLocal + Scalar<Float = Self> + Flatten<Scalar = Self> {}

impl Real for f32 {}
impl Real for f64 {}

/// Update function `x ← f(u, x, extra)` of a parameterized fixed point.
///
/// `apply` is generic over the scalar type: the forward solve evaluates it on
/// plain floats, the adjoint solve on reverse-mode variables. It must be pure
/// and return as many elements as `x` has.
///
/// ```
/// use nux::Scalar;
/// use nux_implicit::FixedPointMap;
///
/// /// x ← a·x + u
/// #[derive(Clone)]
/// struct Affine {
///     a: f64,
/// }
///
/// impl FixedPointMap<f64> for Affine {
///     type Extra = ();
///
///     fn apply<T: Scalar<Float = f64>>(&self, u: &[T], x: &[T], _extra: &()) -> Vec<T> {
///         vec![T::from_f(self.a) * x[0] + u[0]]
///     }
/// }
/// ```
pub trait FixedPointMap<F: TapeThreadLocal> {
    /// Auxiliary arguments that are carried but never differentiated.
    type Extra;

    fn apply<T: Scalar<Float = F>>(&self, u: &[T], x: &[T], extra: &Self::Extra) -> Vec<T>;
}
