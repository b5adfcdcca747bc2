//! The [`Scalar`] trait for writing AD-generic numeric code.
//!
//! Functions written as `fn f<T: Scalar>(x: &[T]) -> T` run unchanged on plain
//! `f32`/`f64` and on [`Reverse`] variables, which is how update maps and flow
//! layers are evaluated both for values and for gradients.

use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::reverse::Reverse;
use crate::tape::{self, Pullback, TapeThreadLocal};

/// The central trait for AD-generic numeric code.
pub trait Scalar:
    Copy
    + Default
    + Debug
    + Display
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// The underlying primitive float type.
    type Float: TapeThreadLocal;

    /// Lift a plain float to this scalar (constant: zero derivative).
    fn from_f(val: Self::Float) -> Self;

    /// Extract the primal value.
    fn value(&self) -> Self::Float;

    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;
    fn tanh(self) -> Self;
    fn abs(self) -> Self;
    fn powi(self, n: i32) -> Self;

    /// Attach a hand-written gradient to `outputs`, computed from `inputs`.
    ///
    /// Plain floats just wrap the outputs. Reverse variables record one custom
    /// statement on the active tape so a later reverse sweep calls `pullback`.
    fn record_pullback(
        inputs: &[Self],
        outputs: &[Self::Float],
        pullback: Pullback<Self::Float>,
    ) -> Vec<Self>;

    /// Constant from an `f64` literal.
    #[inline]
    fn lit(val: f64) -> Self {
        Self::from_f(<Self::Float as crate::Float>::lit(val))
    }

    #[inline]
    fn zero() -> Self {
        Self::from_f(num_traits::Zero::zero())
    }

    #[inline]
    fn one() -> Self {
        Self::from_f(num_traits::One::one())
    }
}

macro_rules! impl_scalar_for_float {
    ($f:ty) => {
        impl Scalar for $f {
            type Float = $f;

            #[inline]
            fn from_f(val: $f) -> Self {
                val
            }

            #[inline]
            fn value(&self) -> $f {
                *self
            }

            #[inline]
            fn exp(self) -> Self {
                <$f>::exp(self)
            }

            #[inline]
            fn ln(self) -> Self {
                <$f>::ln(self)
            }

            #[inline]
            fn sqrt(self) -> Self {
                <$f>::sqrt(self)
            }

            #[inline]
            fn tanh(self) -> Self {
                <$f>::tanh(self)
            }

            #[inline]
            fn abs(self) -> Self {
                <$f>::abs(self)
            }

            #[inline]
            fn powi(self, n: i32) -> Self {
                <$f>::powi(self, n)
            }

            #[inline]
            fn record_pullback(_inputs: &[Self], outputs: &[$f], _pullback: Pullback<$f>) -> Vec<Self> {
                outputs.to_vec()
            }
        }
    };
}

impl_scalar_for_float!(f32);
impl_scalar_for_float!(f64);

impl<F: TapeThreadLocal> Scalar for Reverse<F> {
    type Float = F;

    #[inline]
    fn from_f(val: F) -> Self {
        Reverse::constant(val)
    }

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    #[inline]
    fn exp(self) -> Self {
        Reverse::exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        Reverse::ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        Reverse::sqrt(self)
    }

    #[inline]
    fn tanh(self) -> Self {
        Reverse::tanh(self)
    }

    #[inline]
    fn abs(self) -> Self {
        Reverse::abs(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        Reverse::powi(self, n)
    }

    fn record_pullback(inputs: &[Self], outputs: &[F], pullback: Pullback<F>) -> Vec<Self> {
        if !inputs.iter().any(Reverse::is_tracked) {
            return outputs.iter().map(|&v| Reverse::constant(v)).collect();
        }
        let indices = inputs.iter().map(Reverse::index).collect();
        let first = tape::with_active_tape(|t| t.push_custom(indices, outputs.len(), pullback));
        outputs
            .iter()
            .enumerate()
            .map(|(k, &v)| Reverse::from_tape(v, first + k as u32))
            .collect()
    }
}
