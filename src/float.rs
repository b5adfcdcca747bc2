use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the primitive floats a tape can carry (`f32`, `f64`).
///
/// Reverse-mode variables are *not* `Float`; generic numeric code should be
/// written against [`crate::Scalar`] instead.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// Convert an `f64` literal, falling back to NaN if it is unrepresentable.
    #[inline]
    fn lit(value: f64) -> Self {
        <Self as FromPrimitive>::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl Float for f32 {}
impl Float for f64 {}
