//! Structure-agnostic flattening used by the convergence check.
//!
//! The forward solver never looks inside an iterate; it only flattens two
//! successive iterates into plain float sequences and compares them. Any
//! nesting of scalars, vectors, arrays and pairs works as a state.

use nux::Float;

/// A value that can be read as a flat sequence of floats.
pub trait Flatten {
    type Scalar: Float;

    /// Append every element, in a fixed order, to `out`.
    fn flatten_into(&self, out: &mut Vec<Self::Scalar>);

    fn flatten(&self) -> Vec<Self::Scalar> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }
}

macro_rules! impl_flatten_for_float {
    ($f:ty) => {
        impl Flatten for $f {
            type Scalar = $f;

            #[inline]
            fn flatten_into(&self, out: &mut Vec<$f>) {
                out.push(*self);
            }
        }
    };
}

impl_flatten_for_float!(f32);
impl_flatten_for_float!(f64);

impl<S: Flatten> Flatten for Vec<S> {
    type Scalar = S::Scalar;

    fn flatten_into(&self, out: &mut Vec<Self::Scalar>) {
        for item in self {
            item.flatten_into(out);
        }
    }
}

impl<S: Flatten, const N: usize> Flatten for [S; N] {
    type Scalar = S::Scalar;

    fn flatten_into(&self, out: &mut Vec<Self::Scalar>) {
        for item in self {
            item.flatten_into(out);
        }
    }
}

impl<A, B> Flatten for (A, B)
where
    A: Flatten,
    B: Flatten<Scalar = A::Scalar>,
{
    type Scalar = A::Scalar;

    fn flatten_into(&self, out: &mut Vec<Self::Scalar>) {
        self.0.flatten_into(out);
        self.1.flatten_into(out);
    }
}

impl<A, B, C> Flatten for (A, B, C)
where
    A: Flatten,
    B: Flatten<Scalar = A::Scalar>,
    C: Flatten<Scalar = A::Scalar>,
{
    type Scalar = A::Scalar;

    fn flatten_into(&self, out: &mut Vec<Self::Scalar>) {
        self.0.flatten_into(out);
        self.1.flatten_into(out);
        self.2.flatten_into(out);
    }
}
