use std::fmt::{self, Display};

use crate::tape::{self, TapeThreadLocal, CONSTANT};
use crate::Float;

/// Reverse-mode AD variable.
///
/// A value and a tape index. `Copy` because the tape lives in a thread-local,
/// not inside this struct.
#[derive(Clone, Copy, Debug)]
pub struct Reverse<F: Float> {
    pub(crate) value: F,
    pub(crate) index: u32,
}

impl<F: Float> Reverse<F> {
    /// Create a constant (not tracked on tape).
    #[inline]
    pub fn constant(value: F) -> Self {
        Reverse {
            value,
            index: CONSTANT,
        }
    }

    /// Create a reverse variable from a tape allocation.
    #[inline]
    pub fn from_tape(value: F, index: u32) -> Self {
        Reverse { value, index }
    }

    /// Primal value.
    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// Tape index, or [`CONSTANT`] for untracked values.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether this value is recorded on a tape.
    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.index != CONSTANT
    }
}

impl<F: Float + TapeThreadLocal> Reverse<F> {
    /// Record `f(self)` given its value and derivative at `self.value`.
    #[inline]
    fn chain(self, f_val: F, f_deriv: F) -> Self {
        if self.index == CONSTANT {
            return Reverse::constant(f_val);
        }
        let index = tape::with_active_tape(|t| t.push_unary(self.index, f_deriv));
        Reverse {
            value: f_val,
            index,
        }
    }

    #[inline]
    pub fn exp(self) -> Self {
        let e = self.value.exp();
        self.chain(e, e)
    }

    #[inline]
    pub fn ln(self) -> Self {
        self.chain(self.value.ln(), F::one() / self.value)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, F::one() / (F::lit(2.0) * s))
    }

    #[inline]
    pub fn tanh(self) -> Self {
        let t = self.value.tanh();
        self.chain(t, F::one() - t * t)
    }

    /// Subgradient `signum(x)` at the kink, so `d|x|/dx = 1` at `+0`.
    #[inline]
    pub fn abs(self) -> Self {
        self.chain(self.value.abs(), self.value.signum())
    }

    #[inline]
    pub fn powi(self, n: i32) -> Self {
        let val = self.value.powi(n);
        let deriv = F::lit(f64::from(n)) * self.value.powi(n - 1);
        self.chain(val, deriv)
    }
}

impl<F: Float> Display for Reverse<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Reverse<F> {
    fn default() -> Self {
        Reverse::constant(F::zero())
    }
}
