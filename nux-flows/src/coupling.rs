use nux::{Float, Scalar};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use crate::error::Result;
use crate::flow::{check_batch, check_dim, check_params, Direction, Flow, FlowOutput};

/// Additive coupling layer with a dense conditioner.
///
/// `x` is split at `dim / 2`. One part conditions a shift of the other:
/// `t(c) = W2 · tanh(W1 · c + b1) + b2`, added in the forward direction and
/// subtracted in the inverse. The map preserves volume, so `log_det` is 0.
///
/// By default the first part conditions the second; [`Coupling::swapped`]
/// flips the roles so stacked couplings reach every coordinate. Parameters
/// are `W1 ++ b1 ++ W2 ++ b2`, matrices row-major.
#[derive(Debug, Clone)]
pub struct Coupling {
    dim: usize,
    hidden: usize,
    swap: bool,
}

impl Coupling {
    pub fn new(dim: usize, hidden: usize) -> Self {
        Coupling {
            dim,
            hidden,
            swap: false,
        }
    }

    /// Condition the first part on the second instead.
    pub fn swapped(mut self) -> Self {
        self.swap = !self.swap;
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// `(conditioner inputs, shifted outputs)`.
    fn widths(&self) -> (usize, usize) {
        let (a, b) = (self.dim / 2, self.dim - self.dim / 2);
        if self.swap {
            (b, a)
        } else {
            (a, b)
        }
    }

    fn shift<T: Scalar>(&self, params: &[T], cond: &[T]) -> Vec<T> {
        let (n_in, n_out) = self.widths();
        let h = self.hidden;
        let (w1, rest) = params.split_at(h * n_in);
        let (b1, rest) = rest.split_at(h);
        let (w2, b2) = rest.split_at(n_out * h);

        let hidden: Vec<T> = (0..h)
            .map(|j| {
                w1[j * n_in..(j + 1) * n_in]
                    .iter()
                    .zip(cond)
                    .fold(b1[j], |acc, (&w, &c)| acc + w * c)
                    .tanh()
            })
            .collect();
        (0..n_out)
            .map(|i| {
                w2[i * h..(i + 1) * h]
                    .iter()
                    .zip(&hidden)
                    .fold(b2[i], |acc, (&w, &v)| acc + w * v)
            })
            .collect()
    }
}

impl<T: Scalar> Flow<T> for Coupling {
    fn num_params(&self) -> usize {
        let (n_in, n_out) = self.widths();
        self.hidden * (n_in + 1) + n_out * (self.hidden + 1)
    }

    /// `W1 ~ N(0, 1/n_in)`, everything else zero, so the layer starts as the
    /// identity.
    fn init(&self, batch: &[Vec<T::Float>], rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        check_batch(batch, self.dim)?;
        let (n_in, _) = self.widths();
        let scale = 1.0 / (n_in.max(1) as f64).sqrt();
        let zero = <T::Float as Float>::lit(0.0);

        let mut params = Vec::with_capacity(Flow::<T>::num_params(self));
        for _ in 0..self.hidden * n_in {
            let n: f64 = StandardNormal.sample(rng);
            params.push(<T::Float as Float>::lit(scale * n));
        }
        params.resize(Flow::<T>::num_params(self), zero);

        debug!(dim = self.dim, hidden = self.hidden, "coupling initialized");
        Ok(params)
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        _rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        check_params(params, Flow::<T>::num_params(self))?;
        check_dim(x, self.dim)?;

        let (lo, hi) = x.split_at(self.dim / 2);
        let (cond, target) = if self.swap { (hi, lo) } else { (lo, hi) };
        let t = self.shift(params, cond);
        let moved: Vec<T> = target
            .iter()
            .zip(&t)
            .map(|(&v, &s)| match direction {
                Direction::Forward => v + s,
                Direction::Inverse => v - s,
            })
            .collect();

        let z = if self.swap {
            moved.into_iter().chain(cond.iter().copied()).collect()
        } else {
            cond.iter().copied().chain(moved).collect()
        };
        Ok(FlowOutput::new(z))
    }
}
