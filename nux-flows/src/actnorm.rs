use nux::{Float, Scalar};
use num_traits::Float as NumFloat;
use rand::RngCore;
use tracing::debug;

use crate::error::Result;
use crate::flow::{
    batch_moments, check_batch, check_dim, check_params, Direction, Flow, FlowOutput,
};

/// Per-dimension affine normalization.
///
/// Parameters are `[b; d] ++ [log_s; d]`. The forward map is
/// `z = (x - b) · exp(-log_s)`. Data-dependent initialization sets `b` and
/// `log_s` from the batch mean and standard deviation, so the first forward
/// pass sees roughly standardized data.
#[derive(Debug, Clone)]
pub struct ActNorm {
    dim: usize,
}

impl ActNorm {
    /// Added to the batch standard deviation before taking the log.
    pub const EPS: f64 = 1e-5;

    pub fn new(dim: usize) -> Self {
        ActNorm { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl<T: Scalar> Flow<T> for ActNorm {
    fn num_params(&self) -> usize {
        2 * self.dim
    }

    fn init(&self, batch: &[Vec<T::Float>], _rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        check_batch(batch, self.dim)?;
        let (mean, var) = batch_moments(batch);
        let eps = <T::Float as Float>::lit(Self::EPS);
        let log_s: Vec<T::Float> = var
            .iter()
            .map(|&v| NumFloat::ln(NumFloat::sqrt(v) + eps))
            .collect();

        debug!(dim = self.dim, batch = batch.len(), "actnorm initialized from data");
        Ok(mean.into_iter().chain(log_s).collect())
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        _rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        check_params(params, 2 * self.dim)?;
        check_dim(x, self.dim)?;
        let (b, log_s) = params.split_at(self.dim);

        let sum_log_s = log_s.iter().fold(T::zero(), |acc, &s| acc + s);
        let (z, log_det) = match direction {
            Direction::Forward => {
                let z = x
                    .iter()
                    .zip(b.iter().zip(log_s))
                    .map(|(&xi, (&bi, &si))| (xi - bi) * (-si).exp())
                    .collect();
                (z, -sum_log_s)
            }
            Direction::Inverse => {
                let z = x
                    .iter()
                    .zip(b.iter().zip(log_s))
                    .map(|(&zi, (&bi, &si))| si.exp() * zi + bi)
                    .collect();
                (z, sum_log_s)
            }
        };

        Ok(FlowOutput {
            x: z,
            log_det,
            log_pz: T::zero(),
        })
    }
}
