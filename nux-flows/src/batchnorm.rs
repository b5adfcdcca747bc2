use nux::{Float, Scalar};
use rand::RngCore;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::flow::{
    batch_moments, check_batch, check_dim, check_params, Direction, Flow, FlowOutput,
};

/// Settings of a [`BatchNorm`] layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchNormConfig {
    /// Added to every batch variance (default: 1e-5).
    pub epsilon: f64,
    /// Weight of a new batch in the running statistics, in `(0, 1]`
    /// (default: 0.05).
    pub momentum: f64,
}

impl Default for BatchNormConfig {
    fn default() -> Self {
        BatchNormConfig {
            epsilon: 1e-5,
            momentum: 0.05,
        }
    }
}

impl BatchNormConfig {
    fn validate(&self) -> Result<()> {
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(FlowError::InvalidConfig(format!(
                "epsilon must be finite and positive, got {}",
                self.epsilon
            )));
        }
        if !(self.momentum > 0.0 && self.momentum <= 1.0) {
            return Err(FlowError::InvalidConfig(format!(
                "momentum must lie in (0, 1], got {}",
                self.momentum
            )));
        }
        Ok(())
    }
}

/// Invertible batch normalization over population statistics.
///
/// Parameters are `[beta; d] ++ [log_gamma; d] ++ [mean; d] ++ [var; d]`.
/// The forward map is `z = exp(log_gamma) · (x - mean) / sqrt(var) + beta`
/// with log-det `Σ log_gamma - ½ Σ ln var`.
///
/// `mean` and `var` are running statistics, not trainable weights: they are
/// read as constants, so their gradient is always zero. [`BatchNorm::update_running`]
/// moves them toward the moments of a new batch.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    dim: usize,
    config: BatchNormConfig,
}

impl BatchNorm {
    pub fn new(dim: usize, config: BatchNormConfig) -> Result<Self> {
        config.validate()?;
        Ok(BatchNorm { dim, config })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn config(&self) -> &BatchNormConfig {
        &self.config
    }

    /// Exponential moving average of the statistics slots of `params` toward
    /// the mean and variance of `batch`.
    pub fn update_running<F: Float>(&self, params: &mut [F], batch: &[Vec<F>]) -> Result<()> {
        check_params(params, 4 * self.dim)?;
        check_batch(batch, self.dim)?;
        let (mean, var) = batch_moments(batch);
        let alpha = F::lit(self.config.momentum);
        let eps = F::lit(self.config.epsilon);

        let (_, stats) = params.split_at_mut(2 * self.dim);
        let (running_mean, running_var) = stats.split_at_mut(self.dim);
        for (r, m) in running_mean.iter_mut().zip(mean) {
            *r = (F::one() - alpha) * *r + alpha * m;
        }
        for (r, v) in running_var.iter_mut().zip(var) {
            *r = (F::one() - alpha) * *r + alpha * (v + eps);
        }
        Ok(())
    }
}

impl<T: Scalar> Flow<T> for BatchNorm {
    fn num_params(&self) -> usize {
        4 * self.dim
    }

    /// Identity affine part, statistics taken from `batch`.
    fn init(&self, batch: &[Vec<T::Float>], _rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        check_batch(batch, self.dim)?;
        let (mean, var) = batch_moments(batch);
        let eps = <T::Float as Float>::lit(self.config.epsilon);
        let zero = <T::Float as Float>::lit(0.0);

        debug!(dim = self.dim, batch = batch.len(), "batch norm statistics initialized");
        Ok(std::iter::repeat(zero)
            .take(2 * self.dim)
            .chain(mean)
            .chain(var.into_iter().map(|v| v + eps))
            .collect())
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        _rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        check_params(params, 4 * self.dim)?;
        check_dim(x, self.dim)?;
        let (beta, rest) = params.split_at(self.dim);
        let (log_gamma, rest) = rest.split_at(self.dim);
        let (mean, var) = rest.split_at(self.dim);

        let zero = <T::Float as Float>::lit(0.0);
        if let Some(v) = var.iter().map(Scalar::value).find(|&v| !(v > zero)) {
            return Err(FlowError::InvalidConfig(format!(
                "batch norm variance must be positive, got {v}"
            )));
        }
        let mean: Vec<T> = mean.iter().map(|m| T::from_f(m.value())).collect();
        let std: Vec<T> = var.iter().map(|v| T::from_f(v.value()).sqrt()).collect();

        let log_det = log_gamma
            .iter()
            .zip(&std)
            .fold(T::zero(), |acc, (&lg, &s)| acc + lg - s.ln());

        let z = x
            .iter()
            .enumerate()
            .map(|(i, &xi)| match direction {
                Direction::Forward => log_gamma[i].exp() * (xi - mean[i]) / std[i] + beta[i],
                Direction::Inverse => (xi - beta[i]) * (-log_gamma[i]).exp() * std[i] + mean[i],
            })
            .collect();

        Ok(FlowOutput {
            x: z,
            log_det: match direction {
                Direction::Forward => log_det,
                Direction::Inverse => -log_det,
            },
            log_pz: T::zero(),
        })
    }
}
