use nux::{Float, Scalar};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::{FlowError, Result};

/// Which way a flow is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Data to latent (density evaluation).
    Forward,
    /// Latent to data (sampling).
    Inverse,
}

impl Direction {
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Inverse,
            Direction::Inverse => Direction::Forward,
        }
    }
}

/// Result of running a flow on one data point.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutput<T> {
    /// Transformed point.
    pub x: Vec<T>,
    /// Log absolute Jacobian determinant of the map that was applied.
    pub log_det: T,
    /// Log density contributed by prior layers.
    pub log_pz: T,
}

impl<T: Scalar> FlowOutput<T> {
    /// A point with no density contributions.
    pub fn new(x: Vec<T>) -> Self {
        FlowOutput {
            x,
            log_det: T::zero(),
            log_pz: T::zero(),
        }
    }
}

/// An invertible layer with explicit parameters.
///
/// Layers hold only their structure (dimensions, configuration); parameters
/// are passed in as a flat slice so the same layer runs on plain floats for
/// sampling and on [`nux::Reverse`] variables for gradients.
pub trait Flow<T: Scalar> {
    /// Length of the flat parameter vector.
    fn num_params(&self) -> usize;

    /// Data-dependent initial parameters.
    fn init(&self, batch: &[Vec<T::Float>], rng: &mut dyn RngCore) -> Result<Vec<T::Float>>;

    /// Run the layer on `x` in `direction`.
    fn apply(
        &self,
        params: &[T],
        x: &[T],
        rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>>;
}

pub(crate) fn check_params<T>(params: &[T], expected: usize) -> Result<()> {
    if params.len() != expected {
        return Err(FlowError::ParamCount {
            expected,
            found: params.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_dim<T>(x: &[T], expected: usize) -> Result<()> {
    if x.len() != expected {
        return Err(FlowError::DimensionMismatch {
            expected,
            found: x.len(),
        });
    }
    Ok(())
}

/// Non-empty batch whose rows all have length `dim`.
pub(crate) fn check_batch<F>(batch: &[Vec<F>], dim: usize) -> Result<()> {
    if batch.is_empty() {
        return Err(FlowError::EmptyBatch);
    }
    batch.iter().try_for_each(|row| check_dim(row, dim))
}

/// Common row length of a non-empty batch.
pub(crate) fn batch_dim<F>(batch: &[Vec<F>]) -> Result<usize> {
    let dim = batch.first().ok_or(FlowError::EmptyBatch)?.len();
    check_batch(batch, dim)?;
    Ok(dim)
}

/// Split every row of a batch at column `at`.
pub(crate) fn split_batch<F: Copy>(batch: &[Vec<F>], at: usize) -> (Vec<Vec<F>>, Vec<Vec<F>>) {
    batch
        .iter()
        .map(|row| {
            let (a, b) = row.split_at(at);
            (a.to_vec(), b.to_vec())
        })
        .unzip()
}

/// Independent generator for a child layer, seeded from the parent.
pub(crate) fn child_rng(rng: &mut Option<&mut dyn RngCore>) -> Option<StdRng> {
    rng.as_deref_mut()
        .map(|parent| StdRng::seed_from_u64(parent.next_u64()))
}

/// Per-column mean and biased variance of a non-empty, rectangular batch.
pub(crate) fn batch_moments<F: Float>(batch: &[Vec<F>]) -> (Vec<F>, Vec<F>) {
    let dim = batch.first().map_or(0, Vec::len);
    let n = F::lit(batch.len() as f64);

    let mut mean = vec![F::zero(); dim];
    for row in batch {
        for (m, &v) in mean.iter_mut().zip(row) {
            *m = *m + v;
        }
    }
    for m in &mut mean {
        *m = *m / n;
    }

    let mut var = vec![F::zero(); dim];
    for row in batch {
        for ((s, &v), &m) in var.iter_mut().zip(row).zip(&mean) {
            *s = *s + (v - m) * (v - m);
        }
    }
    for s in &mut var {
        *s = *s / n;
    }
    (mean, var)
}

/// Lift primal values to constants of `T`.
pub(crate) fn lift<T: Scalar>(values: &[T::Float]) -> Vec<T> {
    values.iter().map(|&v| T::from_f(v)).collect()
}
