use nux::{Float, Scalar};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::error::Result;
use crate::flow::{batch_dim, check_params, lift, Direction, Flow, FlowOutput};

/// Draw `n` independent standard normal values.
pub fn standard_normal<F: Float>(rng: &mut dyn RngCore, n: usize) -> Vec<F> {
    (0..n)
        .map(|_| {
            let v: f64 = StandardNormal.sample(rng);
            F::lit(v)
        })
        .collect()
}

/// Standard normal base distribution as the last layer of a flow.
///
/// Forward: `x` passes through and `log_pz = -½ Σ z² - (d/2) ln 2π`.
/// Inverse with a generator: a fresh `z ~ N(0, I)` of the same length
/// replaces the input (sampling). Inverse without one: `x` passes through
/// (reconstruction).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitGaussianPrior;

impl UnitGaussianPrior {
    pub fn log_prob<T: Scalar>(z: &[T]) -> T {
        let sq = z.iter().fold(T::zero(), |acc, &zi| acc + zi * zi);
        let half_d_log_2pi = T::lit(0.5 * z.len() as f64 * (2.0 * std::f64::consts::PI).ln());
        -(T::lit(0.5) * sq) - half_d_log_2pi
    }
}

impl<T: Scalar> Flow<T> for UnitGaussianPrior {
    fn num_params(&self) -> usize {
        0
    }

    fn init(&self, batch: &[Vec<T::Float>], _rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        batch_dim(batch)?;
        Ok(Vec::new())
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        check_params(params, 0)?;
        let z = match (direction, rng) {
            (Direction::Inverse, Some(rng)) => lift(&standard_normal::<T::Float>(rng, x.len())),
            _ => x.to_vec(),
        };
        let log_pz = Self::log_prob(&z);
        Ok(FlowOutput {
            x: z,
            log_det: T::zero(),
            log_pz,
        })
    }
}
