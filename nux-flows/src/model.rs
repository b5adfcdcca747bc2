use nux::{Reverse, Scalar, TapeThreadLocal};
use rand::RngCore;
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::flow::{lift, Direction, Flow};
use crate::prior::standard_normal;

/// `log_det + log_pz` of one data point under the forward direction.
pub fn log_prob<T: Scalar>(flow: &dyn Flow<T>, params: &[T], x: &[T]) -> Result<T> {
    let out = flow.apply(params, x, None, Direction::Forward)?;
    Ok(out.log_det + out.log_pz)
}

/// Mean negative log-likelihood of `batch`.
pub fn negative_log_likelihood<T: Scalar>(
    flow: &dyn Flow<T>,
    params: &[T],
    batch: &[Vec<T::Float>],
) -> Result<T> {
    if batch.is_empty() {
        return Err(FlowError::EmptyBatch);
    }
    let mut total = T::zero();
    for row in batch {
        total = total + log_prob(flow, params, &lift::<T>(row))?;
    }
    Ok(-total / T::lit(batch.len() as f64))
}

/// [`negative_log_likelihood`] and its gradient with respect to `params`.
///
/// `flow` is the same architecture built over `Reverse<F>`.
pub fn nll_and_grad<F: TapeThreadLocal>(
    flow: &dyn Flow<Reverse<F>>,
    params: &[F],
    batch: &[Vec<F>],
) -> Result<(F, Vec<F>)> {
    let mut failure = None;
    let (nll, grad) = nux::value_and_grad(
        |p| match negative_log_likelihood(flow, p, batch) {
            Ok(nll) => nll,
            Err(err) => {
                failure = Some(err);
                Reverse::constant(F::nan())
            }
        },
        params,
    );
    match failure {
        Some(err) => Err(err),
        None => {
            debug!(nll = %nll, "evaluated negative log-likelihood");
            Ok((nll, grad))
        }
    }
}

/// Draw `n` points of dimension `dim` by running the flow in reverse from
/// standard normal latents.
///
/// Each latent is drawn here and the inverse runs without a generator, so a
/// trailing [`crate::UnitGaussianPrior`] reconstructs from it instead of
/// drawing again.
pub fn sample<T: Scalar>(
    flow: &dyn Flow<T>,
    params: &[T],
    dim: usize,
    rng: &mut dyn RngCore,
    n: usize,
) -> Result<Vec<Vec<T>>> {
    (0..n)
        .map(|_| {
            let z = lift::<T>(&standard_normal::<T::Float>(rng, dim));
            let out = flow.apply(params, &z, None, Direction::Inverse)?;
            Ok(out.x)
        })
        .collect()
}
