use nux::{Float, Scalar, TapeThreadLocal};
use nux_implicit::{fixed_point_with, ConvergenceParams, FixedPointMap, Real};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::flow::{check_batch, check_dim, check_params, Direction, Flow, FlowOutput};

/// Settings of a [`Residual`] layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResidualConfig {
    /// Lipschitz bound κ of the residual branch, in `(0, 1)` (default: 0.9).
    pub lipschitz: f64,
    /// Standard deviation of the initial weights (default: 0.1).
    pub init_scale: f64,
    /// Iteration ceiling of the inverse solve (default: 500).
    pub max_iters: usize,
    /// Absolute tolerance of the inverse solve (default: 1e-10).
    pub atol: f64,
}

impl Default for ResidualConfig {
    fn default() -> Self {
        ResidualConfig {
            lipschitz: 0.9,
            init_scale: 0.1,
            max_iters: 500,
            atol: 1e-10,
        }
    }
}

impl ResidualConfig {
    fn validate(&self) -> Result<()> {
        if !(self.lipschitz > 0.0 && self.lipschitz < 1.0) {
            return Err(FlowError::InvalidConfig(format!(
                "lipschitz bound must lie in (0, 1), got {}",
                self.lipschitz
            )));
        }
        if !(self.init_scale >= 0.0 && self.init_scale.is_finite()) {
            return Err(FlowError::InvalidConfig(format!(
                "init_scale must be finite and non-negative, got {}",
                self.init_scale
            )));
        }
        if !(self.atol > 0.0) {
            return Err(FlowError::InvalidConfig(format!(
                "atol must be positive, got {}",
                self.atol
            )));
        }
        Ok(())
    }
}

/// Elementwise invertible residual layer `y = x + g(x)` with
/// `g_i(x) = κ · tanh(w_i x_i + b_i) / (1 + |w_i|)`.
///
/// Each branch is a contraction (`|g_i'| < κ < 1`), so the inverse is the
/// fixed point of `x ← y - g(x)`. It is solved with
/// [`nux_implicit::fixed_point_with`], which makes gradients through the
/// inverse implicit rather than unrolled. Parameters are `[w; d] ++ [b; d]`.
#[derive(Debug, Clone)]
pub struct Residual {
    dim: usize,
    config: ResidualConfig,
}

impl Residual {
    pub fn new(dim: usize, config: ResidualConfig) -> Result<Self> {
        config.validate()?;
        Ok(Residual { dim, config })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn config(&self) -> &ResidualConfig {
        &self.config
    }
}

/// `(g_i(x_i), g_i'(x_i))` of one residual branch.
#[inline]
fn branch<T: Scalar>(kappa: T, w: T, b: T, x: T) -> (T, T) {
    let c = kappa / (T::one() + w.abs());
    let t = (w * x + b).tanh();
    (c * t, c * w * (T::one() - t * t))
}

fn log_det_at<T: Scalar>(kappa: T, w: &[T], b: &[T], x: &[T]) -> T {
    w.iter()
        .zip(b)
        .zip(x)
        .fold(T::zero(), |acc, ((&wi, &bi), &xi)| {
            let (_, dg) = branch(kappa, wi, bi, xi);
            acc + (T::one() + dg).ln()
        })
}

/// `x ← y - g(x)` with `u = [w; d] ++ [b; d] ++ [y; d]`.
#[derive(Debug, Clone)]
struct ResidualInverse {
    lipschitz: f64,
}

impl<F: TapeThreadLocal> FixedPointMap<F> for ResidualInverse {
    type Extra = ();

    fn apply<T: Scalar<Float = F>>(&self, u: &[T], x: &[T], _extra: &()) -> Vec<T> {
        let d = x.len();
        let (w, rest) = u.split_at(d);
        let (b, y) = rest.split_at(d);
        let kappa = T::lit(self.lipschitz);
        x.iter()
            .enumerate()
            .map(|(i, &xi)| y[i] - branch(kappa, w[i], b[i], xi).0)
            .collect()
    }
}

impl<T> Flow<T> for Residual
where
    T: Scalar,
    T::Float: Real,
{
    fn num_params(&self) -> usize {
        2 * self.dim
    }

    fn init(&self, batch: &[Vec<T::Float>], rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        check_batch(batch, self.dim)?;

        let mut params = Vec::with_capacity(2 * self.dim);
        for _ in 0..self.dim {
            let n: f64 = StandardNormal.sample(rng);
            params.push(<T::Float as Float>::lit(self.config.init_scale * n));
        }
        params.extend((0..self.dim).map(|_| <T::Float as Float>::lit(0.0)));
        Ok(params)
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
        let (w, b) = params.split_at(self.dim);
        let kappa = T::lit(self.config.lipschitz);

        match direction {
            Direction::Forward => {
                let y = x
                    .iter()
                    .enumerate()
                    .map(|(i, &xi)| xi + branch(kappa, w[i], b[i], xi).0)
                    .collect();
                Ok(FlowOutput {
                    x: y,
                    log_det: log_det_at(kappa, w, b, x),
                    log_pz: T::zero(),
                })
            }
            Direction::Inverse => {
                let map = ResidualInverse {
                    lipschitz: self.config.lipschitz,
                };
                let u: Vec<T> = params.iter().chain(x).copied().collect();
                let solver = ConvergenceParams::new(self.config.max_iters)
                    .with_atol(<T::Float as Float>::lit(self.config.atol));

                let solved = fixed_point_with(&map, &u, x, &solver, &())?;
                if solved.is_converged() {
                    debug!(iterations = solved.iterations, "residual inverse solved");
                } else {
                    warn!(
                        iterations = solved.iterations,
                        "residual inverse hit the iteration ceiling"
                    );
                }

                let log_det = -log_det_at(kappa, w, b, &solved.value);
                Ok(FlowOutput {
                    x: solved.value,
                    log_det,
                    log_pz: T::zero(),
                })
            }
        }
    }
}
