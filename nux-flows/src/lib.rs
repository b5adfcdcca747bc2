//! Normalizing-flow layers over the `nux` autodiff substrate.
//!
//! A [`Flow`] is an invertible map with explicit parameters that reports the
//! log-determinant of its Jacobian. Layers run on plain floats for sampling
//! and on [`nux::Reverse`] variables for training; the [`Residual`] layer
//! inverts itself with [`nux_implicit::fixed_point`], so its inverse is
//! differentiated implicitly.
//!
//! ```
//! use nux_flows::{ActNorm, Direction, Flow, Sequential, UnitGaussianPrior};
//! use rand::SeedableRng;
//!
//! let flow = Sequential::<f64>::new()
//!     .push(ActNorm::new(2))
//!     .push(UnitGaussianPrior);
//!
//! let batch = vec![vec![1.0, 2.0], vec![3.0, 0.0], vec![2.0, 1.0]];
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let params = flow.init(&batch, &mut rng).unwrap();
//!
//! let z = flow.apply(&params, &batch[0], None, Direction::Forward).unwrap();
//! let x = flow.apply(&params, &z.x, None, Direction::Inverse).unwrap();
//! assert!((x.x[0] - 1.0).abs() < 1e-12);
//! ```

pub mod actnorm;
pub mod batchnorm;
pub mod compose;
pub mod coupling;
pub mod error;
pub mod flow;
pub mod model;
pub mod prior;
pub mod residual;

pub use actnorm::ActNorm;
pub use batchnorm::{BatchNorm, BatchNormConfig};
pub use compose::{Factored, MultiScale, ReverseFlow, Sequential};
pub use coupling::Coupling;
pub use error::{FlowError, Result};
pub use flow::{Direction, Flow, FlowOutput};
pub use model::{log_prob, negative_log_likelihood, nll_and_grad, sample};
pub use prior::{standard_normal, UnitGaussianPrior};
pub use residual::{Residual, ResidualConfig};
