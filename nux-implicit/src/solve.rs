use tracing::{debug, trace};

use crate::convergence::{max_abs_diff, ConvergenceParams};
use crate::error::{Error, Result};
use crate::flatten::Flatten;
use crate::result::{FixedPointResult, Termination};

/// Iterate `x ← f(x)` from `x_init` with default tolerances.
///
/// See [`solve_with`].
pub fn solve<S, G>(f: G, x_init: S, max_iters: usize) -> Result<FixedPointResult<S>>
where
    S: Flatten,
    G: FnMut(&S) -> S,
{
    solve_with(f, x_init, &ConvergenceParams::new(max_iters))
}

/// Iterate `x ← f(x)` from `x_init` until two successive iterates are close
/// or `params.max_iters` loop iterations have run.
///
/// `f` is always applied once before the first check, so with
/// `max_iters == 0` the result is `f(x_init)` with zero iterations. Running out
/// of iterations is not an error: the last iterate comes back with
/// [`Termination::MaxIterations`]. The only failure is `f` changing the
/// flattened length of the state.
pub fn solve_with<S, G>(
    mut f: G,
    x_init: S,
    params: &ConvergenceParams<S::Scalar>,
) -> Result<FixedPointResult<S>>
where
    S: Flatten,
    G: FnMut(&S) -> S,
{
    let mut prev = x_init.flatten();
    let expected = prev.len();

    let mut x = f(&x_init);
    let mut curr = flatten_checked(&x, expected)?;

    let mut iterations = 0;
    let termination = loop {
        if params.allclose(&prev, &curr) {
            break Termination::Converged;
        }
        if iterations >= params.max_iters {
            break Termination::MaxIterations;
        }
        trace!(
            iteration = iterations,
            step = ?max_abs_diff(&prev, &curr),
            "fixed-point step"
        );

        x = f(&x);
        iterations += 1;
        prev = curr;
        curr = flatten_checked(&x, expected)?;
    };

    debug!(iterations, %termination, "fixed-point solve finished");
    Ok(FixedPointResult {
        value: x,
        iterations,
        termination,
    })
}

fn flatten_checked<S: Flatten>(x: &S, expected: usize) -> Result<Vec<S::Scalar>> {
    let flat = x.flatten();
    if flat.len() != expected {
        return Err(Error::ShapeMismatch {
            expected,
            found: flat.len(),
        });
    }
    Ok(flat)
}
