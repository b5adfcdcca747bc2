use nux::reverse::Reverse;
use nux::tape::{Tape, TapeGuard, TapeThreadLocal};
use tracing::debug;

use crate::convergence::ConvergenceParams;
use crate::error::{Error, Result};
use crate::map::{FixedPointMap, Real};
use crate::result::AdjointResult;
use crate::solve::solve_with;

/// One recording of `g(u, x)` at a fixed point, reused for every
/// vector-Jacobian product of the adjoint loop.
///
/// Tape inputs are laid out as `[x..., u...]`.
struct Linearization<F: TapeThreadLocal> {
    tape: Tape<F>,
    outputs: Vec<u32>,
    num_states: usize,
    num_params: usize,
}

impl<F: TapeThreadLocal> Linearization<F> {
    fn record<M: FixedPointMap<F>>(map: &M, u: &[F], x_star: &[F], extra: &M::Extra) -> Result<Self> {
        let mut tape = Tape::with_capacity((x_star.len() + u.len()) * 10);
        let mut variable = |v: F| {
            let (idx, val) = tape.new_variable(v);
            Reverse::from_tape(val, idx)
        };
        let xs: Vec<Reverse<F>> = x_star.iter().map(|&v| variable(v)).collect();
        let us: Vec<Reverse<F>> = u.iter().map(|&v| variable(v)).collect();

        let gx = {
            let _guard = TapeGuard::new(&mut tape);
            map.apply(&us, &xs, extra)
        };
        if gx.len() != x_star.len() {
            return Err(Error::ShapeMismatch {
                expected: x_star.len(),
                found: gx.len(),
            });
        }

        Ok(Linearization {
            tape,
            outputs: gx.iter().map(Reverse::index).collect(),
            num_states: x_star.len(),
            num_params: u.len(),
        })
    }

    /// `[ζᵀ ∂g/∂x ; ζᵀ ∂g/∂u]`, length `num_states + num_params`.
    fn pullback(&self, zeta: &[F]) -> Vec<F> {
        let seeds: Vec<(u32, F)> = self.outputs.iter().copied().zip(zeta.iter().copied()).collect();
        let mut adjoints = self.tape.reverse_seeded(&seeds);
        adjoints.truncate(self.num_states + self.num_params);
        adjoints
    }
}

/// Reverse-mode gradient of a fixed point `x* = g(u, x*, extra)` with respect
/// to `u`, by the implicit function theorem.
///
/// Solves the adjoint equation `ζ = dL/dx* + ζᵀ ∂g/∂x` with the same iteration
/// and stopping rule as the forward solve (starting from `ζ = dL/dx*`), then
/// returns `dL/du = ζᵀ ∂g/∂u`. Nothing of the forward loop is replayed; only
/// `x*` is needed. An adjoint that runs out of iterations is used as is and
/// reported through [`AdjointResult::termination`].
pub fn fixed_point_vjp<F, M>(
    map: &M,
    u: &[F],
    x_star: &[F],
    dl_dx: &[F],
    params: &ConvergenceParams<F>,
    extra: &M::Extra,
) -> Result<AdjointResult<F>>
where
    F: Real,
    M: FixedPointMap<F>,
{
    if dl_dx.len() != x_star.len() {
        return Err(Error::ShapeMismatch {
            expected: x_star.len(),
            found: dl_dx.len(),
        });
    }
    let lin = Linearization::record(map, u, x_star, extra)?;
    let m = lin.num_states;

    let rev_iter = |zeta: &Vec<F>| -> Vec<F> {
        let adj = lin.pullback(zeta);
        dl_dx.iter().zip(&adj[..m]).map(|(&d, &a)| d + a).collect()
    };
    let solved = solve_with(rev_iter, dl_dx.to_vec(), params)?;
    debug!(
        iterations = solved.iterations,
        termination = %solved.termination,
        "adjoint solve finished"
    );

    let adj = lin.pullback(&solved.value);
    Ok(AdjointResult {
        u_bar: adj[m..].to_vec(),
        zeta: solved.value,
        iterations: solved.iterations,
        termination: solved.termination,
    })
}
