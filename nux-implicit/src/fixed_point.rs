use nux::op::{self, DifferentiableOp};
use nux::Scalar;

use crate::adjoint::fixed_point_vjp;
use crate::convergence::ConvergenceParams;
use crate::error::Result;
use crate::map::{FixedPointMap, Real};
use crate::result::{FixedPointResult, Termination};
use crate::solve::solve_with;

/// The fixed point `x* = map(u, x*, extra)` as a single differentiable node.
///
/// Inputs are `[u..., x_init...]`, outputs are `x*`. The backward rule is the
/// adjoint solve of [`fixed_point_vjp`]; the cotangent of `x_init` is zero, and
/// neither the stopping rule nor `extra` is an input of the node.
pub struct FixedPointOp<F: Real, M: FixedPointMap<F>> {
    map: M,
    extra: M::Extra,
    num_params: usize,
    params: ConvergenceParams<F>,
}

/// What the backward rule keeps from the forward solve.
#[derive(Debug, Clone)]
pub struct FixedPointContext<F> {
    pub u: Vec<F>,
    pub x_star: Vec<F>,
    pub iterations: usize,
    pub termination: Termination,
}

impl<F: Real, M: FixedPointMap<F>> FixedPointOp<F, M> {
    pub fn new(map: M, extra: M::Extra, num_params: usize, params: ConvergenceParams<F>) -> Self {
        FixedPointOp {
            map,
            extra,
            num_params,
            params,
        }
    }
}

impl<F, M> DifferentiableOp<F> for FixedPointOp<F, M>
where
    F: Real,
    M: FixedPointMap<F> + 'static,
    M::Extra: 'static,
{
    type Context = FixedPointContext<F>;
    type Error = crate::Error;

    fn forward(&self, inputs: &[F]) -> Result<(Vec<F>, FixedPointContext<F>)> {
        let (u, x_init) = inputs.split_at(self.num_params);
        let solved = solve_with(
            |x: &Vec<F>| self.map.apply(u, x.as_slice(), &self.extra),
            x_init.to_vec(),
            &self.params,
        )?;
        let ctx = FixedPointContext {
            u: u.to_vec(),
            x_star: solved.value.clone(),
            iterations: solved.iterations,
            termination: solved.termination,
        };
        Ok((solved.value, ctx))
    }

    fn backward(&self, ctx: &FixedPointContext<F>, upstream: &[F]) -> Vec<F> {
        let adjoint = match fixed_point_vjp(
            &self.map,
            &ctx.u,
            &ctx.x_star,
            upstream,
            &self.params,
            &self.extra,
        ) {
            Ok(adjoint) => adjoint,
            // The forward solve already checked every shape involved.
            Err(err) => panic!("fixed-point adjoint failed after a successful forward solve: {err}"),
        };
        let mut grads = adjoint.u_bar;
        grads.resize(self.num_params + ctx.x_star.len(), <F as Scalar>::zero());
        grads
    }
}

/// Solve `x* = map(u, x*, extra)` starting from `x_init`, differentiably in `u`.
///
/// With plain floats this is just the forward solve. With [`nux::Reverse`]
/// variables the solve is recorded as one [`FixedPointOp`] node on the active
/// tape, so a gradient over any enclosing computation runs the adjoint
/// iteration instead of unrolling the loop. `x_init`, `max_iters` and `extra`
/// get no gradient.
///
/// Non-convergence is silent; use [`fixed_point_with`] to inspect it.
pub fn fixed_point<T, M>(
    map: &M,
    u: &[T],
    x_init: &[T],
    max_iters: usize,
    extra: &M::Extra,
) -> Result<Vec<T>>
where
    T: Scalar,
    T::Float: Real,
    M: FixedPointMap<T::Float> + Clone + 'static,
    M::Extra: Clone + 'static,
{
    fixed_point_with(map, u, x_init, &ConvergenceParams::new(max_iters), extra).map(|r| r.value)
}

/// [`fixed_point`] with explicit tolerances, returning the forward solve's
/// iteration count and termination alongside the value.
pub fn fixed_point_with<T, M>(
    map: &M,
    u: &[T],
    x_init: &[T],
    params: &ConvergenceParams<T::Float>,
    extra: &M::Extra,
) -> Result<FixedPointResult<Vec<T>>>
where
    T: Scalar,
    T::Float: Real,
    M: FixedPointMap<T::Float> + Clone + 'static,
    M::Extra: Clone + 'static,
{
    let fp = FixedPointOp::new(map.clone(), extra.clone(), u.len(), params.clone());
    let inputs: Vec<T> = u.iter().chain(x_init).copied().collect();
    let values: Vec<T::Float> = inputs.iter().map(Scalar::value).collect();

    let (x_star, ctx) = fp.forward(&values)?;
    let iterations = ctx.iterations;
    let termination = ctx.termination;
    let value = op::attach(fp, ctx, &inputs, &x_star);

    Ok(FixedPointResult {
        value,
        iterations,
        termination,
    })
}
