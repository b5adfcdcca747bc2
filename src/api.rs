use crate::reverse::Reverse;
use crate::tape::{Tape, TapeGuard, TapeThreadLocal};

/// Register `x` as independent variables on `tape`.
fn record_inputs<F: TapeThreadLocal>(tape: &mut Tape<F>, x: &[F]) -> Vec<Reverse<F>> {
    x.iter()
        .map(|&val| {
            let (idx, v) = tape.new_variable(val);
            Reverse::from_tape(v, idx)
        })
        .collect()
}

/// Compute the gradient of a scalar function `f : R^n → R` using reverse mode.
///
/// ```
/// let g = nux::grad(|x: &[nux::Reverse<f64>]| {
///     x[0] * x[0] + x[1] * x[1]
/// }, &[3.0, 4.0]);
/// assert!((g[0] - 6.0).abs() < 1e-10);
/// assert!((g[1] - 8.0).abs() < 1e-10);
/// ```
pub fn grad<F: TapeThreadLocal>(f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>, x: &[F]) -> Vec<F> {
    value_and_grad(f, x).1
}

/// Like [`grad`], also returning `f(x)`.
pub fn value_and_grad<F: TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>,
    x: &[F],
) -> (F, Vec<F>) {
    let n = x.len();
    let mut tape = Tape::with_capacity(n * 10);
    let inputs = record_inputs(&mut tape, x);

    let output = {
        let _guard = TapeGuard::new(&mut tape);
        f(&inputs)
    };

    // A constant output seeds nothing and yields a zero gradient.
    let adjoints = tape.reverse(output.index);
    (output.value, adjoints[..n].to_vec())
}

/// Vector-Jacobian product (reverse mode): `(f(x), wᵀ·J)`.
pub fn vjp<F: TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<F>]) -> Vec<Reverse<F>>,
    x: &[F],
    w: &[F],
) -> (Vec<F>, Vec<F>) {
    let n = x.len();
    let mut tape = Tape::with_capacity(n * 10);
    let inputs = record_inputs(&mut tape, x);

    let outputs = {
        let _guard = TapeGuard::new(&mut tape);
        f(&inputs)
    };
    assert_eq!(
        outputs.len(),
        w.len(),
        "output length must match weight vector length"
    );

    let values = outputs.iter().map(|r| r.value).collect();
    let seeds: Vec<(u32, F)> = outputs
        .iter()
        .zip(w.iter())
        .map(|(r, &wi)| (r.index, wi))
        .collect();
    let adjoints = tape.reverse_seeded(&seeds);
    (values, adjoints[..n].to_vec())
}
