use approx::assert_abs_diff_eq;
use nux::Reverse;
use nux_flows::{
    standard_normal, ActNorm, BatchNorm, BatchNormConfig, Coupling, Direction, Flow, FlowError,
    Residual, ResidualConfig, UnitGaussianPrior,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

fn round_trip(layer: &dyn Flow<f64>, params: &[f64], x: &[f64], tol: f64) {
    let fwd = layer.apply(params, x, None, Direction::Forward).unwrap();
    let back = layer.apply(params, &fwd.x, None, Direction::Inverse).unwrap();
    for (a, b) in back.x.iter().zip(x) {
        assert_abs_diff_eq!(a, b, epsilon = tol);
    }
    assert_abs_diff_eq!(fwd.log_det + back.log_det, 0.0, epsilon = tol);
}

fn tight_residual() -> Residual {
    Residual::new(
        3,
        ResidualConfig {
            max_iters: 5000,
            atol: 1e-13,
            ..ResidualConfig::default()
        },
    )
    .unwrap()
}

const W: [f64; 3] = [0.8, -1.5, 2.0];
const B: [f64; 3] = [0.1, -0.2, 0.3];

fn residual_params() -> Vec<f64> {
    W.iter().chain(&B).copied().collect()
}

// ============================================================
// ActNorm
// ============================================================

#[test]
fn actnorm_round_trip() {
    let layer = ActNorm::new(3);
    let params = [0.5, -1.0, 2.0, 0.3, -0.7, 1.1];
    round_trip(&layer, &params, &[1.0, 2.0, -3.0], 1e-12);
}

#[test]
fn actnorm_forward_values() {
    let layer = ActNorm::new(1);
    let out = layer
        .apply(&[1.0, 2.0_f64.ln()], &[5.0], None, Direction::Forward)
        .unwrap();
    assert_abs_diff_eq!(out.x[0], 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(out.log_det, -(2.0_f64.ln()), epsilon = 1e-12);
    assert_eq!(out.log_pz, 0.0);
}

#[test]
fn actnorm_init_standardizes_batch() {
    let layer = ActNorm::new(2);
    let batch = vec![
        vec![1.0, 10.0],
        vec![3.0, 14.0],
        vec![2.0, 8.0],
        vec![6.0, 12.0],
        vec![-1.0, 11.0],
    ];
    let params = Flow::<f64>::init(&layer, &batch, &mut rng()).unwrap();
    assert_eq!(params.len(), 4);

    let zs: Vec<Vec<f64>> = batch
        .iter()
        .map(|x| layer.apply(&params, x, None, Direction::Forward).unwrap().x)
        .collect();
    for d in 0..2 {
        let mean = zs.iter().map(|z| z[d]).sum::<f64>() / zs.len() as f64;
        let var = zs.iter().map(|z| (z[d] - mean).powi(2)).sum::<f64>() / zs.len() as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(var.sqrt(), 1.0, epsilon = 1e-4);
    }
}

#[test]
fn actnorm_rejects_bad_shapes() {
    let layer = ActNorm::new(2);
    assert_eq!(
        layer.apply(&[0.0; 3], &[1.0, 2.0], None, Direction::Forward),
        Err(FlowError::ParamCount {
            expected: 4,
            found: 3
        })
    );
    assert_eq!(
        layer.apply(&[0.0; 4], &[1.0], None, Direction::Forward),
        Err(FlowError::DimensionMismatch {
            expected: 2,
            found: 1
        })
    );
    let empty: Vec<Vec<f64>> = Vec::new();
    assert_eq!(
        Flow::<f64>::init(&layer, &empty, &mut rng()),
        Err(FlowError::EmptyBatch)
    );
    assert_eq!(
        Flow::<f64>::init(&layer, &[vec![1.0, 2.0], vec![1.0]], &mut rng()),
        Err(FlowError::DimensionMismatch {
            expected: 2,
            found: 1
        })
    );
}

// ============================================================
// Residual
// ============================================================

#[test]
fn residual_round_trip() {
    let layer = Residual::new(3, ResidualConfig::default()).unwrap();
    round_trip(&layer, &residual_params(), &[0.5, -1.0, 0.25], 1e-8);
}

#[test]
fn residual_log_det_matches_jacobian() {
    let layer = tight_residual();
    let params = residual_params();
    let x = [0.4, 0.9, -0.6];
    let forward = |x: &[f64]| layer.apply(&params, x, None, Direction::Forward).unwrap();

    let h = 1e-6;
    let mut jac = [[0.0; 3]; 3];
    for j in 0..3 {
        let mut xp = x;
        let mut xm = x;
        xp[j] += h;
        xm[j] -= h;
        let (yp, ym) = (forward(&xp).x, forward(&xm).x);
        for i in 0..3 {
            jac[i][j] = (yp[i] - ym[i]) / (2.0 * h);
        }
    }
    let det = jac[0][0] * (jac[1][1] * jac[2][2] - jac[1][2] * jac[2][1])
        - jac[0][1] * (jac[1][0] * jac[2][2] - jac[1][2] * jac[2][0])
        + jac[0][2] * (jac[1][0] * jac[2][1] - jac[1][1] * jac[2][0]);

    assert_abs_diff_eq!(forward(&x).log_det, det.abs().ln(), epsilon = 1e-6);
}

#[test]
fn residual_inverse_gradient_matches_finite_differences() {
    let layer = tight_residual();
    let y = [0.7, -0.3, 1.2];
    let weights = [1.0, -2.0, 0.5];

    // L = Σ c_i x_i + log_det, with (x, log_det) the inverse at y.
    let loss = |params: &[f64]| {
        let out = layer.apply(params, &y, None, Direction::Inverse).unwrap();
        out.x.iter().zip(&weights).map(|(x, c)| x * c).sum::<f64>() + out.log_det
    };

    let p0 = residual_params();
    let g = nux::grad(
        |p| {
            let yr: Vec<Reverse<f64>> = y.iter().map(|&v| Reverse::constant(v)).collect();
            let out = layer.apply(p, &yr, None, Direction::Inverse).unwrap();
            out.x
                .iter()
                .zip(&weights)
                .fold(out.log_det, |acc, (&x, &c)| acc + x * c)
        },
        &p0,
    );

    let h = 1e-6;
    for k in 0..p0.len() {
        let mut pp = p0.clone();
        let mut pm = p0.clone();
        pp[k] += h;
        pm[k] -= h;
        let fd = (loss(&pp) - loss(&pm)) / (2.0 * h);
        assert_abs_diff_eq!(g[k], fd, epsilon = 1e-5);
    }
}

#[test]
fn residual_inverse_gradient_with_respect_to_data() {
    let layer = tight_residual();
    let params = residual_params();
    let y0 = [0.2, 0.4, -0.9];

    let g = nux::grad(
        |y| {
            let p: Vec<Reverse<f64>> = params.iter().map(|&v| Reverse::constant(v)).collect();
            let out = layer.apply(&p, y, None, Direction::Inverse).unwrap();
            out.x[0] + out.x[1] + out.x[2]
        },
        &y0,
    );

    // Elementwise map: dx_i/dy_i = 1 / (1 + g_i'(x_i)).
    let x = layer.apply(&params, &y0, None, Direction::Inverse).unwrap().x;
    for i in 0..3 {
        let c = 0.9 / (1.0 + W[i].abs());
        let t = (W[i] * x[i] + B[i]).tanh();
        let dg = c * W[i] * (1.0 - t * t);
        assert_abs_diff_eq!(g[i], 1.0 / (1.0 + dg), epsilon = 1e-8);
    }
}

#[test]
fn residual_small_budget_still_returns() {
    let layer = Residual::new(
        3,
        ResidualConfig {
            max_iters: 2,
            ..ResidualConfig::default()
        },
    )
    .unwrap();
    let out = layer
        .apply(&residual_params(), &[1.0, 1.0, 1.0], None, Direction::Inverse)
        .unwrap();
    assert!(out.x.iter().all(|v| v.is_finite()));
}

#[test]
fn residual_rejects_invalid_lipschitz() {
    for kappa in [0.0, 1.0, 1.5, -0.2, f64::NAN] {
        let config = ResidualConfig {
            lipschitz: kappa,
            ..ResidualConfig::default()
        };
        assert!(matches!(
            Residual::new(2, config),
            Err(FlowError::InvalidConfig(_))
        ));
    }
}

#[test]
fn residual_init_is_seeded() {
    let layer = Residual::new(
        4,
        ResidualConfig {
            init_scale: 0.5,
            ..ResidualConfig::default()
        },
    )
    .unwrap();
    let batch = vec![vec![0.0; 4]; 3];
    let a = Flow::<f64>::init(&layer, &batch, &mut rng()).unwrap();
    let b = Flow::<f64>::init(&layer, &batch, &mut rng()).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.len(), 8);
    assert!(a[..4].iter().any(|&w| w != 0.0));
    assert!(a[4..].iter().all(|&b| b == 0.0));
}

// ============================================================
// Prior
// ============================================================

#[test]
fn prior_log_density() {
    let out = UnitGaussianPrior
        .apply(&[], &[0.0, 0.0, 0.0], None, Direction::Forward)
        .unwrap();
    let expected = -1.5 * (2.0 * std::f64::consts::PI).ln();
    assert_abs_diff_eq!(out.log_pz, expected, epsilon = 1e-12);
    assert_eq!(out.log_det, 0.0);

    let out = UnitGaussianPrior
        .apply(&[], &[1.0, -2.0], None, Direction::Forward)
        .unwrap();
    assert_abs_diff_eq!(
        out.log_pz,
        -2.5 - (2.0 * std::f64::consts::PI).ln(),
        epsilon = 1e-12
    );
}

#[test]
fn prior_samples_with_generator() {
    let x = [0.0; 5];
    let a = UnitGaussianPrior
        .apply(&[], &x, Some(&mut rng()), Direction::Inverse)
        .unwrap();
    let b = UnitGaussianPrior
        .apply(&[], &x, Some(&mut rng()), Direction::Inverse)
        .unwrap();
    assert_eq!(a.x.len(), 5);
    assert_eq!(a.x, b.x);
    assert!(a.x.iter().any(|&v| v != 0.0));
}

#[test]
fn prior_reconstructs_without_generator() {
    let x = [0.3, -0.1];
    let out = UnitGaussianPrior
        .apply(&[], &x, None, Direction::Inverse)
        .unwrap();
    assert_eq!(out.x, x.to_vec());
}

#[test]
fn prior_rejects_parameters() {
    assert_eq!(
        UnitGaussianPrior.apply(&[1.0], &[0.0], None, Direction::Forward),
        Err(FlowError::ParamCount {
            expected: 0,
            found: 1
        })
    );
}

// ============================================================
// BatchNorm
// ============================================================

fn batchnorm_params() -> Vec<f64> {
    // beta, log_gamma, mean, var
    vec![0.2, -0.1, 0.3, -0.4, 1.0, -2.0, 4.0, 0.5]
}

#[test]
fn batchnorm_round_trip() {
    let layer = BatchNorm::new(2, BatchNormConfig::default()).unwrap();
    round_trip(&layer, &batchnorm_params(), &[2.0, -1.5], 1e-12);
}

#[test]
fn batchnorm_forward_values() {
    let layer = BatchNorm::new(2, BatchNormConfig::default()).unwrap();
    let out = layer
        .apply(&batchnorm_params(), &[2.0, -1.5], None, Direction::Forward)
        .unwrap();

    assert_abs_diff_eq!(out.x[0], 0.3_f64.exp() * (2.0 - 1.0) / 2.0 + 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(
        out.x[1],
        (-0.4_f64).exp() * (-1.5 + 2.0) / 0.5_f64.sqrt() - 0.1,
        epsilon = 1e-12
    );
    // Σ log_gamma - ½ Σ ln var
    let expected = (0.3 - 0.4) - 0.5 * (4.0_f64.ln() + 0.5_f64.ln());
    assert_abs_diff_eq!(out.log_det, expected, epsilon = 1e-12);
}

#[test]
fn batchnorm_init_uses_batch_moments() {
    let layer = BatchNorm::new(2, BatchNormConfig::default()).unwrap();
    let batch = vec![vec![1.0, 4.0], vec![3.0, 4.0], vec![2.0, 7.0], vec![2.0, 1.0]];
    let params = Flow::<f64>::init(&layer, &batch, &mut rng()).unwrap();

    assert_eq!(&params[..4], &[0.0; 4]);
    assert_abs_diff_eq!(params[4], 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(params[5], 4.0, epsilon = 1e-12);
    assert_abs_diff_eq!(params[6], 0.5 + 1e-5, epsilon = 1e-12);
    assert_abs_diff_eq!(params[7], 4.5 + 1e-5, epsilon = 1e-12);
}

#[test]
fn batchnorm_statistics_get_no_gradient() {
    let layer = BatchNorm::new(2, BatchNormConfig::default()).unwrap();
    let g = nux::grad(
        |p| {
            let x = [Reverse::constant(2.0), Reverse::constant(-1.5)];
            let out = layer.apply(p, &x, None, Direction::Forward).unwrap();
            out.x[0] * out.x[1] + out.log_det
        },
        &batchnorm_params(),
    );
    assert!(g[..4].iter().all(|&v| v != 0.0));
    assert_eq!(&g[4..], &[0.0; 4]);
}

#[test]
fn batchnorm_running_average() {
    let layer = BatchNorm::new(
        1,
        BatchNormConfig {
            momentum: 0.25,
            ..BatchNormConfig::default()
        },
    )
    .unwrap();
    let mut params = vec![0.5, 0.1, 0.0, 1.0];
    layer
        .update_running(&mut params, &[vec![1.0], vec![3.0]])
        .unwrap();

    // Batch mean 2, variance 1.
    assert_eq!(&params[..2], &[0.5, 0.1]);
    assert_abs_diff_eq!(params[2], 0.25 * 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(params[3], 0.75 + 0.25 * (1.0 + 1e-5), epsilon = 1e-12);

    assert_eq!(
        layer.update_running(&mut params[..3], &[vec![1.0]]),
        Err(FlowError::ParamCount {
            expected: 4,
            found: 3
        })
    );
}

#[test]
fn batchnorm_rejects_invalid_settings() {
    for config in [
        BatchNormConfig {
            momentum: 0.0,
            ..BatchNormConfig::default()
        },
        BatchNormConfig {
            epsilon: -1.0,
            ..BatchNormConfig::default()
        },
    ] {
        assert!(matches!(
            BatchNorm::new(1, config),
            Err(FlowError::InvalidConfig(_))
        ));
    }

    let layer = BatchNorm::new(1, BatchNormConfig::default()).unwrap();
    assert!(matches!(
        layer.apply(&[0.0, 0.0, 0.0, 0.0], &[1.0], None, Direction::Forward),
        Err(FlowError::InvalidConfig(_))
    ));
}

// ============================================================
// Coupling
// ============================================================

fn coupling_params(layer: &Coupling) -> Vec<f64> {
    standard_normal(&mut rng(), Flow::<f64>::num_params(layer))
}

#[test]
fn coupling_param_layout() {
    assert_eq!(Flow::<f64>::num_params(&Coupling::new(5, 3)), 3 * 3 + 3 * 4);
    assert_eq!(Flow::<f64>::num_params(&Coupling::new(5, 3).swapped()), 3 * 4 + 2 * 4);
}

#[test]
fn coupling_round_trip() {
    for layer in [Coupling::new(5, 3), Coupling::new(5, 3).swapped()] {
        let params = coupling_params(&layer);
        round_trip(&layer, &params, &[0.4, -1.2, 2.0, 0.1, -0.6], 1e-12);
    }
}

#[test]
fn coupling_forward_values() {
    // W1, b1, W2, b2 for one hidden unit.
    let params = [0.7, -0.2, 1.5, 0.3];
    let x = [0.8, -0.4];

    let out = Coupling::new(2, 1)
        .apply(&params, &x, None, Direction::Forward)
        .unwrap();
    assert_eq!(out.x[0], x[0]);
    assert_abs_diff_eq!(
        out.x[1],
        x[1] + 1.5 * (0.7_f64 * 0.8 - 0.2).tanh() + 0.3,
        epsilon = 1e-12
    );
    assert_eq!(out.log_det, 0.0);

    let out = Coupling::new(2, 1)
        .swapped()
        .apply(&params, &x, None, Direction::Forward)
        .unwrap();
    assert_eq!(out.x[1], x[1]);
    assert_abs_diff_eq!(
        out.x[0],
        x[0] + 1.5 * (0.7_f64 * -0.4 - 0.2).tanh() + 0.3,
        epsilon = 1e-12
    );
}

#[test]
fn coupling_starts_as_identity() {
    let layer = Coupling::new(4, 6);
    let batch = vec![vec![1.0, 2.0, 3.0, 4.0]; 2];
    let params = Flow::<f64>::init(&layer, &batch, &mut rng()).unwrap();
    assert!(params[..6 * 2].iter().any(|&w| w != 0.0));

    let out = layer.apply(&params, &batch[0], None, Direction::Forward).unwrap();
    assert_eq!(out.x, batch[0]);
}

#[test]
fn coupling_gradient_matches_finite_differences() {
    let layer = Coupling::new(3, 2);
    let p0 = coupling_params(&layer);
    let x = [0.5, -0.3, 1.1];
    let loss = |p: &[f64]| {
        let z = layer.apply(p, &x, None, Direction::Inverse).unwrap().x;
        z.iter().map(|v| v * v).sum::<f64>()
    };

    let g = nux::grad(
        |p| {
            let xr: Vec<Reverse<f64>> = x.iter().map(|&v| Reverse::constant(v)).collect();
            let z = layer.apply(p, &xr, None, Direction::Inverse).unwrap().x;
            z.iter().fold(Reverse::constant(0.0), |acc, &v| acc + v * v)
        },
        &p0,
    );

    let h = 1e-6;
    for k in 0..p0.len() {
        let mut pp = p0.clone();
        let mut pm = p0.clone();
        pp[k] += h;
        pm[k] -= h;
        assert_abs_diff_eq!(g[k], (loss(&pp) - loss(&pm)) / (2.0 * h), epsilon = 1e-6);
    }
}
