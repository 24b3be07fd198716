use std::sync::Arc;

use hypered::acquisition::{AcquisitionFn, ExpectedImprovement, UpperConfidenceBound};
use hypered::gp::{DEFAULT_NOISE, GaussianProcess};
use hypered::kernel::{Kernel, KernelParams, KernelRegistry, Matern, Rbf};
use hypered::{Error, ErrorKind};

#[test]
fn rbf_is_self_similar() {
    let rbf = Rbf::new(1.0).unwrap();
    for x in [vec![0.0, 0.0], vec![0.3, 0.9], vec![1.0, 0.25]] {
        let k = rbf.compute(&[x.clone()], &[x]);
        assert_eq!(k[(0, 0)], 1.0);
    }
}

#[test]
fn unsupported_matern_smoothness_is_a_configuration_error() {
    let err = Matern::new(1.0, 1.0).unwrap_err();
    assert!(matches!(err, Error::UnsupportedParameter { name: "nu", .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let registry = KernelRegistry::default();
    let params = KernelParams { scale: 1.0, nu: 1.0 };
    assert!(registry.create("Matern", &params).is_err());
}

#[test]
fn gp_interpolates_its_training_points() {
    let xs = vec![vec![0.1, 0.2], vec![0.5, 0.5], vec![0.9, 0.3], vec![0.4, 0.8]];
    let ys = [3.0, -1.0, 0.5, 2.0];
    for kernel in [
        Arc::new(Rbf::new(0.5).unwrap()) as Arc<dyn Kernel>,
        Arc::new(Matern::new(2.5, 0.5).unwrap()),
    ] {
        let mut gp = GaussianProcess::new(kernel);
        gp.fit(&xs, &ys).unwrap();
        let posterior = gp.predict(&xs).unwrap();
        for i in 0..xs.len() {
            assert!((posterior.mean[i] - ys[i]).abs() < 1e-4, "mean at {i}");
            let var = posterior.cov[(i, i)];
            assert!((var - DEFAULT_NOISE).abs() < 1e-5, "variance at {i}: {var}");
        }
    }
}

#[test]
fn acquisition_scores_follow_the_posterior() {
    let mut gp = GaussianProcess::new(Arc::new(Rbf::new(0.3).unwrap()));
    gp.fit(&[vec![0.2], vec![0.8]], &[1.0, 4.0]).unwrap();
    let candidates = vec![vec![0.2], vec![0.5], vec![0.8]];

    let ei = ExpectedImprovement::default();
    let scores = ei.score(&gp, &candidates, 1.0).unwrap();
    assert!(scores.iter().all(|s| *s >= 0.0));
    assert!(scores[0] < 1e-6, "at the incumbent: {}", scores[0]);
    assert!((scores[2] - 2.99).abs() < 1e-2, "at the worse point: {}", scores[2]);

    let ucb = UpperConfidenceBound::new(0.0).unwrap();
    let means = ucb.score(&gp, &candidates, 1.0).unwrap();
    let posterior = gp.predict(&candidates).unwrap();
    for (m, p) in means.iter().zip(posterior.mean.iter()) {
        assert!((m - p).abs() < 1e-12);
    }
}
