use std::sync::Arc;

use hypered::acquisition::ExpectedImprovement;
use hypered::kernel::Rbf;
use hypered::{BayesianOptimizer, Result, Space, Variable};
use serde_json::Value;

fn quadratic(values: &[Value]) -> Result<f64> {
    let x = values[0].as_f64().unwrap_or(f64::NAN);
    Ok((x - 5.0).powi(2))
}

fn optimizer(seed: u64) -> BayesianOptimizer {
    let space = Space::new(vec![Variable::real(-10.0, 10.0)]).unwrap();
    BayesianOptimizer::builder(space)
        .kernel(Arc::new(Rbf::new(1.0).unwrap()))
        .acquisition(Arc::new(ExpectedImprovement::new(0.01).unwrap()))
        .n_initial_points(5)
        .n_calls(20)
        .seed(seed)
        .build()
        .unwrap()
}

#[test]
fn quadratic_converges_near_its_minimum() {
    let observations = optimizer(42).minimize(&quadratic).unwrap();
    assert_eq!(observations.len(), 20);

    let best = observations
        .iter()
        .min_by(|a, b| a.objective.total_cmp(&b.objective))
        .unwrap();
    let x = best.values[0].as_f64().unwrap();
    assert!((4.0..=6.0).contains(&x), "best x = {x}");

    for initial in &observations[..5] {
        assert!(
            best.objective < initial.objective,
            "best {} does not beat initial point {}",
            best.objective,
            initial.objective
        );
    }
}

#[test]
fn guided_points_respect_the_space() {
    let observations = optimizer(7).minimize(&quadratic).unwrap();
    for o in &observations[5..] {
        assert!(o.x.iter().all(|v| (0.0..=1.0).contains(v)));
        let x = o.values[0].as_f64().unwrap();
        assert!((-10.0..=10.0).contains(&x));
    }
}
