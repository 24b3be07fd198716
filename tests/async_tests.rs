//! Async integration tests.
//!
//! These tests are only compiled when the `async` feature is enabled.

#![cfg(feature = "async")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hypered::dynamic::RoundRobin;
use hypered::tree::{JsonMap, ParamTree};
use hypered::{BayesianOptimizer, Error, Result, Search, Space, Variable};
use serde_json::{Value, json};

fn quadratic(values: &[Value]) -> Result<f64> {
    let x = values[0].as_f64().unwrap_or(f64::NAN);
    Ok((x - 1.0).powi(2))
}

fn optimizer(n_initial_points: usize, n_calls: usize) -> BayesianOptimizer {
    let space = Space::new(vec![Variable::real(-3.0, 3.0)]).unwrap();
    BayesianOptimizer::builder(space)
        .n_initial_points(n_initial_points)
        .n_calls(n_calls)
        .seed(21)
        .build()
        .unwrap()
}

#[tokio::test]
async fn parallel_run_matches_the_sequential_one() {
    let sequential = optimizer(6, 9).minimize(&quadratic).unwrap();
    let parallel = optimizer(6, 9)
        .minimize_parallel(3, Arc::new(quadratic))
        .await
        .unwrap();
    assert_eq!(parallel, sequential);
}

#[tokio::test]
async fn parallelism_bounds_concurrent_evaluations() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let objective = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        move |values: &[Value]| -> Result<f64> {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            running.fetch_sub(1, Ordering::SeqCst);
            quadratic(values)
        }
    };

    let observations = optimizer(8, 8)
        .minimize_parallel(2, Arc::new(objective))
        .await
        .unwrap();
    assert_eq!(observations.len(), 8);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn zero_parallelism_is_rejected() {
    let err = optimizer(2, 2)
        .minimize_parallel(0, Arc::new(quadratic))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidCount { name: "parallelism" }));
}

fn failing_first(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
) -> impl Fn(&[Value]) -> Result<f64> + Send + Sync + 'static {
    let counter = Arc::clone(calls);
    move |_: &[Value]| -> Result<f64> {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(Error::Evaluation("first job failed".into()));
        }
        std::thread::sleep(delay);
        Ok(0.0)
    }
}

#[tokio::test]
async fn a_failure_stops_the_parallel_phase() {
    let calls = Arc::new(AtomicUsize::new(0));
    let err = optimizer(10, 12)
        .minimize_parallel(1, Arc::new(failing_first(&calls, Duration::ZERO)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Evaluation(ref message) if message == "first job failed"));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "no point may start after the failure");
}

#[tokio::test]
async fn a_failure_aborts_before_the_remaining_points_start() {
    let calls = Arc::new(AtomicUsize::new(0));
    let err = optimizer(10, 12)
        .minimize_parallel(3, Arc::new(failing_first(&calls, Duration::from_millis(100))))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Evaluation(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 3, "only the first batch should have started");
}

#[tokio::test]
async fn async_search_hands_out_distinct_devices() {
    let params = ParamTree::new()
        .variable("x", Variable::real(0.0, 1.0))
        .dynamic("device", Arc::new(RoundRobin::new(4).unwrap()));
    let search = Search::builder("devices")
        .params(params)
        .function(|p: &JsonMap| {
            std::thread::sleep(Duration::from_millis(5));
            let x = p["x"].as_f64().unwrap_or_default();
            Ok(json!({"loss": x}).as_object().cloned().unwrap_or_default())
        })
        .n_initial_points(4)
        .n_calls(6)
        .parallelism(4)
        .seed(8)
        .build()
        .unwrap();

    let outcome = search.run_async().await.unwrap();
    assert_eq!(outcome.experiments.len(), 6);

    let mut devices: Vec<i64> = outcome.experiments[..4]
        .iter()
        .map(|e| e.params["device"].as_i64().unwrap())
        .collect();
    devices.sort_unstable();
    assert_eq!(devices, [0, 1, 2, 3]);

    let sampled: Vec<f64> = outcome.experiments.iter().map(|e| e.objective).collect();
    let min = sampled.iter().copied().fold(f64::INFINITY, f64::min);
    assert_eq!(outcome.best.objective, min);
}
