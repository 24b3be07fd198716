use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::error::{Error, Result};
use crate::objective::Objective;
use crate::rng_util;

use super::{BayesianOptimizer, Observation, evaluate_point, record};

/// A finished phase-1 task: sample index, outcome and the permit it held.
type Settled = (usize, Result<Observation>, OwnedSemaphorePermit);

/// Stores a joined phase-1 result in its sampling slot and frees its permit.
fn settle(
    joined: Option<core::result::Result<Settled, JoinError>>,
    slots: &mut [Option<Observation>],
) -> Result<()> {
    let (index, result, permit) = joined
        .ok_or_else(|| Error::TaskError("no evaluation task in flight".into()))?
        .map_err(|e| Error::TaskError(e.to_string()))?;
    drop(permit);
    slots[index] = Some(result?);
    Ok(())
}

impl BayesianOptimizer {
    /// Like [`minimize`](Self::minimize), but evaluates the random-sampling
    /// phase on up to `parallelism` blocking tasks at once.
    ///
    /// Phase-1 observations are recorded in sampling order regardless of
    /// completion order, so a seeded run gives the same observations as
    /// [`minimize`](Self::minimize). Phase 2 stays sequential; each of its
    /// evaluations runs on [`spawn_blocking`](tokio::task::spawn_blocking).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCount`] if `parallelism` is zero and
    /// [`Error::TaskError`] if a blocking task panics. The first phase-1
    /// failure to complete is returned at once: no further points are
    /// started and the tasks still in flight are aborted.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use hypered::{BayesianOptimizer, Space, Variable};
    /// use serde_json::Value;
    ///
    /// # #[cfg(feature = "async")]
    /// # async fn example() -> hypered::Result<()> {
    /// let space = Space::new(vec![Variable::real(-1.0, 1.0)])?;
    /// let optimizer = BayesianOptimizer::builder(space)
    ///     .n_initial_points(8)
    ///     .n_calls(10)
    ///     .seed(3)
    ///     .build()?;
    ///
    /// let objective = Arc::new(|values: &[Value]| -> hypered::Result<f64> {
    ///     Ok(values[0].as_f64().unwrap_or_default().abs())
    /// });
    /// let observations = optimizer.minimize_parallel(4, objective).await?;
    /// assert_eq!(observations.len(), 10);
    /// # Ok(())
    /// # }
    /// ```
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "minimize_parallel",
            skip_all,
            fields(n_calls = self.n_calls, n_initial_points = self.n_initial_points, parallelism = parallelism)
        )
    )]
    pub async fn minimize_parallel<O>(
        &self,
        parallelism: usize,
        objective: Arc<O>,
    ) -> Result<Vec<Observation>>
    where
        O: Objective + Send + Sync + ?Sized + 'static,
    {
        if parallelism == 0 {
            return Err(Error::InvalidCount {
                name: "parallelism",
            });
        }
        trace_info!(n = self.n_initial_points, "parallel random sampling phase");

        let mut rng = rng_util::from_seed(self.seed);
        let space = Arc::new(self.space.clone());
        let initial = space.sample(self.n_initial_points, &mut rng);

        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut join_set: JoinSet<Settled> = JoinSet::new();
        let mut slots: Vec<Option<Observation>> =
            (0..self.n_initial_points).map(|_| None).collect();
        for (index, x) in initial.into_iter().enumerate() {
            // Permits are released only once a task is joined, so a full
            // semaphore means every running task is still in the set.
            let permit = loop {
                if let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() {
                    break permit;
                }
                if let Err(e) = settle(join_set.join_next().await, &mut slots) {
                    join_set.abort_all();
                    return Err(e);
                }
            };
            let space = Arc::clone(&space);
            let objective = Arc::clone(&objective);
            join_set.spawn(async move {
                let result =
                    tokio::task::spawn_blocking(move || evaluate_point(&space, objective.as_ref(), x))
                        .await
                        .map_err(|e| Error::TaskError(e.to_string()))
                        .and_then(|evaluated| evaluated);
                (index, result, permit)
            });
        }
        while !join_set.is_empty() {
            if let Err(e) = settle(join_set.join_next().await, &mut slots) {
                join_set.abort_all();
                return Err(e);
            }
        }

        let mut observations = Vec::with_capacity(self.n_calls);
        for slot in slots {
            let observation =
                slot.ok_or_else(|| Error::TaskError("evaluation task was lost".into()))?;
            record(&mut observations, observation);
        }

        let mut model = self.model();
        for _ in self.n_initial_points..self.n_calls {
            let x = self.next_point(&mut model, &observations, &mut rng)?;
            let space = Arc::clone(&space);
            let objective = Arc::clone(&objective);
            let observation =
                tokio::task::spawn_blocking(move || evaluate_point(&space, objective.as_ref(), x))
                    .await
                    .map_err(|e| Error::TaskError(e.to_string()))??;
            record(&mut observations, observation);
        }

        Ok(observations)
    }
}
