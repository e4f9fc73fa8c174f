// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded, per-instance concurrent fetches with independent deadlines.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::catalog::Mode;
use crate::config::Instance;
use crate::errors::CollectError;
use crate::sample::Sample;
use crate::stats::ExporterStats;

/// Outcome of one instance's fetch for one mode, for one collection round.
#[derive(Debug)]
pub struct FetchResult<T> {
    pub instance: Arc<Instance>,
    pub mode: Mode,
    pub outcome: Result<T, CollectError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    /// Worker pool size, independent of the instance count
    pub concurrency: usize,
    /// Deadline of a single instance's fetch, counted once it holds a worker
    pub timeout: Duration,
}

impl FanOut {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Runs `fetch` once per instance and waits for every task to finish or time out. A failed
    /// or timed out task never cancels its siblings. Results keep the order of `instances`.
    pub async fn run<T, F, Fut>(
        &self,
        mode: Mode,
        instances: &[Arc<Instance>],
        fetch: F,
    ) -> Vec<FetchResult<T>>
    where
        F: Fn(Arc<Instance>) -> Fut,
        Fut: Future<Output = Result<T, CollectError>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, instance) in instances.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;
            let fut = fetch(Arc::clone(instance));
            let instance = Arc::clone(instance);

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = match tokio::time::timeout(timeout, fut).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(CollectError::FetchTimeout {
                        instance: instance.instance.clone(),
                        timeout,
                    }),
                };
                (
                    index,
                    FetchResult {
                        instance,
                        mode,
                        outcome,
                    },
                )
            });
        }

        let mut results = Vec::with_capacity(instances.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("{mode} fetch task failed: {e}"),
            }
        }
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

/// Flattens one round into samples. Failed instances contribute nothing; their error is logged
/// and counted.
pub fn settle(results: Vec<FetchResult<Vec<Sample>>>, stats: &ExporterStats) -> Vec<Sample> {
    let mut samples = Vec::new();
    for result in results {
        match result.outcome {
            Ok(instance_samples) => {
                debug!(
                    "Collected {} {} samples for instance {}",
                    instance_samples.len(),
                    result.mode,
                    result.instance
                );
                samples.extend(instance_samples);
            }
            Err(e) => {
                stats.record_fetch_failure(result.mode, &e);
                match e {
                    CollectError::ParseError { .. } => error!("{e}"),
                    _ => warn!(
                        "Failed to collect {} metrics for instance {}: {e}",
                        result.mode, result.instance
                    ),
                }
            }
        }
    }
    samples
}
