//! Fixed-size worker pool with one exclusive resource per unit
//!
//! Every unit owns one resource (a store connection) for the lifetime of the
//! pool. [`WorkerPool::execute`] splits a work list into one contiguous
//! partition per unit, runs all units concurrently and waits for every one
//! of them. Units append their output to a shared accumulator; the outcome
//! of each partition is reported separately so that one failing unit never
//! discards the work of the others.

mod partition;

pub use partition::{partition, partition_sizes};

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Worker count used when hardware parallelism cannot be detected
pub const FALLBACK_CONCURRENCY: usize = 2;

/// Pool construction errors. All of them are fatal for a run.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A unit's resource could not be acquired
    #[error("Failed to acquire resource for worker {unit}: {reason}")]
    Acquisition { unit: usize, reason: String },

    /// A pool needs at least one unit
    #[error("Worker pool needs at least one unit")]
    NoUnits,
}

/// Why one partition did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// The unit's function returned an error
    #[error("partition failed: {0}")]
    Failed(String),

    /// The unit panicked
    #[error("partition panicked: {0}")]
    Panicked(String),

    /// The unit's task was cancelled by the runtime
    #[error("partition cancelled: {0}")]
    Cancelled(String),
}

/// Hardware parallelism, at least [`FALLBACK_CONCURRENCY`]
pub fn detect_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().max(FALLBACK_CONCURRENCY))
        .unwrap_or(FALLBACK_CONCURRENCY)
}

/// Shared accumulator handed to every unit of one `execute` call
pub struct ResultSink<A> {
    inner: Arc<Mutex<Vec<A>>>,
}

impl<A> Clone for ResultSink<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> ResultSink<A> {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a unit's output under the accumulator lock.
    ///
    /// A lock poisoned by a panicking sibling is recovered; the entries it
    /// already appended stay valid.
    pub fn extend<I: IntoIterator<Item = A>>(&self, items: I) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.extend(items);
    }

    pub fn push(&self, item: A) {
        self.extend(std::iter::once(item));
    }

    fn take(&self) -> Vec<A> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

/// What a unit receives besides its shared args and partition
pub struct UnitContext<R, A> {
    /// Index of the unit (and of its partition)
    pub unit: usize,
    /// The unit's exclusive resource
    pub resource: OwnedMutexGuard<R>,
    /// Accumulator shared by all units of this call
    pub results: ResultSink<A>,
}

/// Outcome of one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub unit: usize,
    /// Number of input items in the partition
    pub items: usize,
    pub status: Result<(), PartitionError>,
}

impl PartitionOutcome {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Accumulated results plus per-partition outcomes of one `execute` call
#[derive(Debug)]
pub struct ExecutionReport<A> {
    results: Vec<A>,
    partitions: Vec<PartitionOutcome>,
}

impl<A> ExecutionReport<A> {
    /// Accumulated output; order across units is unspecified
    pub fn results(&self) -> &[A] {
        &self.results
    }

    pub fn into_results(self) -> Vec<A> {
        self.results
    }

    pub fn partitions(&self) -> &[PartitionOutcome] {
        &self.partitions
    }

    pub fn failures(&self) -> impl Iterator<Item = &PartitionOutcome> {
        self.partitions.iter().filter(|p| !p.is_ok())
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Number of input items whose partition failed
    pub fn failed_items(&self) -> usize {
        self.failures().map(|p| p.items).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Pool of concurrent units, each bound to one resource
pub struct WorkerPool<R> {
    units: Vec<Arc<AsyncMutex<R>>>,
}

impl<R> fmt::Debug for WorkerPool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.units.len())
            .finish()
    }
}

impl<R: Send + 'static> WorkerPool<R> {
    /// Eagerly acquire `concurrency` resources, one per unit.
    ///
    /// Stops at the first failure and drops everything acquired so far:
    /// a pool is either complete or not created.
    pub async fn connect<F, Fut, E>(concurrency: usize, mut factory: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        if concurrency == 0 {
            return Err(PoolError::NoUnits);
        }

        let mut resources = Vec::with_capacity(concurrency);
        for unit in 0..concurrency {
            match factory(unit).await {
                Ok(resource) => resources.push(resource),
                Err(e) => {
                    tracing::error!(unit, error = %e, "Worker resource acquisition failed");
                    return Err(PoolError::Acquisition {
                        unit,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(concurrency, "Worker pool ready");
        Self::from_resources(resources)
    }

    /// Build a pool from already acquired resources
    pub fn from_resources(resources: Vec<R>) -> Result<Self, PoolError> {
        if resources.is_empty() {
            return Err(PoolError::NoUnits);
        }
        Ok(Self {
            units: resources
                .into_iter()
                .map(|r| Arc::new(AsyncMutex::new(r)))
                .collect(),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.units.len()
    }

    /// Run `function` once per unit over contiguous partitions of `items`.
    ///
    /// Each unit gets its own clone of `shared`, its partition, its bound
    /// resource and the shared accumulator. Blocks until every unit has
    /// finished; failures and panics are captured per partition.
    pub async fn execute<S, T, A, F, Fut>(
        &self,
        function: F,
        shared: S,
        items: Vec<T>,
    ) -> ExecutionReport<A>
    where
        S: Clone + Send + 'static,
        T: Send + 'static,
        A: Send + 'static,
        F: Fn(S, Vec<T>, UnitContext<R, A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let sink = ResultSink::new();
        let function = Arc::new(function);
        let partitions = partition(items, self.units.len());

        let mut handles = Vec::with_capacity(self.units.len());
        for (unit, (slot, chunk)) in self.units.iter().zip(partitions).enumerate() {
            let function = Arc::clone(&function);
            let shared = shared.clone();
            let slot = Arc::clone(slot);
            let results = sink.clone();
            let len = chunk.len();

            tracing::debug!(unit, items = len, "Starting partition");
            let handle = tokio::spawn(async move {
                let resource = slot.lock_owned().await;
                let context = UnitContext {
                    unit,
                    resource,
                    results,
                };
                function(shared, chunk, context).await
            });
            handles.push((unit, len, handle));
        }

        // Barrier join: every unit is awaited regardless of sibling outcomes
        let mut outcomes = Vec::with_capacity(handles.len());
        for (unit, items, handle) in handles {
            let status = match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(PartitionError::Failed(format!("{:#}", e))),
                Err(e) if e.is_panic() => {
                    Err(PartitionError::Panicked(panic_message(e.into_panic())))
                }
                Err(e) => Err(PartitionError::Cancelled(e.to_string())),
            };

            match &status {
                Ok(()) => tracing::debug!(unit, items, "Partition complete"),
                Err(e) => tracing::error!(unit, items, error = %e, "Partition did not complete"),
            }
            outcomes.push(PartitionOutcome {
                unit,
                items,
                status,
            });
        }

        ExecutionReport {
            results: sink.take(),
            partitions: outcomes,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn pool_of(n: usize) -> WorkerPool<usize> {
        WorkerPool::connect(n, |unit| async move { Ok::<_, String>(unit) })
            .await
            .unwrap()
    }

    #[test]
    fn test_detect_concurrency_minimum() {
        assert!(detect_concurrency() >= FALLBACK_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_connect_creates_all_units() {
        let pool = pool_of(4).await;
        assert_eq!(pool.concurrency(), 4);
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let result = WorkerPool::connect(4, move |unit| {
            let counter = Arc::clone(&counter);
            async move {
                if unit == 2 {
                    Err("connection refused".to_string())
                } else {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(unit)
                }
            }
        })
        .await;

        match result {
            Err(PoolError::Acquisition { unit, reason }) => {
                assert_eq!(unit, 2);
                assert!(reason.contains("refused"));
            }
            other => panic!("Expected acquisition failure, got {:?}", other),
        }
        // Units after the failing one are never attempted
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_units_rejected() {
        let result = WorkerPool::connect(0, |unit| async move { Ok::<_, String>(unit) }).await;
        assert!(matches!(result, Err(PoolError::NoUnits)));
    }

    #[tokio::test]
    async fn test_execute_processes_every_item_once() {
        let pool = pool_of(3).await;
        let items: Vec<u32> = (0..100).collect();

        let report = pool
            .execute(
                |offset: u32, chunk: Vec<u32>, ctx: UnitContext<usize, u32>| async move {
                    ctx.results.extend(chunk.into_iter().map(|i| i + offset));
                    Ok::<_, anyhow::Error>(())
                },
                1000u32,
                items,
            )
            .await;

        assert!(report.is_complete());
        let mut results = report.into_results();
        results.sort_unstable();
        assert_eq!(results, (1000..1100).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_units_use_their_bound_resource() {
        let pool = pool_of(4).await;

        for _ in 0..3 {
            let report = pool
                .execute(
                    |(), _chunk: Vec<u8>, ctx: UnitContext<usize, (usize, usize)>| async move {
                        ctx.results.push((ctx.unit, *ctx.resource));
                        Ok::<_, anyhow::Error>(())
                    },
                    (),
                    vec![0u8; 8],
                )
                .await;
            for (unit, resource) in report.results() {
                assert_eq!(unit, resource);
            }
            assert_eq!(report.results().len(), 4);
        }
    }

    #[tokio::test]
    async fn test_partitions_are_contiguous_in_unit_order() {
        let pool = pool_of(3).await;
        let report = pool
            .execute(
                |(), chunk: Vec<usize>, ctx: UnitContext<usize, (usize, Vec<usize>)>| async move {
                    ctx.results.push((ctx.unit, chunk));
                    Ok::<_, anyhow::Error>(())
                },
                (),
                (0..7).collect(),
            )
            .await;

        let mut slices = report.into_results();
        slices.sort_by_key(|(unit, _)| *unit);
        let slices: Vec<Vec<usize>> = slices.into_iter().map(|(_, s)| s).collect();
        assert_eq!(slices, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
    }

    #[tokio::test]
    async fn test_shared_args_are_copied_per_unit() {
        let pool = pool_of(4).await;
        let report = pool
            .execute(
                |mut shared: Vec<usize>, _chunk: Vec<()>, ctx: UnitContext<usize, usize>| async move {
                    shared.push(ctx.unit);
                    tokio::task::yield_now().await;
                    ctx.results.push(shared.len());
                    Ok::<_, anyhow::Error>(())
                },
                vec![7, 8, 9],
                vec![(); 4],
            )
            .await;

        assert_eq!(report.results(), &[4, 4, 4, 4]);
    }

    #[tokio::test]
    async fn test_accumulator_reset_between_calls() {
        let pool = pool_of(2).await;
        let run = |n: usize| {
            pool.execute(
                |(), chunk: Vec<usize>, ctx: UnitContext<usize, usize>| async move {
                    ctx.results.extend(chunk);
                    Ok::<_, anyhow::Error>(())
                },
                (),
                (0..n).collect(),
            )
        };

        assert_eq!(run(10).await.results().len(), 10);
        assert_eq!(run(3).await.results().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accumulation_loses_nothing() {
        let pool = pool_of(8).await;
        // Unit i appends (i + 1) * 50 entries, one lock acquisition each
        let report = pool
            .execute(
                |(), _chunk: Vec<()>, ctx: UnitContext<usize, usize>| async move {
                    for k in 0..(ctx.unit + 1) * 50 {
                        ctx.results.push(k);
                        if k % 7 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                    Ok::<_, anyhow::Error>(())
                },
                (),
                vec![(); 8],
            )
            .await;

        let expected: usize = (1..=8).map(|i| i * 50).sum();
        assert_eq!(report.results().len(), expected);
    }

    #[tokio::test]
    async fn test_failed_partitions_are_isolated() {
        let pool = pool_of(4).await;
        let report = pool
            .execute(
                |(), chunk: Vec<usize>, ctx: UnitContext<usize, usize>| async move {
                    match ctx.unit {
                        1 => anyhow::bail!("query timed out"),
                        2 => panic!("decoder exploded"),
                        _ => {
                            ctx.results.extend(chunk);
                            Ok::<_, anyhow::Error>(())
                        }
                    }
                },
                (),
                (0..8).collect(),
            )
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.failed_items(), 4);

        let mut results = report.results().to_vec();
        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 6, 7]);

        let outcomes = report.partitions();
        assert!(outcomes[0].is_ok());
        assert_eq!(
            outcomes[1].status,
            Err(PartitionError::Failed("query timed out".to_string()))
        );
        assert_eq!(
            outcomes[2].status,
            Err(PartitionError::Panicked("decoder exploded".to_string()))
        );
        assert!(outcomes[3].is_ok());
    }

    #[tokio::test]
    async fn test_panic_while_holding_accumulator_keeps_sibling_results() {
        let pool = pool_of(2).await;
        let report = pool
            .execute(
                |(), chunk: Vec<usize>, ctx: UnitContext<usize, usize>| async move {
                    if ctx.unit == 0 {
                        let sink = ctx.results.inner.clone();
                        let _guard = sink.lock().unwrap();
                        panic!("poisoned");
                    }
                    // Give unit 0 time to poison the lock first
                    tokio::task::yield_now().await;
                    ctx.results.extend(chunk);
                    Ok::<_, anyhow::Error>(())
                },
                (),
                vec![1, 2, 3, 4],
            )
            .await;

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.results(), &[3, 4]);
    }

    #[tokio::test]
    async fn test_empty_input_still_runs_every_unit() {
        let pool = pool_of(3).await;
        let report = pool
            .execute(
                |(), chunk: Vec<u8>, ctx: UnitContext<usize, usize>| async move {
                    ctx.results.push(chunk.len());
                    Ok::<_, anyhow::Error>(())
                },
                (),
                Vec::new(),
            )
            .await;
        assert_eq!(report.results(), &[0, 0, 0]);
        assert_eq!(report.partitions().len(), 3);
    }
}
