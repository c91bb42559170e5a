use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{cmp, thread};

use crate::config::{HarvestConfig, OnError};
use crate::driver::{SiteDriver, Sink};
use crate::identity::IdentityPool;
use crate::partition;
use crate::record::{AggregatedResultSet, CompanyRecord};
use crate::registry::DedupRegistry;
use crate::worker::{Worker, WorkerReport, WorkerStatus};

/// Cooperative stop signal, checked by workers between companies.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A checkpoint write failed under [`OnError::Fail`].
///
/// Carries what the pass collected, so callers can still save it elsewhere.
#[derive(Debug, thiserror::Error)]
#[error("Checkpoint failed: {cause:#}")]
pub struct CheckpointError {
    cause: anyhow::Error,
    results: AggregatedResultSet,
}

impl CheckpointError {
    pub fn results(&self) -> &AggregatedResultSet {
        &self.results
    }

    pub fn into_results(self) -> AggregatedResultSet {
        self.results
    }
}

/// Runs scrape passes over a worklist and persists what they collect.
pub struct Coordinator<D: SiteDriver, S: Sink> {
    config: HarvestConfig,
    driver: Arc<D>,
    sink: S,
    cancel: Cancellation,
}

impl<D, S> Coordinator<D, S>
where
    D: SiteDriver,
    S: Sink,
{
    pub fn new(config: HarvestConfig, driver: D, sink: S) -> Self {
        Self {
            config,
            driver: Arc::new(driver),
            sink,
            cancel: Cancellation::default(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// A fresh pool holding every configured identity
    pub fn identity_pool(&self) -> IdentityPool {
        IdentityPool::new(self.config.identities.iter().cloned())
    }

    /// Scrapes `worklist` without persisting the final result set.
    ///
    /// Checkpoints may still be written when enabled.
    pub fn collect(
        &mut self,
        worklist: Vec<CompanyRecord>,
        pool: IdentityPool,
    ) -> anyhow::Result<AggregatedResultSet> {
        self.pass(worklist, pool, DedupRegistry::new(), &AggregatedResultSet::new())
    }

    /// Scrapes `worklist` and persists the result set once every worker is done.
    pub fn run(
        &mut self,
        worklist: Vec<CompanyRecord>,
        pool: IdentityPool,
    ) -> anyhow::Result<AggregatedResultSet> {
        let results = self.collect(worklist, pool)?;
        self.persist(&results)?;
        Ok(results)
    }

    /// Scrapes only `missing` and merges the outcome into `previous`.
    ///
    /// Companies already populated in `previous` count as claimed.
    pub fn run_missing(
        &mut self,
        previous: AggregatedResultSet,
        missing: Vec<CompanyRecord>,
    ) -> anyhow::Result<AggregatedResultSet> {
        log::info!("Processing {} missing companies", missing.len());
        let pool = self.identity_pool();
        let registry = DedupRegistry::new();
        for record in previous.records().iter().filter(|r| !r.is_missing()) {
            registry.claim(record.key());
        }
        let retried = self.pass(missing, pool, registry, &previous)?;

        let mut merged = previous;
        merged.merge(retried);
        self.persist(&merged)?;
        Ok(merged)
    }

    /// A first pass over `worklist` followed by the configured retry passes.
    pub fn harvest(&mut self, worklist: Vec<CompanyRecord>) -> anyhow::Result<AggregatedResultSet> {
        let pool = self.identity_pool();
        let mut results = self.run(worklist.clone(), pool)?;

        for attempt in 1..=self.config.retry_attempts {
            if self.cancel.is_cancelled() {
                break;
            }
            let missing = results.retry_worklist(&worklist);
            if missing.is_empty() {
                break;
            }
            log::info!("Retry {attempt}: {} companies without data", missing.len());
            results = self.run_missing(results, missing)?;
        }

        log::info!(
            "Harvested {} of {} companies: {} populated, {} missing",
            results.len(),
            worklist.len(),
            results.populated(),
            results.missing()
        );
        Ok(results)
    }

    fn pass(
        &mut self,
        worklist: Vec<CompanyRecord>,
        pool: IdentityPool,
        registry: DedupRegistry,
        previous: &AggregatedResultSet,
    ) -> anyhow::Result<AggregatedResultSet> {
        let num_chunks = cmp::min(worklist.len(), pool.size());
        if num_chunks == 0 {
            log::warn!(
                "No work: {} companies for {} identities",
                worklist.len(),
                pool.size()
            );
            return Ok(AggregatedResultSet::new());
        }
        log::info!(
            "Scraping {} companies with {num_chunks} workers",
            worklist.len()
        );

        let chunks = partition::chunks(worklist, num_chunks);
        // One identity per worker, the rest only replaces blocked ones
        let spares = Arc::new(pool.split_off(num_chunks));
        let pool = Arc::new(pool);
        let registry = Arc::new(registry);
        let (tx_report, rx_report) = crossbeam_channel::unbounded::<WorkerReport>();

        // Workers

        let mut workers = vec![];
        for chunk in chunks {
            let id = chunk.index;
            let assigned = chunk.len();
            let worker = Worker::new(id, self.driver.clone(), pool.clone(), registry.clone())
                .spares(spares.clone())
                .recycle_every(self.config.recycle_every)
                .cancellation(self.cancel.clone());
            let tx_report = tx_report.clone();
            let spawned = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || {
                    tx_report.send(worker.run(chunk)).ok();
                });
            match spawned {
                Ok(handle) => workers.push((id, handle)),
                Err(e) => log::error!("Couldn't spawn worker {id}, {assigned} companies lost: {e}"),
            }
        }
        drop(tx_report);

        // Aggregation, in completion order

        let mut results = AggregatedResultSet::new();
        let mut checkpoint_err = None;
        for mut report in rx_report {
            log_report(&report);
            results.extend(std::mem::take(&mut report.records));
            results.push_report(report);

            if self.config.checkpoint && checkpoint_err.is_none() {
                if let Err(e) = self.checkpoint(previous, &results) {
                    match self.config.on_checkpoint_error {
                        OnError::SkipAndLog => log::warn!("Skipping checkpoint: {e:#}"),
                        OnError::Fail => checkpoint_err = Some(e),
                    }
                }
            }
        }

        for (id, handle) in workers {
            if handle.join().is_err() {
                log::error!("Worker {id} panicked, its records are lost");
            }
        }

        match checkpoint_err {
            Some(cause) => Err(CheckpointError { cause, results }.into()),
            None => Ok(results),
        }
    }

    fn checkpoint(
        &mut self,
        previous: &AggregatedResultSet,
        results: &AggregatedResultSet,
    ) -> anyhow::Result<()> {
        if previous.is_empty() {
            return self.sink.write(results.records());
        }
        let mut merged = previous.clone();
        merged.extend(results.records().iter().cloned());
        self.sink.write(merged.records())
    }

    fn persist(&mut self, results: &AggregatedResultSet) -> anyhow::Result<()> {
        if results.is_empty() {
            log::warn!("No results to save");
            return Ok(());
        }
        self.sink.write(results.records())?;
        log::info!("Saved {} results", results.len());
        Ok(())
    }
}

fn log_report(report: &WorkerReport) {
    match &report.status {
        WorkerStatus::Completed => log::info!(
            "Worker {} done: {} records, {} skipped",
            report.worker,
            report.produced,
            report.skipped
        ),
        WorkerStatus::Cancelled => log::warn!(
            "Worker {} cancelled after {} of {} companies",
            report.worker,
            report.produced + report.skipped,
            report.assigned
        ),
        WorkerStatus::InitFailed(e) | WorkerStatus::Aborted(e) => log::warn!(
            "Worker {} failed after {} of {} companies: {e}",
            report.worker,
            report.produced + report.skipped,
            report.assigned
        ),
    }
}
