use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::coordinator::Cancellation;
use crate::driver::{ScrapeError, SiteDriver};
use crate::identity::{Identity, IdentityPool, PoolError};
use crate::partition::Chunk;
use crate::record::ResultRecord;
use crate::registry::DedupRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Completed,
    /// No session could be opened, the whole chunk is lost
    InitFailed(String),
    /// Stopped early on an unrecoverable error or a driver panic
    Aborted(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker: usize,
    pub identity: Option<Identity>,
    pub status: WorkerStatus,
    pub assigned: usize,
    pub produced: usize,
    pub skipped: usize,
    pub records: Vec<ResultRecord>,
}

impl WorkerReport {
    fn new(worker: usize, assigned: usize) -> Self {
        Self {
            worker,
            identity: None,
            status: WorkerStatus::Completed,
            assigned,
            produced: 0,
            skipped: 0,
            records: vec![],
        }
    }

    fn push(&mut self, record: ResultRecord) {
        self.records.push(record);
        self.produced += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initializing,
    Running,
    Degraded,
    Terminated,
}

/// Session released through the driver on every exit path.
struct Session<D: SiteDriver> {
    driver: Arc<D>,
    inner: D::Session,
}

impl<D: SiteDriver> Drop for Session<D> {
    fn drop(&mut self) {
        self.driver.close_session(&mut self.inner);
    }
}

/// Scrapes one chunk with one session.
///
/// The worker checks out its identity from `pool` once, while initializing.
/// Replacement identities after a block only come from `spares`.
pub struct Worker<D: SiteDriver> {
    id: usize,
    driver: Arc<D>,
    pool: Arc<IdentityPool>,
    spares: Arc<IdentityPool>,
    registry: Arc<DedupRegistry>,
    recycle_every: Option<NonZeroUsize>,
    cancel: Cancellation,
}

impl<D: SiteDriver> Worker<D> {
    pub fn new(
        id: usize,
        driver: Arc<D>,
        pool: Arc<IdentityPool>,
        registry: Arc<DedupRegistry>,
    ) -> Self {
        Self {
            id,
            driver,
            pool,
            spares: Arc::default(),
            registry,
            recycle_every: None,
            cancel: Cancellation::default(),
        }
    }

    pub fn recycle_every(mut self, every: Option<NonZeroUsize>) -> Self {
        self.recycle_every = every;
        self
    }

    pub fn spares(mut self, spares: Arc<IdentityPool>) -> Self {
        self.spares = spares;
        self
    }

    pub fn cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Processes `chunk` in order, never failing past this boundary.
    ///
    /// Every company this worker claims gets exactly one record.
    pub fn run(self, chunk: Chunk) -> WorkerReport {
        let mut report = WorkerReport::new(self.id, chunk.len());
        let mut state = State::Initializing;

        let (mut identity, mut session) = match self.initialize() {
            Ok(init) => init,
            Err(e) => {
                log::error!(
                    "Worker {} couldn't start, {} companies lost: {e:#}",
                    self.id,
                    chunk.len()
                );
                report.status = WorkerStatus::InitFailed(format!("{e:#}"));
                self.transition(&mut state, State::Terminated);
                return report;
            }
        };
        report.identity = Some(identity.clone());
        self.transition(&mut state, State::Running);

        let mut since_refresh = 0;
        for company in chunk.companies {
            if self.cancel.is_cancelled() {
                log::warn!("Worker {} cancelled", self.id);
                report.status = WorkerStatus::Cancelled;
                break;
            }

            if matches!(self.recycle_every, Some(every) if since_refresh >= every.get()) {
                log::info!("Worker {} refreshing its session", self.id);
                self.transition(&mut state, State::Degraded);
                (identity, session) = match self.recycle(session, identity, false) {
                    Ok(renewed) => renewed,
                    Err(e) => {
                        report.status = WorkerStatus::Aborted(format!("{e:#}"));
                        break;
                    }
                };
                self.transition(&mut state, State::Running);
                since_refresh = 0;
            }

            if !self.registry.claim(company.key()) {
                log::info!("Skipping already claimed company: {}", company.key());
                report.skipped += 1;
                continue;
            }
            since_refresh += 1;

            let scraped = panic::catch_unwind(AssertUnwindSafe(|| {
                self.driver.scrape(&company, &mut session.inner)
            }));
            let scraped = match scraped {
                Ok(scraped) => scraped,
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    log::error!(
                        "Worker {} aborted, driver panicked on {}: {msg}",
                        self.id,
                        company.key()
                    );
                    report.push(ResultRecord::missing(company, self.id));
                    report.status = WorkerStatus::Aborted(format!("driver panicked: {msg}"));
                    break;
                }
            };

            match scraped {
                Ok(fields) => {
                    log::info!("Scraped {}", company.key());
                    report.push(ResultRecord::populated(company, fields, self.id));
                }
                Err(e) => {
                    let key = company.key().to_string();
                    report.push(ResultRecord::missing(company, self.id));

                    match e.downcast_ref::<ScrapeError>() {
                        Some(scrape_err) if scrape_err.invalidates_session() => {
                            log::warn!("Worker {} lost its session on {key}: {scrape_err}", self.id);
                            self.transition(&mut state, State::Degraded);
                            (identity, session) = match self.recycle(session, identity, true) {
                                Ok(renewed) => renewed,
                                Err(e) => {
                                    report.status = WorkerStatus::Aborted(format!("{e:#}"));
                                    break;
                                }
                            };
                            report.identity = Some(identity.clone());
                            self.transition(&mut state, State::Running);
                            since_refresh = 0;
                        }
                        Some(scrape_err) => {
                            log::warn!("Recording {key} as missing: {scrape_err}");
                        }
                        None => {
                            log::error!("Worker {} aborted on {key}: {e:#}", self.id);
                            report.status = WorkerStatus::Aborted(format!("{e:#}"));
                            break;
                        }
                    }
                }
            }
        }

        self.transition(&mut state, State::Terminated);
        report
    }

    fn initialize(&self) -> anyhow::Result<(Identity, Session<D>)> {
        let identity = self.pool.checkout()?;
        log::info!("Worker {} using identity: {identity}", self.id);
        let session = self.open(&identity)?;
        Ok((identity, session))
    }

    fn open(&self, identity: &Identity) -> anyhow::Result<Session<D>> {
        let inner = self.driver.open_session(identity)?;
        Ok(Session {
            driver: self.driver.clone(),
            inner,
        })
    }

    /// Discards `session` and opens a new one, with a spare identity when
    /// `fresh` is set and one is left.
    fn recycle(
        &self,
        session: Session<D>,
        identity: Identity,
        fresh: bool,
    ) -> anyhow::Result<(Identity, Session<D>)> {
        drop(session);

        let identity = if fresh {
            match self.spares.checkout() {
                Ok(next) => {
                    log::info!("Worker {} switching to identity: {next}", self.id);
                    next
                }
                Err(PoolError::Exhausted) => identity,
            }
        } else {
            identity
        };

        match self.open(&identity) {
            Ok(session) => Ok((identity, session)),
            Err(e) => {
                log::error!("Worker {} couldn't reopen its session: {e:#}", self.id);
                Err(e)
            }
        }
    }

    fn transition(&self, state: &mut State, next: State) {
        log::debug!("Worker {} {state:?} -> {next:?}", self.id);
        *state = next;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic payload")
    }
}
