use crate::identity::Identity;
use crate::record::{CompanyRecord, ResultFields, ResultRecord};

/// Per-provider scraping logic.
///
/// A driver is shared by every worker of a pass, each worker owning the
/// sessions it opens.
pub trait SiteDriver: Send + Sync + 'static {
    type Session;

    fn open_session(&self, identity: &Identity) -> anyhow::Result<Self::Session>;

    /// Scrape one company.
    ///
    /// Failures the worker should recover from must be reported as a
    /// [`ScrapeError`], any other error aborts the worker.
    fn scrape(
        &self,
        company: &CompanyRecord,
        session: &mut Self::Session,
    ) -> anyhow::Result<ResultFields>;

    /// Called once for every session that was opened, including when the
    /// worker unwinds.
    fn close_session(&self, _session: &mut Self::Session) {}
}

/// Failure to scrape a single company.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScrapeError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected page content: {0}")]
    Parse(String),
    #[error("blocked by site (HTTP {0})")]
    Blocked(u16),
    #[error("session lost: {0}")]
    SessionLost(String),
}

impl ScrapeError {
    /// Whether the session that produced this error must be discarded
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::Blocked(_) | Self::SessionLost(_))
    }
}

/// Durable destination of a result set. Every write replaces the previous one.
pub trait Sink {
    fn write(&mut self, records: &[ResultRecord]) -> anyhow::Result<()>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write(&mut self, records: &[ResultRecord]) -> anyhow::Result<()> {
        (**self).write(records)
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, records: &[ResultRecord]) -> anyhow::Result<()> {
        (**self).write(records)
    }
}
