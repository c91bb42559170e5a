mod config;
mod coordinator;
mod driver;
mod identity;
mod partition;
mod record;
mod registry;
mod worker;

pub use config::{HarvestConfig, OnError};
pub use coordinator::{Cancellation, CheckpointError, Coordinator};
pub use driver::{ScrapeError, SiteDriver, Sink};
pub use identity::{Identity, IdentityPool, PoolError};
pub use partition::{partition, Chunk};
pub use record::{AggregatedResultSet, CompanyRecord, Outcome, ResultFields, ResultRecord};
pub use registry::DedupRegistry;
pub use worker::{Worker, WorkerReport, WorkerStatus};

pub use anyhow;
