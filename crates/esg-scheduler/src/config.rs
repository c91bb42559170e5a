use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestConfig {
    /// Browser fingerprints (user agents), one per concurrent worker
    #[serde(default = "default_identities")]
    pub identities: Vec<String>,

    /// Recycle a worker's session after this many claimed companies
    #[serde(default = "default_recycle_every")]
    pub recycle_every: Option<NonZeroUsize>,

    /// Number of extra passes over missing companies
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Write the accumulated results each time a worker completes
    #[serde(default = "default_checkpoint")]
    pub checkpoint: bool,

    #[serde(default = "default_on_checkpoint_error")]
    pub on_checkpoint_error: OnError,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            identities: default_identities(),
            recycle_every: default_recycle_every(),
            retry_attempts: default_retry_attempts(),
            checkpoint: default_checkpoint(),
            on_checkpoint_error: default_on_checkpoint_error(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

fn default_identities() -> Vec<String> {
    vec![
        String::from(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
        ),
        String::from(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
        ),
    ]
}

fn default_recycle_every() -> Option<NonZeroUsize> {
    None
}

fn default_retry_attempts() -> usize {
    0
}

fn default_checkpoint() -> bool {
    true
}

fn default_on_checkpoint_error() -> OnError {
    OnError::SkipAndLog
}

fn default_handle_sigint() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}
