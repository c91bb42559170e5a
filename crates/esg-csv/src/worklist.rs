use std::path::PathBuf;

use anyhow::anyhow;
use esg_scheduler::CompanyRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklistConfig {
    pub path: PathBuf,

    /// Column holding the unique company key
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Column holding the name typed into the provider's search
    #[serde(default = "default_query_column")]
    pub query_column: String,

    /// Only read the first companies of the file
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl WorklistConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key_column: default_key_column(),
            query_column: default_query_column(),
            limit: None,
            delimiter: default_delimiter(),
        }
    }
}

fn default_key_column() -> String {
    String::from("Symbol")
}

fn default_query_column() -> String {
    String::from("Longname")
}

fn default_delimiter() -> char {
    ','
}

pub fn load_worklist(config: &WorklistConfig) -> anyhow::Result<Vec<CompanyRecord>> {
    log::info!("Reading worklist from {}", config.path.display());
    let file = fs_err::File::open(&config.path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            anyhow!(
                "Column {name:?} not found in {}, available: {}",
                config.path.display(),
                headers.iter().collect::<Vec<_>>().join(",")
            )
        })
    };
    let key_col = column(&config.key_column)?;
    let query_col = column(&config.query_column)?;

    let mut companies = vec![];
    for (i, row) in rdr.records().enumerate() {
        if config.limit.map_or(false, |limit| companies.len() >= limit) {
            break;
        }
        let row = row?;
        let key = row.get(key_col).unwrap_or_default();
        if key.is_empty() {
            log::warn!("Skipping row {} of {}: empty key", i + 2, config.path.display());
            continue;
        }
        let name = row.get(query_col).unwrap_or_default();
        companies.push(CompanyRecord::new(key, name));
    }

    log::info!("Loaded {} companies", companies.len());
    Ok(companies)
}
