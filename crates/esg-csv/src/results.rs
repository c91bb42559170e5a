use std::path::Path;

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDateTime;
use esg_scheduler::{AggregatedResultSet, CompanyRecord, Outcome, ResultFields, ResultRecord};

use crate::writer::{CsvWriterConfig, FIXED_COLUMNS};

pub const MISSING_VALUE: &str = "N/A";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) const STATUS_POPULATED: &str = "populated";
pub(crate) const STATUS_MISSING: &str = "missing";

/// Reads back a file written by [`CsvSink`](crate::CsvSink).
pub fn read_results(
    path: impl AsRef<Path>,
    config: &CsvWriterConfig,
) -> anyhow::Result<AggregatedResultSet> {
    let path = path.as_ref();
    let file = fs_err::File::open(path)?;
    let mut rdr = config.reader_builder().from_reader(file);

    let headers = rdr.headers()?.clone();
    let fixed = FIXED_COLUMNS.len();
    if headers.len() < fixed || headers.iter().take(fixed).ne(FIXED_COLUMNS) {
        bail!(
            "Unexpected header in {}, expected columns: {}",
            path.display(),
            FIXED_COLUMNS.join(",")
        );
    }

    let mut results = AggregatedResultSet::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        let line = i + 2;
        let field = |col: usize| {
            row.get(col)
                .ok_or_else(|| anyhow!("{}:{line}: missing column {col}", path.display()))
        };

        let company = CompanyRecord::new(field(0)?, field(1)?);
        let worker = field(3)?
            .parse::<usize>()
            .with_context(|| format!("{}:{line}: invalid worker id", path.display()))?;
        let scraped_at = NaiveDateTime::parse_from_str(field(4)?, TIMESTAMP_FORMAT)
            .with_context(|| format!("{}:{line}: invalid timestamp", path.display()))?;

        let outcome = match field(2)? {
            STATUS_MISSING => Outcome::Missing,
            STATUS_POPULATED => Outcome::Populated(
                headers
                    .iter()
                    .zip(row.iter())
                    .skip(fixed)
                    .filter(|(_, value)| !value.is_empty())
                    .collect::<ResultFields>(),
            ),
            other => bail!("{}:{line}: unknown status {other:?}", path.display()),
        };

        results.insert(ResultRecord {
            company,
            outcome,
            worker,
            scraped_at,
        });
    }

    log::info!("Read {} previous results from {}", results.len(), path.display());
    Ok(results)
}
