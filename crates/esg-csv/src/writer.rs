use std::path::{Path, PathBuf};

use esg_scheduler::{Outcome, ResultRecord, Sink};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::results::{MISSING_VALUE, STATUS_MISSING, STATUS_POPULATED, TIMESTAMP_FORMAT};

/// Leading columns of every output file, before the scraped fields
pub const FIXED_COLUMNS: [&str; 5] = ["key", "name", "status", "worker", "scraped_at"];

/// CSV dialect shared by the result writer and reader
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvWriterConfig {
    #[serde(default = "default_csv_delimiter")]
    pub delimiter: char,
    /// Escape quotes with this character instead of doubling them
    #[serde(default)]
    pub escape: Option<char>,
    /// Allow rows of different lengths
    #[serde(default)]
    pub flexible: bool,
    #[serde(default)]
    pub terminator: CsvTerminator,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: default_csv_delimiter(),
            escape: None,
            flexible: false,
            terminator: CsvTerminator::default(),
        }
    }
}

fn default_csv_delimiter() -> char {
    ','
}

/// Record terminator, `crlf` or a single character (`char: "\n"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CsvTerminator {
    Crlf,
    Char(char),
}

impl Default for CsvTerminator {
    fn default() -> Self {
        Self::Char('\n')
    }
}

impl CsvTerminator {
    fn to_csv(self) -> csv::Terminator {
        match self {
            Self::Crlf => csv::Terminator::CRLF,
            Self::Char(c) => csv::Terminator::Any(c as u8),
        }
    }
}

impl CsvWriterConfig {
    pub fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.delimiter as u8)
            .terminator(self.terminator.to_csv())
            .flexible(self.flexible)
            .double_quote(self.escape.is_none());
        if let Some(escape) = self.escape {
            builder.escape(escape as u8);
        }
        builder
    }

    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter as u8)
            .terminator(self.terminator.to_csv())
            .flexible(self.flexible)
            .double_quote(self.escape.is_none())
            .escape(self.escape.map(|c| c as u8));
        builder
    }
}

/// Writes result sets to one CSV file, replacing it on every write.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    config: CsvWriterConfig,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, config: CsvWriterConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for CsvSink {
    fn write(&mut self, records: &[ResultRecord]) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;

        let fields = field_names(records);
        {
            let mut wtr = self.config.writer_builder().from_writer(tmp.as_file_mut());
            wtr.write_record(FIXED_COLUMNS.iter().copied().chain(fields.iter().map(String::as_str)))?;
            for record in records {
                wtr.write_record(row(record, &fields))?;
            }
            wtr.flush()?;
        }

        tmp.persist(&self.path)?;
        log::debug!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Union of the field names of `records`, in first-seen order
fn field_names(records: &[ResultRecord]) -> Vec<String> {
    let mut names: Vec<String> = vec![];
    for fields in records.iter().filter_map(ResultRecord::fields) {
        for name in fields.names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn row(record: &ResultRecord, fields: &[String]) -> Vec<String> {
    let status = match record.outcome {
        Outcome::Populated(_) => STATUS_POPULATED,
        Outcome::Missing => STATUS_MISSING,
    };
    let mut row = vec![
        record.company.key().to_string(),
        record.company.name().to_string(),
        status.to_string(),
        record.worker.to_string(),
        record.scraped_at.format(TIMESTAMP_FORMAT).to_string(),
    ];
    // Missing records are all placeholders, absent fields of populated ones stay empty
    row.extend(fields.iter().map(|name| match record.fields() {
        Some(f) => f.get(name).unwrap_or_default().to_string(),
        None => MISSING_VALUE.to_string(),
    }));
    row
}
