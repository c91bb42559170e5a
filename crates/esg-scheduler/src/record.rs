use std::collections::{HashMap, HashSet};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::worker::WorkerReport;

/// One company of the worklist
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyRecord {
    key: String,
    name: String,
}

impl CompanyRecord {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }

    /// Unique identifier, e.g. a ticker symbol
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Human readable name used as search query
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Scraped values, in the order the driver produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFields(Vec<(String, String)>);

impl ResultFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ResultFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Populated(ResultFields),
    /// The company was claimed and attempted, but nothing could be scraped
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub company: CompanyRecord,
    pub outcome: Outcome,
    pub worker: usize,
    pub scraped_at: NaiveDateTime,
}

impl ResultRecord {
    pub fn populated(company: CompanyRecord, fields: ResultFields, worker: usize) -> Self {
        Self {
            company,
            outcome: Outcome::Populated(fields),
            worker,
            scraped_at: Local::now().naive_local(),
        }
    }

    pub fn missing(company: CompanyRecord, worker: usize) -> Self {
        Self {
            company,
            outcome: Outcome::Missing,
            worker,
            scraped_at: Local::now().naive_local(),
        }
    }

    pub fn key(&self) -> &str {
        self.company.key()
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.outcome, Outcome::Missing)
    }

    pub fn fields(&self) -> Option<&ResultFields> {
        match &self.outcome {
            Outcome::Populated(fields) => Some(fields),
            Outcome::Missing => None,
        }
    }
}

/// Union of the records of every worker, with at most one record per company key.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResultSet {
    records: Vec<ResultRecord>,
    index: HashMap<String, usize>,
    reports: Vec<WorkerReport>,
}

impl AggregatedResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `record` unless its company is already present.
    ///
    /// A populated record replaces a missing one for the same key, which is
    /// how retry passes fill the gaps of earlier passes.
    pub fn insert(&mut self, record: ResultRecord) -> bool {
        match self.index.get(record.key()) {
            Some(&i) if self.records[i].is_missing() && !record.is_missing() => {
                self.records[i] = record;
                true
            }
            Some(_) => {
                log::debug!("Keeping existing record for {}", record.key());
                false
            }
            None => {
                self.index.insert(record.key().to_string(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = ResultRecord>>(&mut self, records: I) {
        for record in records {
            self.insert(record);
        }
    }

    /// Merges the records of a later pass into this one
    pub fn merge(&mut self, other: AggregatedResultSet) {
        self.extend(other.records);
        self.reports.extend(other.reports);
    }

    pub(crate) fn push_report(&mut self, report: WorkerReport) {
        self.reports.push(report);
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }

    pub fn reports(&self) -> &[WorkerReport] {
        &self.reports
    }

    pub fn get(&self, key: &str) -> Option<&ResultRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn populated(&self) -> usize {
        self.records.iter().filter(|r| !r.is_missing()).count()
    }

    pub fn missing(&self) -> usize {
        self.records.iter().filter(|r| r.is_missing()).count()
    }

    /// Companies of `worklist` that are recorded as missing or were never
    /// attempted, in worklist order and without duplicates.
    pub fn retry_worklist(&self, worklist: &[CompanyRecord]) -> Vec<CompanyRecord> {
        let mut seen = HashSet::new();
        worklist
            .iter()
            .filter(|c| self.get(c.key()).map_or(true, ResultRecord::is_missing))
            .filter(|c| seen.insert(c.key()))
            .cloned()
            .collect()
    }
}

impl FromIterator<ResultRecord> for AggregatedResultSet {
    fn from_iter<I: IntoIterator<Item = ResultRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
