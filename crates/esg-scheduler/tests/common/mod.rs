#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use esg_scheduler::anyhow::{anyhow, bail};
use esg_scheduler::{
    CompanyRecord, Identity, ResultFields, ResultRecord, ScrapeError, SiteDriver, Sink,
};

pub fn companies(keys: &[&str]) -> Vec<CompanyRecord> {
    keys.iter()
        .map(|k| CompanyRecord::new(*k, format!("{k} Corp")))
        .collect()
}

#[derive(Debug, Clone)]
pub enum Failure {
    Scrape(ScrapeError),
    Fatal,
    Panic,
    /// Times out on the first n attempts
    Flaky(usize),
}

#[derive(Debug, Default)]
pub struct Stats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    scraped_with: Mutex<Vec<(String, String)>>,
}

impl Stats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.attempts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Identity of the session used for each scrape of `key`
    pub fn identities_for(&self, key: &str) -> Vec<String> {
        self.scraped_with
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct FakeDriver {
    failures: HashMap<String, Failure>,
    broken_identities: HashSet<String>,
    pub stats: Arc<Stats>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, key: &str, failure: Failure) -> Self {
        self.failures.insert(key.to_string(), failure);
        self
    }

    pub fn broken_identity(mut self, identity: &str) -> Self {
        self.broken_identities.insert(identity.to_string());
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }
}

impl SiteDriver for FakeDriver {
    type Session = Identity;

    fn open_session(&self, identity: &Identity) -> esg_scheduler::anyhow::Result<Identity> {
        if self.broken_identities.contains(identity.as_str()) {
            bail!("browser failed to start with {identity}");
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(identity.clone())
    }

    fn scrape(
        &self,
        company: &CompanyRecord,
        session: &mut Identity,
    ) -> esg_scheduler::anyhow::Result<ResultFields> {
        let key = company.key().to_string();
        let attempt = {
            let mut attempts = self.stats.attempts.lock().unwrap();
            let n = attempts.entry(key.clone()).or_default();
            *n += 1;
            *n
        };
        self.stats
            .scraped_with
            .lock()
            .unwrap()
            .push((key.clone(), session.to_string()));

        match self.failures.get(&key) {
            Some(Failure::Scrape(e)) => Err(e.clone().into()),
            Some(Failure::Fatal) => Err(anyhow!("unexpected driver state")),
            Some(Failure::Panic) => panic!("driver panicked on {key}"),
            Some(Failure::Flaky(n)) if attempt <= *n => {
                Err(ScrapeError::Timeout(format!("search results for {key}")).into())
            }
            _ => Ok([("score", format!("{key}-score"))].into_iter().collect()),
        }
    }

    fn close_session(&self, _session: &mut Identity) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub writes: Vec<Vec<ResultRecord>>,
}

impl MemorySink {
    pub fn last(&self) -> Option<&[ResultRecord]> {
        self.writes.last().map(Vec::as_slice)
    }
}

impl Sink for MemorySink {
    fn write(&mut self, records: &[ResultRecord]) -> esg_scheduler::anyhow::Result<()> {
        self.writes.push(records.to_vec());
        Ok(())
    }
}

pub struct FailingSink;

impl Sink for FailingSink {
    fn write(&mut self, _records: &[ResultRecord]) -> esg_scheduler::anyhow::Result<()> {
        bail!("disk full")
    }
}
