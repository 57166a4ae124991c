#![allow(dead_code)]

use chrono::NaiveDate;
use fxledger::{
    DataSourceError, ExchangeRate, FiscalDataSource, FiscalRecord, Ledger, TransactionRecord,
};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn dummy_record(i: usize) -> TransactionRecord {
    TransactionRecord::new(&format!("transaction {i}"), date(2023, 10, 10), 10.0 + i as f64)
}

pub fn observation(descriptor: &str, effective: NaiveDate, rate: f64) -> FiscalRecord {
    let (country, currency) = descriptor.split_once('-').unwrap_or((descriptor, ""));
    FiscalRecord {
        record_date: effective,
        country: country.to_string(),
        currency: currency.to_string(),
        country_currency_desc: descriptor.to_string(),
        exchange_rate: ExchangeRate(rate),
        effective_date: effective,
    }
}

/// In-memory data source that serves a fixed set of observations and
/// counts how often it was asked.
#[derive(Default)]
pub struct FakeSource {
    observations: Mutex<Vec<FiscalRecord>>,
    calls: AtomicUsize,
    fail: bool,
}

impl FakeSource {
    pub fn with(observations: Vec<FiscalRecord>) -> Self {
        FakeSource {
            observations: Mutex::new(observations),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        FakeSource {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn replace(&self, observations: Vec<FiscalRecord>) {
        *self.observations.lock().unwrap() = observations;
    }
}

impl FiscalDataSource for FakeSource {
    fn fetch(
        &self,
        descriptor: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FiscalRecord>, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DataSourceError::Status(500));
        }
        let mut found: Vec<_> = self
            .observations
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.country_currency_desc == descriptor)
            .filter(|o| start <= o.effective_date && o.effective_date <= end)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.effective_date.cmp(&a.effective_date));
        Ok(found)
    }
}

pub fn file_ledger<'a>(path: &Path, source: &'a FakeSource) -> Ledger<&'a FakeSource> {
    Ledger::builder(path).open(source).unwrap()
}

pub fn log_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
