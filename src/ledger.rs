use crate::cache::{Clock, RateCache, SystemClock};
use crate::error::LedgerError;
use crate::fiscal::FiscalDataSource;
use crate::record::{ConvertedTransaction, DATE_FORMAT, MAX_DESCRIPTION_LEN, TransactionRecord};
use crate::store::{RecordStore, StoreLock};
use chrono::{Months, NaiveDate};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Currency descriptor meaning "no conversion".
pub const DEFAULT_CURRENCY: &str = "United States-Dollar";

/// Records read per batch while replaying the log.
pub const LOAD_BATCH_SIZE: usize = 10;

/// How far back from the transaction date a rate may have taken effect.
const LOOKBACK: Months = Months::new(6);

/// Builder for configuring a [`Ledger`].
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use fxledger::{DataSourceError, FiscalDataSource, FiscalRecord, Ledger};
///
/// struct NoRates;
///
/// impl FiscalDataSource for NoRates {
///     fn fetch(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<FiscalRecord>, DataSourceError> {
///         Ok(Vec::new())
///     }
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// let ledger = Ledger::builder(dir.path().join("data.json"))
///     .home_currency("United States-Dollar")
///     .open(NoRates)
///     .unwrap();
///
/// let id = ledger.add("coffee", "2023-10-10", "12.15").unwrap();
/// let out = ledger.get(&id, "United States-Dollar").unwrap();
/// assert_eq!(out.converted, 12.15);
/// ```
pub struct LedgerBuilder {
    path: PathBuf,
    persist: bool,
    home_currency: String,
    load_batch: usize,
    clock: Option<Arc<dyn Clock>>,
    lock: Option<StoreLock>,
}

impl LedgerBuilder {
    fn new(path: impl AsRef<Path>) -> Self {
        LedgerBuilder {
            path: path.as_ref().to_path_buf(),
            persist: true,
            home_currency: DEFAULT_CURRENCY.to_string(),
            load_batch: LOAD_BATCH_SIZE,
            clock: None,
            lock: None,
        }
    }

    /// Keep transactions in memory only. The log file is never opened.
    pub fn skip_file(mut self, skip: bool) -> Self {
        self.persist = !skip;
        self
    }

    /// Descriptor that [`Ledger::get`] treats as "no conversion".
    pub fn home_currency(mut self, descriptor: &str) -> Self {
        self.home_currency = descriptor.to_string();
        self
    }

    /// Records read per batch by [`Ledger::load`]. Zero is treated as one.
    pub fn load_batch(mut self, size: usize) -> Self {
        self.load_batch = size.max(1);
        self
    }

    /// Clock used for rate cache expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share log exclusivity with other stores in this process.
    pub fn store_lock(mut self, lock: StoreLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Build the ledger without reading the log.
    pub fn build<D: FiscalDataSource>(self, source: D) -> Ledger<D> {
        let store = RecordStore::with_lock(&self.path, self.persist, self.lock.unwrap_or_default());
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ledger {
            table: RwLock::new(HashMap::new()),
            store,
            cache: RateCache::with_clock(clock),
            source,
            home_currency: self.home_currency,
            load_batch: self.load_batch,
        }
    }

    /// Build the ledger and replay the log into it.
    pub fn open<D: FiscalDataSource>(self, source: D) -> Result<Ledger<D>, LedgerError> {
        let ledger = self.build(source);
        ledger.load()?;
        Ok(ledger)
    }
}

/// The transaction table, its durable log, and currency conversion.
///
/// `add`, `get` and `list` are safe to call from many threads. Lookups run
/// concurrently with each other; an insert excludes them.
pub struct Ledger<D> {
    table: RwLock<HashMap<String, TransactionRecord>>,
    store: RecordStore,
    cache: RateCache,
    source: D,
    home_currency: String,
    load_batch: usize,
}

impl Ledger<()> {
    /// Start configuring a ledger whose log lives at `path`.
    pub fn builder(path: impl AsRef<Path>) -> LedgerBuilder {
        LedgerBuilder::new(path)
    }
}

impl<D: FiscalDataSource> Ledger<D> {
    /// Replay the whole log into the table.
    ///
    /// Meant to run once, before the ledger is shared. Records from a batch
    /// that fails to decode are not inserted; batches before it are.
    pub fn load(&self) -> Result<(), LedgerError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut handle = self.store.acquire();

        let mut loaded = 0usize;
        loop {
            let batch = handle.read_records(self.load_batch)?;
            if batch.is_empty() {
                break;
            }
            loaded += batch.len();
            for record in batch {
                table.insert(record.id.clone(), record);
            }
        }
        handle.release()?;

        info!(
            "loaded {loaded} record(s) from {}, {} unique",
            self.store.path().display(),
            table.len()
        );
        Ok(())
    }

    /// Record a transaction and return its id.
    ///
    /// `date` must be `YYYY-MM-DD` and `amount` a finite decimal. Adding the
    /// same description, date and amount again returns the same id and
    /// changes nothing.
    pub fn add(&self, description: &str, date: &str, amount: &str) -> Result<String, LedgerError> {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(LedgerError::InvalidInput(format!(
                "description is longer than {MAX_DESCRIPTION_LEN} characters"
            )));
        }

        let date = parse_date(date)?;

        let amount = amount
            .parse::<f64>()
            .ok()
            .filter(|a| a.is_finite())
            .ok_or_else(|| LedgerError::InvalidInput(format!("invalid amount {amount:?}")))?;

        let record = TransactionRecord::new(description, date, amount);

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.contains_key(&record.id) {
            debug!("transaction {} already recorded", record.id);
            return Ok(record.id);
        }

        // The log must hold the record before the table does.
        self.store
            .acquire()
            .append_records(std::slice::from_ref(&record))
            .map_err(LedgerError::Server)?;

        let id = record.id.clone();
        table.insert(id.clone(), record);
        debug!("recorded transaction {id}");
        Ok(id)
    }

    /// Look up a transaction and convert it into `target_currency`.
    ///
    /// The rate used is the most recent one effective within six calendar
    /// months before the transaction date, taken from the cache when
    /// possible and from the data source otherwise.
    pub fn get(
        &self,
        id: &str,
        target_currency: &str,
    ) -> Result<ConvertedTransaction, LedgerError> {
        let record = {
            let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
            table
                .get(id)
                .cloned()
                .ok_or_else(|| LedgerError::RecordNotFound(id.to_string()))?
        };

        if target_currency == self.home_currency {
            return Ok(ConvertedTransaction::convert(record, 1.0));
        }

        let tx_date = record.date;
        let start = tx_date.checked_sub_months(LOOKBACK).unwrap_or(NaiveDate::MIN);

        if let Ok((_, rate)) = self.cache.get(target_currency, start, tx_date) {
            return Ok(ConvertedTransaction::convert(record, rate));
        }

        debug!("fetching {target_currency} rates for {start}..={tx_date}");
        let observations = self.source.fetch(target_currency, start, tx_date)?;
        let Some(latest) = observations.first() else {
            warn!("no {target_currency} rate between {start} and {tx_date}");
            return Err(LedgerError::TargetCurrencyUnavailable(target_currency.to_string()));
        };

        let rate = latest.exchange_rate.value();
        self.cache.set(target_currency, latest.effective_date, rate);
        Ok(ConvertedTransaction::convert(record, rate))
    }

    /// Snapshot of every transaction, in no particular order.
    pub fn list(&self) -> Vec<TransactionRecord> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn home_currency(&self) -> &str {
        &self.home_currency
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}

/// Parse a `YYYY-MM-DD` date, rejecting anything chrono would only accept
/// leniently (unpadded fields, signs, surrounding whitespace).
fn parse_date(text: &str) -> Result<NaiveDate, LedgerError> {
    let date = NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| LedgerError::InvalidInput(format!("invalid date {text:?}: {e}")))?;
    if date.format(DATE_FORMAT).to_string() != text {
        return Err(LedgerError::InvalidInput(format!(
            "invalid date {text:?}: expected YYYY-MM-DD"
        )));
    }
    Ok(date)
}
