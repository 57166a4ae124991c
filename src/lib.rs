mod cache;
mod error;
mod fiscal;
mod ledger;
mod record;
mod store;

pub use cache::{Clock, ManualClock, RateCache, STALENESS_WINDOW, SystemClock};
pub use error::{CacheMiss, DataSourceError, LedgerError, StoreError};
pub use fiscal::{ExchangeRate, FiscalDataSource, FiscalQuery, FiscalRecord, RecordContainer};
pub use ledger::{DEFAULT_CURRENCY, LOAD_BATCH_SIZE, Ledger, LedgerBuilder};
pub use record::{
    ConvertedTransaction, DATE_FORMAT, MAX_DESCRIPTION_LEN, TransactionRecord, round_cents,
    transaction_id,
};
pub use store::{HandleMode, RecordStore, StoreHandle, StoreLock};
