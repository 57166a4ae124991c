use std::io;
use thiserror::Error;

/// Failure reading or writing the record log.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record log i/o: {0}")]
    Io(#[from] io::Error),

    /// A line in the log is not a valid record. `line` is 1-based.
    #[error("malformed record on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure reported by a [`FiscalDataSource`](crate::FiscalDataSource).
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("fiscal data source returned status {0}")]
    Status(u16),

    #[error("cannot decode fiscal data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("fiscal data transport: {0}")]
    Transport(String),
}

/// The rate cache has nothing usable for the requested window.
///
/// Never escapes the [`Ledger`](crate::Ledger); a miss falls through to the
/// data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cache no data or too old")]
pub struct CacheMiss;

/// Errors surfaced by [`Ledger`](crate::Ledger) operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Caller supplied a bad description, date or amount.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// No exchange rate exists for the descriptor in the lookback window.
    #[error("target currency unavailable: {0}")]
    TargetCurrencyUnavailable(String),

    /// Persisting a new transaction failed.
    #[error("server: {0}")]
    Server(#[source] StoreError),

    /// Replaying the log failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

impl LedgerError {
    /// HTTP status an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            LedgerError::InvalidInput(_) => 400,
            LedgerError::RecordNotFound(_) => 404,
            _ => 500,
        }
    }

    /// Client-facing message for the kinds that get one.
    ///
    /// Input errors carry their own detail, so the full `Display` text is
    /// meant to be shown for them. Everything else beyond the two fixed
    /// messages is an opaque server error.
    pub fn public_message(&self) -> Option<&'static str> {
        match self {
            LedgerError::RecordNotFound(_) => Some("record not found"),
            LedgerError::TargetCurrencyUnavailable(_) => {
                Some("the transaction cannot be converted to the target currency")
            }
            _ => None,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, LedgerError::InvalidInput(_))
    }
}
