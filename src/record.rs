use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Calendar format for transaction and fiscal dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Maximum description length accepted by [`Ledger::add`](crate::Ledger::add).
pub const MAX_DESCRIPTION_LEN: usize = 50;

/// A stored purchase transaction.
///
/// Records are serialized as single JSON lines in the record log. `date` is
/// written as `YYYY-MM-DD` and `amount` as a bare JSON number. The `id` is a
/// pure function of the other three fields, see [`transaction_id`].
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use fxledger::TransactionRecord;
///
/// let date = NaiveDate::from_ymd_opt(2023, 10, 10).unwrap();
/// let rec = TransactionRecord::new("coffee beans", date, 12.15);
/// assert_eq!(rec.id, fxledger::transaction_id("coffee beans", date, 12.15));
///
/// let line = serde_json::to_string(&rec).unwrap();
/// assert!(line.contains(r#""date":"2023-10-10""#));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub id: String,
    pub description: String,
    pub date: NaiveDate,
    pub amount: f64,
}

impl TransactionRecord {
    /// Build a record, deriving its id from the payload.
    pub fn new(description: &str, date: NaiveDate, amount: f64) -> Self {
        TransactionRecord {
            id: transaction_id(description, date, amount),
            description: description.to_string(),
            date,
            amount,
        }
    }
}

/// A transaction together with the rate used to convert it.
///
/// Derived on demand by [`Ledger::get`](crate::Ledger::get), never persisted.
/// Serializes flat: the record fields followed by `rate` and `converted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConvertedTransaction {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub rate: f64,
    pub converted: f64,
}

impl ConvertedTransaction {
    /// Convert `record` at `rate`, rounding to cents.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use fxledger::{ConvertedTransaction, TransactionRecord};
    ///
    /// let date = NaiveDate::from_ymd_opt(2023, 10, 10).unwrap();
    /// let out = ConvertedTransaction::convert(TransactionRecord::new("t", date, 12.15), 1.75);
    /// assert_eq!(out.converted, 21.26);
    /// ```
    pub fn convert(record: TransactionRecord, rate: f64) -> Self {
        let converted = round_cents(record.amount * rate);
        ConvertedTransaction {
            record,
            rate,
            converted,
        }
    }
}

/// Compute the id of a transaction: xxh64 (seed 0), lowercase hex, no padding.
///
/// The hashed text is the description, the date as an RFC 3339 midnight-UTC
/// timestamp, and the amount with six decimals, concatenated. Logs written by
/// earlier deployments use the same ids.
pub fn transaction_id(description: &str, date: NaiveDate, amount: f64) -> String {
    let key = format!(
        "{description}{}T00:00:00Z{amount:.6}",
        date.format(DATE_FORMAT)
    );
    let hash = xxhash_rust::xxh64::xxh64(key.as_bytes(), 0);
    format!("{hash:x}")
}

/// Round to two decimal places, half away from zero.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
