//! Exchange-rate observations from the fiscal data provider.

use crate::error::DataSourceError;
use crate::record::DATE_FORMAT;
use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An exchange rate as the provider encodes it: a decimal inside a JSON string.
///
/// ```
/// use fxledger::ExchangeRate;
///
/// let rate: ExchangeRate = serde_json::from_str(r#""1.75""#).unwrap();
/// assert_eq!(rate.value(), 1.75);
/// assert_eq!(serde_json::to_string(&rate).unwrap(), r#""1.750000""#);
///
/// // Bare numbers are not the provider's format.
/// assert!(serde_json::from_str::<ExchangeRate>("1.75").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ExchangeRate(pub f64);

impl ExchangeRate {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for ExchangeRate {
    fn from(value: f64) -> Self {
        ExchangeRate(value)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

impl Serialize for ExchangeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExchangeRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<f64>()
            .map(ExchangeRate)
            .map_err(|e| de::Error::custom(format!("invalid exchange rate {text:?}: {e}")))
    }
}

/// One dated rate observation for a currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FiscalRecord {
    pub record_date: NaiveDate,
    pub country: String,
    pub currency: String,
    /// Composite descriptor such as `"Canada-Dollar"`.
    pub country_currency_desc: String,
    pub exchange_rate: ExchangeRate,
    pub effective_date: NaiveDate,
}

/// The provider's response envelope: `{"data": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordContainer {
    pub data: Vec<FiscalRecord>,
}

impl RecordContainer {
    /// Decode a response body.
    pub fn from_json(body: &[u8]) -> Result<Self, DataSourceError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Query parameters for one descriptor over an inclusive date window.
///
/// Results are requested newest first (`sort=-record_date`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalQuery {
    pub descriptor: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalQuery {
    pub const SORT: &'static str = "-record_date";
    pub const FIELDS: &'static str =
        "record_date,country,currency,country_currency_desc,exchange_rate,effective_date";

    pub fn new(descriptor: &str, start: NaiveDate, end: NaiveDate) -> Self {
        FiscalQuery {
            descriptor: descriptor.to_string(),
            start,
            end,
        }
    }

    pub fn filter(&self) -> String {
        format!(
            "country_currency_desc:in:({}),effective_date:gte:{},effective_date:lte:{}",
            self.descriptor,
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }

    /// Raw `(name, value)` pairs, for transports that encode their own query.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("sort", Self::SORT.to_string()),
            ("fields", Self::FIELDS.to_string()),
            ("filter", self.filter()),
        ]
    }

    /// Append the parameters to `base` without percent-encoding.
    pub fn url(&self, base: &str) -> String {
        let query = self
            .params()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{base}?{query}")
    }
}

/// Where exchange rates come from when the cache has nothing.
///
/// Implementations return observations whose effective date lies in
/// `[start, end]`, sorted by effective date descending. An empty result is
/// not an error; it means the provider has no rate for that window.
pub trait FiscalDataSource: Send + Sync {
    fn fetch(
        &self,
        descriptor: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FiscalRecord>, DataSourceError>;
}

impl<T: FiscalDataSource + ?Sized> FiscalDataSource for Arc<T> {
    fn fetch(
        &self,
        descriptor: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FiscalRecord>, DataSourceError> {
        (**self).fetch(descriptor, start, end)
    }
}

impl<T: FiscalDataSource + ?Sized> FiscalDataSource for &T {
    fn fetch(
        &self,
        descriptor: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FiscalRecord>, DataSourceError> {
        (**self).fetch(descriptor, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"data":[{"record_date":"2023-09-30","country":"Canada","currency":"Dollar","country_currency_desc":"Canada-Dollar","exchange_rate":"1.35","effective_date":"2023-09-30"}],"meta":{"count":1}}"#;

    #[test]
    fn decodes_provider_envelope() {
        let container = RecordContainer::from_json(BODY.as_bytes()).unwrap();
        assert_eq!(container.data.len(), 1);
        let rec = &container.data[0];
        assert_eq!(rec.country_currency_desc, "Canada-Dollar");
        assert_eq!(rec.exchange_rate.value(), 1.35);
        assert_eq!(rec.effective_date, NaiveDate::from_ymd_opt(2023, 9, 30).unwrap());
    }

    #[test]
    fn numeric_rate_is_rejected() {
        let body = BODY.replace(r#""exchange_rate":"1.35""#, r#""exchange_rate":1.35"#);
        let err = RecordContainer::from_json(body.as_bytes()).unwrap_err();
        assert!(matches!(err, DataSourceError::Decode(_)));
    }

    #[test]
    fn padded_rate_is_rejected() {
        assert!(serde_json::from_str::<ExchangeRate>(r#"" 1.35""#).is_err());
        assert!(serde_json::from_str::<ExchangeRate>(r#""1.35 ""#).is_err());
    }

    #[test]
    fn query_renders_provider_filter() {
        let q = FiscalQuery::new(
            "Canada-Dollar",
            NaiveDate::from_ymd_opt(2023, 4, 10).unwrap(),
            NaiveDate::from_ymd_opt(2023, 10, 10).unwrap(),
        );
        assert_eq!(
            q.url("https://fiscal.example/rates"),
            "https://fiscal.example/rates?sort=-record_date\
             &fields=record_date,country,currency,country_currency_desc,exchange_rate,effective_date\
             &filter=country_currency_desc:in:(Canada-Dollar),effective_date:gte:2023-04-10,effective_date:lte:2023-10-10"
        );
    }
}
