//! Record a few purchases, reopen the ledger, and convert one of them.

use chrono::NaiveDate;
use fxledger::{
    DEFAULT_CURRENCY, DataSourceError, ExchangeRate, FiscalDataSource, FiscalRecord, Ledger,
};

/// Serves a couple of fixed quarterly rates instead of calling the provider.
struct QuarterlyRates;

impl FiscalDataSource for QuarterlyRates {
    fn fetch(
        &self,
        descriptor: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FiscalRecord>, DataSourceError> {
        let quarters = [
            ("2023-09-30", "1.356"),
            ("2023-06-30", "1.326"),
            ("2023-03-31", "1.353"),
        ];
        let mut found = Vec::new();
        for (date, rate) in quarters {
            let effective_date: NaiveDate = date
                .parse()
                .map_err(|e| DataSourceError::Transport(format!("bad date {date}: {e}")))?;
            if descriptor != "Canada-Dollar" || effective_date < start || effective_date > end {
                continue;
            }
            let exchange_rate: ExchangeRate = serde_json::from_value(rate.into())?;
            found.push(FiscalRecord {
                record_date: effective_date,
                country: "Canada".to_string(),
                currency: "Dollar".to_string(),
                country_currency_desc: descriptor.to_string(),
                exchange_rate,
                effective_date,
            });
        }
        Ok(found)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data.json");

    {
        let ledger = Ledger::builder(&path).open(QuarterlyRates)?;
        ledger.add("coffee beans", "2023-10-10", "12.15")?;
        ledger.add("bookshelf", "2023-08-07", "34.75")?;
        // Same payload, same id: recorded once.
        ledger.add("coffee beans", "2023-10-10", "12.15")?;
        println!("Recorded {} transaction(s)", ledger.len());
    }

    let ledger = Ledger::builder(&path).open(QuarterlyRates)?;
    println!("Reloaded {} transaction(s)\n", ledger.len());

    for record in ledger.list() {
        let home = ledger.get(&record.id, DEFAULT_CURRENCY)?;
        let cad = ledger.get(&record.id, "Canada-Dollar")?;
        println!(
            "{:<14} {}  {:>8.2} USD  {:>8.2} CAD (rate {})",
            record.description, record.date, home.converted, cad.converted, cad.rate
        );
    }

    match ledger.get(&ledger.list()[0].id, "Mexico-Peso") {
        Err(e) => println!("\nMexico-Peso: {}", e.public_message().unwrap_or("server error")),
        Ok(out) => println!("\nMexico-Peso: {}", out.converted),
    }

    Ok(())
}
