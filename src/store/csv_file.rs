//! CSV-backed transaction store
//!
//! Headers: customer_id,transaction_id,timestamp,amount,currency,counterparty,channel,device_fingerprint,latitude,longitude
//!
//! The file is read once when the store is opened. A row with an empty
//! `transaction_id` registers its customer without any activity.

use super::{DataSourceInfo, InMemoryTransactionStore, TransactionStore};
use crate::error::StoreError;
use crate::models::{Channel, GeoLocation, Transaction, TransactionSet};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(serde::Deserialize)]
struct CsvRow {
    #[serde(alias = "Customer_CGID", alias = "CustomerID", alias = "Customer_ID")]
    customer_id: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    counterparty: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    device_fingerprint: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

pub struct CsvTransactionStore {
    path: Option<PathBuf>,
    rows: usize,
    transactions: usize,
    loaded_at: DateTime<Utc>,
    inner: InMemoryTransactionStore,
}

impl CsvTransactionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;

        let mut store = Self::from_reader(file)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StoreError> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let mut customers: HashMap<String, Vec<Transaction>> = HashMap::new();
        let mut rows = 0usize;

        for (index, rec) in rdr.deserialize::<CsvRow>().enumerate() {
            // Header is line 1.
            let line = index as u64 + 2;
            let row = rec?;
            rows += 1;

            let customer_id = row.customer_id.trim().to_string();
            if customer_id.is_empty() {
                return Err(invalid(line, "customer_id is empty"));
            }

            let entry = customers.entry(customer_id.clone()).or_default();
            if let Some(tx) = parse_transaction(line, customer_id, row)? {
                entry.push(tx);
            }
        }

        let transactions = customers.values().map(Vec::len).sum();
        info!(
            rows,
            transactions,
            customers = customers.len(),
            "Loaded transaction file"
        );

        Ok(Self {
            path: None,
            rows,
            transactions,
            loaded_at: Utc::now(),
            inner: InMemoryTransactionStore::from_map(customers),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn invalid(line: u64, detail: impl Into<String>) -> StoreError {
    StoreError::InvalidRecord {
        line,
        detail: detail.into(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_transaction(
    line: u64,
    customer_id: String,
    row: CsvRow,
) -> Result<Option<Transaction>, StoreError> {
    let Some(transaction_id) = non_empty(row.transaction_id) else {
        return Ok(None);
    };

    let timestamp = non_empty(row.timestamp)
        .ok_or_else(|| invalid(line, "timestamp is required"))?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| invalid(line, format!("timestamp: {e}")))?
        .with_timezone(&Utc);

    let amount = non_empty(row.amount)
        .ok_or_else(|| invalid(line, "amount is required"))?
        .parse::<Decimal>()
        .map_err(|e| invalid(line, format!("amount: {e}")))?;

    let currency = non_empty(row.currency)
        .ok_or_else(|| invalid(line, "currency is required"))?
        .to_uppercase();

    let location = match (row.latitude, row.longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoLocation {
            latitude,
            longitude,
        }),
        (None, None) => None,
        _ => return Err(invalid(line, "latitude and longitude must be given together")),
    };

    Ok(Some(Transaction {
        transaction_id,
        customer_id,
        timestamp,
        amount,
        currency,
        counterparty: non_empty(row.counterparty).unwrap_or_else(|| "unknown".to_string()),
        channel: row
            .channel
            .as_deref()
            .map(Channel::from_label)
            .unwrap_or(Channel::Other),
        device_fingerprint: non_empty(row.device_fingerprint),
        location,
    }))
}

#[async_trait::async_trait]
impl TransactionStore for CsvTransactionStore {
    async fn fetch(&self, customer_id: &str) -> Result<TransactionSet, StoreError> {
        self.inner.fetch(customer_id).await
    }

    async fn customers(&self) -> Result<Vec<String>, StoreError> {
        self.inner.customers().await
    }

    async fn info(&self) -> Result<DataSourceInfo, StoreError> {
        Ok(DataSourceInfo {
            source: "csv".to_string(),
            path: self.path().map(|p| p.display().to_string()),
            rows: Some(self.rows),
            customers: self.inner.customers().await?.len(),
            transactions: Some(self.transactions),
            loaded_at: Some(self.loaded_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
customer_id,transaction_id,timestamp,amount,currency,counterparty,channel,device_fingerprint,latitude,longitude
C12345,T1,2024-03-01T09:30:00Z,-25.00,aud,Coffee Co,card,,,
C12345,T2,2024-03-02T10:00:00+10:00,-1500.00,AUD,Overseas Ltd,SWIFT,dev-9,-33.8688,151.2093
C12345,T3,2024-03-03T11:15:00Z,2000.00,AUD,Employer Pty,online,dev-9,,
C00001,,,,,,,,,
C55555,T9,2024-04-01T08:00:00Z,-60.00,EUR,Kiosk,teleport,,,
";

    #[tokio::test]
    async fn test_loads_rows_per_customer() {
        let store = CsvTransactionStore::from_reader(SAMPLE.as_bytes()).unwrap();

        let set = store.fetch("C12345").await.unwrap();
        assert_eq!(set.len(), 3);

        let wire = &set.transactions()[1];
        assert_eq!(wire.channel, Channel::Wire);
        assert_eq!(wire.amount, Decimal::new(-150000, 2));
        assert_eq!(wire.device_fingerprint.as_deref(), Some("dev-9"));
        assert!(wire.location.is_some());
        assert_eq!(wire.timestamp.to_rfc3339(), "2024-03-02T00:00:00+00:00");

        assert_eq!(set.transactions()[0].currency, "AUD");
        assert!(set.transactions()[0].location.is_none());
    }

    #[tokio::test]
    async fn test_customer_without_activity() {
        let store = CsvTransactionStore::from_reader(SAMPLE.as_bytes()).unwrap();
        assert!(store.fetch("C00001").await.unwrap().is_empty());
        assert!(matches!(
            store.fetch("C99999").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_channel_maps_to_other() {
        let store = CsvTransactionStore::from_reader(SAMPLE.as_bytes()).unwrap();
        let set = store.fetch("C55555").await.unwrap();
        assert_eq!(set.transactions()[0].channel, Channel::Other);
    }

    #[tokio::test]
    async fn test_customers_listing() {
        let store = CsvTransactionStore::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            store.customers().await.unwrap(),
            vec!["C00001", "C12345", "C55555"]
        );
    }

    #[tokio::test]
    async fn test_info_describes_loaded_file() {
        let store = CsvTransactionStore::from_reader(SAMPLE.as_bytes()).unwrap();
        let info = store.info().await.unwrap();

        assert_eq!(info.source, "csv");
        assert_eq!(info.rows, Some(5));
        assert_eq!(info.transactions, Some(4));
        assert_eq!(info.customers, 3);
        assert!(info.path.is_none());
        assert!(info.loaded_at.is_some());
    }

    #[tokio::test]
    async fn test_open_records_path() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/transactions.csv");
        let store = CsvTransactionStore::open(&path).unwrap();

        assert_eq!(store.path(), Some(path.as_path()));
        let info = store.info().await.unwrap();
        assert_eq!(info.path, Some(path.display().to_string()));
        assert!(info.customers >= 1);
    }

    #[test]
    fn test_header_alias_and_padding() {
        let data = "\
 Customer_CGID , transaction_id , timestamp , amount , currency , counterparty , channel
C1,T1,2024-03-01T09:30:00Z,10,AUD,Shop,atm
";
        let store = CsvTransactionStore::from_reader(data.as_bytes()).unwrap();
        let set = tokio_test::block_on(store.fetch("C1")).unwrap();
        assert_eq!(set.transactions()[0].channel, Channel::Atm);
    }

    #[test]
    fn test_bad_amount_reports_line() {
        let data = "\
customer_id,transaction_id,timestamp,amount,currency,counterparty,channel
C1,T1,2024-03-01T09:30:00Z,10,AUD,Shop,card
C1,T2,2024-03-01T09:30:00Z,ten,AUD,Shop,card
";
        let err = CsvTransactionStore::from_reader(data.as_bytes()).err().unwrap();
        assert!(matches!(err, StoreError::InvalidRecord { line: 3, .. }));
    }

    #[test]
    fn test_half_location_rejected() {
        let data = "\
customer_id,transaction_id,timestamp,amount,currency,counterparty,channel,latitude
C1,T1,2024-03-01T09:30:00Z,10,AUD,Shop,card,1.5
";
        assert!(CsvTransactionStore::from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = CsvTransactionStore::open("/nonexistent/transactions.csv")
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
