//! Transaction store layer
//!
//! The pipeline only needs `fetch`: a customer's transactions, or a distinct
//! not-found outcome. An existing customer with no activity yields an empty set.

pub mod csv_file;

pub use self::csv_file::CsvTransactionStore;

use crate::error::StoreError;
use crate::models::{Transaction, TransactionSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for transaction history lookups
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn fetch(&self, customer_id: &str) -> Result<TransactionSet, StoreError>;

    /// Known customer ids, sorted.
    async fn customers(&self) -> Result<Vec<String>, StoreError>;

    /// Where the data came from and how much of it there is.
    async fn info(&self) -> Result<DataSourceInfo, StoreError> {
        Ok(DataSourceInfo {
            source: "custom".to_string(),
            path: None,
            rows: None,
            customers: self.customers().await?.len(),
            transactions: None,
            loaded_at: None,
        })
    }
}

/// Description of a store's backing data
#[derive(Debug, Clone, Serialize)]
pub struct DataSourceInfo {
    pub source: String,
    pub path: Option<String>,
    /// Data rows read from the source, header excluded.
    pub rows: Option<usize>,
    pub customers: usize,
    pub transactions: Option<usize>,
    pub loaded_at: Option<DateTime<Utc>>,
}

/// In-memory transaction store for development and tests
#[derive(Clone, Default)]
pub struct InMemoryTransactionStore {
    customers: Arc<RwLock<HashMap<String, Vec<Transaction>>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer, replacing any transactions already held for them.
    /// An empty `transactions` registers a customer with no activity.
    pub async fn insert_customer(
        &self,
        customer_id: &str,
        transactions: Vec<Transaction>,
    ) -> Result<(), StoreError> {
        let set = TransactionSet::new(customer_id, transactions).map_err(|detail| {
            StoreError::InvalidRecord { line: 0, detail }
        })?;

        let mut customers = self.customers.write().await;
        customers.insert(customer_id.to_string(), set.transactions().to_vec());
        Ok(())
    }

    pub(crate) fn from_map(map: HashMap<String, Vec<Transaction>>) -> Self {
        Self {
            customers: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn fetch(&self, customer_id: &str) -> Result<TransactionSet, StoreError> {
        let customers = self.customers.read().await;
        let transactions = customers
            .get(customer_id)
            .ok_or_else(|| StoreError::NotFound(customer_id.to_string()))?;

        TransactionSet::new(customer_id, transactions.clone())
            .map_err(StoreError::Unavailable)
    }

    async fn customers(&self) -> Result<Vec<String>, StoreError> {
        let customers = self.customers.read().await;
        let mut ids: Vec<String> = customers.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn info(&self) -> Result<DataSourceInfo, StoreError> {
        let customers = self.customers.read().await;
        Ok(DataSourceInfo {
            source: "memory".to_string(),
            path: None,
            rows: None,
            customers: customers.len(),
            transactions: Some(customers.values().map(Vec::len).sum()),
            loaded_at: None,
        })
    }
}
