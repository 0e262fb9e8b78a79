//! Core data models for transaction analysis

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AnalysisError;

/// Lower bound on investigative questions in a result.
pub const MIN_QUESTIONS: usize = 5;
/// Upper bound on investigative questions in a result.
pub const MAX_QUESTIONS: usize = 8;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Card,
    Online,
    Wire,
    Atm,
    Other,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Card => "card",
            Channel::Online => "online",
            Channel::Wire => "wire",
            Channel::Atm => "atm",
            Channel::Other => "other",
        }
    }

    /// Lenient mapping used by file-backed stores; unknown labels become `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "card" | "pos" | "debit" | "credit" => Channel::Card,
            "online" | "web" | "internet" | "mobile" => Channel::Online,
            "wire" | "transfer" | "swift" => Channel::Wire,
            "atm" => Channel::Atm,
            _ => Channel::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    /// Case-insensitive match on exactly one of the three labels.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let token = s.trim();
        RiskLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| format!("unrecognised risk level {:?}", token))
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub customer_id: String,
    pub timestamp: DateTime<Utc>,
    /// Signed: negative for outflows.
    pub amount: Decimal,
    /// ISO 4217 code.
    pub currency: String,
    pub counterparty: String,
    pub channel: Channel,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

/// Ordered transactions belonging to exactly one customer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransactionSet {
    customer_id: String,
    transactions: Vec<Transaction>,
}

impl TransactionSet {
    /// Fails if any transaction belongs to a different customer.
    pub fn new(
        customer_id: impl Into<String>,
        transactions: Vec<Transaction>,
    ) -> std::result::Result<Self, String> {
        let customer_id = customer_id.into();
        if let Some(stray) = transactions.iter().find(|t| t.customer_id != customer_id) {
            return Err(format!(
                "transaction {} belongs to customer {}, expected {}",
                stray.transaction_id, stray.customer_id, customer_id
            ));
        }
        Ok(Self {
            customer_id,
            transactions,
        })
    }

    pub fn empty(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            transactions: Vec::new(),
        }
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn summary(&self) -> CustomerSummary {
        let mut channels = BTreeMap::new();
        let mut net_by_currency: BTreeMap<String, Decimal> = BTreeMap::new();

        for tx in &self.transactions {
            *channels.entry(tx.channel).or_insert(0usize) += 1;
            *net_by_currency.entry(tx.currency.clone()).or_default() += tx.amount;
        }

        CustomerSummary {
            customer_id: self.customer_id.clone(),
            transaction_count: self.transactions.len(),
            first_seen: self.transactions.iter().map(|t| t.timestamp).min(),
            last_seen: self.transactions.iter().map(|t| t.timestamp).max(),
            channels,
            net_by_currency,
        }
    }
}

/// Aggregate view of a customer's activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerSummary {
    pub customer_id: String,
    pub transaction_count: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub channels: BTreeMap<Channel, usize>,
    pub net_by_currency: BTreeMap<String, Decimal>,
}

//
// ================= Request / Result =================
//

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub request_id: Uuid,
    customer_id: String,
    context: Option<String>,
}

impl AnalysisRequest {
    /// Validates before any I/O: the identifier must be non-empty after trimming.
    pub fn new(customer_id: &str) -> crate::Result<Self> {
        let trimmed = customer_id.trim();
        if trimmed.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "customer id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            request_id: Uuid::new_v4(),
            customer_id: trimmed.to_string(),
            context: None,
        })
    }

    pub fn with_context(mut self, context: Option<&str>) -> Self {
        self.context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

/// Validated output of one analysis. Only the parser constructs it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnalysisResult {
    summary: String,
    questions: Vec<String>,
    risk_level: RiskLevel,
}

impl AnalysisResult {
    pub(crate) fn new_unchecked(
        summary: String,
        questions: Vec<String>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            summary,
            questions,
            risk_level,
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }
}
