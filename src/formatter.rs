//! Transaction formatter
//!
//! Renders a `TransactionSet` as compact, deterministic text for a prompt.
//! Output is never empty, and sets larger than the configured maximum keep
//! only the most recent transactions with a note of how many were omitted.

use crate::models::{Transaction, TransactionSet};
use std::fmt::Write;

/// Appears in the output when the customer has no transactions.
pub const NO_ACTIVITY_MARKER: &str = "No transactions on record for this customer.";
/// Prefix of the line noting omitted transactions.
pub const TRUNCATION_MARKER: &str = "Earlier transactions omitted:";

#[derive(Debug, Clone)]
pub struct TransactionFormatter {
    max_transactions: usize,
}

impl TransactionFormatter {
    pub fn new(max_transactions: usize) -> Self {
        Self {
            max_transactions: max_transactions.max(1),
        }
    }

    pub fn format(&self, set: &TransactionSet) -> String {
        let mut out = String::new();

        if set.is_empty() {
            let _ = writeln!(out, "Customer: {}", set.customer_id());
            out.push_str(NO_ACTIVITY_MARKER);
            return out;
        }

        // Stable sort keeps store order for identical timestamps.
        let mut ordered: Vec<&Transaction> = set.transactions().iter().collect();
        ordered.sort_by_key(|t| t.timestamp);

        let omitted = ordered.len().saturating_sub(self.max_transactions);
        let shown = &ordered[omitted..];

        let _ = writeln!(
            out,
            "Customer: {} | transactions: {} | shown: {}",
            set.customer_id(),
            ordered.len(),
            shown.len()
        );
        if omitted > 0 {
            let _ = writeln!(out, "{} {}", TRUNCATION_MARKER, omitted);
        }

        for (i, tx) in shown.iter().enumerate() {
            let _ = write!(
                out,
                "{}. {} | {:.2} {} | counterparty: {} | channel: {}",
                i + 1,
                tx.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
                tx.amount,
                tx.currency,
                tx.counterparty,
                tx.channel,
            );
            if let Some(device) = &tx.device_fingerprint {
                let _ = write!(out, " | device: {}", device);
            }
            if let Some(location) = &tx.location {
                let _ = write!(
                    out,
                    " | location: {:.4},{:.4}",
                    location.latitude, location.longitude
                );
            }
            out.push('\n');
        }

        out.truncate(out.trim_end().len());
        out
    }
}
