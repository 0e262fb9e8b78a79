//! Prompt builder
//!
//! Combines formatted transactions with the fixed investigation template and
//! the output contract. Pure: the same inputs always yield the same prompt.

use crate::config::QuestionBounds;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    bounds: QuestionBounds,
}

impl PromptBuilder {
    pub fn new(bounds: QuestionBounds) -> Self {
        Self { bounds }
    }

    pub fn build(&self, formatted_transactions: &str) -> String {
        self.build_with_context(formatted_transactions, None)
    }

    /// Same as `build`, with optional analyst notes in their own section.
    pub fn build_with_context(
        &self,
        formatted_transactions: &str,
        context: Option<&str>,
    ) -> String {
        let context_section = match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(notes) => format!("\nANALYST NOTES:\n{}\n", notes),
            None => String::new(),
        };

        format!(
            r#"You are assisting a bank fraud investigator.

Review the customer's transaction history below and identify patterns that
may indicate fraud, scams or account takeover: unusual amounts or counterparties,
bursts of activity, new devices or locations, and channel changes.

TRANSACTIONS:
{transactions}
{context}
Produce:
1. summary: a concise narrative of what the transactions suggest
2. questions: between {min} and {max} specific questions the investigator should ask the customer
3. risk_level: exactly one of "Low", "Medium", "High"

Rules:
- Return ONLY valid JSON
- No explanation text outside the JSON
- questions must contain at least {min} and at most {max} non-empty strings
- Do not mention internal system names in the questions
- JSON format:

{{
  "summary": "...",
  "questions": ["...", "..."],
  "risk_level": "Low" | "Medium" | "High"
}}
"#,
            transactions = formatted_transactions.trim_end(),
            context = context_section,
            min = self.bounds.min,
            max = self.bounds.max,
        )
    }
}

/// Lowercase hex SHA-256 of a prompt, for matching logged requests to fixtures.
pub fn fingerprint(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_transactions_and_contract() {
        let prompt = PromptBuilder::default().build("1. 2024-03-01 | -25.00 AUD");

        assert!(prompt.contains("TRANSACTIONS:\n1. 2024-03-01 | -25.00 AUD\n"));
        assert!(prompt.contains("summary"));
        assert!(prompt.contains("between 5 and 8"));
        assert!(prompt.contains(r#""Low", "Medium", "High""#));
        assert!(!prompt.contains("ANALYST NOTES"));
    }

    #[test]
    fn test_bounds_flow_into_prompt() {
        let prompt = PromptBuilder::new(QuestionBounds { min: 3, max: 4 }).build("x");
        assert!(prompt.contains("between 3 and 4"));
        assert!(prompt.contains("at least 3 and at most 4"));
    }

    #[test]
    fn test_context_section() {
        let builder = PromptBuilder::default();
        let with =
            builder.build_with_context("x", Some("  customer called about a romance contact "));
        assert!(with.contains("ANALYST NOTES:\ncustomer called about a romance contact\n"));

        assert_eq!(builder.build_with_context("x", Some("   ")), builder.build("x"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let builder = PromptBuilder::default();
        let a = builder.build("same input");
        let b = builder.build("same input");
        assert_eq!(a, b);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
