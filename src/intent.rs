//! Chat intent classifier
//!
//! Maps a free-text chat message to one of:
//! - Analyze: the message names a customer ("analyse C12345", "what about customer 88213?")
//! - ListCustomers: the analyst wants to see who is on file
//! - Help: anything else

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Analyze { customer_id: String },
    ListCustomers,
    Help,
}

/// Phrases that ask for the customer list.
const LIST_KEYWORDS: &[&str] = &[
    "list", "show customers", "which customers", "who is on file", "all customers",
    "available customers", "customer list",
];

const SEPARATORS: &[char] = &[',', ';', ':', '?', '!', '"', '\'', '(', ')'];

/// Words that look like identifiers but never are.
const NOT_IDENTIFIERS: &[&str] = &["24h", "24x7", "1st", "2nd", "3rd", "2fa", "3ds"];

pub struct IntentClassifier;

impl IntentClassifier {
    pub fn classify(message: &str) -> Intent {
        if let Some(customer_id) = extract_customer_id(message) {
            return Intent::Analyze { customer_id };
        }

        let text = message.to_lowercase();
        if LIST_KEYWORDS.iter().any(|kw| text.contains(*kw)) {
            return Intent::ListCustomers;
        }

        Intent::Help
    }
}

/// First token made only of ASCII letters, digits, `-` or `_` that contains
/// at least one digit.
pub fn extract_customer_id(message: &str) -> Option<String> {
    message
        .split(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| !token.is_empty())
        .filter(|token| {
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
        .filter(|token| token.chars().any(|c| c.is_ascii_digit()))
        .find(|token| !NOT_IDENTIFIERS.contains(&token.to_lowercase().as_str()))
        .map(str::to_string)
}

/// Reply for messages without an actionable intent.
pub const HELP_TEXT: &str = "Send a customer identifier (for example \"analyse C12345\") to get a \
transaction summary, investigative questions and a risk level, or ask to list customers.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_requests() {
        let cases = vec![
            ("analyse C12345", "C12345"),
            ("What do you make of customer 88213?", "88213"),
            ("Check CUST-0042, they called in", "CUST-0042"),
            ("C12345.", "C12345"),
        ];

        for (message, expected) in cases {
            assert_eq!(
                IntentClassifier::classify(message),
                Intent::Analyze {
                    customer_id: expected.to_string()
                },
                "message: {message}"
            );
        }
    }

    #[test]
    fn test_list_requests() {
        for message in ["list customers", "Which customers do you have?", "show customers please"] {
            assert_eq!(IntentClassifier::classify(message), Intent::ListCustomers);
        }
    }

    #[test]
    fn test_help_fallback() {
        assert_eq!(IntentClassifier::classify("hi"), Intent::Help);
        assert_eq!(IntentClassifier::classify("what can you do?"), Intent::Help);
        assert_eq!(IntentClassifier::classify(""), Intent::Help);
    }

    #[test]
    fn test_ordinal_words_are_not_identifiers() {
        assert_eq!(extract_customer_id("the 1st transaction looks odd"), None);
        assert_eq!(
            extract_customer_id("the 2nd one, customer X9"),
            Some("X9".to_string())
        );
    }
}
