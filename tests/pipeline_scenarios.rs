//! End-to-end runs of the analyzer against scripted collaborators.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fraud_analysis_pipeline::completion::{
    CompletionService, FixedJitter, RecordingSleeper, RetryPolicy, RetryingCompletionClient,
    ScriptedCompletionService,
};
use fraud_analysis_pipeline::error::CompletionError;
use fraud_analysis_pipeline::formatter::{
    TransactionFormatter, NO_ACTIVITY_MARKER, TRUNCATION_MARKER,
};
use fraud_analysis_pipeline::store::{InMemoryTransactionStore, TransactionStore};
use fraud_analysis_pipeline::{
    AnalysisError, Analyzer, AppConfig, Channel, GeoLocation, RiskLevel, Transaction,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

const SIX_QUESTIONS_MEDIUM: &str = r#"```json
{
  "summary": "A new device initiated two online transfers to an unfamiliar payee shortly after a small card test payment.",
  "questions": [
    "Did you make the online transfers on 3 March?",
    "Do you recognise the payee Quick Invest Ltd?",
    "Have you recently logged in from a new phone or computer?",
    "Has anyone asked you to move money to keep it safe?",
    "Did you share a one-time passcode with anyone?",
    "Was the small card payment at Test Merchant yours?"
  ],
  "risk_level": "Medium"
}
```"#;

const FOUR_QUESTIONS_FREE_TEXT: &str = "\
Summary: Several transfers to a new payee.

Questions:
1. Did you authorise these transfers?
2. Who is Quick Invest Ltd?
3. Did anyone contact you about an investment?
4. Have you changed your phone recently?

Risk Level: High
";

fn transaction(id: &str, day: u32, cents: i64, channel: Channel) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        customer_id: "C12345".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 3, day, 14, 5, 0).unwrap(),
        amount: Decimal::new(cents, 2),
        currency: "AUD".to_string(),
        counterparty: format!("Payee {}", id),
        channel,
        device_fingerprint: Some("dev-7f3a".to_string()),
        location: Some(GeoLocation {
            latitude: -37.8136,
            longitude: 144.9631,
        }),
    }
}

async fn store() -> Arc<InMemoryTransactionStore> {
    let store = InMemoryTransactionStore::new();
    store
        .insert_customer(
            "C12345",
            vec![
                transaction("T1", 1, -100, Channel::Card),
                transaction("T2", 3, -250000, Channel::Online),
                transaction("T3", 3, -240000, Channel::Online),
            ],
        )
        .await
        .unwrap();
    store.insert_customer("C00000", vec![]).await.unwrap();
    Arc::new(store)
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(200),
        max_delay: Duration::from_millis(1_000),
        max_total_wait: Duration::from_millis(1_500),
    }
}

fn analyzer(
    store: Arc<dyn TransactionStore>,
    service: Arc<dyn CompletionService>,
    sleeper: Arc<RecordingSleeper>,
) -> Analyzer {
    let client = RetryingCompletionClient::new(service, policy(), Duration::from_secs(2))
        .with_sleeper(sleeper)
        .with_jitter(Arc::new(FixedJitter(1.0)));
    Analyzer::new(store, client, &AppConfig::default().pipeline)
}

/// Hangs past the attempt timeout for the first `slow_calls` calls.
struct SlowThenReady {
    calls: AtomicUsize,
    slow_calls: usize,
    answers: Vec<String>,
}

#[async_trait]
impl CompletionService for SlowThenReady {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.slow_calls {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(self.answers[call.min(self.answers.len() - 1)].clone())
    }

    fn model(&self) -> &str {
        "slow-then-ready"
    }
}

#[tokio::test]
async fn three_transactions_are_listed_without_truncation() {
    let set = store().await.fetch("C12345").await.unwrap();
    let text = TransactionFormatter::new(50).format(&set);

    assert_eq!(text.lines().filter(|l| l.contains("counterparty:")).count(), 3);
    assert!(!text.contains(TRUNCATION_MARKER));

    let service = Arc::new(ScriptedCompletionService::always(SIX_QUESTIONS_MEDIUM));
    let analyzer = analyzer(store().await, service.clone(), Arc::new(RecordingSleeper::new()));
    assert_ok!(analyzer.analyze("C12345", &CancellationToken::new()).await);
    assert!(service.prompts()[0].contains(&text));
}

#[tokio::test]
async fn unknown_customer_never_reaches_completion_service() {
    let service = Arc::new(ScriptedCompletionService::always(SIX_QUESTIONS_MEDIUM));
    let analyzer = analyzer(store().await, service.clone(), Arc::new(RecordingSleeper::new()));

    let err = assert_err!(analyzer.analyze("C99999", &CancellationToken::new()).await);

    assert!(matches!(err, AnalysisError::CustomerNotFound(ref id) if id == "C99999"));
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn existing_customer_without_activity_is_analyzed() {
    let service = Arc::new(ScriptedCompletionService::always(SIX_QUESTIONS_MEDIUM));
    let analyzer = analyzer(store().await, service.clone(), Arc::new(RecordingSleeper::new()));

    assert_ok!(analyzer.analyze("C00000", &CancellationToken::new()).await);
    assert!(service.prompts()[0].contains(NO_ACTIVITY_MARKER));
}

#[tokio::test]
async fn well_formed_response_yields_result() {
    let service = Arc::new(ScriptedCompletionService::always(SIX_QUESTIONS_MEDIUM));
    let analyzer = analyzer(store().await, service, Arc::new(RecordingSleeper::new()));

    let result = assert_ok!(analyzer.analyze("C12345", &CancellationToken::new()).await);

    assert!(result.summary().starts_with("A new device initiated"));
    assert_eq!(result.questions().len(), 6);
    assert_eq!(result.risk_level(), RiskLevel::Medium);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["risk_level"], "Medium");
    assert_eq!(json.as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn four_questions_fail_as_malformed() {
    let service = Arc::new(ScriptedCompletionService::always(FOUR_QUESTIONS_FREE_TEXT));
    let analyzer = analyzer(store().await, service.clone(), Arc::new(RecordingSleeper::new()));

    let err = assert_err!(analyzer.analyze("C12345", &CancellationToken::new()).await);

    assert_eq!(err.raw_response(), Some(FOUR_QUESTIONS_FREE_TEXT));
    assert!(!err.is_retryable());
    // A bad answer is not a transient failure.
    assert_eq!(service.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn two_timeouts_then_success_returns_third_answer() {
    let service = Arc::new(SlowThenReady {
        calls: AtomicUsize::new(0),
        slow_calls: 2,
        answers: vec![
            "never delivered".to_string(),
            "never delivered".to_string(),
            SIX_QUESTIONS_MEDIUM.to_string(),
        ],
    });
    let sleeper = Arc::new(RecordingSleeper::new());
    let analyzer = analyzer(store().await, service.clone(), sleeper.clone());

    let result = assert_ok!(analyzer.analyze("C12345", &CancellationToken::new()).await);

    assert_eq!(result.risk_level(), RiskLevel::Medium);
    assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_millis(200), Duration::from_millis(400)]
    );
}

#[tokio::test]
async fn always_transient_failure_respects_attempt_and_wait_caps() {
    let service = Arc::new(ScriptedCompletionService::new(vec![Err(
        CompletionError::RateLimited { retry_after: None },
    )]));
    let sleeper = Arc::new(RecordingSleeper::new());
    let analyzer = analyzer(store().await, service.clone(), sleeper.clone());

    let err = assert_err!(analyzer.analyze("C12345", &CancellationToken::new()).await);

    assert!(matches!(err, AnalysisError::RateLimited(_)));
    assert!(err.is_retryable());
    assert_eq!(service.calls(), policy().max_attempts as usize);
    assert!(sleeper.total() <= policy().max_total_wait);
}

#[tokio::test]
async fn concurrent_requests_run_independently() {
    let service = Arc::new(ScriptedCompletionService::always(SIX_QUESTIONS_MEDIUM));
    let analyzer = Arc::new(analyzer(
        store().await,
        service.clone(),
        Arc::new(RecordingSleeper::new()),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let analyzer = analyzer.clone();
            tokio::spawn(async move {
                analyzer
                    .analyze("C12345", &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_eq!(service.calls(), 4);
}
