//! Analysis orchestrator
//!
//! VALIDATING → FETCHING → FORMATTING → PROMPTING → COMPLETING → PARSING → DONE | FAILED
//!
//! Each request runs the whole pipeline on its own; nothing is cached or
//! shared between requests. The orchestrator never retries a stage itself.
//! Completion retries happen inside `RetryingCompletionClient`.

use crate::completion::RetryingCompletionClient;
use crate::config::PipelineConfig;
use crate::error::AnalysisError;
use crate::formatter::TransactionFormatter;
use crate::models::{AnalysisRequest, AnalysisResult, CustomerSummary, TransactionSet};
use crate::parser::ResponseParser;
use crate::prompt::{fingerprint, PromptBuilder};
use crate::store::{DataSourceInfo, TransactionStore};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    Validating,
    Fetching,
    Formatting,
    Prompting,
    Completing,
    Parsing,
    Done,
    Failed,
}

impl AnalysisStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Validating => "validating",
            AnalysisStage::Fetching => "fetching",
            AnalysisStage::Formatting => "formatting",
            AnalysisStage::Prompting => "prompting",
            AnalysisStage::Completing => "completing",
            AnalysisStage::Parsing => "parsing",
            AnalysisStage::Done => "done",
            AnalysisStage::Failed => "failed",
        }
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main analyzer - composes formatter, prompt builder, completion client and parser
pub struct Analyzer {
    store: Arc<dyn TransactionStore>,
    formatter: TransactionFormatter,
    prompts: PromptBuilder,
    completion: RetryingCompletionClient,
    parser: ResponseParser,
    store_timeout: Duration,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        completion: RetryingCompletionClient,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            formatter: TransactionFormatter::new(config.max_transactions),
            prompts: PromptBuilder::new(config.questions),
            completion,
            parser: ResponseParser::new(config.questions),
            store_timeout: config.store_timeout,
        }
    }

    pub fn model(&self) -> &str {
        self.completion.model()
    }

    /// Backing data description for the info endpoint.
    pub async fn data_info(&self) -> Result<DataSourceInfo> {
        Ok(self.store.info().await?)
    }

    pub async fn analyze(
        &self,
        customer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        self.analyze_with_context(customer_id, None, cancel).await
    }

    /// Like `analyze`, with free-text analyst notes added to the prompt.
    pub async fn analyze_with_context(
        &self,
        customer_id: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let request = match AnalysisRequest::new(customer_id) {
            Ok(request) => request.with_context(context),
            Err(err) => {
                warn!(
                    failed_at = %AnalysisStage::Validating,
                    kind = err.kind(),
                    "Rejected analysis request"
                );
                return Err(err);
            }
        };

        self.run(request, cancel).await
    }

    /// Run a validated request to a terminal state.
    pub async fn run(
        &self,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let started = Instant::now();
        let mut stage = AnalysisStage::Validating;

        info!(
            request_id = %request.request_id,
            customer_id = %request.customer_id(),
            "Starting analysis"
        );

        let outcome = self.run_stages(&request, cancel, &mut stage).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => info!(
                request_id = %request.request_id,
                customer_id = %request.customer_id(),
                stage = %AnalysisStage::Done,
                risk_level = %result.risk_level(),
                questions = result.questions().len(),
                elapsed_ms,
                "Analysis complete"
            ),
            Err(err) => warn!(
                request_id = %request.request_id,
                customer_id = %request.customer_id(),
                stage = %AnalysisStage::Failed,
                failed_at = %stage,
                kind = err.kind(),
                elapsed_ms,
                "Analysis failed: {}",
                err
            ),
        }

        outcome
    }

    async fn run_stages(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
        stage: &mut AnalysisStage,
    ) -> Result<AnalysisResult> {
        *stage = AnalysisStage::Fetching;
        let set = self.fetch(request.customer_id(), cancel).await?;
        debug!(request_id = %request.request_id, transactions = set.len(), "Fetched transactions");

        *stage = AnalysisStage::Formatting;
        let formatted = self.formatter.format(&set);

        *stage = AnalysisStage::Prompting;
        let prompt = self
            .prompts
            .build_with_context(&formatted, request.context());
        debug!(
            request_id = %request.request_id,
            prompt_sha256 = %fingerprint(&prompt),
            prompt_chars = prompt.len(),
            "Built prompt"
        );

        *stage = AnalysisStage::Completing;
        let raw = self.completion.complete(&prompt, cancel).await?;
        debug!(request_id = %request.request_id, raw = %raw, "Completion received");

        *stage = AnalysisStage::Parsing;
        self.parser.parse(&raw)
    }

    /// Store lookup bounded by the store timeout and the cancellation signal.
    async fn fetch(&self, customer_id: &str, cancel: &CancellationToken) -> Result<TransactionSet> {
        let lookup = tokio::time::timeout(self.store_timeout, self.store.fetch(customer_id));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            result = lookup => result,
        };

        match result {
            Ok(fetched) => Ok(fetched?),
            Err(_) => Err(AnalysisError::StoreUnavailable(format!(
                "fetch timed out after {}ms",
                self.store_timeout.as_millis()
            ))),
        }
    }

    /// Aggregate view of one customer's activity, no completion call involved.
    pub async fn customer_summary(
        &self,
        customer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CustomerSummary> {
        let request = AnalysisRequest::new(customer_id)?;
        let set = self.fetch(request.customer_id(), cancel).await?;
        Ok(set.summary())
    }

    pub async fn customers(&self) -> Result<Vec<String>> {
        Ok(self.store.customers().await?)
    }
}
