//! End-to-end assessment orchestration.
//!
//! One request is a single sequential chain of async steps; the only
//! intra-request retry is the bounded report poll. Dropping the returned
//! future between poll attempts cancels the run promptly, and every
//! persistence write is an idempotent upsert, so an aborted run leaves no
//! inconsistent state behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::bureau::{
    BureauError, BureauGateway, ReportDisposition, ReportPayload, SearchCandidate, SearchReply,
};
use super::domain::{
    CorrelationContext, CreditProfile, IdentityRequest, SimilarityOutcome, SimilarityStatus,
};
use super::freshness::FreshnessGate;
use super::repository::{AssessmentRepository, FreshnessStore, RepositoryError};
use super::similarity::{SimilarityGate, SimilarityScorer};
use super::token::TokenManager;

/// Pipeline step identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    FreshnessCheck,
    AcquireToken,
    SmartSearch,
    SearchSimilarity,
    GenerateReport,
    PollReport,
    ReportSimilarity,
    DownloadPdf,
    PersistAndAggregate,
}

impl StepName {
    pub fn label(&self) -> &'static str {
        match self {
            StepName::FreshnessCheck => "freshness_check",
            StepName::AcquireToken => "acquire_token",
            StepName::SmartSearch => "smart_search",
            StepName::SearchSimilarity => "search_similarity",
            StepName::GenerateReport => "generate_report",
            StepName::PollReport => "poll_report",
            StepName::ReportSimilarity => "report_similarity",
            StepName::DownloadPdf => "download_pdf",
            StepName::PersistAndAggregate => "persist_and_aggregate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

/// Timing and outcome of one pipeline step, kept for the lifetime of a
/// single request and mirrored into the audit store.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: StepName,
    pub order: u32,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Caller-facing failure taxonomy.
///
/// `Rejected` is an expected business outcome safe to show to the caller;
/// `Upstream` means the bureau could not be reached and no fallback covered
/// the gap; `System` is everything that should page someone.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("assessment rejected: {reason}")]
    Rejected { reason: String },
    #[error("credit bureau unavailable: {detail}")]
    Upstream { detail: String },
    #[error("assessment system failure: {detail}")]
    System { detail: String },
}

impl From<BureauError> for AssessmentError {
    fn from(err: BureauError) -> Self {
        match err {
            BureauError::Unreachable { .. } => AssessmentError::Upstream {
                detail: err.to_string(),
            },
            BureauError::Rejected { .. } => AssessmentError::Rejected {
                reason: err.to_string(),
            },
            BureauError::Malformed { .. } => AssessmentError::System {
                detail: err.to_string(),
            },
        }
    }
}

impl From<RepositoryError> for AssessmentError {
    fn from(err: RepositoryError) -> Self {
        AssessmentError::System {
            detail: err.to_string(),
        }
    }
}

/// Where the returned profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Bureau,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessmentResult {
    pub profile: CreditProfile,
    pub source: ResultSource,
    pub steps: Vec<StepRecord>,
}

/// Tuning for thresholds and the bounded poll loop.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search_threshold: f64,
    pub report_name_threshold: f64,
    pub report_mother_threshold: f64,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub chunk_page_size: u32,
    pub default_tolerance_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_threshold: 0.8,
            report_name_threshold: 0.8,
            report_mother_threshold: 0.7,
            poll_interval: Duration::from_secs(3),
            max_poll_attempts: 10,
            chunk_page_size: 50,
            default_tolerance_days: 30,
        }
    }
}

/// Whether a step failure aborts the run or degrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode {
    Required,
    BestEffort,
}

/// Sequencer bookkeeping: one record per step, started at entry, finalized
/// at exit, logged exactly once at the point of detection, and mirrored to
/// the audit store (audit failures are warnings, never fatal).
struct StepTracker<'a, R> {
    ctx: &'a CorrelationContext,
    repository: &'a R,
    records: Vec<StepRecord>,
}

impl<'a, R: AssessmentRepository> StepTracker<'a, R> {
    fn new(ctx: &'a CorrelationContext, repository: &'a R) -> Self {
        Self {
            ctx,
            repository,
            records: Vec::new(),
        }
    }

    fn begin(&mut self, name: StepName) -> usize {
        let order = self.records.len() as u32 + 1;
        info!(
            correlation_id = self.ctx.correlation_id.as_str(),
            request_id = self.ctx.request_id.as_str(),
            step = name.label(),
            order,
            "step started"
        );
        self.records.push(StepRecord {
            name,
            order,
            status: StepStatus::Started,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            error: None,
        });
        self.records.len() - 1
    }

    async fn complete(&mut self, idx: usize) {
        self.finalize(idx, StepStatus::Completed, None, StepMode::Required)
            .await;
    }

    /// Settles a required step: a failure finalizes the record and aborts
    /// the pipeline with the typed error.
    async fn require<T>(
        &mut self,
        idx: usize,
        result: Result<T, AssessmentError>,
    ) -> Result<T, AssessmentError> {
        match result {
            Ok(value) => {
                self.complete(idx).await;
                Ok(value)
            }
            Err(err) => {
                self.finalize(
                    idx,
                    StepStatus::Failed,
                    Some(err.to_string()),
                    StepMode::Required,
                )
                .await;
                Err(err)
            }
        }
    }

    /// Settles a best-effort step: a failure is downgraded to a warning and
    /// the pipeline continues without the value.
    async fn attempt<T>(&mut self, idx: usize, result: Result<T, AssessmentError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.complete(idx).await;
                Some(value)
            }
            Err(err) => {
                self.finalize(
                    idx,
                    StepStatus::Failed,
                    Some(err.to_string()),
                    StepMode::BestEffort,
                )
                .await;
                None
            }
        }
    }

    async fn finalize(
        &mut self,
        idx: usize,
        status: StepStatus,
        error_summary: Option<String>,
        mode: StepMode,
    ) {
        let ended_at = Utc::now();
        {
            let record = &mut self.records[idx];
            record.status = status;
            record.ended_at = Some(ended_at);
            record.duration_ms = Some((ended_at - record.started_at).num_milliseconds());
            record.error = error_summary;
        }

        let record = self.records[idx].clone();
        match (status, mode) {
            (StepStatus::Failed, StepMode::Required) => error!(
                correlation_id = self.ctx.correlation_id.as_str(),
                request_id = self.ctx.request_id.as_str(),
                step = record.name.label(),
                duration_ms = record.duration_ms,
                error = record.error.as_deref().unwrap_or_default(),
                "step failed"
            ),
            (StepStatus::Failed, StepMode::BestEffort) => warn!(
                correlation_id = self.ctx.correlation_id.as_str(),
                request_id = self.ctx.request_id.as_str(),
                step = record.name.label(),
                duration_ms = record.duration_ms,
                error = record.error.as_deref().unwrap_or_default(),
                "best-effort step degraded, continuing"
            ),
            _ => info!(
                correlation_id = self.ctx.correlation_id.as_str(),
                request_id = self.ctx.request_id.as_str(),
                step = record.name.label(),
                duration_ms = record.duration_ms,
                "step completed"
            ),
        }

        if let Err(err) = self.repository.record_step(self.ctx, &record).await {
            warn!(
                correlation_id = self.ctx.correlation_id.as_str(),
                step = record.name.label(),
                error = %err,
                "step audit row could not be persisted"
            );
        }
    }

    fn into_records(self) -> Vec<StepRecord> {
        self.records
    }
}

/// Converts a gate outcome into the pipeline's failure taxonomy: no-match is
/// a business rejection, invalid-data/unknown are system failures.
fn settle_similarity(outcome: SimilarityOutcome) -> Result<SimilarityOutcome, AssessmentError> {
    match outcome.status {
        SimilarityStatus::Success => Ok(outcome),
        SimilarityStatus::NoMatch => Err(AssessmentError::Rejected {
            reason: outcome.message,
        }),
        SimilarityStatus::InvalidData | SimilarityStatus::Unknown => Err(AssessmentError::System {
            detail: outcome.message,
        }),
    }
}

/// Sequences the full assessment: freshness short-circuit, token acquisition,
/// debtor search, two similarity gates, asynchronous report generation with
/// bounded polling, best-effort PDF download, and final aggregation.
pub struct AssessmentPipeline<G, S, R> {
    gateway: Arc<G>,
    tokens: Arc<TokenManager<G>>,
    similarity: SimilarityGate<S>,
    freshness: FreshnessGate<R>,
    repository: Arc<R>,
    config: PipelineConfig,
}

impl<G, S, R> AssessmentPipeline<G, S, R>
where
    G: BureauGateway,
    S: SimilarityScorer,
    R: AssessmentRepository + FreshnessStore,
{
    pub fn new(
        gateway: Arc<G>,
        tokens: Arc<TokenManager<G>>,
        scorer: Arc<S>,
        repository: Arc<R>,
        config: PipelineConfig,
    ) -> Self {
        let freshness = FreshnessGate::new(repository.clone(), config.default_tolerance_days);
        Self {
            gateway,
            tokens,
            similarity: SimilarityGate::new(scorer),
            freshness,
            repository,
            config,
        }
    }

    pub async fn assess(
        &self,
        ctx: &CorrelationContext,
        request: &IdentityRequest,
    ) -> Result<AssessmentResult, AssessmentError> {
        let mut steps = StepTracker::new(ctx, self.repository.as_ref());

        let idx = steps.begin(StepName::FreshnessCheck);
        if self
            .freshness
            .is_cache_fresh(
                request.identity_type,
                &request.identity_no,
                request.tolerance_days,
            )
            .await
        {
            match self
                .repository
                .latest_summary(request.identity_type, &request.identity_no)
                .await
            {
                Ok(Some(profile)) => {
                    steps.complete(idx).await;
                    info!(
                        correlation_id = ctx.correlation_id.as_str(),
                        "assessment served from cached summary"
                    );
                    return Ok(AssessmentResult {
                        profile,
                        source: ResultSource::Cache,
                        steps: steps.into_records(),
                    });
                }
                // Fresh without data is not a license to skip the pipeline.
                Ok(None) => debug!("cache fresh but no summary persisted, running full pipeline"),
                Err(err) => {
                    warn!(error = %err, "summary lookup failed, running full pipeline")
                }
            }
        }
        steps.complete(idx).await;

        let idx = steps.begin(StepName::AcquireToken);
        let token = steps
            .require(idx, self.tokens.valid_token().await.map_err(Into::into))
            .await?;

        let idx = steps.begin(StepName::SmartSearch);
        let (search_reply, candidate) = steps
            .require(idx, self.run_search(&token, request).await)
            .await?;

        let idx = steps.begin(StepName::SearchSimilarity);
        let outcome = self
            .similarity
            .validate_search(request, &candidate, self.config.search_threshold)
            .await;
        steps.require(idx, settle_similarity(outcome)).await?;

        let idx = steps.begin(StepName::GenerateReport);
        let event_id = steps
            .require(idx, self.run_generate(&token, &candidate).await)
            .await?;

        let idx = steps.begin(StepName::PollReport);
        let payload = steps
            .require(idx, self.poll_report(&token, &event_id).await)
            .await?;

        let idx = steps.begin(StepName::ReportSimilarity);
        steps
            .require(idx, self.gate_report(request, &payload).await)
            .await?;

        let idx = steps.begin(StepName::DownloadPdf);
        let pdf_path = steps
            .attempt(idx, self.download_pdf(ctx, &token, &event_id).await)
            .await;

        let idx = steps.begin(StepName::PersistAndAggregate);
        let profile = steps
            .require(
                idx,
                self.persist_and_aggregate(ctx, request, &search_reply, &payload, &event_id, pdf_path)
                    .await,
            )
            .await?;

        Ok(AssessmentResult {
            profile,
            source: ResultSource::Bureau,
            steps: steps.into_records(),
        })
    }

    async fn run_search(
        &self,
        token: &str,
        request: &IdentityRequest,
    ) -> Result<(SearchReply, SearchCandidate), AssessmentError> {
        let reply = self.gateway.search_debtor(token, request).await?;
        if !reply.status.is_success() {
            return Err(AssessmentError::Rejected {
                reason: format!(
                    "debtor search rejected: [{}] {}",
                    reply.status.code, reply.status.message
                ),
            });
        }

        let candidate = reply.candidates.first().cloned().ok_or_else(|| {
            AssessmentError::Rejected {
                reason: "no matching records found for the supplied identity".to_string(),
            }
        })?;
        Ok((reply, candidate))
    }

    async fn run_generate(
        &self,
        token: &str,
        candidate: &SearchCandidate,
    ) -> Result<String, AssessmentError> {
        let reply = self
            .gateway
            .generate_report(token, &candidate.debtor_ref)
            .await?;
        if !reply.status.is_success() {
            return Err(AssessmentError::Rejected {
                reason: format!(
                    "report generation rejected: [{}] {}",
                    reply.status.code, reply.status.message
                ),
            });
        }
        Ok(reply.event_id)
    }

    /// Bounded poll: fixed interval, fixed attempt budget. Retryable and
    /// fatal dispositions are distinguished by value, never by unwinding.
    async fn poll_report(
        &self,
        token: &str,
        event_id: &str,
    ) -> Result<ReportPayload, AssessmentError> {
        for attempt in 1..=self.config.max_poll_attempts {
            let reply = self.gateway.fetch_report(token, event_id).await?;
            match reply.disposition() {
                ReportDisposition::Ready => {
                    return reply.payload.ok_or_else(|| AssessmentError::System {
                        detail: "report marked ready but payload missing".to_string(),
                    });
                }
                ReportDisposition::Paginated => {
                    debug!(event_id, "large report, switching to chunked download");
                    return self.fetch_chunked(token, event_id).await;
                }
                ReportDisposition::Processing => {
                    debug!(event_id, attempt, "report still processing");
                    if attempt < self.config.max_poll_attempts {
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                }
                ReportDisposition::Rejected { code, message } => {
                    return Err(AssessmentError::Rejected {
                        reason: format!("report fetch rejected: [{code}] {message}"),
                    });
                }
            }
        }

        Err(AssessmentError::System {
            detail: format!(
                "report polling timed out after {} attempts",
                self.config.max_poll_attempts
            ),
        })
    }

    /// Chunked download path for paginated reports: pages are merged until a
    /// short page signals the end.
    async fn fetch_chunked(
        &self,
        token: &str,
        event_id: &str,
    ) -> Result<ReportPayload, AssessmentError> {
        let page_size = self.config.chunk_page_size;
        let mut merged: Option<ReportPayload> = None;
        let mut page = 1u32;

        loop {
            let reply = self
                .gateway
                .fetch_report_chunk(token, event_id, page, page_size)
                .await?;
            if let ReportDisposition::Rejected { code, message } = reply.disposition() {
                return Err(AssessmentError::Rejected {
                    reason: format!("report chunk fetch rejected: [{code}] {message}"),
                });
            }
            let payload = reply.payload.ok_or_else(|| AssessmentError::System {
                detail: format!("report chunk {page} missing payload"),
            })?;

            let batch = payload.facilities.len();
            match merged.as_mut() {
                None => merged = Some(payload),
                Some(base) => base.facilities.extend(payload.facilities),
            }

            if (batch as u32) < page_size {
                break;
            }
            page += 1;
        }

        merged.ok_or_else(|| AssessmentError::System {
            detail: "chunked download produced no payload".to_string(),
        })
    }

    async fn gate_report(
        &self,
        request: &IdentityRequest,
        payload: &ReportPayload,
    ) -> Result<SimilarityOutcome, AssessmentError> {
        let subject = payload.subject.as_ref().ok_or_else(|| AssessmentError::System {
            detail: "report payload missing identity sub-record".to_string(),
        })?;

        let outcome = self
            .similarity
            .validate_report(
                request,
                subject,
                self.config.report_name_threshold,
                self.config.report_mother_threshold,
            )
            .await;
        settle_similarity(outcome)
    }

    async fn download_pdf(
        &self,
        ctx: &CorrelationContext,
        token: &str,
        event_id: &str,
    ) -> Result<String, AssessmentError> {
        let bytes = self.gateway.fetch_pdf(token, event_id).await?;
        let path = self.repository.store_pdf(ctx, event_id, &bytes).await?;
        Ok(path)
    }

    async fn persist_and_aggregate(
        &self,
        ctx: &CorrelationContext,
        request: &IdentityRequest,
        search_reply: &SearchReply,
        payload: &ReportPayload,
        event_id: &str,
        pdf_path: Option<String>,
    ) -> Result<CreditProfile, AssessmentError> {
        self.repository
            .upsert_search(ctx, request.identity_type, &request.identity_no, search_reply)
            .await?;
        self.repository.upsert_report(ctx, event_id, payload).await?;

        let profile = aggregate_profile(request, payload, event_id, pdf_path);
        self.repository.upsert_summary(&profile).await?;
        Ok(profile)
    }
}

fn aggregate_profile(
    request: &IdentityRequest,
    payload: &ReportPayload,
    event_id: &str,
    pdf_path: Option<String>,
) -> CreditProfile {
    CreditProfile {
        identity_type: request.identity_type,
        identity_no: request.identity_no.clone(),
        full_name: request.full_name.clone(),
        score: payload.score.clone().unwrap_or_default(),
        active_facilities: payload.facilities.len() as u32,
        total_outstanding: payload.facilities.iter().map(|f| f.outstanding).sum(),
        worst_collectibility: payload.facilities.iter().map(|f| f.collectibility).max(),
        report_event_id: event_id.to_string(),
        pdf_path,
        fetched_at: Utc::now(),
    }
}
