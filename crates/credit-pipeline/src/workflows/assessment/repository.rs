use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bureau::{ReportPayload, SearchReply};
use super::domain::{CorrelationContext, CreditProfile, IdentityType};
use super::pipeline::StepRecord;

/// Prior-fetch marker read back for the freshness gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessRecord {
    pub identity_no: String,
    pub last_fetched_at: DateTime<Utc>,
}

/// Persistence error surfaced by any storage collaborator. The relational
/// schema and SQL behind these operations are owned elsewhere; this crate
/// only sees the error envelope.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored payload could not be encoded: {0}")]
    Encoding(String),
}

/// Lookups feeding the freshness gate: two independent prior-fetch records
/// per identity, each under its own timestamp.
#[async_trait]
pub trait FreshnessStore: Send + Sync {
    /// When the raw bureau payload for this identity was last fetched.
    async fn bureau_fetch_record(
        &self,
        identity_type: IdentityType,
        identity_no: &str,
    ) -> Result<Option<FreshnessRecord>, RepositoryError>;

    /// When an aggregated summary for this identity was last computed.
    async fn summary_record(
        &self,
        identity_type: IdentityType,
        identity_no: &str,
    ) -> Result<Option<FreshnessRecord>, RepositoryError>;
}

/// Write-side persistence for assessment artifacts. All writes are
/// idempotent upserts keyed by application/event identifiers, so a retried
/// pipeline run never corrupts state.
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn upsert_search(
        &self,
        ctx: &CorrelationContext,
        identity_type: IdentityType,
        identity_no: &str,
        reply: &SearchReply,
    ) -> Result<(), RepositoryError>;

    async fn upsert_report(
        &self,
        ctx: &CorrelationContext,
        event_id: &str,
        payload: &ReportPayload,
    ) -> Result<(), RepositoryError>;

    async fn upsert_summary(&self, profile: &CreditProfile) -> Result<(), RepositoryError>;

    async fn latest_summary(
        &self,
        identity_type: IdentityType,
        identity_no: &str,
    ) -> Result<Option<CreditProfile>, RepositoryError>;

    /// Stores the downloaded report PDF and returns the stored location.
    async fn store_pdf(
        &self,
        ctx: &CorrelationContext,
        event_id: &str,
        bytes: &[u8],
    ) -> Result<String, RepositoryError>;

    /// Audit row for one pipeline step. Failures here are logged by the
    /// caller and never fail the request.
    async fn record_step(
        &self,
        ctx: &CorrelationContext,
        step: &StepRecord,
    ) -> Result<(), RepositoryError>;
}
