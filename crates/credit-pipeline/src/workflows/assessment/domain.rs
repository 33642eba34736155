use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Kind of identity document the applicant was looked up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    NationalId,
    Passport,
    TaxNumber,
}

impl IdentityType {
    pub fn label(&self) -> &'static str {
        match self {
            IdentityType::NationalId => "national_id",
            IdentityType::Passport => "passport",
            IdentityType::TaxNumber => "tax_number",
        }
    }
}

/// Validated applicant identity driving one assessment run.
///
/// Field validation happens upstream of the pipeline; by the time a request
/// reaches the orchestrator these values are taken at face value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRequest {
    pub identity_type: IdentityType,
    pub identity_no: String,
    pub full_name: String,
    #[serde(default)]
    pub mother_name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Overrides the configured cycle-day tolerance for the freshness gate.
    #[serde(default)]
    pub tolerance_days: Option<i64>,
}

/// Identifiers tying every log line and audit row of one inbound request
/// together. Created once per request and passed by reference through the
/// pipeline; never persisted by the core itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub request_id: String,
}

impl CorrelationContext {
    pub fn new(correlation_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request_id: request_id.into(),
        }
    }
}

/// How the similarity comparison resolved.
///
/// `InvalidData` and `Unknown` are system-level failures of the scoring
/// collaborator, distinct from a legitimate business no-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityStatus {
    Success,
    NoMatch,
    InvalidData,
    Unknown,
}

impl SimilarityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SimilarityStatus::Success => "success",
            SimilarityStatus::NoMatch => "no_match",
            SimilarityStatus::InvalidData => "invalid_data",
            SimilarityStatus::Unknown => "unknown",
        }
    }

    /// True when the gate failed for system reasons rather than ruling the
    /// identities different people.
    pub fn is_system_failure(&self) -> bool {
        matches!(self, SimilarityStatus::InvalidData | SimilarityStatus::Unknown)
    }
}

/// Normalized result of one similarity comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityOutcome {
    pub is_match: bool,
    pub name_similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mother_name_similarity: Option<f64>,
    pub status: SimilarityStatus,
    pub message: String,
}

/// Aggregated output of one successful assessment, also the shape persisted
/// as the reusable summary for the freshness short-circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditProfile {
    pub identity_type: IdentityType,
    pub identity_no: String,
    pub full_name: String,
    pub score: String,
    pub active_facilities: u32,
    pub total_outstanding: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_collectibility: Option<u8>,
    pub report_event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    pub fetched_at: DateTime<Utc>,
}
