//! Wire shapes and the gateway seam for the credit bureau conversation.
//!
//! Only the fields the pipeline actually steers on are modeled; the bureau's
//! full report schema stays opaque to this crate.

pub mod fallback;
pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::IdentityRequest;

/// Upstream status codes the pipeline branches on.
pub mod status {
    /// Operation accepted / report ready.
    pub const SUCCESS: &str = "00";
    /// Report job still being assembled; retry later.
    pub const REPORT_PROCESSING: &str = "32";
    /// Report too large for a single fetch; switch to the chunked path.
    pub const REPORT_PAGINATED: &str = "68";
}

/// Status envelope every bureau reply carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BureauStatus {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl BureauStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            code: status::SUCCESS.to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == status::SUCCESS
    }
}

/// Credential grant returned by the token-issue operation. `expiry_raw` is
/// the bureau's proprietary timestamp; parsing it is the token manager's
/// problem, not the client's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub expiry_raw: String,
}

/// One debtor record matched by the search operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub debtor_ref: String,
    pub identity_no: String,
    pub full_name: String,
    #[serde(default)]
    pub mother_name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReply {
    pub status: BureauStatus,
    #[serde(default)]
    pub candidates: Vec<SearchCandidate>,
}

/// Acknowledgement of an asynchronous report job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReply {
    pub status: BureauStatus,
    pub event_id: String,
}

/// Identity sub-record inside a finished report; its absence makes the
/// report unusable for the similarity gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSubject {
    pub identity_no: String,
    pub full_name: String,
    #[serde(default)]
    pub mother_name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

/// Per-facility slice of the report used for aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitySummary {
    pub outstanding: i64,
    /// Bureau collectibility grade, 1 (current) through 5 (written off).
    pub collectibility: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    #[serde(default)]
    pub subject: Option<ReportSubject>,
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub facilities: Vec<FacilitySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportReply {
    pub status: BureauStatus,
    #[serde(default)]
    pub payload: Option<ReportPayload>,
}

/// How one poll attempt should be acted on.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportDisposition {
    Ready,
    Processing,
    Paginated,
    Rejected { code: String, message: String },
}

impl ReportReply {
    pub fn disposition(&self) -> ReportDisposition {
        match self.status.code.as_str() {
            status::SUCCESS => ReportDisposition::Ready,
            status::REPORT_PROCESSING => ReportDisposition::Processing,
            status::REPORT_PAGINATED => ReportDisposition::Paginated,
            other => ReportDisposition::Rejected {
                code: other.to_string(),
                message: self.status.message.clone(),
            },
        }
    }
}

/// Names the upstream conversation for logging and fallback selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BureauOperation {
    IssueToken,
    ValidateToken,
    SearchDebtor,
    GenerateReport,
    FetchReport,
    DownloadReport,
}

impl BureauOperation {
    pub fn label(&self) -> &'static str {
        match self {
            BureauOperation::IssueToken => "issue_token",
            BureauOperation::ValidateToken => "validate_token",
            BureauOperation::SearchDebtor => "search_debtor",
            BureauOperation::GenerateReport => "generate_report",
            BureauOperation::FetchReport => "fetch_report",
            BureauOperation::DownloadReport => "download_report",
        }
    }
}

impl fmt::Display for BureauOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure classes for one bureau call.
///
/// `Unreachable` is the connection class (timeout, transport, HTTP-layer
/// failure) the resilience layer may recover from; `Rejected` is a
/// well-formed upstream refusal and is never masked.
#[derive(Debug, thiserror::Error)]
pub enum BureauError {
    #[error("bureau unreachable during {operation}: {detail}")]
    Unreachable {
        operation: BureauOperation,
        detail: String,
    },
    #[error("bureau rejected {operation}: [{code}] {message}")]
    Rejected {
        operation: BureauOperation,
        code: String,
        message: String,
    },
    #[error("malformed bureau payload from {operation}: {detail}")]
    Malformed {
        operation: BureauOperation,
        detail: String,
    },
}

impl BureauError {
    pub fn is_connection_class(&self) -> bool {
        matches!(self, BureauError::Unreachable { .. })
    }
}

/// The five upstream conversations (plus the chunked report path) the
/// pipeline drives. Implementations are stateless request/response mappers;
/// retry, fallback, and caching policies live in the layers above.
#[async_trait]
pub trait BureauGateway: Send + Sync {
    async fn issue_token(&self) -> Result<TokenGrant, BureauError>;

    async fn validate_token(&self, token: &str) -> Result<bool, BureauError>;

    async fn search_debtor(
        &self,
        token: &str,
        identity: &IdentityRequest,
    ) -> Result<SearchReply, BureauError>;

    async fn generate_report(
        &self,
        token: &str,
        debtor_ref: &str,
    ) -> Result<GenerateReply, BureauError>;

    async fn fetch_report(&self, token: &str, event_id: &str) -> Result<ReportReply, BureauError>;

    async fn fetch_report_chunk(
        &self,
        token: &str,
        event_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ReportReply, BureauError>;

    async fn fetch_pdf(&self, token: &str, event_id: &str) -> Result<Vec<u8>, BureauError>;
}
