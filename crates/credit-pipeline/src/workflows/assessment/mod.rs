//! Credit assessment orchestration: drives the multi-step bureau
//! conversation (token, search, report, PDF) behind cache-freshness and
//! identity-similarity gates and returns an aggregated credit profile.

pub mod bureau;
pub mod domain;
pub mod freshness;
pub mod pipeline;
pub mod repository;
pub mod router;
pub mod similarity;
pub mod token;

pub use bureau::{
    fallback::{CannedResponses, FallbackLoadError, FallbackSource, ResilientGateway},
    http::HttpBureauGateway,
    BureauError, BureauGateway, BureauOperation, BureauStatus, FacilitySummary, GenerateReply,
    ReportDisposition, ReportPayload, ReportReply, ReportSubject, SearchCandidate, SearchReply,
    TokenGrant,
};
pub use domain::{
    CorrelationContext, CreditProfile, IdentityRequest, IdentityType, SimilarityOutcome,
    SimilarityStatus,
};
pub use freshness::FreshnessGate;
pub use pipeline::{
    AssessmentError, AssessmentPipeline, AssessmentResult, PipelineConfig, ResultSource,
    StepName, StepRecord, StepStatus,
};
pub use repository::{AssessmentRepository, FreshnessRecord, FreshnessStore, RepositoryError};
pub use router::assessment_router;
pub use similarity::{ScoringError, SimilarityGate, SimilarityScorer, SimilarityScores};
pub use token::{expiry::parse_expiry, TokenCacheEntry, TokenManager, TokenPolicy, TokenStore};
