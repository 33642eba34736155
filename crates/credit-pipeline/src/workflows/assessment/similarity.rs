use std::sync::Arc;

use async_trait::async_trait;

use super::bureau::{ReportSubject, SearchCandidate};
use super::domain::{IdentityRequest, SimilarityOutcome, SimilarityStatus};

/// Raw result of the externally owned comparison function.
#[derive(Debug, Clone)]
pub struct SimilarityScores {
    pub is_match: bool,
    pub name: f64,
    pub mother_name: Option<f64>,
}

/// Failure classes of the scoring collaborator. Both are system-level
/// conditions, not business no-matches.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("comparison inputs rejected: {0}")]
    InvalidData(String),
    #[error("scoring function unavailable: {0}")]
    Unavailable(String),
}

/// Opaque identity-comparison function; the actual scoring (stored
/// procedures in the reference deployment) lives outside this crate.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    async fn compare_search(
        &self,
        identity: &IdentityRequest,
        candidate: &SearchCandidate,
        threshold: f64,
    ) -> Result<SimilarityScores, ScoringError>;

    async fn compare_report(
        &self,
        identity: &IdentityRequest,
        subject: &ReportSubject,
        name_threshold: f64,
        mother_threshold: f64,
    ) -> Result<SimilarityScores, ScoringError>;
}

/// Normalizes scorer output and failures into a [`SimilarityOutcome`] the
/// orchestrator can branch on without inspecting error types.
pub struct SimilarityGate<S> {
    scorer: Arc<S>,
}

impl<S: SimilarityScorer> SimilarityGate<S> {
    pub fn new(scorer: Arc<S>) -> Self {
        Self { scorer }
    }

    pub async fn validate_search(
        &self,
        identity: &IdentityRequest,
        candidate: &SearchCandidate,
        threshold: f64,
    ) -> SimilarityOutcome {
        match self.scorer.compare_search(identity, candidate, threshold).await {
            Ok(scores) => from_scores(scores, "search candidate"),
            Err(err) => from_error(err),
        }
    }

    pub async fn validate_report(
        &self,
        identity: &IdentityRequest,
        subject: &ReportSubject,
        name_threshold: f64,
        mother_threshold: f64,
    ) -> SimilarityOutcome {
        match self
            .scorer
            .compare_report(identity, subject, name_threshold, mother_threshold)
            .await
        {
            Ok(scores) => from_scores(scores, "report subject"),
            Err(err) => from_error(err),
        }
    }
}

fn from_scores(scores: SimilarityScores, subject: &str) -> SimilarityOutcome {
    let (status, message) = if scores.is_match {
        (
            SimilarityStatus::Success,
            format!("{subject} matches the supplied identity"),
        )
    } else {
        (
            SimilarityStatus::NoMatch,
            format!("{subject} does not match the supplied identity"),
        )
    };

    SimilarityOutcome {
        is_match: scores.is_match,
        name_similarity: scores.name,
        mother_name_similarity: scores.mother_name,
        status,
        message,
    }
}

fn from_error(err: ScoringError) -> SimilarityOutcome {
    let status = match &err {
        ScoringError::InvalidData(_) => SimilarityStatus::InvalidData,
        ScoringError::Unavailable(_) => SimilarityStatus::Unknown,
    };

    SimilarityOutcome {
        is_match: false,
        name_similarity: 0.0,
        mother_name_similarity: None,
        status,
        message: err.to_string(),
    }
}
