use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{
    BureauError, BureauGateway, BureauOperation, GenerateReply, ReportReply, SearchReply,
    TokenGrant,
};
use crate::workflows::assessment::domain::IdentityRequest;

/// Optional collaborator supplying canned replies when the bureau is
/// unreachable. One accessor per operation; `None` means no canned reply is
/// held for that operation and the original failure propagates.
pub trait FallbackSource: Send + Sync {
    fn token(&self) -> Option<TokenGrant>;
    fn token_validation(&self) -> Option<bool>;
    fn search(&self) -> Option<SearchReply>;
    fn generate_report(&self) -> Option<GenerateReply>;
    fn report(&self) -> Option<ReportReply>;
    fn pdf(&self) -> Option<Vec<u8>>;
}

/// Fixture-backed [`FallbackSource`] loaded from a JSON document at startup.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CannedResponses {
    #[serde(default)]
    pub token: Option<TokenGrant>,
    #[serde(default)]
    pub token_validation: Option<bool>,
    #[serde(default)]
    pub search: Option<SearchReply>,
    #[serde(default)]
    pub generate_report: Option<GenerateReply>,
    #[serde(default)]
    pub report: Option<ReportReply>,
    #[serde(default)]
    pub pdf: Option<Vec<u8>>,
}

#[derive(Debug, thiserror::Error)]
pub enum FallbackLoadError {
    #[error("unable to read fallback fixture {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("fallback fixture {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl CannedResponses {
    pub fn from_path(path: &Path) -> Result<Self, FallbackLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FallbackLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| FallbackLoadError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl FallbackSource for CannedResponses {
    fn token(&self) -> Option<TokenGrant> {
        self.token.clone()
    }

    fn token_validation(&self) -> Option<bool> {
        self.token_validation
    }

    fn search(&self) -> Option<SearchReply> {
        self.search.clone()
    }

    fn generate_report(&self) -> Option<GenerateReply> {
        self.generate_report.clone()
    }

    fn report(&self) -> Option<ReportReply> {
        self.report.clone()
    }

    fn pdf(&self) -> Option<Vec<u8>> {
        self.pdf.clone()
    }
}

/// Decorator applying the degrade-gracefully policy to every gateway call.
///
/// Only connection-class failures are recovered; a well-formed upstream
/// rejection or a malformed payload passes through untouched, so "bureau
/// unreachable" and "bureau said no" stay distinguishable to the caller.
pub struct ResilientGateway<G> {
    inner: G,
    fallback: Option<Arc<dyn FallbackSource>>,
}

impl<G> ResilientGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            fallback: None,
        }
    }

    pub fn with_fallback(inner: G, fallback: Arc<dyn FallbackSource>) -> Self {
        Self {
            inner,
            fallback: Some(fallback),
        }
    }

    fn recover<T>(
        &self,
        operation: BureauOperation,
        err: BureauError,
        pick: impl FnOnce(&dyn FallbackSource) -> Option<T>,
    ) -> Result<T, BureauError> {
        if let Some(source) = &self.fallback {
            if let Some(canned) = pick(source.as_ref()) {
                warn!(
                    operation = operation.label(),
                    error = %err,
                    "bureau unreachable, substituting canned fallback response"
                );
                return Ok(canned);
            }
        }
        Err(err)
    }
}

#[async_trait]
impl<G: BureauGateway> BureauGateway for ResilientGateway<G> {
    async fn issue_token(&self) -> Result<TokenGrant, BureauError> {
        match self.inner.issue_token().await {
            Err(err) if err.is_connection_class() => {
                self.recover(BureauOperation::IssueToken, err, |f| f.token())
            }
            other => other,
        }
    }

    async fn validate_token(&self, token: &str) -> Result<bool, BureauError> {
        match self.inner.validate_token(token).await {
            Err(err) if err.is_connection_class() => {
                self.recover(BureauOperation::ValidateToken, err, |f| f.token_validation())
            }
            other => other,
        }
    }

    async fn search_debtor(
        &self,
        token: &str,
        identity: &IdentityRequest,
    ) -> Result<SearchReply, BureauError> {
        match self.inner.search_debtor(token, identity).await {
            Err(err) if err.is_connection_class() => {
                self.recover(BureauOperation::SearchDebtor, err, |f| f.search())
            }
            other => other,
        }
    }

    async fn generate_report(
        &self,
        token: &str,
        debtor_ref: &str,
    ) -> Result<GenerateReply, BureauError> {
        match self.inner.generate_report(token, debtor_ref).await {
            Err(err) if err.is_connection_class() => {
                self.recover(BureauOperation::GenerateReport, err, |f| f.generate_report())
            }
            other => other,
        }
    }

    async fn fetch_report(&self, token: &str, event_id: &str) -> Result<ReportReply, BureauError> {
        match self.inner.fetch_report(token, event_id).await {
            Err(err) if err.is_connection_class() => {
                self.recover(BureauOperation::FetchReport, err, |f| f.report())
            }
            other => other,
        }
    }

    async fn fetch_report_chunk(
        &self,
        token: &str,
        event_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ReportReply, BureauError> {
        match self
            .inner
            .fetch_report_chunk(token, event_id, page, page_size)
            .await
        {
            Err(err) if err.is_connection_class() => {
                self.recover(BureauOperation::FetchReport, err, |f| f.report())
            }
            other => other,
        }
    }

    async fn fetch_pdf(&self, token: &str, event_id: &str) -> Result<Vec<u8>, BureauError> {
        match self.inner.fetch_pdf(token, event_id).await {
            Err(err) if err.is_connection_class() => {
                self.recover(BureauOperation::DownloadReport, err, |f| f.pdf())
            }
            other => other,
        }
    }
}
