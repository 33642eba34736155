use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    BureauError, BureauGateway, BureauOperation, GenerateReply, ReportReply, SearchReply,
    TokenGrant,
};
use crate::workflows::assessment::domain::IdentityRequest;

/// Reqwest-backed bureau client.
///
/// Transport failures and HTTP-layer failures (non-2xx statuses) both map to
/// [`BureauError::Unreachable`]; an application-level refusal arrives as a
/// well-formed body with a rejecting status code and is surfaced by the
/// layers that inspect the reply, never by this client.
pub struct HttpBureauGateway {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBureauGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BureauError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BureauError::Unreachable {
                operation: BureauOperation::IssueToken,
                detail: format!("http client build failed: {err}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: BureauOperation,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, BureauError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_failure(operation, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BureauError::Unreachable {
                operation,
                detail: format!("http status {status}"),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| BureauError::Malformed {
                operation,
                detail: err.to_string(),
            })
    }
}

fn transport_failure(operation: BureauOperation, err: &reqwest::Error) -> BureauError {
    let detail = if err.is_timeout() {
        format!("timeout: {err}")
    } else if err.is_connect() {
        format!("connect failure: {err}")
    } else {
        err.to_string()
    };

    BureauError::Unreachable { operation, detail }
}

#[async_trait]
impl BureauGateway for HttpBureauGateway {
    async fn issue_token(&self) -> Result<TokenGrant, BureauError> {
        self.post_json(BureauOperation::IssueToken, "auth/token", json!({}))
            .await
    }

    async fn validate_token(&self, token: &str) -> Result<bool, BureauError> {
        #[derive(serde::Deserialize)]
        struct ValidationReply {
            valid: bool,
        }

        let reply: ValidationReply = self
            .post_json(
                BureauOperation::ValidateToken,
                "auth/token/validate",
                json!({ "token": token }),
            )
            .await?;
        Ok(reply.valid)
    }

    async fn search_debtor(
        &self,
        token: &str,
        identity: &IdentityRequest,
    ) -> Result<SearchReply, BureauError> {
        self.post_json(
            BureauOperation::SearchDebtor,
            "debtors/search",
            json!({
                "token": token,
                "identity_type": identity.identity_type.label(),
                "identity_no": identity.identity_no,
                "full_name": identity.full_name,
                "birth_date": identity.birth_date,
            }),
        )
        .await
    }

    async fn generate_report(
        &self,
        token: &str,
        debtor_ref: &str,
    ) -> Result<GenerateReply, BureauError> {
        self.post_json(
            BureauOperation::GenerateReport,
            "reports",
            json!({ "token": token, "debtor_ref": debtor_ref }),
        )
        .await
    }

    async fn fetch_report(&self, token: &str, event_id: &str) -> Result<ReportReply, BureauError> {
        self.post_json(
            BureauOperation::FetchReport,
            "reports/fetch",
            json!({ "token": token, "event_id": event_id }),
        )
        .await
    }

    async fn fetch_report_chunk(
        &self,
        token: &str,
        event_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ReportReply, BureauError> {
        self.post_json(
            BureauOperation::FetchReport,
            "reports/fetch-chunk",
            json!({
                "token": token,
                "event_id": event_id,
                "page": page,
                "page_size": page_size,
            }),
        )
        .await
    }

    async fn fetch_pdf(&self, token: &str, event_id: &str) -> Result<Vec<u8>, BureauError> {
        let operation = BureauOperation::DownloadReport;
        let response = self
            .http
            .post(self.endpoint("reports/pdf"))
            .json(&json!({ "token": token, "event_id": event_id }))
            .send()
            .await
            .map_err(|err| transport_failure(operation, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BureauError::Unreachable {
                operation,
                detail: format!("http status {status}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| transport_failure(operation, &err))?;
        Ok(bytes.to_vec())
    }
}
