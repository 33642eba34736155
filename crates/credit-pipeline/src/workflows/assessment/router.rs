use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;
use tracing::{info_span, Instrument};

use super::bureau::BureauGateway;
use super::domain::{CorrelationContext, IdentityRequest};
use super::pipeline::{AssessmentError, AssessmentPipeline};
use super::repository::{AssessmentRepository, FreshnessStore};
use super::similarity::SimilarityScorer;

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:06}")
}

/// Builds the correlation context for one inbound request: the correlation
/// id is honored from the `x-correlation-id` header when present so an edge
/// gateway can tie its own logs to ours.
fn correlation_from(headers: &HeaderMap) -> CorrelationContext {
    let request_id = next_request_id();
    let correlation_id = headers
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("corr-{request_id}"));
    CorrelationContext::new(correlation_id, request_id)
}

/// Router builder exposing the assessment pipeline over HTTP.
pub fn assessment_router<G, S, R>(pipeline: Arc<AssessmentPipeline<G, S, R>>) -> Router
where
    G: BureauGateway + 'static,
    S: SimilarityScorer + 'static,
    R: AssessmentRepository + FreshnessStore + 'static,
{
    Router::new()
        .route("/api/v1/assessments", post(assess_handler::<G, S, R>))
        .with_state(pipeline)
}

pub(crate) async fn assess_handler<G, S, R>(
    State(pipeline): State<Arc<AssessmentPipeline<G, S, R>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<IdentityRequest>,
) -> Response
where
    G: BureauGateway + 'static,
    S: SimilarityScorer + 'static,
    R: AssessmentRepository + FreshnessStore + 'static,
{
    let ctx = correlation_from(&headers);
    let span = info_span!(
        "assessment",
        correlation_id = ctx.correlation_id.as_str(),
        request_id = ctx.request_id.as_str()
    );

    match pipeline.assess(&ctx, &request).instrument(span).await {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(AssessmentError::Rejected { reason }) => {
            let payload = json!({
                "correlation_id": ctx.correlation_id,
                "rejected": true,
                "reason": reason,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(AssessmentError::Upstream { .. }) => {
            // Dependency failures are surfaced without internal detail.
            let payload = json!({
                "correlation_id": ctx.correlation_id,
                "error": "credit bureau unavailable",
            });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
        Err(AssessmentError::System { .. }) => {
            let payload = json!({
                "correlation_id": ctx.correlation_id,
                "error": "assessment failed",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
