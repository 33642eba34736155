use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use credit_pipeline::config::AppConfig;
use credit_pipeline::error::AppError;
use credit_pipeline::workflows::assessment::{
    AssessmentPipeline, AssessmentRepository, CannedResponses, CorrelationContext, CreditProfile,
    FreshnessRecord, FreshnessStore, HttpBureauGateway, IdentityType, PipelineConfig,
    ReportPayload, ReportSubject, RepositoryError, ResilientGateway, ScoringError,
    SearchCandidate, SearchReply, SimilarityScorer, SimilarityScores, StepRecord, TokenManager,
    TokenPolicy, IdentityRequest,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiPipeline = AssessmentPipeline<
    ResilientGateway<HttpBureauGateway>,
    LexicalScorer,
    InMemoryAssessmentRepository,
>;

/// Wires the concrete collaborators behind the pipeline: HTTP bureau client,
/// graceful-degradation decorator, token manager, in-memory persistence, and
/// the lexical similarity stand-in.
pub(crate) fn build_pipeline(config: &AppConfig) -> Result<Arc<ApiPipeline>, AppError> {
    let client = HttpBureauGateway::new(
        &config.bureau.base_url,
        StdDuration::from_secs(config.bureau.request_timeout_secs),
    )?;

    let gateway = match &config.bureau.fallback_fixture {
        Some(path) => {
            let canned = CannedResponses::from_path(path)?;
            ResilientGateway::with_fallback(client, Arc::new(canned))
        }
        None => ResilientGateway::new(client),
    };
    let gateway = Arc::new(gateway);

    let policy = TokenPolicy {
        revalidate_buffer: chrono::Duration::minutes(config.assessment.token_revalidate_buffer_mins),
        fallback_ttl: chrono::Duration::minutes(config.assessment.token_fallback_ttl_mins),
    };
    let tokens = Arc::new(TokenManager::new(gateway.clone(), policy));

    let pipeline_config = PipelineConfig {
        search_threshold: config.assessment.search_threshold,
        report_name_threshold: config.assessment.report_name_threshold,
        report_mother_threshold: config.assessment.report_mother_threshold,
        poll_interval: StdDuration::from_secs(config.assessment.poll_interval_secs),
        max_poll_attempts: config.assessment.max_poll_attempts,
        default_tolerance_days: config.assessment.cycle_day_tolerance,
        ..PipelineConfig::default()
    };

    Ok(Arc::new(AssessmentPipeline::new(
        gateway,
        tokens,
        Arc::new(LexicalScorer::default()),
        Arc::new(InMemoryAssessmentRepository::default()),
        pipeline_config,
    )))
}

/// In-memory persistence backing both the repository and freshness seams.
/// Survives for the process lifetime only; a deployment with durability
/// requirements swaps this for a database-backed implementation.
#[derive(Default)]
pub(crate) struct InMemoryAssessmentRepository {
    bureau_fetches: Mutex<HashMap<String, DateTime<Utc>>>,
    summary_fetches: Mutex<HashMap<String, DateTime<Utc>>>,
    summaries: Mutex<HashMap<String, CreditProfile>>,
    searches: Mutex<Vec<(String, SearchReply)>>,
    reports: Mutex<HashMap<String, ReportPayload>>,
    pdfs: Mutex<HashMap<String, Vec<u8>>>,
    steps: Mutex<Vec<StepRecord>>,
}

#[async_trait]
impl FreshnessStore for InMemoryAssessmentRepository {
    async fn bureau_fetch_record(
        &self,
        _identity_type: IdentityType,
        identity_no: &str,
    ) -> Result<Option<FreshnessRecord>, RepositoryError> {
        Ok(self
            .bureau_fetches
            .lock()
            .expect("repository mutex poisoned")
            .get(identity_no)
            .map(|at| FreshnessRecord {
                identity_no: identity_no.to_string(),
                last_fetched_at: *at,
            }))
    }

    async fn summary_record(
        &self,
        _identity_type: IdentityType,
        identity_no: &str,
    ) -> Result<Option<FreshnessRecord>, RepositoryError> {
        Ok(self
            .summary_fetches
            .lock()
            .expect("repository mutex poisoned")
            .get(identity_no)
            .map(|at| FreshnessRecord {
                identity_no: identity_no.to_string(),
                last_fetched_at: *at,
            }))
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryAssessmentRepository {
    async fn upsert_search(
        &self,
        _ctx: &CorrelationContext,
        _identity_type: IdentityType,
        identity_no: &str,
        reply: &SearchReply,
    ) -> Result<(), RepositoryError> {
        self.searches
            .lock()
            .expect("repository mutex poisoned")
            .push((identity_no.to_string(), reply.clone()));
        self.bureau_fetches
            .lock()
            .expect("repository mutex poisoned")
            .insert(identity_no.to_string(), Utc::now());
        Ok(())
    }

    async fn upsert_report(
        &self,
        _ctx: &CorrelationContext,
        event_id: &str,
        payload: &ReportPayload,
    ) -> Result<(), RepositoryError> {
        self.reports
            .lock()
            .expect("repository mutex poisoned")
            .insert(event_id.to_string(), payload.clone());
        Ok(())
    }

    async fn upsert_summary(&self, profile: &CreditProfile) -> Result<(), RepositoryError> {
        self.summary_fetches
            .lock()
            .expect("repository mutex poisoned")
            .insert(profile.identity_no.clone(), profile.fetched_at);
        self.summaries
            .lock()
            .expect("repository mutex poisoned")
            .insert(profile.identity_no.clone(), profile.clone());
        Ok(())
    }

    async fn latest_summary(
        &self,
        _identity_type: IdentityType,
        identity_no: &str,
    ) -> Result<Option<CreditProfile>, RepositoryError> {
        Ok(self
            .summaries
            .lock()
            .expect("repository mutex poisoned")
            .get(identity_no)
            .cloned())
    }

    async fn store_pdf(
        &self,
        _ctx: &CorrelationContext,
        event_id: &str,
        bytes: &[u8],
    ) -> Result<String, RepositoryError> {
        self.pdfs
            .lock()
            .expect("repository mutex poisoned")
            .insert(event_id.to_string(), bytes.to_vec());
        Ok(format!("memory://reports/{event_id}.pdf"))
    }

    async fn record_step(
        &self,
        _ctx: &CorrelationContext,
        step: &StepRecord,
    ) -> Result<(), RepositoryError> {
        self.steps
            .lock()
            .expect("repository mutex poisoned")
            .push(step.clone());
        Ok(())
    }
}

/// Token-overlap comparison over normalized names. Stands in for the
/// externally owned scoring function; good enough for local runs and demos,
/// not a substitute for the production matcher.
#[derive(Default)]
pub(crate) struct LexicalScorer;

fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn token_overlap(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 1.0;
    }

    let left: std::collections::HashSet<&str> = a.split(' ').collect();
    let right: std::collections::HashSet<&str> = b.split(' ').collect();
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

fn require_name(label: &str, value: &str) -> Result<(), ScoringError> {
    if value.trim().is_empty() {
        Err(ScoringError::InvalidData(format!("{label} is empty")))
    } else {
        Ok(())
    }
}

#[async_trait]
impl SimilarityScorer for LexicalScorer {
    async fn compare_search(
        &self,
        identity: &IdentityRequest,
        candidate: &SearchCandidate,
        threshold: f64,
    ) -> Result<SimilarityScores, ScoringError> {
        require_name("applicant name", &identity.full_name)?;
        require_name("candidate name", &candidate.full_name)?;

        let name = token_overlap(&identity.full_name, &candidate.full_name);
        let mother_name = match (&identity.mother_name, &candidate.mother_name) {
            (Some(ours), Some(theirs)) => Some(token_overlap(ours, theirs)),
            _ => None,
        };

        Ok(SimilarityScores {
            is_match: name >= threshold,
            name,
            mother_name,
        })
    }

    async fn compare_report(
        &self,
        identity: &IdentityRequest,
        subject: &ReportSubject,
        name_threshold: f64,
        mother_threshold: f64,
    ) -> Result<SimilarityScores, ScoringError> {
        require_name("applicant name", &identity.full_name)?;
        require_name("report subject name", &subject.full_name)?;

        let name = token_overlap(&identity.full_name, &subject.full_name);
        let mother_name = match (&identity.mother_name, &subject.mother_name) {
            (Some(ours), Some(theirs)) => Some(token_overlap(ours, theirs)),
            _ => None,
        };
        let mother_ok = mother_name.map_or(true, |score| score >= mother_threshold);

        Ok(SimilarityScores {
            is_match: name >= name_threshold && mother_ok,
            name,
            mother_name,
        })
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_identity_type(raw: &str) -> Result<IdentityType, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "national_id" | "nid" => Ok(IdentityType::NationalId),
        "passport" => Ok(IdentityType::Passport),
        "tax_number" | "tax" => Ok(IdentityType::TaxNumber),
        other => Err(format!(
            "unknown identity type '{other}', expected national_id, passport, or tax_number"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, mother: Option<&str>) -> IdentityRequest {
        IdentityRequest {
            identity_type: IdentityType::NationalId,
            identity_no: "1234567890123456".to_string(),
            full_name: name.to_string(),
            mother_name: mother.map(str::to_string),
            birth_date: None,
            tolerance_days: None,
        }
    }

    fn candidate(name: &str) -> SearchCandidate {
        SearchCandidate {
            debtor_ref: "D-1".to_string(),
            identity_no: "1234567890123456".to_string(),
            full_name: name.to_string(),
            mother_name: None,
            birth_date: None,
        }
    }

    #[tokio::test]
    async fn identical_names_score_full_marks_ignoring_case_and_spacing() {
        let scores = LexicalScorer
            .compare_search(&identity("John  Doe", None), &candidate("JOHN DOE"), 0.8)
            .await
            .expect("comparable inputs");
        assert!((scores.name - 1.0).abs() < f64::EPSILON);
        assert!(scores.is_match);
    }

    #[tokio::test]
    async fn partially_overlapping_names_fall_below_the_threshold() {
        let scores = LexicalScorer
            .compare_search(
                &identity("John Doe", None),
                &candidate("John Smith"),
                0.8,
            )
            .await
            .expect("comparable inputs");
        assert!(scores.name < 0.8);
        assert!(!scores.is_match);
    }

    #[tokio::test]
    async fn empty_names_are_invalid_input() {
        let err = LexicalScorer
            .compare_search(&identity("   ", None), &candidate("John Doe"), 0.8)
            .await
            .expect_err("blank name rejected");
        assert!(matches!(err, ScoringError::InvalidData(_)));
    }

    #[tokio::test]
    async fn mother_name_mismatch_blocks_a_report_match() {
        let subject = ReportSubject {
            identity_no: "1234567890123456".to_string(),
            full_name: "JOHN DOE".to_string(),
            mother_name: Some("MARY SMITH".to_string()),
            birth_date: None,
        };
        let scores = LexicalScorer
            .compare_report(&identity("John Doe", Some("Jane Doe")), &subject, 0.8, 0.7)
            .await
            .expect("comparable inputs");
        assert!(!scores.is_match);
    }

    #[tokio::test]
    async fn repository_summary_upsert_updates_freshness_stamp() {
        let repository = InMemoryAssessmentRepository::default();
        let profile = CreditProfile {
            identity_type: IdentityType::NationalId,
            identity_no: "1234567890123456".to_string(),
            full_name: "John Doe".to_string(),
            score: "715".to_string(),
            active_facilities: 1,
            total_outstanding: 1_000,
            worst_collectibility: Some(1),
            report_event_id: "EV-1".to_string(),
            pdf_path: None,
            fetched_at: Utc::now(),
        };

        repository
            .upsert_summary(&profile)
            .await
            .expect("summary stored");

        let stored = repository
            .latest_summary(IdentityType::NationalId, "1234567890123456")
            .await
            .expect("lookup works")
            .expect("summary present");
        assert_eq!(stored.score, "715");

        let record = repository
            .summary_record(IdentityType::NationalId, "1234567890123456")
            .await
            .expect("record lookup works")
            .expect("stamp present");
        assert_eq!(record.last_fetched_at, profile.fetched_at);
    }

    #[test]
    fn identity_type_parsing_accepts_aliases() {
        assert_eq!(
            parse_identity_type("National_ID").expect("parses"),
            IdentityType::NationalId
        );
        assert_eq!(parse_identity_type("tax").expect("parses"), IdentityType::TaxNumber);
        assert!(parse_identity_type("driver_license").is_err());
    }
}
