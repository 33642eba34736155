//! Integration scenarios for the end-to-end assessment pipeline.
//!
//! Everything runs against in-memory fakes driven through the public
//! pipeline and router surfaces: a programmable bureau, a memory-backed
//! repository doubling as the freshness store, and a stub scorer standing in
//! for the externally owned comparison function.

mod common {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use credit_pipeline::workflows::assessment::{
        AssessmentPipeline, AssessmentRepository, BureauError, BureauGateway, BureauOperation,
        BureauStatus, CorrelationContext, CreditProfile, FacilitySummary, FreshnessRecord,
        FreshnessStore, GenerateReply, IdentityRequest, IdentityType, PipelineConfig,
        ReportPayload, ReportReply, ReportSubject, RepositoryError, ScoringError, SearchCandidate,
        SearchReply, SimilarityScorer, SimilarityScores, StepRecord, TokenGrant, TokenManager,
        TokenPolicy,
    };

    pub(super) enum SearchBehavior {
        Reply(SearchReply),
        Unreachable,
    }

    pub(super) enum PdfBehavior {
        Bytes(Vec<u8>),
        Unreachable,
    }

    pub(super) struct FakeBureau {
        pub(super) grant: TokenGrant,
        pub(super) search: SearchBehavior,
        pub(super) generate: GenerateReply,
        /// Replies consumed one per poll attempt; once drained,
        /// `report_fallback` is returned indefinitely.
        pub(super) report_script: Mutex<VecDeque<ReportReply>>,
        pub(super) report_fallback: ReportReply,
        pub(super) chunk_script: Mutex<VecDeque<ReportReply>>,
        pub(super) pdf: PdfBehavior,
        pub(super) issue_calls: AtomicU32,
        pub(super) search_calls: AtomicU32,
        pub(super) fetch_calls: AtomicU32,
        pub(super) chunk_calls: AtomicU32,
        pub(super) pdf_calls: AtomicU32,
    }

    impl FakeBureau {
        pub(super) fn upstream_total(&self) -> u32 {
            self.issue_calls.load(Ordering::Relaxed)
                + self.search_calls.load(Ordering::Relaxed)
                + self.fetch_calls.load(Ordering::Relaxed)
                + self.chunk_calls.load(Ordering::Relaxed)
                + self.pdf_calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl BureauGateway for FakeBureau {
        async fn issue_token(&self) -> Result<TokenGrant, BureauError> {
            self.issue_calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.grant.clone())
        }

        async fn validate_token(&self, _token: &str) -> Result<bool, BureauError> {
            Ok(true)
        }

        async fn search_debtor(
            &self,
            _token: &str,
            _identity: &IdentityRequest,
        ) -> Result<SearchReply, BureauError> {
            self.search_calls.fetch_add(1, Ordering::Relaxed);
            match &self.search {
                SearchBehavior::Reply(reply) => Ok(reply.clone()),
                SearchBehavior::Unreachable => Err(BureauError::Unreachable {
                    operation: BureauOperation::SearchDebtor,
                    detail: "connection refused".to_string(),
                }),
            }
        }

        async fn generate_report(
            &self,
            _token: &str,
            _debtor_ref: &str,
        ) -> Result<GenerateReply, BureauError> {
            Ok(self.generate.clone())
        }

        async fn fetch_report(
            &self,
            _token: &str,
            _event_id: &str,
        ) -> Result<ReportReply, BureauError> {
            self.fetch_calls.fetch_add(1, Ordering::Relaxed);
            let scripted = self.report_script.lock().expect("script lock").pop_front();
            Ok(scripted.unwrap_or_else(|| self.report_fallback.clone()))
        }

        async fn fetch_report_chunk(
            &self,
            _token: &str,
            _event_id: &str,
            _page: u32,
            _page_size: u32,
        ) -> Result<ReportReply, BureauError> {
            self.chunk_calls.fetch_add(1, Ordering::Relaxed);
            let scripted = self.chunk_script.lock().expect("script lock").pop_front();
            scripted.ok_or_else(|| BureauError::Malformed {
                operation: BureauOperation::FetchReport,
                detail: "chunk script exhausted".to_string(),
            })
        }

        async fn fetch_pdf(&self, _token: &str, _event_id: &str) -> Result<Vec<u8>, BureauError> {
            self.pdf_calls.fetch_add(1, Ordering::Relaxed);
            match &self.pdf {
                PdfBehavior::Bytes(bytes) => Ok(bytes.clone()),
                PdfBehavior::Unreachable => Err(BureauError::Unreachable {
                    operation: BureauOperation::DownloadReport,
                    detail: "pdf endpoint timed out".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    pub(super) struct MemoryRepository {
        pub(super) bureau_fetched_at: Mutex<Option<DateTime<Utc>>>,
        pub(super) summary_fetched_at: Mutex<Option<DateTime<Utc>>>,
        pub(super) summaries: Mutex<HashMap<String, CreditProfile>>,
        pub(super) searches: Mutex<Vec<(String, SearchReply)>>,
        pub(super) reports: Mutex<HashMap<String, ReportPayload>>,
        pub(super) steps: Mutex<Vec<StepRecord>>,
        pub(super) pdfs: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl FreshnessStore for MemoryRepository {
        async fn bureau_fetch_record(
            &self,
            _identity_type: IdentityType,
            identity_no: &str,
        ) -> Result<Option<FreshnessRecord>, RepositoryError> {
            Ok(self
                .bureau_fetched_at
                .lock()
                .expect("lock")
                .map(|at| FreshnessRecord {
                    identity_no: identity_no.to_string(),
                    last_fetched_at: at,
                }))
        }

        async fn summary_record(
            &self,
            _identity_type: IdentityType,
            identity_no: &str,
        ) -> Result<Option<FreshnessRecord>, RepositoryError> {
            Ok(self
                .summary_fetched_at
                .lock()
                .expect("lock")
                .map(|at| FreshnessRecord {
                    identity_no: identity_no.to_string(),
                    last_fetched_at: at,
                }))
        }
    }

    #[async_trait]
    impl AssessmentRepository for MemoryRepository {
        async fn upsert_search(
            &self,
            _ctx: &CorrelationContext,
            _identity_type: IdentityType,
            identity_no: &str,
            reply: &SearchReply,
        ) -> Result<(), RepositoryError> {
            self.searches
                .lock()
                .expect("lock")
                .push((identity_no.to_string(), reply.clone()));
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
                .expect("lock")
                .insert(event_id.to_string(), payload.clone());
            Ok(())
        }

        async fn upsert_summary(&self, profile: &CreditProfile) -> Result<(), RepositoryError> {
            self.summaries
                .lock()
                .expect("lock")
                .insert(profile.identity_no.clone(), profile.clone());
            Ok(())
        }

        async fn latest_summary(
            &self,
            _identity_type: IdentityType,
            identity_no: &str,
        ) -> Result<Option<CreditProfile>, RepositoryError> {
            Ok(self.summaries.lock().expect("lock").get(identity_no).cloned())
        }

        async fn store_pdf(
            &self,
            _ctx: &CorrelationContext,
            event_id: &str,
            bytes: &[u8],
        ) -> Result<String, RepositoryError> {
            self.pdfs
                .lock()
                .expect("lock")
                .insert(event_id.to_string(), bytes.to_vec());
            Ok(format!("reports/pdf/{event_id}.pdf"))
        }

        async fn record_step(
            &self,
            _ctx: &CorrelationContext,
            step: &StepRecord,
        ) -> Result<(), RepositoryError> {
            self.steps.lock().expect("lock").push(step.clone());
            Ok(())
        }
    }

    pub(super) struct StubScorer {
        pub(super) search_match: bool,
        pub(super) report_match: bool,
    }

    #[async_trait]
    impl SimilarityScorer for StubScorer {
        async fn compare_search(
            &self,
            _identity: &IdentityRequest,
            _candidate: &SearchCandidate,
            _threshold: f64,
        ) -> Result<SimilarityScores, ScoringError> {
            Ok(SimilarityScores {
                is_match: self.search_match,
                name: 0.95,
                mother_name: None,
            })
        }

        async fn compare_report(
            &self,
            _identity: &IdentityRequest,
            _subject: &ReportSubject,
            _name_threshold: f64,
            _mother_threshold: f64,
        ) -> Result<SimilarityScores, ScoringError> {
            Ok(SimilarityScores {
                is_match: self.report_match,
                name: 0.95,
                mother_name: Some(0.9),
            })
        }
    }

    pub(super) fn identity() -> IdentityRequest {
        IdentityRequest {
            identity_type: IdentityType::NationalId,
            identity_no: "1234567890123456".to_string(),
            full_name: "John Doe".to_string(),
            mother_name: Some("Jane Doe".to_string()),
            birth_date: None,
            tolerance_days: Some(30),
        }
    }

    pub(super) fn ctx() -> CorrelationContext {
        CorrelationContext::new("corr-test", "req-test")
    }

    pub(super) fn candidate() -> SearchCandidate {
        SearchCandidate {
            debtor_ref: "D-77".to_string(),
            identity_no: "1234567890123456".to_string(),
            full_name: "JOHN DOE".to_string(),
            mother_name: Some("JANE DOE".to_string()),
            birth_date: None,
        }
    }

    pub(super) fn ready_report() -> ReportReply {
        ReportReply {
            status: BureauStatus::success("report ready"),
            payload: Some(ReportPayload {
                subject: Some(ReportSubject {
                    identity_no: "1234567890123456".to_string(),
                    full_name: "JOHN DOE".to_string(),
                    mother_name: Some("JANE DOE".to_string()),
                    birth_date: None,
                }),
                score: Some("715".to_string()),
                facilities: vec![
                    FacilitySummary {
                        outstanding: 1_200,
                        collectibility: 1,
                    },
                    FacilitySummary {
                        outstanding: 54_000,
                        collectibility: 2,
                    },
                ],
            }),
        }
    }

    pub(super) fn processing_report() -> ReportReply {
        ReportReply {
            status: BureauStatus {
                code: "32".to_string(),
                message: "report in progress".to_string(),
            },
            payload: None,
        }
    }

    pub(super) fn success_bureau() -> FakeBureau {
        FakeBureau {
            grant: TokenGrant {
                token: "bearer-1".to_string(),
                // Day 1 of 2099; far enough out that one grant covers a run.
                expiry_raw: "2099001120000".to_string(),
            },
            search: SearchBehavior::Reply(SearchReply {
                status: BureauStatus::success("one candidate"),
                candidates: vec![candidate()],
            }),
            generate: GenerateReply {
                status: BureauStatus::success("accepted"),
                event_id: "EV-42".to_string(),
            },
            report_script: Mutex::new(VecDeque::from([ready_report()])),
            report_fallback: processing_report(),
            chunk_script: Mutex::new(VecDeque::new()),
            pdf: PdfBehavior::Bytes(b"%PDF-1.7".to_vec()),
            issue_calls: AtomicU32::new(0),
            search_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            chunk_calls: AtomicU32::new(0),
            pdf_calls: AtomicU32::new(0),
        }
    }

    pub(super) fn fast_config() -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::from_millis(1),
            chunk_page_size: 2,
            ..PipelineConfig::default()
        }
    }

    pub(super) fn build_pipeline<G: BureauGateway + 'static>(
        gateway: Arc<G>,
        repository: Arc<MemoryRepository>,
        scorer: StubScorer,
        config: PipelineConfig,
    ) -> AssessmentPipeline<G, StubScorer, MemoryRepository> {
        let tokens = Arc::new(TokenManager::new(gateway.clone(), TokenPolicy::default()));
        AssessmentPipeline::new(gateway, tokens, Arc::new(scorer), repository, config)
    }

    pub(super) fn matching_scorer() -> StubScorer {
        StubScorer {
            search_match: true,
            report_match: true,
        }
    }
}

mod orchestration {
    use super::common::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use credit_pipeline::workflows::assessment::{
        AssessmentError, BureauStatus, ResultSource, SearchReply, StepName, StepStatus,
    };

    #[tokio::test]
    async fn full_pipeline_aggregates_a_profile() {
        let bureau = Arc::new(success_bureau());
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(
            bureau.clone(),
            repository.clone(),
            matching_scorer(),
            fast_config(),
        );

        let result = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("pipeline succeeds");

        assert_eq!(result.source, ResultSource::Bureau);
        assert_eq!(result.profile.score, "715");
        assert!(!result.profile.score.is_empty());
        assert_eq!(result.profile.active_facilities, 2);
        assert_eq!(result.profile.total_outstanding, 55_200);
        assert_eq!(
            result.profile.pdf_path.as_deref(),
            Some("reports/pdf/EV-42.pdf")
        );

        // All nine steps ran and completed.
        assert_eq!(result.steps.len(), 9);
        assert!(result
            .steps
            .iter()
            .all(|step| step.status == StepStatus::Completed));

        // Artifacts and the reusable summary were persisted.
        assert_eq!(repository.searches.lock().expect("lock").len(), 1);
        assert!(repository.reports.lock().expect("lock").contains_key("EV-42"));
        assert!(repository
            .summaries
            .lock()
            .expect("lock")
            .contains_key("1234567890123456"));
    }

    #[tokio::test]
    async fn zero_candidates_is_a_business_rejection() {
        let mut bureau = success_bureau();
        bureau.search = SearchBehavior::Reply(SearchReply {
            status: BureauStatus::success("no hits"),
            candidates: Vec::new(),
        });
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(
            Arc::new(bureau),
            repository.clone(),
            matching_scorer(),
            fast_config(),
        );

        let err = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect_err("empty search aborts");

        match err {
            AssessmentError::Rejected { reason } => {
                assert!(reason.contains("no matching records"));
            }
            other => panic!("expected business rejection, got {other:?}"),
        }

        // The failed step was audited; nothing after it ran.
        let steps = repository.steps.lock().expect("lock").clone();
        let last = steps.last().expect("steps recorded");
        assert_eq!(last.name, StepName::SmartSearch);
        assert_eq!(last.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn search_no_match_rejects_before_report_generation() {
        let bureau = Arc::new(success_bureau());
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(
            bureau.clone(),
            repository,
            StubScorer {
                search_match: false,
                report_match: true,
            },
            fast_config(),
        );

        let err = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect_err("similarity no-match aborts");
        assert!(matches!(err, AssessmentError::Rejected { .. }));
        assert_eq!(bureau.fetch_calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn pdf_failure_never_aborts_the_pipeline() {
        let mut bureau = success_bureau();
        bureau.pdf = PdfBehavior::Unreachable;
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(
            Arc::new(bureau),
            repository,
            matching_scorer(),
            fast_config(),
        );

        let result = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("pipeline still succeeds");

        assert!(result.profile.pdf_path.is_none());
        let pdf_step = result
            .steps
            .iter()
            .find(|step| step.name == StepName::DownloadPdf)
            .expect("pdf step recorded");
        assert_eq!(pdf_step.status, StepStatus::Failed);
        let final_step = result.steps.last().expect("final step");
        assert_eq!(final_step.name, StepName::PersistAndAggregate);
        assert_eq!(final_step.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn polling_times_out_after_the_attempt_budget() {
        let mut bureau = success_bureau();
        bureau.report_script = std::sync::Mutex::new(VecDeque::new());
        let bureau = Arc::new(bureau);
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(
            bureau.clone(),
            repository,
            matching_scorer(),
            fast_config(),
        );

        let err = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect_err("exhausted polling fails");

        match err {
            AssessmentError::System { detail } => assert!(detail.contains("timed out")),
            other => panic!("expected system timeout, got {other:?}"),
        }
        assert_eq!(bureau.fetch_calls.load(std::sync::atomic::Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn polling_exits_on_first_ready_reply() {
        let bureau = Arc::new(success_bureau());
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(
            bureau.clone(),
            repository,
            matching_scorer(),
            fast_config(),
        );

        pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("pipeline succeeds");
        assert_eq!(bureau.fetch_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn paginated_reports_use_the_chunked_path() {
        let mut bureau = success_bureau();

        let full = ready_report();
        let page_one = full.clone();
        let mut page_two = full.clone();
        if let Some(payload) = page_two.payload.as_mut() {
            payload.facilities.truncate(1);
        }

        let mut paginated = full.clone();
        paginated.status = BureauStatus {
            code: "68".to_string(),
            message: "report exceeds single-fetch limit".to_string(),
        };
        paginated.payload = None;
        bureau.report_script = std::sync::Mutex::new(VecDeque::from([paginated]));
        // Page one carries a full page (chunk_page_size = 2), so a second
        // fetch happens; the short second page ends the loop.
        bureau.chunk_script = std::sync::Mutex::new(VecDeque::from([page_one, page_two]));

        let bureau = Arc::new(bureau);
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(
            bureau.clone(),
            repository,
            matching_scorer(),
            fast_config(),
        );

        let result = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("chunked pipeline succeeds");

        assert_eq!(bureau.chunk_calls.load(std::sync::atomic::Ordering::Relaxed), 2);
        assert_eq!(result.profile.active_facilities, 3);
    }
}

mod freshness_short_circuit {
    use super::common::*;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use credit_pipeline::workflows::assessment::{CreditProfile, IdentityType, ResultSource};

    fn cached_profile() -> CreditProfile {
        CreditProfile {
            identity_type: IdentityType::NationalId,
            identity_no: "1234567890123456".to_string(),
            full_name: "John Doe".to_string(),
            score: "702".to_string(),
            active_facilities: 1,
            total_outstanding: 9_000,
            worst_collectibility: Some(1),
            report_event_id: "EV-OLD".to_string(),
            pdf_path: None,
            fetched_at: Utc::now() - Duration::days(3),
        }
    }

    #[tokio::test]
    async fn fresh_cache_with_summary_skips_the_bureau_entirely() {
        let bureau = Arc::new(success_bureau());
        let repository = Arc::new(MemoryRepository::default());
        *repository.summary_fetched_at.lock().expect("lock") =
            Some(Utc::now() - Duration::days(3));
        repository
            .summaries
            .lock()
            .expect("lock")
            .insert("1234567890123456".to_string(), cached_profile());

        let pipeline = build_pipeline(
            bureau.clone(),
            repository,
            matching_scorer(),
            fast_config(),
        );

        let result = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("cached result returned");

        assert_eq!(result.source, ResultSource::Cache);
        assert_eq!(result.profile.score, "702");
        assert_eq!(bureau.upstream_total(), 0);
    }

    #[tokio::test]
    async fn fresh_cache_without_summary_still_runs_the_pipeline() {
        let bureau = Arc::new(success_bureau());
        let repository = Arc::new(MemoryRepository::default());
        *repository.bureau_fetched_at.lock().expect("lock") = Some(Utc::now() - Duration::days(1));

        let pipeline = build_pipeline(
            bureau.clone(),
            repository,
            matching_scorer(),
            fast_config(),
        );

        let result = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("full pipeline ran");
        assert_eq!(result.source, ResultSource::Bureau);
        assert!(bureau.upstream_total() > 0);
    }

    #[tokio::test]
    async fn stale_cache_runs_the_pipeline() {
        let bureau = Arc::new(success_bureau());
        let repository = Arc::new(MemoryRepository::default());
        *repository.summary_fetched_at.lock().expect("lock") =
            Some(Utc::now() - Duration::days(45));
        repository
            .summaries
            .lock()
            .expect("lock")
            .insert("1234567890123456".to_string(), cached_profile());

        let pipeline = build_pipeline(
            bureau.clone(),
            repository,
            matching_scorer(),
            fast_config(),
        );

        let result = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("pipeline refreshed");
        assert_eq!(result.source, ResultSource::Bureau);
        assert_eq!(result.profile.score, "715");
    }
}

mod degradation {
    use super::common::*;
    use std::sync::Arc;

    use credit_pipeline::workflows::assessment::{
        AssessmentError, BureauStatus, CannedResponses, ResilientGateway, SearchReply,
    };

    fn canned_search() -> CannedResponses {
        CannedResponses {
            search: Some(SearchReply {
                status: BureauStatus::success("canned search"),
                candidates: vec![candidate()],
            }),
            ..CannedResponses::default()
        }
    }

    #[tokio::test]
    async fn unreachable_search_is_served_from_the_fallback_source() {
        let mut bureau = success_bureau();
        bureau.search = SearchBehavior::Unreachable;
        let gateway = Arc::new(ResilientGateway::with_fallback(
            bureau,
            Arc::new(canned_search()),
        ));
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(gateway, repository, matching_scorer(), fast_config());

        let result = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect("fallback keeps the pipeline alive");
        assert_eq!(result.profile.score, "715");
    }

    #[tokio::test]
    async fn unreachable_search_without_fallback_surfaces_a_dependency_error() {
        let mut bureau = success_bureau();
        bureau.search = SearchBehavior::Unreachable;
        let gateway = Arc::new(ResilientGateway::new(bureau));
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = build_pipeline(gateway, repository, matching_scorer(), fast_config());

        let err = pipeline
            .assess(&ctx(), &identity())
            .await
            .expect_err("unreachable bureau fails the run");
        assert!(matches!(err, AssessmentError::Upstream { .. }));
    }
}

mod routing {
    use super::common::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use credit_pipeline::workflows::assessment::{assessment_router, BureauStatus, SearchReply};

    fn request_body() -> Body {
        Body::from(
            serde_json::to_vec(&identity()).expect("serialize identity"),
        )
    }

    #[tokio::test]
    async fn post_assessment_returns_the_aggregated_profile() {
        let bureau = Arc::new(success_bureau());
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = Arc::new(build_pipeline(
            bureau,
            repository,
            matching_scorer(),
            fast_config(),
        ));
        let router = assessment_router(pipeline);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/assessments")
                    .header("content-type", "application/json")
                    .header("x-correlation-id", "edge-123")
                    .body(request_body())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["source"], "bureau");
        assert_eq!(payload["profile"]["score"], "715");
        assert_eq!(payload["steps"].as_array().expect("steps").len(), 9);
    }

    #[tokio::test]
    async fn business_rejection_maps_to_unprocessable_entity() {
        let mut bureau = success_bureau();
        bureau.search = SearchBehavior::Reply(SearchReply {
            status: BureauStatus::success("no hits"),
            candidates: Vec::new(),
        });
        let repository = Arc::new(MemoryRepository::default());
        let pipeline = Arc::new(build_pipeline(
            Arc::new(bureau),
            repository,
            matching_scorer(),
            fast_config(),
        ));
        let router = assessment_router(pipeline);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/assessments")
                    .header("content-type", "application/json")
                    .body(request_body())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["rejected"], true);
        assert!(payload["reason"]
            .as_str()
            .expect("reason string")
            .contains("no matching records"));
    }
}
