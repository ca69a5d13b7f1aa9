//! Job orchestration integration tests
//!
//! Drives analysis, multi-analysis and facet jobs through a session wired
//! to a scripted transport and checks both the returned outcome and the
//! request sequence seen by the server.

mod common;

use std::time::Duration;

use common::{API_URL, TestContext, computing};
use serde_json::json;
use squid_client::model::{
    AnalysisModel, FacetModel, JobId, JobStatus, MultiAnalysisModel, Selection,
};
use squid_client::transport::Method;
use squid_client::{JobError, OrchestratorConfig, TokenStore, TransportError};

fn accepted(project: &str, job: &str) -> serde_json::Value {
    json!({
        "id": {"projectId": project, "analysisJobId": job},
        "status": "RUNNING"
    })
}

async fn logged_in() -> TestContext {
    let ctx = TestContext::new("https://app.example.com/").await;
    ctx.session.state().set_access_token("tok");
    ctx
}

#[tokio::test]
async fn analysis_polls_until_results_are_ready() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(Method::POST, "/projects/p1/analysisjobs/", accepted("p1", "j1"))
        .respond(Method::GET, "/analysisjobs/j1/results", computing())
        .respond(
            Method::GET,
            "/analysisjobs/j1/results",
            json!({"results": {"rows": [["FR", 12]]}}),
        );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");

    orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .expect("analysis should complete");

    assert!(analysis.is_done());
    assert_eq!(analysis.job.error(), None);
    assert_eq!(analysis.job.results(), Some(&json!({"rows": [["FR", 12]]})));
    assert_eq!(
        analysis.job.job_id().and_then(|key| key.job_id.clone()),
        Some(JobId::new("j1"))
    );

    let submit = &ctx.transport.requests_to("/analysisjobs/")[0];
    assert_eq!(submit.method, Method::POST);
    assert_eq!(submit.path(), format!("{API_URL}/projects/p1/analysisjobs/"));

    let polls = ctx.transport.requests_to("/results");
    assert_eq!(polls.len(), 2);
    for poll in &polls {
        assert_eq!(poll.query_param("compression"), Some("none"));
        assert_eq!(poll.query_param("format"), Some("json"));
        assert_eq!(poll.query_param("access_token"), Some("tok"));
    }
    assert_eq!(ctx.session.activity().running_count(), 0);
    assert_eq!(ctx.session.activity().status(), Some(JobStatus::Done));
}

#[tokio::test]
async fn finished_submission_is_not_polled() {
    let ctx = logged_in().await;
    ctx.transport.respond(
        Method::POST,
        "/analysisjobs/",
        json!({
            "id": {"projectId": "p1", "analysisJobId": "j2"},
            "status": "DONE",
            "results": {"rows": []}
        }),
    );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");

    orchestrator.compute_analysis(&mut analysis, None).await.unwrap();

    assert_eq!(analysis.job.results(), Some(&json!({"rows": []})));
    assert_eq!(ctx.transport.request_count(), 1);
}

#[tokio::test]
async fn each_computing_answer_costs_one_more_poll() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(Method::POST, "/analysisjobs/", accepted("p1", "j3"));
    for _ in 0..4 {
        ctx.transport
            .respond(Method::GET, "/analysisjobs/j3/results", computing());
    }
    ctx.transport
        .respond(Method::GET, "/analysisjobs/j3/results", json!({"rows": []}));
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");

    orchestrator.compute_analysis(&mut analysis, None).await.unwrap();

    assert_eq!(ctx.transport.requests_to("/results").len(), 5);
    assert_eq!(analysis.job.results(), Some(&json!({"rows": []})));
}

#[tokio::test]
async fn failed_submission_is_recorded_on_the_model() {
    let ctx = logged_in().await;
    ctx.transport.fail(
        Method::POST,
        "/analysisjobs/",
        TransportError::http(500, "Internal Server Error")
            .with_body(json!({"message": "database unavailable"})),
    );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");

    let err = orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::SubmitFailed { .. }));
    assert!(analysis.is_done());
    let error = analysis.job.error().expect("error should be recorded");
    assert_eq!(error.message.as_deref(), Some("database unavailable"));
    assert_eq!(error.status, Some(500));
    assert_eq!(
        ctx.session.activity().last_error().and_then(|e| e.status),
        Some(500)
    );
}

#[tokio::test]
async fn failed_poll_keeps_only_the_status_text() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(Method::POST, "/analysisjobs/", accepted("p1", "j4"))
        .fail(
            Method::GET,
            "/analysisjobs/j4/results",
            TransportError::http(502, "Bad Gateway"),
        );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");

    let err = orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .unwrap_err();

    match err {
        JobError::PollFailed { job_id, source } => {
            assert_eq!(job_id, JobId::new("j4"));
            assert_eq!(source.status, Some(502));
        }
        other => panic!("Expected PollFailed, got: {:?}", other),
    }
    let error = analysis.job.error().unwrap();
    assert_eq!(error.message.as_deref(), Some("Bad Gateway"));
    assert_eq!(error.status, None);
    assert!(analysis.is_done());
}

#[tokio::test]
async fn application_error_ends_the_job() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(Method::POST, "/analysisjobs/", accepted("p1", "j5"))
        .respond(Method::GET, "/analysisjobs/j5/results", computing())
        .respond(
            Method::GET,
            "/analysisjobs/j5/results",
            json!({"apiError": "INVALID_METRIC", "message": "unknown metric m9"}),
        );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");

    let err = orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .unwrap_err();

    let JobError::Application(error) = err else {
        panic!("Expected Application error, got: {:?}", err);
    };
    assert_eq!(error.code.as_deref(), Some("INVALID_METRIC"));
    assert_eq!(analysis.job.error(), Some(&error));
    assert_eq!(analysis.job.results(), None);
}

#[tokio::test]
async fn multi_analysis_reports_the_last_failing_child() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(
            Method::POST,
            "/projects/p1/analysisjobs/",
            json!({
                "id": {"projectId": "p1", "analysisJobId": "a1"},
                "status": "DONE",
                "results": {"rows": [[1]]}
            }),
        )
        .fail(
            Method::POST,
            "/projects/p2/analysisjobs/",
            TransportError::http(400, "Bad Request")
                .with_body(json!({"message": "first failure"})),
        )
        .respond(Method::POST, "/projects/p3/analysisjobs/", accepted("p3", "a3"))
        .respond(
            Method::GET,
            "/projects/p3/analysisjobs/a3/results",
            json!({"apiError": "QUERY_FAILED", "message": "second failure"}),
        );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut multi = MultiAnalysisModel::new(vec![
        AnalysisModel::new("p1"),
        AnalysisModel::new("p2"),
        AnalysisModel::new("p3"),
    ]);

    let err = orchestrator
        .compute_multi_analysis(&mut multi, None)
        .await
        .unwrap_err();

    match err {
        JobError::ChildJobFailed { index, error } => {
            assert_eq!(index, 2);
            assert_eq!(error.message.as_deref(), Some("second failure"));
        }
        other => panic!("Expected ChildJobFailed, got: {:?}", other),
    }
    assert!(multi.is_done());
    assert_eq!(
        multi.error().and_then(|e| e.message.as_deref()),
        Some("second failure")
    );
    assert!(multi.analyses.iter().all(AnalysisModel::is_done));
    assert_eq!(multi.analyses[0].job.results(), Some(&json!({"rows": [[1]]})));
    assert_eq!(
        multi.analyses[1].job.error().and_then(|e| e.message.as_deref()),
        Some("first failure")
    );
}

#[tokio::test]
async fn multi_analysis_without_failures_succeeds() {
    let ctx = logged_in().await;
    for project in ["p1", "p2"] {
        ctx.transport.respond(
            Method::POST,
            &format!("/projects/{project}/analysisjobs/"),
            json!({
                "id": {"projectId": project, "analysisJobId": "a"},
                "status": "DONE",
                "results": {"project": project}
            }),
        );
    }
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut multi = MultiAnalysisModel::new(vec![
        AnalysisModel::new("p1"),
        AnalysisModel::new("p2"),
    ]);

    orchestrator
        .compute_multi_analysis(&mut multi, None)
        .await
        .expect("every analysis succeeds");

    assert!(multi.is_done());
    assert_eq!(multi.error(), None);
    assert_eq!(
        multi.analyses[1].job.results(),
        Some(&json!({"project": "p2"}))
    );
}

#[tokio::test(start_paused = true)]
async fn multi_analysis_waits_for_its_slowest_child() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(
            Method::POST,
            "/projects/p1/analysisjobs/",
            json!({
                "id": {"projectId": "p1", "analysisJobId": "fast"},
                "status": "DONE",
                "results": {"rows": []}
            }),
        )
        .respond(Method::POST, "/projects/p2/analysisjobs/", accepted("p2", "slow"))
        .hang(Method::GET, "/projects/p2/analysisjobs/slow/results");
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut multi = MultiAnalysisModel::new(vec![
        AnalysisModel::new("p1"),
        AnalysisModel::new("p2"),
    ]);

    {
        let computation = orchestrator.compute_multi_analysis(&mut multi, None);
        tokio::pin!(computation);

        let waited =
            tokio::time::timeout(Duration::from_secs(30), &mut computation).await;
        assert!(waited.is_err(), "multi analysis settled before its slow child");
        assert_eq!(ctx.transport.requests_to("/results").len(), 1);
        assert_eq!(ctx.session.activity().running_count(), 1);

        orchestrator.cancellation_token().cancel();
        let err = computation.await.unwrap_err();
        assert!(matches!(err, JobError::ChildJobFailed { index: 1, .. }));
    }

    assert!(multi.is_done());
    assert_eq!(multi.analyses[0].job.results(), Some(&json!({"rows": []})));
    assert!(multi.analyses[1].is_done());
    assert!(multi.analyses[1].job.error().is_some());
    assert_eq!(ctx.session.activity().running_count(), 0);
}

#[tokio::test]
async fn cancelled_orchestrator_stops_before_polling() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(Method::POST, "/analysisjobs/", accepted("p1", "j6"))
        .respond_always(Method::GET, "/analysisjobs/j6/results", computing());
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    orchestrator.cancellation_token().cancel();
    let mut analysis = AnalysisModel::new("p1");

    let err = orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Cancelled));
    assert!(analysis.is_done());
    assert!(analysis.job.error().is_some());
    assert_eq!(ctx.transport.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_hung_poll_releases_the_activity() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(Method::POST, "/analysisjobs/", accepted("p1", "j7"))
        .hang(Method::GET, "/analysisjobs/j7/results");
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let token = orchestrator.cancellation_token().clone();
    let activity = ctx.session.activity().clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(activity.running_count(), 1, "poll should be in flight");
        token.cancel();
    });
    let mut analysis = AnalysisModel::new("p1");

    let err = orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .unwrap_err();
    canceller.await.expect("canceller should not panic");

    assert!(matches!(err, JobError::Cancelled));
    assert_eq!(ctx.session.activity().running_count(), 0);
    assert_eq!(ctx.session.activity().status(), Some(JobStatus::Done));
}

#[tokio::test(start_paused = true)]
async fn poll_delay_spaces_results_requests() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(Method::POST, "/analysisjobs/", accepted("p1", "j8"))
        .respond(Method::GET, "/analysisjobs/j8/results", computing())
        .respond(Method::GET, "/analysisjobs/j8/results", computing())
        .respond(Method::GET, "/analysisjobs/j8/results", json!({"rows": []}));
    let orchestrator = ctx.session.job_orchestrator(
        OrchestratorConfig::default().with_poll_delay(Duration::from_millis(500)),
    );
    let mut analysis = AnalysisModel::new("p1");

    let started = tokio::time::Instant::now();
    orchestrator.compute_analysis(&mut analysis, None).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(ctx.transport.requests_to("/results").len(), 3);
}

#[tokio::test]
async fn facets_replace_the_model_selection() {
    let ctx = logged_in().await;
    ctx.transport
        .respond(
            Method::POST,
            "/projects/p1/facetjobs/",
            json!({"id": {"projectId": "p1", "facetJobId": "f1"}, "status": "RUNNING"}),
        )
        .respond(Method::GET, "/facetjobs/f1/results", computing())
        .respond(
            Method::GET,
            "/facetjobs/f1/results",
            json!({"facets": [
                {"dimension": {"oid": "country"}, "selectedItems": []},
                {"dimension": {"oid": "year"}, "selectedItems": []}
            ]}),
        );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut facets = FacetModel::new("p1");
    facets.user_selection = Some(Selection::default());

    orchestrator
        .compute_facets(&mut facets, None)
        .await
        .expect("facet job should complete");

    assert!(facets.is_done());
    assert!(facets.user_selection.is_none());
    let selection = facets.selection.as_ref().expect("selection is set");
    assert_eq!(selection.facets.len(), 2);
    assert_eq!(selection.facets[0].dimension.oid.as_deref(), Some("country"));
    assert_eq!(facets.job.results().map(Vec::len), Some(2));

    let poll = &ctx.transport.requests_to("/facetjobs/f1/results")[0];
    assert_eq!(poll.query_param("format"), None);
    let submit = &ctx.transport.requests_to("/facetjobs/")[0];
    assert_eq!(submit.method, Method::POST);
}

#[tokio::test]
async fn unauthorized_poll_invalidates_the_session() {
    let ctx = logged_in().await;
    ctx.store
        .write("sq-token_acme", "tok", chrono::Duration::minutes(60))
        .unwrap();
    ctx.transport
        .respond(Method::POST, "/analysisjobs/", accepted("p1", "j9"))
        .fail(
            Method::GET,
            "/analysisjobs/j9/results",
            TransportError::http(401, "Unauthorized"),
        );
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");

    let err = orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::PollFailed { .. }));
    assert_eq!(ctx.session.access_token(), None);
    assert_eq!(ctx.store.read("sq-token_acme").unwrap(), None);
    assert!(analysis.is_done());
}

#[tokio::test]
async fn model_without_project_is_rejected_locally() {
    let ctx = logged_in().await;
    let orchestrator = ctx.session.job_orchestrator(OrchestratorConfig::default());
    let mut analysis = AnalysisModel::new("p1");
    analysis.id.project_id = None;

    let err = orchestrator
        .compute_analysis(&mut analysis, None)
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::MissingProject));
    assert!(analysis.is_done());
    assert_eq!(ctx.transport.request_count(), 0);
}
