use crate::common::{dispatcher, script_sandbox, status_calls, SAMPLE_REF};
use ancalagon::aggregate::JobStatus;
use ancalagon::transport::{Method, ScriptedTransport};
use ancalagon::{ErrorKind, Job};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn sandbox_completes_on_third_poll() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["pending", "pending", "completed"]);
    let dispatcher = dispatcher(transport.clone());

    let job = Job::file(SAMPLE_REF, ["StaticInspect", "SandboxScan"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.status, JobStatus::ReportedWithoutFails);
    assert_eq!(result.counts.succeeded, 2);
    let sandbox = result.report("SandboxScan").unwrap();
    assert_eq!(sandbox.payload()["verdict"], "malicious");
    assert_eq!(status_calls(&transport), 3);
    assert_eq!(transport.count(Method::Post, "http://sandbox.test/submit"), 1);
}

#[tokio::test(start_paused = true)]
async fn runtime_params_shrink_the_poll_budget() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["pending", "pending", "pending"]);
    let dispatcher = dispatcher(transport.clone());

    let job = Job::file(SAMPLE_REF, ["StaticInspect", "SandboxScan"])
        .with_runtime_params("SandboxScan", json!({"max_polls": 2}));
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.status, JobStatus::ReportedWithFails);
    let sandbox = result.report("SandboxScan").unwrap();
    assert_eq!(sandbox.error_kind(), Some(ErrorKind::PollExhausted));
    assert_eq!(status_calls(&transport), 2);
    assert!(result.report("StaticInspect").unwrap().success());
}

#[tokio::test(start_paused = true)]
async fn remote_failure_is_reported() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["pending", "failed"]);
    let dispatcher = dispatcher(transport.clone());

    let result = dispatcher
        .run_job(&Job::file(SAMPLE_REF, ["SandboxScan"]), &CancellationToken::new())
        .await;

    assert_eq!(result.status, JobStatus::Failed);
    let sandbox = result.report("SandboxScan").unwrap();
    assert_eq!(sandbox.error_kind(), Some(ErrorKind::RemoteFailure));
    assert_eq!(status_calls(&transport), 2);
}

#[tokio::test(start_paused = true)]
async fn submit_only_returns_the_submission() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["pending"]);
    let dispatcher = dispatcher(transport.clone());

    let job = Job::file(SAMPLE_REF, ["SandboxScan"])
        .with_runtime_params("SandboxScan", json!({"wait_for_completion": false}));
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    let sandbox = result.report("SandboxScan").unwrap();
    assert!(sandbox.success());
    assert_eq!(sandbox.payload(), &json!({"submission_id": "t-1", "status": "submitted"}));
    assert_eq!(status_calls(&transport), 0);
}

#[tokio::test(start_paused = true)]
async fn builtin_thug_scans_a_domain() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on_json(Method::Post, "http://thug:4001/thug", 200, [json!({"key": "k9"})]);
    transport.on_json(
        Method::Get,
        "http://thug:4001/thug?key=k9",
        200,
        [
            json!({"status": "running"}),
            json!({"status": "success", "report": {"redirects": 2}}),
        ],
    );
    let dispatcher = dispatcher(transport.clone());

    let job = Job::observable("evil.example.com", ["Thug_URL_Info", "VT_v3_Scan"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    let thug = result.report("Thug_URL_Info").unwrap();
    assert!(thug.success(), "{:?}", thug.errors());
    assert_eq!(thug.payload()["redirects"], 2);
    let vt = result.report("VT_v3_Scan").unwrap();
    assert!(vt.skipped());
    assert_eq!(result.status, JobStatus::ReportedWithoutFails);
}

#[tokio::test]
async fn missing_api_key_fails_before_any_call() {
    let transport = Arc::new(ScriptedTransport::new());
    let dispatcher = dispatcher(transport.clone());

    let result = dispatcher
        .run_job(&Job::file(SAMPLE_REF, ["VT_v3_Scan"]), &CancellationToken::new())
        .await;

    let vt = result.report("VT_v3_Scan").unwrap();
    assert_eq!(vt.error_kind(), Some(ErrorKind::InvalidParameters));
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn identical_responses_give_identical_payloads() {
    let mut payloads = Vec::new();
    for _ in 0..2 {
        let transport = Arc::new(ScriptedTransport::new());
        script_sandbox(&transport, &["pending", "completed"]);
        let result = dispatcher(transport)
            .run_job(&Job::file(SAMPLE_REF, ["SandboxScan"]), &CancellationToken::new())
            .await;
        payloads.push(result.report("SandboxScan").unwrap().payload().clone());
    }
    assert_eq!(payloads[0], payloads[1]);
}
