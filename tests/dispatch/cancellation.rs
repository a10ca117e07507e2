use crate::common::{dispatcher, script_sandbox, status_calls, SAMPLE_REF};
use ancalagon::aggregate::JobStatus;
use ancalagon::transport::ScriptedTransport;
use ancalagon::{ErrorKind, Job};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_polling() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["pending"]);
    let dispatcher = dispatcher(transport.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        trigger.cancel();
    });

    let job = Job::file(SAMPLE_REF, ["StaticInspect", "SandboxScan"])
        .with_runtime_params("SandboxScan", json!({"max_polls": 10}));
    let result = dispatcher.run_job(&job, &cancel).await;

    assert_eq!(result.status, JobStatus::Killed);
    let sandbox = result.report("SandboxScan").unwrap();
    assert_eq!(sandbox.error_kind(), Some(ErrorKind::Cancelled));
    assert!(result.report("StaticInspect").unwrap().success());
    // polls at 0s, 10s, 20s, 30s and 40s
    assert_eq!(status_calls(&transport), 5);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["completed"]);
    let dispatcher = dispatcher(transport.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = dispatcher
        .run_job(&Job::file(SAMPLE_REF, ["SandboxScan"]), &cancel)
        .await;

    assert_eq!(result.status, JobStatus::Killed);
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_slow_analyzers() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["pending"]);
    let dispatcher = dispatcher(transport.clone());

    let job = Job::file(SAMPLE_REF, ["SlowSandbox", "StaticInspect"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    let slow = result.report("SlowSandbox").unwrap();
    assert_eq!(slow.error_kind(), Some(ErrorKind::Timeout));
    assert!(result.report("StaticInspect").unwrap().success());
    assert_eq!(result.status, JobStatus::ReportedWithFails);
    assert_eq!(status_calls(&transport), 3);
}
