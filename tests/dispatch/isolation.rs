use crate::common::{dispatcher, script_sandbox, SAMPLE_REF};
use ancalagon::aggregate::JobStatus;
use ancalagon::sink::MemorySink;
use ancalagon::transport::ScriptedTransport;
use ancalagon::{ErrorKind, Job};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn panic_is_contained() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["completed"]);
    let dispatcher = dispatcher(transport);

    let job = Job::file(SAMPLE_REF, ["Panicking", "StaticInspect", "SandboxScan"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.reports.len(), 3);
    let crashed = result.report("Panicking").unwrap();
    assert_eq!(crashed.error_kind(), Some(ErrorKind::InternalError));
    assert!(crashed.errors()[0].contains("parser crashed"));
    assert!(result.report("StaticInspect").unwrap().success());
    assert!(result.report("SandboxScan").unwrap().success());
    assert_eq!(result.status, JobStatus::ReportedWithFails);
    assert_eq!(result.failed_analyzers(), ["Panicking"]);
}

#[tokio::test(start_paused = true)]
async fn constructor_panic_is_contained() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["completed"]);
    let dispatcher = dispatcher(transport);

    let job = Job::file(SAMPLE_REF, ["BadCtor", "StaticInspect", "SandboxScan"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.reports.len(), 3);
    let broken = result.report("BadCtor").unwrap();
    assert_eq!(broken.error_kind(), Some(ErrorKind::InternalError));
    assert!(broken.errors()[0].contains("constructor blew up"));
    assert!(result.report("StaticInspect").unwrap().success());
    assert!(result.report("SandboxScan").unwrap().success());
    assert_eq!(result.failed_analyzers(), ["BadCtor"]);
}

#[tokio::test]
async fn blocking_local_analyzer_overrun_is_a_timeout() {
    let dispatcher = dispatcher(Arc::new(ScriptedTransport::new()));

    let job = Job::file(SAMPLE_REF, ["Stalling", "StaticInspect"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    let stalled = result.report("Stalling").unwrap();
    assert_eq!(stalled.error_kind(), Some(ErrorKind::Timeout));
    assert!(stalled.payload().is_null());
    assert!(result.report("StaticInspect").unwrap().success());
}

#[tokio::test(start_paused = true)]
async fn reports_follow_request_order() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["pending", "completed"]);
    let dispatcher = dispatcher(transport);

    let job = Job::file(SAMPLE_REF, ["SandboxScan", "File_Info", "StaticInspect", "Panicking"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    let names: Vec<&str> = result.reports.iter().map(|r| r.analyzer_name()).collect();
    assert_eq!(names, ["SandboxScan", "File_Info", "StaticInspect", "Panicking"]);
    assert!(result.reports.iter().all(|r| r.job_id() == job.id));
}

#[tokio::test]
async fn local_results_are_deterministic() {
    let job = Job::file(SAMPLE_REF, ["StaticInspect", "File_Info", "Strings_Info_Classic"]);

    let first = dispatcher(Arc::new(ScriptedTransport::new()))
        .run_job(&job, &CancellationToken::new())
        .await;
    let second = dispatcher(Arc::new(ScriptedTransport::new()))
        .run_job(&job, &CancellationToken::new())
        .await;

    assert_eq!(first.status, second.status);
    for (a, b) in first.reports.iter().zip(&second.reports) {
        assert_eq!(a.analyzer_name(), b.analyzer_name());
        assert_eq!(a.success(), b.success());
        assert_eq!(a.payload(), b.payload());
    }
}

#[tokio::test(start_paused = true)]
async fn sink_receives_every_report() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["completed"]);
    let sink = Arc::new(MemorySink::new());
    let dispatcher = dispatcher(transport).with_sink(sink.clone());

    let job = Job::file(SAMPLE_REF, ["StaticInspect", "SandboxScan", "Panicking", "PDF_Info", "Nope"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    let mut emitted: Vec<String> = sink.reports().iter().map(|r| r.analyzer_name().to_string()).collect();
    emitted.sort();
    let mut expected: Vec<String> = result.reports.iter().map(|r| r.analyzer_name().to_string()).collect();
    expected.sort();
    assert_eq!(emitted, expected);
    assert_eq!(emitted.len(), 5);
}
