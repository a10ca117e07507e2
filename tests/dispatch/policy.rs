use crate::common::{dispatcher, script_sandbox, SAMPLE_REF};
use ancalagon::aggregate::JobStatus;
use ancalagon::transport::ScriptedTransport;
use ancalagon::{ErrorKind, Job};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn privacy_blocks_network_analyzers() {
    let transport = Arc::new(ScriptedTransport::new());
    script_sandbox(&transport, &["completed"]);
    let dispatcher = dispatcher(transport.clone());

    let job = Job::file(SAMPLE_REF, ["SandboxScan", "StaticInspect", "Cuckoo_Scan"]).with_privacy(true);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    for name in ["SandboxScan", "Cuckoo_Scan"] {
        let report = result.report(name).unwrap();
        assert_eq!(report.error_kind(), Some(ErrorKind::NotApplicable));
        assert!(report.skipped());
    }
    assert!(result.report("StaticInspect").unwrap().success());
    assert!(transport.calls().is_empty());
    assert_eq!(result.counts.skipped, 2);
    assert_eq!(result.status, JobStatus::ReportedWithoutFails);
}

#[tokio::test]
async fn file_analyzers_skip_observables() {
    let dispatcher = dispatcher(Arc::new(ScriptedTransport::new()));

    let job = Job::observable("203.0.113.7", ["File_Info", "StaticInspect"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.counts.skipped, 2);
    assert!(result
        .reports
        .iter()
        .all(|r| r.error_kind() == Some(ErrorKind::NotApplicable)));
}

#[tokio::test]
async fn unknown_and_duplicate_names() {
    let dispatcher = dispatcher(Arc::new(ScriptedTransport::new()));

    let job = Job::file(SAMPLE_REF, ["StaticInspect", "NoSuchAnalyzer", "StaticInspect"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.counts.requested, 2);
    let unknown = result.report("NoSuchAnalyzer").unwrap();
    assert_eq!(unknown.error_kind(), Some(ErrorKind::InvalidParameters));
    assert!(result.report("StaticInspect").unwrap().success());
    assert_eq!(result.status, JobStatus::ReportedWithFails);
}

#[tokio::test]
async fn missing_file_fails_every_analyzer() {
    let transport = Arc::new(ScriptedTransport::new());
    let dispatcher = dispatcher(transport.clone());

    let job = Job::file("uploads/missing.bin", ["StaticInspect", "File_Info", "SandboxScan"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.reports.len(), 3);
    assert!(result
        .reports
        .iter()
        .all(|r| r.error_kind() == Some(ErrorKind::TargetUnavailable)));
    assert_eq!(result.status, JobStatus::Failed);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn ill_typed_runtime_params_are_rejected() {
    let dispatcher = dispatcher(Arc::new(ScriptedTransport::new()));

    let job = Job::file(SAMPLE_REF, ["Strings_Info_Classic", "StaticInspect"])
        .with_runtime_params("Strings_Info_Classic", serde_json::json!({"min_length": "four"}));
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    let strings = result.report("Strings_Info_Classic").unwrap();
    assert_eq!(strings.error_kind(), Some(ErrorKind::InvalidParameters));
    assert!(result.report("StaticInspect").unwrap().success());
}
