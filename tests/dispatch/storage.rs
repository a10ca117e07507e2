use crate::common::{dispatcher_with, test_config};
use ancalagon::aggregate::JobStatus;
use ancalagon::io::{IOLimits, LocalStorage, MemoryStorage};
use ancalagon::transport::ScriptedTransport;
use ancalagon::{ErrorKind, Job};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PDF: &[u8] = b"%PDF-1.7\n\
1 0 obj << /Type /Catalog /OpenAction 2 0 R >> endobj\n\
2 0 obj << /S /JavaScript /JS (app.alert('x')) >> endobj\n\
trailer << /Root 1 0 R >>\n%%EOF\n";

#[tokio::test]
async fn local_pipeline_on_a_pdf() {
    let storage = MemoryStorage::new();
    storage.insert("invoice.pdf", PDF);
    let dispatcher = dispatcher_with(test_config(), Arc::new(storage), Arc::new(ScriptedTransport::new()));

    let job = Job::file("invoice.pdf", ["File_Info", "PDF_Info", "PE_Info", "Strings_Info_Classic"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.status, JobStatus::ReportedWithoutFails);
    let pdf = result.report("PDF_Info").unwrap();
    assert!(pdf.success(), "{:?}", pdf.errors());
    assert_eq!(pdf.payload()["suspicious"], true);
    assert_eq!(result.report("PE_Info").unwrap().error_kind(), Some(ErrorKind::NotApplicable));
    assert_eq!(result.counts.succeeded, 3);
    assert_eq!(result.counts.skipped, 1);
}

#[tokio::test]
async fn reads_from_local_storage() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("uploads")).unwrap();
    std::fs::write(dir.path().join("uploads/invoice.pdf"), PDF).unwrap();
    let storage = LocalStorage::new(dir.path(), IOLimits::default());
    let dispatcher = dispatcher_with(test_config(), Arc::new(storage), Arc::new(ScriptedTransport::new()));

    let job = Job::file("uploads/invoice.pdf", ["StaticInspect", "PDF_Info"]);
    let result = dispatcher.run_job(&job, &CancellationToken::new()).await;

    assert_eq!(result.counts.succeeded, 2);
    assert_eq!(result.report("StaticInspect").unwrap().payload()["size"], PDF.len());
}

#[tokio::test]
async fn references_cannot_escape_the_root() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path(), IOLimits::default());
    let dispatcher = dispatcher_with(test_config(), Arc::new(storage), Arc::new(ScriptedTransport::new()));

    let result = dispatcher
        .run_job(&Job::file("../etc/passwd", ["StaticInspect"]), &CancellationToken::new())
        .await;

    assert_eq!(
        result.report("StaticInspect").unwrap().error_kind(),
        Some(ErrorKind::TargetUnavailable)
    );
}
