//! Target resolution: turn a job descriptor into a shared, read-only target.
//!
//! File jobs are opened through the [`Storage`] collaborator; observable
//! jobs are normalized and classified. Nothing here touches the network.

use crate::core::errors::{AnalyzerError, ErrorKind};
use crate::core::job::{Job, JobTarget};
use crate::core::observable::Observable;
use crate::core::target::Target;
use crate::hashing::{is_hex_digest, md5_digest};
use crate::io::Storage;
use crate::sniff::sniff;
use tracing::{debug, warn};

/// Resolve the job's target, computing the MD5 once for every analyzer.
///
/// A caller-supplied digest is trusted when well-formed; a malformed one is
/// replaced by the computed digest.
pub fn resolve(job: &Job, storage: &dyn Storage) -> Result<Target, AnalyzerError> {
    match &job.target {
        JobTarget::File {
            reference,
            mimetype,
        } => {
            let bytes = storage.open(reference).map_err(|e| {
                warn!(job_id = %job.id, reference = %reference, error = %e, "Target unavailable");
                AnalyzerError::new(ErrorKind::TargetUnavailable, e.to_string())
            })?;
            let md5 = provided_md5(job).unwrap_or_else(|| md5_digest(bytes.data()));
            let mimetype = match mimetype.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
                Some(declared) => declared.to_ascii_lowercase(),
                None => sniff(bytes.data(), Some(bytes.file_name().as_str())).mimetype,
            };
            debug!(
                job_id = %job.id,
                reference = %reference,
                size = bytes.len(),
                mimetype = %mimetype,
                "Resolved file target"
            );
            Ok(Target::file(bytes, md5, mimetype))
        }
        JobTarget::Observable {
            value,
            classification,
        } => {
            let observable = Observable::parse(value, *classification)?;
            let md5 = provided_md5(job).unwrap_or_else(|| md5_digest(observable.value.as_bytes()));
            debug!(
                job_id = %job.id,
                kind = %observable.kind,
                value = %observable.value,
                "Resolved observable target"
            );
            Ok(Target::observable(observable, md5))
        }
    }
}

fn provided_md5(job: &Job) -> Option<String> {
    let md5 = job.md5.as_deref()?.trim().to_ascii_lowercase();
    if is_hex_digest(&md5, 32) {
        Some(md5)
    } else {
        warn!(job_id = %job.id, "Ignoring malformed md5 on job");
        None
    }
}
