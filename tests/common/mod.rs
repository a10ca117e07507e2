//! Common test utilities and helpers.
//!
//! Provides two custom analyzers registered through the dispatcher's factory
//! registry: `StaticInspect`, a deterministic local analyzer, and
//! `SandboxScan`, a remote analyzer driving a scripted sandbox through the
//! poll engine. `Panicking`, `BadCtor` and `Stalling` exercise failure
//! isolation and deadline enforcement.

pub mod sandbox;

use ancalagon::analyzers::{Analyzer, AnalyzerContext, AnalyzerFactory, Services};
use ancalagon::config::OrchestratorConfig;
use ancalagon::core::spec::{AnalyzerKind, AnalyzerSpec, Applicability};
use ancalagon::hashing::sha256_digest;
use ancalagon::io::{MemoryStorage, Storage};
use ancalagon::transport::ScriptedTransport;
use ancalagon::{AnalyzerError, Dispatcher};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub use sandbox::{script_sandbox, status_calls, SandboxFactory, SANDBOX_URL};

/// Sample stored under [`SAMPLE_REF`].
pub const SAMPLE: &[u8] = b"MZ\x90\x00\x03\x00\x00\x00 this program cannot be run in DOS mode http://203.0.113.7/gate.php";
pub const SAMPLE_REF: &str = "uploads/sample.bin";

/// Local analyzer with a payload derived only from the target bytes.
pub struct StaticInspect {
    ctx: AnalyzerContext,
}

#[async_trait]
impl Analyzer for StaticInspect {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let file = self.ctx.file()?;
        Ok(json!({
            "size": file.len(),
            "sha256": sha256_digest(file.data()),
            "starts_with_mz": file.data().starts_with(b"MZ"),
        }))
    }
}

pub struct StaticInspectFactory;

impl AnalyzerFactory for StaticInspectFactory {
    fn build(
        &self,
        ctx: AnalyzerContext,
        _params: &Map<String, Value>,
        _services: &Services,
    ) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        Ok(Box::new(StaticInspect { ctx }))
    }
}

/// Analyzer that panics mid-run.
pub struct Panicking {
    ctx: AnalyzerContext,
}

#[async_trait]
impl Analyzer for Panicking {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        if self.ctx.target.size() > 0 {
            panic!("parser crashed on {}", self.ctx.target.describe());
        }
        Ok(json!(null))
    }
}

pub struct PanickingFactory;

impl AnalyzerFactory for PanickingFactory {
    fn build(
        &self,
        ctx: AnalyzerContext,
        _params: &Map<String, Value>,
        _services: &Services,
    ) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        Ok(Box::new(Panicking { ctx }))
    }
}

/// Factory whose constructor panics.
pub struct BadCtorFactory;

impl AnalyzerFactory for BadCtorFactory {
    fn build(
        &self,
        _ctx: AnalyzerContext,
        _params: &Map<String, Value>,
        _services: &Services,
    ) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        panic!("constructor blew up")
    }
}

/// Local analyzer that blocks its thread without checking any guard.
pub struct Stalling {
    ctx: AnalyzerContext,
}

#[async_trait]
impl Analyzer for Stalling {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        std::thread::sleep(Duration::from_millis(1200));
        Ok(json!({"done": true}))
    }
}

pub struct StallingFactory;

impl AnalyzerFactory for StallingFactory {
    fn build(
        &self,
        ctx: AnalyzerContext,
        _params: &Map<String, Value>,
        _services: &Services,
    ) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        Ok(Box::new(Stalling { ctx }))
    }
}

/// Built-in catalogue plus the test analyzers.
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.analyzers.extend([
        AnalyzerSpec::new(
            "StaticInspect",
            AnalyzerKind::Custom("static_inspect".into()),
            Applicability::files(),
        ),
        AnalyzerSpec::new(
            "SandboxScan",
            AnalyzerKind::Custom("sandbox_scan".into()),
            Applicability::files(),
        )
        .with_network(true)
        .with_params(json!({"max_polls": 3, "poll_interval": 10})),
        AnalyzerSpec::new(
            "SlowSandbox",
            AnalyzerKind::Custom("sandbox_scan".into()),
            Applicability::files(),
        )
        .with_network(true)
        .with_timeout(25)
        .with_params(json!({"max_polls": 10, "poll_interval": 10})),
        AnalyzerSpec::new(
            "Panicking",
            AnalyzerKind::Custom("panicking".into()),
            Applicability::files(),
        ),
        AnalyzerSpec::new(
            "BadCtor",
            AnalyzerKind::Custom("bad_ctor".into()),
            Applicability::files(),
        ),
        AnalyzerSpec::new(
            "Stalling",
            AnalyzerKind::Custom("stalling".into()),
            Applicability::files(),
        )
        .with_timeout(1),
    ]);
    config
}

/// Storage holding [`SAMPLE`].
pub fn sample_storage() -> Arc<MemoryStorage> {
    let storage = MemoryStorage::new();
    storage.insert(SAMPLE_REF, SAMPLE);
    Arc::new(storage)
}

/// Dispatcher over [`test_config`] with every test factory registered.
pub fn dispatcher(transport: Arc<ScriptedTransport>) -> Dispatcher {
    dispatcher_with(test_config(), sample_storage(), transport)
}

pub fn dispatcher_with(
    config: OrchestratorConfig,
    storage: Arc<dyn Storage>,
    transport: Arc<ScriptedTransport>,
) -> Dispatcher {
    Dispatcher::new(config, storage, transport)
        .unwrap()
        .with_factory("static_inspect", Arc::new(StaticInspectFactory))
        .with_factory("sandbox_scan", Arc::new(SandboxFactory))
        .with_factory("panicking", Arc::new(PanickingFactory))
        .with_factory("bad_ctor", Arc::new(BadCtorFactory))
        .with_factory("stalling", Arc::new(StallingFactory))
}
