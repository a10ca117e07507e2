//! Configuration for the orchestrator.
//!
//! Loaded once at process start and read-only afterwards. Every section
//! has defaults, so an empty JSON object is a valid configuration.

use crate::analyzers;
use crate::catalog::AnalyzerCatalog;
use crate::core::spec::AnalyzerSpec;
use crate::error::{AncalagonError, Result};
use crate::io::IOLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Master configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Storage access and limits.
    pub io: IOConfig,
    /// External service endpoints and credentials.
    pub services: ServicesConfig,
    /// Analyzer catalogue; defaults to the built-in set.
    pub analyzers: Vec<AnalyzerSpec>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            io: IOConfig::default(),
            services: ServicesConfig::default(),
            analyzers: AnalyzerCatalog::builtin().into_specs(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            analyzers = config.analyzers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Overlay service endpoints and keys from the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay service settings from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let services = &mut self.services;
        let set = |target: &mut Option<String>, name: &str| {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *target = Some(value);
            }
        };
        set(&mut services.virustotal.api_key, "VT_KEY");
        set(&mut services.intezer.api_key, "INTEZER_KEY");
        set(&mut services.cuckoo.api_key, "CUCKOO_API_KEY");

        for (endpoint, name) in [
            (&mut services.cuckoo, "CUCKOO_URL"),
            (&mut services.peframe, "PEFRAME_URL"),
            (&mut services.thug, "THUG_URL"),
        ] {
            if let Some(url) = lookup(name).filter(|v| !v.is_empty()) {
                endpoint.url = url;
            }
        }
        self
    }

    /// Reject duplicate analyzer names and ill-typed default parameters.
    pub fn validate(&self) -> Result<()> {
        if self.io.max_file_size == 0 {
            return Err(AncalagonError::Config("io.max_file_size must be positive".into()));
        }
        AnalyzerCatalog::from_specs(self.analyzers.clone())?;
        for spec in &self.analyzers {
            analyzers::check_params(spec).map_err(|e| AncalagonError::Config(e.detail))?;
        }
        Ok(())
    }

    /// Build the name-indexed catalogue.
    pub fn catalog(&self) -> Result<AnalyzerCatalog> {
        AnalyzerCatalog::from_specs(self.analyzers.clone())
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IOConfig {
    /// Root directory file references are resolved against.
    pub media_root: PathBuf,
    /// Maximum file size accepted by the resolver (default: 100MB).
    pub max_file_size: u64,
}

impl Default for IOConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            max_file_size: IOLimits::default().max_file_size,
        }
    }
}

impl IOConfig {
    pub fn limits(&self) -> IOLimits {
        IOLimits {
            max_file_size: self.max_file_size,
        }
    }
}

/// One external service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// External service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub cuckoo: ServiceEndpoint,
    pub virustotal: ServiceEndpoint,
    pub intezer: ServiceEndpoint,
    pub peframe: ServiceEndpoint,
    pub thug: ServiceEndpoint,
    /// Per-request HTTP timeout in seconds (default: 30).
    pub request_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            cuckoo: ServiceEndpoint::new("http://cuckoo:8090"),
            virustotal: ServiceEndpoint::new("https://www.virustotal.com/api/v3"),
            intezer: ServiceEndpoint::new("https://analyze.intezer.com/api/v2-0"),
            peframe: ServiceEndpoint::new("http://peframe:4000"),
            thug: ServiceEndpoint::new("http://thug:4001"),
            request_timeout_secs: 30,
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
