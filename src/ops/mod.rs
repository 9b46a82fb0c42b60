//! Command drivers. Each public function here backs one CLI subcommand: it
//! composes `workflow`, `api` and `output`, writes the command's JSON
//! artifact, and returns the report so the binary can render it.

pub mod rules;
pub mod schemas;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::api::CspmApi;
use crate::config::{Config, PaginationConfig, ProbeConfig};
use crate::error::Result;
use crate::output::json::write_json;
use crate::workflow::CancelToken;

/// A report together with the file it was saved to.
#[derive(Debug, Clone)]
pub struct Artifact<T> {
    pub value: T,
    pub path: PathBuf,
}

impl<T> Artifact<T> {
    pub fn new(value: T, path: PathBuf) -> Self {
        Self { value, path }
    }
}

/// Save `value` as pretty JSON at `path` and wrap it.
pub(crate) fn save<T: Serialize>(path: PathBuf, value: T) -> Result<Artifact<T>> {
    write_json(&path, &value)?;
    tracing::debug!(path = %path.display(), "saved report");
    Ok(Artifact::new(value, path))
}

/// Everything a networked command needs: the backend handle, the tuning
/// knobs from config, the interrupt flag, and where reports go.
pub struct Session<'a> {
    pub api: &'a dyn CspmApi,
    pub pagination: PaginationConfig,
    pub probe: ProbeConfig,
    /// Timeout for side requests made outside the backend client.
    pub timeout: Duration,
    pub cancel: CancelToken,
    pub out_dir: PathBuf,
}

impl<'a> Session<'a> {
    pub fn new(api: &'a dyn CspmApi, config: &Config) -> Self {
        Self {
            api,
            pagination: config.pagination,
            probe: config.probe,
            timeout: config.api.timeout(),
            cancel: CancelToken::new(),
            out_dir: PathBuf::from("."),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    /// Path of a report file in the output directory.
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.out_dir.join(file_name)
    }

    pub(crate) fn save<T: Serialize>(&self, file_name: &str, value: T) -> Result<Artifact<T>> {
        save(self.artifact_path(file_name), value)
    }
}

/// Deployment target label recorded in reconcile reports and report names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn display_path(path: &Path) -> String {
    path.display().to_string()
}
