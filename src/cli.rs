//! Pieces shared by the `iomctl` and `iom-schemas` binaries.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::api::{Credentials, FalconClient};
use crate::config::Config;
use crate::error::{IomError, Result};
use crate::workflow::CancelToken;

pub const DEFAULT_CONFIG_FILE: &str = ".iomctl.toml";

/// Backend connection flags. Each falls back to its environment variable.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// API client id
    #[arg(long, env = "FALCON_CLIENT_ID", hide_env_values = true, global = true)]
    pub client_id: Option<String>,

    /// API client secret
    #[arg(long, env = "FALCON_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,

    /// API base URL (overrides `[api] base_url`)
    #[arg(long, env = "FALCON_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Config file path
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config_file: PathBuf,
}

impl ConnectionArgs {
    /// Config file contents with the command-line base URL applied.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config_file)?;
        if let Some(base_url) = &self.base_url {
            config.api.base_url = base_url.clone();
            config.validate()?;
        }
        Ok(config)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok(Credentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => Err(IomError::Config(
                "missing credentials: set FALCON_CLIENT_ID and FALCON_CLIENT_SECRET \
                 or pass --client-id/--client-secret"
                    .into(),
            )),
        }
    }

    pub fn connect(&self, config: &Config) -> Result<FalconClient> {
        FalconClient::new(&config.api, self.credentials()?)
    }
}

/// Log directive for a `-v` count when `RUST_LOG` is unset.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

pub fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// A token that Ctrl-C sets. In-flight requests are allowed to finish.
pub fn interrupt_token() -> CancelToken {
    let token = CancelToken::new();
    let handle = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if !handle.is_cancelled() {
            eprintln!("Interrupted, finishing in-flight work...");
        }
        handle.cancel();
    }) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
    token
}

/// Write the starter config, refusing to replace an existing one without
/// `force`. Returns the process exit code.
pub fn write_starter_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        eprintln!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
        return Ok(1);
    }
    std::fs::write(path, Config::starter_toml())?;
    println!("Created {}", path.display());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConnectionArgs {
        ConnectionArgs {
            client_id: None,
            client_secret: None,
            base_url: None,
            config_file: PathBuf::from("/nonexistent/.iomctl.toml"),
        }
    }

    #[test]
    fn verbosity_raises_log_level() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "info");
        assert_eq!(default_directive(5), "debug");
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let args = ConnectionArgs {
            client_id: Some("id".into()),
            ..args()
        };
        let err = args.credentials().unwrap_err();
        assert!(matches!(err, IomError::Config(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn base_url_flag_overrides_config() {
        let args = ConnectionArgs {
            base_url: Some("https://api.eu-1.crowdstrike.com".into()),
            ..args()
        };
        let config = args.config().unwrap();
        assert_eq!(config.api.base_url, "https://api.eu-1.crowdstrike.com");
    }

    #[test]
    fn invalid_base_url_flag_is_rejected() {
        let args = ConnectionArgs {
            base_url: Some("not a url".into()),
            ..args()
        };
        assert!(matches!(args.config(), Err(IomError::Config(_))));
    }

    #[test]
    fn starter_config_is_not_overwritten_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "# mine\n").unwrap();

        assert_eq!(write_starter_config(&path, false).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");

        assert_eq!(write_starter_config(&path, true).unwrap(), 0);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(toml::from_str::<Config>(&written).is_ok());
    }
}
