use thiserror::Error;

pub type Result<T> = std::result::Result<T, IomError>;

#[derive(Error, Debug)]
pub enum IomError {
    #[error("Validation error in {source_name}: {message}")]
    Validation {
        source_name: String,
        message: String,
    },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IomError {
    pub fn validation(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status to the error class it belongs to.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth { status, message },
            429 | 500 | 502 | 503 | 504 => Self::Transient(format!("HTTP {status}: {message}")),
            _ => Self::Api { status, message },
        }
    }

    /// Whether a retry has any chance of a different result.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => 2,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for IomError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::Transient(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        Self::Http(err.to_string())
    }
}
