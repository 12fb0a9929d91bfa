//! Error types shared by the service clients and the config layer

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the remote document service.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    #[diagnostic(code(quire::service::transport))]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("document service returned {status}: {message}")]
    #[diagnostic(code(quire::service::api))]
    Api {
        status: u16,
        message: String,
        /// Machine readable status name, e.g. `UNAUTHENTICATED`.
        reason: Option<String>,
    },

    /// The response body did not have the expected shape.
    #[error("failed to decode service response: {0}")]
    #[diagnostic(code(quire::service::decode))]
    Decode(#[from] serde_json::Error),

    /// No access token was configured.
    #[error("no access token configured")]
    #[diagnostic(
        code(quire::service::missing_token),
        help("set `access_token` in the config file or QUIRE_ACCESS_TOKEN")
    )]
    MissingToken,
}

impl ServiceError {
    /// True when the failure means the credential has expired or was revoked.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            ServiceError::Api { status, reason, .. } => {
                *status == 401
                    || *status == 403
                    || reason
                        .as_deref()
                        .is_some_and(|r| r == "UNAUTHENTICATED" || r == "PERMISSION_DENIED")
            }
            ServiceError::MissingToken => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    #[diagnostic(code(quire::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config format: {}", path.display())]
    #[diagnostic(
        code(quire::config::format),
        help("config files must end in .toml or .json")
    )]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid TOML config")]
    #[diagnostic(code(quire::config::toml))]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to serialize config as TOML")]
    #[diagnostic(code(quire::config::toml))]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid JSON config")]
    #[diagnostic(code(quire::config::json))]
    Json(#[from] serde_json::Error),
}
