//! Service configuration.
//!
//! Values come from, in increasing priority: defaults, a TOML file, then
//! command-line flags or `RETINA_*` environment variables (see [`Cli`](crate::Cli)).
//!
//! ```toml
//! [server]
//! port = 8000
//! allowed_origin = "http://localhost:3000"
//!
//! [model]
//! weights = "best_model.pth"
//! backend = "ndarray"
//!
//! [model.architecture]
//! gat_hidden_dim = 256
//! num_heads = 4
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use axum::http::HeaderValue;
use retina_models::{BackendType, EfficientNetGatConfig};
use retina_types::NUM_GRADES;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Default upload limit: 20 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Top-level configuration.
///
/// # Example
///
/// ```
/// use retina_server::ServerConfig;
///
/// let config = ServerConfig::from_toml_str("[server]\nport = 9000\n")?;
/// assert_eq!(config.server.port, 9000);
/// assert_eq!(config.model.weights.to_str(), Some("best_model.pth"));
/// # Ok::<(), retina_server::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listener and request handling.
    pub server: HttpSettings,

    /// Weights and architecture.
    pub model: ModelSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Bind address.
    pub host: IpAddr,

    /// Bind port.
    pub port: u16,

    /// Directory served under `/static`.
    pub static_dir: PathBuf,

    /// The single origin allowed by CORS, with credentials.
    pub allowed_origin: String,

    /// Largest accepted request body.
    pub max_upload_bytes: usize,

    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
            static_dir: PathBuf::from("static"),
            allowed_origin: "http://localhost:3000".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_level: "info".to_string(),
        }
    }
}

/// Model loading settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Checkpoint to load at startup.
    pub weights: PathBuf,

    /// Burn backend to run on.
    pub backend: BackendType,

    /// Hyper-parameters; must match the checkpoint.
    pub architecture: EfficientNetGatConfig,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("best_model.pth"),
            backend: BackendType::default(),
            architecture: EfficientNetGatConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is malformed.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::read(path.display().to_string(), e))?;
        Self::from_toml_str(&text)
    }

    /// Sets the bind port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Sets the weights path.
    #[must_use]
    pub fn with_weights(mut self, weights: impl Into<PathBuf>) -> Self {
        self.model.weights = weights.into();
        self
    }

    /// Sets the static directory.
    #[must_use]
    pub fn with_static_dir(mut self, static_dir: impl Into<PathBuf>) -> Self {
        self.server.static_dir = static_dir.into();
        self
    }

    /// Sets the upload limit.
    #[must_use]
    pub const fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.server.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Sets the model architecture.
    #[must_use]
    pub fn with_architecture(mut self, architecture: EfficientNetGatConfig) -> Self {
        self.model.architecture = architecture;
        self
    }

    /// Address to bind.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    /// CORS origin as a header value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is empty, a wildcard, or
    /// not a valid header value.
    pub fn allowed_origin(&self) -> Result<HeaderValue, ConfigError> {
        let origin = self.server.allowed_origin.trim();
        if origin.is_empty() || origin == "*" {
            return Err(ConfigError::invalid(
                "allowed_origin must name one origin when credentials are allowed",
            ));
        }
        HeaderValue::from_str(origin)
            .map_err(|e| ConfigError::invalid(format!("allowed_origin {origin:?}: {e}")))
    }

    /// Checks every setting that can be checked before loading weights.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.allowed_origin()?;

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::invalid("max_upload_bytes must be > 0"));
        }
        EnvFilter::try_new(&self.server.log_level).map_err(|e| {
            ConfigError::invalid(format!("log_level {:?}: {e}", self.server.log_level))
        })?;

        let architecture = &self.model.architecture;
        if architecture.num_classes != NUM_GRADES {
            return Err(ConfigError::invalid(format!(
                "num_classes must be {NUM_GRADES}, got {}",
                architecture.num_classes
            )));
        }
        architecture
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        self.model
            .backend
            .ensure_available()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;

        Ok(())
    }
}
