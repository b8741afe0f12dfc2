//! Command-line interface.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use retina_models::BackendType;

use crate::config::ServerConfig;
use crate::error::ConfigError;

/// Retinal DR grading HTTP service.
///
/// Flags override the config file; each flag can also be set through the
/// environment variable shown in `--help`.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "retina-server", version, about)]
pub struct Cli {
    /// TOML config file.
    #[arg(short, long, env = "RETINA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind address.
    #[arg(long, env = "RETINA_HOST")]
    pub host: Option<IpAddr>,

    /// Bind port.
    #[arg(short, long, env = "RETINA_PORT")]
    pub port: Option<u16>,

    /// Model checkpoint (.pth, .pt, .bin or .json).
    #[arg(short, long, env = "RETINA_WEIGHTS")]
    pub weights: Option<PathBuf>,

    /// Inference backend (ndarray or wgpu).
    #[arg(short, long, env = "RETINA_BACKEND")]
    pub backend: Option<BackendType>,

    /// Directory served under /static.
    #[arg(long, env = "RETINA_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Origin allowed by CORS.
    #[arg(long, env = "RETINA_ALLOWED_ORIGIN")]
    pub allowed_origin: Option<String>,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "RETINA_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<usize>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "RETINA_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Loads the config file (if any), applies flag overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file can't be read or parsed, or the
    /// merged configuration is invalid.
    pub fn load_config(&self) -> Result<ServerConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    /// Overlays every flag that was given onto `config`.
    #[must_use]
    pub fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(static_dir) = &self.static_dir {
            config.server.static_dir.clone_from(static_dir);
        }
        if let Some(origin) = &self.allowed_origin {
            config.server.allowed_origin.clone_from(origin);
        }
        if let Some(max_upload_bytes) = self.max_upload_bytes {
            config.server.max_upload_bytes = max_upload_bytes;
        }
        if let Some(log_level) = &self.log_level {
            config.server.log_level.clone_from(log_level);
        }
        if let Some(weights) = &self.weights {
            config.model.weights.clone_from(weights);
        }
        if let Some(backend) = self.backend {
            config.model.backend = backend;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn no_flags_keep_config() {
        let config = ServerConfig::default().with_port(9000);
        assert_eq!(Cli::default().apply(config.clone()), config);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "retina-server",
            "--port",
            "8123",
            "--weights",
            "model.bin",
            "--backend",
            "ndarray",
            "--allowed-origin",
            "https://grading.example.org",
        ])
        .unwrap();

        let config = cli.apply(ServerConfig::default().with_port(1));
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.model.weights, PathBuf::from("model.bin"));
        assert_eq!(config.model.backend, BackendType::NdArray);
        assert_eq!(config.server.allowed_origin, "https://grading.example.org");
        assert_eq!(config.server.log_level, "info");
    }

    #[test]
    fn unknown_backend_flag_rejected() {
        assert!(Cli::try_parse_from(["retina-server", "--backend", "tpu"]).is_err());
    }

    #[test]
    fn load_config_merges_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retina.toml");
        std::fs::write(&path, "[server]\nport = 7000\nlog_level = \"debug\"\n").unwrap();

        let cli = Cli {
            config: Some(path),
            log_level: Some("warn".to_string()),
            ..Cli::default()
        };
        let config = cli.load_config().unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.log_level, "warn");
    }

    #[test]
    fn load_config_validates() {
        let cli = Cli {
            max_upload_bytes: Some(0),
            ..Cli::default()
        };
        assert!(matches!(cli.load_config(), Err(ConfigError::Invalid(_))));
    }
}
