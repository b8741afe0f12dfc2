//! HTTP service grading retinal fundus images for diabetic retinopathy.
//!
//! # Endpoints
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `POST` | `/predict` | Multipart upload -> `{class, class_name, confidence, probabilities, class_names}` |
//! | `GET` | `/` | `{"message": "Retinal DR Classification API"}` |
//! | `GET` | `/health` | `ok` |
//! | `GET` | `/static/*` | Files from the configured static directory |
//!
//! Failed predictions, oversized uploads included, answer `400 {"detail": "..."}`.
//!
//! # Example
//!
//! ```no_run
//! use retina_inference::load_classifier;
//! use retina_server::{AppState, ServerConfig, app};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ServerConfig::default();
//! let classifier = load_classifier(
//!     config.model.backend,
//!     &config.model.architecture,
//!     &config.model.weights,
//! )?;
//! let router = app(AppState::new(classifier), &config)?;
//! let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod cli;
mod config;
mod error;
mod routes;
mod state;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub use cli::Cli;
pub use config::{DEFAULT_MAX_UPLOAD_BYTES, HttpSettings, ModelSettings, ServerConfig};
pub use error::{ApiError, ConfigError, ErrorBody};
pub use routes::{GREETING, Greeting, UPLOAD_FIELD};
pub use state::AppState;

/// Builds the router with CORS, body limit, static files and request tracing.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if the allowed origin is unusable.
pub fn app(state: AppState, config: &ServerConfig) -> Result<Router, ConfigError> {
    let settings = &config.server;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([config.allowed_origin()?]))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    if !settings.static_dir.is_dir() {
        warn!(
            dir = %settings.static_dir.display(),
            "static directory missing; /static will return 404"
        );
    }

    Ok(Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/predict", post(routes::predict))
        .nest_service("/static", ServeDir::new(&settings.static_dir))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set.
///
/// # Errors
///
/// Fails if the filter is invalid or a subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}
