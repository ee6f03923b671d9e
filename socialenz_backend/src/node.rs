use crate::api::{self, AppState};
use crate::bootstrap;
use crate::config::SocialenzConfig;
use anyhow::Result;

/// Bootstraps the backend once and hands out the shared application state
/// to whichever entrypoint needs it.
pub struct SocialenzNode {
    state: AppState,
}

impl SocialenzNode {
    /// Creates the data layout, migrates the database and wires the collaborators.
    pub async fn start(config: SocialenzConfig) -> Result<Self> {
        let bootstrap = bootstrap::initialize(&config).await?;
        let state = AppState::new(config, bootstrap.database)?;
        let media_backend = match state.media.local_dir() {
            Some(_) => "local",
            None => "hosted",
        };

        tracing::info!(
            directories_created = ?bootstrap.directories_created,
            database_initialized = bootstrap.database_initialized,
            environment = ?state.config.environment,
            media_backend,
            "socialenz node initialized"
        );

        Ok(Self { state })
    }

    /// Runs the REST API server until shutdown.
    pub async fn run_http_server(&self) -> Result<()> {
        api::serve_http(self.state.clone()).await
    }
}
