use anyhow::Result;
use clap::{Parser, Subcommand};
use socialenz_backend::bootstrap;
use socialenz_backend::config::{Environment, SocialenzConfig};
use socialenz_backend::node::SocialenzNode;
use socialenz_backend::telemetry;
use socialenz_backend::utils;

#[derive(Parser)]
#[command(author, version, about = "Socialenz social network backend")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (Axum) for REST and socket access
    Serve,
    /// Create the data directories and apply database migrations, then exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::print_banner();
    telemetry::init_tracing(Environment::from_env());

    let args = Args::parse();
    let config = SocialenzConfig::from_env()?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let node = SocialenzNode::start(config).await?;
            node.run_http_server().await
        }
        Command::Migrate => {
            let resources = bootstrap::initialize(&config).await?;
            tracing::info!(
                directories_created = ?resources.directories_created,
                database_initialized = resources.database_initialized,
                db_path = %config.paths.db_path.display(),
                "migrations applied"
            );
            Ok(())
        }
    }
}
