// Waypoint trip itinerary planner
// Main entry point for the waypoint binary

use clap::Parser;
use waypoint_engine::cli::{Cli, Command, ConfigAction};
use waypoint_engine::config::Config;
use waypoint_engine::handlers::{
    handle_config_path, handle_config_show, handle_history, handle_plan, handle_show,
    handle_validate, OutputFormat,
};
use waypoint_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(config.core.log_level.as_str());
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Waypoint v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Plan {
            utterance,
            catalog,
            no_save,
        } => {
            tracing::info!("Planning: {}", utterance);
            handle_plan(utterance, &catalog, !no_save, &config, format).await
        }

        Command::Validate { catalog } => {
            tracing::info!("Validating catalog {}", catalog.display());
            handle_validate(&catalog, &config, format).await
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} plans", limit);
            handle_history(limit, &config, format).await
        }

        Command::Show { plan_id } => handle_show(plan_id, &config, format).await,

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Path => handle_config_path(cli.config.as_deref(), format),
        },
    }
}
