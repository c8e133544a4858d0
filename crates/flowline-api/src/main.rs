//! Flowline CLI entry point.
//!
//! Binary name: `flowline`
//!
//! Parses CLI arguments, installs tracing, loads the engine configuration,
//! wires the in-memory stack, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use flowline_infra::config::load_engine_config;
use flowline_observe::tracing_setup::{
    TracingOptions, filter_for_verbosity, init_tracing, shutdown_tracing,
};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowline", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        default_filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        enable_otel: cli.otel,
        json: false,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let outcome = dispatch(cli).await;
    shutdown_tracing();
    outcome
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = load_engine_config(&cli.config).await?;

    match cli.command {
        Commands::Run {
            file,
            data,
            event,
            resume_with,
        } => {
            let mut state = AppState::init(config);
            cli::run::handle_run(
                &mut state,
                &file,
                data.as_deref(),
                event.as_deref(),
                resume_with.as_deref(),
                cli.json,
            )
            .await?;
        }

        Commands::Validate { file } => {
            cli::validate::handle_validate(&file, &config, cli.json)?;
        }

        Commands::Trigger {
            dir,
            trigger_type,
            event,
            data,
        } => {
            let mut state = AppState::init(config);
            cli::run::handle_trigger(
                &mut state,
                &dir,
                &trigger_type,
                event.as_deref(),
                data.as_deref(),
                cli.json,
            )
            .await?;
        }

        Commands::Catalog => {
            let state = AppState::init(config);
            cli::catalog::handle_catalog(&state.engine, cli.json)?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}
