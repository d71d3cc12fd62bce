mod cli;

use anyhow::{Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use deckhand::config::{Deckfile, create_example_deckfile};
use deckhand::runtime::DockerCli;
use deckhand::surface::ConsoleSurface;
use deckhand::DeckhandCore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(Deckfile::default_path);

    match cli.command {
        Commands::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "Deckfile already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            create_example_deckfile().save(&config_path)?;
            println!("✅ Wrote example Deckfile to {}", config_path.display());
        }

        Commands::Validate => {
            let config = Deckfile::load(&config_path)?;
            println!(
                "✅ Deckfile valid: {} container(s), {} location(s)",
                config.containers.len(),
                config.locations.len()
            );
        }

        Commands::Status => {
            let config = Deckfile::load(&config_path)?;
            let gateway = Arc::new(DockerCli::from_config(&config));
            let core = DeckhandCore::new(config, gateway, Arc::new(ConsoleSurface::new()));

            core.force_refresh_all().await?;
            let card = core.overview().await;
            println!("{}", card.body);
        }

        Commands::Watch => {
            info!("🚀 Deckhand starting up...");

            let config = Deckfile::load(&config_path)?;
            info!(
                "   Project: {} ({} containers, {} locations)",
                config.project,
                config.containers.len(),
                config.locations.len()
            );

            let gateway = Arc::new(DockerCli::from_config(&config));
            let core = DeckhandCore::new(config, gateway, Arc::new(ConsoleSurface::new()));
            let handles = core.start();

            tokio::signal::ctrl_c().await?;
            info!("🛑 Shutting down Deckhand");
            for handle in handles {
                handle.abort();
            }
        }
    }

    Ok(())
}
