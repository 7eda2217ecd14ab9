use anyhow::Context;
use clap::{Parser, Subcommand};
use county_overlay::config::AppConfig;
use county_overlay::server;
use county_overlay::session::OverlaySet;
use county_overlay::surface::GeoJsonSurface;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enhance every overlay and write styled GeoJSON to the output directory
    Enhance {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Only export these overlays
        #[arg(short, long)]
        overlay: Vec<String>,
    },
    /// Serve the overlay API and static map files
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Enhance { config, overlay } => {
            info!("Enhancing overlays with config: {:?}", config);
            let app_config = AppConfig::load_from_file(config)?;
            run_enhance(&app_config, overlay).await?;
            info!("Enhancement complete!");
        }
        Commands::Serve { config } => {
            info!("Serving overlays with config: {:?}", config);
            let app_config = AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
    }

    Ok(())
}

async fn run_enhance(config: &AppConfig, only: &[String]) -> anyhow::Result<()> {
    let surface = Arc::new(GeoJsonSurface::new());
    let overlays = OverlaySet::from_config(config, surface.clone()).await?;
    let selected: Vec<_> = overlays
        .iter()
        .filter(|o| only.is_empty() || only.iter().any(|name| name == o.name()))
        .collect();

    // Load everything first; layers are pushed once the surface opens.
    for overlay in &selected {
        overlay
            .show()
            .await
            .with_context(|| format!("Failed to load overlay '{}'", overlay.name()))?;
    }
    surface.mark_ready();

    std::fs::create_dir_all(&config.output.dir)
        .with_context(|| format!("Failed to create output directory {:?}", config.output.dir))?;

    for overlay in &selected {
        if !overlay.surface_ready() {
            warn!(overlay = %overlay.name(), state = ?overlay.state(), "Overlay not ready, skipping");
            continue;
        }
        let collection = surface.styled_collection(overlay.name());
        let path = config.output.dir.join(format!("{}.geojson", overlay.name()));
        let json = serde_json::to_string(&collection).context("Failed to serialize feature collection")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote {} features to {:?}", collection.features.len(), path);
    }
    Ok(())
}
