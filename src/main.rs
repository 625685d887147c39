use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hass_deck::{config::DeckConfig, settings::Settings, App};

#[derive(Parser, Debug)]
#[command(name = "hass-deck")]
#[command(about = "Home Assistant control surface for AJAZZ / Mirabox stream decks")]
#[command(version)]
struct Cli {
    /// Home Assistant host, optionally with a port
    #[arg(long, env = "HASS_HOST")]
    host: Option<String>,

    /// Long-lived access token
    #[arg(long, env = "HASS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Page layout document
    #[arg(long, env = "STREAMDECK_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Websocket protocol
    #[arg(long, env = "WEBSOCKET_PROTOCOL", value_parser = ["wss", "ws"])]
    protocol: Option<String>,

    /// Settings file (default: ~/.config/hass-deck/settings.toml)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Validate the page layout document and exit
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    /// Command-line flags win over the settings file
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(host) = self.host {
            settings.hub.host = host;
        }
        if let Some(token) = self.token {
            settings.hub.token = token;
        }
        if let Some(protocol) = self.protocol {
            settings.hub.protocol = protocol;
        }
        if let Some(config) = self.config {
            settings.deck.config = config;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let check_config = cli.check_config;
    let settings = Settings::load(cli.settings.as_deref())?;
    let settings = cli.apply(settings);

    if check_config {
        return check(&settings);
    }

    info!("Starting hass-deck");

    let mut app = App::new(settings).await?;

    // Set up signal handlers for graceful shutdown
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let result = tokio::select! {
        result = app.run() => {
            result
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            Ok(())
        }
    };

    // Always run shutdown
    app.shutdown().await;
    result
}

fn check(settings: &Settings) -> Result<()> {
    let path = &settings.deck.config;
    let config = DeckConfig::load(path).map_err(|e| anyhow!("{}: {}", path.display(), e))?;

    println!("✓ {} is valid", path.display());
    for page in &config.pages {
        println!(
            "  {}: {} buttons, {} dials",
            page.name,
            page.buttons.len(),
            page.dials.len()
        );
    }
    for page in &config.anonymous_pages {
        println!(
            "  {} (anonymous): {} buttons, {} dials",
            page.name,
            page.buttons.len(),
            page.dials.len()
        );
    }
    Ok(())
}
