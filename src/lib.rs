pub mod config;
pub mod device;
pub mod display;
pub mod hub;
pub mod input;
pub mod session;
pub mod settings;
pub mod state;
pub mod template;
pub mod timer;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use config::DeckConfig;
use device::{Deck, DeviceManager};
use display::{load_font, Compositor};
use hub::HubClient;
use session::{Session, SessionEvent};
use settings::Settings;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Main application struct
pub struct App {
    settings: Settings,
    session: Session<DeviceManager>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    tasks: Vec<JoinHandle<()>>,
    hub_task: Option<JoinHandle<Result<()>>>,
}

impl App {
    /// Load the deck document and connect to the device; both failures are fatal
    pub async fn new(settings: Settings) -> Result<Self> {
        let config = DeckConfig::load(&settings.deck.config)
            .with_context(|| format!("Failed to load {}", settings.deck.config.display()))?;
        info!(
            "Loaded {} pages from {}",
            config.pages.len(),
            settings.deck.config.display()
        );

        let mut device = DeviceManager::connect().await?;
        device.reset().await?;

        let font = load_font(&settings.deck.font_path());
        let compositor = Arc::new(Compositor::new(
            font,
            settings.deck.assets.clone(),
            settings.deck.key_cache_size,
            settings.deck.text_cache_size,
        ));

        let (events_tx, events) = mpsc::unbounded_channel();
        let (hub_tx, hub_rx) = mpsc::unbounded_channel();

        let mut tasks = vec![device.spawn_input_pump(events_tx.clone())];
        tasks.push(spawn_ticker(events_tx.clone(), || SessionEvent::Tick));
        tasks.push(spawn_ticker(events_tx.clone(), || SessionEvent::ConfigPoll));

        let client = HubClient::new(&settings.hub);
        let hub_task = tokio::spawn(client.run(events_tx.clone(), hub_rx));

        let session = Session::new(config, device, compositor, hub_tx, events_tx);

        Ok(Self {
            settings,
            session,
            events: Some(events),
            tasks,
            hub_task: Some(hub_task),
        })
    }

    /// Run until the hub connection is lost for good
    pub async fn run(&mut self) -> Result<()> {
        let events = self
            .events
            .take()
            .ok_or_else(|| anyhow!("Application is already running"))?;
        let hub_task = self
            .hub_task
            .take()
            .ok_or_else(|| anyhow!("Application is already running"))?;

        self.session.start().await?;
        info!(
            "Running with hub at {}",
            self.settings.hub.url()
        );

        tokio::select! {
            _ = self.session.run(events) => Err(anyhow!("Event channel closed")),
            result = hub_task => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("Hub connection failed: {:#}", e);
                    Err(e)
                }
                Err(e) => Err(anyhow!("Hub task panicked: {}", e)),
            },
        }
    }

    /// Gracefully shutdown the application
    pub async fn shutdown(&mut self) {
        info!("Shutting down hass-deck...");

        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.hub_task.take() {
            task.abort();
        }
        if let Err(e) = self.session.deck_mut().reset().await {
            warn!("Failed to reset device: {}", e);
        }

        info!("Shutdown complete");
    }
}

fn spawn_ticker(
    events: mpsc::UnboundedSender<SessionEvent>,
    event: fn() -> SessionEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if events.send(event()).is_err() {
                return;
            }
        }
    })
}
