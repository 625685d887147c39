use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{self, Incoming};
use super::{HubCommand, HubEvent};
use crate::settings::HubSettings;
use crate::state::EntityState;

/// One authenticated websocket session
struct Connection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl Connection {
    /// Connect, authenticate and fetch the current state; events are subscribed last
    async fn open(url: &str, token: &str) -> Result<(Self, Vec<EntityState>)> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| anyhow!("Failed to connect to {}: {}", url, e))?;
        let mut conn = Self { ws, next_id: 0 };

        match conn.recv().await? {
            Incoming::AuthRequired { ha_version } => {
                debug!("Hub version {}", ha_version.as_deref().unwrap_or("unknown"));
            }
            other => return Err(anyhow!("Expected auth_required, got {:?}", other)),
        }

        conn.send(messages::auth(token)).await?;
        match conn.recv().await? {
            Incoming::AuthOk { .. } => info!("Authenticated with Home Assistant"),
            Incoming::AuthInvalid { message } => {
                return Err(anyhow!(
                    "Authentication failed: {}",
                    message.unwrap_or_default()
                ))
            }
            other => return Err(anyhow!("Expected auth_ok, got {:?}", other)),
        }

        let id = conn.next_id();
        conn.send(messages::get_states(id)).await?;
        let states = loop {
            if let Incoming::Result {
                id: result_id,
                success,
                result,
                error,
            } = conn.recv().await?
            {
                if result_id != id {
                    continue;
                }
                if !success {
                    return Err(anyhow!("Failed to fetch states: {:?}", error));
                }
                break serde_json::from_value::<Vec<EntityState>>(result)
                    .context("Failed to parse states")?;
            }
        };
        info!("Fetched {} entity states", states.len());

        let id = conn.next_id();
        conn.send(messages::subscribe_state_changes(id)).await?;

        Ok((conn, states))
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    async fn send(&mut self, payload: Value) -> Result<()> {
        self.ws
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| anyhow!("Failed to send to hub: {}", e))
    }

    /// Next parseable message; errors when the connection is gone
    async fn recv(&mut self) -> Result<Incoming> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(incoming) => return Ok(incoming),
                    Err(e) => warn!("Ignoring unparseable hub message: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => return Err(anyhow!("Hub closed the connection")),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(anyhow!("Failed to read from hub: {}", e)),
            }
        }
    }

    async fn call_service(&mut self, command: HubCommand) -> Result<()> {
        let HubCommand::CallService {
            service,
            service_data,
            target,
        } = command;
        let id = self.next_id();
        let payload = messages::call_service(id, &service, &service_data, target.as_ref())
            .ok_or_else(|| anyhow!("Invalid service name {:?}", service))?;
        info!("Calling {} with {:?}", service, service_data);
        self.send(payload).await
    }
}

/// Keeps a connection to Home Assistant alive for the lifetime of the session
pub struct HubClient {
    url: String,
    token: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HubClient {
    pub fn new(settings: &HubSettings) -> Self {
        Self {
            url: settings.url(),
            token: settings.token.clone(),
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay(),
        }
    }

    /// Connect, retrying with linear backoff
    async fn connect(&self) -> Result<(Connection, Vec<EntityState>)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!("Connecting to {} (attempt {})", self.url, attempt);
            match Connection::open(&self.url, &self.token).await {
                Ok(opened) => return Ok(opened),
                Err(e) if attempt <= self.max_retries => {
                    let delay = self.retry_delay * attempt;
                    warn!("{}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(anyhow!(
                        "Failed to connect after {} attempts: {}",
                        attempt,
                        e
                    ))
                }
            }
        }
    }

    /// Forward hub state as events and perform commands until either channel closes.
    ///
    /// Returns an error when no connection can be (re)established.
    pub async fn run<E>(
        self,
        events: mpsc::UnboundedSender<E>,
        mut commands: mpsc::UnboundedReceiver<HubCommand>,
    ) -> Result<()>
    where
        E: From<HubEvent>,
    {
        loop {
            let (mut conn, states) = self.connect().await?;
            if events.send(E::from(HubEvent::Snapshot(states))).is_err() {
                return Ok(());
            }

            loop {
                tokio::select! {
                    incoming = conn.recv() => match incoming {
                        Ok(Incoming::Event { event, .. }) => {
                            let Some((entity_id, new_state)) = event.state_changed() else {
                                continue;
                            };
                            let event = HubEvent::StateChanged { entity_id, new_state };
                            if events.send(E::from(event)).is_err() {
                                return Ok(());
                            }
                        }
                        Ok(Incoming::Result { success: false, error, .. }) => {
                            warn!("Hub request failed: {:?}", error);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Lost connection to hub: {}", e);
                            break;
                        }
                    },
                    command = commands.recv() => {
                        let Some(command) = command else {
                            return Ok(());
                        };
                        if let Err(e) = conn.call_service(command).await {
                            warn!("{}", e);
                        }
                    }
                }
            }
        }
    }
}
