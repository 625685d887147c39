//! Home Assistant connection
//!
//! [`HubClient`] runs as its own task. It reports state to the session as
//! [`HubEvent`]s and performs the [`HubCommand`]s the session sends back.

mod client;
pub mod messages;

use serde_json::{Map, Value};

use crate::state::EntityState;

pub use client::HubClient;

#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Full state after every (re)connect
    Snapshot(Vec<EntityState>),
    /// `new_state` is `None` when the entity was removed
    StateChanged {
        entity_id: String,
        new_state: Option<EntityState>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubCommand {
    CallService {
        service: String,
        service_data: Map<String, Value>,
        target: Option<Map<String, Value>>,
    },
}
