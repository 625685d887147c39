//! Home Assistant websocket message shapes

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::state::EntityState;

/// Messages received from the hub
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Incoming {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<Value>,
    },
    Event {
        #[serde(default)]
        id: u64,
        event: Event,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct StateChangedData {
    entity_id: String,
    new_state: Option<EntityState>,
}

impl Event {
    /// Entity and its new state for `state_changed` events
    pub fn state_changed(&self) -> Option<(String, Option<EntityState>)> {
        if self.event_type != "state_changed" {
            return None;
        }
        let data: StateChangedData = serde_json::from_value(self.data.clone()).ok()?;
        Some((data.entity_id, data.new_state))
    }
}

pub fn auth(token: &str) -> Value {
    json!({"type": "auth", "access_token": token})
}

pub fn get_states(id: u64) -> Value {
    json!({"id": id, "type": "get_states"})
}

pub fn subscribe_state_changes(id: u64) -> Value {
    json!({"id": id, "type": "subscribe_events", "event_type": "state_changed"})
}

/// `service` is `domain.name`; the split happens at the first dot
pub fn call_service(
    id: u64,
    service: &str,
    service_data: &Map<String, Value>,
    target: Option<&Map<String, Value>>,
) -> Option<Value> {
    let (domain, name) = service.split_once('.')?;
    let mut payload = json!({
        "id": id,
        "type": "call_service",
        "domain": domain,
        "service": name,
        "service_data": service_data,
    });
    if let (Some(target), Some(obj)) = (target, payload.as_object_mut()) {
        obj.insert("target".to_string(), Value::Object(target.clone()));
    }
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_service_payload() {
        let mut data = Map::new();
        data.insert("entity_id".into(), json!("light.kitchen"));
        let payload = call_service(7, "light.turn_on", &data, None).unwrap();
        assert_eq!(payload["id"], 7);
        assert_eq!(payload["domain"], "light");
        assert_eq!(payload["service"], "turn_on");
        assert_eq!(payload["service_data"]["entity_id"], "light.kitchen");
        assert!(payload.get("target").is_none());

        let mut target = Map::new();
        target.insert("area_id".into(), json!("office"));
        let payload = call_service(8, "script.run.now", &Map::new(), Some(&target)).unwrap();
        assert_eq!(payload["domain"], "script");
        assert_eq!(payload["service"], "run.now");
        assert_eq!(payload["target"]["area_id"], "office");

        assert!(call_service(9, "nodot", &Map::new(), None).is_none());
    }

    #[test]
    fn test_parse_state_changed() {
        let text = r#"{
            "id": 2, "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "light.kitchen",
                    "old_state": null,
                    "new_state": {"entity_id": "light.kitchen", "state": "on", "attributes": {"brightness": 128}}
                }
            }
        }"#;
        let Incoming::Event { event, .. } = serde_json::from_str(text).unwrap() else {
            panic!("expected an event");
        };
        let (entity_id, new_state) = event.state_changed().unwrap();
        assert_eq!(entity_id, "light.kitchen");
        let new_state = new_state.unwrap();
        assert!(new_state.is_on());
        assert_eq!(new_state.numeric_attribute("brightness"), Some(128.0));
    }

    #[test]
    fn test_parse_removed_entity() {
        let text = r#"{"id": 2, "type": "event", "event": {"event_type": "state_changed",
            "data": {"entity_id": "sensor.gone", "new_state": null}}}"#;
        let Incoming::Event { event, .. } = serde_json::from_str(text).unwrap() else {
            panic!("expected an event");
        };
        assert_eq!(event.state_changed(), Some(("sensor.gone".to_string(), None)));
    }

    #[test]
    fn test_parse_handshake_and_unknown() {
        assert!(matches!(
            serde_json::from_str::<Incoming>(r#"{"type": "auth_required", "ha_version": "2024.1"}"#).unwrap(),
            Incoming::AuthRequired { .. }
        ));
        assert!(matches!(
            serde_json::from_str::<Incoming>(r#"{"type": "auth_ok"}"#).unwrap(),
            Incoming::AuthOk { .. }
        ));
        assert!(matches!(
            serde_json::from_str::<Incoming>(r#"{"type": "pong", "id": 3}"#).unwrap(),
            Incoming::Other
        ));
        let result: Incoming =
            serde_json::from_str(r#"{"id": 1, "type": "result", "success": true, "result": []}"#).unwrap();
        assert!(matches!(result, Incoming::Result { id: 1, success: true, .. }));
    }
}
