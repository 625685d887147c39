//! Jinja expressions embedded in widget fields, evaluated against entity state

use minijinja::value::{Kwargs, Value};
use minijinja::{context, Environment, Error, ErrorKind};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::state::StateSnapshot;

/// Current value and bounds of the dial a template is rendered for
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DialValues {
    pub state: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl DialValues {
    fn attr(&self, name: &str) -> Option<f64> {
        match name {
            "state" => Some(self.state),
            "min" => Some(self.min),
            "max" => Some(self.max),
            "step" => Some(self.step),
            _ => None,
        }
    }
}

/// Template environment bound to one state snapshot
pub struct Templater {
    env: Environment<'static>,
}

impl Templater {
    pub fn new(states: &StateSnapshot) -> Self {
        Self::build(states, None)
    }

    /// Environment that also exposes `dial_value()` / `dial_attr(name)`
    pub fn for_dial(states: &StateSnapshot, dial: DialValues) -> Self {
        Self::build(states, Some(dial))
    }

    fn build(states: &StateSnapshot, dial: Option<DialValues>) -> Self {
        let mut env = Environment::new();

        let s = states.clone();
        env.add_function(
            "states",
            move |entity_id: String, kwargs: Kwargs| -> Result<Value, Error> {
                let with_unit: Option<bool> = kwargs.get("with_unit")?;
                let rounded: Option<bool> = kwargs.get("rounded")?;
                kwargs.assert_all_used()?;
                Ok(entity_state(
                    &s,
                    &entity_id,
                    with_unit.unwrap_or(false),
                    rounded.unwrap_or(false),
                ))
            },
        );

        let s = states.clone();
        env.add_function("is_state", move |entity_id: String, value: Value| -> bool {
            entity_state(&s, &entity_id, false, false) == coerce(value)
        });

        let s = states.clone();
        env.add_function("state_attr", move |entity_id: String, attr: String| -> Value {
            state_attr(&s, &entity_id, &attr)
        });

        let s = states.clone();
        env.add_function(
            "is_state_attr",
            move |entity_id: String, attr: String, value: Value| -> bool {
                state_attr(&s, &entity_id, &attr) == coerce(value)
            },
        );

        env.add_function("min", |a: Value, b: Value| pick(a, b, true));
        env.add_function("max", |a: Value, b: Value| pick(a, b, false));
        env.add_filter("min", |a: Value, b: Value| pick(a, b, true));
        env.add_filter("max", |a: Value, b: Value| pick(a, b, false));
        env.add_filter("is_number", |value: Value| is_number(&value));
        env.add_function("round", |num: f64, digits: Option<i32>| -> Value {
            match digits {
                Some(d) => {
                    let factor = 10f64.powi(d);
                    Value::from((num * factor).round() / factor)
                }
                None => Value::from(num.round() as i64),
            }
        });

        let values = dial.unwrap_or_default();
        env.add_function("dial_value", move || -> f64 { values.state });
        env.add_function("dial_attr", move |name: String| -> f64 {
            values.attr(&name).unwrap_or_else(|| {
                warn!("Unknown dial attribute {:?}", name);
                0.0
            })
        });

        Self { env }
    }

    /// Evaluate `text`; returns it unchanged when it holds no expression or fails to render
    pub fn render(&self, text: &str) -> String {
        if !text.contains('{') {
            return text.to_string();
        }
        match self.env.render_str(text, context! {}) {
            Ok(rendered) => rendered.trim().to_string(),
            Err(e) => {
                warn!("Failed to render template {:?}: {}", text, e);
                text.to_string()
            }
        }
    }

    pub fn render_opt(&self, text: Option<&String>) -> Option<String> {
        text.map(|t| self.render(t))
    }

    /// Evaluate every string entry of a flat mapping, copying the rest
    pub fn render_map(&self, map: &Map<String, JsonValue>) -> Map<String, JsonValue> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.render_json(v)))
            .collect()
    }

    pub fn render_json(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => JsonValue::String(self.render(s)),
            other => other.clone(),
        }
    }
}

/// Integer or float when `text` parses as one, otherwise the text itself
pub fn maybe_number(text: &str, rounded: bool) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    match text.parse::<f64>() {
        Ok(f) if rounded => Value::from(f.round() as i64),
        Ok(f) => Value::from(f),
        Err(_) => Value::from(text),
    }
}

fn coerce(value: Value) -> Value {
    match value.as_str() {
        Some(s) => maybe_number(s, false),
        None => value,
    }
}

fn entity_state(states: &StateSnapshot, entity_id: &str, with_unit: bool, rounded: bool) -> Value {
    let Some(entity) = states.get(entity_id) else {
        return Value::from(());
    };
    let state = maybe_number(&entity.state, rounded);
    if with_unit {
        if let Some(unit) = entity
            .attributes
            .get("unit_of_measurement")
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
        {
            return Value::from(format!("{} {}", state, unit));
        }
    }
    state
}

fn state_attr(states: &StateSnapshot, entity_id: &str, attr: &str) -> Value {
    match states.attribute(entity_id, attr) {
        Some(JsonValue::String(s)) => maybe_number(s, false),
        Some(other) => Value::from_serialize(other),
        None => Value::from(()),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    if value.is_number() {
        f64::try_from(value.clone()).ok()
    } else {
        value.as_str()?.trim().parse().ok()
    }
}

fn is_number(value: &Value) -> bool {
    as_number(value).is_some()
}

fn pick(a: Value, b: Value, smallest: bool) -> Result<Value, Error> {
    match (as_number(&a), as_number(&b)) {
        (Some(x), Some(y)) => Ok(if (x <= y) == smallest { a } else { b }),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot compare {} and {}", a, b),
        )),
    }
}
