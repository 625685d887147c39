use serde::Deserialize;
use serde_json::{Map, Value};

use crate::display::color::COLORMAPS;
use crate::state::{self, StateSnapshot};
use crate::template::Templater;

/// Display fields shared by buttons and dials
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Appearance {
    pub text: Option<String>,
    pub text_color: Option<String>,
    pub text_size: Option<u32>,
    pub text_offset: Option<i32>,
    pub icon: Option<String>,
    pub icon_mdi: Option<String>,
    pub icon_background_color: Option<String>,
    pub icon_mdi_color: Option<String>,
    pub icon_gray_when_off: bool,
}

impl Appearance {
    pub const DEFAULT_TEXT_SIZE: u32 = 12;
    pub const DEFAULT_BACKGROUND: &'static str = "#000000";

    /// Templatable display fields evaluated; sizes, offsets and flags copied
    pub fn rendered(&self, t: &Templater) -> Self {
        Self {
            text: t.render_opt(self.text.as_ref()),
            text_color: t.render_opt(self.text_color.as_ref()),
            icon: t.render_opt(self.icon.as_ref()),
            icon_mdi: t.render_opt(self.icon_mdi.as_ref()),
            icon_background_color: t.render_opt(self.icon_background_color.as_ref()),
            icon_mdi_color: t.render_opt(self.icon_mdi_color.as_ref()),
            ..self.clone()
        }
    }

    pub fn text_size(&self) -> u32 {
        self.text_size.unwrap_or(Self::DEFAULT_TEXT_SIZE)
    }

    pub fn text_offset(&self) -> i32 {
        self.text_offset.unwrap_or(0)
    }

    pub fn background(&self) -> &str {
        self.icon_background_color
            .as_deref()
            .unwrap_or(Self::DEFAULT_BACKGROUND)
    }
}

/// Seconds to wait, either literal or a template evaluating to a number
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    Seconds(f64),
    Template(String),
}

impl Delay {
    pub fn rendered(&self, t: &Templater) -> Self {
        match self {
            Delay::Template(text) => {
                let rendered = t.render(text);
                match rendered.trim().parse() {
                    Ok(seconds) => Delay::Seconds(seconds),
                    Err(_) => Delay::Template(rendered),
                }
            }
            seconds => seconds.clone(),
        }
    }

    /// `None` when the value is still an unevaluated or non-numeric template
    pub fn seconds(&self) -> Option<f64> {
        match self {
            Delay::Seconds(s) => Some(*s),
            Delay::Template(t) => t.trim().parse().ok(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Delay::Seconds(s) if *s < 0.0 || !s.is_finite() => {
                Err(format!("delay must be a non-negative number, got {}", s))
            }
            _ => Ok(()),
        }
    }
}

/// Page addressed by `go-to-page`
#[derive(Debug, Clone, PartialEq)]
pub enum PageTarget {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for PageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageTarget::Index(i) => write!(f, "{}", i),
            PageTarget::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Palette override for `light-control`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightPalette {
    pub colors: Option<Vec<String>>,
    pub color_temp_kelvin: Vec<u32>,
    pub colormap: Option<String>,
}

impl LightPalette {
    fn from_data(data: Option<Value>) -> Result<Self, String> {
        let Some(data) = data else {
            return Ok(Self::default());
        };
        let Value::Object(map) = data else {
            return Err("light-control data must be a mapping".to_string());
        };

        let mut palette = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "colors" => {
                    let colors = value
                        .as_array()
                        .ok_or("light-control colors must be a list")?
                        .iter()
                        .map(|c| c.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or("light-control colors must be strings")?;
                    palette.colors = Some(colors);
                }
                "color_temp_kelvin" => {
                    palette.color_temp_kelvin = value
                        .as_array()
                        .ok_or("light-control color_temp_kelvin must be a list")?
                        .iter()
                        .map(|k| k.as_u64().and_then(|k| u32::try_from(k).ok()))
                        .collect::<Option<Vec<_>>>()
                        .ok_or("light-control color_temp_kelvin must be integers")?;
                }
                "colormap" => {
                    let name = value
                        .as_str()
                        .ok_or("light-control colormap must be a string")?;
                    if !COLORMAPS.contains(&name) {
                        return Err(format!(
                            "unknown colormap {:?}, expected one of {:?}",
                            name, COLORMAPS
                        ));
                    }
                    palette.colormap = Some(name.to_string());
                }
                other => {
                    return Err(format!(
                        "invalid light-control key {:?}, expected colors, colormap or color_temp_kelvin",
                        other
                    ))
                }
            }
        }
        Ok(palette)
    }
}

/// What a key does besides (or instead of) calling a service
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SpecialType {
    #[default]
    None,
    NextPage,
    PreviousPage,
    ClosePage,
    GoToPage(PageTarget),
    TurnOff,
    LightControl(LightPalette),
    Reload,
    Empty,
}

impl SpecialType {
    /// Build from the document's tag and its untyped payload
    pub fn from_parts(tag: Option<&str>, data: Option<Value>) -> Result<Self, String> {
        let data = data.filter(|d| !d.is_null());
        let no_data = |special: SpecialType, data: Option<Value>| match data {
            None => Ok(special),
            Some(d) => Err(format!(
                "special_type_data must be empty for {}, got {}",
                tag.unwrap_or_default(),
                d
            )),
        };

        match tag {
            None => no_data(SpecialType::None, data),
            Some("next-page") => no_data(SpecialType::NextPage, data),
            Some("previous-page") => no_data(SpecialType::PreviousPage, data),
            Some("close-page") => no_data(SpecialType::ClosePage, data),
            Some("turn-off") => no_data(SpecialType::TurnOff, data),
            Some("reload") => no_data(SpecialType::Reload, data),
            Some("empty") => no_data(SpecialType::Empty, data),
            Some("go-to-page") => match data {
                Some(Value::Number(n)) => n
                    .as_u64()
                    .map(|i| SpecialType::GoToPage(PageTarget::Index(i as usize)))
                    .ok_or_else(|| format!("go-to-page index must be a non-negative integer, got {}", n)),
                Some(Value::String(name)) => Ok(SpecialType::GoToPage(PageTarget::Name(name))),
                other => Err(format!(
                    "go-to-page requires a page index or name, got {:?}",
                    other
                )),
            },
            Some("light-control") => LightPalette::from_data(data).map(SpecialType::LightControl),
            Some(other) => Err(format!("unknown special_type {:?}", other)),
        }
    }

    pub fn tag(&self) -> Option<&'static str> {
        match self {
            SpecialType::None => None,
            SpecialType::NextPage => Some("next-page"),
            SpecialType::PreviousPage => Some("previous-page"),
            SpecialType::ClosePage => Some("close-page"),
            SpecialType::GoToPage(_) => Some("go-to-page"),
            SpecialType::TurnOff => Some("turn-off"),
            SpecialType::LightControl(_) => Some("light-control"),
            SpecialType::Reload => Some("reload"),
            SpecialType::Empty => Some("empty"),
        }
    }

    fn rendered(&self, t: &Templater) -> Self {
        match self {
            SpecialType::GoToPage(PageTarget::Name(name)) => {
                SpecialType::GoToPage(PageTarget::Name(t.render(name)))
            }
            SpecialType::LightControl(palette) => SpecialType::LightControl(LightPalette {
                colors: palette
                    .colors
                    .as_ref()
                    .map(|colors| colors.iter().map(|c| t.render(c)).collect()),
                ..palette.clone()
            }),
            other => other.clone(),
        }
    }
}

/// A resolved thing to do on press, release or timer expiry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Action {
    pub entity_id: Option<String>,
    pub service: Option<String>,
    pub service_data: Option<Map<String, Value>>,
    pub target: Option<Map<String, Value>>,
    pub special_type: SpecialType,
}

impl Action {
    /// Explicit service data, or just the bound entity
    pub fn service_payload(&self) -> Map<String, Value> {
        match &self.service_data {
            Some(data) => data.clone(),
            None => {
                let mut data = Map::new();
                if let Some(entity_id) = &self.entity_id {
                    data.insert("entity_id".to_string(), Value::from(entity_id.as_str()));
                }
                data
            }
        }
    }
}

/// Alternative action fired when a key is held past the long-press threshold
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawLongPress")]
pub struct LongPress {
    pub service: Option<String>,
    pub service_data: Option<Map<String, Value>>,
    pub target: Option<Map<String, Value>>,
    pub special_type: SpecialType,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLongPress {
    service: Option<String>,
    service_data: Option<Map<String, Value>>,
    target: Option<Map<String, Value>>,
    special_type: Option<String>,
    special_type_data: Option<Value>,
}

impl TryFrom<RawLongPress> for LongPress {
    type Error = String;

    fn try_from(raw: RawLongPress) -> Result<Self, Self::Error> {
        Ok(Self {
            special_type: SpecialType::from_parts(raw.special_type.as_deref(), raw.special_type_data)?,
            service: raw.service,
            service_data: raw.service_data,
            target: raw.target,
        })
    }
}

impl LongPress {
    fn rendered(&self, t: &Templater) -> Self {
        Self {
            service: t.render_opt(self.service.as_ref()),
            service_data: self.service_data.as_ref().map(|d| t.render_map(d)),
            target: self.target.as_ref().map(|d| t.render_map(d)),
            special_type: self.special_type.rendered(t),
        }
    }
}

/// One key of a page
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawButton")]
pub struct Button {
    pub entity_id: Option<String>,
    pub linked_entity: Option<String>,
    pub service: Option<String>,
    pub service_data: Option<Map<String, Value>>,
    pub target: Option<Map<String, Value>>,
    pub appearance: Appearance,
    pub delay: Option<Delay>,
    pub special_type: SpecialType,
    pub long_press: Option<LongPress>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawButton {
    entity_id: Option<String>,
    linked_entity: Option<String>,
    service: Option<String>,
    service_data: Option<Map<String, Value>>,
    target: Option<Map<String, Value>>,
    text: Option<String>,
    text_color: Option<String>,
    text_size: Option<u32>,
    text_offset: Option<i32>,
    icon: Option<String>,
    icon_mdi: Option<String>,
    icon_background_color: Option<String>,
    icon_mdi_color: Option<String>,
    #[serde(default)]
    icon_gray_when_off: bool,
    delay: Option<Delay>,
    special_type: Option<String>,
    special_type_data: Option<Value>,
    long_press: Option<LongPress>,
}

impl TryFrom<RawButton> for Button {
    type Error = String;

    fn try_from(raw: RawButton) -> Result<Self, Self::Error> {
        if let Some(delay) = &raw.delay {
            delay.validate()?;
        }
        Ok(Self {
            special_type: SpecialType::from_parts(raw.special_type.as_deref(), raw.special_type_data)?,
            entity_id: raw.entity_id,
            linked_entity: raw.linked_entity,
            service: raw.service,
            service_data: raw.service_data,
            target: raw.target,
            appearance: Appearance {
                text: raw.text,
                text_color: raw.text_color,
                text_size: raw.text_size,
                text_offset: raw.text_offset,
                icon: raw.icon,
                icon_mdi: raw.icon_mdi,
                icon_background_color: raw.icon_background_color,
                icon_mdi_color: raw.icon_mdi_color,
                icon_gray_when_off: raw.icon_gray_when_off,
            },
            delay: raw.delay,
            long_press: raw.long_press,
        })
    }
}

impl Button {
    /// Fields whose string values may contain templates
    pub const TEMPLATABLE: &'static [&'static str] = &[
        "entity_id",
        "linked_entity",
        "service",
        "service_data",
        "target",
        "text",
        "text_color",
        "icon",
        "icon_mdi",
        "icon_background_color",
        "icon_mdi_color",
        "delay",
        "special_type_data",
    ];

    /// Copy of this button with every templatable field evaluated against `states`
    pub fn rendered(&self, states: &StateSnapshot) -> Button {
        let t = Templater::new(states);
        Button {
            entity_id: t.render_opt(self.entity_id.as_ref()),
            linked_entity: t.render_opt(self.linked_entity.as_ref()),
            service: t.render_opt(self.service.as_ref()),
            service_data: self.service_data.as_ref().map(|d| t.render_map(d)),
            target: self.target.as_ref().map(|d| t.render_map(d)),
            appearance: self.appearance.rendered(&t),
            delay: self.delay.as_ref().map(|d| d.rendered(&t)),
            special_type: self.special_type.rendered(&t),
            long_press: self.long_press.as_ref().map(|lp| lp.rendered(&t)),
        }
    }

    /// Domain of the bound service, e.g. `light` for `light.toggle`
    pub fn domain(&self) -> Option<&str> {
        self.service.as_deref().map(|s| state::domain(s).unwrap_or(s))
    }

    pub fn is_bound_to(&self, entity_id: &str) -> bool {
        self.entity_id.as_deref() == Some(entity_id)
            || self.linked_entity.as_deref() == Some(entity_id)
    }

    /// Press-arm delay in seconds, zero when unset or not numeric
    pub fn delay_seconds(&self) -> f64 {
        self.delay
            .as_ref()
            .and_then(Delay::seconds)
            .filter(|s| *s > 0.0)
            .unwrap_or(0.0)
    }

    pub fn action(&self) -> Action {
        Action {
            entity_id: self.entity_id.clone(),
            service: self.service.clone(),
            service_data: self.service_data.clone(),
            target: self.target.clone(),
            special_type: self.special_type.clone(),
        }
    }

    /// The long-press override, if one is configured
    pub fn long_press_action(&self) -> Option<Action> {
        self.long_press.as_ref().map(|lp| Action {
            entity_id: self.entity_id.clone(),
            service: lp.service.clone(),
            service_data: lp.service_data.clone(),
            target: lp.target.clone(),
            special_type: lp.special_type.clone(),
        })
    }
}
