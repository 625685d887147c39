//! What a key or dial slice shows, resolved from a rendered widget and the current states

use crate::config::{Appearance, Button, Dial, PageTarget, SpecialType};
use crate::state::StateSnapshot;

use super::icon::DIAL_RING_RADIUS;

pub const DEFAULT_TEXT_COLOR: &str = "white";
const ON_TEXT_COLOR: &str = "orangered";
const PRESSED_TEXT_COLOR: &str = "green";

/// Vector icon used for entity-bound keys without an explicit icon
fn default_mdi_icon(domain: &str) -> Option<&'static str> {
    match domain {
        "light" => Some("lightbulb"),
        "switch" => Some("power-socket-eu"),
        "script" => Some("script"),
        _ => None,
    }
}

/// Unresolved description of one image; turning it into pixels happens in the compositor
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// `icon` value: a prefixed source or a file path
    pub icon: Option<String>,
    pub icon_mdi: Option<String>,
    pub mdi_color: String,
    pub background: String,
    pub ring_radius: Option<u32>,
    pub grayscale: bool,
    pub text: String,
    pub text_color: String,
    pub text_size: u32,
    pub text_offset: i32,
}

impl Face {
    fn from_appearance(appearance: &Appearance) -> Self {
        let text_color = appearance
            .text_color
            .clone()
            .unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string());
        Self {
            icon: appearance.icon.clone(),
            icon_mdi: appearance.icon_mdi.clone(),
            mdi_color: String::new(),
            background: appearance.background().to_string(),
            ring_radius: None,
            grayscale: false,
            text: appearance.text.clone().unwrap_or_default(),
            text_color,
            text_size: appearance.text_size(),
            text_offset: appearance.text_offset(),
        }
    }

    /// Face of an already template-rendered button
    pub fn for_button(button: &Button, states: &StateSnapshot, pressed: bool) -> Self {
        let appearance = &button.appearance;
        let mut face = Self::from_appearance(appearance);

        let special = match &button.special_type {
            SpecialType::NextPage => Some(("Next\nPage".to_string(), "chevron-right")),
            SpecialType::PreviousPage => Some(("Previous\nPage".to_string(), "chevron-left")),
            SpecialType::GoToPage(target) => Some((go_to_text(target), "book-open-page-variant")),
            SpecialType::ClosePage => Some(("Close\nPage".to_string(), "arrow-u-left-bottom-bold")),
            SpecialType::TurnOff => Some(("Turn off".to_string(), "power")),
            SpecialType::Reload => Some(("Reload\nconfig".to_string(), "reload")),
            _ => None,
        };

        let entity = button.entity_id.as_deref().and_then(|id| states.get(id));
        if let Some((text, mdi)) = special {
            face.text = appearance.text.clone().unwrap_or(text);
            face.icon_mdi = Some(appearance.icon_mdi.clone().unwrap_or_else(|| mdi.to_string()));
        } else if let Some(entity) = entity {
            if appearance.text_color.is_none() && entity.is_on() {
                face.text_color = ON_TEXT_COLOR.to_string();
            }
            if appearance.icon_mdi.is_none() && appearance.icon.is_none() {
                face.icon_mdi = button
                    .domain()
                    .and_then(default_mdi_icon)
                    .map(str::to_string);
            }
            face.grayscale = entity.is_off() && appearance.icon_gray_when_off;
        }

        face.mdi_color = appearance
            .icon_mdi_color
            .clone()
            .unwrap_or_else(|| face.text_color.clone());
        if pressed {
            face.text_color = PRESSED_TEXT_COLOR.to_string();
        }
        face
    }

    /// Face of an already template-rendered dial
    pub fn for_dial(dial: &Dial, states: &StateSnapshot) -> Self {
        let appearance = &dial.appearance;
        let mut face = Self::from_appearance(appearance);
        face.ring_radius = Some(DIAL_RING_RADIUS);
        face.grayscale = appearance.icon_gray_when_off
            && dial
                .entity_id
                .as_deref()
                .and_then(|id| states.get(id))
                .is_some_and(|e| e.is_off());
        face.mdi_color = appearance
            .icon_mdi_color
            .clone()
            .unwrap_or_else(|| face.text_color.clone());
        face
    }

    /// Countdown ring shown while a press-armed key waits
    pub fn countdown(remaining: f64, delay: f64, appearance: &Appearance) -> Self {
        let pct = if delay > 0.0 {
            (remaining / delay * 100.0).round()
        } else {
            0.0
        };
        Self {
            icon: Some(format!("ring:{}", pct)),
            icon_mdi: None,
            mdi_color: DEFAULT_TEXT_COLOR.to_string(),
            background: Appearance::DEFAULT_BACKGROUND.to_string(),
            ring_radius: None,
            grayscale: false,
            text: format!("{:.0}s\n{}%", remaining, pct),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            text_size: appearance.text_size(),
            text_offset: appearance.text_offset(),
        }
    }
}

fn go_to_text(target: &PageTarget) -> String {
    format!("Go to\nPage\n{}", target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityState;

    fn button(yaml: &str) -> Button {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_special_defaults() {
        let states = StateSnapshot::new();
        let face = Face::for_button(&button("special_type: next-page"), &states, false);
        assert_eq!(face.text, "Next\nPage");
        assert_eq!(face.icon_mdi.as_deref(), Some("chevron-right"));

        let face = Face::for_button(
            &button("special_type: go-to-page\nspecial_type_data: Lights"),
            &states,
            false,
        );
        assert_eq!(face.text, "Go to\nPage\nLights");

        let face = Face::for_button(
            &button("special_type: reload\ntext: Again\nicon_mdi: refresh"),
            &states,
            false,
        );
        assert_eq!(face.text, "Again");
        assert_eq!(face.icon_mdi.as_deref(), Some("refresh"));
    }

    #[test]
    fn test_entity_bound_face() {
        let b = button("entity_id: light.x\nservice: light.toggle\nicon_gray_when_off: true");
        let on = StateSnapshot::from_states([EntityState::new("light.x", "on")]);
        let face = Face::for_button(&b, &on, false);
        assert_eq!(face.text_color, "orangered");
        assert_eq!(face.mdi_color, "orangered");
        assert_eq!(face.icon_mdi.as_deref(), Some("lightbulb"));
        assert!(!face.grayscale);

        let off = StateSnapshot::from_states([EntityState::new("light.x", "off")]);
        let face = Face::for_button(&b, &off, false);
        assert_eq!(face.text_color, "white");
        assert!(face.grayscale);

        let face = Face::for_button(&b, &on, true);
        assert_eq!(face.text_color, "green");
        assert_eq!(face.mdi_color, "orangered");
    }

    #[test]
    fn test_explicit_icon_suppresses_domain_default() {
        let b = button("entity_id: switch.fan\nservice: switch.toggle\nicon: fan.png");
        let states = StateSnapshot::from_states([EntityState::new("switch.fan", "on")]);
        let face = Face::for_button(&b, &states, false);
        assert_eq!(face.icon_mdi, None);
        assert_eq!(face.icon.as_deref(), Some("fan.png"));
    }

    #[test]
    fn test_unknown_entity_keeps_plain_face() {
        let b = button("entity_id: light.gone\nservice: light.toggle\ntext: Lamp");
        let face = Face::for_button(&b, &StateSnapshot::new(), false);
        assert_eq!(face.text, "Lamp");
        assert_eq!(face.icon_mdi, None);
        assert_eq!(face.background, "#000000");
    }

    #[test]
    fn test_countdown() {
        let face = Face::countdown(2.4, 4.0, &Appearance::default());
        assert_eq!(face.icon.as_deref(), Some("ring:60"));
        assert_eq!(face.text, "2s\n60%");
        assert_eq!(face.text_color, "white");
    }

    #[test]
    fn test_dial_face() {
        let dial: Dial =
            serde_yml::from_str("entity_id: light.x\nicon: ring:50\nicon_gray_when_off: true")
                .unwrap();
        let off = StateSnapshot::from_states([EntityState::new("light.x", "off")]);
        let face = Face::for_dial(&dial, &off);
        assert!(face.grayscale);
        assert_eq!(face.ring_radius, Some(DIAL_RING_RADIUS));
    }
}
