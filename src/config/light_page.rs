use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use tracing::warn;

use super::button::{Appearance, Button, LightPalette, SpecialType};
use super::page::Page;
use crate::display::color::{
    color_temp_kelvin_to_rgb, colormap_hex_colors, max_contrast_color, parse_color,
    scale_hex_color, to_hex, uniform_hex_colors,
};

const BRIGHTNESS_STEPS: [u8; 5] = [0, 10, 30, 60, 100];

fn swatch(entity_id: &str, background: String, key: &str, value: Value) -> Button {
    let mut data = Map::new();
    data.insert("entity_id".to_string(), Value::from(entity_id));
    data.insert(key.to_string(), value);
    Button {
        service: Some("light.turn_on".to_string()),
        service_data: Some(data),
        appearance: Appearance {
            icon_background_color: Some(background),
            ..Appearance::default()
        },
        ..Button::default()
    }
}

/// Synthesise the single-use "Lights" page for `entity_id`, laid out for `key_count` keys.
///
/// Colour and colour-temperature swatches fill the keys left over by the
/// brightness steps; the close key is always the last one.
pub fn light_page(entity_id: &str, palette: &LightPalette, key_count: usize) -> Result<Page> {
    let Some(usable) = key_count.checked_sub(1) else {
        return Err(anyhow!("A light page needs at least one key"));
    };
    let steps = BRIGHTNESS_STEPS.len().min(usable);
    let slots = usable - steps;
    let kelvins = &palette.color_temp_kelvin[..palette.color_temp_kelvin.len().min(slots)];
    let color_slots = slots - kelvins.len();

    let colors = match (&palette.colors, &palette.colormap) {
        (Some(colors), _) => colors.iter().take(color_slots).cloned().collect(),
        (None, Some(colormap)) => colormap_hex_colors(color_slots, colormap)?,
        (None, None) => uniform_hex_colors(color_slots),
    };
    let dropped = palette.colors.as_ref().map_or(0, |c| c.len().saturating_sub(color_slots))
        + (palette.color_temp_kelvin.len() - kelvins.len());
    if dropped > 0 {
        warn!(
            "Light palette for {} has {} more swatches than fit on {} keys",
            entity_id, dropped, key_count
        );
    }

    let mut buttons = Vec::with_capacity(key_count);
    for color in colors {
        let rgb = parse_color(&color)?;
        buttons.push(swatch(entity_id, color, "rgb_color", Value::from(rgb.0.to_vec())));
    }

    for &kelvin in kelvins {
        let background = to_hex(color_temp_kelvin_to_rgb(kelvin));
        buttons.push(swatch(entity_id, background, "color_temp_kelvin", Value::from(kelvin)));
    }

    // Short decks drop the middle brightness steps
    let mut chosen = BRIGHTNESS_STEPS.to_vec();
    while chosen.len() > steps {
        chosen.remove(chosen.len() / 2);
    }
    for pct in chosen {
        let background = scale_hex_color("#ffffff", f64::from(pct) / 100.0)?;
        let mut button = swatch(entity_id, background.clone(), "brightness_pct", Value::from(pct));
        button.appearance.text = Some(format!("{}%", pct));
        button.appearance.text_color =
            Some(max_contrast_color(parse_color(&background)?).to_string());
        buttons.push(button);
    }

    buttons.push(Button {
        special_type: SpecialType::ClosePage,
        ..Button::default()
    });

    Ok(Page::new("Lights", buttons))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: usize = 10;

    #[test]
    fn test_default_palette_fills_the_deck() {
        let page = light_page("light.desk", &LightPalette::default(), KEYS).unwrap();
        assert_eq!(page.name, "Lights");
        assert_eq!(page.buttons.len(), KEYS);

        let first = &page.buttons[0];
        assert_eq!(first.service.as_deref(), Some("light.turn_on"));
        let data = first.service_data.as_ref().unwrap();
        assert_eq!(data["entity_id"], Value::from("light.desk"));
        assert_eq!(data["rgb_color"], serde_json::json!([255, 255, 255]));

        assert_eq!(page.buttons[KEYS - 1].special_type, SpecialType::ClosePage);
    }

    #[test]
    fn test_brightness_buttons() {
        let page = light_page("light.desk", &LightPalette::default(), KEYS).unwrap();
        let labels = page.buttons[KEYS - 6..KEYS - 1]
            .iter()
            .map(|b| b.appearance.text.clone().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(labels, ["0%", "10%", "30%", "60%", "100%"]);

        let dark = &page.buttons[KEYS - 6];
        assert_eq!(dark.appearance.icon_background_color.as_deref(), Some("#000000"));
        assert_eq!(dark.appearance.text_color.as_deref(), Some("#FFFFFF"));

        let full = &page.buttons[KEYS - 2];
        assert_eq!(full.appearance.text_color.as_deref(), Some("#000000"));
        assert_eq!(
            full.service_data.as_ref().unwrap()["brightness_pct"],
            Value::from(100)
        );
    }

    #[test]
    fn test_explicit_colors_and_kelvin() {
        let palette = LightPalette {
            colors: Some(vec!["red".to_string(), "#00ff00".to_string()]),
            color_temp_kelvin: vec![2700],
            colormap: None,
        };
        let page = light_page("light.desk", &palette, KEYS).unwrap();
        assert_eq!(page.buttons.len(), 2 + 1 + 5 + 1);
        assert_eq!(
            page.buttons[0].service_data.as_ref().unwrap()["rgb_color"],
            serde_json::json!([255, 0, 0])
        );
        assert_eq!(
            page.buttons[2].service_data.as_ref().unwrap()["color_temp_kelvin"],
            Value::from(2700)
        );
    }

    #[test]
    fn test_long_palette_is_cut_to_fit() {
        let palette = LightPalette {
            colors: Some(vec!["red".to_string(); 8]),
            color_temp_kelvin: vec![2700, 4000],
            colormap: None,
        };
        let page = light_page("light.desk", &palette, KEYS).unwrap();
        assert_eq!(page.buttons.len(), KEYS);
        assert!(page.buttons[1].service_data.as_ref().unwrap().contains_key("rgb_color"));
        assert!(page.buttons[2].service_data.as_ref().unwrap().contains_key("color_temp_kelvin"));
        assert_eq!(page.buttons[KEYS - 1].special_type, SpecialType::ClosePage);
    }

    #[test]
    fn test_small_deck_keeps_close_key() {
        let page = light_page("light.desk", &LightPalette::default(), 4).unwrap();
        assert_eq!(page.buttons.len(), 4);
        let labels = page.buttons[..3]
            .iter()
            .map(|b| b.appearance.text.clone().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(labels, ["0%", "10%", "100%"]);
        assert_eq!(page.buttons[3].special_type, SpecialType::ClosePage);
        assert!(light_page("light.desk", &LightPalette::default(), 0).is_err());
    }

    #[test]
    fn test_colormap_palette() {
        let palette = LightPalette {
            colormap: Some("gray".to_string()),
            ..LightPalette::default()
        };
        let page = light_page("light.desk", &palette, KEYS).unwrap();
        assert_eq!(
            page.buttons[0].appearance.icon_background_color.as_deref(),
            Some("#000000")
        );
        assert_eq!(
            page.buttons[3].appearance.icon_background_color.as_deref(),
            Some("#ffffff")
        );
    }
}
