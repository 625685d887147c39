use serde::Deserialize;

use super::button::Button;
use super::dial::Dial;

/// A named set of keys and dials shown together
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Page {
    pub name: String,
    #[serde(default)]
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub dials: Vec<Dial>,
}

impl Page {
    pub fn new(name: &str, buttons: Vec<Button>) -> Self {
        Self {
            name: name.to_string(),
            buttons,
            dials: Vec::new(),
        }
    }

    /// Key positions whose button is bound to `entity_id`
    pub fn keys_bound_to(&self, entity_id: &str) -> Vec<usize> {
        self.buttons
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_bound_to(entity_id))
            .map(|(i, _)| i)
            .collect()
    }

    /// Dial positions bound to `entity_id`
    pub fn dials_bound_to(&self, entity_id: &str) -> Vec<usize> {
        self.dials
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_bound_to(entity_id))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_positions() {
        let page: Page = serde_yml::from_str(
            r#"
name: Home
buttons:
  - entity_id: light.x
  - entity_id: light.y
    linked_entity: light.x
  - text: plain
dials:
  - entity_id: light.x
"#,
        )
        .unwrap();
        assert_eq!(page.keys_bound_to("light.x"), vec![0, 1]);
        assert_eq!(page.keys_bound_to("light.y"), vec![1]);
        assert_eq!(page.dials_bound_to("light.x"), vec![0]);
        assert!(page.keys_bound_to("switch.z").is_empty());
    }
}
