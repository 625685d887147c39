use anyhow::Result;
use tracing::{debug, info, warn};

use super::{seconds, RenderTarget, Session};
use crate::config::{light_page, Action, PageId, SpecialType};
use crate::device::Deck;
use crate::display::Face;
use crate::input::Press;
use crate::timer::TimerKey;

impl<D: Deck> Session<D> {
    pub(super) async fn key_down(&mut self, key: usize) -> Result<()> {
        self.reset_inactivity();
        if !self.config.is_on() {
            self.presses.consume(key);
            return self.wake().await;
        }
        let Some(button) = self.config.button(key) else {
            return Ok(());
        };

        let delay = button.rendered(&self.states).delay_seconds();
        if delay > 0.0 {
            // Armed keys act on timer expiry, never on release
            self.presses.consume(key);
            let timer = TimerKey::Button {
                page: self.config.visible_page_id(),
                index: key,
            };
            if self.timers.cancel(&timer) {
                info!("Key {} disarmed", key);
            } else {
                info!("Key {} armed for {}s", key, delay);
                self.timers.start(timer, seconds(delay));
            }
        } else {
            self.presses.press(key);
        }
        self.redraw_key(key).await
    }

    pub(super) async fn key_up(&mut self, key: usize) -> Result<()> {
        let press = self.presses.release(key);
        if !self.config.is_on() {
            return Ok(());
        }
        self.redraw_key(key).await?;

        let Some(press) = press else {
            return Ok(());
        };
        let Some(button) = self.config.button(key) else {
            return Ok(());
        };
        let button = button.rendered(&self.states);
        let action = match press {
            Press::Long => button.long_press_action().unwrap_or_else(|| button.action()),
            Press::Short => button.action(),
        };
        debug!("Key {} {:?} press", key, press);
        self.perform(action).await
    }

    /// An armed key's countdown ran out
    pub(super) async fn armed_key_fired(&mut self, page: PageId, index: usize) -> Result<()> {
        let Some(button) = self.config.page(&page).and_then(|p| p.buttons.get(index)) else {
            debug!("Armed key {} is no longer on {:?}", index, page);
            return Ok(());
        };
        let action = button.rendered(&self.states).action();
        info!("Armed key {} fired", index);
        if page == self.config.visible_page_id() {
            self.redraw_key(index).await?;
        }
        self.perform(action).await
    }

    /// Run a key action, then close a detached page unless the action navigated
    pub(super) async fn perform(&mut self, action: Action) -> Result<()> {
        match &action.special_type {
            SpecialType::NextPage => {
                self.config.next_page();
                self.page_changed().await?;
            }
            SpecialType::PreviousPage => {
                self.config.previous_page();
                self.page_changed().await?;
            }
            SpecialType::ClosePage => {
                self.config.close_page();
                self.page_changed().await?;
            }
            SpecialType::GoToPage(target) => {
                if self.config.to_page(target) {
                    self.page_changed().await?;
                }
                return Ok(());
            }
            SpecialType::TurnOff => {
                self.turn_off().await?;
                self.sync_input_boolean(false);
            }
            SpecialType::LightControl(palette) => {
                let Some(entity_id) = action.entity_id.as_deref() else {
                    warn!("light-control needs an entity_id");
                    return Ok(());
                };
                match light_page(entity_id, palette, self.deck.key_count()) {
                    Ok(page) => {
                        self.config.load_page_as_detached(page);
                        self.page_changed().await?;
                    }
                    Err(e) => warn!("Failed to build light page for {}: {:#}", entity_id, e),
                }
                return Ok(());
            }
            SpecialType::Reload => {
                return self.reload().await;
            }
            SpecialType::Empty => {}
            SpecialType::None => self.call_service(&action),
        }

        if self.config.is_detached() {
            self.config.close_detached_page();
            self.page_changed().await?;
        }
        Ok(())
    }

    /// Draw the key as it should look now: countdown, face or blank
    pub(super) async fn redraw_key(&mut self, key: usize) -> Result<()> {
        if !self.config.is_on() || key >= self.deck.key_count() {
            return Ok(());
        }
        let blank = self
            .config
            .button(key)
            .map_or(true, |b| b.special_type == SpecialType::Empty);
        if blank {
            self.invalidate(RenderTarget::Key(key));
            return self.deck.set_key_image(key, None).await;
        }
        let Some(button) = self.config.button(key) else {
            return Ok(());
        };

        let timer = TimerKey::Button {
            page: self.config.visible_page_id(),
            index: key,
        };
        let face = match self.timers.progress(&timer) {
            Some((remaining, delay)) => Face::countdown(
                remaining.as_secs_f64(),
                delay.as_secs_f64(),
                &button.appearance,
            ),
            None => {
                let rendered = button.rendered(&self.states);
                Face::for_button(&rendered, &self.states, self.presses.is_held(key))
            }
        };
        self.request_render(RenderTarget::Key(key), face);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, Harness};
    use crate::config::PageId;
    use crate::device::InputEvent;
    use crate::hub::HubEvent;
    use crate::state::EntityState;
    use serde_json::json;
    use std::time::Duration;

    const CONFIG: &str = r#"
long_press_duration: 0.1
pages:
  - name: Home
    buttons:
      - entity_id: input_boolean.lamp
        service: input_boolean.toggle
        long_press:
          service: input_boolean.turn_off
      - entity_id: input_boolean.fan
        service: input_boolean.toggle
        delay: 0.2
      - special_type: go-to-page
        special_type_data: Overlay
      - entity_id: input_boolean.tv
        service: input_boolean.toggle
      - special_type: empty
      - special_type: light-control
        entity_id: light.desk
      - special_type: reload
  - name: Second
    buttons:
      - text: second
anonymous_pages:
  - name: Overlay
    buttons:
      - service: script.one
      - special_type: next-page
"#;

    async fn click(h: &mut Harness, key: usize) {
        h.send(InputEvent::KeyDown(key)).await;
        h.send(InputEvent::KeyUp(key)).await;
    }

    #[tokio::test]
    async fn test_short_press_calls_service_on_release() {
        let mut h = Harness::new(CONFIG);
        h.send(InputEvent::KeyDown(0)).await;
        assert!(h.calls().is_empty());
        h.send(InputEvent::KeyUp(0)).await;
        assert_eq!(
            h.calls(),
            vec![call("input_boolean.toggle", json!({"entity_id": "input_boolean.lamp"}))]
        );
    }

    #[tokio::test]
    async fn test_long_press_override_and_fallback() {
        let mut h = Harness::new(CONFIG);
        h.send(InputEvent::KeyDown(0)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.send(InputEvent::KeyUp(0)).await;
        assert_eq!(
            h.calls(),
            vec![call("input_boolean.turn_off", json!({"entity_id": "input_boolean.lamp"}))]
        );

        // No override: a long press does the normal thing
        h.send(InputEvent::KeyDown(3)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.send(InputEvent::KeyUp(3)).await;
        assert_eq!(
            h.calls(),
            vec![call("input_boolean.toggle", json!({"entity_id": "input_boolean.tv"}))]
        );
    }

    #[tokio::test]
    async fn test_armed_key_fires_after_delay() {
        let mut h = Harness::new(CONFIG);
        click(&mut h, 1).await;
        assert!(h.calls().is_empty());
        assert!(h.session.timers.is_sleeping(&crate::timer::TimerKey::Button {
            page: PageId::Primary(0),
            index: 1
        }));
        h.settle_for(Duration::from_millis(400)).await;
        assert_eq!(
            h.calls(),
            vec![call("input_boolean.toggle", json!({"entity_id": "input_boolean.fan"}))]
        );
    }

    #[tokio::test]
    async fn test_second_press_disarms() {
        let mut h = Harness::new(CONFIG);
        click(&mut h, 1).await;
        click(&mut h, 1).await;
        h.settle_for(Duration::from_millis(400)).await;
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_detached_page_closes_after_press() {
        let mut h = Harness::new(CONFIG);
        click(&mut h, 2).await;
        assert_eq!(h.session.config().current_page().name, "Overlay");

        click(&mut h, 0).await;
        assert_eq!(h.calls(), vec![call("script.one", json!({}))]);
        assert!(!h.session.config().is_detached());
        assert_eq!(h.session.config().current_page().name, "Home");
    }

    #[tokio::test]
    async fn test_next_page_from_overlay() {
        let mut h = Harness::new(CONFIG);
        click(&mut h, 2).await;
        click(&mut h, 1).await;
        assert!(!h.session.config().is_detached());
        assert_eq!(h.session.config().current_page().name, "Second");
    }

    #[tokio::test]
    async fn test_light_control_page() {
        let mut h = Harness::new(CONFIG);
        click(&mut h, 5).await;
        let page = h.session.config().current_page();
        assert_eq!(page.name, "Lights");
        assert!(h.session.config().is_detached());

        // First swatch sets a colour, then the palette closes
        click(&mut h, 0).await;
        let calls = h.calls();
        assert_eq!(calls.len(), 1);
        let crate::hub::HubCommand::CallService {
            service,
            service_data,
            ..
        } = &calls[0];
        assert_eq!(service, "light.turn_on");
        assert_eq!(service_data["entity_id"], "light.desk");
        assert!(service_data.contains_key("rgb_color"));
        assert_eq!(h.session.config().current_page().name, "Home");
    }

    #[tokio::test]
    async fn test_light_page_fits_deck() {
        let mut h = Harness::new(CONFIG);
        click(&mut h, 5).await;
        let keys = crate::device::KEY_COUNT;
        let page = h.session.config().current_page();
        assert_eq!(page.buttons.len(), keys);
        let labels = page
            .buttons
            .iter()
            .filter_map(|b| b.appearance.text.clone())
            .collect::<Vec<_>>();
        assert_eq!(labels, ["0%", "10%", "30%", "60%", "100%"]);

        // The last key closes the palette without calling anything
        click(&mut h, keys - 1).await;
        assert!(h.calls().is_empty());
        assert!(!h.session.config().is_detached());
        assert_eq!(h.session.config().current_page().name, "Home");
    }

    #[tokio::test]
    async fn test_empty_key_is_blank() {
        let mut h = Harness::new(CONFIG);
        h.session.start().await.unwrap();
        h.settle().await;
        assert!(h.deck().is_blank(4));
        assert!(!h.deck().is_blank(3));
        click(&mut h, 4).await;
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reload_key() {
        let mut h = Harness::new(CONFIG);
        std::fs::write(
            h.config_path(),
            "pages:\n  - name: Only\n    buttons:\n      - special_type: reload\n",
        )
        .unwrap();
        click(&mut h, 6).await;
        assert_eq!(h.session.config().pages.len(), 1);
        assert_eq!(h.session.config().current_page().name, "Only");
        assert_eq!(h.deck().resets, 1);
    }

    #[tokio::test]
    async fn test_template_face_follows_state() {
        let mut h = Harness::new(CONFIG);
        h.send(HubEvent::StateChanged {
            entity_id: "input_boolean.lamp".to_string(),
            new_state: Some(EntityState::new("input_boolean.lamp", "on")),
        })
        .await;
        h.settle().await;
        assert!(!h.deck().is_blank(0));
    }
}
