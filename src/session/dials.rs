use anyhow::Result;
use tracing::{debug, info};

use super::{seconds, Session};
use crate::config::PageId;
use crate::device::Deck;
use crate::timer::TimerKey;

impl<D: Deck> Session<D> {
    /// Move the dial value immediately; the service call waits for the turn delay
    pub(super) async fn dial_turn(&mut self, index: usize, ticks: i32) -> Result<()> {
        self.reset_inactivity();
        if !self.config.is_on() {
            return self.wake().await;
        }
        let page = self.config.visible_page_id();
        let Some(dial) = self.config.dial_mut(index) else {
            return Ok(());
        };
        let Some(turn) = dial.turn.as_mut() else {
            return Ok(());
        };
        turn.properties.increment(ticks);
        debug!("Dial {} turned {} to {}", index, ticks, turn.properties.state);

        let delay = dial.rendered(&self.states).turn_delay_seconds();
        self.redraw_dial(index).await?;

        if delay > 0.0 {
            self.timers.start(TimerKey::Dial { page, index }, seconds(delay));
        } else {
            self.call_dial_turn(&page, index);
        }
        Ok(())
    }

    pub(super) async fn dial_push(&mut self, index: usize) -> Result<()> {
        self.reset_inactivity();
        if !self.config.is_on() {
            return self.wake().await;
        }
        let Some(dial) = self.config.dial(index) else {
            return Ok(());
        };
        if let Some(action) = dial.rendered(&self.states).push_action() {
            self.call_service(&action);
        }
        Ok(())
    }

    /// Send the dial's turn service with its current value
    pub(super) fn call_dial_turn(&mut self, page: &PageId, index: usize) {
        let Some(dial) = self.config.page(page).and_then(|p| p.dials.get(index)) else {
            debug!("Dial {} is no longer on {:?}", index, page);
            return;
        };
        if let Some(action) = dial.rendered(&self.states).turn_action() {
            self.call_service(&action);
        }
    }

    /// Short touch sets the dial under the finger to its minimum, long touch to its maximum
    pub(super) async fn touch(&mut self, x: u32, long: bool) -> Result<()> {
        self.reset_inactivity();
        if !self.config.is_on() {
            return self.wake().await;
        }
        let (width, _) = self.dial_size();
        let index = (x / width.max(1)) as usize;
        let page = self.config.visible_page_id();

        let Some(dial) = self.config.dial_mut(index) else {
            return Ok(());
        };
        if !dial.allow_touchscreen_events {
            debug!("Dial {} ignores touches", index);
            return Ok(());
        }
        let Some(turn) = dial.turn.as_mut() else {
            return Ok(());
        };
        let limits = turn.properties.limits();
        turn.properties
            .set_state(if long { limits.max } else { limits.min });
        info!("Dial {} set to {} by touch", index, turn.properties.state);

        let timer = TimerKey::Dial {
            page: page.clone(),
            index,
        };
        self.timers.cancel(&timer);
        self.redraw_dial(index).await?;
        self.call_dial_turn(&page, index);
        Ok(())
    }

    /// Swipe left for the next page, right for the previous one
    pub(super) async fn touch_drag(&mut self, x: u32, x_out: u32) -> Result<()> {
        self.reset_inactivity();
        if !self.config.is_on() {
            return self.wake().await;
        }
        if x > x_out {
            self.config.next_page();
        } else {
            self.config.previous_page();
        }
        self.page_changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, Harness};
    use crate::device::InputEvent;
    use serde_json::json;
    use std::time::Duration;

    const CONFIG: &str = r#"
pages:
  - name: Home
    dials:
      - entity_id: input_number.volume
        text: "{{ dial_value() }}"
        turn:
          service: input_number.set_value
          service_data:
            value: "{{ dial_value() }}"
          delay: 0.1
          properties: {min: 0, max: 100, step: 5}
        push:
          service: input_number.reset
      - entity_id: input_number.bass
        allow_touchscreen_events: true
        turn:
          service: input_number.set_value
          service_data:
            value: "{{ dial_value() }}"
          properties: {min: -10, max: 10, step: 1}
  - name: Second
"#;

    fn props(h: &Harness, index: usize) -> f64 {
        h.session.config().pages[0].dials[index]
            .turn
            .as_ref()
            .unwrap()
            .properties
            .state
    }

    #[tokio::test]
    async fn test_turns_coalesce_into_one_call() {
        let mut h = Harness::new(CONFIG);
        h.send(InputEvent::DialTurn { dial: 0, ticks: 3 }).await;
        h.send(InputEvent::DialTurn { dial: 0, ticks: 3 }).await;
        assert_eq!(props(&h, 0), 30.0);
        assert!(h.calls().is_empty());

        h.settle_for(Duration::from_millis(300)).await;
        assert_eq!(
            h.calls(),
            vec![call(
                "input_number.set_value",
                json!({"value": "30.0", "entity_id": "input_number.volume"})
            )]
        );
    }

    #[tokio::test]
    async fn test_turn_without_delay_calls_immediately() {
        let mut h = Harness::new(CONFIG);
        h.send(InputEvent::DialTurn { dial: 1, ticks: -30 }).await;
        assert_eq!(props(&h, 1), -10.0);
        assert_eq!(
            h.calls(),
            vec![call(
                "input_number.set_value",
                json!({"value": "-10.0", "entity_id": "input_number.bass"})
            )]
        );
    }

    #[tokio::test]
    async fn test_push() {
        let mut h = Harness::new(CONFIG);
        h.send(InputEvent::DialPush(0)).await;
        h.send(InputEvent::DialRelease(0)).await;
        assert_eq!(
            h.calls(),
            vec![call("input_number.reset", json!({"entity_id": "input_number.volume"}))]
        );
    }

    #[tokio::test]
    async fn test_touch_sets_extremes() {
        let mut h = Harness::new(CONFIG);
        // Dial 1 owns x in 200..400
        h.send(InputEvent::TouchLong { x: 250 }).await;
        assert_eq!(props(&h, 1), 10.0);
        h.send(InputEvent::TouchShort { x: 399 }).await;
        assert_eq!(props(&h, 1), -10.0);
        assert_eq!(h.calls().len(), 2);

        // Dial 0 does not accept touches
        h.send(InputEvent::TouchLong { x: 10 }).await;
        assert_eq!(props(&h, 0), 0.0);
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_drag_changes_page() {
        let mut h = Harness::new(CONFIG);
        h.send(InputEvent::TouchDrag { x: 600, x_out: 100 }).await;
        assert_eq!(h.session.config().current_page_index(), 1);
        h.send(InputEvent::TouchDrag { x: 100, x_out: 600 }).await;
        assert_eq!(h.session.config().current_page_index(), 0);
    }
}
