//! The event loop that owns the configuration, the state snapshot and the deck
//!
//! Everything that mutates the session arrives as a [`SessionEvent`] on one
//! channel: device input, hub traffic, timer expiries, finished renders and
//! the periodic ticks. Rendering itself runs on the blocking pool.

mod dials;
mod keys;
mod power;
pub mod redraw;

use anyhow::Result;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Action, DeckConfig, PageId};
use crate::device::{Deck, InputEvent};
use crate::display::{Compositor, Face};
use crate::hub::{HubCommand, HubEvent};
use crate::input::PressTracker;
use crate::state::{EntityState, StateSnapshot};
use crate::timer::{Expired, TimerKey, TimerRegistry};

use redraw::Redraw;

/// A display the session draws into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Key(usize),
    Dial(usize),
}

#[derive(Debug)]
pub enum SessionEvent {
    Input(InputEvent),
    Hub(HubEvent),
    Timer(Expired),
    Rendered {
        target: RenderTarget,
        generation: u64,
        image: RgbImage,
    },
    /// Once a second, advances countdown rings
    Tick,
    /// Once a second; only acted on while `auto_reload` is set
    ConfigPoll,
}

impl From<InputEvent> for SessionEvent {
    fn from(event: InputEvent) -> Self {
        SessionEvent::Input(event)
    }
}

impl From<HubEvent> for SessionEvent {
    fn from(event: HubEvent) -> Self {
        SessionEvent::Hub(event)
    }
}

impl From<Expired> for SessionEvent {
    fn from(expired: Expired) -> Self {
        SessionEvent::Timer(expired)
    }
}

pub struct Session<D> {
    config: DeckConfig,
    states: StateSnapshot,
    deck: D,
    compositor: Arc<Compositor>,
    timers: TimerRegistry<SessionEvent>,
    presses: PressTracker,
    hub: mpsc::UnboundedSender<HubCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Newest render request per display; older results are dropped
    generations: HashMap<RenderTarget, u64>,
    next_generation: u64,
    source_mtime: Option<SystemTime>,
}

impl<D: Deck> Session<D> {
    pub fn new(
        config: DeckConfig,
        deck: D,
        compositor: Arc<Compositor>,
        hub: mpsc::UnboundedSender<HubCommand>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let source_mtime = config.source().and_then(modified);
        Self {
            presses: PressTracker::new(config.long_press_threshold()),
            timers: TimerRegistry::new(events.clone()),
            config,
            states: StateSnapshot::new(),
            deck,
            compositor,
            hub,
            events,
            generations: HashMap::new(),
            next_generation: 0,
            source_mtime,
        }
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn deck(&self) -> &D {
        &self.deck
    }

    pub fn deck_mut(&mut self) -> &mut D {
        &mut self.deck
    }

    /// Draw the first page and arm the inactivity timer
    pub async fn start(&mut self) -> Result<()> {
        self.deck.set_brightness(self.config.brightness).await?;
        self.reset_inactivity();
        self.redraw_all().await
    }

    /// Handle events until the channel closes; errors are logged, not fatal
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(event).await {
                warn!("{:#}", e);
            }
        }
    }

    pub async fn handle(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Input(input) => self.handle_input(input).await,
            SessionEvent::Hub(HubEvent::Snapshot(states)) => {
                self.apply_snapshot(StateSnapshot::from_states(states)).await
            }
            SessionEvent::Hub(HubEvent::StateChanged {
                entity_id,
                new_state,
            }) => self.state_changed(&entity_id, new_state).await,
            SessionEvent::Timer(expired) => self.timer_expired(expired).await,
            SessionEvent::Rendered {
                target,
                generation,
                image,
            } => self.rendered(target, generation, image).await,
            SessionEvent::Tick => self.tick().await,
            SessionEvent::ConfigPoll => self.poll_config().await,
        }
    }

    async fn handle_input(&mut self, input: InputEvent) -> Result<()> {
        debug!("Input {:?}", input);
        match input {
            InputEvent::KeyDown(key) => self.key_down(key).await,
            InputEvent::KeyUp(key) => self.key_up(key).await,
            InputEvent::DialTurn { dial, ticks } => self.dial_turn(dial, ticks).await,
            InputEvent::DialPush(dial) => self.dial_push(dial).await,
            InputEvent::DialRelease(dial) => {
                debug!("Dial {} released", dial);
                Ok(())
            }
            InputEvent::TouchShort { x } => self.touch(x, false).await,
            InputEvent::TouchLong { x } => self.touch(x, true).await,
            InputEvent::TouchDrag { x, x_out } => self.touch_drag(x, x_out).await,
        }
    }

    async fn apply_snapshot(&mut self, states: StateSnapshot) -> Result<()> {
        info!("Received {} entity states", states.len());
        self.states = states;
        self.seed_dials(None);

        if let Some(id) = self.config.state_entity_id.clone() {
            if let Some(entity) = self.states.get(&id) {
                let on = entity.is_on();
                self.set_power(on).await?;
            }
        }
        if let Some(id) = self.config.brightness_entity_id.clone() {
            self.apply_brightness_entity(&id).await?;
        }
        self.redraw_all().await
    }

    async fn state_changed(
        &mut self,
        entity_id: &str,
        new_state: Option<EntityState>,
    ) -> Result<()> {
        self.states.update(entity_id, new_state);

        match redraw::resolve(&self.config, entity_id) {
            Redraw::Power => {
                let on = self.states.get(entity_id).is_some_and(|e| e.is_on());
                self.set_power(on).await
            }
            Redraw::Brightness => self.apply_brightness_entity(entity_id).await,
            Redraw::Widgets { keys, dials } => {
                self.seed_dials(Some(entity_id));
                for key in keys {
                    debug!("Updating key {} for {}", key, entity_id);
                    self.redraw_key(key).await?;
                }
                for dial in dials {
                    debug!("Updating dial {} for {}", dial, entity_id);
                    self.redraw_dial(dial).await?;
                }
                Ok(())
            }
            Redraw::Nothing => {
                self.seed_dials(Some(entity_id));
                Ok(())
            }
        }
    }

    async fn timer_expired(&mut self, expired: Expired) -> Result<()> {
        if !self.timers.take_expired(&expired) {
            debug!("Ignoring stale timer {:?}", expired.key);
            return Ok(());
        }
        match expired.key {
            TimerKey::Button { page, index } => self.armed_key_fired(page, index).await,
            TimerKey::Dial { page, index } => {
                self.call_dial_turn(&page, index);
                Ok(())
            }
            TimerKey::Inactivity => {
                info!("No activity, turning off");
                self.turn_off().await?;
                self.sync_input_boolean(false);
                Ok(())
            }
        }
    }

    /// Redraw keys whose countdown ring is running
    async fn tick(&mut self) -> Result<()> {
        let visible = self.config.visible_page_id();
        for key in self.timers.sleeping() {
            if let TimerKey::Button { page, index } = key {
                if page == visible {
                    self.redraw_key(index).await?;
                }
            }
        }
        Ok(())
    }

    async fn poll_config(&mut self) -> Result<()> {
        if !self.config.auto_reload {
            return Ok(());
        }
        let mtime = self.config.source().and_then(modified);
        if mtime.is_some() && mtime != self.source_mtime {
            info!("Configuration changed on disk");
            self.reload().await?;
        }
        Ok(())
    }

    /// Validate-then-swap; a rejected document keeps the running configuration
    async fn reload(&mut self) -> Result<()> {
        self.source_mtime = self.config.source().and_then(modified);
        if let Err(e) = self.config.reload() {
            warn!("Rejected configuration reload: {}", e);
            return Ok(());
        }

        self.timers.clear_widgets();
        self.timers.cancel(&TimerKey::Inactivity);
        self.compositor.forget_failures();
        self.presses.clear();
        self.presses.set_threshold(self.config.long_press_threshold());
        self.seed_dials(None);
        self.invalidate_all();
        self.deck.reset().await?;
        if self.config.is_on() {
            self.deck.set_brightness(self.config.brightness).await?;
        }
        self.reset_inactivity();
        self.redraw_all().await
    }

    /// Re-seed dial values from their entities, on every page.
    ///
    /// Dials waiting to send a turn keep their local value.
    fn seed_dials(&mut self, entity_id: Option<&str>) {
        let states = self.states.clone();
        let detached = self
            .config
            .detached_page()
            .map(|p| PageId::Detached(p.name.clone()));
        let page_ids = (0..self.config.pages.len())
            .map(PageId::Primary)
            .chain(detached)
            .collect::<Vec<_>>();

        for page_id in page_ids {
            let Some(page) = self.config.page_mut(&page_id) else {
                continue;
            };
            for (index, dial) in page.dials.iter_mut().enumerate() {
                if entity_id.is_some_and(|id| !dial.is_bound_to(id)) {
                    continue;
                }
                let timer = TimerKey::Dial {
                    page: page_id.clone(),
                    index,
                };
                if self.timers.is_sleeping(&timer) {
                    continue;
                }
                dial.sync_with_state(&states);
            }
        }
    }

    fn reset_inactivity(&mut self) {
        if let Some(timeout) = self.config.inactivity_timeout() {
            self.timers.start(TimerKey::Inactivity, timeout);
        }
    }

    /// Navigation happened; everything visible changes
    async fn page_changed(&mut self) -> Result<()> {
        debug!("Now showing {:?}", self.config.visible_page_id());
        self.presses.clear();
        self.redraw_all().await
    }

    fn call_service(&self, action: &Action) {
        let Some(service) = action.service.clone() else {
            return;
        };
        let command = HubCommand::CallService {
            service,
            service_data: action.service_payload(),
            target: action.target.clone(),
        };
        if self.hub.send(command).is_err() {
            warn!("Hub connection is gone; dropping service call");
        }
    }

    async fn redraw_all(&mut self) -> Result<()> {
        if !self.config.is_on() {
            return Ok(());
        }
        for key in 0..self.deck.key_count() {
            self.redraw_key(key).await?;
        }
        for dial in 0..self.deck.dial_count() {
            self.redraw_dial(dial).await?;
        }
        Ok(())
    }

    async fn redraw_dial(&mut self, index: usize) -> Result<()> {
        if !self.config.is_on() || index >= self.deck.dial_count() {
            return Ok(());
        }
        match self.config.dial(index) {
            Some(dial) => {
                let rendered = dial.rendered(&self.states);
                let face = Face::for_dial(&rendered, &self.states);
                self.request_render(RenderTarget::Dial(index), face);
                Ok(())
            }
            None => {
                self.invalidate(RenderTarget::Dial(index));
                let (w, h) = self.dial_size();
                let blank = RgbImage::from_pixel(w, h, Rgb([0, 0, 0]));
                let x = index as u32 * w;
                self.deck.set_touchscreen_image(blank, x, 0, w, h).await
            }
        }
    }

    fn dial_size(&self) -> (u32, u32) {
        let (w, h) = self.deck.touchscreen_size();
        (w / self.deck.dial_count().max(1) as u32, h)
    }

    fn request_render(&mut self, target: RenderTarget, face: Face) {
        let generation = self.invalidate(target);
        let size = match target {
            RenderTarget::Key(_) => self.deck.key_image_size(),
            RenderTarget::Dial(_) => self.dial_size(),
        };
        let compositor = Arc::clone(&self.compositor);
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let image = compositor.render(&face, size);
            let _ = events.send(SessionEvent::Rendered {
                target,
                generation,
                image,
            });
        });
    }

    /// Supersede any render in flight for `target`
    fn invalidate(&mut self, target: RenderTarget) -> u64 {
        self.next_generation += 1;
        self.generations.insert(target, self.next_generation);
        self.next_generation
    }

    fn invalidate_all(&mut self) {
        let targets = self.generations.keys().copied().collect::<Vec<_>>();
        for target in targets {
            self.invalidate(target);
        }
    }

    async fn rendered(&mut self, target: RenderTarget, generation: u64, image: RgbImage) -> Result<()> {
        if self.generations.get(&target) != Some(&generation) {
            debug!("Dropping stale render for {:?}", target);
            return Ok(());
        }
        if !self.config.is_on() {
            return Ok(());
        }
        match target {
            RenderTarget::Key(key) => self.deck.set_key_image(key, Some(image)).await,
            RenderTarget::Dial(index) => {
                let (w, h) = self.dial_size();
                self.deck
                    .set_touchscreen_image(image, index as u32 * w, 0, w, h)
                    .await
            }
        }
    }
}

fn modified(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Seconds from a templated delay field
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDeck;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    const ICONS: &[&str] = &[
        "chevron-right",
        "chevron-left",
        "book-open-page-variant",
        "arrow-u-left-bottom-bold",
        "power",
        "reload",
        "lightbulb",
        "power-socket-eu",
        "script",
    ];

    pub(super) struct Harness {
        pub session: Session<MemoryDeck>,
        pub events: mpsc::UnboundedReceiver<SessionEvent>,
        pub hub: mpsc::UnboundedReceiver<HubCommand>,
        pub dir: TempDir,
    }

    impl Harness {
        pub fn new(yaml: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            // Pre-seed vector icons so nothing is downloaded
            for name in ICONS {
                std::fs::write(
                    dir.path().join(format!("{}.svg", name)),
                    r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0h24v24H0z"/></svg>"#,
                )
                .unwrap();
            }
            let path = dir.path().join("configuration.yaml");
            std::fs::write(&path, yaml).unwrap();
            let config = DeckConfig::load(&path).unwrap();

            let compositor = Arc::new(Compositor::new(None, dir.path().to_path_buf(), 32, 32));
            let (tx, events) = mpsc::unbounded_channel();
            let (hub_tx, hub) = mpsc::unbounded_channel();
            let session = Session::new(config, MemoryDeck::new(), compositor, hub_tx, tx);
            Self {
                session,
                events,
                hub,
                dir,
            }
        }

        pub fn config_path(&self) -> std::path::PathBuf {
            self.dir.path().join("configuration.yaml")
        }

        /// Handle queued events until none arrives for `quiet`
        pub async fn settle_for(&mut self, quiet: Duration) {
            while let Ok(Some(event)) = tokio::time::timeout(quiet, self.events.recv()).await {
                self.session.handle(event).await.unwrap();
            }
        }

        pub async fn settle(&mut self) {
            self.settle_for(Duration::from_millis(150)).await;
        }

        pub async fn send(&mut self, event: impl Into<SessionEvent>) {
            self.session.handle(event.into()).await.unwrap();
        }

        pub fn calls(&mut self) -> Vec<HubCommand> {
            let mut calls = Vec::new();
            while let Ok(call) = self.hub.try_recv() {
                calls.push(call);
            }
            calls
        }

        pub fn deck(&self) -> &MemoryDeck {
            self.session.deck()
        }
    }

    pub(super) fn call(service: &str, data: serde_json::Value) -> HubCommand {
        let serde_json::Value::Object(service_data) = data else {
            panic!("service data must be an object");
        };
        HubCommand::CallService {
            service: service.to_string(),
            service_data,
            target: None,
        }
    }

    const TWO_PAGES: &str = r#"
pages:
  - name: Home
    buttons:
      - entity_id: input_boolean.a
        service: input_boolean.toggle
        text: A
      - entity_id: input_boolean.b
        text: "{{ 'on' if is_state('input_boolean.b', 'on') else 'off' }}"
      - special_type: next-page
  - name: Second
    buttons:
      - entity_id: input_boolean.b
        text: B
"#;

    #[tokio::test]
    async fn test_start_draws_visible_page() {
        let mut h = Harness::new(TWO_PAGES);
        h.session.start().await.unwrap();
        h.settle().await;
        let deck = h.deck();
        assert_eq!(deck.brightness, Some(100));
        assert!(!deck.is_blank(0));
        assert!(!deck.is_blank(2));
        assert!(deck.is_blank(3));
        assert_eq!(deck.touch_writes.len(), 4);
    }

    #[tokio::test]
    async fn test_state_change_redraws_only_bound_keys() {
        let mut h = Harness::new(TWO_PAGES);
        h.session.start().await.unwrap();
        h.settle().await;
        let before = h.deck().key_writes;

        h.send(HubEvent::StateChanged {
            entity_id: "input_boolean.b".to_string(),
            new_state: Some(EntityState::new("input_boolean.b", "on")),
        })
        .await;
        h.settle().await;
        assert_eq!(h.deck().key_writes, before + 1);

        // Not bound to anything visible
        h.send(HubEvent::StateChanged {
            entity_id: "sensor.elsewhere".to_string(),
            new_state: Some(EntityState::new("sensor.elsewhere", "1")),
        })
        .await;
        h.settle().await;
        assert_eq!(h.deck().key_writes, before + 1);
    }

    #[tokio::test]
    async fn test_stale_render_is_dropped() {
        let mut h = Harness::new(TWO_PAGES);
        let old = h.session.invalidate(RenderTarget::Key(0));
        h.session.invalidate(RenderTarget::Key(0));
        h.send(SessionEvent::Rendered {
            target: RenderTarget::Key(0),
            generation: old,
            image: RgbImage::new(112, 112),
        })
        .await;
        assert!(h.deck().is_blank(0));
    }

    #[tokio::test]
    async fn test_snapshot_seeds_dials_and_power() {
        let mut h = Harness::new(
            r#"
state_entity_id: input_boolean.deck
pages:
  - name: Home
    dials:
      - entity_id: input_number.volume
        turn:
          service: input_number.set_value
          properties: {min: 0, max: 100, step: 1}
"#,
        );
        h.session.start().await.unwrap();
        h.send(HubEvent::Snapshot(vec![
            EntityState::new("input_number.volume", "42"),
            EntityState::new("input_boolean.deck", "off"),
        ]))
        .await;
        h.settle().await;
        assert!(!h.session.config().is_on());
        assert_eq!(h.deck().brightness, Some(0));
        let state = h.session.config().pages[0].dials[0]
            .turn
            .as_ref()
            .unwrap()
            .properties
            .state;
        assert_eq!(state, 42.0);

        h.send(HubEvent::StateChanged {
            entity_id: "input_boolean.deck".to_string(),
            new_state: Some(EntityState::new("input_boolean.deck", "on")),
        })
        .await;
        h.settle().await;
        assert!(h.session.config().is_on());
        assert_eq!(h.deck().brightness, Some(100));
    }

    #[tokio::test]
    async fn test_brightness_entity() {
        let mut h = Harness::new(
            r#"
brightness_entity_id: light.deck
pages:
  - name: Home
"#,
        );
        h.send(HubEvent::StateChanged {
            entity_id: "light.deck".to_string(),
            new_state: Some(EntityState::new("light.deck", "on").with_attribute("brightness", 51)),
        })
        .await;
        assert_eq!(h.session.config().brightness, 20);
        assert_eq!(h.deck().brightness, Some(20));

        h.send(HubEvent::StateChanged {
            entity_id: "light.deck".to_string(),
            new_state: Some(EntityState::new("light.deck", "off")),
        })
        .await;
        assert_eq!(h.deck().brightness, Some(0));
    }

    #[tokio::test]
    async fn test_inactivity_turns_off() {
        let mut h = Harness::new(
            r#"
inactivity_time: 0.05
state_entity_id: input_boolean.deck
pages:
  - name: Home
"#,
        );
        h.session.start().await.unwrap();
        h.settle().await;
        assert!(!h.session.config().is_on());
        assert_eq!(h.deck().brightness, Some(0));
        assert_eq!(
            h.calls(),
            vec![HubCommand::CallService {
                service: "input_boolean.turn_off".to_string(),
                service_data: Default::default(),
                target: Some(json!({"entity_id": "input_boolean.deck"}).as_object().unwrap().clone()),
            }]
        );
    }

    #[tokio::test]
    async fn test_auto_reload_rejects_bad_document() {
        let mut h = Harness::new("auto_reload: true\npages:\n  - name: Home\n    buttons:\n      - text: one\n");
        h.session.start().await.unwrap();
        h.settle().await;

        write_later(&h.config_path(), "auto_reload: true\npages: []\n");
        h.send(SessionEvent::ConfigPoll).await;
        assert_eq!(h.session.config().pages[0].buttons.len(), 1);
        assert_eq!(h.deck().resets, 0);

        write_later(
            &h.config_path(),
            "auto_reload: true\npages:\n  - name: Home\n    buttons:\n      - text: one\n      - text: two\n",
        );
        h.send(SessionEvent::ConfigPoll).await;
        h.settle().await;
        assert_eq!(h.session.config().pages[0].buttons.len(), 2);
        assert_eq!(h.deck().resets, 1);
        assert!(!h.deck().is_blank(1));
    }

    #[tokio::test]
    async fn test_reload_disabling_inactivity_stops_the_timer() {
        let mut h = Harness::new("inactivity_time: 0.3\npages:\n  - name: Home\n");
        h.session.start().await.unwrap();
        assert!(h.session.timers.is_running(&TimerKey::Inactivity));

        std::fs::write(h.config_path(), "inactivity_time: -1\npages:\n  - name: Home\n").unwrap();
        h.session.reload().await.unwrap();
        assert_eq!(h.session.config().inactivity_timeout(), None);
        assert!(!h.session.timers.is_running(&TimerKey::Inactivity));

        h.settle_for(Duration::from_millis(600)).await;
        assert!(h.session.config().is_on());
    }

    #[tokio::test]
    async fn test_reload_can_enable_auto_reload() {
        let mut h = Harness::new("pages:\n  - name: Home\n    buttons:\n      - text: one\n");
        h.session.start().await.unwrap();
        h.settle().await;

        write_later(&h.config_path(), "pages:\n  - name: Home\n");
        h.send(SessionEvent::ConfigPoll).await;
        assert_eq!(h.session.config().pages[0].buttons.len(), 1);

        write_later(&h.config_path(), "auto_reload: true\npages:\n  - name: Home\n");
        h.session.reload().await.unwrap();
        assert!(h.session.config().auto_reload);

        write_later(
            &h.config_path(),
            "auto_reload: true\npages:\n  - name: Home\n    buttons:\n      - text: a\n      - text: b\n",
        );
        h.send(SessionEvent::ConfigPoll).await;
        assert_eq!(h.session.config().pages[0].buttons.len(), 2);
    }

    /// Rewrite a file so that its mtime visibly changes
    fn write_later(path: &Path, text: &str) {
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(path, text).unwrap();
        let later = SystemTime::now() + Duration::from_secs(1);
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(later).unwrap();
    }
}
