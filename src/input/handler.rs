use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// How a key press ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Short,
    Long,
}

/// Measures key hold times; a press is classified when the key is released
pub struct PressTracker {
    long_press: Duration,
    press_times: HashMap<usize, Instant>,
    /// Presses fully handled on key down; their release is ignored
    consumed: HashSet<usize>,
}

impl PressTracker {
    pub fn new(long_press: Duration) -> Self {
        Self {
            long_press,
            press_times: HashMap::new(),
            consumed: HashSet::new(),
        }
    }

    pub fn set_threshold(&mut self, long_press: Duration) {
        self.long_press = long_press;
    }

    pub fn press(&mut self, key: usize) {
        self.consumed.remove(&key);
        self.press_times.insert(key, Instant::now());
    }

    /// Mark the current press as handled so its release fires nothing
    pub fn consume(&mut self, key: usize) {
        self.press_times.remove(&key);
        self.consumed.insert(key);
    }

    pub fn is_held(&self, key: usize) -> bool {
        self.press_times.contains_key(&key)
    }

    pub fn release(&mut self, key: usize) -> Option<Press> {
        if self.consumed.remove(&key) {
            debug!("Key {} released (handled on press)", key);
            return None;
        }
        let held = self.press_times.remove(&key)?.elapsed();
        let press = if held >= self.long_press {
            Press::Long
        } else {
            Press::Short
        };
        debug!("Key {} released after {:?} ({:?})", key, held, press);
        Some(press)
    }

    /// Forget all presses, e.g. after the page changed under the finger
    pub fn clear(&mut self) {
        self.press_times.clear();
        self.consumed.clear();
    }
}
