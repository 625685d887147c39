use anyhow::{anyhow, Result};
use image::RgbImage;

use super::{Deck, KEY_COUNT, KEY_HEIGHT, KEY_WIDTH, STRIP_HEIGHT, STRIP_WIDTH};

/// Deck that records what was drawn on it
pub struct MemoryDeck {
    pub keys: Vec<Option<RgbImage>>,
    /// Every touchscreen write as (x, y, width, height)
    pub touch_writes: Vec<(u32, u32, u32, u32)>,
    pub brightness: Option<u8>,
    pub resets: usize,
    pub key_writes: usize,
}

impl MemoryDeck {
    pub fn new() -> Self {
        Self {
            keys: vec![None; KEY_COUNT],
            touch_writes: Vec::new(),
            brightness: None,
            resets: 0,
            key_writes: 0,
        }
    }

    pub fn is_blank(&self, key: usize) -> bool {
        self.keys[key].is_none()
    }
}

impl Deck for MemoryDeck {
    fn key_count(&self) -> usize {
        KEY_COUNT
    }

    fn dial_count(&self) -> usize {
        4
    }

    fn key_image_size(&self) -> (u32, u32) {
        (KEY_WIDTH, KEY_HEIGHT)
    }

    fn touchscreen_size(&self) -> (u32, u32) {
        (STRIP_WIDTH, STRIP_HEIGHT)
    }

    async fn set_key_image(&mut self, key: usize, image: Option<RgbImage>) -> Result<()> {
        let slot = self
            .keys
            .get_mut(key)
            .ok_or_else(|| anyhow!("Invalid key index: {}", key))?;
        *slot = image;
        self.key_writes += 1;
        Ok(())
    }

    async fn set_touchscreen_image(
        &mut self,
        _image: RgbImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.touch_writes.push((x, y, width, height));
        Ok(())
    }

    async fn set_brightness(&mut self, percent: u8) -> Result<()> {
        self.brightness = Some(percent);
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.keys = vec![None; KEY_COUNT];
        self.resets += 1;
        Ok(())
    }
}
