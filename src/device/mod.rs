//! Deck hardware abstraction
//!
//! The session drives any [`Deck`]; [`DeviceManager`] talks to the real
//! hardware over HID and forwards its input as [`InputEvent`]s.

mod manager;
#[cfg(test)]
mod memory;
mod protocol;

use anyhow::Result;
use image::RgbImage;
use std::future::Future;

pub use manager::DeviceManager;
#[cfg(test)]
pub use memory::MemoryDeck;
pub use protocol::*;

/// Input from the deck, already reduced to press/release edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(usize),
    KeyUp(usize),
    /// Positive ticks turn clockwise
    DialTurn { dial: usize, ticks: i32 },
    DialPush(usize),
    DialRelease(usize),
    TouchShort { x: u32 },
    TouchLong { x: u32 },
    /// Swipe starting at `x` and ending at `x_out`
    TouchDrag { x: u32, x_out: u32 },
}

/// Output side of a deck
pub trait Deck {
    fn key_count(&self) -> usize;

    fn dial_count(&self) -> usize;

    fn key_image_size(&self) -> (u32, u32);

    fn touchscreen_size(&self) -> (u32, u32);

    /// `None` clears the key
    fn set_key_image(
        &mut self,
        key: usize,
        image: Option<RgbImage>,
    ) -> impl Future<Output = Result<()>>;

    /// Draw `image` into the touchscreen region at (`x`, `y`) sized `width` x `height`
    fn set_touchscreen_image(
        &mut self,
        image: RgbImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> impl Future<Output = Result<()>>;

    /// 0-100
    fn set_brightness(&mut self, percent: u8) -> impl Future<Output = Result<()>>;

    /// Blank every display
    fn reset(&mut self) -> impl Future<Output = Result<()>>;
}
