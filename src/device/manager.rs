use anyhow::{anyhow, Result};
use image::{imageops, DynamicImage, Rgb, RgbImage};
use mirajazz::{
    device::{list_devices, Device},
    types::{DeviceInput, ImageFormat, ImageMirroring, ImageMode, ImageRotation},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::protocol::*;
use super::{Deck, InputEvent};

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Previous button/encoder states for edge detection
struct InputState {
    buttons: Vec<bool>,
    encoders: Vec<bool>,
}

impl InputState {
    fn new() -> Self {
        Self {
            buttons: vec![false; DISPLAY_COUNT],
            encoders: vec![false; ENCODER_COUNT],
        }
    }

    /// Turn a raw state report into edge events
    fn edges(&mut self, input: DeviceInput) -> Vec<InputEvent> {
        let mut events = Vec::new();
        match input {
            DeviceInput::NoData => {}

            DeviceInput::ButtonStateChange(states) => {
                for (i, &pressed) in states.iter().enumerate().take(self.buttons.len()) {
                    let was_pressed = self.buttons[i];
                    if i >= KEY_COUNT {
                        // Strip soft buttons report presses only
                        if pressed {
                            let x = dial_slot_center(i - KEY_COUNT);
                            events.push(InputEvent::TouchShort { x });
                        }
                        continue;
                    }
                    self.buttons[i] = pressed;
                    if pressed && !was_pressed {
                        events.push(InputEvent::KeyDown(i));
                    } else if !pressed && was_pressed {
                        events.push(InputEvent::KeyUp(i));
                    }
                }
            }

            DeviceInput::EncoderStateChange(states) => {
                for (i, &pressed) in states.iter().enumerate().take(self.encoders.len()) {
                    let was_pressed = self.encoders[i];
                    if pressed && !was_pressed {
                        // The device doesn't send release events; reset to allow the next press
                        self.encoders[i] = false;
                        events.push(InputEvent::DialPush(i));
                    } else if !pressed && was_pressed {
                        self.encoders[i] = false;
                        events.push(InputEvent::DialRelease(i));
                    }
                }
            }

            DeviceInput::EncoderTwist(directions) => {
                for (i, &dir) in directions.iter().enumerate() {
                    if dir != 0 {
                        events.push(InputEvent::DialTurn {
                            dial: i,
                            ticks: dir as i32,
                        });
                    }
                }
            }
        }
        events
    }
}

/// Manages connection to the AJAZZ AKP05E / Mirabox N4
pub struct DeviceManager {
    device: Arc<Device>,
    /// Last full strip image; region updates are drawn into it
    strip: RgbImage,
}

impl DeviceManager {
    /// Connect to the first compatible device
    pub async fn connect() -> Result<Self> {
        info!("Connecting to device...");

        let devices = list_devices(&[VENDOR_ID])
            .await
            .map_err(|e| anyhow!("Failed to enumerate devices: {}", e))?;

        let serial = devices
            .iter()
            .find(|(vid, pid, _)| *vid == VENDOR_ID && *pid == PRODUCT_ID)
            .map(|(_, _, s)| s.clone())
            .ok_or_else(|| anyhow!("No compatible device found"))?;

        info!("Found device with serial: {}", serial);

        // N4/AKP05E: v2 protocol, supports both states
        let device = Device::connect(
            VENDOR_ID,
            PRODUCT_ID,
            serial,
            true,
            true,
            DISPLAY_COUNT,
            ENCODER_COUNT,
        )
        .await
        .map_err(|e| anyhow!("Failed to connect to device: {}", e))?;

        info!("Connected to device");

        Ok(Self {
            device: Arc::new(device),
            strip: RgbImage::from_pixel(STRIP_WIDTH, STRIP_HEIGHT, Rgb([0, 0, 0])),
        })
    }

    fn key_image_format() -> ImageFormat {
        ImageFormat {
            mode: ImageMode::JPEG,
            size: (KEY_WIDTH as usize, KEY_HEIGHT as usize),
            rotation: ImageRotation::Rot180,
            mirror: ImageMirroring::None,
        }
    }

    fn strip_image_format() -> ImageFormat {
        ImageFormat {
            mode: ImageMode::JPEG,
            size: (STRIP_WIDTH as usize, STRIP_HEIGHT as usize),
            rotation: ImageRotation::Rot180,
            mirror: ImageMirroring::None,
        }
    }

    async fn flush(&self) -> Result<()> {
        self.device
            .flush()
            .await
            .map_err(|e| anyhow!("Failed to flush images: {}", e))
    }

    /// Read input and keep the connection alive until the device goes away
    /// or `events` is closed
    pub fn spawn_input_pump<E>(&self, events: mpsc::UnboundedSender<E>) -> JoinHandle<()>
    where
        E: From<InputEvent> + Send + 'static,
    {
        let device = Arc::clone(&self.device);
        tokio::spawn(async move {
            let mut state = InputState::new();
            let mut last_keep_alive = Instant::now();

            loop {
                if last_keep_alive.elapsed() >= KEEP_ALIVE_INTERVAL {
                    if let Err(e) = device.keep_alive().await {
                        warn!("Failed to send keep-alive: {}", e);
                    }
                    last_keep_alive = Instant::now();
                }

                match device.read_input(Some(READ_TIMEOUT), process_input).await {
                    Ok(input) => {
                        for event in state.edges(input) {
                            debug!("Input: {:?}", event);
                            if events.send(E::from(event)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        if e.to_string().contains("Disconnected") {
                            error!("Device disconnected");
                            return;
                        }
                        warn!("Error reading device input: {}", e);
                    }
                }
            }
        })
    }
}

impl Deck for DeviceManager {
    fn key_count(&self) -> usize {
        KEY_COUNT
    }

    fn dial_count(&self) -> usize {
        ENCODER_COUNT
    }

    fn key_image_size(&self) -> (u32, u32) {
        (KEY_WIDTH, KEY_HEIGHT)
    }

    fn touchscreen_size(&self) -> (u32, u32) {
        (STRIP_WIDTH, STRIP_HEIGHT)
    }

    async fn set_key_image(&mut self, key: usize, image: Option<RgbImage>) -> Result<()> {
        if key >= KEY_COUNT {
            return Err(anyhow!("Invalid key index: {}", key));
        }
        let image =
            image.unwrap_or_else(|| RgbImage::from_pixel(KEY_WIDTH, KEY_HEIGHT, Rgb([0, 0, 0])));

        self.device
            .set_button_image(
                key_to_display_key(key),
                Self::key_image_format(),
                DynamicImage::ImageRgb8(image),
            )
            .await
            .map_err(|e| anyhow!("Failed to set key image: {}", e))?;
        self.flush().await
    }

    async fn set_touchscreen_image(
        &mut self,
        image: RgbImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let image = if image.dimensions() == (width, height) {
            image
        } else {
            imageops::resize(&image, width, height, imageops::FilterType::Triangle)
        };
        imageops::replace(&mut self.strip, &image, x as i64, y as i64);
        debug!("Setting strip region {}x{} at ({}, {})", width, height, x, y);

        self.device
            .set_button_image(
                0,
                Self::strip_image_format(),
                DynamicImage::ImageRgb8(self.strip.clone()),
            )
            .await
            .map_err(|e| anyhow!("Failed to set strip image: {}", e))?;
        self.flush().await
    }

    async fn set_brightness(&mut self, percent: u8) -> Result<()> {
        let percent = percent.min(100);
        debug!("Setting brightness to {}%", percent);
        self.device
            .set_brightness(percent)
            .await
            .map_err(|e| anyhow!("Failed to set brightness: {}", e))
    }

    async fn reset(&mut self) -> Result<()> {
        debug!("Resetting device");
        self.strip = RgbImage::from_pixel(STRIP_WIDTH, STRIP_HEIGHT, Rgb([0, 0, 0]));
        self.device
            .reset()
            .await
            .map_err(|e| anyhow!("Failed to reset device: {}", e))
    }
}

/// Input processing function for mirajazz
///
/// For N4/AKP05E:
/// - event_type (data[9]): Action identifier
///   - 0x01-0x05: Top row keys (logical 0-4)
///   - 0x06-0x0a: Bottom row keys (logical 5-9)
///   - 0x33, 0x35, 0x36, 0x37: Encoder presses
///   - 0x40-0x43: LCD strip soft buttons (0-3)
///   - 0x50/0x51, 0x70/0x71, 0x90/0x91, 0xa0/0xa1: Encoder rotate CCW/CW
/// - state (data[10]): 0x00 = release, non-zero = press
fn process_input(event_type: u8, state: u8) -> Result<DeviceInput, mirajazz::error::MirajazzError> {
    debug!("HID: type=0x{:02x}, state=0x{:02x}", event_type, state);

    let twist = |encoder: usize, clockwise: bool| {
        let mut directions = vec![0i8; ENCODER_COUNT];
        directions[encoder] = if clockwise { 1 } else { -1 };
        DeviceInput::EncoderTwist(directions)
    };

    let input = match event_type {
        0x01..=0x0a => {
            let mut buttons = vec![false; DISPLAY_COUNT];
            buttons[(event_type - 1) as usize] = state != 0;
            DeviceInput::ButtonStateChange(buttons)
        }

        // Left to right: 0x37, 0x35, 0x33, 0x36
        0x33 | 0x35 | 0x36 | 0x37 => {
            let mut encoders = vec![false; ENCODER_COUNT];
            let encoder_idx = match event_type {
                0x37 => 0,
                0x35 => 1,
                0x33 => 2,
                _ => 3,
            };
            encoders[encoder_idx] = state != 0;
            DeviceInput::EncoderStateChange(encoders)
        }

        0xa0 | 0xa1 => twist(0, event_type == 0xa1),
        0x50 | 0x51 => twist(1, event_type == 0x51),
        0x90 | 0x91 => twist(2, event_type == 0x91),
        0x70 | 0x71 => twist(3, event_type == 0x71),

        0x40..=0x43 => {
            let mut buttons = vec![false; DISPLAY_COUNT];
            buttons[(event_type - 0x40) as usize + KEY_COUNT] = true;
            DeviceInput::ButtonStateChange(buttons)
        }

        0x00 => DeviceInput::NoData,

        _ => {
            info!(
                "Unknown HID event: type=0x{:02x}, state=0x{:02x}",
                event_type, state
            );
            DeviceInput::NoData
        }
    };
    Ok(input)
}
