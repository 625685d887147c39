use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage, RgbaImage};
use rusttype::Font;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::cache::LruCache;
use super::color::{parse_color, scale_color};
use super::download::{self, Fetch};
use super::face::Face;
use super::icon::{self, BaseIcon};
use super::text::{self, TextKey};

/// Brightness of vector icon fills relative to their configured colour
const MDI_OPACITY: f64 = 0.3;
const FAILED_BACKGROUND: Rgb<u8> = Rgb([255, 0, 0]);
const FAILED_TEXT: &str = "Rendering\nfailed";

type BaseKey = (BaseIcon, (u32, u32));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Load a TrueType font, or `None` (text is then not drawn)
pub fn load_font(path: &Path) -> Option<Font<'static>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to read font {}: {}; text will not be drawn", path.display(), e);
            return None;
        }
    };
    let font = Font::try_from_vec(data);
    if font.is_none() {
        warn!("Failed to parse font {}; text will not be drawn", path.display());
    }
    font
}

/// Turns faces into device images, memoising base images and text layers separately.
/// Shared between the session and blocking render tasks.
pub struct Compositor {
    font: Option<Font<'static>>,
    assets: PathBuf,
    base_cache: Mutex<LruCache<BaseKey, Arc<RgbImage>>>,
    text_cache: Mutex<LruCache<TextKey, Arc<RgbaImage>>>,
    failed: Mutex<HashMap<(u32, u32), Arc<RgbImage>>>,
    /// Remote icons that failed once; not fetched again until forgotten
    failed_sources: Mutex<HashSet<String>>,
    fetch: Box<Fetch>,
}

impl Compositor {
    pub fn new(
        font: Option<Font<'static>>,
        assets: PathBuf,
        base_cache_size: usize,
        text_cache_size: usize,
    ) -> Self {
        Self {
            font,
            assets,
            base_cache: Mutex::new(LruCache::new(base_cache_size)),
            text_cache: Mutex::new(LruCache::new(text_cache_size)),
            failed: Mutex::new(HashMap::new()),
            failed_sources: Mutex::new(HashSet::new()),
            fetch: Box::new(download::download),
        }
    }

    /// Replace the HTTP fetcher used for icons missing from the assets directory
    pub fn with_fetcher<F>(mut self, fetch: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.fetch = Box::new(fetch);
        self
    }

    /// Allow failed remote icons to be fetched again
    pub fn forget_failures(&self) {
        lock(&self.failed_sources).clear();
    }

    /// Render `face` at `size`; any failure yields the placeholder image
    pub fn render(&self, face: &Face, size: (u32, u32)) -> RgbImage {
        match self.try_render(face, size) {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to render {:?}: {:#}", face.text, e);
                self.failed_icon(size)
            }
        }
    }

    fn try_render(&self, face: &Face, size: (u32, u32)) -> Result<RgbImage> {
        let base = self.base_image(resolve_icon(face)?, size)?;
        let mut image = if face.grayscale {
            icon::grayscale(base.as_ref().clone())
        } else {
            base.as_ref().clone()
        };

        let layer = self.text_layer(TextKey {
            text: face.text.clone(),
            size: face.text_size,
            color: parse_color(&face.text_color)?.0,
            offset: face.text_offset,
            dimensions: size,
        });
        text::composite(&mut image, &layer);
        Ok(image)
    }

    fn base_image(&self, icon: BaseIcon, size: (u32, u32)) -> Result<Arc<RgbImage>> {
        let key = (icon, size);
        if let Some(image) = lock(&self.base_cache).get(&key) {
            return Ok(image);
        }
        let source = key.0.remote_source();
        if let Some(source) = &source {
            if lock(&self.failed_sources).contains(source) {
                return Err(anyhow!("Not retrying {} after an earlier failure", source));
            }
        }

        debug!("Building base image {:?}", key.0);
        let image = match key.0.build_with(size, &self.assets, self.fetch.as_ref()) {
            Ok(image) => Arc::new(image),
            Err(e) => {
                if let Some(source) = source {
                    lock(&self.failed_sources).insert(source);
                }
                return Err(e);
            }
        };
        lock(&self.base_cache).insert(key, image.clone());
        Ok(image)
    }

    fn text_layer(&self, key: TextKey) -> Arc<RgbaImage> {
        if let Some(layer) = lock(&self.text_cache).get(&key) {
            return layer;
        }
        let (w, h) = key.dimensions;
        let layer = Arc::new(match &self.font {
            Some(font) => text::render_layer(font, &key),
            None => RgbaImage::new(w, h),
        });
        lock(&self.text_cache).insert(key, layer.clone());
        layer
    }

    /// Red "Rendering failed" face, memoised per size
    pub fn failed_icon(&self, size: (u32, u32)) -> RgbImage {
        if let Some(image) = lock(&self.failed).get(&size) {
            return image.as_ref().clone();
        }
        let mut image = RgbImage::from_pixel(size.0, size.1, FAILED_BACKGROUND);
        let layer = self.text_layer(TextKey {
            text: FAILED_TEXT.to_string(),
            size: (size.0.min(size.1) as f32 * 0.15) as u32,
            color: [255, 255, 255],
            offset: 0,
            dimensions: size,
        });
        text::composite(&mut image, &layer);
        lock(&self.failed).insert(size, Arc::new(image.clone()));
        image
    }

    pub fn cached_base_images(&self) -> usize {
        lock(&self.base_cache).len()
    }

    pub fn cached_text_layers(&self) -> usize {
        lock(&self.text_cache).len()
    }
}

/// Pick the base image: prefixed icon, then file, then vector icon, then plain background
fn resolve_icon(face: &Face) -> Result<BaseIcon> {
    if let Some(icon) = &face.icon {
        if let Some(prefixed) = BaseIcon::from_prefixed(icon, face.ring_radius) {
            return prefixed;
        }
        return Ok(BaseIcon::File(icon.clone()));
    }
    let background = parse_color(&face.background)?;
    if let Some(name) = &face.icon_mdi {
        return Ok(BaseIcon::Mdi {
            name: name.clone(),
            fill: scale_color(parse_color(&face.mdi_color)?, MDI_OPACITY),
            background,
            margin: 0,
        });
    }
    Ok(BaseIcon::Solid(background))
}
