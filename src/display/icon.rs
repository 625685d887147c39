//! Base images: solid colours, files, vector icons, downloads and percentage rings

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use resvg::{tiny_skia, usvg};
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::warn;

use super::color::to_hex;
use super::download::{self, Fetch};

pub const RING_THICKNESS: u32 = 4;
/// Ring radius used on the dial slices of the touchscreen
pub const DIAL_RING_RADIUS: u32 = 40;
const RING_BACKGROUND: Rgb<u8> = Rgb([100, 100, 100]);
const RING_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const SVG_SCALE: f32 = 4.0;

/// Everything needed to build a base image; equal values always build identical pixels
#[derive(Debug, Clone, PartialEq)]
pub enum BaseIcon {
    Solid(Rgb<u8>),
    File(String),
    Mdi {
        name: String,
        fill: Rgb<u8>,
        background: Rgb<u8>,
        margin: u32,
    },
    Url(String),
    Spotify(String),
    Data(String),
    Ring {
        pct: f64,
        radius: Option<u32>,
    },
}

impl Eq for BaseIcon {}

impl Hash for BaseIcon {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            BaseIcon::Solid(rgb) => rgb.0.hash(state),
            BaseIcon::File(s) | BaseIcon::Url(s) | BaseIcon::Spotify(s) | BaseIcon::Data(s) => {
                s.hash(state)
            }
            BaseIcon::Mdi {
                name,
                fill,
                background,
                margin,
            } => {
                name.hash(state);
                fill.0.hash(state);
                background.0.hash(state);
                margin.hash(state);
            }
            BaseIcon::Ring { pct, radius } => {
                pct.to_bits().hash(state);
                radius.hash(state);
            }
        }
    }
}

impl BaseIcon {
    /// Interpret an `icon` value with a `url:`, `spotify:`, `ring:` or `data:` prefix.
    /// Returns `None` for plain file paths.
    pub fn from_prefixed(icon: &str, ring_radius: Option<u32>) -> Option<Result<Self>> {
        let (which, id) = icon.split_once(':')?;
        let icon = match which {
            "url" => Ok(BaseIcon::Url(id.to_string())),
            "spotify" => Ok(BaseIcon::Spotify(id.to_string())),
            "data" => Ok(BaseIcon::Data(icon.to_string())),
            "ring" => id
                .trim()
                .parse::<f64>()
                .map(|pct| BaseIcon::Ring {
                    pct,
                    radius: ring_radius,
                })
                .map_err(|_| anyhow!("Invalid ring percentage: {}", id)),
            _ => return None,
        };
        Some(icon)
    }

    /// Where a network fetch would come from, for icons that may need one
    pub fn remote_source(&self) -> Option<String> {
        match self {
            BaseIcon::Mdi { name, .. } => Some(download::mdi_url(name)),
            BaseIcon::Url(url) => Some(url.clone()),
            BaseIcon::Spotify(id) => Some(format!("spotify:{}", id)),
            _ => None,
        }
    }

    /// Build the image at `size`, fetching into `assets` over HTTP if needed
    pub fn build(&self, size: (u32, u32), assets: &Path) -> Result<RgbImage> {
        self.build_with(size, assets, &download::download)
    }

    /// Build the image at `size` with `fetch` for anything not yet in `assets`
    pub fn build_with(&self, size: (u32, u32), assets: &Path, fetch: &Fetch) -> Result<RgbImage> {
        let (w, h) = size;
        match self {
            BaseIcon::Solid(rgb) => Ok(RgbImage::from_pixel(w, h, *rgb)),
            BaseIcon::File(name) => {
                let path = Path::new(name);
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    assets.join(path)
                };
                let img = image::open(&path)
                    .with_context(|| format!("Failed to open icon {}", path.display()))?;
                Ok(fit(img, size))
            }
            BaseIcon::Mdi {
                name,
                fill,
                background,
                margin,
            } => {
                let svg = download::mdi_svg(assets, name, fetch)?;
                render_svg(&svg, *fill, *background, *margin, size)
            }
            BaseIcon::Url(url) => Ok(fit(download::url_image(assets, url, fetch)?, size)),
            BaseIcon::Spotify(id) => Ok(fit(download::spotify_image(assets, id, fetch)?, size)),
            BaseIcon::Data(data) => Ok(fit(download::data_url_image(data)?, size)),
            BaseIcon::Ring { pct, radius } => {
                let radius = radius.unwrap_or((w / 2).saturating_sub(RING_THICKNESS / 2));
                Ok(percentage_ring(*pct, size, radius))
            }
        }
    }
}

fn fit(img: DynamicImage, (w, h): (u32, u32)) -> RgbImage {
    let rgb = img.to_rgb8();
    if rgb.dimensions() == (w, h) {
        return rgb;
    }
    image::imageops::resize(&rgb, w, h, FilterType::Triangle)
}

/// Vector icon recoloured with `fill` on `background`, rendered at 4x and padded with a black margin
fn render_svg(
    path: &Path,
    fill: Rgb<u8>,
    background: Rgb<u8>,
    margin: u32,
    size: (u32, u32),
) -> Result<RgbImage> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let recoloured = content.replacen("<svg", &format!("<svg fill=\"{}\"", to_hex(fill)), 1);

    let rendered = match usvg::Tree::from_str(&recoloured, &usvg::Options::default()) {
        Ok(tree) => rasterize(&tree, background)?,
        Err(e) => {
            warn!(
                "Failed to parse {}, using a solid {} image: {}",
                path.display(),
                to_hex(fill),
                e
            );
            RgbImage::from_pixel(size.0, size.1, fill)
        }
    };

    let mut padded = RgbImage::new(rendered.width() + 2 * margin, rendered.height() + 2 * margin);
    image::imageops::overlay(&mut padded, &rendered, margin as i64, margin as i64);
    Ok(image::imageops::resize(&padded, size.0, size.1, FilterType::Triangle))
}

fn rasterize(tree: &usvg::Tree, background: Rgb<u8>) -> Result<RgbImage> {
    let w = (tree.size().width() * SVG_SCALE).ceil() as u32;
    let h = (tree.size().height() * SVG_SCALE).ceil() as u32;
    let mut pixmap =
        tiny_skia::Pixmap::new(w, h).ok_or_else(|| anyhow!("Invalid SVG size {}x{}", w, h))?;
    pixmap.fill(tiny_skia::Color::from_rgba8(
        background[0],
        background[1],
        background[2],
        255,
    ));
    resvg::render(
        tree,
        tiny_skia::Transform::from_scale(SVG_SCALE, SVG_SCALE),
        &mut pixmap.as_mut(),
    );

    // Opaque background, so premultiplied channels are the plain colour
    let data = pixmap.data().chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect();
    RgbImage::from_raw(w, h, data).ok_or_else(|| anyhow!("Failed to convert rendered SVG"))
}

/// Gray ring with a red arc clockwise from 12 o'clock covering `pct` percent
pub fn percentage_ring(pct: f64, (w, h): (u32, u32), radius: u32) -> RgbImage {
    let mut img = RgbImage::new(w, h);
    let (cx, cy) = ((w / 2) as i32, (h / 2) as i32);
    let inner = radius.saturating_sub(RING_THICKNESS) as i32;
    draw_filled_circle_mut(&mut img, (cx, cy), radius as i32, RING_BACKGROUND);
    draw_filled_circle_mut(&mut img, (cx, cy), inner, Rgb([0, 0, 0]));

    let sweep = 360.0 * pct / 100.0;
    if sweep <= 0.0 {
        return img;
    }
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        if *pixel != RING_BACKGROUND {
            continue;
        }
        let angle = ((y as i32 - cy) as f64).atan2((x as i32 - cx) as f64).to_degrees();
        if (angle + 90.0).rem_euclid(360.0) <= sweep {
            *pixel = RING_COLOR;
        }
    }
    img
}

pub fn grayscale(img: RgbImage) -> RgbImage {
    DynamicImage::ImageRgb8(img).grayscale().to_rgb8()
}
