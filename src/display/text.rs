//! Transparent text layers composited over base images

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use rusttype::{Font, Scale};

/// Pillow-style spacing added between stacked lines
const LINE_SPACING: f32 = 4.0;

/// Cache key for one rendered text layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextKey {
    pub text: String,
    pub size: u32,
    pub color: [u8; 3],
    pub offset: i32,
    pub dimensions: (u32, u32),
}

/// Calculate text width
pub fn text_width(font: &Font, text: &str, scale: f32) -> f32 {
    let scale = Scale::uniform(scale);
    font.layout(text, scale, rusttype::point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Render centred lines; the first baseline sits at the vertical centre plus `offset`
pub fn render_layer(font: &Font, key: &TextKey) -> RgbaImage {
    let (w, h) = key.dimensions;
    let mut layer = RgbaImage::new(w, h);
    if key.size == 0 || key.text.is_empty() {
        return layer;
    }

    let scale = Scale::uniform(key.size as f32);
    let v_metrics = font.v_metrics(scale);
    let line_height = v_metrics.ascent - v_metrics.descent + LINE_SPACING;
    let [r, g, b] = key.color;

    for (i, line) in key.text.lines().enumerate() {
        let x = w as f32 / 2.0 - text_width(font, line, key.size as f32) / 2.0;
        let baseline = h as f32 / 2.0 + key.offset as f32 + i as f32 * line_height;

        for glyph in font.layout(line, scale, rusttype::point(x, baseline)) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, v| {
                    let px = bb.min.x + gx as i32;
                    let py = bb.min.y + gy as i32;
                    if px >= 0 && px < w as i32 && py >= 0 && py < h as i32 {
                        let pixel = layer.get_pixel_mut(px as u32, py as u32);
                        let alpha = (v * 255.0).round() as u8;
                        if alpha > pixel[3] {
                            *pixel = Rgba([r, g, b, alpha]);
                        }
                    }
                });
            }
        }
    }
    layer
}

/// Alpha blend `layer` over `image`
pub fn composite(image: &mut RgbImage, layer: &RgbaImage) {
    for (pixel, over) in image.pixels_mut().zip(layer.pixels()) {
        let alpha = over[3] as f32 / 255.0;
        if alpha == 0.0 {
            continue;
        }
        *pixel = Rgb([0, 1, 2].map(|c| {
            ((1.0 - alpha) * pixel[c] as f32 + alpha * over[c] as f32).round() as u8
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_blends() {
        let mut image = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        let mut layer = RgbaImage::new(2, 1);
        layer.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        layer.put_pixel(1, 0, Rgba([200, 100, 0, 0]));
        composite(&mut image, &layer);
        assert_eq!(image.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_composite_half_alpha() {
        let mut image = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        let layer = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 128]));
        composite(&mut image, &layer);
        assert_eq!(image.get_pixel(0, 0), &Rgb([100, 50, 25]));
    }
}
