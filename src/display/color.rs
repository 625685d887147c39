//! Colour parsing and palette helpers

use anyhow::{anyhow, Result};
use image::Rgb;

/// CSS colour names, sorted, accepted in addition to `#rgb` / `#rrggbb`
const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("aliceblue", [240, 248, 255]),
    ("antiquewhite", [250, 235, 215]),
    ("aqua", [0, 255, 255]),
    ("aquamarine", [127, 255, 212]),
    ("azure", [240, 255, 255]),
    ("beige", [245, 245, 220]),
    ("bisque", [255, 228, 196]),
    ("black", [0, 0, 0]),
    ("blanchedalmond", [255, 235, 205]),
    ("blue", [0, 0, 255]),
    ("blueviolet", [138, 43, 226]),
    ("brown", [165, 42, 42]),
    ("burlywood", [222, 184, 135]),
    ("cadetblue", [95, 158, 160]),
    ("chartreuse", [127, 255, 0]),
    ("chocolate", [210, 105, 30]),
    ("coral", [255, 127, 80]),
    ("cornflowerblue", [100, 149, 237]),
    ("cornsilk", [255, 248, 220]),
    ("crimson", [220, 20, 60]),
    ("cyan", [0, 255, 255]),
    ("darkblue", [0, 0, 139]),
    ("darkcyan", [0, 139, 139]),
    ("darkgoldenrod", [184, 134, 11]),
    ("darkgray", [169, 169, 169]),
    ("darkgreen", [0, 100, 0]),
    ("darkgrey", [169, 169, 169]),
    ("darkkhaki", [189, 183, 107]),
    ("darkmagenta", [139, 0, 139]),
    ("darkolivegreen", [85, 107, 47]),
    ("darkorange", [255, 140, 0]),
    ("darkorchid", [153, 50, 204]),
    ("darkred", [139, 0, 0]),
    ("darksalmon", [233, 150, 122]),
    ("darkseagreen", [143, 188, 143]),
    ("darkslateblue", [72, 61, 139]),
    ("darkslategray", [47, 79, 79]),
    ("darkslategrey", [47, 79, 79]),
    ("darkturquoise", [0, 206, 209]),
    ("darkviolet", [148, 0, 211]),
    ("deeppink", [255, 20, 147]),
    ("deepskyblue", [0, 191, 255]),
    ("dimgray", [105, 105, 105]),
    ("dimgrey", [105, 105, 105]),
    ("dodgerblue", [30, 144, 255]),
    ("firebrick", [178, 34, 34]),
    ("floralwhite", [255, 250, 240]),
    ("forestgreen", [34, 139, 34]),
    ("fuchsia", [255, 0, 255]),
    ("gainsboro", [220, 220, 220]),
    ("ghostwhite", [248, 248, 255]),
    ("gold", [255, 215, 0]),
    ("goldenrod", [218, 165, 32]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("greenyellow", [173, 255, 47]),
    ("grey", [128, 128, 128]),
    ("honeydew", [240, 255, 240]),
    ("hotpink", [255, 105, 180]),
    ("indianred", [205, 92, 92]),
    ("indigo", [75, 0, 130]),
    ("ivory", [255, 255, 240]),
    ("khaki", [240, 230, 140]),
    ("lavender", [230, 230, 250]),
    ("lavenderblush", [255, 240, 245]),
    ("lawngreen", [124, 252, 0]),
    ("lemonchiffon", [255, 250, 205]),
    ("lightblue", [173, 216, 230]),
    ("lightcoral", [240, 128, 128]),
    ("lightcyan", [224, 255, 255]),
    ("lightgoldenrodyellow", [250, 250, 210]),
    ("lightgray", [211, 211, 211]),
    ("lightgreen", [144, 238, 144]),
    ("lightgrey", [211, 211, 211]),
    ("lightpink", [255, 182, 193]),
    ("lightsalmon", [255, 160, 122]),
    ("lightseagreen", [32, 178, 170]),
    ("lightskyblue", [135, 206, 250]),
    ("lightslategray", [119, 136, 153]),
    ("lightslategrey", [119, 136, 153]),
    ("lightsteelblue", [176, 196, 222]),
    ("lightyellow", [255, 255, 224]),
    ("lime", [0, 255, 0]),
    ("limegreen", [50, 205, 50]),
    ("linen", [250, 240, 230]),
    ("magenta", [255, 0, 255]),
    ("maroon", [128, 0, 0]),
    ("mediumaquamarine", [102, 205, 170]),
    ("mediumblue", [0, 0, 205]),
    ("mediumorchid", [186, 85, 211]),
    ("mediumpurple", [147, 112, 219]),
    ("mediumseagreen", [60, 179, 113]),
    ("mediumslateblue", [123, 104, 238]),
    ("mediumspringgreen", [0, 250, 154]),
    ("mediumturquoise", [72, 209, 204]),
    ("mediumvioletred", [199, 21, 133]),
    ("midnightblue", [25, 25, 112]),
    ("mintcream", [245, 255, 250]),
    ("mistyrose", [255, 228, 225]),
    ("moccasin", [255, 228, 181]),
    ("navajowhite", [255, 222, 173]),
    ("navy", [0, 0, 128]),
    ("oldlace", [253, 245, 230]),
    ("olive", [128, 128, 0]),
    ("olivedrab", [107, 142, 35]),
    ("orange", [255, 165, 0]),
    ("orangered", [255, 69, 0]),
    ("orchid", [218, 112, 214]),
    ("palegoldenrod", [238, 232, 170]),
    ("palegreen", [152, 251, 152]),
    ("paleturquoise", [175, 238, 238]),
    ("palevioletred", [219, 112, 147]),
    ("papayawhip", [255, 239, 213]),
    ("peachpuff", [255, 218, 185]),
    ("peru", [205, 133, 63]),
    ("pink", [255, 192, 203]),
    ("plum", [221, 160, 221]),
    ("powderblue", [176, 224, 230]),
    ("purple", [128, 0, 128]),
    ("rebeccapurple", [102, 51, 153]),
    ("red", [255, 0, 0]),
    ("rosybrown", [188, 143, 143]),
    ("royalblue", [65, 105, 225]),
    ("saddlebrown", [139, 69, 19]),
    ("salmon", [250, 128, 114]),
    ("sandybrown", [244, 164, 96]),
    ("seagreen", [46, 139, 87]),
    ("seashell", [255, 245, 238]),
    ("sienna", [160, 82, 45]),
    ("silver", [192, 192, 192]),
    ("skyblue", [135, 206, 235]),
    ("slateblue", [106, 90, 205]),
    ("slategray", [112, 128, 144]),
    ("slategrey", [112, 128, 144]),
    ("snow", [255, 250, 250]),
    ("springgreen", [0, 255, 127]),
    ("steelblue", [70, 130, 180]),
    ("tan", [210, 180, 140]),
    ("teal", [0, 128, 128]),
    ("thistle", [216, 191, 216]),
    ("tomato", [255, 99, 71]),
    ("turquoise", [64, 224, 208]),
    ("violet", [238, 130, 238]),
    ("wheat", [245, 222, 179]),
    ("white", [255, 255, 255]),
    ("whitesmoke", [245, 245, 245]),
    ("yellow", [255, 255, 0]),
    ("yellowgreen", [154, 205, 50]),
];

/// Parse a `#rgb`, `#rrggbb` or named colour
pub fn parse_color(color: &str) -> Result<Rgb<u8>> {
    let color = color.trim();
    if let Some(hex) = color.strip_prefix('#') {
        return parse_hex(hex).ok_or_else(|| anyhow!("Invalid color: {}", color));
    }
    let lower = color.to_ascii_lowercase();
    NAMED_COLORS
        .binary_search_by(|(name, _)| (*name).cmp(lower.as_str()))
        .map(|i| Rgb(NAMED_COLORS[i].1))
        .map_err(|_| anyhow!("Invalid color: {}", color))
}

fn parse_hex(hex: &str) -> Option<Rgb<u8>> {
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                rgb[i] = v * 17;
            }
            Some(Rgb(rgb))
        }
        6 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
        }
        _ => None,
    }
}

pub fn to_hex(rgb: Rgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Scale a colour towards black; 0 is black, 1 the original colour
pub fn scale_color(rgb: Rgb<u8>, scale: f64) -> Rgb<u8> {
    let scale = scale.clamp(0.0, 1.0);
    Rgb(rgb.0.map(|c| (c as f64 * scale) as u8))
}

pub fn scale_hex_color(color: &str, scale: f64) -> Result<String> {
    Ok(to_hex(scale_color(parse_color(color)?, scale)))
}

/// Black or white, whichever contrasts more with `color`
pub fn max_contrast_color(rgb: Rgb<u8>) -> &'static str {
    let gray = 0.2989 * rgb[0] as f64 + 0.5870 * rgb[1] as f64 + 0.1140 * rgb[2] as f64;
    if gray < 128.0 {
        "#FFFFFF"
    } else {
        "#000000"
    }
}

/// Approximate RGB of a black body at the given temperature (Tanner Helland)
pub fn color_temp_kelvin_to_rgb(kelvin: u32) -> Rgb<u8> {
    let temp = kelvin.clamp(1000, 40000) as f64 / 100.0;
    let clamp = |v: f64| v.clamp(0.0, 255.0) as u8;

    let red = if temp <= 66.0 {
        255
    } else {
        clamp(329.698727446 * (temp - 60.0).powf(-0.1332047592))
    };
    let green = if temp <= 66.0 {
        clamp(99.4708025861 * temp.ln() - 161.1195681661)
    } else {
        clamp(288.1221695283 * (temp - 60.0).powf(-0.0755148492))
    };
    let blue = if temp >= 66.0 {
        255
    } else if temp <= 19.0 {
        0
    } else {
        clamp(138.5177312231 * (temp - 10.0).ln() - 305.0447927307)
    };

    Rgb([red, green, blue])
}

fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + i as f64 * step).collect()
        }
    }
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb<u8> {
    let (r, g, b) = if s == 0.0 {
        (v, v, v)
    } else {
        let i = (h * 6.0).floor();
        let f = h * 6.0 - i;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        match (i as i64).rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        }
    };
    Rgb([r, g, b].map(|c| (c * 255.0).round() as u8))
}

/// `n` colours spread over hue, saturation and value
pub fn uniform_hex_colors(n: usize) -> Vec<String> {
    let hues = linspace(0.0, 1.0, n);
    let saturations = linspace(0.0, 1.0, n);
    let mut values = linspace(1.0, 0.5, n / 2);
    if n % 2 == 1 {
        values.push(0.0);
    }
    values.extend(linspace(0.5, 0.0, n / 2));

    let mut colors = Vec::with_capacity(n);
    'outer: for &h in &hues {
        for &s in &saturations {
            for &v in &values {
                if colors.len() == n {
                    break 'outer;
                }
                colors.push(to_hex(hsv_to_rgb(h, s, v)));
            }
        }
    }
    colors
}

const VIRIDIS: &[[u8; 3]] = &[
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 98],
    [253, 231, 37],
];

fn sample_gradient(stops: &[[u8; 3]], t: f64) -> Rgb<u8> {
    let pos = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(stops.len() - 1);
    let frac = pos - lo as f64;
    let mut rgb = [0u8; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        let a = stops[lo][i] as f64;
        let b = stops[hi][i] as f64;
        *channel = (a + (b - a) * frac).round() as u8;
    }
    Rgb(rgb)
}

pub const COLORMAPS: &[&str] = &["hsv", "gray", "grey", "viridis"];

/// `n` colours sampled evenly from a named colormap
pub fn colormap_hex_colors(n: usize, colormap: &str) -> Result<Vec<String>> {
    let samples = linspace(0.0, 1.0, n);
    let colors = match colormap {
        "hsv" => samples.iter().map(|&t| hsv_to_rgb(t, 1.0, 1.0)).collect::<Vec<_>>(),
        "gray" | "grey" => samples
            .iter()
            .map(|&t| {
                let v = (t * 255.0).round() as u8;
                Rgb([v, v, v])
            })
            .collect(),
        "viridis" => samples.iter().map(|&t| sample_gradient(VIRIDIS, t)).collect(),
        other => return Err(anyhow!("Unknown colormap: {}", other)),
    };
    Ok(colors.into_iter().map(to_hex).collect())
}
