//! Colour resolution: text name first, dominant image pixel second.

use tracing::debug;

use crate::error::NormalizeError;

pub const FALLBACK_HEX: &str = "#808080";
pub const UNKNOWN_TAG: &str = "unknown";

/// Canonical palette items are resolved against.
const CANONICAL: &[(&str, &str, [u8; 3])] = &[
    ("black", "#000000", [0x00, 0x00, 0x00]),
    ("white", "#ffffff", [0xff, 0xff, 0xff]),
    ("grey", "#808080", [0x80, 0x80, 0x80]),
    ("beige", "#f5f5dc", [0xf5, 0xf5, 0xdc]),
    ("red", "#ff0000", [0xff, 0x00, 0x00]),
    ("orange", "#ffa500", [0xff, 0xa5, 0x00]),
    ("yellow", "#ffff00", [0xff, 0xff, 0x00]),
    ("green", "#008000", [0x00, 0x80, 0x00]),
    ("blue", "#0000ff", [0x00, 0x00, 0xff]),
    ("purple", "#800080", [0x80, 0x00, 0x80]),
    ("pink", "#ffc0cb", [0xff, 0xc0, 0xcb]),
    ("brown", "#a52a2a", [0xa5, 0x2a, 0x2a]),
    ("navy", "#000080", [0x00, 0x00, 0x80]),
];

/// Retailer colour vocabulary mapped onto the canonical palette. Multi-word
/// variants come first so partial matching prefers them.
const VARIANTS: &[(&str, &str)] = &[
    ("jet black", "black"),
    ("charcoal grey", "grey"),
    ("off white", "white"),
    ("navy blue", "navy"),
    ("midnight blue", "navy"),
    ("mid-blue", "blue"),
    ("mid blue", "blue"),
    ("light blue", "blue"),
    ("sky blue", "blue"),
    ("bottle green", "green"),
    ("olive green", "green"),
    ("charcoal", "black"),
    ("ivory", "white"),
    ("cream", "beige"),
    ("gray", "grey"),
    ("silver", "grey"),
    ("khaki", "beige"),
    ("tan", "beige"),
    ("nude", "beige"),
    ("camel", "beige"),
    ("ecru", "beige"),
    ("stone", "beige"),
    ("maroon", "red"),
    ("burgundy", "red"),
    ("crimson", "red"),
    ("coral", "orange"),
    ("peach", "orange"),
    ("mustard", "yellow"),
    ("gold", "yellow"),
    ("olive", "green"),
    ("emerald", "green"),
    ("sage", "green"),
    ("mint", "green"),
    ("turquoise", "blue"),
    ("teal", "blue"),
    ("violet", "purple"),
    ("lavender", "purple"),
    ("mauve", "purple"),
    ("rose", "pink"),
    ("magenta", "pink"),
    ("chocolate", "brown"),
    ("coffee", "brown"),
    ("mocha", "brown"),
    ("black", "black"),
    ("white", "white"),
    ("grey", "grey"),
    ("beige", "beige"),
    ("red", "red"),
    ("orange", "orange"),
    ("yellow", "yellow"),
    ("green", "green"),
    ("blue", "blue"),
    ("purple", "purple"),
    ("pink", "pink"),
    ("brown", "brown"),
    ("navy", "navy"),
];

/// Canonical tag for a retailer-written colour name, if recognised.
pub fn tag_from_text(color: &str) -> Option<&'static str> {
    let normalized = color.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    // Exact, then substring, then word-by-word.
    for (variant, canonical) in VARIANTS {
        if normalized == *variant {
            return Some(canonical);
        }
    }
    for (variant, canonical) in VARIANTS {
        if normalized.contains(variant) {
            return Some(canonical);
        }
    }
    for word in normalized.split(['-', ' ']) {
        for (variant, canonical) in VARIANTS {
            if word == *variant {
                return Some(canonical);
            }
        }
    }
    None
}

pub fn hex_for_tag(tag: &str) -> Option<&'static str> {
    CANONICAL
        .iter()
        .find(|(name, _, _)| *name == tag)
        .map(|(_, hex, _)| *hex)
}

/// Nearest canonical colour by Euclidean RGB distance.
pub fn nearest_tag(rgb: [u8; 3]) -> &'static str {
    let mut best = CANONICAL[0].0;
    let mut best_dist = u32::MAX;
    for (name, _, c) in CANONICAL {
        let dist = c
            .iter()
            .zip(rgb.iter())
            .map(|(a, b)| {
                let d = *a as i32 - *b as i32;
                (d * d) as u32
            })
            .sum();
        if dist < best_dist {
            best_dist = dist;
            best = name;
        }
    }
    best
}

/// Mean colour of the central half of a product image, as `#rrggbb`.
///
/// Product shots are centred, so the border (background, padding) is
/// excluded before averaging.
pub fn dominant_color(image_bytes: &[u8]) -> Result<String, NormalizeError> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| NormalizeError::ImageDecode(e.to_string()))?;
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    if w < 4 || h < 4 {
        return Err(NormalizeError::ImageDecode("image too small".into()));
    }

    let (x0, y0) = (w / 4, h / 4);
    let (x1, y1) = (w - w / 4, h - h / 4);
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    // Sample a grid rather than every pixel; plenty for a mean.
    let step = ((x1 - x0).max(y1 - y0) / 64).max(1);
    let mut y = y0;
    while y < y1 {
        let mut x = x0;
        while x < x1 {
            let p = rgb.get_pixel(x, y);
            sum[0] += p[0] as u64;
            sum[1] += p[1] as u64;
            sum[2] += p[2] as u64;
            count += 1;
            x += step;
        }
        y += step;
    }

    let mean = [
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    ];
    Ok(format!("#{:02x}{:02x}{:02x}", mean[0], mean[1], mean[2]))
}

fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Resolve `(hex, tag)` for an item: retailer text first, image pixels as
/// fallback, neutral grey when neither helps.
pub fn resolve(raw_color: &str, image_bytes: Option<&[u8]>) -> (String, String) {
    if let Some(tag) = tag_from_text(raw_color) {
        let hex = hex_for_tag(tag).unwrap_or(FALLBACK_HEX);
        return (hex.to_string(), tag.to_string());
    }

    if let Some(bytes) = image_bytes {
        match dominant_color(bytes) {
            Ok(hex) => {
                let tag = parse_hex(&hex).map(nearest_tag).unwrap_or(UNKNOWN_TAG);
                return (hex, tag.to_string());
            }
            Err(e) => debug!(error = %e, "Dominant colour sampling failed"),
        }
    }

    let tag = if raw_color.trim().is_empty() {
        UNKNOWN_TAG.to_string()
    } else {
        nearest_tag([0x80, 0x80, 0x80]).to_string()
    };
    (FALLBACK_HEX.to_string(), tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_resolve_to_canonical_tags() {
        assert_eq!(tag_from_text("Mid-blue"), Some("blue"));
        assert_eq!(tag_from_text("camel"), Some("beige"));
        assert_eq!(tag_from_text("Bottle green"), Some("green"));
        assert_eq!(tag_from_text("JET BLACK"), Some("black"));
        assert_eq!(tag_from_text("fuchsia-ish"), None);
        assert_eq!(tag_from_text(""), None);
    }

    #[test]
    fn navy_beats_blue_for_navy_blue() {
        assert_eq!(tag_from_text("navy blue"), Some("navy"));
        assert_eq!(tag_from_text("Midnight Blue"), Some("navy"));
    }

    #[test]
    fn nearest_tag_by_distance() {
        assert_eq!(nearest_tag([0xff, 0x05, 0x05]), "red");
        assert_eq!(nearest_tag([0x10, 0x10, 0x10]), "black");
        assert_eq!(nearest_tag([0x00, 0x00, 0x70]), "navy");
    }

    #[test]
    fn dominant_color_of_a_flat_image() {
        let mut png = Vec::new();
        let img = image::RgbImage::from_pixel(32, 32, image::Rgb([0xff, 0x00, 0x00]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let hex = dominant_color(&png).unwrap();
        assert_eq!(hex, "#ff0000");
    }

    #[test]
    fn resolve_prefers_text_then_image_then_grey() {
        let (hex, tag) = resolve("Mid-blue", None);
        assert_eq!((hex.as_str(), tag.as_str()), ("#0000ff", "blue"));

        let mut png = Vec::new();
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([0x00, 0x85, 0x00]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let (hex, tag) = resolve("weird shade", Some(&png));
        assert_eq!(hex, "#008500");
        assert_eq!(tag, "green");

        let (hex, tag) = resolve("", None);
        assert_eq!(hex, FALLBACK_HEX);
        assert_eq!(tag, UNKNOWN_TAG);
    }
}
