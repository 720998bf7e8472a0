//! Heatmap color scales

/// Return anchors (percent, color) for the sector heatmap
const RETURN_ANCHORS: [(f64, (u8, u8, u8)); 5] = [
    (-10.0, (0xFF, 0x00, 0x00)),
    (-1.0, (0xC6, 0x28, 0x28)),
    (0.0, (0xF5, 0xF5, 0xF5)),
    (1.0, (0x0F, 0xA8, 0x4C)),
    (10.0, (0x00, 0xFF, 0x00)),
];

const ZS_POSITIVE: &str = "#0FA84C";
const ZS_NEGATIVE: &str = "#C62828";

pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

pub fn rgb_to_hex((r, g, b): (u8, u8, u8)) -> String {
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round().clamp(0.0, 255.0) as u8
}

/// Color for a daily return in percent, clamped to [-10, 10]
pub fn return_color(pct: f64) -> Option<String> {
    if !pct.is_finite() {
        return None;
    }
    let v = pct.clamp(-10.0, 10.0);
    for pair in RETURN_ANCHORS.windows(2) {
        let (x0, c0) = pair[0];
        let (x1, c1) = pair[1];
        if v <= x1 {
            let t = if x1 > x0 { (v - x0) / (x1 - x0) } else { 0.0 };
            return Some(rgb_to_hex((
                lerp(c0.0, c1.0, t),
                lerp(c0.1, c1.1, t),
                lerp(c0.2, c1.2, t),
            )));
        }
    }
    Some(rgb_to_hex(RETURN_ANCHORS[4].1))
}

/// Blend from white toward green/red with intensity `min(|v| / max_abs, 1)`.
/// Zero intensity leaves the cell uncolored.
pub fn zscore_color(value: f64, max_abs: f64) -> Option<String> {
    if !value.is_finite() || max_abs <= 0.0 {
        return None;
    }
    let intensity = (value.abs() / max_abs).min(1.0);
    if intensity == 0.0 {
        return None;
    }
    let base = hex_to_rgb(if value > 0.0 { ZS_POSITIVE } else { ZS_NEGATIVE })?;
    Some(rgb_to_hex((
        lerp(255, base.0, intensity),
        lerp(255, base.1, intensity),
        lerp(255, base.2, intensity),
    )))
}

/// Black or white text, whichever reads better on `background`
pub fn contrast_text(background: &str) -> &'static str {
    match hex_to_rgb(background) {
        Some((r, g, b)) => {
            let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            if luma > 150.0 {
                "#000000"
            } else {
                "#FFFFFF"
            }
        }
        None => "#000000",
    }
}
