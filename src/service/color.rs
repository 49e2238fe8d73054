//! CSS color values to swatch colors and back.

use lsp_types::Color;

/// Parse a CSS color literal. Keywords other than the few the default theme
/// uses, and `currentColor`, have no fixed value and yield `None`.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    match value.to_ascii_lowercase().as_str() {
        "transparent" => return Some(rgba(0, 0, 0, 0.0)),
        "black" => return Some(rgba(0, 0, 0, 1.0)),
        "white" => return Some(rgba(255, 255, 255, 1.0)),
        _ => {}
    }
    parse_functional(value)
}

fn rgba(r: u8, g: u8, b: u8, alpha: f32) -> Color {
    Color {
        red: f32::from(r) / 255.0,
        green: f32::from(g) / 255.0,
        blue: f32::from(b) / 255.0,
        alpha,
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let digit = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|d| d * 17);
    let pair = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(rgba(digit(0)?, digit(1)?, digit(2)?, 1.0)),
        4 => Some(rgba(digit(0)?, digit(1)?, digit(2)?, f32::from(digit(3)?) / 255.0)),
        6 => Some(rgba(pair(0)?, pair(2)?, pair(4)?, 1.0)),
        8 => Some(rgba(pair(0)?, pair(2)?, pair(4)?, f32::from(pair(6)?) / 255.0)),
        _ => None,
    }
}

/// `rgb(1, 2, 3)`, `rgba(1, 2, 3, 0.5)` and `rgb(1 2 3 / 50%)`.
fn parse_functional(value: &str) -> Option<Color> {
    let lower = value.to_ascii_lowercase();
    let body = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))?
        .strip_suffix(')')?;

    let parts: Vec<&str> = body
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if !(3..=4).contains(&parts.len()) {
        return None;
    }

    let channel = |s: &str| -> Option<u8> {
        if let Some(pct) = s.strip_suffix('%') {
            let p: f32 = pct.parse().ok()?;
            Some((p.clamp(0.0, 100.0) * 2.55).round() as u8)
        } else {
            let v: f32 = s.parse().ok()?;
            Some(v.clamp(0.0, 255.0).round() as u8)
        }
    };
    let alpha = match parts.get(3) {
        None => 1.0,
        Some(a) => match a.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? / 100.0,
            None => a.parse::<f32>().ok()?,
        }
        .clamp(0.0, 1.0),
    };
    Some(rgba(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha))
}

/// `rgb(239, 68, 68)`, or `rgba(..)` when not opaque.
pub fn to_rgb_string(color: &Color) -> String {
    let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    let (r, g, b) = (byte(color.red), byte(color.green), byte(color.blue));
    if color.alpha >= 1.0 {
        format!("rgb({r}, {g}, {b})")
    } else {
        format!("rgba({r}, {g}, {b}, {})", (color.alpha * 100.0).round() / 100.0)
    }
}
