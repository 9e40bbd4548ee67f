use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Scale alpha by `opacity` in `[0, 1]`.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let a = (self.a as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = Error;

    /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)`
    /// (integer or percentage channels) and CSS colour names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidColor(s.to_string());
        let t = s.trim().to_ascii_lowercase();

        if let Some(hex) = t.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(invalid);
        }
        if let Some(args) = t.strip_prefix("rgba(").and_then(|r| r.strip_suffix(')')) {
            return parse_functional(args, true).ok_or_else(invalid);
        }
        if let Some(args) = t.strip_prefix("rgb(").and_then(|r| r.strip_suffix(')')) {
            return parse_functional(args, false).ok_or_else(invalid);
        }
        named_color(&t).ok_or_else(invalid)
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some(Color::rgb(nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17)),
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

fn parse_functional(args: &str, with_alpha: bool) -> Option<Color> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let expected = if with_alpha { 4 } else { 3 };
    if parts.len() != expected {
        return None;
    }
    let channel = |p: &str| -> Option<u8> {
        if let Some(pct) = p.strip_suffix('%') {
            let v: f64 = pct.trim().parse().ok()?;
            Some((v.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8)
        } else {
            let v: f64 = p.parse().ok()?;
            Some(v.clamp(0.0, 255.0).round() as u8)
        }
    };
    let alpha = if with_alpha {
        let a: f64 = parts[3].parse().ok()?;
        (a.clamp(0.0, 1.0) * 255.0).round() as u8
    } else {
        255
    };
    Some(Color::rgba(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        alpha,
    ))
}

fn named_color(name: &str) -> Option<Color> {
    let c = match name {
        "transparent" => Color::TRANSPARENT,
        "black" => Color::rgb(0, 0, 0),
        "white" => Color::rgb(255, 255, 255),
        "red" => Color::rgb(255, 0, 0),
        "green" => Color::rgb(0, 128, 0),
        "lime" => Color::rgb(0, 255, 0),
        "blue" => Color::rgb(0, 0, 255),
        "yellow" => Color::rgb(255, 255, 0),
        "cyan" | "aqua" => Color::rgb(0, 255, 255),
        "magenta" | "fuchsia" => Color::rgb(255, 0, 255),
        "gray" | "grey" => Color::rgb(128, 128, 128),
        "silver" => Color::rgb(192, 192, 192),
        "lightgray" | "lightgrey" => Color::rgb(211, 211, 211),
        "darkgray" | "darkgrey" => Color::rgb(169, 169, 169),
        "maroon" => Color::rgb(128, 0, 0),
        "olive" => Color::rgb(128, 128, 0),
        "navy" => Color::rgb(0, 0, 128),
        "purple" => Color::rgb(128, 0, 128),
        "teal" => Color::rgb(0, 128, 128),
        "orange" => Color::rgb(255, 165, 0),
        "brown" => Color::rgb(165, 42, 42),
        "pink" => Color::rgb(255, 192, 203),
        "gold" => Color::rgb(255, 215, 0),
        "beige" => Color::rgb(245, 245, 220),
        "ivory" => Color::rgb(255, 255, 240),
        "khaki" => Color::rgb(240, 230, 140),
        "salmon" => Color::rgb(250, 128, 114),
        "tan" => Color::rgb(210, 180, 140),
        "wheat" => Color::rgb(245, 222, 179),
        "steelblue" => Color::rgb(70, 130, 180),
        "lightblue" => Color::rgb(173, 216, 230),
        "skyblue" => Color::rgb(135, 206, 235),
        "darkblue" => Color::rgb(0, 0, 139),
        "darkgreen" => Color::rgb(0, 100, 0),
        "forestgreen" => Color::rgb(34, 139, 34),
        "lightgreen" => Color::rgb(144, 238, 144),
        "darkred" => Color::rgb(139, 0, 0),
        "coral" => Color::rgb(255, 127, 80),
        "crimson" => Color::rgb(220, 20, 60),
        "indigo" => Color::rgb(75, 0, 130),
        "violet" => Color::rgb(238, 130, 238),
        "orchid" => Color::rgb(218, 112, 214),
        "plum" => Color::rgb(221, 160, 221),
        "sienna" => Color::rgb(160, 82, 45),
        "chocolate" => Color::rgb(210, 105, 30),
        "linen" => Color::rgb(250, 240, 230),
        "lavender" => Color::rgb(230, 230, 250),
        "whitesmoke" => Color::rgb(245, 245, 245),
        "gainsboro" => Color::rgb(220, 220, 220),
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!("#fff".parse::<Color>().unwrap(), Color::WHITE);
        assert_eq!("#4682B4".parse::<Color>().unwrap(), Color::rgb(70, 130, 180));
        assert_eq!(
            "#00000080".parse::<Color>().unwrap(),
            Color::rgba(0, 0, 0, 128)
        );
        assert!("#12345".parse::<Color>().is_err());
    }

    #[test]
    fn test_parse_functional_forms() {
        assert_eq!(
            "rgb(50%, 50%, 50%)".parse::<Color>().unwrap(),
            Color::rgb(128, 128, 128)
        );
        assert_eq!(
            "rgb(100%, 0%, 150%)".parse::<Color>().unwrap(),
            Color::rgb(255, 0, 255)
        );
        assert_eq!(
            "rgba(255,0,0,0.5)".parse::<Color>().unwrap(),
            Color::rgba(255, 0, 0, 128)
        );
        assert!("rgb(1,2)".parse::<Color>().is_err());
    }

    #[test]
    fn test_parse_named() {
        assert_eq!("SteelBlue".parse::<Color>().unwrap(), Color::rgb(70, 130, 180));
        assert_eq!("transparent".parse::<Color>().unwrap().a, 0);
        assert!("notacolor".parse::<Color>().is_err());
    }

    #[test]
    fn test_with_opacity() {
        assert_eq!(Color::BLACK.with_opacity(0.5).a, 128);
        assert_eq!(Color::BLACK.with_opacity(2.0).a, 255);
    }
}
