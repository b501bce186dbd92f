use serde::{Deserialize, Serialize};

use super::signal::SignalId;

/// RGBA color, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Same color with a different alpha channel
    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Parse `#RRGGBB` (alpha defaults to opaque)
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#')?;
        if s.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(s.get(i..i + 2)?, 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Signal color palette for telling signals apart in the bit grid
pub const SIGNAL_COLORS: [Color; 10] = [
    Color::rgb(77, 128, 230),  // Blue
    Color::rgb(77, 179, 102),  // Green
    Color::rgb(230, 153, 51),  // Orange
    Color::rgb(179, 102, 204), // Purple
    Color::rgb(204, 77, 102),  // Red
    Color::rgb(77, 204, 204),  // Cyan
    Color::rgb(204, 204, 77),  // Yellow
    Color::rgb(153, 102, 77),  // Brown
    Color::rgb(128, 128, 179), // Slate
    Color::rgb(179, 128, 179), // Mauve
];

/// Default color for a signal, picked from the palette by id
pub fn signal_color(id: SignalId) -> Color {
    SIGNAL_COLORS[id.0 as usize % SIGNAL_COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let c = Color::rgb(0x12, 0xAB, 0xFF);
        assert_eq!(c.to_hex(), "#12ABFF");
        assert_eq!(Color::from_hex("#12ABFF"), Some(c));
        assert_eq!(Color::from_hex("12ABFF"), None);
        assert_eq!(Color::from_hex("#12AB"), None);
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(signal_color(SignalId(0)), signal_color(SignalId(10)));
        assert_ne!(signal_color(SignalId(0)), signal_color(SignalId(1)));
    }
}
