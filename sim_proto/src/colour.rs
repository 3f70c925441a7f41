use std::fmt;

/// Golden angle in degrees; consecutive species land far apart on the hue wheel.
const GOLDEN_ANGLE: f64 = 137.507_764;
const SPECIES_SATURATION: f64 = 0.65;
const SPECIES_VALUE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn from_hsv(hue: f64, saturation: f64, value: f64) -> Self {
        let hue = hue.rem_euclid(360.0);
        let chroma = value * saturation;
        let sector = hue / 60.0;
        let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
        let (r, g, b) = match sector as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let offset = value - chroma;
        let to_byte = |channel: f64| ((channel + offset) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::new(to_byte(r), to_byte(g), to_byte(b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Deterministic colour for a species, identical in every process.
pub fn species_colour(species_id: u32) -> Rgb {
    let hue = (species_id as f64 * GOLDEN_ANGLE) % 360.0;
    Rgb::from_hsv(hue, SPECIES_SATURATION, SPECIES_VALUE)
}
