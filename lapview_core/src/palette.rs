//! Fixed colors for cars and events.

use crate::store::EventKind;
use serde::Serialize;
use std::fmt;

/// 8-bit RGB color.
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

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Channel-wise linear blend, `t` clamped to [0, 1].
    ///
    /// `t == 0` yields `self` and `t == 1` yields `other` exactly.
    pub fn lerp(&self, other: &Rgb, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let mix = |a: u8, b: u8| {
            let v = a as f64 + (b as f64 - a as f64) * t;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Car colors, assigned by entity index and cycling.
pub const ENTITY_PALETTE: [Rgb; 10] = [
    Rgb::new(0xff, 0xb1, 0x00),
    Rgb::new(0x6b, 0xc5, 0xff),
    Rgb::new(0xff, 0x6b, 0x6b),
    Rgb::new(0x7b, 0xd3, 0x89),
    Rgb::new(0xf7, 0x8b, 0xff),
    Rgb::new(0xff, 0xd1, 0x66),
    Rgb::new(0x7a, 0xf8, 0xff),
    Rgb::new(0xc0, 0x84, 0xfc),
    Rgb::new(0x90, 0xe0, 0xef),
    Rgb::new(0xff, 0x9f, 0x1c),
];

/// Color of the reference path.
pub const TRACK_COLOR: Rgb = Rgb::new(0x6e, 0x77, 0x91);

pub fn entity_color(index: usize) -> Rgb {
    ENTITY_PALETTE[index % ENTITY_PALETTE.len()]
}

pub fn event_color(kind: &EventKind) -> Rgb {
    match kind {
        EventKind::Crash => Rgb::new(0xff, 0x6b, 0x6b),
        EventKind::Collision => Rgb::new(0xf3, 0xa7, 0x12),
        EventKind::Reset => Rgb::new(0x5d, 0xd3, 0x9e),
        EventKind::Surface => Rgb::new(0xb0, 0x8d, 0x57),
        EventKind::Overtake => Rgb::new(0x6b, 0xc5, 0xff),
        EventKind::Other(_) => Rgb::new(0xcd, 0xd7, 0xe1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(Rgb::new(255, 177, 0).to_hex(), "#ffb100");
        assert_eq!(TRACK_COLOR.to_string(), "#6e7791");
    }

    #[test]
    fn test_lerp_endpoints_exact() {
        let a = Rgb::new(10, 200, 33);
        let b = Rgb::new(250, 3, 128);
        assert_eq!(a.lerp(&b, 0.0), a);
        assert_eq!(a.lerp(&b, 1.0), b);
        assert_eq!(a.lerp(&b, 2.0), b);
        assert_eq!(Rgb::new(0, 0, 0).lerp(&Rgb::new(100, 100, 100), 0.5), Rgb::new(50, 50, 50));
    }

    #[test]
    fn test_entity_palette_cycles() {
        assert_eq!(entity_color(0), entity_color(10));
        assert_ne!(entity_color(0), entity_color(1));
    }

    #[test]
    fn test_event_colors() {
        assert_eq!(event_color(&EventKind::Crash).to_hex(), "#ff6b6b");
        assert_eq!(
            event_color(&EventKind::Other("late_brake".into())),
            event_color(&EventKind::Other("early_brake".into()))
        );
    }
}
