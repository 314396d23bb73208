use serde::{Deserialize, Serialize};

/// A single LED color. The white channel drives the dedicated white die on
/// RGBW strips and is ignored on plain RGB hardware; there is no alpha
/// blending anywhere in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl Color {
    pub const OFF: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        w: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, w: 0 }
    }

    /// Parse a hex literal like `ff8800` or `#ff8800`. Eight digits put the
    /// leading pair on the white channel.
    pub fn from_hex(s: &str) -> Option<Color> {
        let s = s.strip_prefix('#').unwrap_or(s);
        let byte = |i: usize| -> Option<u8> { u8::from_str_radix(s.get(i..i + 2)?, 16).ok() };
        match s.len() {
            6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Color {
                w: byte(0)?,
                r: byte(2)?,
                g: byte(4)?,
                b: byte(6)?,
            }),
            _ => None,
        }
    }

    /// Remap logical RGB onto the strip's wire order. The white channel never
    /// moves.
    pub fn reorder(self, order: ColorOrder) -> Color {
        let Color { r, g, b, w } = self;
        match order {
            ColorOrder::Rgb => self,
            ColorOrder::Rbg => Color { r, g: b, b: g, w },
            ColorOrder::Grb => Color { r: g, g: r, b, w },
            ColorOrder::Gbr => Color { r: g, g: b, b: r, w },
            ColorOrder::Brg => Color { r: b, g: r, b: g, w },
            ColorOrder::Bgr => Color { r: b, g, b: r, w },
        }
    }
}

/// The channel sequence a strip expects on the wire. Strips from different
/// vendors disagree on this, so the logical color is remapped once per write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}
