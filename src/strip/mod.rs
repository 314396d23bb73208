pub mod simulator;
#[cfg(feature = "pi")]
pub mod spi;

use anyhow::Error;

use crate::color::{Color, ColorOrder};

/// In-memory image of the strip. Pixels are stored in wire order, so whatever
/// reads them out (SPI encoder, simulator mirror) can ship them as-is.
pub struct PixelBuffer {
    pixels: Vec<Color>,
}

impl PixelBuffer {
    pub fn new(led_count: usize) -> Self {
        PixelBuffer {
            pixels: vec![Color::OFF; led_count],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Write one pixel, remapped to wire order. Out-of-range indices are
    /// dropped silently; sweep animations run their index off both ends of
    /// the strip while turning around.
    pub fn set_pixel(&mut self, index: usize, color: Color, order: ColorOrder) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color.reorder(order);
        }
    }

    /// Set every pixel to the same raw value, no reordering.
    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    pub fn clear(&mut self) {
        self.fill(Color::OFF);
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }
}

/// A sink the animations draw into. Two implementations: the WS2812 strip on
/// the SPI bus, and the in-memory simulator that mirrors state to the web UI.
pub trait LedDevice: Send {
    /// The buffer animations write into before presenting.
    fn image(&mut self) -> &mut PixelBuffer;

    /// Flush the buffer to the sink.
    fn update(&mut self) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_pixel_applies_wire_order() {
        let mut buffer = PixelBuffer::new(3);
        buffer.set_pixel(1, Color::rgb(10, 20, 30), ColorOrder::Grb);
        assert_eq!(buffer.pixels()[1], Color::rgb(20, 10, 30));
        assert_eq!(buffer.pixels()[0], Color::OFF);
    }

    #[test]
    fn out_of_range_writes_are_dropped() {
        let mut buffer = PixelBuffer::new(4);
        buffer.set_pixel(4, Color::rgb(255, 0, 0), ColorOrder::Rgb);
        buffer.set_pixel(usize::MAX, Color::rgb(255, 0, 0), ColorOrder::Rgb);
        assert!(buffer.pixels().iter().all(|p| *p == Color::OFF));
    }

    #[test]
    fn fill_and_clear() {
        let mut buffer = PixelBuffer::new(2);
        buffer.fill(Color::rgb(5, 6, 7));
        assert_eq!(buffer.pixels(), &[Color::rgb(5, 6, 7); 2]);
        buffer.clear();
        assert_eq!(buffer.pixels(), &[Color::OFF; 2]);
    }
}
