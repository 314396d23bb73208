use anyhow::Error;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::color::Color;
use crate::strip::{LedDevice, PixelBuffer};

/// WS2812-family strip driven over SPI0. The chip samples data at 800 kHz and
/// each data bit is stretched to three bus bits (110 for one, 100 for zero),
/// so the bus clock has to run at three times that; 2_400_000 is the value
/// that holds timing on the Pi.
pub struct Ws2812Strip {
    spi: Spi,
    buffer: PixelBuffer,
    tx: Vec<u8>,
    rgbw: bool,
}

/// Quiet time on the bus after a frame so the strip latches it. 40 zero bytes
/// at 2.4 MHz is about 130 us, comfortably past the 50 us minimum.
const LATCH_BYTES: usize = 40;

impl Ws2812Strip {
    pub fn open(led_count: usize, clock_hz: u32, rgbw: bool) -> Result<Self, Error> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode0)?;
        Ok(Ws2812Strip {
            spi,
            buffer: PixelBuffer::new(led_count),
            tx: Vec::new(),
            rgbw,
        })
    }
}

impl LedDevice for Ws2812Strip {
    fn image(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    fn update(&mut self) -> Result<(), Error> {
        encode_frame(self.buffer.pixels(), self.rgbw, &mut self.tx);
        self.spi.write(&self.tx)?;
        Ok(())
    }
}

/// Serialize a whole frame into bus bytes. Channels go out in buffer storage
/// order; the logical-to-wire remap already happened at set_pixel time.
fn encode_frame(pixels: &[Color], rgbw: bool, out: &mut Vec<u8>) {
    out.clear();
    for pixel in pixels {
        for channel in [pixel.r, pixel.g, pixel.b] {
            out.extend_from_slice(&expand(channel));
        }
        if rgbw {
            out.extend_from_slice(&expand(pixel.w));
        }
    }
    out.resize(out.len() + LATCH_BYTES, 0);
}

/// One color byte becomes 24 bus bits, most significant data bit first.
fn expand(byte: u8) -> [u8; 3] {
    let mut bits: u32 = 0;
    for i in 0..8 {
        bits <<= 3;
        bits |= if byte & (0x80 >> i) != 0 { 0b110 } else { 0b100 };
    }
    [(bits >> 16) as u8, (bits >> 8) as u8, bits as u8]
}
