//! Animated GIF previews. Scenes render straight from their frame list;
//! procedural shows run against a throwaway simulator and whatever the
//! mirror saw becomes the GIF.

use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame as GifFrame, Rgba, RgbaImage};
use thiserror::Error;
use tracing::debug;

use crate::color::Color;
use crate::play::runner::{builtin_plan, run_plan, ShowParams, TriggerError};
use crate::play::{Animations, RunToken, Speed};
use crate::scene::Frame;
use crate::strip::simulator::LedSimulator;

/// Hard ceiling on frames per GIF, whatever the caller asks for.
const MAX_PREVIEW_FRAMES: usize = 500;

/// Shortest hold the GIF timebase can usefully express.
const MIN_FRAME_DELAY_MS: u64 = 10;

/// Displayed hold per captured animation frame, before the speed multiplier.
const ANIMATION_FRAME_DELAY_MS: u64 = 50;

/// Captures run the show well above real time so the endpoint answers fast.
const CAPTURE_PERCENTAGE: i64 = 400;

/// How long a capture keeps waiting for further mirror updates.
const CAPTURE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct PreviewOptions {
    /// Upper bound on rendered frames.
    pub max_frames: usize,
    /// Playback speed multiplier; 2.0 halves every frame hold.
    pub speed: f64,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        PreviewOptions {
            max_frames: 100,
            speed: 1.0,
        }
    }
}

impl PreviewOptions {
    fn cap(&self) -> usize {
        self.max_frames.clamp(1, MAX_PREVIEW_FRAMES)
    }

    fn hold(&self, base_ms: u64) -> Duration {
        let speed = if self.speed.is_finite() && self.speed > 0.0 {
            self.speed
        } else {
            1.0
        };
        let ms = (base_ms as f64 / speed) as u64;
        Duration::from_millis(ms.max(MIN_FRAME_DELAY_MS))
    }
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Render(#[from] anyhow::Error),
}

/// Draws the strip as rows of square cells zigzagging down the image, the
/// way the LEDs zigzag up the staircase.
pub struct GifRenderer {
    led_count: usize,
    leds_per_row: usize,
    cell: u32,
    gap: u32,
    margin: u32,
}

impl GifRenderer {
    pub fn new(led_count: usize) -> Self {
        GifRenderer {
            led_count,
            leds_per_row: 50,
            cell: 8,
            gap: 2,
            margin: 10,
        }
    }

    /// Render an authored frame list. Strip state persists across frames, so
    /// each GIF frame shows the cumulative picture, exactly like playback.
    pub fn render_frames(
        &self,
        frames: &[Frame],
        options: PreviewOptions,
    ) -> Result<Vec<u8>, PreviewError> {
        let mut strip = vec![Color::OFF; self.led_count];
        let mut captures = Vec::new();
        for frame in frames.iter().take(options.cap()) {
            for led in &frame.leds {
                if let Some(pixel) = strip.get_mut(led.led_nr as usize) {
                    *pixel = led.color();
                }
            }
            captures.push((strip.clone(), options.hold(frame.wait_till_next_frame)));
        }
        Ok(self.encode(&captures)?)
    }

    /// Run a procedural show on a private simulator and record what the
    /// mirror sees. Finite shows end the capture on their own; endless ones
    /// stop at the frame cap or the capture window, whichever comes first.
    pub async fn render_animation(
        &self,
        show: &str,
        params: &ShowParams,
        options: PreviewOptions,
    ) -> Result<Vec<u8>, PreviewError> {
        let (plan, order) = builtin_plan(show, params)?
            .ok_or_else(|| TriggerError::UnknownShow(show.to_string()))?;
        let speed = Speed::new(CAPTURE_PERCENTAGE).unwrap_or(Speed::NORMAL);
        let repeat = params.repeat;

        let (simulator, handle) = LedSimulator::new(self.led_count);
        let mut mirror = handle.subscribe();
        // The run must own the last sender, so a finished show ends the
        // capture instead of leaving it to the window.
        drop(handle);

        let mut animations = Animations::new(Box::new(simulator));
        let (stop, mut token) = RunToken::pair();
        let show_name = show.to_string();
        let task = tokio::spawn(async move {
            if let Err(e) = run_plan(&mut animations, &mut token, plan, order, speed, repeat).await
            {
                debug!("preview run of {:?} ended early: {:#}", show_name, e);
            }
        });

        let hold = options.hold(ANIMATION_FRAME_DELAY_MS);
        let deadline = tokio::time::Instant::now() + CAPTURE_WINDOW;
        let mut captures = Vec::new();
        while captures.len() < options.cap() {
            match tokio::time::timeout_at(deadline, mirror.changed()).await {
                Ok(Ok(())) => {
                    let pixels = mirror.borrow_and_update().clone();
                    captures.push((pixels, hold));
                }
                // The run finished and dropped its device, or the window
                // elapsed on a stalled show.
                Ok(Err(_)) | Err(_) => break,
            }
        }
        stop.send_replace(true);
        let _ = task.await;

        Ok(self.encode(&captures)?)
    }

    fn encode(&self, captures: &[(Vec<Color>, Duration)]) -> Result<Vec<u8>, anyhow::Error> {
        let fallback;
        let captures = if captures.is_empty() {
            // A capture can come back empty; a single dark frame still makes
            // a well-formed GIF.
            fallback = vec![(
                vec![Color::OFF; self.led_count],
                Duration::from_millis(100),
            )];
            &fallback[..]
        } else {
            captures
        };

        let mut bytes = Vec::new();
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder.set_repeat(Repeat::Infinite)?;
        for (pixels, hold) in captures {
            let frame = GifFrame::from_parts(
                self.raster(pixels),
                0,
                0,
                Delay::from_saturating_duration(*hold),
            );
            encoder.encode_frame(frame)?;
        }
        drop(encoder);
        Ok(bytes)
    }

    fn raster(&self, pixels: &[Color]) -> RgbaImage {
        let columns = self.led_count.min(self.leds_per_row).max(1);
        let rows = (self.led_count.max(1) + self.leds_per_row - 1) / self.leds_per_row;
        let pitch = self.cell + self.gap;
        let width = self.margin * 2 + columns as u32 * pitch - self.gap;
        let height = self.margin * 2 + rows as u32 * pitch - self.gap;
        let mut image = RgbaImage::from_pixel(width, height, Rgba([15, 15, 26, 255]));
        for (i, color) in pixels.iter().take(self.led_count).enumerate() {
            let row = i / self.leds_per_row;
            let mut column = i % self.leds_per_row;
            // Odd rows run right to left, following the wiring up the stairs.
            if row % 2 == 1 {
                column = self.leds_per_row - 1 - column;
            }
            // The white channel has no cell of its own; it brightens this one.
            let cell = Rgba([
                color.r.saturating_add(color.w),
                color.g.saturating_add(color.w),
                color.b.saturating_add(color.w),
                255,
            ]);
            let x0 = self.margin + column as u32 * pitch;
            let y0 = self.margin + row as u32 * pitch;
            for dy in 0..self.cell {
                for dx in 0..self.cell {
                    image.put_pixel(x0 + dx, y0 + dy, cell);
                }
            }
        }
        image
    }
}
