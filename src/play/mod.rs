pub mod runner;

use std::time::Duration;

use anyhow::Error;
use tokio::sync::watch;

use crate::color::{Color, ColorOrder};
use crate::scene::Frame;
use crate::strip::LedDevice;

/// Delay between steps at 100% speed, per animation.
const WIPE_STEP_MS: u64 = 25;
const RAINBOW_STEP_MS: u64 = 25;
const CHASE_STEP_MS: u64 = 25;
const PURSUIT_STEP_MS: u64 = 10;

/// How many pixels the pursuit beam spans, leading edge included.
const BEAM_LENGTH: i64 = 15;

/// Playback speed as a percentage of an animation's base cadence. 100 is real
/// time, 200 runs twice as fast. Values below 1 are refused before anything
/// touches the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speed(u64);

impl Speed {
    pub const NORMAL: Speed = Speed(100);

    pub fn new(percentage: i64) -> Option<Speed> {
        if percentage < 1 {
            None
        } else {
            Some(Speed(percentage as u64))
        }
    }

    /// Scale a base delay by the speed. Floors at one millisecond so a very
    /// fast setting never produces a zero delay, and saturates so an absurd
    /// frame wait cannot overflow the scale.
    pub fn delay(self, base_ms: u64) -> Duration {
        Duration::from_millis((base_ms.saturating_mul(100) / self.0).max(1))
    }
}

/// Cooperative stop signal for one animation run. The sender half stays with
/// whoever controls the run; the animation polls and sleeps through this end.
pub struct RunToken {
    stop: watch::Receiver<bool>,
}

impl RunToken {
    pub fn pair() -> (watch::Sender<bool>, RunToken) {
        let (tx, rx) = watch::channel(false);
        (tx, RunToken { stop: rx })
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleep that the stop signal interrupts. Returns true when the full
    /// delay elapsed, false when the run was stopped mid-sleep. A dropped
    /// sender counts as stopped.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.stop.wait_for(|stop| *stop) => false,
        }
    }
}

/// The animation algorithms, run against whichever sink was configured. One
/// instance owns the device for the lifetime of the process; the runner hands
/// it to one animation task at a time, so two shows never interleave writes.
pub struct Animations {
    device: Box<dyn LedDevice>,
    led_count: usize,
    color_order: ColorOrder,
}

impl Animations {
    pub fn new(mut device: Box<dyn LedDevice>) -> Self {
        let led_count = device.image().len();
        Animations {
            device,
            led_count,
            color_order: ColorOrder::default(),
        }
    }

    pub fn led_count(&self) -> usize {
        self.led_count
    }

    /// Takes effect on subsequent writes only.
    pub fn set_color_order(&mut self, order: ColorOrder) {
        self.color_order = order;
    }

    fn set_pixel(&mut self, index: usize, color: Color) {
        let order = self.color_order;
        self.device.image().set_pixel(index, color, order);
    }

    fn update(&mut self) -> Result<(), Error> {
        self.device.update()
    }

    /// Everything off, presented immediately.
    pub fn switch_off(&mut self) -> Result<(), Error> {
        self.device.image().clear();
        self.update()
    }

    /// One color across the whole strip, single present, no loop.
    pub fn set_color(&mut self, color: Color) -> Result<(), Error> {
        for i in 0..self.led_count {
            self.set_pixel(i, color);
        }
        self.update()
    }

    /// Fill the strip one pixel per tick, then end.
    pub async fn color_wipe(
        &mut self,
        token: &mut RunToken,
        color: Color,
        speed: Speed,
    ) -> Result<(), Error> {
        let delay = speed.delay(WIPE_STEP_MS);
        for i in 0..self.led_count {
            self.set_pixel(i, color);
            self.update()?;
            if !token.sleep(delay).await {
                break;
            }
        }
        Ok(())
    }

    /// Rolling color wheel across the strip until stopped. Every invocation
    /// starts the cycle from the top, there is no resume.
    pub async fn rainbow(&mut self, token: &mut RunToken, speed: Speed) -> Result<(), Error> {
        let delay = speed.delay(RAINBOW_STEP_MS);
        while !token.is_stopped() {
            for i in 0..255usize {
                if token.is_stopped() {
                    break;
                }
                for j in 0..self.led_count {
                    self.set_pixel(j, wheel((i + j) as u8));
                }
                self.update()?;
                token.sleep(delay).await;
            }
        }
        Ok(())
    }

    /// Three-phase marquee: light every third pixel at offset j, hold, blank
    /// those pixels, move to the next offset. Runs until stopped.
    pub async fn theatre_chase(
        &mut self,
        token: &mut RunToken,
        color: Color,
        blank: Color,
        speed: Speed,
    ) -> Result<(), Error> {
        let delay = speed.delay(CHASE_STEP_MS);
        while !token.is_stopped() {
            for j in 0..3 {
                for k in (0..self.led_count).step_by(3) {
                    self.set_pixel(j + k, color);
                }
                self.update()?;
                token.sleep(delay).await;
                for k in (0..self.led_count).step_by(3) {
                    self.set_pixel(j + k, blank);
                }
            }
        }
        Ok(())
    }

    /// A red beam with a fading tail bouncing between the strip ends. The
    /// index keeps moving until the whole beam has left the strip before the
    /// direction flips, so the tail sweeps fully off at each end. Runs until
    /// stopped. The green and blue variants are this same beam seen through a
    /// different wire order.
    pub async fn knight_rider(&mut self, token: &mut RunToken, speed: Speed) -> Result<(), Error> {
        let delay = speed.delay(PURSUIT_STEP_MS);
        let led_count = self.led_count as i64;
        let mut index: i64 = 0;
        let mut down = false;
        while !token.is_stopped() {
            self.device.image().clear();
            if down {
                for i in 0..=BEAM_LENGTH {
                    self.beam_pixel(index + i, i);
                }
                index -= 1;
                if index < -BEAM_LENGTH {
                    down = false;
                    index = 0;
                }
            } else {
                for i in (0..BEAM_LENGTH).rev() {
                    self.beam_pixel(index - i, i);
                }
                index += 1;
                if index - BEAM_LENGTH >= led_count {
                    down = true;
                    index = led_count - 1;
                }
            }
            self.update()?;
            token.sleep(delay).await;
        }
        Ok(())
    }

    /// One pixel of the beam, i steps behind the leading edge, brightness
    /// falling off linearly with distance.
    fn beam_pixel(&mut self, position: i64, i: i64) {
        if position >= 0 && position < self.led_count as i64 {
            let value = ((BEAM_LENGTH - i) * (255 / (BEAM_LENGTH + 1))) as u8;
            self.set_pixel(position as usize, Color::rgb(value, 0, 0));
        }
    }

    /// Play an authored frame list: write each frame's samples, present, hold
    /// for the frame's wait scaled by speed. Without repeat the run ends after
    /// one pass; either way the strip goes dark on the way out.
    pub async fn play_scene(
        &mut self,
        token: &mut RunToken,
        frames: &[Frame],
        speed: Speed,
        repeat: bool,
    ) -> Result<(), Error> {
        if frames.is_empty() {
            return self.switch_off();
        }
        while !token.is_stopped() {
            for frame in frames {
                if token.is_stopped() {
                    break;
                }
                for led in &frame.leds {
                    self.set_pixel(led.led_nr as usize, led.color());
                }
                self.update()?;
                token.sleep(speed.delay(frame.wait_till_next_frame)).await;
            }
            if !repeat {
                break;
            }
        }
        self.switch_off()
    }
}

/// Three-segment color wheel: red rises as green falls, then blue takes over
/// from red, then green from blue.
fn wheel(position: u8) -> Color {
    let position = position as u16;
    if position < 85 {
        Color::rgb((position * 3) as u8, (255 - position * 3) as u8, 0)
    } else if position < 170 {
        let position = position - 85;
        Color::rgb((255 - position * 3) as u8, 0, (position * 3) as u8)
    } else {
        let position = position - 170;
        Color::rgb(0, (position * 3) as u8, (255 - position * 3) as u8)
    }
}
