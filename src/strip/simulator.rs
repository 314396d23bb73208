//! The simulator sink and its live feed.
//!
//! `update()` publishes the pixel buffer into a single-slot channel shared
//! with the HTTP layer. The slot is latest-wins: a burst of updates while a
//! subscriber is busy collapses into one wakeup, and whoever wakes up reads
//! the newest snapshot, never a queued backlog.

use std::sync::Arc;

use anyhow::Error;
use tokio::sync::watch;

use crate::color::Color;
use crate::strip::{LedDevice, PixelBuffer};

/// Stand-in for the physical strip. Holds the same pixel buffer a real strip
/// would, but presents into the shared feed instead of a bus.
pub struct LedSimulator {
    buffer: PixelBuffer,
    feed: Arc<watch::Sender<Vec<Color>>>,
}

/// Cheap clone handed to the HTTP layer for snapshots and subscriptions.
#[derive(Clone)]
pub struct SimulatorHandle {
    feed: Arc<watch::Sender<Vec<Color>>>,
    led_count: usize,
}

impl LedSimulator {
    pub fn new(led_count: usize) -> (Self, SimulatorHandle) {
        let (feed, _) = watch::channel(vec![Color::OFF; led_count]);
        let feed = Arc::new(feed);
        let handle = SimulatorHandle {
            feed: feed.clone(),
            led_count,
        };
        let simulator = LedSimulator {
            buffer: PixelBuffer::new(led_count),
            feed,
        };
        (simulator, handle)
    }
}

impl LedDevice for LedSimulator {
    fn image(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    fn update(&mut self) -> Result<(), Error> {
        self.feed.send_replace(self.buffer.pixels().to_vec());
        Ok(())
    }
}

impl SimulatorHandle {
    pub fn led_count(&self) -> usize {
        self.led_count
    }

    /// The most recent presented frame.
    pub fn snapshot(&self) -> Vec<Color> {
        self.feed.borrow().clone()
    }

    /// Subscribe to frame changes. The receiver coalesces: however many
    /// updates happen between reads, at most one is pending.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Color>> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorOrder;

    #[test]
    fn update_mirrors_the_buffer() {
        let (mut sim, handle) = LedSimulator::new(3);
        sim.image().set_pixel(2, Color::rgb(9, 8, 7), ColorOrder::Rgb);
        sim.update().unwrap();
        assert_eq!(
            handle.snapshot(),
            vec![Color::OFF, Color::OFF, Color::rgb(9, 8, 7)]
        );
    }

    #[test]
    fn snapshot_before_any_update_is_all_off() {
        let (_sim, handle) = LedSimulator::new(4);
        assert_eq!(handle.snapshot(), vec![Color::OFF; 4]);
        assert_eq!(handle.led_count(), 4);
    }

    #[test]
    fn bursts_collapse_to_one_pending_signal() {
        let (mut sim, handle) = LedSimulator::new(2);
        let mut rx = handle.subscribe();

        for i in 0..5 {
            sim.image().set_pixel(0, Color::rgb(i, 0, 0), ColorOrder::Rgb);
            sim.update().unwrap();
        }

        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest[0], Color::rgb(4, 0, 0));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscriber_wakes_on_update() {
        let (mut sim, handle) = LedSimulator::new(1);
        let mut rx = handle.subscribe();

        sim.image().set_pixel(0, Color::rgb(1, 2, 3), ColorOrder::Rgb);
        sim.update().unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow()[0], Color::rgb(1, 2, 3));
    }
}
