use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Error;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::color::ColorOrder;

/// Which sink drives the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DeviceKind {
    Simulator,
    Ws2812,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub led_count: usize,
    pub bind_addr: String,
    pub device: DeviceKind,
    #[serde(default)]
    pub color_order: ColorOrder,
    pub scene_file: PathBuf,
    pub cache_ttl_secs: u64,
    pub spi_clock_hz: u32,
    /// Four bytes per pixel on the wire instead of three.
    pub rgbw: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            led_count: 710,
            bind_addr: "0.0.0.0:3000".to_string(),
            device: DeviceKind::Simulator,
            color_order: ColorOrder::Rgb,
            scene_file: PathBuf::from("scenes.json"),
            cache_ttl_secs: 300,
            spi_clock_hz: 2_400_000,
            rgbw: false,
        }
    }
}

impl Config {
    /// Read the config file, falling back to defaults when there is none so a
    /// fresh checkout runs the simulator out of the box.
    pub fn load(path: &Path) -> Result<Config, Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(ron::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("no config at {}, using defaults", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
