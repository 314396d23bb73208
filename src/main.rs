use std::path::Path;
use std::sync::Arc;

use anyhow::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stairlight::prelude::*;
#[cfg(feature = "pi")]
use stairlight::strip::spi::Ws2812Strip;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stairlight=info,tower_http=info")),
        )
        .init();

    let config = Config::load(Path::new("config.ron"))?;
    info!(
        "driving {} leds through {:?}",
        config.led_count, config.device
    );

    let (device, simulator) = open_device(&config)?;
    let animations = Animations::new(device);

    let store = Arc::new(SceneStore::load(&config.scene_file, config.led_count)?);
    let cache = Arc::new(SceneCache::new(store.clone(), config.cache_ttl()));
    let runner = Arc::new(ShowRunner::new(animations, cache.clone()));

    let app = router(AppState::new(
        runner,
        store,
        cache,
        simulator,
        config.color_order,
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Pick the sink the config names. The ws2812 driver only exists on the Pi
/// build; everywhere else it is a configuration error.
fn open_device(config: &Config) -> Result<(Box<dyn LedDevice>, Option<SimulatorHandle>), Error> {
    match config.device {
        DeviceKind::Simulator => {
            let (simulator, handle) = LedSimulator::new(config.led_count);
            Ok((Box::new(simulator), Some(handle)))
        }
        #[cfg(feature = "pi")]
        DeviceKind::Ws2812 => {
            let strip = Ws2812Strip::open(config.led_count, config.spi_clock_hz, config.rgbw)?;
            Ok((Box::new(strip), None))
        }
        #[cfg(not(feature = "pi"))]
        DeviceKind::Ws2812 => {
            anyhow::bail!("the ws2812 driver is not supported on this platform, rebuild with --features pi")
        }
    }
}
