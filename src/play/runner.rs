use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::color::{Color, ColorOrder};
use crate::play::{Animations, RunToken, Speed};
use crate::scene::cache::SceneCache;
use crate::scene::Scene;

/// The procedural shows a trigger can name. Scene names come on top of these.
pub const BUILTIN_SHOWS: [&str; 7] = [
    "knightrider",
    "knightrider_green",
    "knightrider_blue",
    "theatrechase",
    "rainbow",
    "colorwipe",
    "color",
];

/// Everything a trigger carries besides the show name.
#[derive(Debug, Clone)]
pub struct ShowParams {
    pub color: Option<Color>,
    pub blank_color: Option<Color>,
    pub percentage: i64,
    pub repeat: bool,
    pub color_order: ColorOrder,
}

impl Default for ShowParams {
    fn default() -> Self {
        ShowParams {
            color: None,
            blank_color: None,
            percentage: 100,
            repeat: false,
            color_order: ColorOrder::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("percentage must be at least 1, got {0}")]
    BadPercentage(i64),
    #[error("show {0:?} needs a {1} parameter")]
    MissingColor(String, &'static str),
    #[error("no show or scene named {0:?}")]
    UnknownShow(String),
}

pub(crate) enum Plan {
    Solid(Color),
    Wipe(Color),
    Rainbow,
    Chase { color: Color, blank: Color },
    Pursuit,
    Scene(Arc<Scene>),
}

/// Resolve a built-in show name to its plan and effective wire order, or None
/// for names that can only be scenes. Color validation happens here so both
/// the live trigger and the preview path reject the same requests.
pub(crate) fn builtin_plan(
    show: &str,
    params: &ShowParams,
) -> Result<Option<(Plan, ColorOrder)>, TriggerError> {
    let required = |color: Option<Color>, param: &'static str| {
        color.ok_or_else(|| TriggerError::MissingColor(show.to_string(), param))
    };
    let plan = match show {
        "color" => Plan::Solid(required(params.color, "color")?),
        "colorwipe" => Plan::Wipe(required(params.color, "color")?),
        "rainbow" => Plan::Rainbow,
        "theatrechase" => Plan::Chase {
            color: required(params.color, "color")?,
            blank: required(params.blank_color, "blankColor")?,
        },
        "knightrider" | "knightrider_green" | "knightrider_blue" => Plan::Pursuit,
        _ => return Ok(None),
    };
    let order = match show {
        "knightrider_green" => ColorOrder::Grb,
        "knightrider_blue" => ColorOrder::Bgr,
        _ => params.color_order,
    };
    Ok(Some((plan, order)))
}

struct RunHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the single animation task allowed to exist at a time. A trigger stops
/// whatever is running, fire-and-forget, and installs the next run; the old
/// task notices at its next frame boundary and releases the strip on its way
/// out.
pub struct ShowRunner {
    animations: Arc<Mutex<Animations>>,
    scenes: Arc<SceneCache>,
    current: Mutex<Option<RunHandle>>,
}

impl ShowRunner {
    pub fn new(animations: Animations, scenes: Arc<SceneCache>) -> Self {
        ShowRunner {
            animations: Arc::new(Mutex::new(animations)),
            scenes,
            current: Mutex::new(None),
        }
    }

    /// True while an animation task is alive. One-shot shows that already
    /// finished count as idle.
    pub async fn is_running(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map_or(false, |run| !run.task.is_finished())
    }

    /// Validate and start a show. Nothing has touched the strip by the time
    /// an error comes back.
    pub async fn trigger(&self, show: &str, params: ShowParams) -> Result<(), TriggerError> {
        let speed =
            Speed::new(params.percentage).ok_or(TriggerError::BadPercentage(params.percentage))?;

        let (plan, order) = match builtin_plan(show, &params)? {
            Some(found) => found,
            None => {
                let scene = self
                    .scenes
                    .resolve(show)
                    .await
                    .ok_or_else(|| TriggerError::UnknownShow(show.to_string()))?;
                (Plan::Scene(scene), params.color_order)
            }
        };

        info!("starting show {:?} at {}%", show, params.percentage);

        let (stop, mut token) = RunToken::pair();
        let animations = self.animations.clone();
        let repeat = params.repeat;
        let show_name = show.to_string();

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.stop.send_replace(true);
        }
        let task = tokio::spawn(async move {
            let mut animations = animations.lock().await;
            if let Err(e) = run_plan(&mut animations, &mut token, plan, order, speed, repeat).await
            {
                error!("show {:?} aborted: {:#}", show_name, e);
            }
        });
        *current = Some(RunHandle { stop, task });
        Ok(())
    }
}

pub(crate) async fn run_plan(
    animations: &mut Animations,
    token: &mut RunToken,
    plan: Plan,
    order: ColorOrder,
    speed: Speed,
    repeat: bool,
) -> Result<(), anyhow::Error> {
    // A run that was replaced before it ever reached the strip must not
    // present anything, or it would blank its replacement's first frame.
    if token.is_stopped() {
        return Ok(());
    }
    animations.set_color_order(order);
    animations.switch_off()?;
    match plan {
        Plan::Solid(color) => animations.set_color(color),
        Plan::Wipe(color) => animations.color_wipe(token, color, speed).await,
        Plan::Rainbow => animations.rainbow(token, speed).await,
        Plan::Chase { color, blank } => {
            animations.theatre_chase(token, color, blank, speed).await
        }
        Plan::Pursuit => animations.knight_rider(token, speed).await,
        Plan::Scene(scene) => {
            animations
                .play_scene(token, &scene.frames, speed, repeat)
                .await
        }
    }
}
