//! The HTTP control surface: scene CRUD, show triggers, the live LED mirror
//! and GIF previews. Everything speaks camelCase JSON and CORS is wide open
//! so the wall-mounted tablets can talk to it from anywhere on the LAN.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::color::{Color, ColorOrder};
use crate::play::runner::{ShowParams, ShowRunner, TriggerError, BUILTIN_SHOWS};
use crate::preview::{GifRenderer, PreviewError, PreviewOptions};
use crate::scene::cache::SceneCache;
use crate::scene::{Frame, SceneError, SceneId, SceneMeta, SceneStore};
use crate::strip::simulator::SimulatorHandle;

#[derive(Clone)]
pub struct AppState {
    runner: Arc<ShowRunner>,
    store: Arc<SceneStore>,
    cache: Arc<SceneCache>,
    /// None when driving real hardware, which has no mirror to read back.
    simulator: Option<SimulatorHandle>,
    /// The strip's native wire order, used when a trigger names none.
    default_color_order: ColorOrder,
}

impl AppState {
    pub fn new(
        runner: Arc<ShowRunner>,
        store: Arc<SceneStore>,
        cache: Arc<SceneCache>,
        simulator: Option<SimulatorHandle>,
        default_color_order: ColorOrder,
    ) -> Self {
        AppState {
            runner,
            store,
            cache,
            simulator,
            default_color_order,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/shows", get(list_shows))
        .route("/animation/:show", get(trigger_animation))
        .route("/animation/:show/preview.gif", get(animation_preview))
        .route("/scenes", get(list_scenes).post(create_scene))
        .route(
            "/scenes/:id",
            get(get_scene).put(rename_scene).delete(delete_scene),
        )
        .route("/scenes/:id/frames", get(list_frames).post(add_frames))
        .route("/scenes/:id/frames/:order_nr", get(get_frame))
        .route("/scenes/:id/frame", post(add_frame))
        .route("/scenes/:id/preview.gif", get(scene_preview))
        .route("/leds", get(led_snapshot))
        .route("/leds/stream", get(led_stream))
        .route("/simulator/status", get(simulator_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> &'static str {
    "stairlight is up. Try /shows, /scenes or /leds/stream.\n"
}

/// Built-in show names first, authored scene names after them.
async fn list_shows(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut shows: Vec<String> = BUILTIN_SHOWS.iter().map(|s| s.to_string()).collect();
    shows.extend(state.store.list().await.into_iter().map(|scene| scene.name));
    Json(shows)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerQuery {
    color: Option<String>,
    blank_color: Option<String>,
    #[serde(default = "default_percentage")]
    percentage: i64,
    #[serde(default)]
    repeat: bool,
    color_order: Option<ColorOrder>,
}

fn default_percentage() -> i64 {
    100
}

/// Start a show or scene on the strip, replacing whatever is running.
async fn trigger_animation(
    State(state): State<AppState>,
    Path(show): Path<String>,
    Query(query): Query<TriggerQuery>,
) -> Result<StatusCode, StatusCode> {
    let params = ShowParams {
        color: parse_color(query.color.as_deref())?,
        blank_color: parse_color(query.blank_color.as_deref())?,
        percentage: query.percentage,
        repeat: query.repeat,
        color_order: query.color_order.unwrap_or(state.default_color_order),
    };
    state
        .runner
        .trigger(&show, params)
        .await
        .map_err(trigger_status)?;
    Ok(StatusCode::OK)
}

async fn list_scenes(State(state): State<AppState>) -> Json<Vec<SceneMeta>> {
    Json(state.store.list().await)
}

#[derive(Deserialize)]
struct ScenePayload {
    name: String,
}

async fn create_scene(
    State(state): State<AppState>,
    Json(payload): Json<ScenePayload>,
) -> Result<(StatusCode, Json<SceneMeta>), StatusCode> {
    if BUILTIN_SHOWS.contains(&payload.name.as_str()) {
        warn!(
            "scene {:?} will be shadowed by the built-in show of the same name",
            payload.name
        );
    }
    let meta = state.store.create(&payload.name).await.map_err(scene_status)?;
    info!("🎬 created scene {:?} (id {})", meta.name, meta.id);
    Ok((StatusCode::CREATED, Json(meta)))
}

async fn get_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> Result<Json<SceneMeta>, StatusCode> {
    state
        .store
        .get(id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn rename_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
    Json(payload): Json<ScenePayload>,
) -> Result<StatusCode, StatusCode> {
    let previous = state
        .store
        .rename(id, &payload.name)
        .await
        .map_err(scene_status)?;
    // The cached aggregate is stale under its old name, and under the new
    // name too if a prior scene once held it.
    state.cache.invalidate(&previous).await;
    state.cache.invalidate(&payload.name).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> Result<StatusCode, StatusCode> {
    let name = state.store.delete(id).await.map_err(scene_status)?;
    state.cache.invalidate(&name).await;
    info!("deleted scene {:?}", name);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_frames(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> Result<Json<Vec<Frame>>, StatusCode> {
    state.store.frames(id).await.map(Json).map_err(scene_status)
}

async fn get_frame(
    State(state): State<AppState>,
    Path((id, order_nr)): Path<(SceneId, u32)>,
) -> Result<Json<Frame>, StatusCode> {
    state
        .store
        .frame(id, order_nr)
        .await
        .map(Json)
        .map_err(scene_status)
}

async fn add_frame(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
    Json(frame): Json<Frame>,
) -> Result<StatusCode, StatusCode> {
    invalidate_scene(&state, id).await;
    state
        .store
        .add_frame(id, frame)
        .await
        .map_err(scene_status)?;
    Ok(StatusCode::CREATED)
}

/// Batch insert, all or nothing.
async fn add_frames(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
    Json(frames): Json<Vec<Frame>>,
) -> Result<StatusCode, StatusCode> {
    invalidate_scene(&state, id).await;
    state
        .store
        .add_frames(id, frames)
        .await
        .map_err(scene_status)?;
    Ok(StatusCode::CREATED)
}

/// Drop the cached aggregate before the mutation lands, so a concurrent
/// trigger re-reads the store instead of replaying stale frames.
async fn invalidate_scene(state: &AppState, id: SceneId) {
    if let Some(meta) = state.store.get(id).await {
        state.cache.invalidate(&meta.name).await;
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LedState {
    led_nr: u32,
    r: u8,
    g: u8,
    b: u8,
}

fn led_states(pixels: &[Color]) -> Vec<LedState> {
    pixels
        .iter()
        .enumerate()
        .map(|(i, color)| LedState {
            led_nr: i as u32,
            r: color.r,
            g: color.g,
            b: color.b,
        })
        .collect()
}

/// The mirror as of right now. Real hardware has nothing to read back.
async fn led_snapshot(
    State(state): State<AppState>,
) -> Result<Json<Vec<LedState>>, StatusCode> {
    let simulator = state.simulator.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(led_states(&simulator.snapshot())))
}

/// Server-sent events: the current frame immediately, then one event per
/// change. Bursts coalesce to the newest frame.
async fn led_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, StatusCode> {
    let simulator = state.simulator.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let stream = WatchStream::new(simulator.subscribe())
        .map(|pixels| Event::default().json_data(led_states(&pixels)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulatorStatus {
    enabled: bool,
    led_count: usize,
    running: bool,
}

async fn simulator_status(State(state): State<AppState>) -> Json<SimulatorStatus> {
    Json(SimulatorStatus {
        enabled: state.simulator.is_some(),
        led_count: state.store.led_count(),
        running: state.runner.is_running().await,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewQuery {
    max_frames: Option<usize>,
    speed: Option<f64>,
    color: Option<String>,
    blank_color: Option<String>,
}

impl PreviewQuery {
    fn options(&self) -> PreviewOptions {
        let defaults = PreviewOptions::default();
        PreviewOptions {
            max_frames: self.max_frames.unwrap_or(defaults.max_frames),
            speed: self.speed.unwrap_or(defaults.speed),
        }
    }
}

async fn scene_preview(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
    Query(query): Query<PreviewQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let frames = state.store.frames(id).await.map_err(scene_status)?;
    let renderer = GifRenderer::new(state.store.led_count());
    let bytes = renderer
        .render_frames(&frames, query.options())
        .map_err(preview_status)?;
    Ok(([(header::CONTENT_TYPE, "image/gif")], bytes))
}

async fn animation_preview(
    State(state): State<AppState>,
    Path(show): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let params = ShowParams {
        color: parse_color(query.color.as_deref())?,
        blank_color: parse_color(query.blank_color.as_deref())?,
        ..ShowParams::default()
    };
    let renderer = GifRenderer::new(state.store.led_count());
    let bytes = renderer
        .render_animation(&show, &params, query.options())
        .await
        .map_err(preview_status)?;
    Ok(([(header::CONTENT_TYPE, "image/gif")], bytes))
}

fn parse_color(raw: Option<&str>) -> Result<Option<Color>, StatusCode> {
    match raw {
        None => Ok(None),
        Some(s) => match Color::from_hex(s) {
            Some(color) => Ok(Some(color)),
            None => {
                warn!("rejecting malformed color literal {:?}", s);
                Err(StatusCode::BAD_REQUEST)
            }
        },
    }
}

fn trigger_status(e: TriggerError) -> StatusCode {
    match e {
        TriggerError::BadPercentage(_) | TriggerError::MissingColor(..) => {
            warn!("rejecting trigger: {}", e);
            StatusCode::BAD_REQUEST
        }
        TriggerError::UnknownShow(_) => StatusCode::NOT_FOUND,
    }
}

fn scene_status(e: SceneError) -> StatusCode {
    match e {
        SceneError::UnknownScene(_) | SceneError::UnknownFrame { .. } => StatusCode::NOT_FOUND,
        SceneError::DuplicateOrderNr { .. }
        | SceneError::LedOutOfRange { .. }
        | SceneError::DuplicateName(_) => {
            warn!("rejecting scene request: {}", e);
            StatusCode::BAD_REQUEST
        }
        SceneError::Io(_) | SceneError::Encoding(_) => {
            error!("scene store failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn preview_status(e: PreviewError) -> StatusCode {
    match e {
        PreviewError::Trigger(e) => trigger_status(e),
        PreviewError::Render(e) => {
            error!("preview rendering failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
