pub mod cache;

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::color::Color;

pub type SceneId = i64;

/// One LED's color inside a frame. `color_alpha` rides the wire name the API
/// always had, but it drives the dedicated white channel, not transparency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedSample {
    pub led_nr: u32,
    pub color_red: u8,
    pub color_green: u8,
    pub color_blue: u8,
    #[serde(default)]
    pub color_alpha: u8,
}

impl LedSample {
    pub fn color(&self) -> Color {
        Color {
            r: self.color_red,
            g: self.color_green,
            b: self.color_blue,
            w: self.color_alpha,
        }
    }
}

/// One step of a scene: the samples to write and how long to hold them before
/// the next frame. `order_nr` is unique within a scene and dictates playback
/// order regardless of when frames were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub order_nr: u32,
    #[serde(default)]
    pub wait_till_next_frame: u64,
    #[serde(default)]
    pub leds: Vec<LedSample>,
}

/// A user-authored frame sequence. Owns its frames outright; deleting the
/// scene takes everything nested with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

/// Scene header without its frames, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMeta {
    pub id: SceneId,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("no scene with id {0}")]
    UnknownScene(SceneId),
    #[error("scene {scene} has no frame {order_nr}")]
    UnknownFrame { scene: SceneId, order_nr: u32 },
    #[error("scene {scene} already has a frame {order_nr}")]
    DuplicateOrderNr { scene: SceneId, order_nr: u32 },
    #[error("led {led_nr} is outside the strip (led count {led_count})")]
    LedOutOfRange { led_nr: u32, led_count: usize },
    #[error("a scene named {0:?} already exists")]
    DuplicateName(String),
    #[error("scene file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("scene file encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// All authored scenes, held in memory and written back to one JSON file
/// after every mutation. The file doubles as the backup format people pass
/// around, so it stays pretty-printed. Mutations commit to memory only after
/// the write succeeds, so memory never runs ahead of the file.
pub struct SceneStore {
    path: PathBuf,
    led_count: usize,
    inner: RwLock<Inner>,
}

struct Inner {
    next_id: SceneId,
    scenes: Vec<Scene>,
}

impl SceneStore {
    /// Read the scene file, or start empty when there is none yet.
    pub fn load(path: impl Into<PathBuf>, led_count: usize) -> Result<Self, SceneError> {
        let path = path.into();
        let scenes: Vec<Scene> = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let next_id = scenes.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        info!("loaded {} scenes from {}", scenes.len(), path.display());
        Ok(SceneStore {
            path,
            led_count,
            inner: RwLock::new(Inner { next_id, scenes }),
        })
    }

    pub fn led_count(&self) -> usize {
        self.led_count
    }

    fn persist(&self, scenes: &[Scene]) -> Result<(), SceneError> {
        let json = serde_json::to_string_pretty(scenes)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub async fn list(&self) -> Vec<SceneMeta> {
        let inner = self.inner.read().await;
        inner
            .scenes
            .iter()
            .map(|s| SceneMeta {
                id: s.id,
                name: s.name.clone(),
            })
            .collect()
    }

    pub async fn get(&self, id: SceneId) -> Option<SceneMeta> {
        let inner = self.inner.read().await;
        inner.scenes.iter().find(|s| s.id == id).map(|s| SceneMeta {
            id: s.id,
            name: s.name.clone(),
        })
    }

    /// Full aggregate for playback, cloned out so the caller can keep it
    /// while the store moves on.
    pub async fn by_name(&self, name: &str) -> Option<Scene> {
        let inner = self.inner.read().await;
        inner.scenes.iter().find(|s| s.name == name).cloned()
    }

    pub async fn create(&self, name: &str) -> Result<SceneMeta, SceneError> {
        let mut inner = self.inner.write().await;
        if inner.scenes.iter().any(|s| s.name == name) {
            return Err(SceneError::DuplicateName(name.to_string()));
        }
        let id = inner.next_id;
        let mut staged = inner.scenes.clone();
        staged.push(Scene {
            id,
            name: name.to_string(),
            frames: Vec::new(),
        });
        self.persist(&staged)?;
        inner.scenes = staged;
        inner.next_id = id + 1;
        Ok(SceneMeta {
            id,
            name: name.to_string(),
        })
    }

    /// Returns the previous name so callers can drop stale cache entries.
    pub async fn rename(&self, id: SceneId, name: &str) -> Result<String, SceneError> {
        let mut inner = self.inner.write().await;
        if inner.scenes.iter().any(|s| s.name == name && s.id != id) {
            return Err(SceneError::DuplicateName(name.to_string()));
        }
        let mut staged = inner.scenes.clone();
        let scene = staged
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SceneError::UnknownScene(id))?;
        let previous = std::mem::replace(&mut scene.name, name.to_string());
        self.persist(&staged)?;
        inner.scenes = staged;
        Ok(previous)
    }

    /// Returns the removed scene's name so callers can drop cache entries.
    pub async fn delete(&self, id: SceneId) -> Result<String, SceneError> {
        let mut inner = self.inner.write().await;
        let at = inner
            .scenes
            .iter()
            .position(|s| s.id == id)
            .ok_or(SceneError::UnknownScene(id))?;
        let mut staged = inner.scenes.clone();
        let removed = staged.remove(at);
        self.persist(&staged)?;
        inner.scenes = staged;
        Ok(removed.name)
    }

    pub async fn frames(&self, id: SceneId) -> Result<Vec<Frame>, SceneError> {
        let inner = self.inner.read().await;
        let scene = inner
            .scenes
            .iter()
            .find(|s| s.id == id)
            .ok_or(SceneError::UnknownScene(id))?;
        Ok(scene.frames.clone())
    }

    pub async fn frame(&self, id: SceneId, order_nr: u32) -> Result<Frame, SceneError> {
        let inner = self.inner.read().await;
        let scene = inner
            .scenes
            .iter()
            .find(|s| s.id == id)
            .ok_or(SceneError::UnknownScene(id))?;
        scene
            .frames
            .iter()
            .find(|f| f.order_nr == order_nr)
            .cloned()
            .ok_or(SceneError::UnknownFrame {
                scene: id,
                order_nr,
            })
    }

    pub async fn add_frame(&self, id: SceneId, frame: Frame) -> Result<(), SceneError> {
        self.add_frames(id, vec![frame]).await
    }

    /// Insert a batch of frames, all or nothing: every frame is validated
    /// against the scene and against the rest of the batch before anything
    /// lands.
    pub async fn add_frames(&self, id: SceneId, frames: Vec<Frame>) -> Result<(), SceneError> {
        let mut inner = self.inner.write().await;
        let led_count = self.led_count;
        let mut staged = inner.scenes.clone();
        let scene = staged
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SceneError::UnknownScene(id))?;

        let mut taken: Vec<u32> = scene.frames.iter().map(|f| f.order_nr).collect();
        for frame in &frames {
            if taken.contains(&frame.order_nr) {
                return Err(SceneError::DuplicateOrderNr {
                    scene: id,
                    order_nr: frame.order_nr,
                });
            }
            taken.push(frame.order_nr);
            for led in &frame.leds {
                if led.led_nr as usize >= led_count {
                    return Err(SceneError::LedOutOfRange {
                        led_nr: led.led_nr,
                        led_count,
                    });
                }
            }
        }

        scene.frames.extend(frames);
        scene.frames.sort_by_key(|f| f.order_nr);
        self.persist(&staged)?;
        inner.scenes = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("stairlight-{}-{}.json", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn frame(order_nr: u32, led_nr: u32) -> Frame {
        Frame {
            order_nr,
            wait_till_next_frame: 100,
            leds: vec![LedSample {
                led_nr,
                color_red: 255,
                color_green: 0,
                color_blue: 0,
                color_alpha: 0,
            }],
        }
    }

    #[tokio::test]
    async fn create_list_get_delete() {
        let store = SceneStore::load(tmp("crud"), 10).unwrap();

        let a = store.create("sunrise").await.unwrap();
        let b = store.create("sunset").await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(store.get(a.id).await.unwrap().name, "sunrise");
        assert!(store.get(99).await.is_none());

        let name = store.delete(a.id).await.unwrap();
        assert_eq!(name, "sunrise");
        assert_eq!(store.list().await.len(), 1);
        assert!(matches!(
            store.delete(a.id).await,
            Err(SceneError::UnknownScene(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let store = SceneStore::load(tmp("dupname"), 10).unwrap();
        store.create("loop").await.unwrap();
        assert!(matches!(
            store.create("loop").await,
            Err(SceneError::DuplicateName(_))
        ));

        let other = store.create("other").await.unwrap();
        assert!(matches!(
            store.rename(other.id, "loop").await,
            Err(SceneError::DuplicateName(_))
        ));
        // Renaming a scene to its own name is a no-op, not a conflict.
        assert_eq!(store.rename(other.id, "other").await.unwrap(), "other");
    }

    #[tokio::test]
    async fn rename_returns_previous_name() {
        let store = SceneStore::load(tmp("rename"), 10).unwrap();
        let meta = store.create("before").await.unwrap();
        let previous = store.rename(meta.id, "after").await.unwrap();
        assert_eq!(previous, "before");
        assert_eq!(store.get(meta.id).await.unwrap().name, "after");
    }

    #[tokio::test]
    async fn frames_are_validated_and_ordered() {
        let store = SceneStore::load(tmp("frames"), 10).unwrap();
        let meta = store.create("steps").await.unwrap();

        store.add_frame(meta.id, frame(5, 0)).await.unwrap();
        store.add_frame(meta.id, frame(1, 9)).await.unwrap();

        assert!(matches!(
            store.add_frame(meta.id, frame(5, 0)).await,
            Err(SceneError::DuplicateOrderNr { order_nr: 5, .. })
        ));
        assert!(matches!(
            store.add_frame(meta.id, frame(2, 10)).await,
            Err(SceneError::LedOutOfRange { led_nr: 10, .. })
        ));

        let frames = store.frames(meta.id).await.unwrap();
        assert_eq!(
            frames.iter().map(|f| f.order_nr).collect::<Vec<_>>(),
            vec![1, 5]
        );

        assert_eq!(store.frame(meta.id, 5).await.unwrap().order_nr, 5);
        assert!(matches!(
            store.frame(meta.id, 3).await,
            Err(SceneError::UnknownFrame { order_nr: 3, .. })
        ));
    }

    #[tokio::test]
    async fn batch_insert_is_all_or_nothing() {
        let store = SceneStore::load(tmp("batch"), 10).unwrap();
        let meta = store.create("batch").await.unwrap();

        // Second entry collides with the first inside the same batch.
        let result = store
            .add_frames(meta.id, vec![frame(1, 0), frame(1, 1)])
            .await;
        assert!(matches!(
            result,
            Err(SceneError::DuplicateOrderNr { order_nr: 1, .. })
        ));
        assert!(store.frames(meta.id).await.unwrap().is_empty());

        store
            .add_frames(meta.id, vec![frame(2, 0), frame(1, 1)])
            .await
            .unwrap();
        assert_eq!(store.frames(meta.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn survives_a_reload() {
        let path = tmp("reload");
        {
            let store = SceneStore::load(&path, 10).unwrap();
            let meta = store.create("persisted").await.unwrap();
            store.add_frame(meta.id, frame(1, 3)).await.unwrap();
        }

        let store = SceneStore::load(&path, 10).unwrap();
        let scene = store.by_name("persisted").await.unwrap();
        assert_eq!(scene.frames.len(), 1);
        assert_eq!(scene.frames[0].leds[0].led_nr, 3);

        // Ids keep counting up from what the file holds.
        let next = store.create("fresh").await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn failed_persist_leaves_memory_unchanged() {
        let path = tmp("nopersist");
        let _ = std::fs::remove_dir_all(&path);
        let store = SceneStore::load(&path, 10).unwrap();
        let meta = store.create("steps").await.unwrap();
        store.add_frame(meta.id, frame(1, 0)).await.unwrap();

        // Turn the scene file into a directory so every write from here fails.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(store.create("more").await, Err(SceneError::Io(_))));
        assert!(matches!(
            store.rename(meta.id, "after").await,
            Err(SceneError::Io(_))
        ));
        assert!(matches!(
            store.add_frame(meta.id, frame(2, 1)).await,
            Err(SceneError::Io(_))
        ));
        assert!(matches!(store.delete(meta.id).await, Err(SceneError::Io(_))));

        // Memory still matches the file: one scene, original name, one frame.
        assert_eq!(store.list().await.len(), 1);
        assert_eq!(store.get(meta.id).await.unwrap().name, "steps");
        assert_eq!(store.frames(meta.id).await.unwrap().len(), 1);

        // Writes work again once the file is back; the failed create burned
        // no id.
        std::fs::remove_dir(&path).unwrap();
        let next = store.create("more").await.unwrap();
        assert_eq!(next.id, meta.id + 1);
    }

    #[tokio::test]
    async fn missing_file_means_empty_store() {
        let store = SceneStore::load(tmp("absent"), 10).unwrap();
        assert!(store.list().await.is_empty());
    }
}
