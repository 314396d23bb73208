use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::scene::{Scene, SceneStore};

/// Resolved scenes keyed by name, so repeated triggers of the same scene skip
/// the store. Entries fall out after sitting idle past the ttl (sliding, the
/// clock restarts on every hit); mutations drop entries explicitly through
/// `invalidate` before they apply.
pub struct SceneCache {
    store: Arc<SceneStore>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedScene>>,
}

struct CachedScene {
    scene: Arc<Scene>,
    last_used: Instant,
}

impl SceneCache {
    pub fn new(store: Arc<SceneStore>, ttl: Duration) -> Self {
        SceneCache {
            store,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached aggregate on a hit; otherwise one eager load from the store.
    /// Unknown names are not cached.
    pub async fn resolve(&self, name: &str) -> Option<Arc<Scene>> {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(name) {
            if entry.last_used.elapsed() < self.ttl {
                entry.last_used = Instant::now();
                return Some(entry.scene.clone());
            }
            debug!("scene {:?} expired from cache", name);
            entries.remove(name);
        }

        let scene = Arc::new(self.store.by_name(name).await?);
        entries.insert(
            name.to_string(),
            CachedScene {
                scene: scene.clone(),
                last_used: Instant::now(),
            },
        );
        Some(scene)
    }

    pub async fn invalidate(&self, name: &str) {
        self.entries.lock().await.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Frame, SceneError};

    async fn seeded(name: &str, ttl: Duration) -> (Arc<SceneStore>, SceneCache) {
        let path = std::env::temp_dir().join(format!(
            "stairlight-cache-{}-{}.json",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let store = Arc::new(SceneStore::load(path, 10).unwrap());
        store.create("steps").await.unwrap();
        let cache = SceneCache::new(store.clone(), ttl);
        (store, cache)
    }

    fn frame(order_nr: u32) -> Frame {
        Frame {
            order_nr,
            wait_till_next_frame: 50,
            leds: Vec::new(),
        }
    }

    #[tokio::test]
    async fn hit_serves_the_cached_aggregate() -> Result<(), SceneError> {
        let (store, cache) = seeded("hit", Duration::from_secs(3600)).await;
        let first = cache.resolve("steps").await.unwrap();
        assert!(first.frames.is_empty());

        // Mutating the store without invalidating must not show up yet.
        store.add_frame(first.id, frame(1)).await?;
        let second = cache.resolve("steps").await.unwrap();
        assert!(second.frames.is_empty());
        assert!(Arc::ptr_eq(&first, &second));
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_forces_one_fresh_load() -> Result<(), SceneError> {
        let (store, cache) = seeded("inval", Duration::from_secs(3600)).await;
        let stale = cache.resolve("steps").await.unwrap();
        store.add_frame(stale.id, frame(1)).await?;

        cache.invalidate("steps").await;
        let fresh = cache.resolve("steps").await.unwrap();
        assert_eq!(fresh.frames.len(), 1);

        // No mutation since: the same aggregate comes straight back.
        let again = cache.resolve("steps").await.unwrap();
        assert!(Arc::ptr_eq(&fresh, &again));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn idle_entries_expire() -> Result<(), SceneError> {
        let (store, cache) = seeded("expire", Duration::from_millis(100)).await;
        let stale = cache.resolve("steps").await.unwrap();
        store.add_frame(stale.id, frame(1)).await?;

        tokio::time::sleep(Duration::from_millis(150)).await;
        let fresh = cache.resolve("steps").await.unwrap();
        assert_eq!(fresh.frames.len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_window_slides_on_every_hit() -> Result<(), SceneError> {
        let (store, cache) = seeded("slide", Duration::from_millis(100)).await;
        let stale = cache.resolve("steps").await.unwrap();
        store.add_frame(stale.id, frame(1)).await?;

        // Touch inside the window, then sit past the original deadline.
        tokio::time::sleep(Duration::from_millis(70)).await;
        cache.resolve("steps").await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;

        // 140ms since insert but only 70ms since the touch: still cached.
        let cached = cache.resolve("steps").await.unwrap();
        assert!(cached.frames.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_names_resolve_to_none() {
        let (_store, cache) = seeded("miss", Duration::from_secs(3600)).await;
        assert!(cache.resolve("nothing-here").await.is_none());
    }
}
