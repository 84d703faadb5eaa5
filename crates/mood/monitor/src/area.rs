//! Emotion code to mood-quadrant lookup.
//!
//! The catalog itself belongs to the surrounding application. The monitor
//! only reads it, through a TTL read-through cache that the owner of the
//! catalog may invalidate explicitly.

use mood_types::Area;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Read-only source of emotion metadata.
pub trait EmotionCatalog: Send + Sync {
    /// Area for an emotion code, or `None` if the code is unknown.
    fn area_for(&self, emotion_code: &str) -> Option<Area>;
}

/// Fixed emotion table, for tests and embedded deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticEmotionCatalog {
    areas: HashMap<String, Area>,
}

impl StaticEmotionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, emotion_code: impl Into<String>, area: Area) -> Self {
        self.areas.insert(emotion_code.into(), area);
        self
    }
}

impl FromIterator<(String, Area)> for StaticEmotionCatalog {
    fn from_iter<I: IntoIterator<Item = (String, Area)>>(iter: I) -> Self {
        Self {
            areas: iter.into_iter().collect(),
        }
    }
}

impl EmotionCatalog for StaticEmotionCatalog {
    fn area_for(&self, emotion_code: &str) -> Option<Area> {
        self.areas.get(emotion_code).copied()
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedArea {
    area: Option<Area>,
    fetched_at: Instant,
}

/// Hit/miss counters of an [`AreaCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AreaCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// TTL read-through cache in front of an [`EmotionCatalog`].
///
/// Unknown codes are cached as `None` as well, so a missing mapping costs one
/// catalog read per TTL rather than one per entry.
pub struct AreaCache {
    source: Arc<dyn EmotionCatalog>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedArea>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AreaCache {
    pub fn new(source: Arc<dyn EmotionCatalog>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Resolve an emotion code, reading through to the catalog on a miss or
    /// an expired entry.
    pub fn area_for(&self, emotion_code: &str) -> Option<Area> {
        if let Ok(guard) = self.entries.read() {
            if let Some(cached) = guard.get(emotion_code) {
                if cached.fetched_at.elapsed() < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return cached.area;
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let area = self.source.area_for(emotion_code);
        if area.is_none() {
            debug!(emotion_code, "Emotion code has no area");
        }

        match self.entries.write() {
            Ok(mut guard) => {
                guard.insert(
                    emotion_code.to_string(),
                    CachedArea {
                        area,
                        fetched_at: Instant::now(),
                    },
                );
            }
            Err(_) => warn!("area cache lock poisoned; serving uncached"),
        }
        area
    }

    /// Drop one code so the next lookup reads the catalog again.
    pub fn invalidate(&self, emotion_code: &str) {
        if let Ok(mut guard) = self.entries.write() {
            guard.remove(emotion_code);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut guard) = self.entries.write() {
            guard.clear();
        }
    }

    pub fn stats(&self) -> AreaCacheStats {
        AreaCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().map(|g| g.len()).unwrap_or(0),
        }
    }
}
