//! Bounded cache of loaded models, owned by the pipeline context.
//!
//! Loading a neural model takes seconds, so one model is reused across every
//! chunk and chapter that asks for the same load parameters. At most
//! [`MODEL_CACHE_CAPACITY`] models stay resident; the least recently used one
//! is dropped first.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use lru::LruCache;

use crate::settings::{AttentionImpl, Precision, SynthesisSettings};
use crate::TtsError;

/// Number of models kept loaded at once.
pub const MODEL_CACHE_CAPACITY: usize = 2;

/// Parameters that identify one loaded model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub model_path: PathBuf,
    pub precision: Precision,
    pub attention: AttentionImpl,
    pub device: String,
}

impl ModelKey {
    /// Build the key for the model configured in `settings`.
    pub fn from_settings(settings: &SynthesisSettings) -> Result<Self, TtsError> {
        let model_path = settings
            .model_path
            .clone()
            .ok_or(TtsError::MissingModelPath(settings.engine))?;
        Ok(Self {
            model_path,
            precision: settings.precision,
            attention: settings.attention,
            device: settings.device.trim().to_ascii_lowercase(),
        })
    }
}

/// LRU cache from [`ModelKey`] to a loaded model.
pub struct ModelCache<M> {
    entries: LruCache<ModelKey, M>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self::with_capacity(MODEL_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Return the model for `key`, loading it with `load` on a miss.
    ///
    /// A failed load leaves the cache unchanged.
    pub fn get_or_load<F>(&mut self, key: &ModelKey, load: F) -> Result<&mut M, TtsError>
    where
        F: FnOnce(&ModelKey) -> Result<M, TtsError>,
    {
        if !self.entries.contains(key) {
            let model = load(key)?;
            if let Some((evicted, _)) = self.entries.push(key.clone(), model) {
                if &evicted != key {
                    log::info!("Evicted model {} from cache", evicted.model_path.display());
                }
            }
        }
        self.entries
            .get_mut(key)
            .ok_or_else(|| TtsError::Synthesis("model cache lost a freshly loaded entry".into()))
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.entries.contains(key)
    }

    /// Drop the model for `key`, freeing whatever memory it holds.
    pub fn evict(&mut self, key: &ModelKey) -> bool {
        let evicted = self.entries.pop(key).is_some();
        if evicted {
            log::info!("Unloaded model {}", key.model_path.display());
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ModelKey {
        ModelKey {
            model_path: PathBuf::from(name),
            precision: Precision::Fp32,
            attention: AttentionImpl::Sdpa,
            device: "cpu".into(),
        }
    }

    #[test]
    fn loads_once_per_key() {
        let mut cache = ModelCache::new();
        let mut loads = 0;
        for _ in 0..3 {
            let model = cache
                .get_or_load(&key("a"), |_| {
                    loads += 1;
                    Ok(String::from("model-a"))
                })
                .unwrap();
            assert_eq!(model, "model-a");
        }
        assert_eq!(loads, 1);
    }

    #[test]
    fn evicts_least_recently_used_beyond_capacity() {
        let mut cache = ModelCache::new();
        cache.get_or_load(&key("a"), |_| Ok(1)).unwrap();
        cache.get_or_load(&key("b"), |_| Ok(2)).unwrap();
        cache.get_or_load(&key("a"), |_| Ok(99)).unwrap();
        cache.get_or_load(&key("c"), |_| Ok(3)).unwrap();

        assert_eq!(cache.len(), MODEL_CACHE_CAPACITY);
        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
    }

    #[test]
    fn key_distinguishes_load_parameters() {
        let mut cache = ModelCache::new();
        let mut half = key("a");
        half.precision = Precision::Fp16;
        cache.get_or_load(&key("a"), |_| Ok(1)).unwrap();
        assert_eq!(*cache.get_or_load(&half, |_| Ok(2)).unwrap(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_load_and_explicit_eviction() {
        let mut cache: ModelCache<u8> = ModelCache::new();
        let err = cache
            .get_or_load(&key("a"), |_| Err(TtsError::MissingBackend("test".into())))
            .unwrap_err();
        assert!(matches!(err, TtsError::MissingBackend(_)));
        assert!(cache.is_empty());

        cache.get_or_load(&key("a"), |_| Ok(1)).unwrap();
        assert!(cache.evict(&key("a")));
        assert!(!cache.evict(&key("a")));
        assert!(cache.is_empty());
    }
}
