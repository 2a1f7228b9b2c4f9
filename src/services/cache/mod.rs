//! Page-keyed persistence of finalized translations.

pub mod file;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::errors::CacheResult;
use crate::core::types::PageCacheEntry;

pub use file::FilePageCache;

/// Durable store of `PageCacheEntry` by page id.
///
/// Calls for different page ids never interfere. For the same page id the
/// last completed `save` wins and `load` always returns a whole entry.
#[async_trait]
pub trait PageCache: Send + Sync + 'static {
    async fn load(&self, page_id: &str) -> CacheResult<Option<PageCacheEntry>>;

    async fn save(&self, page_id: &str, entry: &PageCacheEntry) -> CacheResult<()>;

    /// Removing an absent entry succeeds.
    async fn clear(&self, page_id: &str) -> CacheResult<()>;
}

/// Process-local page cache. Entries vanish with the process.
#[derive(Clone, Default)]
pub struct MemoryPageCache {
    entries: Arc<RwLock<HashMap<String, PageCacheEntry>>>,
}

impl MemoryPageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, page_id: &str) -> bool {
        self.entries.read().contains_key(page_id)
    }
}

#[async_trait]
impl PageCache for MemoryPageCache {
    async fn load(&self, page_id: &str) -> CacheResult<Option<PageCacheEntry>> {
        Ok(self.entries.read().get(page_id).cloned())
    }

    async fn save(&self, page_id: &str, entry: &PageCacheEntry) -> CacheResult<()> {
        self.entries
            .write()
            .insert(page_id.to_string(), entry.clone());
        Ok(())
    }

    async fn clear(&self, page_id: &str) -> CacheResult<()> {
        self.entries.write().remove(page_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{TextRegion, TranslatedRegion};

    fn entry(page_id: &str, text: &str) -> PageCacheEntry {
        PageCacheEntry {
            page_id: page_id.to_string(),
            overlay_image: vec![1, 2, 3],
            regions: vec![TranslatedRegion::from_region(
                TextRegion::new([0, 0, 5, 5], "Hola"),
                text,
            )],
        }
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip_and_overwrite() {
        let cache = MemoryPageCache::new();
        assert!(cache.load("ch1-page0").await.unwrap().is_none());

        cache.save("ch1-page0", &entry("ch1-page0", "Hello")).await.unwrap();
        cache.save("ch1-page0", &entry("ch1-page0", "Hi")).await.unwrap();

        let loaded = cache.load("ch1-page0").await.unwrap().unwrap();
        assert_eq!(loaded.regions[0].translated_text, "Hi");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_clear_is_idempotent() {
        let cache = MemoryPageCache::new();
        cache.clear("missing").await.unwrap();

        cache.save("ch1-page1", &entry("ch1-page1", "Hello")).await.unwrap();
        cache.clear("ch1-page1").await.unwrap();
        cache.clear("ch1-page1").await.unwrap();
        assert!(!cache.contains("ch1-page1"));
    }

    #[tokio::test]
    async fn test_concurrent_saves_on_distinct_pages() {
        let cache = Arc::new(MemoryPageCache::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                let page_id = format!("ch1-page{}", i);
                cache.save(&page_id, &entry(&page_id, "Hello")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
