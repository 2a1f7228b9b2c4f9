use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use xxhash_rust::xxh3::xxh3_64;

use super::PageCache;
use crate::core::errors::{CacheError, CacheResult};
use crate::core::types::PageCacheEntry;
use crate::utils::Metrics;

/// Page cache persisted as one JSON file per page.
///
/// - File names are the xxHash3 of the page id, so ids with path separators are safe
/// - Writes go to a temp file and are renamed into place; readers never see a partial file
/// - Writers to the same page are serialized by a per-key async lock (last writer wins)
/// - Recently used entries stay decoded in an LRU in front of the disk
#[derive(Clone)]
pub struct FilePageCache {
    inner: Arc<FileCacheInner>,
}

struct FileCacheInner {
    dir: PathBuf,
    memory: Mutex<LruCache<String, PageCacheEntry>>,
    key_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    write_seq: AtomicU64,
    metrics: Option<Metrics>,
}

impl FilePageCache {
    /// Open (and create if needed) a cache rooted at `cache_dir`.
    ///
    /// # Arguments
    /// * `cache_dir` - Directory holding one file per page
    /// * `memory_entries` - Decoded entries kept in memory (at least 1)
    /// * `metrics` - Optional metrics collector for hit/miss accounting
    pub async fn new(
        cache_dir: impl AsRef<Path>,
        memory_entries: usize,
        metrics: Option<Metrics>,
    ) -> CacheResult<Self> {
        let dir = cache_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(CacheError::DirectoryCreationFailed)?;

        let capacity = NonZeroUsize::new(memory_entries).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            inner: Arc::new(FileCacheInner {
                dir,
                memory: Mutex::new(LruCache::new(capacity)),
                key_locks: DashMap::new(),
                write_seq: AtomicU64::new(0),
                metrics,
            }),
        })
    }

    /// File name for a page id: xxHash3 as hex
    pub fn file_key(page_id: &str) -> String {
        format!("{:016x}.json", xxh3_64(page_id.as_bytes()))
    }

    pub fn entry_path(&self, page_id: &str) -> PathBuf {
        self.inner.dir.join(Self::file_key(page_id))
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Number of entries currently decoded in memory
    pub fn memory_len(&self) -> usize {
        self.inner.memory.lock().len()
    }

    fn key_lock(&self, page_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .key_locks
            .entry(page_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the page's lock once no other caller holds or waits on it.
    /// Clones are taken under the same shard lock, so none can appear mid-check.
    fn release_key_lock(&self, page_id: &str) {
        self.inner
            .key_locks
            .remove_if(page_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn key_lock_count(&self) -> usize {
        self.inner.key_locks.len()
    }

    fn record_hit(&self) {
        if let Some(ref m) = self.inner.metrics {
            m.record_cache_hit();
        }
    }

    fn record_miss(&self) {
        if let Some(ref m) = self.inner.metrics {
            m.record_cache_miss();
        }
    }

    async fn read_entry(&self, page_id: &str) -> CacheResult<Option<PageCacheEntry>> {
        let path = self.entry_path(page_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::LoadFailed {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let entry: PageCacheEntry = serde_json::from_slice(&data)?;
        if entry.page_id != page_id {
            return Err(CacheError::KeyCollision {
                path: path.display().to_string(),
                expected: page_id.to_string(),
                found: entry.page_id,
            });
        }
        Ok(Some(entry))
    }

    /// Caller holds the page's key lock
    async fn write_entry(
        &self,
        page_id: &str,
        entry: &PageCacheEntry,
        json: &[u8],
    ) -> CacheResult<()> {
        let path = self.entry_path(page_id);
        let seq = self.inner.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("json.tmp{}", seq));

        if let Err(source) = tokio::fs::write(&tmp_path, json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CacheError::SaveFailed {
                path: tmp_path.display().to_string(),
                source,
            });
        }
        if let Err(source) = tokio::fs::rename(&tmp_path, &path).await {
            warn!("Failed to move cache entry into place for {}: {}", page_id, source);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CacheError::SaveFailed {
                path: path.display().to_string(),
                source,
            });
        }

        self.inner
            .memory
            .lock()
            .put(page_id.to_string(), entry.clone());
        Ok(())
    }

    /// Caller holds the page's key lock
    async fn remove_entry(&self, page_id: &str) -> CacheResult<()> {
        self.inner.memory.lock().pop(page_id);

        let path = self.entry_path(page_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::ClearFailed {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl PageCache for FilePageCache {
    #[instrument(skip(self), level = "debug")]
    async fn load(&self, page_id: &str) -> CacheResult<Option<PageCacheEntry>> {
        // Memory is only mutated under the key lock, so a hit is always current
        let cached = self.inner.memory.lock().get(page_id).cloned();
        if let Some(entry) = cached {
            self.record_hit();
            return Ok(Some(entry));
        }

        let result = {
            let lock = self.key_lock(page_id);
            let _guard = lock.lock().await;
            let result = self.read_entry(page_id).await;
            if let Ok(Some(ref entry)) = result {
                self.inner
                    .memory
                    .lock()
                    .put(page_id.to_string(), entry.clone());
            }
            result
        };
        self.release_key_lock(page_id);

        let entry = result?;
        if entry.is_some() {
            self.record_hit();
        } else {
            self.record_miss();
        }
        Ok(entry)
    }

    #[instrument(skip(self, entry), level = "debug", fields(regions = entry.regions.len()))]
    async fn save(&self, page_id: &str, entry: &PageCacheEntry) -> CacheResult<()> {
        let json = serde_json::to_vec(entry)?;

        let result = {
            let lock = self.key_lock(page_id);
            let _guard = lock.lock().await;
            self.write_entry(page_id, entry, &json).await
        };
        self.release_key_lock(page_id);
        result?;

        debug!("Saved cache entry for {} ({} bytes)", page_id, json.len());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn clear(&self, page_id: &str) -> CacheResult<()> {
        let result = {
            let lock = self.key_lock(page_id);
            let _guard = lock.lock().await;
            self.remove_entry(page_id).await
        };
        self.release_key_lock(page_id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{TextRegion, TranslatedRegion};

    fn entry(page_id: &str, translated: &[&str]) -> PageCacheEntry {
        PageCacheEntry {
            page_id: page_id.to_string(),
            overlay_image: vec![0x89, b'P', b'N', b'G'],
            regions: translated
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    TranslatedRegion::from_region(
                        TextRegion::new([i as i32 * 10, 0, i as i32 * 10 + 8, 8], "src"),
                        *text,
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_file_key_is_stable() {
        let key1 = FilePageCache::file_key("ch1-page0");
        let key2 = FilePageCache::file_key("ch1-page0");
        let key3 = FilePageCache::file_key("ch1-page1");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
        assert!(key1.ends_with(".json"));
        assert_eq!(key1.len(), 16 + ".json".len());
    }

    #[tokio::test]
    async fn test_save_load_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilePageCache::new(dir.path(), 4, None).await.unwrap();

        cache
            .save("ch1/page0", &entry("ch1/page0", &["Hello", "Bye"]))
            .await
            .unwrap();

        // Fresh instance has an empty memory front and must read the file
        let reopened = FilePageCache::new(dir.path(), 4, None).await.unwrap();
        let loaded = reopened.load("ch1/page0").await.unwrap().unwrap();
        assert_eq!(loaded, entry("ch1/page0", &["Hello", "Bye"]));
        assert_eq!(reopened.memory_len(), 1);
    }

    #[tokio::test]
    async fn test_missing_entry_and_idempotent_clear() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Metrics::new();
        let cache = FilePageCache::new(dir.path(), 4, Some(metrics.clone()))
            .await
            .unwrap();

        assert!(cache.load("ch1-page3").await.unwrap().is_none());
        cache.clear("ch1-page3").await.unwrap();

        cache.save("ch1-page3", &entry("ch1-page3", &["Hi"])).await.unwrap();
        cache.clear("ch1-page3").await.unwrap();
        cache.clear("ch1-page3").await.unwrap();

        assert!(cache.load("ch1-page3").await.unwrap().is_none());
        assert!(!cache.entry_path("ch1-page3").exists());
        assert_eq!(metrics.snapshot().cache_misses, 2);
    }

    #[tokio::test]
    async fn test_concurrent_writers_leave_one_whole_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilePageCache::new(dir.path(), 1, None).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let text = format!("version {}", i);
                cache
                    .save("ch2-page0", &entry("ch2-page0", &[text.as_str(), text.as_str()]))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let reopened = FilePageCache::new(dir.path(), 1, None).await.unwrap();
        let loaded = reopened.load("ch2-page0").await.unwrap().unwrap();
        assert_eq!(loaded.regions.len(), 2);
        assert_eq!(loaded.regions[0].translated_text, loaded.regions[1].translated_text);

        // No temp files left behind
        let mut names = Vec::new();
        let mut dir_entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(item) = dir_entries.next_entry().await.unwrap() {
            names.push(item.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![FilePageCache::file_key("ch2-page0")]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilePageCache::new(dir.path(), 4, None).await.unwrap();
        tokio::fs::write(cache.entry_path("ch1-page9"), b"{not json")
            .await
            .unwrap();

        let result = cache.load("ch1-page9").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_key_locks_released_after_use() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilePageCache::new(dir.path(), 2, None).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("ch3-page{}", i % 8);
                cache.save(&id, &entry(&id, &["Hello"])).await?;
                cache.load(&id).await?;
                cache.load("ch3-missing").await?;
                cache.clear(&id).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(cache.key_lock_count(), 0);
        assert!(cache.load("ch3-page0").await.unwrap().is_none());
        assert_eq!(cache.key_lock_count(), 0);
    }
}
