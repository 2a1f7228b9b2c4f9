//! Scriptable gateway and cache doubles for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::{
    CacheError, CacheResult, DetectionError, DetectionResult, RenderingError, RenderingResult,
    TranslationResult,
};
use crate::core::types::{
    OcrConfig, OverlayStyle, PageCacheEntry, PageImage, TextRegion, TranslatedRegion,
};
use crate::services::cache::{MemoryPageCache, PageCache};
use crate::services::gateway::{OverlayCompositor, RegionDetector, RegionTranslator};

type Scripted<T> = (Duration, T);

#[derive(Clone)]
pub struct FakeDetector {
    default: DetectionResult<Vec<TextRegion>>,
    delay: Duration,
    scripted: Arc<Mutex<VecDeque<Scripted<DetectionResult<Vec<TextRegion>>>>>>,
    failing_images: Arc<Mutex<HashMap<Vec<u8>, DetectionError>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeDetector {
    pub fn new(regions: Vec<TextRegion>) -> Self {
        Self {
            default: Ok(regions),
            delay: Duration::ZERO,
            scripted: Arc::default(),
            failing_images: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub fn failing(error: DetectionError) -> Self {
        Self {
            default: Err(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a one-off response used by the next call instead of the default
    pub fn then_respond(self, delay: Duration, result: DetectionResult<Vec<TextRegion>>) -> Self {
        self.scripted.lock().push_back((delay, result));
        self
    }

    /// Fail whenever the page image bytes equal `bytes`
    pub fn fail_for_image(self, bytes: &[u8], error: DetectionError) -> Self {
        self.failing_images.lock().insert(bytes.to_vec(), error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegionDetector for FakeDetector {
    async fn detect_regions(
        &self,
        image: &PageImage,
        _config: &OcrConfig,
    ) -> DetectionResult<Vec<TextRegion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.scripted.lock().pop_front();
        let (delay, result) = scripted.unwrap_or_else(|| (self.delay, self.default.clone()));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let image_failure = self.failing_images.lock().get(image.as_bytes()).cloned();
        match image_failure {
            Some(error) => Err(error),
            None => result,
        }
    }
}

#[derive(Clone)]
pub struct FakeTranslator {
    prefix: String,
    drop_last: bool,
    delay: Duration,
    scripted: Arc<Mutex<VecDeque<Scripted<TranslationResult<Vec<TranslatedRegion>>>>>>,
    seen: Arc<Mutex<Vec<Vec<TextRegion>>>>,
}

impl FakeTranslator {
    /// Translates every region to `prefix + original_text`
    pub fn prefixed(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            drop_last: false,
            delay: Duration::ZERO,
            scripted: Arc::default(),
            seen: Arc::default(),
        }
    }

    /// Return one region fewer than requested
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then_respond(
        self,
        delay: Duration,
        result: TranslationResult<Vec<TranslatedRegion>>,
    ) -> Self {
        self.scripted.lock().push_back((delay, result));
        self
    }

    /// Region lists received, in call order
    pub fn seen(&self) -> Vec<Vec<TextRegion>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl RegionTranslator for FakeTranslator {
    async fn translate_regions(
        &self,
        regions: &[TextRegion],
    ) -> TranslationResult<Vec<TranslatedRegion>> {
        self.seen.lock().push(regions.to_vec());

        let scripted = self.scripted.lock().pop_front();
        if let Some((delay, result)) = scripted {
            tokio::time::sleep(delay).await;
            return result;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut out: Vec<TranslatedRegion> = regions
            .iter()
            .map(|r| {
                let text = format!("{}{}", self.prefix, r.original_text);
                TranslatedRegion::from_region(r.clone(), text)
            })
            .collect();
        if self.drop_last {
            out.pop();
        }
        Ok(out)
    }
}

/// Translator backed by a fixed dictionary; unknown text passes through
#[derive(Clone)]
pub struct DictionaryTranslator {
    entries: HashMap<String, String>,
}

impl DictionaryTranslator {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl RegionTranslator for DictionaryTranslator {
    async fn translate_regions(
        &self,
        regions: &[TextRegion],
    ) -> TranslationResult<Vec<TranslatedRegion>> {
        Ok(regions
            .iter()
            .map(|r| {
                let text = self
                    .entries
                    .get(&r.original_text)
                    .cloned()
                    .unwrap_or_else(|| r.original_text.clone());
                TranslatedRegion::from_region(r.clone(), text)
            })
            .collect())
    }
}

/// Compositor whose output encodes the texts it was given: `overlay:Hello|Bye`
#[derive(Clone, Default)]
pub struct FakeCompositor {
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FakeCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn expected_output(texts: &[&str]) -> Vec<u8> {
        format!("overlay:{}", texts.join("|")).into_bytes()
    }
}

#[async_trait]
impl OverlayCompositor for FakeCompositor {
    async fn render_overlay(
        &self,
        _image: &PageImage,
        regions: &[TranslatedRegion],
        _style: &OverlayStyle,
    ) -> RenderingResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderingError::TaskFailed("compositor offline".to_string()));
        }
        let texts: Vec<&str> = regions.iter().map(|r| r.translated_text.as_str()).collect();
        Ok(Self::expected_output(&texts))
    }
}

/// Memory cache whose operations can be switched to fail
#[derive(Clone, Default)]
pub struct FlakyCache {
    pub store: MemoryPageCache,
    fail_load: Arc<AtomicBool>,
    fail_save: Arc<AtomicBool>,
    fail_clear: Arc<AtomicBool>,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageCache for FlakyCache {
    async fn load(&self, page_id: &str) -> CacheResult<Option<PageCacheEntry>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("load refused".to_string()));
        }
        self.store.load(page_id).await
    }

    async fn save(&self, page_id: &str, entry: &PageCacheEntry) -> CacheResult<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("save refused".to_string()));
        }
        self.store.save(page_id, entry).await
    }

    async fn clear(&self, page_id: &str) -> CacheResult<()> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("clear refused".to_string()));
        }
        self.store.clear(page_id).await
    }
}

pub fn hola_adios() -> Vec<TextRegion> {
    vec![
        TextRegion::new([10, 10, 60, 40], "Hola"),
        TextRegion::new([80, 10, 140, 40], "Adios"),
    ]
}
