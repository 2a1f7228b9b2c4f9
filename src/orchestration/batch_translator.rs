// Chapter Batch Translator: unattended per-page workflow across a chapter

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::export::{self, PageExport};
use crate::core::errors::CacheResult;
use crate::core::types::{OcrConfig, OverlayStyle, PageImage, SessionPolicy};
use crate::session::{PageTranslationSession, SessionDeps, TranslateOutcome};

/// Cache key of page `index` in `chapter_id`
pub fn page_id(chapter_id: &str, index: usize) -> String {
    format!("{}-page{}", chapter_id, index)
}

/// Reported before each page is attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// 1-based
    pub current: usize,
    pub total: usize,
    pub page_id: String,
    pub status: String,
}

pub type ProgressCallback = Arc<dyn Fn(BatchProgress) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    /// Translated; `saved` is false when the page had no text to persist
    Succeeded { regions: usize, saved: bool },
    Failed { error: String },
    /// Never attempted, or abandoned by batch cancellation
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    pub index: usize,
    pub page_id: String,
    #[serde(flatten)]
    pub status: PageStatus,
    pub processing_time_ms: u64,
}

/// Aggregated result of a chapter run. Always produced, even if every page fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub chapter_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_page_ids: Vec<String>,
    pub pages: Vec<PageOutcome>,
    pub elapsed_ms: u64,
}

impl BatchManifest {
    fn new(chapter_id: &str, total: usize) -> Self {
        Self {
            chapter_id: chapter_id.to_string(),
            total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failed_page_ids: Vec::new(),
            pages: Vec::with_capacity(total),
            elapsed_ms: 0,
        }
    }

    fn push(&mut self, outcome: PageOutcome) {
        match outcome.status {
            PageStatus::Succeeded { .. } => self.succeeded += 1,
            PageStatus::Failed { .. } => {
                self.failed += 1;
                self.failed_page_ids.push(outcome.page_id.clone());
            }
            PageStatus::Skipped => self.skipped += 1,
        }
        self.pages.push(outcome);
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Runs a `PageTranslationSession` per page, strictly in page order
pub struct ChapterBatchTranslator {
    deps: SessionDeps,
    ocr_config: OcrConfig,
    style: OverlayStyle,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl ChapterBatchTranslator {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            ocr_config: OcrConfig::default(),
            style: OverlayStyle::default(),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_ocr_config(mut self, ocr_config: OcrConfig) -> Self {
        self.ocr_config = ocr_config;
        self
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(BatchProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the batch; pages not yet finished are reported `Skipped`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Translate and save every page. One page failing never stops the rest,
    /// and failed pages never get a cache entry.
    #[instrument(skip(self, pages), fields(total_pages = pages.len()))]
    pub async fn translate_chapter(&self, chapter_id: &str, pages: Vec<PageImage>) -> BatchManifest {
        let start = Instant::now();
        let total = pages.len();
        let mut manifest = BatchManifest::new(chapter_id, total);
        info!("Translating chapter {} ({} pages)", chapter_id, total);

        for (index, image) in pages.into_iter().enumerate() {
            let id = page_id(chapter_id, index);

            if self.cancel.is_cancelled() {
                manifest.push(PageOutcome {
                    index,
                    page_id: id,
                    status: PageStatus::Skipped,
                    processing_time_ms: 0,
                });
                continue;
            }

            self.report(BatchProgress {
                current: index + 1,
                total,
                page_id: id.clone(),
                status: format!("Translating page {}/{}", index + 1, total),
            });

            let page_start = Instant::now();
            let status = self.translate_page(&id, image).await;
            if let PageStatus::Failed { ref error } = status {
                warn!("Page {} failed: {}", id, error);
            }
            manifest.push(PageOutcome {
                index,
                page_id: id,
                status,
                processing_time_ms: page_start.elapsed().as_millis() as u64,
            });
        }

        manifest.elapsed_ms = start.elapsed().as_millis() as u64;
        if let Some(ref metrics) = self.deps.metrics {
            metrics.record_batch_processed(total);
        }
        info!(
            "Chapter {} done: {} succeeded, {} failed, {} skipped in {}ms",
            chapter_id, manifest.succeeded, manifest.failed, manifest.skipped, manifest.elapsed_ms
        );
        manifest
    }

    async fn translate_page(&self, id: &str, image: PageImage) -> PageStatus {
        // Batch runs always re-translate and write explicitly
        let policy = SessionPolicy {
            auto_translate: false,
            always_show_cache: false,
        };
        let session = PageTranslationSession::new(
            id,
            image,
            self.ocr_config.clone(),
            self.style.clone(),
            policy,
            self.deps.clone(),
        );

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                session.cancel();
                return PageStatus::Skipped;
            }
            outcome = session.translate() => outcome,
        };

        match outcome {
            TranslateOutcome::Completed { regions } => match session.save().await {
                Ok(saved) => PageStatus::Succeeded {
                    regions,
                    saved: saved.is_some(),
                },
                Err(e) => PageStatus::Failed {
                    error: e.to_string(),
                },
            },
            TranslateOutcome::Failed(e) => PageStatus::Failed {
                error: e.to_string(),
            },
            TranslateOutcome::Superseded | TranslateOutcome::Cancelled => PageStatus::Skipped,
        }
    }

    fn report(&self, progress: BatchProgress) {
        if let Some(ref callback) = self.progress {
            callback(progress);
        }
    }

    pub async fn export_page(&self, page_id: &str) -> CacheResult<Option<PageExport>> {
        export::export_page(self.deps.cache.as_ref(), page_id).await
    }

    pub async fn export_chapter(
        &self,
        chapter_id: &str,
        page_count: usize,
    ) -> CacheResult<Vec<PageExport>> {
        export::export_chapter(self.deps.cache.as_ref(), chapter_id, page_count).await
    }
}
