// Page Translation Session: single-page workflow
//
// Owns detect -> translate runs, manual overrides, overlay preview state and
// explicit persistence for one page. All state lives in a watch channel so
// any number of presentation layers can observe it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::errors::{CacheError, ErrorKind, RunError, SaveError, TranslationError};
use crate::core::types::{
    OcrConfig, OverlayStyle, PageCacheEntry, PageImage, PageTranslationState, SessionPhase,
    SessionPolicy, TranslatedRegion,
};
use crate::services::cache::PageCache;
use crate::services::gateway::{OverlayCompositor, RegionDetector, RegionTranslator};
use crate::utils::metrics::Metrics;

pub const PROGRESS_STARTED: f32 = 0.1;
pub const PROGRESS_DETECTED: f32 = 0.5;
pub const PROGRESS_TRANSLATED: f32 = 0.9;

/// Collaborators shared by every session of a reader or batch
#[derive(Clone)]
pub struct SessionDeps {
    pub detector: Arc<dyn RegionDetector>,
    pub translator: Arc<dyn RegionTranslator>,
    pub compositor: Arc<dyn OverlayCompositor>,
    pub cache: Arc<dyn PageCache>,
    pub metrics: Option<Metrics>,
}

impl SessionDeps {
    pub fn new(
        detector: Arc<dyn RegionDetector>,
        translator: Arc<dyn RegionTranslator>,
        compositor: Arc<dyn OverlayCompositor>,
        cache: Arc<dyn PageCache>,
    ) -> Self {
        Self {
            detector,
            translator,
            compositor,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// How a call to `translate()` ended
#[derive(Debug, Clone)]
pub enum TranslateOutcome {
    /// Results committed; the session is `Ready`
    Completed { regions: usize },
    /// A stage failed; the session is `Failed`
    Failed(RunError),
    /// A newer run started before this one finished; results dropped
    Superseded,
    /// `cancel()` was called; results dropped
    Cancelled,
}

impl TranslateOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TranslateOutcome::Completed { .. })
    }
}

/// How `initialize()` left the session
#[derive(Debug, Clone)]
pub enum InitOutcome {
    /// Cached entry shown, session `Ready`
    CacheHit,
    /// Auto-translate ran
    Translated(TranslateOutcome),
    /// Session `Idle`, waiting for an explicit `translate()`
    AwaitingTrigger,
    /// `translate()` was called during the cache check; that run owns the state
    Overtaken,
}

pub struct PageTranslationSession {
    page_id: String,
    image: PageImage,
    ocr_config: OcrConfig,
    deps: SessionDeps,
    state: watch::Sender<PageTranslationState>,
    /// Bumped under the state lock whenever a run or cache check starts, or a run is cancelled
    generation: AtomicU64,
    active_run: Mutex<ActiveRun>,
}

/// Handle on the live run, replaced by every `translate()`
#[derive(Clone, Default)]
struct ActiveRun {
    token: CancellationToken,
    /// Set by `cancel()`; otherwise a stale run was superseded
    aborted: Arc<AtomicBool>,
}

impl PageTranslationSession {
    pub fn new(
        page_id: impl Into<String>,
        image: PageImage,
        ocr_config: OcrConfig,
        style: OverlayStyle,
        policy: SessionPolicy,
        deps: SessionDeps,
    ) -> Self {
        let page_id = page_id.into();
        let (state, _) = watch::channel(PageTranslationState::new(page_id.clone(), style, policy));

        Self {
            page_id,
            image,
            ocr_config,
            deps,
            state,
            generation: AtomicU64::new(0),
            active_run: Mutex::new(ActiveRun::default()),
        }
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PageTranslationState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<PageTranslationState> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    pub fn effective_regions(&self) -> Vec<TranslatedRegion> {
        self.state.borrow().effective_regions()
    }

    pub fn cache_entry(&self) -> Option<Arc<PageCacheEntry>> {
        self.state.borrow().cache_entry.clone()
    }

    /// Cache check performed when the page is opened.
    ///
    /// A run still in flight is superseded first. A load failure leaves the
    /// session `Idle` with the error recorded.
    #[instrument(skip(self), fields(page_id = %self.page_id))]
    pub async fn initialize(&self) -> Result<InitOutcome, CacheError> {
        let mut generation = 0;
        self.state.send_modify(|s| {
            if s.is_running() {
                self.active_run.lock().token.cancel();
                s.progress = 0.0;
            }
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            s.phase = SessionPhase::CacheCheck;
        });

        let loaded = match self.deps.cache.load(&self.page_id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Cache lookup failed: {}", e);
                let message = e.to_string();
                self.commit_if_current(generation, |s| {
                    s.phase = SessionPhase::Idle;
                    s.error = Some(message);
                });
                return Err(e);
            }
        };

        let policy = self.state.borrow().policy;
        if let Some(entry) = loaded.filter(|_| policy.always_show_cache) {
            let count = entry.regions.len();
            let entry = Arc::new(entry);
            let committed = self.commit_if_current(generation, |s| {
                s.phase = SessionPhase::Ready;
                s.regions = entry.regions.clone();
                s.overrides.clear();
                s.cache_entry = Some(entry);
                s.overlay_visible = true;
                s.error = None;
            });
            if !committed {
                return Ok(self.init_overtaken());
            }
            info!("Showing cached translation ({} regions)", count);
            return Ok(InitOutcome::CacheHit);
        }

        if !self.commit_if_current(generation, |s| s.phase = SessionPhase::Idle) {
            return Ok(self.init_overtaken());
        }
        if policy.auto_translate {
            Ok(InitOutcome::Translated(self.translate().await))
        } else {
            Ok(InitOutcome::AwaitingTrigger)
        }
    }

    /// Run detection then translation.
    ///
    /// Starting a run while another is in flight supersedes it: the older
    /// run's gateway calls are dropped and it never writes state again.
    /// Gateway failures end up in the state, never in an `Err`.
    #[instrument(skip(self), fields(page_id = %self.page_id))]
    pub async fn translate(&self) -> TranslateOutcome {
        let (generation, run) = self.begin_run();
        let token = run.token.clone();
        self.record(|m| m.record_run_started());
        debug!("Run {} started", generation);

        let detect_start = Instant::now();
        let detected = tokio::select! {
            biased;
            _ = token.cancelled() => return self.stale_outcome(generation, &run),
            result = self.deps.detector.detect_regions(&self.image, &self.ocr_config) => result,
        };
        let detected = match detected {
            Ok(regions) => regions,
            Err(e) => return self.fail_run(generation, &run, e.into()),
        };
        self.record(|m| m.record_detection(detect_start.elapsed()));

        if !self.commit_if_current(generation, |s| s.progress = PROGRESS_DETECTED) {
            return self.stale_outcome(generation, &run);
        }
        info!("Detected {} regions", detected.len());

        let translated = if detected.is_empty() {
            Vec::new()
        } else {
            let translate_start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return self.stale_outcome(generation, &run),
                result = self.deps.translator.translate_regions(&detected) => result,
            };
            let translated = match result {
                Ok(translated) => translated,
                Err(e) => return self.fail_run(generation, &run, e.into()),
            };
            if translated.len() != detected.len() {
                let mismatch = TranslationError::RegionCountMismatch {
                    detected: detected.len(),
                    returned: translated.len(),
                };
                return self.fail_run(generation, &run, mismatch.into());
            }
            self.record(|m| m.record_translation(translate_start.elapsed()));
            translated
        };

        let count = translated.len();
        let committed = self.commit_if_current(generation, move |s| {
            s.regions = translated;
            s.overrides.clear();
            s.overlay_visible = true;
            s.phase = SessionPhase::Ready;
            s.progress = PROGRESS_TRANSLATED;
            s.error = None;
        });
        if !committed {
            return self.stale_outcome(generation, &run);
        }

        self.record(|m| m.record_run_succeeded());
        info!("Translation ready ({} regions)", count);
        TranslateOutcome::Completed { regions: count }
    }

    /// Abort the in-flight run, if any. Returns whether a run was aborted.
    #[instrument(skip(self), fields(page_id = %self.page_id))]
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.send_if_modified(|s| {
            if !s.is_running() {
                return false;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            let run = self.active_run.lock();
            run.aborted.store(true, Ordering::SeqCst);
            run.token.cancel();
            s.phase = if s.regions.is_empty() && s.cache_entry.is_none() {
                SessionPhase::Idle
            } else {
                SessionPhase::Ready
            };
            s.progress = 0.0;
            true
        });
        if cancelled {
            info!("Translation run cancelled");
        }
        cancelled
    }

    /// Record a manual correction for region `index`. Only valid when `Ready`.
    pub fn set_override(&self, index: usize, text: impl Into<String>) -> bool {
        let text = text.into();
        self.state.send_if_modified(|s| {
            if s.phase != SessionPhase::Ready || index >= s.regions.len() {
                return false;
            }
            s.overrides.insert(index, text);
            clear_stale_error(s);
            true
        })
    }

    pub fn clear_override(&self, index: usize) -> bool {
        self.state.send_if_modified(|s| {
            let removed = s.overrides.remove(&index).is_some();
            if removed {
                clear_stale_error(s);
            }
            removed
        })
    }

    /// Render the effective regions and persist them.
    ///
    /// Returns `Ok(None)` without side effects when there is nothing to save
    /// or a run is in flight. On failure the previous `cache_entry` is kept.
    #[instrument(skip(self), fields(page_id = %self.page_id))]
    pub async fn save(&self) -> Result<Option<Arc<PageCacheEntry>>, SaveError> {
        let (regions, style) = {
            let s = self.state.borrow();
            if s.is_running() || s.regions.is_empty() {
                debug!("Nothing to save (phase {:?})", s.phase);
                return Ok(None);
            }
            (s.effective_regions(), s.style.clone())
        };

        let render_start = Instant::now();
        let overlay_image = match self
            .deps
            .compositor
            .render_overlay(&self.image, &regions, &style)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.save_failed(e.into())),
        };
        self.record(|m| m.record_render(render_start.elapsed()));

        let entry = PageCacheEntry {
            page_id: self.page_id.clone(),
            overlay_image,
            regions,
        };
        if let Err(e) = self.deps.cache.save(&self.page_id, &entry).await {
            return Err(self.save_failed(e.into()));
        }

        let entry = Arc::new(entry);
        self.state.send_modify(|s| {
            s.cache_entry = Some(entry.clone());
            s.error = None;
        });
        self.record(|m| m.record_save(true));
        info!("Saved {} regions", entry.regions.len());
        Ok(Some(entry))
    }

    /// Remove the persisted entry. In-memory regions and overrides survive.
    #[instrument(skip(self), fields(page_id = %self.page_id))]
    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        if let Err(e) = self.deps.cache.clear(&self.page_id).await {
            warn!("Cache clear failed: {}", e);
            self.state.send_modify(|s| s.error = Some(e.to_string()));
            return Err(e);
        }

        self.state.send_modify(|s| {
            s.cache_entry = None;
            s.error = None;
            if s.regions.is_empty() && s.phase == SessionPhase::Ready {
                s.phase = SessionPhase::Idle;
                s.overlay_visible = false;
            }
        });
        self.record(|m| m.record_cache_clear());
        Ok(())
    }

    pub fn set_overlay_visible(&self, visible: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.overlay_visible != visible;
            s.overlay_visible = visible;
            clear_stale_error(s) || changed
        });
    }

    /// Returns the new visibility
    pub fn toggle_overlay(&self) -> bool {
        let mut visible = false;
        self.state.send_modify(|s| {
            s.overlay_visible = !s.overlay_visible;
            visible = s.overlay_visible;
            clear_stale_error(s);
        });
        visible
    }

    /// Takes effect on the next `save()`; the cached entry is untouched
    pub fn set_style(&self, style: OverlayStyle) {
        self.state.send_if_modified(|s| {
            let changed = s.style != style;
            s.style = style;
            clear_stale_error(s) || changed
        });
    }

    pub fn set_auto_translate(&self, enabled: bool) {
        self.state.send_modify(|s| {
            s.policy.auto_translate = enabled;
            clear_stale_error(s);
        });
    }

    pub fn set_always_show_cache(&self, enabled: bool) {
        self.state.send_modify(|s| {
            s.policy.always_show_cache = enabled;
            clear_stale_error(s);
        });
    }

    fn begin_run(&self) -> (u64, ActiveRun) {
        let run = ActiveRun::default();
        let mut generation = 0;
        self.state.send_modify(|s| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let previous = std::mem::replace(&mut *self.active_run.lock(), run.clone());
            previous.token.cancel();
            s.phase = SessionPhase::Running;
            s.progress = PROGRESS_STARTED;
            s.error = None;
        });
        (generation, run)
    }

    /// Apply `update` only if `generation` is still the live run
    fn commit_if_current(
        &self,
        generation: u64,
        update: impl FnOnce(&mut PageTranslationState),
    ) -> bool {
        self.state.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(s);
            true
        })
    }

    fn fail_run(&self, generation: u64, run: &ActiveRun, error: RunError) -> TranslateOutcome {
        let message = error.to_string();
        let committed = self.commit_if_current(generation, |s| {
            s.phase = SessionPhase::Failed;
            s.progress = 0.0;
            s.error = Some(message);
            s.regions.clear();
            s.overrides.clear();
        });
        if !committed {
            return self.stale_outcome(generation, run);
        }

        warn!("Translation run failed: {}", error);
        self.record(|m| m.record_run_failed(error.kind()));
        TranslateOutcome::Failed(error)
    }

    fn stale_outcome(&self, generation: u64, run: &ActiveRun) -> TranslateOutcome {
        if run.aborted.load(Ordering::SeqCst) {
            debug!("Run {} cancelled, dropping its results", generation);
            self.record(|m| m.record_run_cancelled());
            TranslateOutcome::Cancelled
        } else {
            debug!("Run {} superseded, dropping its results", generation);
            self.record(|m| m.record_run_superseded());
            TranslateOutcome::Superseded
        }
    }

    fn save_failed(&self, error: SaveError) -> SaveError {
        warn!("Save failed: {}", error);
        self.state.send_modify(|s| s.error = Some(error.to_string()));
        self.record(|m| m.record_save(false));
        error
    }

    fn init_overtaken(&self) -> InitOutcome {
        debug!("Translation started during cache check, leaving state to it");
        InitOutcome::Overtaken
    }

    fn record(&self, f: impl FnOnce(&Metrics)) {
        if let Some(ref metrics) = self.deps.metrics {
            f(metrics);
        }
    }
}

/// Drop the error left by an earlier failed operation. A `Failed` session
/// keeps its error until the next run.
fn clear_stale_error(s: &mut PageTranslationState) -> bool {
    if s.phase == SessionPhase::Failed {
        return false;
    }
    s.error.take().is_some()
}
