// Library exports for the comic page translation workflow
//
// A page session owns detect -> translate -> correct -> save for one page;
// the batch translator drives sessions across a chapter.

pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod session;
pub mod utils;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{
        CacheError, ConfigError, DetectionError, RenderingError, RunError, SaveError,
        TranslationError,
    },
    types::{
        BoundingBox, ManualOverrideMap, OcrConfig, OverlayMode, OverlayStyle, PageCacheEntry,
        PageImage, PageTranslationState, SessionPhase, SessionPolicy, TextRegion,
        TranslatedRegion,
    },
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState, GuardedDetector, GuardedTranslator};

pub use orchestration::{BatchManifest, ChapterBatchTranslator, PageExport, PageStatus};

pub use services::{
    FilePageCache, MemoryPageCache, OverlayCompositor, PageCache, PlateCompositor,
    RegionDetector, RegionTranslator,
};

pub use session::{InitOutcome, PageTranslationSession, SessionDeps, TranslateOutcome};

pub use utils::{init_tracing, Metrics};
