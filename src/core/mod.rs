pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    CacheError, ConfigError, DetectionError, RenderingError, RunError, SaveError,
    TranslationError,
};
pub use types::{
    BoundingBox, ManualOverrideMap, OcrConfig, OverlayMode, OverlayStyle, PageCacheEntry,
    PageImage, PageTranslationState, SessionPhase, SessionPolicy, TextRegion, TranslatedRegion,
};
