// Error types for the page translation workflow
//
// Gateway errors are captured into session state; cache and save errors are
// returned to the caller of the operation that hit them.

use thiserror::Error;

/// Region detection gateway errors
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("Unreadable page image: {0}")]
    UnreadableImage(String),

    #[error("Detection backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Detection timed out after {0}s")]
    Timeout(u64),
}

/// Translation gateway errors
#[derive(Debug, Clone, Error)]
pub enum TranslationError {
    #[error("Translation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Translation request failed: {0}")]
    RequestFailed(String),

    #[error("Translator returned {returned} regions for {detected} detected")]
    RegionCountMismatch { detected: usize, returned: usize },

    #[error("Translation timed out after {0}s")]
    Timeout(u64),
}

/// Stage failure of a detection+translation run
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Translation failed: {0}")]
    Translation(#[from] TranslationError),
}

/// Overlay compositor errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("Image processing failed: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid colour: {0}")]
    InvalidColor(String),

    #[error("Render task failed: {0}")]
    TaskFailed(String),
}

/// Page cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to load cache entry from {path}: {source}")]
    LoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to save cache entry to {path}: {source}")]
    SaveFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to clear cache entry at {path}: {source}")]
    ClearFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Cache (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache directory creation failed: {0}")]
    DirectoryCreationFailed(std::io::Error),

    #[error("Cache file {path} holds page '{found}', expected '{expected}'")]
    KeyCollision {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure of `PageTranslationSession::save`
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Overlay rendering failed: {0}")]
    Rendering(#[from] RenderingError),

    #[error("Cache write failed: {0}")]
    Cache(#[from] CacheError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid cache config: {0}")]
    InvalidCacheConfig(String),

    #[error("Invalid gateway config: {0}")]
    InvalidGatewayConfig(String),

    #[error("Invalid overlay config: {0}")]
    InvalidOverlayConfig(String),

    #[error("Environment variable {name} could not be parsed: {value}")]
    EnvVarError { name: String, value: String },
}

pub type DetectionResult<T> = Result<T, DetectionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type CacheResult<T> = Result<T, CacheError>;

/// Short machine-readable name, used as a metrics label
pub trait ErrorKind {
    fn kind(&self) -> &'static str;
}

impl ErrorKind for DetectionError {
    fn kind(&self) -> &'static str {
        match self {
            DetectionError::UnreadableImage(_) => "detection_unreadable_image",
            DetectionError::BackendUnavailable(_) => "detection_unavailable",
            DetectionError::Timeout(_) => "detection_timeout",
        }
    }
}

impl ErrorKind for TranslationError {
    fn kind(&self) -> &'static str {
        match self {
            TranslationError::BackendUnavailable(_) => "translation_unavailable",
            TranslationError::RequestFailed(_) => "translation_request_failed",
            TranslationError::RegionCountMismatch { .. } => "translation_count_mismatch",
            TranslationError::Timeout(_) => "translation_timeout",
        }
    }
}

impl ErrorKind for RunError {
    fn kind(&self) -> &'static str {
        match self {
            RunError::Detection(e) => e.kind(),
            RunError::Translation(e) => e.kind(),
        }
    }
}
