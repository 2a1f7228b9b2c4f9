// Shared data model for the page translation workflow

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Axis-aligned box `[x1, y1, x2, y2]` in page pixel coordinates
pub type BoundingBox = [i32; 4];

/// Sparse map from region index to the user's corrected text
pub type ManualOverrideMap = BTreeMap<usize, String>;

/// Raw page image as delivered by the reader (encoded bytes, any format `image` can decode)
#[derive(Clone)]
pub struct PageImage {
    pub bytes: Arc<Vec<u8>>,
}

impl PageImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Options forwarded untouched to the region detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub source_language: Option<String>,
    pub min_confidence: f32,
    pub include_free_text: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            source_language: None,
            min_confidence: 0.3,
            include_free_text: false,
        }
    }
}

/// A detected area of source-language text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRegion {
    pub bbox: BoundingBox,
    pub original_text: String,
}

impl TextRegion {
    pub fn new(bbox: BoundingBox, original_text: impl Into<String>) -> Self {
        Self {
            bbox,
            original_text: original_text.into(),
        }
    }
}

/// A detected region annotated with its machine translation.
///
/// Position in the page's region list is the addressing key for overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedRegion {
    pub bbox: BoundingBox,
    pub original_text: String,
    pub translated_text: String,
}

impl TranslatedRegion {
    pub fn from_region(region: TextRegion, translated_text: impl Into<String>) -> Self {
        Self {
            bbox: region.bbox,
            original_text: region.original_text,
            translated_text: translated_text.into(),
        }
    }
}

/// Which texts the overlay shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    #[default]
    Translation,
    Both,
    Original,
}

/// Rendering options for the overlay. Never part of cached content equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub font: String,
    pub text_color: String,
    pub background_color: String,
    pub padding: u32,
    pub mode: OverlayMode,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font: "bold 18px Segoe UI, Arial, sans-serif".to_string(),
            text_color: "#222".to_string(),
            background_color: "rgba(255,255,255,0.92)".to_string(),
            padding: 6,
            mode: OverlayMode::Translation,
        }
    }
}

/// Finalized translation of one page. At most one per page id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCacheEntry {
    pub page_id: String,
    #[serde(with = "base64_bytes")]
    pub overlay_image: Vec<u8>,
    /// Regions with effective text baked into `translated_text`
    pub regions: Vec<TranslatedRegion>,
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    CacheCheck,
    Running,
    Ready,
    Failed,
}

/// Behaviour on session open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Start a run immediately when no cached entry is shown
    pub auto_translate: bool,
    /// Show a cached entry instead of translating when one exists
    pub always_show_cache: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            auto_translate: false,
            always_show_cache: true,
        }
    }
}

/// Observable per-page workflow state
#[derive(Debug, Clone)]
pub struct PageTranslationState {
    pub page_id: String,
    pub phase: SessionPhase,
    /// In `[0, 1]`
    pub progress: f32,
    pub error: Option<String>,
    pub regions: Vec<TranslatedRegion>,
    pub overrides: ManualOverrideMap,
    pub cache_entry: Option<Arc<PageCacheEntry>>,
    pub overlay_visible: bool,
    pub style: OverlayStyle,
    pub policy: SessionPolicy,
}

impl PageTranslationState {
    pub fn new(page_id: impl Into<String>, style: OverlayStyle, policy: SessionPolicy) -> Self {
        Self {
            page_id: page_id.into(),
            phase: SessionPhase::Idle,
            progress: 0.0,
            error: None,
            regions: Vec::new(),
            overrides: ManualOverrideMap::new(),
            cache_entry: None,
            overlay_visible: false,
            style,
            policy,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Text shown for region `index`: the override if present, else the machine translation
    pub fn effective_text(&self, index: usize) -> Option<&str> {
        let region = self.regions.get(index)?;
        Some(
            self.overrides
                .get(&index)
                .map(String::as_str)
                .unwrap_or(&region.translated_text),
        )
    }

    pub fn effective_regions(&self) -> Vec<TranslatedRegion> {
        merge_overrides(&self.regions, &self.overrides)
    }
}

/// Apply overrides on a copy of `regions`; the input is left untouched.
pub fn merge_overrides(
    regions: &[TranslatedRegion],
    overrides: &ManualOverrideMap,
) -> Vec<TranslatedRegion> {
    regions
        .iter()
        .enumerate()
        .map(|(i, region)| match overrides.get(&i) {
            Some(text) => TranslatedRegion {
                translated_text: text.clone(),
                ..region.clone()
            },
            None => region.clone(),
        })
        .collect()
}

mod base64_bytes {
    use base64::{engine::general_purpose, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
