//! Export documents built from saved cache entries.
//!
//! Page: `{ "pageId": .., "bubbles": [{ "bbox", "original", "translated" }] }`.
//! Chapter: a JSON array of page documents, skipping pages with no entry.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::batch_translator::page_id;
use crate::core::errors::CacheResult;
use crate::core::types::{BoundingBox, PageCacheEntry};
use crate::services::cache::PageCache;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBubble {
    pub bbox: BoundingBox,
    pub original: String,
    pub translated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageExport {
    #[serde(rename = "pageId")]
    pub page_id: String,
    pub bubbles: Vec<ExportBubble>,
}

impl From<&PageCacheEntry> for PageExport {
    fn from(entry: &PageCacheEntry) -> Self {
        Self {
            page_id: entry.page_id.clone(),
            bubbles: entry
                .regions
                .iter()
                .map(|r| ExportBubble {
                    bbox: r.bbox,
                    original: r.original_text.clone(),
                    translated: r.translated_text.clone(),
                })
                .collect(),
        }
    }
}

impl PageExport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn chapter_to_json(pages: &[PageExport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(pages)
}

/// `None` when the page has no saved entry
pub async fn export_page(cache: &dyn PageCache, page_id: &str) -> CacheResult<Option<PageExport>> {
    Ok(cache.load(page_id).await?.as_ref().map(PageExport::from))
}

/// Pages `0..page_count` of the chapter, in order, omitting unsaved pages
pub async fn export_chapter(
    cache: &dyn PageCache,
    chapter_id: &str,
    page_count: usize,
) -> CacheResult<Vec<PageExport>> {
    let mut pages = Vec::new();
    for index in 0..page_count {
        let id = page_id(chapter_id, index);
        match export_page(cache, &id).await? {
            Some(page) => pages.push(page),
            None => debug!("No saved translation for {}", id),
        }
    }
    Ok(pages)
}
