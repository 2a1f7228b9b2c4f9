// Chapter-level workflow: batch translation and export documents

pub mod batch_translator;
pub mod export;

pub use batch_translator::{
    page_id, BatchManifest, BatchProgress, ChapterBatchTranslator, PageOutcome, PageStatus,
    ProgressCallback,
};
pub use export::{chapter_to_json, export_chapter, export_page, ExportBubble, PageExport};
