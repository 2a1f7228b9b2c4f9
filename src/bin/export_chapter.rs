//! Print the export document of a chapter from the file-backed page cache.
//! Run with: cargo run --bin export_chapter -- <chapter_id> <page_count> [cache_dir]

use anyhow::{bail, Context, Result};
use tracing::info;

use comic_page_translator::{
    orchestration::{chapter_to_json, export_chapter},
    utils::init_tracing,
    Config, FilePageCache, Metrics,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new().context("Failed to load configuration")?;
    init_tracing(&config);

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <chapter_id> <page_count> [cache_dir]", args[0]);
    }
    let chapter_id = &args[1];
    let page_count: usize = args[2]
        .parse()
        .with_context(|| format!("page_count must be a number, got '{}'", args[2]))?;
    let cache_dir = args.get(3).map(String::as_str).unwrap_or(config.cache_dir());

    let metrics = Metrics::new();
    let cache = FilePageCache::new(cache_dir, config.cache_memory_entries(), Some(metrics.clone()))
        .await
        .with_context(|| format!("Failed to open page cache at {}", cache_dir))?;

    let pages = export_chapter(&cache, chapter_id, page_count).await?;
    info!(
        "Exported {}/{} pages of {} ({} cache misses)",
        pages.len(),
        page_count,
        chapter_id,
        metrics.snapshot().cache_misses
    );

    println!("{}", chapter_to_json(&pages)?);
    Ok(())
}
