//! `docchat chunk`: Preview how a document is chunked.

use std::path::Path;

use docchat_config::AppConfig;
use docchat_retrieval::Chunker;

pub async fn run(
    path: &Path,
    max_chunk_size: Option<usize>,
    overlap: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let chunker = Chunker::new(
        max_chunk_size.unwrap_or(config.rag.max_chunk_size),
        overlap.unwrap_or(config.rag.overlap_size),
    )?;

    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let chunks = chunker.chunk(&text, &name);

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!(
        "{name}: {} chars → {} chunks (max {}, overlap {})",
        text.chars().count(),
        chunks.len(),
        chunker.max_chunk_size(),
        chunker.overlap_size()
    );
    for chunk in &chunks {
        println!();
        println!(
            "── {} ({} chars) ──",
            chunk.id,
            chunk.content.chars().count()
        );
        println!("{}", chunk.content);
    }

    Ok(())
}
