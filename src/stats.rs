//! Index statistics.
//!
//! A quick summary of what `consult build` produced: chunk counts, the
//! embedding model, chunking parameters and a per-source breakdown.

use anyhow::Result;

use crate::config::Config;
use crate::index;

/// `consult stats`: read the index header and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let summary = index::summary(&config.index.path).await?;

    println!("Consultant index stats");
    println!("======================");
    println!();
    println!("  Index:       {}", summary.path.display());
    println!("  Size:        {}", format_bytes(summary.file_size));
    println!(
        "  Built:       {}",
        summary
            .built_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!();
    println!(
        "  Model:       {} ({} dims, {})",
        summary.meta.model, summary.meta.dims, summary.meta.metric
    );
    println!(
        "  Chunking:    {} chars, {} overlap",
        summary.chunk_size, summary.chunk_overlap
    );
    println!("  Chunks:      {}", summary.chunk_count);
    println!("  Sources:     {}", summary.sources.len());

    if !summary.sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(57));
        for (source, chunks) in &summary.sources {
            println!("  {:<48} {:>8}", source, chunks);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
