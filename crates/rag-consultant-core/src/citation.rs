//! Source attribution for answers.
//!
//! Sources are deduplicated by their full identifier and sorted so the
//! citation block is stable regardless of retrieval order, then shown by
//! base name. Two files with the same name in different folders stay two
//! entries.

use std::collections::BTreeSet;

use crate::models::Chunk;

/// Label for chunks that carry no source path.
pub const UNKNOWN_SOURCE: &str = "unknown source";

/// Heading placed above the source list.
pub const SOURCES_HEADING: &str = "**Sources consulted:**";

/// Last path component, accepting both `/` and `\` separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or(path)
}

/// Base names of the distinct sources behind `chunks`, ordered by full
/// source identifier.
pub fn extract<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Vec<String> {
    chunks
        .into_iter()
        .map(|c| match c.metadata.source.as_deref() {
            Some(src) if !src.trim().is_empty() => src,
            _ => UNKNOWN_SOURCE,
        })
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(|src| basename(src).to_string())
        .collect()
}

/// The citation block: separator, heading, one bullet per source.
pub fn render_sources(sources: &[String]) -> String {
    let mut out = format!("\n\n---\n\n{}\n", SOURCES_HEADING);
    for s in sources {
        out.push_str(&format!("- `{}`\n", s));
    }
    out
}

/// Answer text followed by its citation block.
pub fn compose_response(answer: &str, sources: &[String]) -> String {
    format!("{}{}", answer, render_sources(sources))
}
