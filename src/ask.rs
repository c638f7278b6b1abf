//! One-shot question answering (`consult ask`).

use anyhow::{bail, Result};
use rag_consultant_core::models::RetrievalResult;
use rag_consultant_core::{citation, RagError};

use crate::config::Config;
use crate::service;

/// Answer `question` and print the response with its sources block.
///
/// With `show_context`, the retrieved chunks are printed after the answer.
/// A pipeline failure prints the user-facing message on stderr and exits
/// nonzero; no fallback answer is produced.
pub async fn run_ask(
    config: &Config,
    question: &str,
    k: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question must not be empty");
    }
    if k == Some(0) {
        bail!("--k must be at least 1");
    }

    let service = service::shared(config).await?;
    let result = match k {
        Some(k) => service.answer_top_k(question, k).await,
        None => service.answer(question).await,
    };
    let answer = result.map_err(report)?;

    println!("{}", answer.render());
    if show_context {
        print_context(&answer.retrieved);
    }
    Ok(())
}

fn report(err: RagError) -> anyhow::Error {
    eprintln!("{}", err.user_message());
    err.into()
}

fn print_context(retrieved: &RetrievalResult) {
    println!();
    if retrieved.is_empty() {
        println!("(no context retrieved)");
        return;
    }
    for (i, hit) in retrieved.hits.iter().enumerate() {
        let source = hit
            .chunk
            .metadata
            .source
            .as_deref()
            .map(citation::basename)
            .unwrap_or(citation::UNKNOWN_SOURCE);
        let page = hit
            .chunk
            .metadata
            .page
            .map(|p| format!(" p.{}", p))
            .unwrap_or_default();
        println!("{}. [{:.3}] {}{}", i + 1, hit.score, source, page);
        println!("{}", indent(&hit.chunk.text));
        println!();
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\nb"), "    a\n    b");
    }
}
