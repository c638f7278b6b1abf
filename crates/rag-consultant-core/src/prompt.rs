//! Prompt assembly: retrieved chunks + question -> generator input.
//!
//! Chunk texts are joined in retrieval order with [`CONTEXT_SEPARATOR`] and
//! substituted into an instruction template together with the question.
//! The default template pins the persona, restricts answers to the supplied
//! context, asks the model to admit when the context lacks the answer, and
//! asks it to cite every source it used.

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Marker placed between chunk texts in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Persona used when the config does not set one.
pub const DEFAULT_PERSONA: &str =
    "a Good Practices consultant for SENASA's veterinary technical guides";

/// Default instruction template. `{persona}` is filled once at
/// construction, `{context}` and `{question}` on every render.
pub const DEFAULT_TEMPLATE: &str = "
You are {persona}.
Answer the user's question based **only** on the following context documents.
If the information is not in the context, say politely that you do not have that information.
Your answer must be complete and professional, and must cite **all the sources** you took information from.

Context:
{context}

Question: {question}
";

/// A validated instruction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// # Errors
    ///
    /// [`RagError::Configuration`] if `{context}` or `{question}` is missing.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in ["{context}", "{question}"] {
            if !template.contains(placeholder) {
                return Err(RagError::Configuration(format!(
                    "prompt template is missing the {} placeholder",
                    placeholder
                )));
            }
        }
        Ok(Self { template })
    }

    /// Template with `{persona}` replaced, validated.
    pub fn with_persona(template: &str, persona: &str) -> Result<Self> {
        Self::new(template.replace("{persona}", persona))
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both placeholders in a single pass, so braces inside the
    /// question or the documents are never expanded.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{question}") {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    /// Join `chunks` into a context block and render the prompt.
    pub fn assemble<'a>(&self, chunks: impl IntoIterator<Item = &'a Chunk>, question: &str) -> String {
        self.render(&join_context(chunks), question)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.replace("{persona}", DEFAULT_PERSONA),
        }
    }
}

/// Concatenate chunk texts in the given order, separated by
/// [`CONTEXT_SEPARATOR`]. No chunks gives an empty string.
pub fn join_context<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> String {
    chunks
        .into_iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Render the default template.
pub fn assemble(chunks: &[Chunk], question: &str) -> String {
    PromptTemplate::default().assemble(chunks, question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: text.to_string(),
            text: text.to_string(),
            hash: String::new(),
            metadata: ChunkMetadata {
                source: None,
                page: None,
                chunk_index: 0,
                start_offset: 0,
            },
        }
    }

    #[test]
    fn test_join_keeps_retrieval_order() {
        let chunks = vec![chunk("second best"), chunk("best"), chunk("third")];
        assert_eq!(
            join_context(&chunks),
            "second best\n\n---\n\nbest\n\n---\n\nthird"
        );
    }

    #[test]
    fn test_default_template_instructions() {
        let prompt = assemble(&[chunk("Milk must be cooled to 4°C.")], "How cold must milk be?");
        assert!(prompt.contains(DEFAULT_PERSONA));
        assert!(prompt.contains("**only**"));
        assert!(prompt.contains("do not have that information"));
        assert!(prompt.contains("**all the sources**"));
        assert!(prompt.contains("Context:\nMilk must be cooled to 4°C.\n"));
        assert!(prompt.contains("Question: How cold must milk be?"));
        assert!(!prompt.contains("{persona}"));
    }

    #[test]
    fn test_empty_context_is_legal() {
        let prompt = assemble(&[], "Anything?");
        assert!(prompt.contains("Context:\n\n\nQuestion: Anything?"));
    }

    #[test]
    fn test_placeholders_required() {
        assert!(PromptTemplate::new("only {context}").is_err());
        assert!(PromptTemplate::new("only {question}").is_err());
        assert!(PromptTemplate::new("{context} / {question}").is_ok());
    }

    #[test]
    fn test_render_single_pass() {
        let t = PromptTemplate::new("C={context} Q={question} {other}").unwrap();
        let out = t.render("ctx with {question}", "what about {context}?");
        assert_eq!(out, "C=ctx with {question} Q=what about {context}? {other}");
    }

    #[test]
    fn test_custom_persona() {
        let t = PromptTemplate::with_persona(DEFAULT_TEMPLATE, "a dairy hygiene auditor").unwrap();
        assert!(t.render("", "q").contains("You are a dairy hygiene auditor."));
    }
}
