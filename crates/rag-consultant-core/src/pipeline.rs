//! Question answering: retrieve, assemble, generate, cite.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::citation;
use crate::error::Result;
use crate::generate::Generator;
use crate::models::RetrievalResult;
use crate::prompt::PromptTemplate;
use crate::retrieve::Retriever;

/// A generated answer and the sources it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Model output, without the citation block.
    pub text: String,
    /// Base names of the distinct sources of the retrieved chunks.
    pub sources: Vec<String>,
    #[serde(skip)]
    pub retrieved: RetrievalResult,
}

impl Answer {
    /// Answer text followed by the "sources consulted" block.
    pub fn render(&self) -> String {
        citation::compose_response(&self.text, &self.sources)
    }
}

/// End-to-end query path. Cheap to clone; all state is shared and
/// read-only, so concurrent `answer` calls do not interfere.
#[derive(Clone)]
pub struct Pipeline {
    retriever: Retriever,
    template: PromptTemplate,
    generator: Arc<dyn Generator>,
}

impl Pipeline {
    pub fn new(retriever: Retriever, template: PromptTemplate, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            template,
            generator,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Answer `question` using the retriever's default `k`.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_top_k(question, self.retriever.top_k()).await
    }

    /// Answer `question` from the `k` most similar chunks.
    ///
    /// An empty retrieval still reaches the generator with an empty context;
    /// the prompt tells the model to say it lacks the information.
    pub async fn answer_top_k(&self, question: &str, k: usize) -> Result<Answer> {
        let retrieved = self.retriever.retrieve_k(question, k).await?;
        let prompt = self.template.assemble(retrieved.chunks(), question);
        debug!(
            chunks = retrieved.len(),
            prompt_chars = prompt.chars().count(),
            "assembled prompt"
        );

        let text = self.generator.generate(&prompt).await?;
        let sources = citation::extract(retrieved.chunks());

        info!(
            model = self.generator.model_name(),
            chunks = retrieved.len(),
            sources = sources.len(),
            "answered question"
        );
        Ok(Answer {
            text,
            sources,
            retrieved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::error::RagError;
    use crate::models::{Chunk, ChunkMetadata, IndexedChunk};
    use crate::store::{InMemoryIndex, IndexMeta, Metric, VectorIndex};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("milk") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    /// Records every prompt and answers with a fixed string.
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        reply: std::result::Result<String, ()>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|_| RagError::Generation {
                provider: "recording".into(),
                message: "quota exceeded".into(),
            })
        }
    }

    fn entry(source: &str, text: &str, v: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                id: text.to_string(),
                text: text.to_string(),
                hash: String::new(),
                metadata: ChunkMetadata {
                    source: Some(source.to_string()),
                    page: None,
                    chunk_index: 0,
                    start_offset: 0,
                },
            },
            embedding: v,
        }
    }

    fn pipeline(entries: Vec<IndexedChunk>, gen: Arc<RecordingGenerator>) -> Pipeline {
        let meta = IndexMeta {
            model: "axis".into(),
            dims: 2,
            metric: Metric::Cosine,
        };
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new(meta, entries).unwrap());
        let retriever = Retriever::new(Arc::new(AxisEmbedder), index, 2).unwrap();
        Pipeline::new(retriever, PromptTemplate::default(), gen)
    }

    fn generator(reply: std::result::Result<&str, ()>) -> Arc<RecordingGenerator> {
        Arc::new(RecordingGenerator {
            prompts: Mutex::new(Vec::new()),
            reply: reply.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_answer_with_sources() {
        let gen = generator(Ok("Cool milk to 4°C."));
        let p = pipeline(
            vec![
                entry("docs/vaccines.pdf", "vaccine schedule", vec![0.0, 1.0]),
                entry("docs/milk.pdf", "milk cooling", vec![1.0, 0.0]),
                entry("docs/milk.pdf", "milk storage", vec![0.9, 0.1]),
            ],
            gen.clone(),
        );

        let answer = p.answer("how to store milk?").await.unwrap();
        assert_eq!(answer.text, "Cool milk to 4°C.");
        assert_eq!(answer.sources, vec!["milk.pdf"]);
        assert_eq!(answer.retrieved.len(), 2);

        let prompts = gen.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("milk cooling\n\n---\n\nmilk storage"));
        assert!(!prompts[0].contains("vaccine schedule"));
        assert!(answer.render().ends_with("**Sources consulted:**\n- `milk.pdf`\n"));
    }

    #[tokio::test]
    async fn test_empty_index_still_generates() {
        let gen = generator(Ok("I do not have that information."));
        let p = pipeline(vec![], gen.clone());
        let answer = p.answer("anything?").await.unwrap();
        assert!(answer.sources.is_empty());
        assert_eq!(gen.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let gen = generator(Err(()));
        let p = pipeline(vec![entry("a.pdf", "milk", vec![1.0, 0.0])], gen);
        let err = p.answer("milk?").await.unwrap_err();
        assert_eq!(err.code(), "generation_failed");
    }

    #[tokio::test]
    async fn test_explicit_k() {
        let gen = generator(Ok("ok"));
        let p = pipeline(
            vec![
                entry("a.pdf", "milk a", vec![1.0, 0.0]),
                entry("b.pdf", "milk b", vec![0.8, 0.2]),
                entry("c.pdf", "other", vec![0.0, 1.0]),
            ],
            gen,
        );
        let answer = p.answer_top_k("milk", 3).await.unwrap();
        assert_eq!(answer.sources, vec!["a.pdf", "b.pdf", "c.pdf"]);
    }
}
