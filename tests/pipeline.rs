//! Build an index from files on disk, load it, and answer questions with
//! stand-in embedding and generation backends.

use async_trait::async_trait;
use rag_consultant::config::Config;
use rag_consultant::service::RagService;
use rag_consultant::{index, ingest};
use rag_consultant_core::embedding::Embedder;
use rag_consultant_core::generate::Generator;
use rag_consultant_core::RagError;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Two-axis vectors: texts mentioning `x` point one way, everything else
/// the other.
struct LetterEmbedder {
    name: &'static str,
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        self.name
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> rag_consultant_core::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| if t.contains('x') { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
            .collect())
    }
}

/// Records every prompt and replies with a fixed answer.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }
    async fn generate(&self, prompt: &str) -> rag_consultant_core::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Store it below 4°C.".to_string())
    }
}

fn config_for(root: &Path) -> Config {
    let mut config = Config::default();
    config.documents.root = root.join("docs");
    config.index.path = root.join("data").join("index.sqlite");
    config
}

fn write_corpus(root: &Path) {
    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("a.txt"), "x".repeat(2400)).unwrap();
    fs::write(docs.join("b.md"), "y".repeat(1500)).unwrap();
}

async fn service(config: &Config, generator: Arc<RecordingGenerator>) -> RagService {
    let index = index::load(&config.index.path).await.unwrap();
    RagService::from_parts(
        config,
        Arc::new(LetterEmbedder { name: "letters" }),
        index,
        generator,
    )
    .unwrap()
}

#[tokio::test]
async fn test_build_then_answer_with_sources() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = config_for(tmp.path());

    let report = ingest::build_index(&config, &LetterEmbedder { name: "letters" })
        .await
        .unwrap();
    assert_eq!(report.files, 2);
    assert_eq!(report.chunks, 5);
    assert_eq!(report.embedded, 5);

    let generator = Arc::new(RecordingGenerator::default());
    let service = service(&config, generator.clone()).await;
    let answer = service.answer("what about x?").await.unwrap();

    assert_eq!(answer.retrieved.len(), 3);
    assert_eq!(answer.sources, vec!["a.txt".to_string()]);
    assert_eq!(answer.text, "Store it below 4°C.");

    let rendered = answer.render();
    assert!(rendered.starts_with("Store it below 4°C."));
    assert!(rendered.contains("**Sources consulted:**"));
    assert!(rendered.contains("- `a.txt`"));

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: what about x?"));
    assert_eq!(prompts[0].matches("\n\n---\n\n").count(), 2);
}

#[tokio::test]
async fn test_top_k_override_spans_both_sources() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = config_for(tmp.path());
    ingest::build_index(&config, &LetterEmbedder { name: "letters" })
        .await
        .unwrap();

    let service = service(&config, Arc::new(RecordingGenerator::default())).await;
    let answer = service.answer_top_k("x", 5).await.unwrap();
    assert_eq!(answer.retrieved.len(), 5);
    assert_eq!(answer.sources, vec!["a.txt".to_string(), "b.md".to_string()]);

    // k larger than the index is clamped.
    let answer = service.answer_top_k("x", 50).await.unwrap();
    assert_eq!(answer.retrieved.len(), 5);
}

#[tokio::test]
async fn test_empty_index_still_generates() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("blank.txt"), "   \n\n  ").unwrap();
    let config = config_for(tmp.path());

    let report = ingest::build_index(&config, &LetterEmbedder { name: "letters" })
        .await
        .unwrap();
    assert_eq!(report.chunks, 0);

    let generator = Arc::new(RecordingGenerator::default());
    let service = service(&config, generator.clone()).await;
    let answer = service.answer("anything?").await.unwrap();

    assert!(answer.retrieved.is_empty());
    assert!(answer.sources.is_empty());
    assert!(answer.render().contains("**Sources consulted:**"));
    assert_eq!(generator.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rebuild_replaces_previous_index() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = config_for(tmp.path());
    let embedder = LetterEmbedder { name: "letters" };

    ingest::build_index(&config, &embedder).await.unwrap();
    fs::remove_file(tmp.path().join("docs").join("a.txt")).unwrap();
    ingest::build_index(&config, &embedder).await.unwrap();

    let index = index::load(&config.index.path).await.unwrap();
    assert_eq!(index.entries().len(), 2);
}

#[tokio::test]
async fn test_failed_build_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = config_for(tmp.path());
    let embedder = LetterEmbedder { name: "letters" };
    ingest::build_index(&config, &embedder).await.unwrap();

    // An unreadable file aborts the rebuild before anything is written.
    fs::write(tmp.path().join("docs").join("broken.docx"), b"not a zip archive").unwrap();
    let err = ingest::build_index(&config, &embedder).await.unwrap_err();
    assert!(matches!(err, RagError::Ingestion(_)));

    let index = index::load(&config.index.path).await.unwrap();
    assert_eq!(index.entries().len(), 5);
}

#[tokio::test]
async fn test_model_mismatch_is_rejected_at_startup() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = config_for(tmp.path());
    ingest::build_index(&config, &LetterEmbedder { name: "letters" })
        .await
        .unwrap();

    let index = index::load(&config.index.path).await.unwrap();
    let result = RagService::from_parts(
        &config,
        Arc::new(LetterEmbedder { name: "other-model" }),
        index,
        Arc::new(RecordingGenerator::default()),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_missing_index_is_retrieval_error() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());
    let err = index::load(&config.index.path).await.unwrap_err();
    assert!(matches!(err, RagError::Retrieval(_)));
    assert!(err.to_string().contains("consult build"));
}
