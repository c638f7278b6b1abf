//! Document corpus loading.
//!
//! Walks `[documents].root`, applies include/exclude globs to paths relative
//! to the root, and extracts every matching file into [`Document`]s. PDFs
//! yield one document per page. Files are visited in path order so two runs
//! over the same directory produce the same documents in the same order.
//!
//! Loading is all-or-nothing: a missing root, an empty match set, or a file
//! that cannot be read or parsed fails the whole load with
//! [`RagError::Ingestion`].

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rag_consultant_core::models::Document;
use rag_consultant_core::RagError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::extract::{self, Extracted, Format};

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Documents loaded from one corpus directory.
#[derive(Debug, Default)]
pub struct Corpus {
    /// Files that were read, in load order.
    pub files: Vec<PathBuf>,
    pub documents: Vec<Document>,
}

/// Matching file paths under `config.root`, sorted.
pub fn discover(config: &DocumentsConfig) -> Result<Vec<PathBuf>, RagError> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(RagError::Ingestion(format!(
            "document directory does not exist: {}",
            root.display()
        )));
    }

    let include = build_globset(&config.include_globs)?;
    let excludes: Vec<String> = DEFAULT_EXCLUDES
        .iter()
        .map(|s| s.to_string())
        .chain(config.exclude_globs.iter().cloned())
        .collect();
    let exclude = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry.map_err(|e| {
            RagError::Ingestion(format!("cannot walk {}: {}", root.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude.is_match(relative) || !include.is_match(relative) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();

    if files.is_empty() {
        return Err(RagError::Ingestion(format!(
            "no documents found in {} (include globs: {})",
            root.display(),
            config.include_globs.join(", ")
        )));
    }
    Ok(files)
}

/// Discover and extract the whole corpus.
pub fn load_documents(config: &DocumentsConfig) -> Result<Corpus, RagError> {
    let files = discover(config)?;
    let mut documents = Vec::new();
    for path in &files {
        let loaded = load_file(path)?;
        debug!(path = %path.display(), documents = loaded.len(), "loaded file");
        documents.extend(loaded);
    }
    info!(
        files = files.len(),
        documents = documents.len(),
        root = %config.root.display(),
        "loaded corpus"
    );
    Ok(Corpus { files, documents })
}

/// Extract one file. The source identifier is the path as walked.
pub fn load_file(path: &Path) -> Result<Vec<Document>, RagError> {
    let source = path.display().to_string();
    let format = Format::from_path(path).ok_or_else(|| {
        RagError::Ingestion(format!("unsupported document type: {}", source))
    })?;
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::Ingestion(format!("cannot read {}: {}", source, e)))?;
    let extracted = extract::extract(&bytes, format)
        .map_err(|e| RagError::Ingestion(format!("cannot parse {}: {}", source, e)))?;

    Ok(match extracted {
        Extracted::Pages(pages) => pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document::new(source.clone(), text).with_page(i as u32))
            .collect(),
        Extracted::Whole(text) => vec![Document::new(source, text)],
    })
}

/// Globs match case-insensitively, like [`Format::from_path`], so
/// `GUIA.PDF` is picked up by `**/*.pdf`.
fn build_globset(patterns: &[String]) -> Result<GlobSet, RagError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RagError::Configuration(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Configuration(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn docs_config(root: &Path) -> DocumentsConfig {
        DocumentsConfig {
            root: root.to_path_buf(),
            ..DocumentsConfig::default()
        }
    }

    #[test]
    fn test_missing_root_is_ingestion_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_documents(&docs_config(&tmp.path().join("nope"))).unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }

    #[test]
    fn test_empty_root_is_ingestion_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("image.png"), b"\x89PNG").unwrap();
        let err = load_documents(&docs_config(tmp.path())).unwrap_err();
        assert!(err.to_string().contains("no documents found"));
    }

    #[test]
    fn test_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join("b.md"), "bee").unwrap();
        fs::write(tmp.path().join("sub/a.txt"), "ay").unwrap();
        fs::write(tmp.path().join("a.md"), "ay md").unwrap();
        fs::write(tmp.path().join(".git/x.txt"), "ignored").unwrap();

        let corpus = load_documents(&docs_config(tmp.path())).unwrap();
        let texts: Vec<&str> = corpus.documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["ay md", "bee", "ay"]);
        assert_eq!(corpus.files.len(), 3);
        assert!(corpus.documents[0].source.ends_with("a.md"));
        assert_eq!(corpus.documents[0].page, None);
    }

    #[test]
    fn test_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.md"), "keep").unwrap();
        fs::write(tmp.path().join("draft.md"), "draft").unwrap();
        let config = DocumentsConfig {
            exclude_globs: vec!["draft.*".to_string()],
            ..docs_config(tmp.path())
        };
        let corpus = load_documents(&config).unwrap();
        assert_eq!(corpus.documents.len(), 1);
        assert_eq!(corpus.documents[0].text, "keep");
    }

    #[test]
    fn test_upper_case_extensions_are_discovered() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("GUIA.TXT"), "guia").unwrap();
        fs::write(tmp.path().join("Notes.Md"), "notes").unwrap();
        let files = discover(&docs_config(tmp.path())).unwrap();
        assert_eq!(files.len(), 2);
        let corpus = load_documents(&docs_config(tmp.path())).unwrap();
        assert_eq!(corpus.documents[0].text, "guia");
    }

    #[test]
    fn test_unparsable_file_aborts_load() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.md"), "fine").unwrap();
        fs::write(tmp.path().join("broken.pdf"), "not really a pdf").unwrap();
        let err = load_documents(&docs_config(tmp.path())).unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
        assert!(err.to_string().contains("broken.pdf"));
    }
}
