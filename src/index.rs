//! On-disk vector index.
//!
//! An index is one SQLite file with two tables:
//!
//! ```text
//! index_meta(format_version, model, dims, metric, chunk_size, chunk_overlap, built_at, chunk_count)
//! chunks(position, id, source, page, chunk_index, start_offset, text, hash, embedding)
//! ```
//!
//! `embedding` is a little-endian `f32` BLOB. `position` is the indexing
//! order, which the in-memory index uses to break similarity ties.
//!
//! [`persist`] always writes a complete new file next to the destination and
//! renames it into place after the transaction commits, so readers see
//! either the previous index or the new one, never a partial build.

use chrono::{DateTime, Utc};
use rag_consultant_core::chunk::ChunkParams;
use rag_consultant_core::embedding::{blob_to_vec, vec_to_blob};
use rag_consultant_core::models::{Chunk, ChunkMetadata, IndexedChunk};
use rag_consultant_core::store::{InMemoryIndex, IndexMeta, Metric};
use rag_consultant_core::RagError;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::db;

const FORMAT_VERSION: i64 = 1;

/// Header and per-source counts of a persisted index.
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub path: PathBuf,
    pub meta: IndexMeta,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: Option<DateTime<Utc>>,
    pub chunk_count: usize,
    pub file_size: u64,
    /// `(source, chunks)` sorted by source.
    pub sources: Vec<(String, usize)>,
}

fn ingestion(context: &str, e: impl std::fmt::Display) -> RagError {
    RagError::Ingestion(format!("{}: {}", context, e))
}

fn retrieval(path: &Path, e: impl std::fmt::Display) -> RagError {
    RagError::Retrieval(format!("index {} is unreadable: {}", path.display(), e))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
}

/// Write a complete index to `path`, replacing whatever was there.
pub async fn persist(
    path: &Path,
    meta: &IndexMeta,
    params: ChunkParams,
    entries: &[IndexedChunk],
) -> Result<(), RagError> {
    let tmp = temp_path(path);
    let result = write_file(&tmp, meta, params, entries).await;
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        ingestion(&format!("cannot publish index at {}", path.display()), e)
    })?;

    info!(
        path = %path.display(),
        chunks = entries.len(),
        model = %meta.model,
        dims = meta.dims,
        "index written"
    );
    Ok(())
}

async fn write_file(
    tmp: &Path,
    meta: &IndexMeta,
    params: ChunkParams,
    entries: &[IndexedChunk],
) -> Result<(), RagError> {
    let pool = db::create(tmp)
        .await
        .map_err(|e| ingestion("cannot create index file", e))?;
    let result = write_tables(&pool, meta, params, entries).await;
    pool.close().await;
    result.map_err(|e| ingestion("cannot write index", e))
}

async fn write_tables(
    pool: &SqlitePool,
    meta: &IndexMeta,
    params: ChunkParams,
    entries: &[IndexedChunk],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE index_meta (
            format_version INTEGER NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            metric TEXT NOT NULL,
            chunk_size INTEGER NOT NULL,
            chunk_overlap INTEGER NOT NULL,
            built_at TEXT NOT NULL,
            chunk_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunks (
            position INTEGER PRIMARY KEY,
            id TEXT NOT NULL,
            source TEXT,
            page INTEGER,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO index_meta (format_version, model, dims, metric, chunk_size, chunk_overlap, built_at, chunk_count)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(FORMAT_VERSION)
    .bind(&meta.model)
    .bind(meta.dims as i64)
    .bind(meta.metric.as_str())
    .bind(params.chunk_size() as i64)
    .bind(params.chunk_overlap() as i64)
    .bind(Utc::now().to_rfc3339())
    .bind(entries.len() as i64)
    .execute(&mut *tx)
    .await?;

    for (position, entry) in entries.iter().enumerate() {
        let chunk = &entry.chunk;
        sqlx::query(
            "INSERT INTO chunks (position, id, source, page, chunk_index, start_offset, text, hash, embedding)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(position as i64)
        .bind(&chunk.id)
        .bind(&chunk.metadata.source)
        .bind(chunk.metadata.page.map(i64::from))
        .bind(chunk.metadata.chunk_index as i64)
        .bind(chunk.metadata.start_offset as i64)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(vec_to_blob(&entry.embedding))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

struct Header {
    meta: IndexMeta,
    chunk_size: usize,
    chunk_overlap: usize,
    built_at: Option<DateTime<Utc>>,
    chunk_count: usize,
}

async fn read_header(pool: &SqlitePool, path: &Path) -> Result<Header, RagError> {
    let row = sqlx::query(
        "SELECT format_version, model, dims, metric, chunk_size, chunk_overlap, built_at, chunk_count FROM index_meta",
    )
    .fetch_optional(pool)
    .await
    .map_err(|e| retrieval(path, e))?
    .ok_or_else(|| retrieval(path, "index_meta is empty"))?;

    let get_i64 = |col: &str| row.try_get::<i64, _>(col).map_err(|e| retrieval(path, e));
    let get_str = |col: &str| row.try_get::<String, _>(col).map_err(|e| retrieval(path, e));

    let version = get_i64("format_version")?;
    if version != FORMAT_VERSION {
        return Err(retrieval(
            path,
            format!("format version {} is not supported; rebuild the index", version),
        ));
    }

    let metric: Metric = get_str("metric")?
        .parse()
        .map_err(|e: RagError| retrieval(path, e))?;
    let dims = get_i64("dims")?;
    if dims <= 0 {
        return Err(retrieval(path, format!("invalid dimensionality {}", dims)));
    }

    Ok(Header {
        meta: IndexMeta {
            model: get_str("model")?,
            dims: dims as usize,
            metric,
        },
        chunk_size: get_i64("chunk_size")? as usize,
        chunk_overlap: get_i64("chunk_overlap")? as usize,
        built_at: DateTime::parse_from_rfc3339(&get_str("built_at")?)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        chunk_count: get_i64("chunk_count")? as usize,
    })
}

async fn open(path: &Path) -> Result<SqlitePool, RagError> {
    if !path.is_file() {
        return Err(RagError::Retrieval(format!(
            "no index at {}; run `consult build` first",
            path.display()
        )));
    }
    db::open_read_only(path).await.map_err(|e| retrieval(path, e))
}

/// Load the index at `path` into memory.
///
/// # Errors
///
/// [`RagError::Retrieval`] if the file is missing, unreadable, or its rows
/// disagree with its header.
pub async fn load(path: &Path) -> Result<InMemoryIndex, RagError> {
    let pool = open(path).await?;
    let result = load_entries(&pool, path).await;
    pool.close().await;
    result
}

async fn load_entries(pool: &SqlitePool, path: &Path) -> Result<InMemoryIndex, RagError> {
    let header = read_header(pool, path).await?;
    let rows = sqlx::query(
        "SELECT id, source, page, chunk_index, start_offset, text, hash, embedding FROM chunks ORDER BY position",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| retrieval(path, e))?;

    if rows.len() != header.chunk_count {
        return Err(retrieval(
            path,
            format!(
                "header declares {} chunks but {} are stored",
                header.chunk_count,
                rows.len()
            ),
        ));
    }

    let expected_bytes = header.meta.dims * 4;
    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let blob: Vec<u8> = row.try_get("embedding").map_err(|e| retrieval(path, e))?;
        if blob.len() != expected_bytes {
            return Err(retrieval(
                path,
                format!(
                    "embedding BLOB has {} bytes, expected {}",
                    blob.len(),
                    expected_bytes
                ),
            ));
        }
        entries.push(row_to_entry(row, blob_to_vec(&blob)).map_err(|e| retrieval(path, e))?);
    }

    debug!(path = %path.display(), chunks = entries.len(), "index loaded");
    InMemoryIndex::new(header.meta, entries)
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow, embedding: Vec<f32>) -> Result<IndexedChunk, sqlx::Error> {
    let page: Option<i64> = row.try_get("page")?;
    let chunk_index: i64 = row.try_get("chunk_index")?;
    let start_offset: i64 = row.try_get("start_offset")?;
    Ok(IndexedChunk {
        chunk: Chunk {
            id: row.try_get("id")?,
            text: row.try_get("text")?,
            hash: row.try_get("hash")?,
            metadata: ChunkMetadata {
                source: row.try_get("source")?,
                page: page.map(|p| p as u32),
                chunk_index: chunk_index as usize,
                start_offset: start_offset as usize,
            },
        },
        embedding,
    })
}

/// Read the header and per-source counts without loading vectors.
pub async fn summary(path: &Path) -> Result<IndexSummary, RagError> {
    let pool = open(path).await?;
    let result = read_summary(&pool, path).await;
    pool.close().await;
    result
}

async fn read_summary(pool: &SqlitePool, path: &Path) -> Result<IndexSummary, RagError> {
    let header = read_header(pool, path).await?;
    let rows = sqlx::query(
        "SELECT COALESCE(source, '') AS source, COUNT(*) AS n FROM chunks GROUP BY source ORDER BY source",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| retrieval(path, e))?;

    let mut sources = Vec::with_capacity(rows.len());
    for row in &rows {
        let source: String = row.try_get("source").map_err(|e| retrieval(path, e))?;
        let n: i64 = row.try_get("n").map_err(|e| retrieval(path, e))?;
        sources.push((source, n as usize));
    }

    Ok(IndexSummary {
        path: path.to_path_buf(),
        meta: header.meta,
        chunk_size: header.chunk_size,
        chunk_overlap: header.chunk_overlap,
        built_at: header.built_at,
        chunk_count: header.chunk_count,
        file_size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_consultant_core::store::VectorIndex;
    use tempfile::TempDir;

    fn meta() -> IndexMeta {
        IndexMeta {
            model: "test-model".into(),
            dims: 3,
            metric: Metric::Cosine,
        }
    }

    fn entry(source: &str, i: usize, v: [f32; 3]) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                id: format!("{}-{}", source, i),
                text: format!("text {} of {}", i, source),
                hash: format!("h{}", i),
                metadata: ChunkMetadata {
                    source: Some(source.to_string()),
                    page: if i % 2 == 0 { Some(i as u32) } else { None },
                    chunk_index: i,
                    start_offset: i * 800,
                },
            },
            embedding: v.to_vec(),
        }
    }

    fn params() -> ChunkParams {
        ChunkParams::new(1000, 200).unwrap()
    }

    #[tokio::test]
    async fn test_persist_then_load_preserves_order_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/index.sqlite");
        let entries = vec![
            entry("b.pdf", 0, [1.0, 0.0, 0.0]),
            entry("a.pdf", 1, [0.0, 1.0, 0.0]),
            entry("a.pdf", 2, [0.0, 0.0, 1.0]),
        ];
        persist(&path, &meta(), params(), &entries).await.unwrap();

        let index = load(&path).await.unwrap();
        assert_eq!(index.meta(), &meta());
        assert_eq!(index.entries(), entries.as_slice());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        persist(&path, &meta(), params(), &[entry("old.pdf", 0, [1.0, 0.0, 0.0])])
            .await
            .unwrap();
        persist(
            &path,
            &meta(),
            params(),
            &[entry("new.pdf", 0, [1.0, 0.0, 0.0]), entry("new.pdf", 1, [0.0, 1.0, 0.0])],
        )
        .await
        .unwrap();

        let s = summary(&path).await.unwrap();
        assert_eq!(s.chunk_count, 2);
        assert_eq!(s.sources, vec![("new.pdf".to_string(), 2)]);
        assert_eq!(s.chunk_size, 1000);
        assert!(s.built_at.is_some());

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        persist(&path, &meta(), params(), &[]).await.unwrap();
        assert!(load(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_index_is_retrieval_error() {
        let tmp = TempDir::new().unwrap();
        let err = load(&tmp.path().join("absent.sqlite")).await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
        assert!(err.to_string().contains("consult build"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_retrieval_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        std::fs::write(&path, b"this is not a sqlite database at all, not even close").unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
    }
}
