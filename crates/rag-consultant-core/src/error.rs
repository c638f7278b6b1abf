//! Error taxonomy shared by the ingestion and query paths.
//!
//! Each variant corresponds to a failure class with its own handling
//! policy:
//!
//! | Variant | Raised by | Policy |
//! |---------|-----------|--------|
//! | [`Configuration`](RagError::Configuration) | config validation, credential lookup, dimension checks | fatal at startup |
//! | [`Ingestion`](RagError::Ingestion) | document loading, index build | fatal to the build, nothing published |
//! | [`Retrieval`](RagError::Retrieval) | index load, query embedding | fatal for the query |
//! | [`Generation`](RagError::Generation) | language model call | reported to the user, no fallback answer |
//! | [`Embedding`](RagError::Embedding) | embedding provider call | re-classified by the caller |
//!
//! An empty retrieval result is not an error.

use thiserror::Error;

/// Errors raised by the RAG pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or missing configuration (credentials, chunk sizing, dimensions).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The document corpus could not be turned into an index.
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// The vector index could not be read or queried.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// The language model call failed.
    #[error("generation error ({provider}): {message}")]
    Generation {
        /// Generator backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding model call failed.
    #[error("embedding error ({provider}): {message}")]
    Embedding {
        /// Embedding backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Short machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Configuration(_) => "configuration",
            RagError::Ingestion(_) => "ingestion_failed",
            RagError::Retrieval(_) => "retrieval_unavailable",
            RagError::Generation { .. } => "generation_failed",
            RagError::Embedding { .. } => "embedding_failed",
        }
    }

    /// Message shown to an end user in place of an answer.
    pub fn user_message(&self) -> &'static str {
        match self {
            RagError::Retrieval(_) | RagError::Embedding { .. } => {
                "Cannot answer right now: the document index is unavailable."
            }
            RagError::Generation { .. } => {
                "The language model failed to produce an answer. Please try again."
            }
            RagError::Configuration(_) => "The service is misconfigured.",
            RagError::Ingestion(_) => "The document index could not be built.",
        }
    }

    /// Re-classify an embedding failure that happened while serving a query.
    pub(crate) fn into_retrieval(self) -> RagError {
        match self {
            RagError::Embedding { provider, message } => {
                RagError::Retrieval(format!("query embedding failed ({provider}): {message}"))
            }
            other => other,
        }
    }
}

/// A convenience result type for core operations.
pub type Result<T> = std::result::Result<T, RagError>;
