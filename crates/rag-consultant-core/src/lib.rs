//! # RAG Consultant Core
//!
//! I/O-free logic of the consultant: data models, the overlapping chunker,
//! the embedder and generator traits, the vector index abstraction,
//! retrieval, prompt assembly, citations, and the query pipeline.
//!
//! This crate contains no filesystem, database, or HTTP code. Concrete
//! providers and persistence live in the `rag-consultant` app crate.

pub mod chunk;
pub mod citation;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod store;

pub use error::{RagError, Result};
