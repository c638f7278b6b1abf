//! # RAG Consultant
//!
//! A retrieval-augmented question answering service over a local document
//! corpus. Documents (PDF, Office, text) are chunked and embedded into a
//! persistent vector index offline; at query time the most similar chunks
//! are retrieved, placed into a grounded prompt, and the language model's
//! answer is returned together with the sources it was based on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Documents  │──▶│ Chunk+Embed  │──▶│  SQLite  │
//! │ PDF/Office  │   │  (build)     │   │  index   │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │ load once
//!                                           ▼
//!                   ┌──────────────────────────────┐
//!                   │ retrieve → prompt → generate │
//!                   │          → cite              │
//!                   └──────┬──────────────┬────────┘
//!                          ▼              ▼
//!                     ┌─────────┐    ┌──────────┐
//!                     │   CLI   │    │   HTTP   │
//!                     └─────────┘    └──────────┘
//! ```
//!
//! The pipeline itself (chunking, retrieval, prompt assembly, citations)
//! lives in the `rag-consultant-core` crate; this crate adds document
//! loading, the persisted index, provider backends and the front ends.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`extract`] | Text extraction from PDF and Office files |
//! | [`loader`] | Corpus discovery and loading |
//! | [`ingest`] | Offline index build |
//! | [`index`] | Persisted vector index |
//! | [`embedding`] | Embedding backends |
//! | [`generator`] | Language model backends |
//! | [`service`] | Process-wide query service |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generator;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod server;
pub mod service;
pub mod session;
pub mod stats;
