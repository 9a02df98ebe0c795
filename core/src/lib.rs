//! Hybrid lexical + vector retrieval over maritime regulation text.
//!
//! Documents are chunked into sections along their structural markers,
//! indexed for BM25, optionally paired with precomputed embeddings in two
//! independent spaces, and ranked by a fixed-weight blend of both signals.
//! Every result carries a citation and, for federal register sources, a
//! deep link into the registry.

pub mod bm25;
pub mod chunker;
pub mod citation;
pub mod config;
pub mod embedder;
pub mod error;
pub mod hybrid;
pub mod index;
pub mod normalizer;
pub mod persist;
pub mod service;
pub mod source;
pub mod vector_store;

pub use chunker::{chunk, Locator, Section};
pub use citation::Citation;
pub use config::{EmbedderKind, EmbeddingConfig, RetrievalConfig, SourceSpec};
pub use error::{EmbedError, Result, RetrievalError};
pub use index::{InvertedIndex, Posting, SectionKey, TermId};
pub use normalizer::normalize;
pub use service::{IndexStats, LoadReport, RetrievalService, SearchOptions, SearchResult};
pub use source::{SourceInfo, SourceKind};
