//! Versioned semantic index over news articles.
//!
//! # Architecture
//!
//! - `preprocess`: Whitespace normalization and length capping of article text
//! - `embeddings`: Embedding providers (OpenAI-compatible HTTP, local fastembed)
//! - `index`: In-memory flat index with inner-product search
//! - `storage`: Binary file I/O for `index.bin`
//! - `metadata`: Per-version summary (`metadata.json`)
//! - `versions`: Version registry (`versions.json`) and retention
//! - `store`: The committed artifacts of one version
//! - `indexer`: Full and incremental builds
//! - `search`: Filtered similarity search

pub mod embeddings;
mod index;
mod indexer;
mod metadata;
mod preprocess;
mod search;
mod storage;
mod store;
mod versions;

pub use embeddings::{Embedder, EmbeddingError};
pub use indexer::{BuildMode, BuildOutcome, BuildReport, Indexer, IndexerError};
pub use search::{ArticleHit, SearchError, SearchFilter, SimilaritySearch};
pub use store::{IndexStore, StoreError};
pub use versions::{Version, VersionManager};
