//! Persisted artifacts of one index version.
//!
//! A version directory holds three files that only make sense together:
//! - `articles.json`: article records, position N pairs with vector N
//! - `index.bin`: the vectors (see `storage`)
//! - `metadata.json`: summary, written last and used as the commit marker
//!
//! Every file is replaced atomically. Because metadata goes last, a crash
//! mid-save leaves either the previous commit or no committed version, and
//! the length check on load rejects any mismatched leftovers.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::articles::Article;
use crate::semantic::embeddings::model_id_hash;
use crate::semantic::index::VectorIndex;
use crate::semantic::metadata::IndexMetadata;
use crate::semantic::storage::{VectorStorage, VectorStorageError};
use crate::semantic::versions::{Version, VersionManager};
use crate::storage::{BackendLocal, StorageManager};

const INDEX_FILE: &str = "index.bin";
const ARTICLES_FILE: &str = "articles.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("index version {0} not found")]
    NotFound(Version),

    #[error("index version {version} is inconsistent: {detail}")]
    Consistency { version: Version, detail: String },

    #[error("vector storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Everything a committed version holds, loaded into memory.
#[derive(Debug)]
pub struct LoadedIndex {
    pub index: VectorIndex,
    pub articles: Vec<Article>,
    pub metadata: IndexMetadata,
}

pub struct IndexStore {
    version: Version,
    files: BackendLocal,
}

impl IndexStore {
    pub fn new(versions: &VersionManager, version: Version) -> Self {
        Self {
            version,
            files: BackendLocal::new(versions.version_dir(version)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.files.base_dir
    }

    fn index_storage(&self) -> VectorStorage {
        VectorStorage::new(self.index_path())
    }

    fn index_path(&self) -> PathBuf {
        self.files.path(INDEX_FILE)
    }

    /// A version exists once its metadata has been committed.
    pub fn exists(&self) -> bool {
        self.files.exists(METADATA_FILE)
    }

    pub fn metadata(&self) -> Result<IndexMetadata, StoreError> {
        let bytes = self.read_artifact(METADATA_FILE)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load vectors, article records and metadata.
    ///
    /// Never creates anything: a missing version is `NotFound`.
    pub fn load(&self) -> Result<LoadedIndex, StoreError> {
        let metadata = self.metadata()?;

        if !self.index_storage().exists() {
            return Err(StoreError::NotFound(self.version));
        }
        let index = self.index_storage().load(
            &model_id_hash(&metadata.model_name),
            metadata.embedding_dimension,
        )?;

        let articles = self.read_articles()?;

        if index.len() != articles.len() {
            return Err(self.inconsistent(format!(
                "{} vectors but {} article records",
                index.len(),
                articles.len()
            )));
        }

        log::debug!(
            "loaded index version {} ({} articles)",
            self.version,
            articles.len()
        );

        Ok(LoadedIndex {
            index,
            articles,
            metadata,
        })
    }

    /// Commit all three artifacts. Lengths are checked before anything is written.
    pub fn save(
        &self,
        index: &VectorIndex,
        articles: &[Article],
        metadata: &IndexMetadata,
    ) -> Result<(), StoreError> {
        if index.len() != articles.len() {
            return Err(self.inconsistent(format!(
                "refusing to save {} vectors with {} article records",
                index.len(),
                articles.len()
            )));
        }
        if metadata.total_articles != articles.len() {
            return Err(self.inconsistent(format!(
                "metadata counts {} articles, list has {}",
                metadata.total_articles,
                articles.len()
            )));
        }
        if metadata.embedding_dimension != index.dimensions() {
            return Err(self.inconsistent(format!(
                "metadata dimension {} differs from index dimension {}",
                metadata.embedding_dimension,
                index.dimensions()
            )));
        }

        self.files
            .write(ARTICLES_FILE, &serde_json::to_vec(articles)?)?;
        self.index_storage()
            .save(index, &model_id_hash(&metadata.model_name))?;
        self.files
            .write(METADATA_FILE, &serde_json::to_vec_pretty(metadata)?)?;

        log::info!(
            "saved index version {} ({} articles) to {}",
            self.version,
            articles.len(),
            self.dir().display()
        );

        Ok(())
    }

    /// Ids already embedded in this version; empty if nothing is committed yet.
    pub fn existing_ids(&self) -> Result<HashSet<i64>, StoreError> {
        if !self.exists() {
            return Ok(HashSet::new());
        }

        Ok(self
            .read_articles()?
            .into_iter()
            .map(|article| article.id)
            .collect())
    }

    fn read_articles(&self) -> Result<Vec<Article>, StoreError> {
        let bytes = self.read_artifact(ARTICLES_FILE)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn read_artifact(&self, ident: &str) -> Result<Vec<u8>, StoreError> {
        self.files.read(ident).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(self.version),
            _ => StoreError::Io(err),
        })
    }

    fn inconsistent(&self, detail: String) -> StoreError {
        StoreError::Consistency {
            version: self.version,
            detail,
        }
    }
}
