use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::storage::{self, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_MAX_CHARS: usize = 8000;
const DEFAULT_KEEP_LATEST: usize = 5;

#[cfg(feature = "local-embeddings")]
const KNOWN_PROVIDERS: &[&str] = &["openai", "local"];
#[cfg(not(feature = "local-embeddings"))]
const KNOWN_PROVIDERS: &[&str] = &["openai"];

/// Embedding provider settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "openai" or "local"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name, recorded in every version built with it
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Expected vector length; responses of any other length are rejected
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Texts per provider request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Local model cache, relative to the base path unless absolute
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            model_version: default_model_version(),
            dimensions: DEFAULT_DIMENSIONS,
            api_base: default_api_base(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_model_version() -> String {
    "1".to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_cache_dir() -> String {
    ".".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Characters kept per article body
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Versions kept by `prune` when no explicit count is given
    #[serde(default = "default_keep_latest")]
    pub keep_latest: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_latest: DEFAULT_KEEP_LATEST,
        }
    }
}

fn default_keep_latest() -> usize {
    DEFAULT_KEEP_LATEST
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of versions.json and the v<version>/ directories
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// CSV export of the articles table
    #[serde(default = "default_articles_csv")]
    pub articles_csv: String,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            articles_csv: default_articles_csv(),
            embedding: EmbeddingConfig::default(),
            preprocess: PreprocessConfig::default(),
            retention: RetentionConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_storage_dir() -> String {
    "indexes".to_string()
}

fn default_articles_csv() -> String {
    "articles.csv".to_string()
}

/// `NEWSINDEX_BASE_PATH`, or `~/.local/share/newsindex`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("NEWSINDEX_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/newsindex"))
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let emb = &self.embedding;

        if !KNOWN_PROVIDERS.contains(&emb.provider.as_str()) {
            if emb.provider == "local" {
                bail!("embedding.provider 'local' requires the local-embeddings feature");
            }
            bail!(
                "embedding.provider must be one of {:?}, got '{}'",
                KNOWN_PROVIDERS,
                emb.provider
            );
        }
        if emb.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        if emb.dimensions == 0 {
            bail!("embedding.dimensions must be greater than 0");
        }
        if emb.batch_size == 0 {
            bail!("embedding.batch_size must be greater than 0");
        }
        if emb.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be greater than 0");
        }
        url::Url::parse(&emb.api_base)
            .with_context(|| format!("embedding.api_base is not a valid url: '{}'", emb.api_base))?;

        if self.preprocess.max_chars == 0 {
            bail!("preprocess.max_chars must be greater than 0");
        }
        if self.retention.keep_latest == 0 {
            bail!("retention.keep_latest must be greater than 0");
        }

        Ok(())
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(base_path()?)
    }

    /// Read `config.yaml` under `base_path`, writing the defaults first if it
    /// does not exist.
    pub fn load_with(base_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base_path = base_path.into();
        let store = storage::BackendLocal::new(&base_path);

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store
                .write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())
                .with_context(|| format!("failed to write default config to {}", base_path.display()))?;
            log::info!("wrote default config to {}", store.path(CONFIG_FILE).display());
        }

        let raw = store.read(CONFIG_FILE).context("failed to read config")?;
        let config_str = String::from_utf8(raw).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path;
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path);

        let config_str = serde_yml::to_string(&self)?;
        store
            .write(CONFIG_FILE, config_str.as_bytes())
            .context("failed to save config")?;
        Ok(())
    }

    /// Resolve a configured path against the base path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn storage_path(&self) -> PathBuf {
        self.resolve(&self.storage_dir)
    }

    pub fn articles_path(&self) -> PathBuf {
        self.resolve(&self.articles_csv)
    }

    /// Embedding settings with `cache_dir` resolved to an absolute location.
    pub fn embedding_resolved(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            cache_dir: self.resolve(&self.embedding.cache_dir).display().to_string(),
            ..self.embedding.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();

        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.batch_size, 50);
        assert_eq!(config.preprocess.max_chars, 8000);
    }

    #[test]
    fn test_load_writes_default_config() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_with(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.storage_path(), dir.path().join("indexes"));
        assert_eq!(config.articles_path(), dir.path().join("articles.csv"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "storage_dir: /srv/news/indexes\nembedding:\n  batch_size: 8\n",
        )
        .unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        assert_eq!(config.storage_path(), PathBuf::from("/srv/news/indexes"));
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.retention.keep_latest, 5);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.embedding.api_base = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.embedding.provider = "carrier-pigeon".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retention.keep_latest = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_provider_follows_feature() {
        let mut config = Config::default();
        config.embedding.provider = "local".to_string();

        let result = config.validate();
        if cfg!(feature = "local-embeddings") {
            result.unwrap();
        } else {
            let err = result.unwrap_err().to_string();
            assert!(err.contains("local-embeddings"), "{err}");
        }
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "embedding: [1, 2").unwrap();
        assert!(Config::load_with(dir.path()).is_err());
    }
}
