//! Embedding providers.
//!
//! Every provider implements [`Embedder`]; callers go through
//! [`embed_checked`] so that count and dimension validation is identical no
//! matter which backend produced the vectors:
//! - `OpenAiEmbedder`: blocking HTTP against an OpenAI-compatible endpoint
//! - `LocalEmbedder`: on-device fastembed model (feature `local-embeddings`)

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Error type for embedding operations.
///
/// Any of these aborts the whole batch; nothing is retried here.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider returned {got} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("Embedding {position} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        got: usize,
    },

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Converts ordered batches of text into fixed-dimension vectors.
pub trait Embedder {
    fn model_name(&self) -> &str;

    fn model_version(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// One provider round-trip for the whole batch.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed a batch and verify the provider honored the contract: one vector per
/// input, in order, each of the configured dimension.
pub fn embed_checked<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(vec![]);
    }

    let vectors = embedder.embed_batch(texts)?;

    if vectors.len() != texts.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: texts.len(),
            got: vectors.len(),
        });
    }

    let expected = embedder.dimensions();
    if let Some((position, bad)) = vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != expected)
    {
        return Err(EmbeddingError::DimensionMismatch {
            position,
            expected,
            got: bad.len(),
        });
    }

    Ok(vectors)
}

/// Compute SHA256 hash of the model name for storage identification.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Build the provider named in the configuration.
pub fn from_config(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
            Ok(Box::new(OpenAiEmbedder::new(&api_key, config)?))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalEmbedder::new(
            &config.model,
            &config.model_version,
            config.cache_dir.clone().into(),
        )?)),
        other => Err(EmbeddingError::InvalidModel(format!(
            "unknown embedding provider '{other}'"
        ))),
    }
}

/// Blocking client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    model_version: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::InitFailed(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|e| EmbeddingError::InitFailed(format!("invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::InitFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            model_version: config.model_version.clone(),
            dimensions: config.dimensions,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        // timeouts surface here as request errors
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            log::warn!("embedding provider error: status={status} model={}", self.model);
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        vectors_from_response(parsed, texts.len())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Restore input order (the API tags each vector with its input index).
fn vectors_from_response(
    mut parsed: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if parsed.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            got: parsed.data.len(),
        });
    }

    parsed.data.sort_by_key(|entry| entry.index);
    for (position, entry) in parsed.data.iter().enumerate() {
        if entry.index != position {
            return Err(EmbeddingError::MalformedResponse(format!(
                "missing embedding for input {position}"
            )));
        }
    }

    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use fastembed::{InitOptions, TextEmbedding};

    use super::{EmbeddingError, Embedder};

    /// Wrapper around fastembed's TextEmbedding model.
    /// Uses a Mutex because fastembed's embed() requires &mut self.
    pub struct LocalEmbedder {
        model: Mutex<TextEmbedding>,
        model_name: String,
        model_version: String,
        dimensions: usize,
    }

    impl LocalEmbedder {
        /// Load (downloading on first use) the named model.
        ///
        /// Models are cached in the `models/` subdirectory of `cache_dir`.
        pub fn new(
            model_name: &str,
            model_version: &str,
            cache_dir: PathBuf,
        ) -> Result<Self, EmbeddingError> {
            let model_enum = Self::parse_model_name(model_name)?;

            let models_dir = cache_dir.join("models");
            std::fs::create_dir_all(&models_dir).map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
            })?;

            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true);

            let mut model = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

            let dimensions = Self::probe_dimensions(&mut model)?;
            log::info!("loaded local embedding model '{model_name}' ({dimensions} dims)");

            Ok(Self {
                model: Mutex::new(model),
                model_name: model_name.to_string(),
                model_version: model_version.to_string(),
                dimensions,
            })
        }

        fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
            match name.to_lowercase().as_str() {
                "all-minilm-l6-v2" | "allminiml6v2" => {
                    Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
                }
                "bge-small-en-v1.5" | "bgesmallenv15" => {
                    Ok(fastembed::EmbeddingModel::BGESmallENV15)
                }
                "bge-base-en-v1.5" | "bgebaseenv15" => {
                    Ok(fastembed::EmbeddingModel::BGEBaseENV15)
                }
                "bge-large-en-v1.5" | "bgelargeenv15" => {
                    Ok(fastembed::EmbeddingModel::BGELargeENV15)
                }
                _ => Err(EmbeddingError::InvalidModel(format!(
                    "Unknown model: {}. Supported local models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5",
                    name
                ))),
            }
        }

        fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
            let test_embeddings = model.embed(vec!["test"], None).map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e))
            })?;

            test_embeddings
                .first()
                .map(|v| v.len())
                .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
        }
    }

    impl Embedder for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn model_version(&self) -> &str {
            &self.model_version
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(vec![]);
            }

            let mut model = self.model.lock().map_err(|e| {
                EmbeddingError::Request(format!("Failed to acquire model lock: {}", e))
            })?;

            model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbeddingError::Request(e.to_string()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_invalid_model_name() {
            let temp_dir = tempfile::TempDir::new().unwrap();
            let result = LocalEmbedder::new("nonexistent-model", "1", temp_dir.path().to_path_buf());
            assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
        }

        #[test]
        #[ignore = "requires model download"]
        fn test_embedding_generation() {
            let temp_dir = tempfile::TempDir::new().unwrap();
            let model =
                LocalEmbedder::new("all-MiniLM-L6-v2", "1", temp_dir.path().to_path_buf()).unwrap();

            let vectors = model
                .embed_batch(&["Hello, world!".to_string(), "Markets".to_string()])
                .unwrap();
            assert_eq!(vectors.len(), 2);
            assert_eq!(vectors[0].len(), model.dimensions());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder {
        dims: usize,
        output: Vec<Vec<f32>>,
    }

    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn model_version(&self) -> &str {
            "1"
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(self.output.clone())
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig::default()
    }

    #[test]
    fn test_embed_checked_passes_valid_batch() {
        let embedder = FixedEmbedder {
            dims: 2,
            output: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        };
        let vectors = embed_checked(&embedder, &texts(2)).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_embed_checked_rejects_count_mismatch() {
        let embedder = FixedEmbedder {
            dims: 2,
            output: vec![vec![1.0, 0.0]],
        };
        let result = embed_checked(&embedder, &texts(2));
        assert!(matches!(
            result,
            Err(EmbeddingError::CountMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_embed_checked_rejects_wrong_dimension() {
        let embedder = FixedEmbedder {
            dims: 2,
            output: vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
        };
        let result = embed_checked(&embedder, &texts(2));
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { position: 1, .. })
        ));
    }

    #[test]
    fn test_embed_checked_empty_input_skips_provider() {
        let embedder = FixedEmbedder {
            dims: 2,
            output: vec![vec![1.0, 0.0]],
        };
        assert!(embed_checked(&embedder, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_response_is_reordered_by_index() {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"object":"list","data":[
                {"object":"embedding","index":1,"embedding":[0.0,1.0]},
                {"object":"embedding","index":0,"embedding":[1.0,0.0]}
            ],"model":"text-embedding-3-small"}"#,
        )
        .unwrap();

        let vectors = vectors_from_response(parsed, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_response_count_mismatch() {
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#).unwrap();
        let result = vectors_from_response(parsed, 3);
        assert!(matches!(result, Err(EmbeddingError::CountMismatch { .. })));
    }

    #[test]
    fn test_response_duplicate_index() {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":0,"embedding":[1.0]},{"index":0,"embedding":[2.0]}]}"#,
        )
        .unwrap();
        let result = vectors_from_response(parsed, 2);
        assert!(matches!(result, Err(EmbeddingError::MalformedResponse(_))));
    }

    #[test]
    fn test_openai_requires_api_key() {
        let result = OpenAiEmbedder::new("  ", &test_config());
        assert!(matches!(result, Err(EmbeddingError::InitFailed(_))));
    }

    #[test]
    fn test_openai_endpoint_from_base() {
        let mut config = test_config();
        config.api_base = "https://api.openai.com/v1/".to_string();
        let embedder = OpenAiEmbedder::new("sk-test", &config).unwrap();
        assert_eq!(embedder.endpoint(), "https://api.openai.com/v1/embeddings");
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_unknown_provider() {
        let mut config = test_config();
        config.provider = "carrier-pigeon".to_string();
        assert!(matches!(
            from_config(&config),
            Err(EmbeddingError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_model_id_hash_consistency() {
        assert_eq!(
            model_id_hash("text-embedding-3-small"),
            model_id_hash("text-embedding-3-small")
        );
        assert_ne!(
            model_id_hash("text-embedding-3-small"),
            model_id_hash("text-embedding-3-large")
        );
    }
}
