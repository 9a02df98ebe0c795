use crate::citation::DEFAULT_REGISTRY_HOST;
use crate::error::{Result, RetrievalError};
use crate::persist::{read_document, sibling_embeddings_path};
pub use crate::hybrid::FusionWeights;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One embedding procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Hashed bag of normalized tokens.
    Hash { dims: usize },
    /// Hashed character n-grams.
    CharGram { dims: usize, n: usize },
    /// OpenAI-compatible embeddings endpoint.
    Remote {
        base_url: String,
        model: String,
        /// Name of the environment variable holding the API key.
        #[serde(default)]
        api_key_env: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub space_a: EmbedderKind,
    pub space_b: EmbedderKind,
    /// Buckets of the hashed fallback used when a procedure fails.
    pub fallback_buckets: usize,
    /// Upper bound on a remote embedding call.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            space_a: EmbedderKind::Hash { dims: 256 },
            space_b: EmbedderKind::CharGram { dims: 384, n: 3 },
            fallback_buckets: 64,
            timeout_secs: 5,
        }
    }
}

/// A document to load: its path, id and optional precomputed embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: PathBuf,
    /// Defaults to the file stem.
    #[serde(default)]
    pub document_id: Option<String>,
    /// Defaults to `<stem>.embeddings.json` beside the document, if present.
    #[serde(default)]
    pub embeddings: Option<PathBuf>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SourceSpec {
    pub fn new<P: AsRef<Path>>(path: P, document_id: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            document_id: Some(document_id.to_string()),
            embeddings: None,
            display_name: None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), document_id: None, embeddings: None, display_name: None }
    }

    pub fn document_id(&self) -> String {
        self.document_id.clone().unwrap_or_else(|| {
            self.path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        })
    }

    pub fn embeddings_path(&self) -> Option<PathBuf> {
        match &self.embeddings {
            Some(p) => Some(p.clone()),
            None => sibling_embeddings_path(&self.path).filter(|p| p.is_file()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results returned when the caller gives no limit.
    pub top_k: usize,
    pub fusion: FusionWeights,
    pub citation_host: String,
    pub embedding: EmbeddingConfig,
    pub sources: Vec<SourceSpec>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            fusion: FusionWeights::default(),
            citation_host: DEFAULT_REGISTRY_HOST.to_string(),
            embedding: EmbeddingConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl RetrievalConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let buf = read_document(path)?;
        let cfg: Self = serde_json::from_str(&buf)
            .map_err(|source| RetrievalError::Json { path: path.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override fields from `ARROWREG_*` environment variables. Unparseable
    /// values are ignored.
    pub fn apply_env(mut self) -> Self {
        if let Ok(val) = std::env::var("ARROWREG_TOP_K") {
            if let Ok(v) = val.parse() {
                self.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("ARROWREG_COSINE_WEIGHT") {
            if let Ok(v) = val.parse() {
                self.fusion.cosine = v;
            }
        }
        if let Ok(val) = std::env::var("ARROWREG_BM25_WEIGHT") {
            if let Ok(v) = val.parse() {
                self.fusion.bm25 = v;
            }
        }
        if let Ok(host) = std::env::var("ARROWREG_CITATION_HOST") {
            self.citation_host = host;
        }
        if let Ok(val) = std::env::var("ARROWREG_EMBED_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                self.embedding.timeout_secs = v;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RetrievalError::Config("top_k must be at least 1".into()));
        }
        let FusionWeights { cosine, bm25 } = self.fusion;
        if !(cosine.is_finite() && bm25.is_finite()) || cosine < 0.0 || bm25 < 0.0 {
            return Err(RetrievalError::Config("fusion weights must be finite and non-negative".into()));
        }
        if self.citation_host.is_empty() {
            return Err(RetrievalError::Config("citation_host is empty".into()));
        }
        for kind in [&self.embedding.space_a, &self.embedding.space_b] {
            match kind {
                EmbedderKind::Hash { dims } | EmbedderKind::CharGram { dims, .. } if *dims == 0 => {
                    return Err(RetrievalError::Config("embedding dims must be positive".into()));
                }
                _ => {}
            }
        }
        if self.embedding.fallback_buckets == 0 {
            return Err(RetrievalError::Config("fallback_buckets must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: RetrievalConfig = serde_json::from_str(
            r#"{"top_k": 5, "embedding": {"space_b": {"kind": "remote", "base_url": "http://localhost:11434", "model": "nomic-embed-text"}}}"#,
        )
        .expect("parses");
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.fusion, FusionWeights { cosine: 0.5, bm25: 0.5 });
        assert_eq!(cfg.embedding.space_a, EmbedderKind::Hash { dims: 256 });
        assert!(matches!(cfg.embedding.space_b, EmbedderKind::Remote { api_key_env: None, .. }));
        assert_eq!(cfg.citation_host, "www.ecfr.gov");
    }

    #[test]
    fn rejects_bad_weights() {
        let mut cfg = RetrievalConfig::default();
        cfg.fusion.bm25 = -1.0;
        assert!(matches!(cfg.validate(), Err(RetrievalError::Config(_))));
    }

    #[test]
    fn document_id_defaults_to_stem() {
        let spec = SourceSpec::from_path("/corpus/cfr46.md");
        assert_eq!(spec.document_id(), "cfr46");
        assert_eq!(SourceSpec::new("/corpus/x.txt", "abs_part7").document_id(), "abs_part7");
    }
}
