//! Embedding procedures and the query embedder.
//!
//! Two independent embedding spaces (A and B) are configured. The same
//! procedures produce the precomputed section vectors offline and the query
//! vectors at request time, so the spaces stay compatible. When a procedure
//! fails at query time the query is embedded with a small hashed
//! bag-of-words model instead, and compared against per-section fallback
//! vectors built the same way.

use crate::config::{EmbedderKind, EmbeddingConfig};
use crate::error::EmbedError;
use crate::normalizer::normalize;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible endpoints accept at most this many inputs per call here.
const REMOTE_BATCH: usize = 64;

pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// `dot(a, b) / (|a| * |b|)`; 0 when either norm is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Hashes each normalized token into one of `dims` buckets.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    name: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self { dims, name: format!("hash-{dims}") }
    }

    /// Infallible form of [`Embedder::embed`].
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in normalize(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dims as u64) as usize;
            v[bucket] += 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str { &self.name }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_text(text))
    }
}

/// Hashes character n-grams of each lowercased word.
#[derive(Debug, Clone)]
pub struct CharGramEmbedder {
    dims: usize,
    n: usize,
    name: String,
}

impl CharGramEmbedder {
    pub fn new(dims: usize, n: usize) -> Self {
        let dims = dims.max(1);
        let n = n.max(1);
        Self { dims, n, name: format!("chargram-{n}-{dims}") }
    }
}

impl Embedder for CharGramEmbedder {
    fn name(&self) -> &str { &self.name }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();
        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let padded: Vec<char> = format!(" {word} ").chars().collect();
            if padded.len() < self.n {
                continue;
            }
            for gram in padded.windows(self.n) {
                let s: String = gram.iter().collect();
                let bucket = (fnv1a(s.as_bytes()) % self.dims as u64) as usize;
                v[bucket] += 1.0;
            }
        }
        l2_normalize(&mut v);
        Ok(v)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    /// Position of the input this vector belongs to.
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/v1/embeddings` client with a bounded request timeout.
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    name: String,
}

impl RemoteEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, EmbedError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            name: format!("remote-{model}"),
        })
    }
}

impl Embedder for RemoteEmbedder {
    fn name(&self) -> &str { &self.name }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::BadResponse("no embedding returned".into()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(REMOTE_BATCH) {
            let mut req = self.client.post(&self.url).json(&EmbedRequest { model: &self.model, input: chunk });
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
            let resp = req.send()?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().unwrap_or_default();
                return Err(EmbedError::BadResponse(format!("{status}: {body}")));
            }
            let mut body: EmbedResponse = resp.json()?;
            if body.data.len() != chunk.len() {
                return Err(EmbedError::BadResponse(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    body.data.len()
                )));
            }
            body.data.sort_by_key(|d| d.index);
            all.extend(body.data.into_iter().map(|d| d.embedding));
        }
        Ok(all)
    }
}

/// Stands in for a procedure that could not be constructed.
struct UnavailableEmbedder {
    reason: String,
}

impl Embedder for UnavailableEmbedder {
    fn name(&self) -> &str { "unavailable" }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Unavailable(self.reason.clone()))
    }
}

pub fn build_embedder(kind: &EmbedderKind, timeout: Duration) -> Result<Box<dyn Embedder>, EmbedError> {
    Ok(match kind {
        EmbedderKind::Hash { dims } => Box::new(HashEmbedder::new(*dims)),
        EmbedderKind::CharGram { dims, n } => Box::new(CharGramEmbedder::new(*dims, *n)),
        EmbedderKind::Remote { base_url, model, api_key_env } => {
            let api_key = api_key_env.as_deref().and_then(|var| std::env::var(var).ok());
            Box::new(RemoteEmbedder::new(base_url, model, api_key, timeout)?)
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryVector {
    pub vector: Vec<f32>,
    /// Produced by the hashed fallback rather than the configured procedure.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryVectors {
    pub a: QueryVector,
    pub b: QueryVector,
}

/// The two configured procedures plus the hashed fallback.
pub struct EmbedderSet {
    space_a: Box<dyn Embedder>,
    space_b: Box<dyn Embedder>,
    fallback: HashEmbedder,
}

impl EmbedderSet {
    pub fn new(space_a: Box<dyn Embedder>, space_b: Box<dyn Embedder>, fallback_buckets: usize) -> Self {
        Self { space_a, space_b, fallback: HashEmbedder::new(fallback_buckets) }
    }

    /// A procedure that cannot be built is replaced by one that always
    /// fails, so queries degrade to the fallback instead of erroring.
    pub fn from_config(cfg: &EmbeddingConfig) -> Self {
        let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
        let build = |kind: &EmbedderKind| -> Box<dyn Embedder> {
            build_embedder(kind, timeout).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "embedding procedure unavailable");
                Box::new(UnavailableEmbedder { reason: e.to_string() }) as Box<dyn Embedder>
            })
        };
        Self::new(build(&cfg.space_a), build(&cfg.space_b), cfg.fallback_buckets)
    }

    pub fn fallback(&self) -> &HashEmbedder { &self.fallback }

    pub fn names(&self) -> (&str, &str) { (self.space_a.name(), self.space_b.name()) }

    /// Embed a query in both spaces concurrently. Never fails; a space that
    /// errors or times out falls back on its own.
    pub fn embed_query(&self, text: &str) -> QueryVectors {
        std::thread::scope(|scope| {
            let b = scope.spawn(|| self.embed_one(self.space_b.as_ref(), text));
            let a = self.embed_one(self.space_a.as_ref(), text);
            let b = b.join().unwrap_or_else(|_| QueryVector { vector: self.fallback.embed_text(text), fallback: true });
            QueryVectors { a, b }
        })
    }

    /// Both spaces from the fallback alone.
    pub fn fallback_query(&self, text: &str) -> QueryVectors {
        let v = self.fallback.embed_text(text);
        QueryVectors {
            a: QueryVector { vector: v.clone(), fallback: true },
            b: QueryVector { vector: v, fallback: true },
        }
    }

    fn embed_one(&self, embedder: &dyn Embedder, text: &str) -> QueryVector {
        match embedder.embed(text) {
            Ok(vector) => QueryVector { vector, fallback: false },
            Err(e) => {
                tracing::warn!(embedder = embedder.name(), error = %e, "query embedding failed; using hashed fallback");
                QueryVector { vector: self.fallback.embed_text(text), fallback: true }
            }
        }
    }

    /// Section vectors for both spaces, used by the offline preprocessing
    /// tool. Errors propagate here; there is no fallback offline.
    pub fn embed_sections(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>), EmbedError> {
        Ok((self.space_a.embed_batch(texts)?, self.space_b.embed_batch(texts)?))
    }
}
