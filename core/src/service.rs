//! The retrieval service: owns the current index snapshot and serves
//! queries against it.
//!
//! Readers clone the snapshot `Arc` and never block writers for longer than
//! that clone. Writers are serialized, build a new snapshot off to the side
//! and swap it in.

use crate::bm25;
use crate::chunker::{chunk_source, Section};
use crate::citation::{cite, Citation};
use crate::config::{RetrievalConfig, SourceSpec};
use crate::embedder::EmbedderSet;
use crate::error::{Result, RetrievalError};
use crate::hybrid::{self, confidence};
use crate::index::{InvertedIndex, SectionKey};
use crate::normalizer::normalize;
use crate::persist::{load_embedding_file, read_document};
use crate::source::SourceInfo;
use crate::vector_store::EmbeddingStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub max_results: Option<usize>,
    /// Only return sections from these document ids.
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub section: Section,
    pub bm25_score: f32,
    pub cosine_score: f32,
    pub fused_score: f32,
    pub confidence: u8,
    pub citation: Citation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub documents_loaded: usize,
    pub documents_skipped: usize,
    pub sections: usize,
    pub embedded_sections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub sections: usize,
    pub terms: usize,
    pub embedded_sections: usize,
    pub avg_section_length: f32,
}

#[derive(Default)]
struct IndexSnapshot {
    index: InvertedIndex,
    embeddings: EmbeddingStore,
    documents: Vec<SourceInfo>,
}

impl IndexSnapshot {
    fn source(&self, document_id: &str) -> Option<&SourceInfo> {
        self.documents.iter().find(|d| d.id == document_id)
    }
}

/// A chunked document and its embedding records, read but not yet indexed.
struct LoadedDocument {
    info: SourceInfo,
    sections: Vec<Section>,
    embeddings: Vec<crate::persist::EmbeddingFileRecord>,
}

pub struct RetrievalService {
    config: RetrievalConfig,
    embedders: EmbedderSet,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl RetrievalService {
    pub fn new(config: RetrievalConfig) -> Self {
        let embedders = EmbedderSet::from_config(&config.embedding);
        Self::with_embedders(config, embedders)
    }

    pub fn with_embedders(config: RetrievalConfig, embedders: EmbedderSet) -> Self {
        Self {
            config,
            embedders,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            writer: Mutex::new(()),
        }
    }

    /// Load, chunk and index every source, replacing whatever was indexed
    /// before. Unreadable documents are logged and skipped.
    pub fn initialize(&self, sources: &[SourceSpec]) -> LoadReport {
        let _guard = self.writer.lock();
        let started = Instant::now();
        let mut snapshot = IndexSnapshot::default();
        let mut report = LoadReport::default();

        for spec in sources {
            let document_id = spec.document_id();
            if snapshot.source(&document_id).is_some() {
                tracing::warn!(document_id = %document_id, "duplicate document id; skipping");
                report.documents_skipped += 1;
                continue;
            }
            match load_document(spec) {
                Ok(doc) => {
                    self.ingest(&mut snapshot, doc);
                    report.documents_loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %spec.path.display(), error = %e, "skipping unreadable document");
                    report.documents_skipped += 1;
                }
            }
        }

        report.sections = snapshot.index.num_sections();
        report.embedded_sections = snapshot.embeddings.len();
        *self.snapshot.write() = Arc::new(snapshot);
        tracing::info!(
            documents = report.documents_loaded,
            skipped = report.documents_skipped,
            sections = report.sections,
            embedded = report.embedded_sections,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index initialized"
        );
        report
    }

    /// Chunk and index one more document into the existing postings.
    /// Returns the number of sections indexed.
    pub fn add_document<P: AsRef<Path>>(&self, path: P, document_id: &str) -> Result<usize> {
        self.add_source(&SourceSpec::new(path, document_id))
    }

    pub fn add_source(&self, spec: &SourceSpec) -> Result<usize> {
        let _guard = self.writer.lock();
        let current = self.snapshot.read().clone();
        let document_id = spec.document_id();
        if current.source(&document_id).is_some() {
            return Err(RetrievalError::DuplicateDocument(document_id));
        }
        let doc = load_document(spec)?;

        let mut next = IndexSnapshot {
            index: current.index.clone(),
            embeddings: current.embeddings.clone(),
            documents: current.documents.clone(),
        };
        let before = next.index.num_sections();
        self.ingest(&mut next, doc);
        let added = next.index.num_sections() - before;
        *self.snapshot.write() = Arc::new(next);
        tracing::info!(document_id = %document_id, sections = added, "document added");
        Ok(added)
    }

    /// Drop a document and rebuild the inverted index from what remains.
    pub fn remove_document(&self, document_id: &str) -> Result<()> {
        let _guard = self.writer.lock();
        let current = self.snapshot.read().clone();
        if current.source(document_id).is_none() {
            return Err(RetrievalError::DocumentNotFound(document_id.to_string()));
        }
        let retained = current.index.sections().iter().filter(|s| s.document_id != document_id).cloned();
        let mut embeddings = current.embeddings.clone();
        embeddings.remove_document(document_id);
        let next = IndexSnapshot {
            index: InvertedIndex::from_sections(retained),
            embeddings,
            documents: current.documents.iter().filter(|d| d.id != document_id).cloned().collect(),
        };
        *self.snapshot.write() = Arc::new(next);
        tracing::info!(document_id, "document removed; index rebuilt");
        Ok(())
    }

    fn ingest(&self, snapshot: &mut IndexSnapshot, doc: LoadedDocument) {
        let mut indexed: Vec<Section> = Vec::with_capacity(doc.sections.len());
        for section in doc.sections {
            if let Some(key) = snapshot.index.insert(section) {
                if let Some(s) = snapshot.index.section(key) {
                    indexed.push(s.clone());
                }
            }
        }
        if !doc.embeddings.is_empty() {
            let attached = snapshot.embeddings.load_records(&indexed, doc.embeddings, self.embedders.fallback());
            tracing::debug!(document_id = %doc.info.id, attached, "embedding records attached");
        }
        snapshot.documents.push(doc.info);
    }

    /// Rank sections for a query. An empty result is a valid outcome.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        let started = Instant::now();
        let snapshot = self.snapshot.read().clone();
        if query.trim().is_empty() || snapshot.index.num_sections() == 0 {
            return Vec::new();
        }
        let top_k = options.max_results.unwrap_or(self.config.top_k).max(1);
        let allowed: Option<HashSet<String>> = options.sources.as_ref().map(|s| s.iter().cloned().collect());
        let terms = normalize(query);

        // BM25 runs while the query is embedded; a slow embedder only
        // delays the cosine side, bounded by its own timeout.
        let (bm25_scores, query_vectors) = std::thread::scope(|scope| {
            let embedding = (!snapshot.embeddings.is_empty())
                .then(|| scope.spawn(|| self.embedders.embed_query(query)));
            let bm25_scores = bm25::score(&snapshot.index, &terms, allowed.as_ref());
            let query_vectors = embedding.map(|h| h.join().unwrap_or_else(|_| self.embedders.fallback_query(query)));
            (bm25_scores, query_vectors)
        });

        let mut cosine_scores: HashMap<SectionKey, f32> = HashMap::new();
        if let Some(q) = &query_vectors {
            for (key, section) in snapshot.index.sections().iter().enumerate() {
                if allowed.as_ref().is_some_and(|a| !a.contains(&section.document_id)) {
                    continue;
                }
                let c = snapshot.embeddings.blended_cosine(&section.id, q);
                if c != 0.0 {
                    cosine_scores.insert(key as SectionKey, c);
                }
            }
        }

        let ranked = hybrid::fuse(&bm25_scores, &cosine_scores, &self.config.fusion, top_k);
        let results: Vec<SearchResult> = ranked
            .into_iter()
            .filter_map(|r| {
                let section = snapshot.index.section(r.key)?;
                let source = snapshot
                    .source(&section.document_id)
                    .cloned()
                    .unwrap_or_else(|| SourceInfo::resolve(&section.document_id, None));
                Some(SearchResult {
                    citation: cite(&source, section, &self.config.citation_host),
                    section: section.clone(),
                    bm25_score: r.bm25,
                    cosine_score: r.cosine,
                    fused_score: r.fused,
                    confidence: confidence(r.fused),
                })
            })
            .collect();

        tracing::debug!(
            query,
            terms = terms.len(),
            lexical_hits = bm25_scores.len(),
            semantic_hits = cosine_scores.len(),
            returned = results.len(),
            took_us = started.elapsed().as_micros() as u64,
            "search"
        );
        results
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot.read().clone();
        IndexStats {
            documents: snapshot.documents.len(),
            sections: snapshot.index.num_sections(),
            terms: snapshot.index.num_terms(),
            embedded_sections: snapshot.embeddings.len(),
            avg_section_length: snapshot.index.avg_section_length(),
        }
    }

    pub fn documents(&self) -> Vec<SourceInfo> {
        self.snapshot.read().documents.clone()
    }
}

fn load_document(spec: &SourceSpec) -> Result<LoadedDocument> {
    let text = read_document(&spec.path)?;
    let info = SourceInfo::resolve(&spec.document_id(), spec.display_name.as_deref());
    let sections = chunk_source(&text, &info);
    let embeddings = match spec.embeddings_path() {
        Some(path) => load_embedding_file(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable embeddings; document ranks on BM25 only");
            Vec::new()
        }),
        None => Vec::new(),
    };
    Ok(LoadedDocument { info, sections, embeddings })
}
