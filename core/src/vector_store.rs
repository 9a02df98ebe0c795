use crate::chunker::Section;
use crate::embedder::{cosine_similarity, HashEmbedder, QueryVectors};
use crate::persist::EmbeddingFileRecord;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub document_id: String,
    pub vector_a: Vec<f32>,
    pub vector_b: Vec<f32>,
    /// Hashed bag-of-words vector of the section, compared against query
    /// vectors that had to fall back.
    pub fallback: Vec<f32>,
}

/// Section id → precomputed vectors. Sections without a record score a
/// cosine of 0, so a corpus without embeddings ranks on BM25 alone.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    records: HashMap<String, Arc<EmbeddingRecord>>,
}

impl EmbeddingStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, section: &Section, vector_a: Vec<f32>, vector_b: Vec<f32>, fallback: &HashEmbedder) {
        let record = EmbeddingRecord {
            document_id: section.document_id.clone(),
            vector_a,
            vector_b,
            fallback: fallback.embed_text(&format!("{} {}", section.heading, section.text)),
        };
        self.records.insert(section.id.clone(), Arc::new(record));
    }

    /// Attach file records to the sections they name. A record is attached
    /// only when its id and stored text both match the section; returns how
    /// many were attached.
    pub fn load_records(&mut self, sections: &[Section], records: Vec<EmbeddingFileRecord>, fallback: &HashEmbedder) -> usize {
        let by_id: HashMap<&str, &Section> = sections.iter().map(|s| (s.id.as_str(), s)).collect();
        let document_id = sections.first().map_or("", |s| s.document_id.as_str());
        let total = records.len();
        let mut attached = 0;
        let mut unknown = 0;
        let mut stale = 0;
        for r in records {
            match by_id.get(r.id.as_str()) {
                Some(section) if section.text == r.text => {
                    self.insert(section, r.vector_a, r.vector_b, fallback);
                    attached += 1;
                }
                Some(_) => stale += 1,
                None => unknown += 1,
            }
        }
        if stale > 0 {
            tracing::warn!(document_id, stale, "embedding records do not match the current section text; rebuild them with the indexer");
        }
        if attached == 0 && total > 0 {
            tracing::warn!(
                document_id,
                records = total,
                unknown,
                "no embedding record matched a section id; the document ranks on BM25 only"
            );
        } else if unknown > 0 {
            tracing::debug!(document_id, unknown, "embedding records without a matching section");
        }
        attached
    }

    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.document_id != document_id);
        before - self.records.len()
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// Mean of the space-A and space-B cosine similarities. A space whose
    /// query vector fell back is compared against the section's fallback
    /// vector instead.
    pub fn blended_cosine(&self, section_id: &str, query: &QueryVectors) -> f32 {
        let Some(r) = self.records.get(section_id) else { return 0.0 };
        let a = if query.a.fallback { &r.fallback } else { &r.vector_a };
        let b = if query.b.fallback { &r.fallback } else { &r.vector_b };
        (cosine_similarity(&query.a.vector, a) + cosine_similarity(&query.b.vector, b)) / 2.0
    }
}
