use crate::index::SectionKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Linear blend of the cosine and BM25 components.
///
/// The components live on different scales (cosine in [-1, 1], BM25
/// unbounded), so this is an approximation rather than a calibrated blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub cosine: f32,
    pub bm25: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { cosine: 0.5, bm25: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSection {
    pub key: SectionKey,
    pub bm25: f32,
    pub cosine: f32,
    pub fused: f32,
}

/// Fuse per-section scores, sort descending by fused score and keep `top_k`.
///
/// Candidates are every section with a nonzero score on either side. Ties
/// keep insertion order.
pub fn fuse(
    bm25: &HashMap<SectionKey, f32>,
    cosine: &HashMap<SectionKey, f32>,
    weights: &FusionWeights,
    top_k: usize,
) -> Vec<ScoredSection> {
    let mut merged: BTreeMap<SectionKey, (f32, f32)> = BTreeMap::new();
    for (&k, &s) in bm25.iter().filter(|(_, s)| **s != 0.0) {
        merged.entry(k).or_default().0 = s;
    }
    for (&k, &c) in cosine.iter().filter(|(_, c)| **c != 0.0) {
        merged.entry(k).or_default().1 = c;
    }

    let mut scored: Vec<ScoredSection> = merged
        .into_iter()
        .map(|(key, (b, c))| ScoredSection { key, bm25: b, cosine: c, fused: weights.cosine * c + weights.bm25 * b })
        .collect();
    // sort_by is stable; keys were visited in ascending order
    scored.sort_by(|a, b| b.fused.total_cmp(&a.fused));
    scored.truncate(top_k);
    scored
}

/// Display confidence: `round(min(fused * 100, 95))`, floored at 0.
pub fn confidence(fused: f32) -> u8 {
    (fused * 100.0).min(95.0).max(0.0).round() as u8
}
