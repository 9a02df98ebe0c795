use crate::chunker::Section;
use crate::normalizer::normalize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TermId = u32;
/// Position of a section in insertion order; doubles as the tie-break key.
pub type SectionKey = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub section: SectionKey,
    pub tf: u32,
}

/// Term → per-section term frequency, plus the sections themselves and their
/// cached token lengths.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    dictionary: HashMap<String, TermId>,
    /// Indexed by `TermId`; each list is ordered by section key.
    postings: Vec<Vec<Posting>>,
    sections: Vec<Section>,
    total_tokens: u64,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Build a fresh index. Used for initial load and for rebuilds after a
    /// document is removed.
    pub fn from_sections<I: IntoIterator<Item = Section>>(sections: I) -> Self {
        let mut index = Self::new();
        for s in sections {
            index.insert(s);
        }
        index
    }

    /// Append a section and its postings. Heading-only sections (an empty
    /// body) and sections that normalize to zero tokens are not indexed and
    /// yield `None`.
    pub fn insert(&mut self, mut section: Section) -> Option<SectionKey> {
        if section.text.trim().is_empty() {
            tracing::debug!(id = %section.id, heading = %section.heading, "dropping heading-only section");
            return None;
        }
        let tokens = normalize(&format!("{} {}", section.heading, section.text));
        if tokens.is_empty() {
            tracing::debug!(id = %section.id, "dropping section without tokens");
            return None;
        }
        let key = self.sections.len() as SectionKey;
        section.token_length = tokens.len();

        let mut tf_counts: HashMap<String, u32> = HashMap::new();
        for t in tokens {
            *tf_counts.entry(t).or_insert(0) += 1;
        }
        for (term, tf) in tf_counts {
            let next_id = self.postings.len() as TermId;
            let tid = *self.dictionary.entry(term).or_insert(next_id);
            if tid == next_id {
                self.postings.push(Vec::new());
            }
            self.postings[tid as usize].push(Posting { section: key, tf });
        }

        self.total_tokens += section.token_length as u64;
        self.sections.push(section);
        Some(key)
    }

    pub fn num_sections(&self) -> usize { self.sections.len() }

    pub fn num_terms(&self) -> usize { self.dictionary.len() }

    pub fn avg_section_length(&self) -> f32 {
        if self.sections.is_empty() {
            return 0.0;
        }
        self.total_tokens as f32 / self.sections.len() as f32
    }

    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.dictionary.get(term).map(|&tid| self.postings[tid as usize].as_slice())
    }

    /// Number of sections containing `term`.
    pub fn df(&self, term: &str) -> usize {
        self.postings(term).map_or(0, <[Posting]>::len)
    }

    pub fn section(&self, key: SectionKey) -> Option<&Section> {
        self.sections.get(key as usize)
    }

    pub fn sections(&self) -> &[Section] { &self.sections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk;

    #[test]
    fn builds_postings_and_lengths() {
        let sections = chunk("# Fire pumps\nfire pumps and fire hoses\n# Ballast\nballast tanks", "d");
        let index = InvertedIndex::from_sections(sections);
        assert_eq!(index.num_sections(), 2);
        let p = index.postings("fire").expect("term present");
        assert_eq!(p, &[Posting { section: 0, tf: 3 }]);
        assert_eq!(index.df("ballast"), 1);
        assert_eq!(index.df("missing"), 0);
        // "fire pumps fire pumps fire hoses" + compound "fire_main" x2
        assert_eq!(index.section(0).map(|s| s.token_length), Some(8));
    }

    #[test]
    fn incremental_insert_appends() {
        let mut index = InvertedIndex::from_sections(chunk("# A\nhull survey", "a"));
        index.insert(chunk("# B\nhull plating", "b").remove(0));
        assert_eq!(index.df("hull"), 2);
        assert_eq!(index.postings("hull").map(|p| p[1].section), Some(1));
        assert_eq!(index.section(1).map(|s| s.document_id.as_str()), Some("b"));
    }

    #[test]
    fn heading_only_sections_are_not_indexed() {
        let sections = chunk("# PART 109 Operations\n## Subpart B - Fire Protection\n## Fire pumps\nfire pumps", "d");
        assert_eq!(sections.len(), 3);
        let index = InvertedIndex::from_sections(sections);
        assert_eq!(index.num_sections(), 1);
        assert_eq!(index.section(0).map(|s| s.id.as_str()), Some("d_2"));
        assert_eq!(index.df("protection"), 0);
    }
}
