use crate::index::{InvertedIndex, SectionKey};
use std::collections::{HashMap, HashSet};

pub const K1: f32 = 1.5;
pub const B: f32 = 0.75;

/// `ln((N - df + 0.5) / (df + 0.5) + 1)`
pub fn idf(num_sections: usize, df: usize) -> f32 {
    let n = num_sections as f32;
    let df = df as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Score every section matching at least one query term.
///
/// Query terms are deduplicated. Postings whose document is not in `sources`
/// are skipped; document frequency still counts the whole corpus. Sections
/// that accumulate a zero score are not returned.
pub fn score(
    index: &InvertedIndex,
    query_terms: &[String],
    sources: Option<&HashSet<String>>,
) -> HashMap<SectionKey, f32> {
    let mut scores: HashMap<SectionKey, f32> = HashMap::new();
    let n = index.num_sections();
    if n == 0 {
        return scores;
    }
    let avg_len = index.avg_section_length().max(f32::EPSILON);

    let mut seen: HashSet<&str> = HashSet::new();
    for term in query_terms {
        if !seen.insert(term.as_str()) {
            continue;
        }
        let Some(postings) = index.postings(term) else { continue };
        let idf = idf(n, postings.len());
        for p in postings {
            let Some(section) = index.section(p.section) else { continue };
            if let Some(allowed) = sources {
                if !allowed.contains(&section.document_id) {
                    continue;
                }
            }
            let tf = p.tf as f32;
            let len_norm = 1.0 - B + B * (section.token_length as f32 / avg_len);
            let contrib = idf * tf * (K1 + 1.0) / (tf + K1 * len_norm);
            *scores.entry(p.section).or_insert(0.0) += contrib;
        }
    }
    scores.retain(|_, s| *s != 0.0);
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk;
    use crate::normalizer::normalize;

    fn index() -> InvertedIndex {
        let mut sections = chunk("# Fire Detection Systems\nsmoke and heat detectors with alarms", "cfr46");
        sections.extend(chunk("# Oil Discharge Prohibition\ndischarge of oily waste is prohibited", "cfr33"));
        sections.extend(chunk("# Fire Pumps\nfire pumps and hydrants", "cfr46"));
        InvertedIndex::from_sections(sections)
    }

    #[test]
    fn idf_matches_formula() {
        let v = idf(10, 2);
        let expected = ((10.0 - 2.0 + 0.5) / (2.0 + 0.5) + 1.0f32).ln();
        assert!((v - expected).abs() < 1e-6);
    }

    #[test]
    fn scores_only_matching_sections() {
        let idx = index();
        let scores = score(&idx, &normalize("fire detection"), None);
        assert!(scores.contains_key(&0));
        assert!(!scores.contains_key(&1));
        assert!(scores[&0] > scores[&2]);
    }

    #[test]
    fn duplicate_query_terms_count_once() {
        let idx = index();
        let once = score(&idx, &normalize("discharge"), None);
        let twice = score(&idx, &normalize("discharge discharge"), None);
        assert_eq!(once, twice);
    }

    #[test]
    fn source_filter_excludes_postings() {
        let idx = index();
        let allowed: HashSet<String> = ["cfr33".to_string()].into_iter().collect();
        let scores = score(&idx, &normalize("fire discharge"), Some(&allowed));
        assert_eq!(scores.keys().copied().collect::<Vec<_>>(), vec![1]);
    }
}
