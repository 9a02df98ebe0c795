use crate::chunker::{Locator, Section};
use crate::source::{SourceInfo, SourceKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REGISTRY_HOST: &str = "www.ecfr.gov";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    /// `None` for sources that are not in the federal registry.
    pub url: Option<String>,
}

/// Registry deep link. Callers depend on this exact shape.
pub fn registry_url(host: &str, title: &str, part: &str, section: &str) -> String {
    match (part.is_empty(), section.is_empty()) {
        (false, false) => format!("https://{host}/current/title-{title}/section-{part}.{section}"),
        (false, true) => format!("https://{host}/current/title-{title}/part-{part}"),
        _ => format!("https://{host}/current/title-{title}"),
    }
}

pub fn cite(source: &SourceInfo, section: &Section, host: &str) -> Citation {
    let url = match source.kind {
        SourceKind::FederalRegister { title } => {
            let title = if section.title.is_empty() { title.to_string() } else { section.title.clone() };
            Some(registry_url(host, &title, &section.part, &section.section))
        }
        SourceKind::ClassificationRules | SourceKind::Other => None,
    };
    Citation { text: citation_text(&source.display_name, section), url }
}

fn citation_text(display_name: &str, section: &Section) -> String {
    match &section.locator {
        Some(Locator::Regulation(_)) | None if !section.section.is_empty() => {
            if section.part.is_empty() {
                format!("{display_name} § {}", section.section)
            } else {
                format!("{display_name} § {}.{}", section.part, section.section)
            }
        }
        Some(loc) => format!("{display_name} {loc}"),
        None if !section.part.is_empty() => format!("{display_name} Part {}", section.part),
        None => display_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk;

    fn section(title: &str, part: &str, sec: &str) -> Section {
        Section {
            id: "x_0".into(),
            document_id: "x".into(),
            title: title.into(),
            part: part.into(),
            subpart: String::new(),
            section: sec.into(),
            heading: "h".into(),
            text: String::new(),
            locator: None,
            token_length: 1,
        }
    }

    #[test]
    fn section_level_url() {
        let src = SourceInfo::resolve("cfr46", None);
        let c = cite(&src, &section("46", "109", "213"), DEFAULT_REGISTRY_HOST);
        assert_eq!(c.url.as_deref(), Some("https://www.ecfr.gov/current/title-46/section-109.213"));
        assert_eq!(c.text, "46 CFR § 109.213");
    }

    #[test]
    fn part_and_title_level_urls() {
        let src = SourceInfo::resolve("cfr33", None);
        let part = cite(&src, &section("", "151", ""), "example.org");
        assert_eq!(part.url.as_deref(), Some("https://example.org/current/title-33/part-151"));
        assert_eq!(part.text, "33 CFR Part 151");
        let title = cite(&src, &section("", "", ""), "example.org");
        assert_eq!(title.url.as_deref(), Some("https://example.org/current/title-33"));
        assert_eq!(title.text, "33 CFR");
    }

    #[test]
    fn classification_rules_have_no_url() {
        let src = SourceInfo::resolve("abs_part7", None);
        let mut s = section("", "", "");
        s.locator = Some(Locator::Chapter("3".into()));
        let c = cite(&src, &s, DEFAULT_REGISTRY_HOST);
        assert_eq!(c.url, None);
        assert_eq!(c.text, "ABS Rules Part 7 Chapter 3");
    }

    #[test]
    fn classification_rules_cite_clause_or_division() {
        let src = SourceInfo::resolve("abs_part7", None);
        let doc = "## Section 2: Hull Surveys\n### 2.1 Thickness Measurements\nGaugings are required.\n### Close-up Survey\nTanks are examined.\n";
        let s = chunk(doc, "abs_part7");
        let texts: Vec<String> = s.iter().map(|x| cite(&src, x, DEFAULT_REGISTRY_HOST).text).collect();
        assert_eq!(texts, vec!["ABS Rules Part 7 Section 2", "ABS Rules Part 7 § 2.1", "ABS Rules Part 7 Section 2"]);
    }
}
