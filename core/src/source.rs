use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref REGISTER_ID: Regex = Regex::new(r"^(?:cfr|title)[-_]?(\d{1,3})$").expect("valid regex");
}

/// What kind of publication a document comes from. Decides whether a
/// citation can deep-link into the federal regulation registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    FederalRegister { title: u16 },
    ClassificationRules,
    Other,
}

/// Display metadata for one document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub display_name: String,
    pub kind: SourceKind,
}

impl SourceInfo {
    /// Resolve a document id to its display metadata.
    ///
    /// `cfrNN` / `titleNN` ids are federal register titles, `abs*` ids are
    /// classification-society rules, everything else is an unlinked source.
    /// An explicit `display_name` always wins.
    pub fn resolve(document_id: &str, display_name: Option<&str>) -> Self {
        let lower = document_id.to_ascii_lowercase();
        let (kind, default_name) = if let Some(title) = REGISTER_ID
            .captures(&lower)
            .and_then(|c| c[1].parse::<u16>().ok())
        {
            (SourceKind::FederalRegister { title }, format!("{title} CFR"))
        } else if lower == "abs_part7" {
            (SourceKind::ClassificationRules, "ABS Rules Part 7".to_string())
        } else if lower.starts_with("abs") {
            (SourceKind::ClassificationRules, document_id.to_string())
        } else {
            (SourceKind::Other, document_id.to_string())
        };
        Self {
            id: document_id.to_string(),
            display_name: display_name.map(str::to_string).unwrap_or(default_name),
            kind,
        }
    }

    pub fn title_number(&self) -> Option<u16> {
        match self.kind {
            SourceKind::FederalRegister { title } => Some(title),
            SourceKind::ClassificationRules | SourceKind::Other => None,
        }
    }
}
