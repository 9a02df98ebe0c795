use crate::normalizer::normalize;
use crate::source::{SourceInfo, SourceKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref MD_HEADING: Regex = Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex");
    static ref SUBPART: Regex = Regex::new(r"^(?i:subpart)\s+([A-Za-z0-9]+)\s*[—–-]\s*(.*)$").expect("valid regex");
    static ref PART_HEADER: Regex = Regex::new(r"^(?i:part)\s+(\d+)\s*[—–-]").expect("valid regex");
    static ref REG_SECTION: Regex = Regex::new(r"^§\s*(\d+)\.(\d+[A-Za-z]?(?:-\d+)*)\s*(.*)$").expect("valid regex");
    static ref LOC_REGULATION: Regex = Regex::new(r"§\s*(\d+(?:\.\d+)*(?:-\d+)*)").expect("valid regex");
    static ref LOC_CHAPTER: Regex = Regex::new(r"(?i)\bchapter\s+(\d+)").expect("valid regex");
    static ref LOC_PART: Regex = Regex::new(r"(?i)\bpart\s+(\d+)").expect("valid regex");
    static ref LOC_SECTION: Regex = Regex::new(r"(?i)\bsection\s+(\d+)").expect("valid regex");
    /// `2.1 Thickness Measurements`, `3.1.4 Pumps`, `1 Survey Intervals`
    static ref CLAUSE_NUMBER: Regex = Regex::new(r"^(\d+(?:\.\d+)*)\.?\s+\S").expect("valid regex");
}

/// Structural address found in a section heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    /// `§ 109.213`, `§ 1.2.3-4`
    Regulation(String),
    Chapter(String),
    Part(String),
    Section(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Regulation(n) => write!(f, "§ {n}"),
            Locator::Chapter(n) => write!(f, "Chapter {n}"),
            Locator::Part(n) => write!(f, "Part {n}"),
            Locator::Section(n) => write!(f, "Section {n}"),
        }
    }
}

/// The atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// `{document_id}_{ordinal}`, ordinal zero-based per document.
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub part: String,
    pub subpart: String,
    pub section: String,
    pub heading: String,
    pub text: String,
    pub locator: Option<Locator>,
    /// Normalized token count of `heading + " " + text`.
    pub token_length: usize,
}

/// Which structural grammar a document is split with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Markdown,
    Register,
    /// No recognizable structure; the document is one section.
    Plain,
}

pub fn detect_grammar(text: &str) -> Grammar {
    let mut register = false;
    for line in text.lines() {
        let line = line.trim_end();
        if MD_HEADING.is_match(line) {
            return Grammar::Markdown;
        }
        if !register && REG_SECTION.is_match(line.trim_start()) {
            register = true;
        }
    }
    if register { Grammar::Register } else { Grammar::Plain }
}

/// Try the locator patterns in order on a heading; first match wins.
pub fn extract_locator(heading: &str) -> Option<Locator> {
    if let Some(c) = LOC_REGULATION.captures(heading) {
        return Some(Locator::Regulation(c[1].to_string()));
    }
    if let Some(c) = LOC_CHAPTER.captures(heading) {
        return Some(Locator::Chapter(c[1].to_string()));
    }
    if let Some(c) = LOC_PART.captures(heading) {
        return Some(Locator::Part(c[1].to_string()));
    }
    LOC_SECTION.captures(heading).map(|c| Locator::Section(c[1].to_string()))
}

/// Split a document into ordered sections, resolving display metadata from
/// the document id.
pub fn chunk(document_text: &str, document_id: &str) -> Vec<Section> {
    chunk_source(document_text, &SourceInfo::resolve(document_id, None))
}

pub fn chunk_source(document_text: &str, source: &SourceInfo) -> Vec<Section> {
    let mut builder = Builder::new(source);
    match detect_grammar(document_text) {
        Grammar::Markdown => chunk_markdown(document_text, &mut builder),
        Grammar::Register => chunk_register(document_text, &mut builder),
        Grammar::Plain => {
            if !document_text.trim().is_empty() {
                builder.open(source.display_name.clone(), None);
                builder.push_line(document_text);
            }
        }
    }
    builder.finish()
}

fn chunk_markdown(text: &str, b: &mut Builder) {
    let mut preamble: Vec<&str> = Vec::new();
    let mut seen_heading = false;
    for line in text.lines() {
        let Some(cap) = MD_HEADING.captures(line.trim_end()) else {
            if seen_heading {
                b.push_line(line);
            } else {
                preamble.push(line);
            }
            continue;
        };
        if !seen_heading {
            seen_heading = true;
            let pre = preamble.join("\n");
            if !pre.trim().is_empty() {
                b.open(b.display_name.clone(), None);
                b.push_line(&pre);
            }
        }
        let heading = cap[2].trim().to_string();
        if let Some(sp) = SUBPART.captures(&heading) {
            b.subpart = sp[1].to_string();
        }
        let locator = extract_locator(&heading);
        match &locator {
            Some(Locator::Part(p)) => {
                if *p != b.part {
                    b.subpart.clear();
                }
                b.part = p.clone();
                b.division = None;
            }
            Some(Locator::Chapter(_) | Locator::Section(_)) => b.division = locator.clone(),
            _ => {}
        }
        if locator.is_none() && b.clause_numbers {
            if let Some(c) = CLAUSE_NUMBER.captures(&heading) {
                let number = c[1].to_string();
                b.open_clause(heading, number);
            } else {
                let enclosing = b.division.clone();
                b.open(heading, enclosing);
            }
            continue;
        }
        b.open(heading, locator);
    }
}

fn chunk_register(text: &str, b: &mut Builder) {
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(sp) = SUBPART.captures(trimmed) {
            b.close();
            b.subpart = sp[1].to_string();
            continue;
        }
        if let Some(p) = PART_HEADER.captures(trimmed) {
            b.close();
            b.part = p[1].to_string();
            b.subpart.clear();
            continue;
        }
        if let Some(c) = REG_SECTION.captures(trimmed) {
            let number = format!("{}.{}", &c[1], &c[2]);
            b.open(trimmed.to_string(), Some(Locator::Regulation(number)));
            let rest = c[3].trim();
            if !rest.is_empty() {
                b.push_line(rest);
            }
            continue;
        }
        // Lines before the first § are not part of any section.
        if b.is_open() {
            b.push_line(line);
        }
    }
}

struct Draft {
    heading: String,
    part: String,
    subpart: String,
    section: String,
    locator: Option<Locator>,
    lines: Vec<String>,
}

/// Accumulates drafts and owns the running part/subpart context.
struct Builder {
    document_id: String,
    display_name: String,
    title: String,
    part: String,
    subpart: String,
    /// Latest Chapter/Section heading; inherited by unnumbered headings below it.
    division: Option<Locator>,
    /// Numbered headings (`2.1 ...`) are clauses. Off for registry sources,
    /// whose section numbers only come from `§` lines.
    clause_numbers: bool,
    current: Option<Draft>,
    out: Vec<Section>,
}

impl Builder {
    fn new(source: &SourceInfo) -> Self {
        Self {
            document_id: source.id.clone(),
            display_name: source.display_name.clone(),
            title: source.title_number().map(|t| t.to_string()).unwrap_or_default(),
            part: String::new(),
            subpart: String::new(),
            division: None,
            clause_numbers: !matches!(source.kind, SourceKind::FederalRegister { .. }),
            current: None,
            out: Vec::new(),
        }
    }

    fn is_open(&self) -> bool { self.current.is_some() }

    fn open(&mut self, heading: String, locator: Option<Locator>) {
        self.close();
        let (part, section) = match &locator {
            Some(Locator::Regulation(n)) => match n.split_once('.') {
                Some((p, s)) => (p.to_string(), s.to_string()),
                None => (n.clone(), String::new()),
            },
            Some(Locator::Part(p)) => (p.clone(), String::new()),
            Some(Locator::Section(s)) => (self.part.clone(), s.clone()),
            Some(Locator::Chapter(_)) | None => (self.part.clone(), String::new()),
        };
        if matches!(locator, Some(Locator::Regulation(_))) {
            self.part = part.clone();
        }
        self.current = Some(Draft {
            heading,
            part,
            subpart: self.subpart.clone(),
            section,
            locator,
            lines: Vec::new(),
        });
    }

    fn open_clause(&mut self, heading: String, number: String) {
        self.open(heading, None);
        if let Some(d) = self.current.as_mut() {
            d.section = number;
        }
    }

    fn push_line(&mut self, line: &str) {
        if let Some(d) = self.current.as_mut() {
            d.lines.push(line.to_string());
        }
    }

    fn close(&mut self) {
        let Some(d) = self.current.take() else { return };
        let text = d.lines.join("\n").trim().to_string();
        if d.heading.is_empty() && text.is_empty() {
            return;
        }
        let token_length = normalize(&format!("{} {}", d.heading, text)).len();
        let ordinal = self.out.len();
        self.out.push(Section {
            id: format!("{}_{}", self.document_id, ordinal),
            document_id: self.document_id.clone(),
            title: self.title.clone(),
            part: d.part,
            subpart: d.subpart,
            section: d.section,
            heading: d.heading,
            text,
            locator: d.locator,
            token_length,
        });
    }

    fn finish(mut self) -> Vec<Section> {
        self.close();
        self.out
    }
}
