//! # Document Parser Module
//!
//! ## Purpose
//! Turns a raw gesetze-im-internet.de statute document into an ordered
//! sequence of addressable text units (section → sub-section → body).
//!
//! ## Input/Output Specification
//! - **Input**: Raw `<dokumente>` XML for a single legal code
//! - **Output**: Ordered `ParsedUnit` sequence plus non-fatal warnings
//! - **Determinism**: Identical input yields identical units and ordering
//!
//! ## Document Structure
//! Each `<norm>` carries its section heading in `metadaten > enbez` and its
//! body as `<P>` paragraphs under `textdaten > text > Content`. Paragraphs
//! opening with a sub-section marker ("(1) ...") form one unit per marker;
//! unmarked paragraphs are concatenated into the section-level unit. Norms
//! without a heading or without text are skipped.
//!
//! ## Edge Cases
//! - A document yielding zero units fails with a parse error
//! - Duplicate `(section, sub_section)` keys with identical bodies are merged;
//!   differing bodies get a stable ordinal suffix and a collected warning

use crate::errors::{Result, StoreError};
use crate::text_processing::{extract_sub_section, normalize_text};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One addressable unit produced by the parser; embedding is attached later
/// by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    /// Section heading, e.g. "§ 433"
    pub section: String,
    /// Sub-section heading; `None` for whole-section granularity
    pub sub_section: Option<String>,
    /// Normalized body text, never empty
    pub text: String,
    /// Document-order index, 0-based
    pub position: u32,
}

/// Recoverable ambiguity encountered while parsing; ingestion proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseWarning {
    pub section: String,
    pub sub_section: Option<String>,
    pub detail: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sub_section {
            Some(sub) => write!(f, "{} ({}): {}", self.section, sub, self.detail),
            None => write!(f, "{}: {}", self.section, self.detail),
        }
    }
}

/// Result of parsing one document: units in document order plus warnings.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub units: Vec<ParsedUnit>,
    pub warnings: Vec<ParseWarning>,
}

/// One `<norm>` element as extracted from the XML stream.
#[derive(Debug, Default)]
struct RawNorm {
    enbez: Option<String>,
    paragraphs: Vec<String>,
}

/// Parser for gesetze-im-internet.de statute XML
#[derive(Debug, Default, Clone)]
pub struct DocumentParser;

impl DocumentParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw statute document into ordered text units.
    ///
    /// Fails with a parse error when the document is structurally
    /// unrecognized, i.e. yields zero units.
    pub fn parse(&self, raw: &[u8], code: &str) -> Result<ParseOutcome> {
        let norms = self.extract_norms(raw, code)?;

        let mut units: Vec<ParsedUnit> = Vec::new();
        let mut warnings: Vec<ParseWarning> = Vec::new();
        // (section, sub_section) -> index into `units`, for duplicate detection
        let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();
        // Occurrence counter per base key, drives stable ordinal suffixes
        let mut occurrences: HashMap<(String, Option<String>), u32> = HashMap::new();

        for norm in norms {
            let Some(section) = norm.enbez else {
                continue;
            };
            if norm.paragraphs.is_empty() {
                continue;
            }

            for (sub_section, text) in group_paragraphs(&norm.paragraphs) {
                let key = (section.clone(), sub_section.clone());
                match index.get(&key).copied() {
                    None => {
                        occurrences.insert(key.clone(), 1);
                        index.insert(key, units.len());
                        units.push(ParsedUnit {
                            section: section.clone(),
                            sub_section,
                            text,
                            position: units.len() as u32,
                        });
                    }
                    Some(existing) if units[existing].text == text => {
                        // Same heading, same body: one unit is enough
                        warnings.push(ParseWarning {
                            section: section.clone(),
                            sub_section,
                            detail: "duplicate heading with identical body merged".to_string(),
                        });
                    }
                    Some(_) => {
                        let count = occurrences
                            .entry(key.clone())
                            .and_modify(|c| *c += 1)
                            .or_insert(2);
                        let suffixed = match &sub_section {
                            Some(sub) => Some(format!("{}#{}", sub, count)),
                            None => Some(format!("#{}", count)),
                        };
                        warnings.push(ParseWarning {
                            section: section.clone(),
                            sub_section: sub_section.clone(),
                            detail: format!(
                                "duplicate heading with differing body, stored as sub-section '{}'",
                                suffixed.as_deref().unwrap_or_default()
                            ),
                        });
                        index.insert(
                            (section.clone(), suffixed.clone()),
                            units.len(),
                        );
                        units.push(ParsedUnit {
                            section: section.clone(),
                            sub_section: suffixed,
                            text,
                            position: units.len() as u32,
                        });
                    }
                }
            }
        }

        if units.is_empty() {
            return Err(StoreError::Parse {
                code: code.to_string(),
                reason: "document yielded no recognizable text units".to_string(),
            });
        }

        tracing::debug!(
            code,
            units = units.len(),
            warnings = warnings.len(),
            "parsed statute document"
        );

        Ok(ParseOutcome { units, warnings })
    }

    /// Stream the XML and collect every `<norm>` with heading and paragraphs.
    fn extract_norms(&self, raw: &[u8], code: &str) -> Result<Vec<RawNorm>> {
        let text = String::from_utf8_lossy(raw);
        let mut reader = Reader::from_str(&text);

        let mut norms: Vec<RawNorm> = Vec::new();
        let mut current: Option<RawNorm> = None;
        let mut in_enbez = false;
        let mut enbez_buf = String::new();
        let mut p_depth: u32 = 0;
        let mut p_buf = String::new();

        loop {
            let event = reader.read_event().map_err(|e| StoreError::Parse {
                code: code.to_string(),
                reason: format!("XML error at byte {}: {}", reader.buffer_position(), e),
            })?;

            match event {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"norm" => current = Some(RawNorm::default()),
                    b"enbez" => {
                        in_enbez = current.is_some();
                        enbez_buf.clear();
                    }
                    b"P" => {
                        if current.is_some() {
                            if p_depth == 0 {
                                p_buf.clear();
                            }
                            p_depth += 1;
                        }
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"norm" => {
                        if let Some(norm) = current.take() {
                            norms.push(norm);
                        }
                        in_enbez = false;
                        p_depth = 0;
                    }
                    b"enbez" => {
                        if in_enbez {
                            if let Some(norm) = current.as_mut() {
                                let heading = enbez_buf.trim();
                                if !heading.is_empty() {
                                    norm.enbez = Some(heading.to_string());
                                }
                            }
                        }
                        in_enbez = false;
                    }
                    b"P" => {
                        if p_depth > 0 {
                            p_depth -= 1;
                            if p_depth == 0 {
                                if let Some(norm) = current.as_mut() {
                                    norm.paragraphs.push(p_buf.clone());
                                }
                            }
                        }
                    }
                    _ => {}
                },
                Event::Text(t) => {
                    let decoded = t.unescape().map_err(|e| StoreError::Parse {
                        code: code.to_string(),
                        reason: format!("invalid text content: {}", e),
                    })?;
                    if in_enbez {
                        enbez_buf.push_str(&decoded);
                    } else if p_depth > 0 {
                        p_buf.push_str(&decoded);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(norms)
    }
}

/// Group a norm's paragraphs by sub-section marker, preserving first-seen
/// order, and join each group with a blank line (the original document
/// convention for multi-paragraph units).
fn group_paragraphs(paragraphs: &[String]) -> Vec<(Option<String>, String)> {
    let mut order: Vec<Option<String>> = Vec::new();
    let mut grouped: HashMap<Option<String>, Vec<&str>> = HashMap::new();

    for p in paragraphs {
        let marker = extract_sub_section(p.trim_start());
        if !grouped.contains_key(&marker) {
            order.push(marker.clone());
        }
        grouped.entry(marker).or_default().push(p.as_str());
    }

    order
        .into_iter()
        .filter_map(|marker| {
            let joined = grouped
                .get(&marker)
                .map(|parts| parts.join("\n\n"))
                .unwrap_or_default();
            let text = normalize_text(&joined);
            if text.is_empty() {
                None
            } else {
                Some((marker, text))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm_xml(enbez: &str, paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<P>{}</P>", p))
            .collect();
        format!(
            "<norm doknr=\"BJNR\"><metadaten><jurabk>BGB</jurabk><enbez>{}</enbez></metadaten>\
             <textdaten><text format=\"XML\"><Content>{}</Content></text></textdaten></norm>",
            enbez, body
        )
    }

    fn document(norms: &[String]) -> Vec<u8> {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><dokumente builddate=\"20240101\">{}</dokumente>",
            norms.concat()
        )
        .into_bytes()
    }

    #[test]
    fn concatenates_unmarked_paragraphs_into_section_unit() {
        let doc = document(&[norm_xml(
            "§ 1",
            &[
                "First paragraph without number.",
                "Second paragraph without number.",
            ],
        )]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert_eq!(outcome.units.len(), 1);
        let unit = &outcome.units[0];
        assert_eq!(unit.section, "§ 1");
        assert_eq!(unit.sub_section, None);
        assert!(unit.text.contains("First paragraph"));
        assert!(unit.text.contains("Second paragraph"));
        assert!(unit.text.contains("\n\n"));
    }

    #[test]
    fn separates_marked_sub_sections() {
        let doc = document(&[norm_xml(
            "§ 1",
            &[
                "(1) First subsection text.",
                "(2) Second subsection text.",
                "(3) Third subsection text.",
            ],
        )]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert_eq!(outcome.units.len(), 3);
        let subs: Vec<_> = outcome
            .units
            .iter()
            .map(|u| u.sub_section.as_deref().unwrap().to_string())
            .collect();
        assert_eq!(subs, vec!["1", "2", "3"]);
    }

    #[test]
    fn mixed_marked_and_unmarked_paragraphs() {
        let doc = document(&[norm_xml(
            "§ 1",
            &[
                "(1) First numbered.",
                "Continuation of first.",
                "(2) Second numbered.",
                "Another unnumbered.",
            ],
        )]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert_eq!(outcome.units.len(), 3);
        let section_level = outcome
            .units
            .iter()
            .find(|u| u.sub_section.is_none())
            .expect("section-level unit");
        assert!(section_level.text.contains("Continuation of first"));
        assert!(section_level.text.contains("Another unnumbered"));
    }

    #[test]
    fn skips_norms_without_heading() {
        let doc = document(&[
            "<norm><metadaten><jurabk>BGB</jurabk></metadaten><textdaten><text><Content><P>Some text.</P></Content></text></textdaten></norm>".to_string(),
            norm_xml("§ 1", &["Valid section text."]),
        ]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert_eq!(outcome.units.len(), 1);
        assert_eq!(outcome.units[0].section, "§ 1");
    }

    #[test]
    fn parses_multiple_norms_in_document_order() {
        let doc = document(&[
            norm_xml("§ 1", &["First section."]),
            norm_xml("§ 2", &["Second section."]),
        ]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert_eq!(outcome.units.len(), 2);
        assert_eq!(outcome.units[0].section, "§ 1");
        assert_eq!(outcome.units[0].position, 0);
        assert_eq!(outcome.units[1].section, "§ 2");
        assert_eq!(outcome.units[1].position, 1);
    }

    #[test]
    fn empty_document_is_a_parse_error() {
        let doc = document(&[]);
        let err = DocumentParser::new().parse(&doc, "bgb").unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn garbage_input_is_a_parse_error() {
        let err = DocumentParser::new()
            .parse(b"not xml at all", "bgb")
            .unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn preserves_umlauts_and_entities() {
        let doc = document(&[norm_xml(
            "§ 1",
            &["Die Rechtsf\u{e4}higkeit des Menschen beginnt &amp; endet."],
        )]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert!(outcome.units[0].text.contains("Rechtsfähigkeit"));
        assert!(outcome.units[0].text.contains("&"));
    }

    #[test]
    fn duplicate_headings_with_identical_bodies_merge() {
        let doc = document(&[
            norm_xml("§ 4", &["Same body."]),
            norm_xml("§ 4", &["Same body."]),
        ]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert_eq!(outcome.units.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn duplicate_headings_with_differing_bodies_get_ordinals() {
        let doc = document(&[
            norm_xml("§ 4", &["First body."]),
            norm_xml("§ 4", &["Second body."]),
            norm_xml("§ 4", &["Third body."]),
        ]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        assert_eq!(outcome.units.len(), 3);
        assert_eq!(outcome.units[0].sub_section, None);
        assert_eq!(outcome.units[1].sub_section, Some("#2".to_string()));
        assert_eq!(outcome.units[2].sub_section, Some("#3".to_string()));
        assert_eq!(outcome.warnings.len(), 2);

        // All keys unique
        let mut keys: Vec<_> = outcome
            .units
            .iter()
            .map(|u| (u.section.clone(), u.sub_section.clone()))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn marker_variants_from_real_statutes() {
        let doc = document(&[norm_xml(
            "§ 1",
            &[
                "(1) First subsection.",
                "(1a) First-a subsection.",
                "(2) Second subsection.",
                "(10) Tenth subsection.",
            ],
        )]);
        let outcome = DocumentParser::new().parse(&doc, "bgb").unwrap();

        let subs: Vec<_> = outcome
            .units
            .iter()
            .map(|u| u.sub_section.clone().unwrap())
            .collect();
        assert_eq!(subs, vec!["1", "1a", "2", "10"]);
    }

    #[test]
    fn deterministic_across_runs() {
        let doc = document(&[
            norm_xml("§ 1", &["(1) Eins.", "(2) Zwei."]),
            norm_xml("§ 2", &["Ohne Absatz."]),
        ]);
        let parser = DocumentParser::new();
        let a = parser.parse(&doc, "bgb").unwrap();
        let b = parser.parse(&doc, "bgb").unwrap();
        assert_eq!(a.units, b.units);
    }
}
