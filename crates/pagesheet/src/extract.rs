//! Selector-driven field extraction.
//!
//! One entry point, [`extract`], turns page content into records. Static
//! pages are parsed with `scraper` and queried here; rendered pages arrive
//! as a [`DomSnapshot`] already sampled in-page by the script from
//! [`CompiledMapping::dom_script`]. Both strategies produce one raw value per
//! rule per boundary match, and the same record builder turns those into
//! typed fields.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::types::{
    ExtractionError, ExtractionKind, Field, FieldMapping, FieldRule, FieldValue, Record,
    ValueParser,
};

/// Raw page content handed from the acquirer to the extractor.
#[derive(Debug, Clone)]
pub enum PageContent {
    /// Static HTML, queried after parsing.
    Html { url: String, body: String },
    /// Values sampled from a live DOM.
    Dom(DomSnapshot),
}

impl PageContent {
    /// URL the content was retrieved from, after redirects.
    pub fn url(&self) -> &str {
        match self {
            Self::Html { url, .. } => url,
            Self::Dom(snapshot) => &snapshot.url,
        }
    }
}

/// Rendered-page sample: one row per boundary match, one value per rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub url: String,
    pub matches: Vec<Vec<Option<String>>>,
}

/// A field mapping with every selector parsed and validated.
#[derive(Debug, Clone)]
pub struct CompiledMapping {
    mapping: FieldMapping,
    boundary: Selector,
    selectors: Vec<Option<Selector>>,
}

impl CompiledMapping {
    /// Validate and compile a mapping.
    ///
    /// This is the only place extraction can fail; once compiled, a page
    /// that matches nothing simply yields no records.
    pub fn compile(mapping: &FieldMapping) -> Result<Self, ExtractionError> {
        let boundary = parse_selector("<boundary>", &mapping.boundary)?;

        let mut seen = HashSet::new();
        for name in mapping.declared_names() {
            if !seen.insert(name) {
                return Err(ExtractionError::DuplicateField(name.to_string()));
            }
        }

        for rule in &mapping.translations {
            if !mapping.rules.iter().any(|r| r.name == rule.source) {
                return Err(ExtractionError::UnknownTranslationSource(rule.source.clone()));
            }
        }

        let selectors = mapping
            .rules
            .iter()
            .map(|rule| match (&rule.selector, rule.kind.reads_element()) {
                (Some(sel), true) => parse_selector(&rule.name, sel).map(Some),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            mapping: mapping.clone(),
            boundary,
            selectors,
        })
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// In-page script sampling every rule under every boundary match.
    ///
    /// Evaluates to `{ url, matches }`, deserializable as [`DomSnapshot`].
    /// Href values are read with `getAttribute` so they stay as written in
    /// the markup, matching the static strategy.
    pub fn dom_script(&self) -> String {
        let readers: Vec<serde_json::Value> = self
            .mapping
            .rules
            .iter()
            .map(|rule| {
                let (kind, attr) = match &rule.kind {
                    ExtractionKind::Text => ("text", None),
                    ExtractionKind::Attribute(a) => ("attr", Some(a.as_str())),
                    ExtractionKind::Href => ("attr", Some("href")),
                    ExtractionKind::PageUrl | ExtractionKind::Constant(_) => ("none", None),
                };
                serde_json::json!({ "selector": rule.selector, "kind": kind, "attr": attr })
            })
            .collect();

        let readers = serde_json::Value::Array(readers).to_string();
        let boundary = serde_json::Value::String(self.mapping.boundary.clone()).to_string();

        format!(
            r#"(() => {{
  const readers = {readers};
  const read = (root, p) => {{
    if (p.kind === 'none') return null;
    const el = p.selector ? root.querySelector(p.selector) : root;
    if (!el) return null;
    if (p.kind === 'text') return el.textContent;
    return el.getAttribute(p.attr);
  }};
  return {{
    url: window.location.href,
    matches: Array.from(document.querySelectorAll({boundary}))
      .map((root) => readers.map((p) => read(root, p))),
  }};
}})()"#
        )
    }

    /// Query parsed HTML: one raw value per rule per boundary match.
    fn html_matches(&self, body: &str) -> Vec<Vec<Option<String>>> {
        let document = Html::parse_document(body);
        document
            .select(&self.boundary)
            .map(|root| {
                self.mapping
                    .rules
                    .iter()
                    .zip(&self.selectors)
                    .map(|(rule, selector)| read_element(root, rule, selector.as_ref()))
                    .collect()
            })
            .collect()
    }
}

fn parse_selector(field: &str, selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|_| ExtractionError::InvalidSelector {
        field: field.to_string(),
        selector: selector.to_string(),
    })
}

fn read_element(root: ElementRef<'_>, rule: &FieldRule, selector: Option<&Selector>) -> Option<String> {
    if !rule.kind.reads_element() {
        return None;
    }
    let element = match selector {
        Some(sel) => root.select(sel).next()?,
        None => root,
    };
    match &rule.kind {
        ExtractionKind::Text => Some(element.text().collect::<String>()),
        ExtractionKind::Attribute(attr) => element.value().attr(attr).map(str::to_string),
        ExtractionKind::Href => element.value().attr("href").map(str::to_string),
        ExtractionKind::PageUrl | ExtractionKind::Constant(_) => None,
    }
}

/// Extract records from page content.
///
/// Records come out in boundary-match order, each carrying every field the
/// mapping declares. Zero matches is a valid, empty result.
pub fn extract(content: &PageContent, mapping: &CompiledMapping) -> Vec<Record> {
    let raw_matches = match content {
        PageContent::Html { body, .. } => mapping.html_matches(body),
        PageContent::Dom(snapshot) => snapshot.matches.clone(),
    };

    raw_matches
        .into_iter()
        .map(|raw| build_record(content.url(), mapping.mapping(), &raw))
        .collect()
}

fn build_record(url: &str, mapping: &FieldMapping, raw: &[Option<String>]) -> Record {
    let mut fields: Vec<Field> = mapping
        .rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let raw = raw.get(i).cloned().flatten();
            Field {
                name: rule.name.clone(),
                value: field_value(url, rule, raw.as_deref()),
            }
        })
        .collect();

    fields.extend(mapping.translations.iter().map(|t| Field {
        name: t.target.clone(),
        value: FieldValue::Empty,
    }));

    Record::new(url, fields)
}

fn field_value(url: &str, rule: &FieldRule, raw: Option<&str>) -> FieldValue {
    match &rule.kind {
        ExtractionKind::PageUrl => FieldValue::url(url),
        ExtractionKind::Constant(value) => FieldValue::text(value.as_str()),
        ExtractionKind::Href => FieldValue::url(raw.map(str::trim).unwrap_or("")),
        ExtractionKind::Text | ExtractionKind::Attribute(_) => {
            let parsed = apply_parser(&rule.parser, raw.unwrap_or(""));
            if rule.link {
                FieldValue::url(parsed)
            } else {
                FieldValue::text(parsed)
            }
        }
    }
}

const RANGE_SEPARATORS: [&str; 3] = ["–", "—", " - "];

/// Apply a value parser. Never fails: see [`ValueParser`] for what each
/// variant yields on unparseable input.
pub fn apply_parser(parser: &ValueParser, raw: &str) -> String {
    let text = raw.trim();
    match parser {
        ValueParser::Trimmed => text.to_string(),
        ValueParser::RangeStart => match split_range(text) {
            Some((start, _)) => start.trim().to_string(),
            None => text.to_string(),
        },
        ValueParser::RangeEnd => split_range(text)
            .map(|(_, end)| end.trim().to_string())
            .unwrap_or_default(),
        ValueParser::After(marker) => after_word(text, marker)
            .map(str::to_string)
            .unwrap_or_default(),
        ValueParser::FirstWord => text.split_whitespace().next().unwrap_or("").to_string(),
    }
}

fn split_range(text: &str) -> Option<(&str, &str)> {
    RANGE_SEPARATORS
        .iter()
        .filter_map(|sep| text.find(sep).map(|i| (i, sep.len())))
        .min_by_key(|(i, _)| *i)
        .map(|(i, len)| (&text[..i], &text[i + len..]))
}

/// Text following the first whole-word occurrence of `marker`.
fn after_word<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }
    text.match_indices(marker).find_map(|(i, m)| {
        let end = i + m.len();
        let before_ok = text[..i]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after_ok = text[end..].chars().next().map_or(true, char::is_whitespace);
        (before_ok && after_ok).then(|| text[end..].trim())
    })
}
