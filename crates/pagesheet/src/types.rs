//! Core data types for records, field mappings, export schemas, and errors.

use serde::{Deserialize, Serialize};

/// A single extracted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Plain text.
    Text(String),
    /// A link. Relative until the enricher resolves it.
    Url(String),
    /// The field was not found on the page.
    Empty,
}

impl FieldValue {
    /// Build a text value, collapsing blank input to `Empty`.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }

    /// Build a URL value, collapsing blank input to `Empty`.
    pub fn url(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Url(s)
        }
    }

    /// The value as a string slice; `Empty` reads as `""`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Url(s) => s,
            Self::Empty => "",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

/// A named field inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// One extracted record: a page URL plus ordered fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub source_url: String,
    pub fields: Vec<Field>,
}

impl Record {
    pub fn new(source_url: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            source_url: source_url.into(),
            fields,
        }
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Field text by name. Missing and empty fields both read as `""`.
    pub fn text(&self, name: &str) -> &str {
        self.get(name).map(FieldValue::as_str).unwrap_or("")
    }

    /// Replace the value of an existing field. Returns `false` when the
    /// record has no field with that name; records never grow new keys.
    pub fn set(&mut self, name: &str, value: FieldValue) -> bool {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.value = value;
                true
            }
            None => false,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// How a field's raw value is read from its matched element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionKind {
    /// Trimmed text content.
    Text,
    /// The value of a named attribute.
    Attribute(String),
    /// The `href` attribute, kept verbatim as a link.
    Href,
    /// The URL of the page the record came from.
    PageUrl,
    /// A fixed value, independent of the page.
    Constant(String),
}

impl ExtractionKind {
    /// Whether this kind reads from a matched element.
    pub fn reads_element(&self) -> bool {
        matches!(self, Self::Text | Self::Attribute(_) | Self::Href)
    }
}

/// Post-processing applied to a raw extracted string.
///
/// Every parser is total: unparseable input yields either the trimmed raw
/// text or an empty string, as documented per variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueParser {
    /// Trimmed text.
    #[default]
    Trimmed,
    /// Part before the first range separator; the whole text when absent.
    RangeStart,
    /// Part after the first range separator; empty when absent.
    RangeEnd,
    /// Text after the first whole-word occurrence of the marker; empty when absent.
    After(String),
    /// First whitespace-separated token.
    FirstWord,
}

/// One `(field name, selector, kind)` entry of a field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    /// Selector relative to the boundary element. `None` targets the
    /// boundary element itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub kind: ExtractionKind,
    #[serde(default, skip_serializing_if = "is_default_parser")]
    pub parser: ValueParser,
    /// Resolve this field against the page URL during enrichment.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub link: bool,
}

fn is_default_parser(p: &ValueParser) -> bool {
    *p == ValueParser::Trimmed
}

impl FieldRule {
    pub fn new(name: impl Into<String>, selector: Option<&str>, kind: ExtractionKind) -> Self {
        Self {
            name: name.into(),
            selector: selector.map(str::to_string),
            kind,
            parser: ValueParser::Trimmed,
            link: false,
        }
    }

    pub fn text(name: impl Into<String>, selector: &str) -> Self {
        Self::new(name, Some(selector), ExtractionKind::Text)
    }

    pub fn href(name: impl Into<String>, selector: &str) -> Self {
        Self::new(name, Some(selector), ExtractionKind::Href)
    }

    pub fn attribute(name: impl Into<String>, selector: &str, attr: &str) -> Self {
        Self::new(name, Some(selector), ExtractionKind::Attribute(attr.to_string()))
    }

    pub fn constant(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, None, ExtractionKind::Constant(value.to_string()))
    }

    pub fn page_url(name: impl Into<String>) -> Self {
        Self::new(name, None, ExtractionKind::PageUrl)
    }

    pub fn with_parser(mut self, parser: ValueParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn as_link(mut self) -> Self {
        self.link = true;
        self
    }

    /// Whether the enricher treats this field as a link.
    pub fn is_link(&self) -> bool {
        self.link || matches!(self.kind, ExtractionKind::Href | ExtractionKind::PageUrl)
    }
}

/// Declares `source` as translatable free text, translated into `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRule {
    pub source: String,
    pub target: String,
}

/// Declarative selector → field contract for one kind of page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Selector for one repeating record unit (e.g. one review block).
    pub boundary: String,
    pub rules: Vec<FieldRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translations: Vec<TranslationRule>,
}

impl FieldMapping {
    pub fn new(boundary: impl Into<String>, rules: Vec<FieldRule>) -> Self {
        Self {
            boundary: boundary.into(),
            rules,
            translations: Vec::new(),
        }
    }

    pub fn translate(mut self, source: &str, target: &str) -> Self {
        self.translations.push(TranslationRule {
            source: source.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// All field names a record produced by this mapping carries, in order.
    pub fn declared_names(&self) -> Vec<&str> {
        self.rules
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.translations.iter().map(|t| t.target.as_str()))
            .collect()
    }
}

/// How page content is retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Single HTTP GET; selectors run over the parsed HTML.
    #[default]
    Static,
    /// Full browser session; selectors run over the live DOM.
    Rendered,
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Rendered => f.write_str("rendered"),
        }
    }
}

/// One spreadsheet column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportColumn {
    pub header: String,
    /// Record field name feeding this column.
    pub key: String,
    /// Display width hint, in spreadsheet character units.
    pub width: f64,
    /// The field holds an image URL whose image is embedded in this column.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub image: bool,
}

impl ExportColumn {
    pub fn new(header: &str, key: &str, width: f64) -> Self {
        Self {
            header: header.to_string(),
            key: key.to_string(),
            width,
            image: false,
        }
    }

    pub fn image(header: &str, key: &str, width: f64) -> Self {
        Self {
            image: true,
            ..Self::new(header, key, width)
        }
    }
}

/// Ordered column list for the exported worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSchema {
    pub sheet_name: String,
    pub columns: Vec<ExportColumn>,
}

impl ExportSchema {
    pub fn new(sheet_name: &str, columns: Vec<ExportColumn>) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            columns,
        }
    }

    /// Index of the image column, if any.
    pub fn image_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.image)
    }
}

/// A soft failure while enriching one field of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentWarning {
    /// Position of the record in the enriched batch.
    pub index: usize,
    pub source_url: String,
    pub field: String,
    pub reason: String,
}

/// A soft failure while preparing one exported row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportWarning {
    /// Zero-based record index.
    pub row: usize,
    pub url: String,
    pub reason: String,
}

/// A warning surfaced in the final run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    pub url: String,
    pub reason: String,
}

impl From<EnrichmentWarning> for RunWarning {
    fn from(w: EnrichmentWarning) -> Self {
        Self {
            url: w.source_url,
            reason: format!("record {} field '{}': {}", w.index, w.field, w.reason),
        }
    }
}

impl From<ExportWarning> for RunWarning {
    fn from(w: ExportWarning) -> Self {
        Self {
            url: w.url,
            reason: format!("row {}: {}", w.row + 1, w.reason),
        }
    }
}

/// Errors raised while retrieving a page.
#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Timed out after {timeout_ms}ms loading {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Browser error loading {url}: {message}")]
    Browser { url: String, message: String },
}

/// Errors raised while compiling a field mapping.
#[derive(thiserror::Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid selector for '{field}': {selector}")]
    InvalidSelector { field: String, selector: String },

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Translation source '{0}' is not a mapped field")]
    UnknownTranslationSource(String),
}

/// Errors raised by a translation adapter.
#[derive(thiserror::Error, Debug)]
pub enum TranslateError {
    #[error("Translation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Translation service returned HTTP {0}")]
    Status(u16),

    #[error("Malformed translation response: {0}")]
    Malformed(String),
}

/// Errors that make an export unusable.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        match e {
            rust_xlsxwriter::XlsxError::IoError(io) => Self::Io(io),
            other => Self::Encoding(other.to_string()),
        }
    }
}
