//! Post-extraction enrichment: absolute-URL resolution and translation.
//!
//! Enrichment never changes record count or order. Failures are recorded
//! as [`EnrichmentWarning`]s and the affected field is left as-is (links)
//! or empty (translations).

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};
use url::Url;

use crate::types::{EnrichmentWarning, FieldMapping, FieldValue, Record};
use crate::translate::Translator;

/// Records after enrichment, plus every soft failure encountered.
#[derive(Debug, Clone, Default)]
pub struct EnrichOutcome {
    pub records: Vec<Record>,
    pub warnings: Vec<EnrichmentWarning>,
}

/// Enriches records produced by one field mapping.
pub struct Enricher {
    mapping: FieldMapping,
    translator: Option<Arc<dyn Translator>>,
    concurrency: usize,
}

impl Enricher {
    pub fn new(mapping: FieldMapping, translator: Arc<dyn Translator>, concurrency: usize) -> Self {
        Self {
            mapping,
            translator: Some(translator),
            concurrency: concurrency.max(1),
        }
    }

    /// An enricher that only resolves links. Translation targets stay empty.
    pub fn without_translation(mapping: FieldMapping, concurrency: usize) -> Self {
        Self {
            mapping,
            translator: None,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich a batch of records extracted from `base_url`.
    ///
    /// Records are processed with bounded concurrency and reassembled in
    /// their original order.
    pub async fn enrich(
        &self,
        records: Vec<Record>,
        base_url: &str,
        target_locale: &str,
    ) -> EnrichOutcome {
        let base = Url::parse(base_url).ok();
        if base.is_none() {
            warn!(base_url, "base URL does not parse; relative links stay relative");
        }

        let results: Vec<(Record, Vec<EnrichmentWarning>)> = stream::iter(records.into_iter().enumerate())
            .map(|(index, record)| self.enrich_one(index, record, base.as_ref(), target_locale))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcome = EnrichOutcome::default();
        for (record, warnings) in results {
            outcome.records.push(record);
            outcome.warnings.extend(warnings);
        }
        outcome
    }

    async fn enrich_one(
        &self,
        index: usize,
        mut record: Record,
        base: Option<&Url>,
        target_locale: &str,
    ) -> (Record, Vec<EnrichmentWarning>) {
        let mut warnings = Vec::new();

        for rule in self.mapping.rules.iter().filter(|r| r.is_link()) {
            let raw = record.text(&rule.name).to_string();
            if raw.is_empty() {
                continue;
            }
            match resolve_link(&raw, base) {
                Ok(absolute) => {
                    record.set(&rule.name, FieldValue::Url(absolute));
                }
                Err(reason) => {
                    warn!(index, field = %rule.name, link = %raw, "link resolution failed: {reason}");
                    warnings.push(EnrichmentWarning {
                        index,
                        source_url: record.source_url.clone(),
                        field: rule.name.clone(),
                        reason,
                    });
                }
            }
        }

        let Some(translator) = self.translator.as_ref() else {
            return (record, warnings);
        };
        for rule in &self.mapping.translations {
            let source = record.text(&rule.source).to_string();
            if source.is_empty() {
                record.set(&rule.target, FieldValue::Empty);
                continue;
            }
            match translator.translate(&source, target_locale).await {
                Ok(translated) => {
                    debug!(index, field = %rule.target, "translated");
                    record.set(&rule.target, FieldValue::text(translated));
                }
                Err(e) => {
                    warn!(index, field = %rule.target, "translation failed: {e}");
                    record.set(&rule.target, FieldValue::Empty);
                    warnings.push(EnrichmentWarning {
                        index,
                        source_url: record.source_url.clone(),
                        field: rule.target.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        (record, warnings)
    }
}

/// Join a possibly-relative link against the page URL.
pub fn resolve_link(raw: &str, base: Option<&Url>) -> Result<String, String> {
    let raw = raw.trim();
    if let Ok(absolute) = Url::parse(raw) {
        return Ok(absolute.to_string());
    }
    let base = base.ok_or_else(|| format!("relative link '{raw}' with no usable base URL"))?;
    base.join(raw)
        .map(|u| u.to_string())
        .map_err(|e| format!("cannot resolve '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, FieldRule, TranslateError};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Uppercases text; fails for any text containing "FAIL".
    struct ScriptedTranslator;

    #[async_trait]
    impl Translator for ScriptedTranslator {
        async fn translate(&self, text: &str, target: &str) -> Result<String, TranslateError> {
            // Later records finish first, so order must come from the fan-in.
            let delay = 40u64.saturating_sub(text.len() as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if text.contains("FAIL") {
                return Err(TranslateError::Status(500));
            }
            Ok(format!("[{target}] {}", text.to_uppercase()))
        }
    }

    fn mapping() -> FieldMapping {
        FieldMapping::new(
            ".review",
            vec![
                FieldRule::text("body", ".body"),
                FieldRule::href("link", "a"),
            ],
        )
        .translate("body", "body_zh")
    }

    fn record(body: &str, link: &str) -> Record {
        Record::new(
            "https://shop.example/dp/1",
            vec![
                Field { name: "body".into(), value: FieldValue::text(body) },
                Field { name: "link".into(), value: FieldValue::url(link) },
                Field { name: "body_zh".into(), value: FieldValue::Empty },
            ],
        )
    }

    #[tokio::test]
    async fn test_one_failed_translation_does_not_abort_batch() {
        let records = vec![
            record("a", "/r/1"),
            record("bb", "/r/2"),
            record("FAIL", "/r/3"),
            record("dddd", "/r/4"),
            record("eeeee", "/r/5"),
        ];
        let enricher = Enricher::new(mapping(), Arc::new(ScriptedTranslator), 4);

        let out = enricher
            .enrich(records, "https://shop.example/dp/1", "zh-CN")
            .await;

        assert_eq!(out.records.len(), 5);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].index, 2);
        assert_eq!(out.warnings[0].field, "body_zh");
        assert_eq!(out.records[2].get("body_zh"), Some(&FieldValue::Empty));
        for i in [0, 1, 3, 4] {
            assert!(!out.records[i].text("body_zh").is_empty());
        }
        assert_eq!(out.records[0].text("body_zh"), "[zh-CN] A");
        assert_eq!(out.records[4].text("link"), "https://shop.example/r/5");
    }

    #[tokio::test]
    async fn test_enrich_preserves_order_and_source() {
        let records: Vec<Record> = (0..8)
            .map(|i| {
                let mut r = record(&"x".repeat(i + 1), "");
                r.source_url = format!("https://shop.example/p/{i}");
                r
            })
            .collect();
        let expected: Vec<String> = records.iter().map(|r| r.source_url.clone()).collect();

        let enricher = Enricher::new(mapping(), Arc::new(ScriptedTranslator), 8);
        let out = enricher.enrich(records, "https://shop.example/", "fr").await;

        let got: Vec<String> = out.records.iter().map(|r| r.source_url.clone()).collect();
        assert_eq!(got, expected);
        for (i, r) in out.records.iter().enumerate() {
            assert_eq!(r.text("body"), "x".repeat(i + 1));
        }
    }

    #[tokio::test]
    async fn test_empty_source_skips_translation() {
        let enricher = Enricher::new(mapping(), Arc::new(ScriptedTranslator), 1);
        let out = enricher
            .enrich(vec![record("", "https://other.example/x")], "https://shop.example/", "fr")
            .await;
        assert!(out.warnings.is_empty());
        assert_eq!(out.records[0].get("body_zh"), Some(&FieldValue::Empty));
        assert_eq!(out.records[0].text("link"), "https://other.example/x");
    }

    #[tokio::test]
    async fn test_without_translation_still_resolves_links() {
        let enricher = Enricher::without_translation(mapping(), 2);
        let out = enricher
            .enrich(vec![record("hello", "/r/9")], "https://shop.example/dp/1", "zh-CN")
            .await;
        assert!(out.warnings.is_empty());
        assert_eq!(out.records[0].get("body_zh"), Some(&FieldValue::Empty));
        assert_eq!(out.records[0].text("link"), "https://shop.example/r/9");
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://www.amazon.com/dp/B0C5QCVTBJ").unwrap();
        assert_eq!(
            resolve_link("/gp/profile/abc", Some(&base)).unwrap(),
            "https://www.amazon.com/gp/profile/abc"
        );
        assert_eq!(
            resolve_link("//images.example/x.jpg", Some(&base)).unwrap(),
            "https://images.example/x.jpg"
        );
        assert!(resolve_link("/relative", None).is_err());
    }
}
