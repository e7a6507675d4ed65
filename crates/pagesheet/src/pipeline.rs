//! Run orchestration: acquire → extract → enrich for every URL, then one export.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::acquire::http_client::HttpClient;
use crate::acquire::PageAcquirer;
use crate::config::PipelineConfig;
use crate::enrich::Enricher;
use crate::export::{validate_sheet_name, Exporter};
use crate::extract::{extract, CompiledMapping};
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::BrowserLauncher;
use crate::translate::Translator;
use crate::types::{AcquisitionMode, ExportSchema, FieldMapping, Record, RunWarning};

/// One extraction job: which pages, how to read them, where to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub urls: Vec<String>,
    #[serde(default)]
    pub mode: AcquisitionMode,
    pub mapping: FieldMapping,
    pub schema: ExportSchema,
    pub output: PathBuf,
    #[serde(default = "default_locale")]
    pub target_locale: String,
    /// Overrides the schema's sheet name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

fn default_locale() -> String {
    "zh-CN".to_string()
}

impl Job {
    /// The schema with any sheet-name override applied.
    pub fn effective_schema(&self) -> ExportSchema {
        let mut schema = self.schema.clone();
        if let Some(name) = &self.sheet_name {
            schema.sheet_name = name.clone();
        }
        schema
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        path: PathBuf,
        records: usize,
    },
    CompletedWithWarnings {
        path: PathBuf,
        records: usize,
        warnings: Vec<RunWarning>,
    },
    Failed {
        reason: String,
        warnings: Vec<RunWarning>,
    },
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn warnings(&self) -> &[RunWarning] {
        match self {
            Self::Completed { .. } => &[],
            Self::CompletedWithWarnings { warnings, .. } | Self::Failed { warnings, .. } => warnings,
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Completed { path, .. } | Self::CompletedWithWarnings { path, .. } => Some(path),
            Self::Failed { .. } => None,
        }
    }

    fn failed(reason: impl Into<String>, warnings: Vec<RunWarning>) -> Self {
        let reason = reason.into();
        error!(%reason, warnings = warnings.len(), "Run failed");
        Self::Failed { reason, warnings }
    }
}

/// Enriched records of a job, in URL order, plus soft warnings so far.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub records: Vec<Record>,
    pub warnings: Vec<RunWarning>,
}

/// Records and soft warnings from one URL.
type UrlResult = Result<(Vec<Record>, Vec<RunWarning>), RunWarning>;

/// Sequences acquisition, extraction, enrichment and export for a job.
pub struct Pipeline {
    config: PipelineConfig,
    acquirer: PageAcquirer,
    exporter: Exporter,
    translator: Option<Arc<dyn Translator>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        launcher: Arc<dyn BrowserLauncher>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        let http = HttpClient::new(&config.user_agent, config.http_timeout_ms, config.max_retries);
        let acquirer = PageAcquirer::new(
            http.clone(),
            launcher,
            config.render_timeout(),
            config.idle,
        );
        let exporter = Exporter::new(http, config.image_timeout_ms, config.enrich_concurrency);
        Self {
            config,
            acquirer,
            exporter,
            translator,
        }
    }

    /// Pipeline backed by a locally installed Chromium for rendered mode.
    pub fn with_chromium(config: PipelineConfig, translator: Option<Arc<dyn Translator>>) -> Self {
        let launcher = Arc::new(ChromiumLauncher::new(
            config.chromium_path.clone(),
            config.render_timeout(),
        ));
        Self::new(config, launcher, translator)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole job: collect records from every URL, then export once.
    pub async fn run(&self, job: &Job) -> RunOutcome {
        let start = Instant::now();
        let Collected {
            records,
            mut warnings,
        } = match self.collect(job).await {
            Ok(c) => c,
            Err(failed) => return failed,
        };

        let export = self
            .exporter
            .export(&records, &job.effective_schema(), &job.output)
            .await;
        let result = match export {
            Ok(r) => r,
            Err(e) => return RunOutcome::failed(format!("export failed: {e}"), warnings),
        };
        warnings.extend(result.warnings.into_iter().map(RunWarning::from));

        info!(
            job = %job.name,
            records = records.len(),
            images = result.images_embedded,
            warnings = warnings.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            path = %result.path.display(),
            "Run finished"
        );

        if warnings.is_empty() {
            RunOutcome::Completed {
                path: result.path,
                records: records.len(),
            }
        } else {
            RunOutcome::CompletedWithWarnings {
                path: result.path,
                records: records.len(),
                warnings,
            }
        }
    }

    /// Acquire, extract and enrich every URL of `job`, in URL order,
    /// without exporting.
    ///
    /// Fails with the terminal [`RunOutcome::Failed`] when the job cannot
    /// produce anything.
    pub async fn collect(&self, job: &Job) -> Result<Collected, RunOutcome> {
        info!(job = %job.name, urls = job.urls.len(), mode = %job.mode, "Run started");

        if job.urls.is_empty() {
            return Err(RunOutcome::failed("job has no URLs", Vec::new()));
        }

        let mapping = CompiledMapping::compile(&job.mapping)
            .map_err(|e| RunOutcome::failed(format!("invalid field mapping: {e}"), Vec::new()))?;
        validate_sheet_name(&job.effective_schema().sheet_name)
            .map_err(|e| RunOutcome::failed(format!("invalid export schema: {e}"), Vec::new()))?;

        let enricher = match &self.translator {
            Some(t) => Enricher::new(job.mapping.clone(), Arc::clone(t), self.config.enrich_concurrency),
            None => {
                if !job.mapping.translations.is_empty() {
                    info!("No translator configured; translated columns stay empty");
                }
                Enricher::without_translation(job.mapping.clone(), self.config.enrich_concurrency)
            }
        };

        let results: Vec<UrlResult> = stream::iter(job.urls.iter())
            .map(|url| self.process_url(url, job, &mapping, &enricher))
            .buffered(self.config.url_concurrency.max(1))
            .collect()
            .await;

        let mut collected = Collected::default();
        let mut succeeded = 0usize;
        for result in results {
            match result {
                Ok((mut page_records, page_warnings)) => {
                    succeeded += 1;
                    collected.records.append(&mut page_records);
                    collected.warnings.extend(page_warnings);
                }
                Err(w) => collected.warnings.push(w),
            }
        }

        if succeeded == 0 {
            return Err(RunOutcome::failed("every URL failed", collected.warnings));
        }
        Ok(collected)
    }

    async fn process_url(
        &self,
        url: &str,
        job: &Job,
        mapping: &CompiledMapping,
        enricher: &Enricher,
    ) -> UrlResult {
        let content = self
            .acquirer
            .acquire(url, job.mode, mapping)
            .await
            .map_err(|e| {
                warn!(url, "acquisition failed: {e}");
                RunWarning {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let extracted = extract(&content, mapping);
        if extracted.is_empty() {
            warn!(url, boundary = %job.mapping.boundary, "no records matched");
        } else {
            info!(url, records = extracted.len(), "Records extracted");
        }

        let outcome = enricher
            .enrich(extracted, content.url(), &job.target_locale)
            .await;
        let warnings = outcome.warnings.into_iter().map(RunWarning::from).collect();
        Ok((outcome.records, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExportColumn, FieldRule};

    fn job(urls: Vec<String>, output: PathBuf) -> Job {
        Job {
            name: "test".into(),
            urls,
            mode: AcquisitionMode::Static,
            mapping: FieldMapping::new(".item", vec![FieldRule::text("title", ".t")]),
            schema: ExportSchema::new("Items", vec![ExportColumn::new("Title", "title", 20.0)]),
            output,
            target_locale: "fr".into(),
            sheet_name: None,
        }
    }

    fn pipeline() -> Pipeline {
        let config = PipelineConfig {
            max_retries: 0,
            http_timeout_ms: 2_000,
            ..PipelineConfig::default()
        };
        Pipeline::with_chromium(config, None)
    }

    #[tokio::test]
    async fn test_empty_url_list_fails_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.xlsx");
        let outcome = pipeline().run(&job(Vec::new(), out.clone())).await;
        assert!(outcome.is_failed());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_invalid_mapping_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.xlsx");
        let mut j = job(vec!["http://127.0.0.1:9/".into()], out.clone());
        j.mapping.boundary = "[[[".into();
        let outcome = pipeline().run(&j).await;
        match outcome {
            RunOutcome::Failed { reason, .. } => assert!(reason.contains("invalid field mapping")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_invalid_sheet_name_fails_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.xlsx");
        let mut j = job(vec!["http://127.0.0.1:9/".into()], out.clone());
        j.sheet_name = Some("Reviews: 2024/10".into());

        match pipeline().run(&j).await {
            RunOutcome::Failed { reason, warnings } => {
                assert!(reason.contains("sheet name"));
                // An unreachable URL would have produced a warning.
                assert!(warnings.is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_all_urls_failing_reports_each() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.xlsx");
        let urls = vec!["http://127.0.0.1:9/a".to_string(), "http://127.0.0.1:9/b".to_string()];
        let outcome = pipeline().run(&job(urls.clone(), out.clone())).await;

        assert!(outcome.is_failed());
        let warned: Vec<&str> = outcome.warnings().iter().map(|w| w.url.as_str()).collect();
        assert_eq!(warned, vec![urls[0].as_str(), urls[1].as_str()]);
        assert!(!out.exists());
    }

    #[test]
    fn test_job_json_defaults() {
        let json = r#"{
            "name": "reviews",
            "urls": ["https://shop.example/dp/1"],
            "mapping": {"boundary": ".review", "rules": []},
            "schema": {"sheet_name": "Sheet1", "columns": []},
            "output": "out.xlsx"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.mode, AcquisitionMode::Static);
        assert_eq!(job.target_locale, "zh-CN");
        assert_eq!(job.effective_schema().sheet_name, "Sheet1");
    }

    #[test]
    fn test_sheet_name_override() {
        let mut j = job(Vec::new(), PathBuf::from("x.xlsx"));
        j.sheet_name = Some("Renamed".into());
        assert_eq!(j.effective_schema().sheet_name, "Renamed");
    }
}
