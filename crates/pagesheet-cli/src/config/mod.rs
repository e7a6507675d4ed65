//! Job loading and credential resolution.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use pagesheet::{preset, Job, PipelineConfig, PRESET_NAMES};

/// On-disk job file: the job plus optional pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    pub job: Job,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<PipelineConfig>,
}

impl JobFile {
    /// Settings from the file (or defaults) with environment overrides on top.
    pub fn effective_settings(&self) -> PipelineConfig {
        self.settings.clone().unwrap_or_default().with_env()
    }
}

/// Read and parse a JSON job file.
pub fn load_job_file(path: &Path) -> anyhow::Result<JobFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing job file {}", path.display()))
}

/// Pick the job to run from either a preset name or a job file.
pub fn resolve_job(preset_name: Option<&str>, job_path: Option<&Path>) -> anyhow::Result<JobFile> {
    match (preset_name, job_path) {
        (Some(_), Some(_)) => bail!("--preset and --job are mutually exclusive"),
        (Some(name), None) => {
            let job = preset(name).with_context(|| {
                format!("unknown preset '{name}' (available: {})", PRESET_NAMES.join(", "))
            })?;
            Ok(JobFile { job, settings: None })
        }
        (None, Some(path)) => load_job_file(path),
        (None, None) => bail!("either --preset or --job is required"),
    }
}

/// Replace the job's URLs and/or output path.
pub fn apply_overrides(job: &mut Job, urls: Vec<String>, output: Option<PathBuf>) {
    if !urls.is_empty() {
        job.urls = urls;
    }
    if let Some(output) = output {
        job.output = output;
    }
}

/// Resolve the translation API key: flag, then `PAGESHEET_TRANSLATE_KEY`,
/// then `GOOGLE_TRANSLATE_API_KEY`.
pub fn resolve_translate_key(explicit: Option<&str>) -> Option<String> {
    resolve_key_with(explicit, |k| std::env::var(k).ok())
}

fn resolve_key_with(explicit: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    ["PAGESHEET_TRANSLATE_KEY", "GOOGLE_TRANSLATE_API_KEY"]
        .into_iter()
        .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_key_precedence() {
        let env = |k: &str| match k {
            "PAGESHEET_TRANSLATE_KEY" => Some("from-pagesheet".to_string()),
            "GOOGLE_TRANSLATE_API_KEY" => Some("from-google".to_string()),
            _ => None,
        };
        assert_eq!(resolve_key_with(Some("flag"), env).as_deref(), Some("flag"));
        assert_eq!(resolve_key_with(None, env).as_deref(), Some("from-pagesheet"));
        assert_eq!(resolve_key_with(Some(""), env).as_deref(), Some("from-pagesheet"));

        let google_only = |k: &str| (k == "GOOGLE_TRANSLATE_API_KEY").then(|| "g".to_string());
        assert_eq!(resolve_key_with(None, google_only).as_deref(), Some("g"));
        assert_eq!(resolve_key_with(None, |_| None), None);
    }

    #[test]
    fn test_resolve_preset_and_conflicts() {
        let file = resolve_job(Some("amazon-reviews"), None).unwrap();
        assert_eq!(file.job.name, "amazon-reviews");
        assert!(resolve_job(Some("nope"), None).is_err());
        assert!(resolve_job(None, None).is_err());
        assert!(resolve_job(Some("amazon-reviews"), Some(Path::new("job.json"))).is_err());
    }

    #[test]
    fn test_load_job_file_round_trips_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        let original = JobFile {
            job: preset("indiegogo-projects").unwrap(),
            settings: Some(PipelineConfig {
                url_concurrency: 2,
                ..PipelineConfig::default()
            }),
        };
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(serde_json::to_string_pretty(&original).unwrap().as_bytes())
            .unwrap();

        let loaded = load_job_file(&path).unwrap();
        assert_eq!(loaded.job, original.job);
        assert_eq!(loaded.settings.unwrap().url_concurrency, 2);
    }

    #[test]
    fn test_load_job_file_reports_path() {
        let err = load_job_file(Path::new("/definitely/missing/job.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/missing/job.json"));
    }

    #[test]
    fn test_overrides() {
        let mut job = preset("amazon-reviews").unwrap();
        apply_overrides(&mut job, Vec::new(), None);
        assert_eq!(job.urls.len(), 1);

        apply_overrides(
            &mut job,
            vec!["https://a.example/1".into(), "https://a.example/2".into()],
            Some(PathBuf::from("out/x.xlsx")),
        );
        assert_eq!(job.urls.len(), 2);
        assert_eq!(job.output, PathBuf::from("out/x.xlsx"));
    }
}
