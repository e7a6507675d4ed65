//! Job files as a user would write them by hand.

use std::path::PathBuf;

use pagesheet::{AcquisitionMode, ExtractionKind, ValueParser};
use pagesheet_cli::{resolve_job, JobFile};

const HAND_WRITTEN: &str = r##"{
  "job": {
    "name": "campaigns",
    "urls": ["https://www.indiegogo.com/projects/demo/x/1#/"],
    "mode": "rendered",
    "mapping": {
      "boundary": "body",
      "rules": [
        {"name": "name", "selector": ".basicsSection-title", "kind": "text"},
        {"name": "link", "kind": "page_url"},
        {"name": "start", "selector": ".deadline", "kind": "text", "parser": "range_start"},
        {"name": "end", "selector": ".goal-met", "kind": "text", "parser": {"after": "on"}}
      ]
    },
    "schema": {
      "sheet_name": "Campaigns",
      "columns": [
        {"header": "Name", "key": "name", "width": 30},
        {"header": "Link", "key": "link", "width": 50}
      ]
    },
    "output": "out/campaigns.xlsx",
    "target_locale": "en"
  },
  "settings": {"render_timeout_ms": 90000, "url_concurrency": 2}
}"##;

fn write_job(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("job.json");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_hand_written_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_job(&dir, HAND_WRITTEN);

    let file = resolve_job(None, Some(&path)).unwrap();

    assert_eq!(file.job.mode, AcquisitionMode::Rendered);
    assert_eq!(file.job.mapping.rules[1].kind, ExtractionKind::PageUrl);
    assert_eq!(file.job.mapping.rules[2].parser, ValueParser::RangeStart);
    assert_eq!(file.job.mapping.rules[3].parser, ValueParser::After("on".into()));
    assert_eq!(file.job.schema.columns[1].width, 50.0);
    assert_eq!(file.job.output, PathBuf::from("out/campaigns.xlsx"));

    let settings = file.settings.clone().unwrap();
    assert_eq!(settings.render_timeout_ms, 90_000);
    assert_eq!(settings.url_concurrency, 2);
    assert_eq!(settings.enrich_concurrency, 4);
}

#[test]
fn test_malformed_job_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_job(&dir, r#"{"job": {"name": "x"}}"#);
    let err = resolve_job(None, Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("parsing job file"));
}

#[test]
fn test_preset_template_parses_back() {
    let file = resolve_job(Some("amazon-reviews"), None).unwrap();
    let json = serde_json::to_string(&file).unwrap();
    let parsed: JobFile = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.job, file.job);
    assert!(parsed.settings.is_none());
}
