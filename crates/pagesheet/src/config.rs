//! Pipeline settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acquire::http_client::DEFAULT_USER_AGENT;
use crate::renderer::IdlePolicy;

/// Tunables for one pipeline run. Every field has a default, so a job file
/// may give any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub user_agent: String,
    pub http_timeout_ms: u64,
    /// Retries for 5xx/429 responses.
    pub max_retries: u32,
    pub render_timeout_ms: u64,
    pub idle: IdlePolicy,
    pub enrich_concurrency: usize,
    pub url_concurrency: usize,
    pub image_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chromium_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_ms: 30_000,
            max_retries: 2,
            render_timeout_ms: 60_000,
            idle: IdlePolicy::default(),
            enrich_concurrency: 4,
            url_concurrency: 1,
            image_timeout_ms: 20_000,
            chromium_path: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `PAGESHEET_USER_AGENT`, `PAGESHEET_CHROMIUM_PATH` and
    /// `PAGESHEET_RENDER_TIMEOUT_MS` on top of `self`.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ua) = lookup("PAGESHEET_USER_AGENT").filter(|v| !v.is_empty()) {
            self.user_agent = ua;
        }
        if let Some(path) = lookup("PAGESHEET_CHROMIUM_PATH").filter(|v| !v.is_empty()) {
            self.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = lookup("PAGESHEET_RENDER_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.render_timeout_ms = ms;
        }
        self
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_settings_keep_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"url_concurrency": 3, "idle": {"quiet_ms": 1000, "poll_ms": 50}}"#)
                .unwrap();
        assert_eq!(cfg.url_concurrency, 3);
        assert_eq!(cfg.idle.quiet_ms, 1000);
        assert_eq!(cfg.render_timeout_ms, 60_000);
        assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PAGESHEET_USER_AGENT", "pagesheet-test/1.0"),
            ("PAGESHEET_CHROMIUM_PATH", "/opt/chrome/chrome"),
            ("PAGESHEET_RENDER_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let cfg = PipelineConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.user_agent, "pagesheet-test/1.0");
        assert_eq!(cfg.chromium_path, Some(PathBuf::from("/opt/chrome/chrome")));
        assert_eq!(cfg.render_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_bad_timeout_override_ignored() {
        let cfg = PipelineConfig::default().with_overrides(|k| {
            (k == "PAGESHEET_RENDER_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert_eq!(cfg.render_timeout_ms, 60_000);
    }
}
