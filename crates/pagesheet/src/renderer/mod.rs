//! Browser sessions for rendered-mode acquisition.
//!
//! [`BrowserLauncher`] starts a browser, [`Renderer`] is that running
//! browser, and [`RenderContext`] is one tab in it. Chromium (through
//! chromiumoxide) is the only engine today; tests substitute in-memory fakes.

pub mod chromium;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where a navigation ended up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// URL after redirects.
    pub final_url: String,
    pub load_time_ms: u64,
}

/// Returned by [`RenderContext::navigate`] when the engine gave up waiting
/// for the page to load.
#[derive(Debug, thiserror::Error)]
#[error("navigation timed out")]
pub struct NavigationTimeout;

/// Page-side check sampled by [`RenderContext::wait_for_idle`]. The
/// resource-timing buffer holds 250 entries by default, and a full buffer
/// would freeze the count.
pub const IDLE_SCRIPT: &str = "(() => { \
    performance.setResourceTimingBufferSize(100000); \
    return [document.readyState, performance.getEntriesByType('resource').length]; \
})()";

/// When a rendered page counts as settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlePolicy {
    /// How long the resource count must stay unchanged.
    pub quiet_ms: u64,
    /// How often the page is sampled while waiting.
    pub poll_ms: u64,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            quiet_ms: 500,
            poll_ms: 100,
        }
    }
}

impl IdlePolicy {
    pub fn quiet(&self) -> Duration {
        Duration::from_millis(self.quiet_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(10))
    }
}

/// Starts isolated browser instances.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a fresh browser owned by the caller.
    async fn launch(&self) -> Result<Box<dyn Renderer>>;
}

/// A running browser, owned by one acquisition.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a tab.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine and reap its process.
    async fn shutdown(self: Box<Self>) -> Result<()>;
}

/// One browser tab.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Load `url`, returning once the load event fired. An engine-side
    /// timeout is reported as [`NavigationTimeout`].
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult>;
    /// Evaluate `script` in the page and return its JSON result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    async fn close(self: Box<Self>) -> Result<()>;

    /// Wait until the document is complete and no new resources have been
    /// requested for `policy.quiet_ms`. Unbounded; callers apply a timeout.
    async fn wait_for_idle(&self, policy: &IdlePolicy) -> Result<()> {
        let mut last_count: Option<u64> = None;
        let mut quiet_since = tokio::time::Instant::now();

        loop {
            let state = self.execute_js(IDLE_SCRIPT).await?;
            let ready = state.get(0).and_then(|v| v.as_str()) == Some("complete");
            let count = state.get(1).and_then(|v| v.as_u64()).unwrap_or(0);

            if last_count != Some(count) || !ready {
                last_count = Some(count);
                quiet_since = tokio::time::Instant::now();
            } else if quiet_since.elapsed() >= policy.quiet() {
                return Ok(());
            }

            tokio::time::sleep(policy.poll()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Reports a growing resource count for the first few samples, then holds.
    struct SettlingPage {
        scripts: Mutex<Vec<String>>,
        growth: u64,
    }

    #[async_trait]
    impl RenderContext for SettlingPage {
        async fn navigate(&mut self, url: &str) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }

        async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.push(script.to_string());
            let count = (scripts.len() as u64).min(self.growth);
            Ok(serde_json::json!(["complete", count]))
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_idle_waits_for_resource_count_to_settle() {
        let page = SettlingPage {
            scripts: Mutex::new(Vec::new()),
            growth: 5,
        };
        let policy = IdlePolicy {
            quiet_ms: 30,
            poll_ms: 10,
        };

        page.wait_for_idle(&policy).await.unwrap();

        let scripts = page.scripts.lock().unwrap();
        assert!(scripts.len() > 5);
        assert!(scripts
            .iter()
            .all(|s| s.contains("setResourceTimingBufferSize")));
    }

    #[test]
    fn test_idle_script_lifts_resource_buffer_before_counting() {
        let lift = IDLE_SCRIPT.find("setResourceTimingBufferSize").unwrap();
        let count = IDLE_SCRIPT.find("getEntriesByType").unwrap();
        assert!(lift < count);
    }
}
