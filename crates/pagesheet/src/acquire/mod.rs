//! Page acquisition: static HTTP fetch or rendered-DOM sampling.
//!
//! Static pages come back as raw HTML for the extractor to parse. Rendered
//! pages are loaded in a freshly launched browser, sampled in-page with the
//! mapping's DOM script, and the browser is torn down before returning,
//! whatever the outcome.

pub mod http_client;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::extract::{CompiledMapping, DomSnapshot, PageContent};
use crate::renderer::{BrowserLauncher, IdlePolicy, NavigationTimeout, RenderContext, Renderer};
use crate::types::{AcquisitionError, AcquisitionMode};
use http_client::HttpClient;

/// Retrieves page content in either acquisition mode.
pub struct PageAcquirer {
    http: HttpClient,
    launcher: Arc<dyn BrowserLauncher>,
    render_timeout: Duration,
    idle: IdlePolicy,
}

impl PageAcquirer {
    pub fn new(
        http: HttpClient,
        launcher: Arc<dyn BrowserLauncher>,
        render_timeout: Duration,
        idle: IdlePolicy,
    ) -> Self {
        Self {
            http,
            launcher,
            render_timeout,
            idle,
        }
    }

    /// Retrieve `url` in the given mode.
    ///
    /// `mapping` is only consulted in rendered mode, where the boundary and
    /// field selectors are evaluated inside the page.
    pub async fn acquire(
        &self,
        url: &str,
        mode: AcquisitionMode,
        mapping: &CompiledMapping,
    ) -> Result<PageContent, AcquisitionError> {
        let start = Instant::now();
        let content = match mode {
            AcquisitionMode::Static => self.acquire_static(url).await?,
            AcquisitionMode::Rendered => self.acquire_rendered(url, mapping).await?,
        };
        info!(
            url,
            %mode,
            duration_ms = start.elapsed().as_millis() as u64,
            "Page acquired"
        );
        Ok(content)
    }

    async fn acquire_static(&self, url: &str) -> Result<PageContent, AcquisitionError> {
        let resp = self.http.get(url).await?;
        Ok(PageContent::Html {
            body: resp.text(),
            url: resp.final_url,
        })
    }

    async fn acquire_rendered(
        &self,
        url: &str,
        mapping: &CompiledMapping,
    ) -> Result<PageContent, AcquisitionError> {
        let renderer = self
            .launcher
            .launch()
            .await
            .map_err(|e| browser_error(url, e))?;

        let result = self.sample_page(renderer.as_ref(), url, mapping).await;

        if let Err(e) = renderer.shutdown().await {
            warn!(url, "browser shutdown failed: {e:#}");
        }
        result.map(PageContent::Dom)
    }

    /// Open one context, sample the page, and close the context on every path.
    async fn sample_page(
        &self,
        renderer: &dyn Renderer,
        url: &str,
        mapping: &CompiledMapping,
    ) -> Result<DomSnapshot, AcquisitionError> {
        let mut context = renderer
            .new_context()
            .await
            .map_err(|e| browser_error(url, e))?;

        let result = self.load_and_sample(context.as_mut(), url, mapping).await;

        if let Err(e) = context.close().await {
            warn!(url, "failed to close browser context: {e:#}");
        }
        result
    }

    async fn load_and_sample(
        &self,
        context: &mut dyn RenderContext,
        url: &str,
        mapping: &CompiledMapping,
    ) -> Result<DomSnapshot, AcquisitionError> {
        let timeout_ms = self.render_timeout.as_millis() as u64;

        let loaded = tokio::time::timeout(self.render_timeout, async {
            let nav = context.navigate(url).await?;
            debug!(url, load_time_ms = nav.load_time_ms, "navigation finished, waiting for idle");
            context.wait_for_idle(&self.idle).await?;
            anyhow::Ok(nav)
        })
        .await;

        let timed_out = || AcquisitionError::Timeout {
            url: url.to_string(),
            timeout_ms,
        };
        let nav = match loaded {
            Err(_) => return Err(timed_out()),
            Ok(Err(e)) if e.chain().any(|c| c.is::<NavigationTimeout>()) => return Err(timed_out()),
            Ok(Err(e)) => return Err(browser_error(url, e)),
            Ok(Ok(nav)) => nav,
        };

        let value = context
            .execute_js(&mapping.dom_script())
            .await
            .map_err(|e| browser_error(url, e))?;

        let mut snapshot: DomSnapshot =
            serde_json::from_value(value).map_err(|e| AcquisitionError::Browser {
                url: url.to_string(),
                message: format!("unexpected DOM sample shape: {e}"),
            })?;
        if snapshot.url.is_empty() {
            snapshot.url = nav.final_url;
        }
        Ok(snapshot)
    }
}

fn browser_error(url: &str, e: anyhow::Error) -> AcquisitionError {
    AcquisitionError::Browser {
        url: url.to_string(),
        message: format!("{e:#}"),
    }
}
