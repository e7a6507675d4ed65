//! Headless Chromium sessions via chromiumoxide.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserLauncher, NavigationResult, NavigationTimeout, RenderContext, Renderer};

const BROWSER_ARGS: &[&str] = &[
    "--headless=new",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-networking",
    "--mute-audio",
];

const PATH_BINARIES: &[&str] = &["google-chrome", "chromium", "chromium-browser"];

const MACOS_CHROME: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";

/// Locate a Chromium executable.
///
/// Tries, in order: `explicit`, `PAGESHEET_CHROMIUM_PATH`, a browser unpacked
/// under `~/.pagesheet/chromium/`, the binaries on `PATH`, and finally the
/// stock macOS Chrome install.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    let from_env = std::env::var_os("PAGESHEET_CHROMIUM_PATH").map(PathBuf::from);
    let unpacked = dirs::home_dir()
        .map(|home| home.join(".pagesheet").join("chromium"))
        .into_iter()
        .flat_map(|dir| [dir.join("chrome-linux64").join("chrome"), dir.join("chrome")]);

    explicit
        .cloned()
        .into_iter()
        .chain(from_env)
        .chain(unpacked)
        .find(|p| p.exists())
        .or_else(|| PATH_BINARIES.iter().find_map(|bin| which::which(bin).ok()))
        .or_else(|| {
            let mac = Path::new(MACOS_CHROME);
            (cfg!(target_os = "macos") && mac.exists()).then(|| mac.to_path_buf())
        })
}

/// Launches one headless Chromium per acquisition.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    request_timeout: Duration,
}

impl ChromiumLauncher {
    /// `request_timeout` bounds every CDP call, navigations included. Pass the
    /// render timeout so the browser never gives up before the acquirer does.
    pub fn new(executable: Option<PathBuf>, request_timeout: Duration) -> Self {
        Self {
            executable,
            request_timeout,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let session = ChromiumSession::start(self.executable.as_ref(), self.request_timeout).await?;
        Ok(Box::new(session))
    }
}

/// One running Chromium process plus its CDP event pump.
pub struct ChromiumSession {
    browser: Browser,
    pump: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn start(executable: Option<&PathBuf>, request_timeout: Duration) -> Result<Self> {
        let executable = find_chromium(executable).ok_or_else(|| {
            anyhow!("no Chromium executable found; set PAGESHEET_CHROMIUM_PATH or chromium_path")
        })?;
        debug!(executable = %executable.display(), "Starting Chromium");

        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .args(BROWSER_ARGS.iter().copied())
            .request_timeout(request_timeout)
            .build()
            .map_err(|e| anyhow!("invalid browser config: {e}"))?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .context("Chromium did not start")?;

        // The CDP connection only makes progress while its event stream is polled.
        let pump = tokio::spawn(async move { while events.next().await.is_some() {} });

        Ok(Self { browser, pump })
    }
}

#[async_trait]
impl Renderer for ChromiumSession {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("could not open a tab")?;
        Ok(Box::new(ChromiumTab { page }))
    }

    async fn shutdown(mut self: Box<Self>) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Chromium refused to close ({e}); killing process");
            if let Some(Err(e)) = self.browser.kill().await {
                warn!("could not kill Chromium: {e}");
            }
        }
        if let Err(e) = self.browser.wait().await {
            warn!("could not reap Chromium: {e}");
        }
        self.pump.abort();
        debug!("Chromium stopped");
        Ok(())
    }
}

/// A Chromium tab.
pub struct ChromiumTab {
    page: Page,
}

#[async_trait]
impl RenderContext for ChromiumTab {
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult> {
        let started = Instant::now();
        match self.page.goto(url).await {
            Ok(_) => {}
            Err(CdpError::Timeout) => return Err(NavigationTimeout.into()),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("could not load {url}"))),
        }

        let final_url = match self.page.url().await {
            Ok(Some(u)) => u,
            _ => url.to_string(),
        };
        Ok(NavigationResult {
            final_url,
            load_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .context("script evaluation failed")?
            .into_value()
            .map_err(|e| anyhow!("script returned a non-JSON value: {e:?}"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Err(e) = self.page.close().await {
            debug!("tab already gone: {e}");
        }
        Ok(())
    }
}
