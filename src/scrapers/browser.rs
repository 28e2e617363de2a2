use crate::error::FetchError;
use crate::scrapers::fetch::PageFetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reloads attempted while the page still shows unrendered `{{ }}` templates
const MAX_RELOADS: usize = 3;

/// Fetcher for listing pages that are rendered client-side, using headless Chrome
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    settle: Duration,
}

impl BrowserFetcher {
    /// Launch headless Chrome. `settle` is how long a page gets to render after navigation.
    pub fn launch(settle: Duration) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser: Arc::new(browser),
            settle,
        })
    }
}

/// Template markers left behind when the page scripts have not run yet
pub fn has_unrendered_templates(html: &str) -> bool {
    html.contains("{{") && html.contains("}}")
}

/// Run `work` against `tab`, then `close` it whether or not the work succeeded
fn with_tab<T, R>(tab: T, work: impl FnOnce(&T) -> Result<R>, close: impl FnOnce(&T)) -> Result<R> {
    let result = work(&tab);
    close(&tab);
    result
}

fn load(tab: &Tab, url: &str, settle: Duration) -> Result<String> {
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;
    thread::sleep(settle);

    let mut html = tab.get_content()?;
    let mut reloads = 0;
    while has_unrendered_templates(&html) && reloads < MAX_RELOADS {
        debug!(url, reloads, "Page still has unrendered templates, reloading");
        thread::sleep(Duration::from_secs(5));
        tab.reload(false, None)?;
        thread::sleep(Duration::from_secs(3));
        html = tab.get_content()?;
        reloads += 1;
    }
    Ok(html)
}

fn render(browser: &Browser, url: &str, settle: Duration) -> Result<String> {
    let tab = browser.new_tab()?;
    with_tab(
        tab,
        |tab| load(tab, url, settle),
        |tab| {
            if let Err(e) = tab.close(true) {
                warn!(url, error = %e, "Failed to close tab");
            }
        },
    )
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let browser = Arc::clone(&self.browser);
        let settle = self.settle;
        let target = url.to_string();

        tokio::task::spawn_blocking(move || render(&browser, &target, settle))
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?
            .map_err(|e| FetchError::Browser(format!("{url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_template_placeholders() {
        assert!(has_unrendered_templates("<h2>{{ imovel.titulo }}</h2>"));
        assert!(!has_unrendered_templates("<h2>Apartamento 3 quartos</h2>"));
    }

    #[test]
    fn tab_is_closed_when_loading_fails() {
        let closed = std::cell::Cell::new(false);
        let result: Result<String> = with_tab(
            "tab",
            |_| anyhow::bail!("navigation failed"),
            |_| closed.set(true),
        );
        assert!(result.is_err());
        assert!(closed.get());
    }
}
