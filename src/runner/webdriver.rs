//! [`ScriptRunner`] backed by a W3C WebDriver session.

use super::driver::{DriverProcess, wait_until_ready};
use super::{Script, ScriptMode, ScriptRunner};
use crate::config::{BrowserConfig, BrowserKind, Config};
use crate::error::BridgeError;
use async_trait::async_trait;
use fantoccini::wd::{Capabilities, TimeoutConfiguration};
use fantoccini::{Client, ClientBuilder};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

/// Titles browsers give their own error pages.
const LOAD_ERROR_TITLES: &[&str] = &["Problem loading page", "Server Not Found"];

/// Headroom given to WebDriver's own timeouts over the crate's deadlines.
const DRIVER_TIMEOUT_HEADROOM: Duration = Duration::from_secs(5);

/// Drives a real browser through fantoccini.
pub struct WebDriverRunner {
    client: Option<Client>,
    driver: Option<DriverProcess>,
}

impl WebDriverRunner {
    /// Starts (or connects to) a WebDriver endpoint and opens a browser.
    pub async fn launch(config: &Config) -> Result<Self, BridgeError> {
        let browser = &config.browser;
        let timeouts = &config.timeouts;

        let driver = match &browser.driver_command {
            Some(command) => Some(DriverProcess::spawn(command, browser.driver_port)?),
            None => None,
        };
        let endpoint = driver
            .as_ref()
            .map(DriverProcess::url)
            .unwrap_or_else(|| browser.webdriver_url.clone());

        wait_until_ready(&endpoint, timeouts.driver_start(), timeouts.poll_interval()).await?;

        let client = ClientBuilder::native()
            .capabilities(capabilities(browser, &config.reader.user_agent))
            .connect(&endpoint)
            .await
            .map_err(|e| BridgeError::Browser(format!("failed to open session: {}", e)))?;

        let driver_timeout = timeouts.longest() + DRIVER_TIMEOUT_HEADROOM;
        client
            .update_timeouts(TimeoutConfiguration::new(
                Some(driver_timeout),
                Some(driver_timeout),
                None,
            ))
            .await
            .map_err(|e| BridgeError::Browser(format!("failed to set timeouts: {}", e)))?;

        if !browser.headless {
            client
                .set_window_size(browser.window_width, browser.window_height)
                .await
                .map_err(|e| BridgeError::Browser(format!("failed to size window: {}", e)))?;
        }

        tracing::info!(endpoint = %endpoint, kind = ?browser.kind, "browser session opened");
        Ok(Self {
            client: Some(client),
            driver,
        })
    }

    fn client(&self) -> Result<&Client, BridgeError> {
        self.client.as_ref().ok_or(BridgeError::SessionClosed)
    }
}

/// Session capabilities for the configured engine.
fn capabilities(browser: &BrowserConfig, user_agent: &str) -> Capabilities {
    let size = format!("--window-size={},{}", browser.window_width, browser.window_height);
    let mut caps = Capabilities::new();

    match browser.kind {
        BrowserKind::Chrome => {
            let mut args = vec![
                format!("--user-agent={}", user_agent),
                size,
                "--disable-gpu".to_string(),
            ];
            if browser.headless {
                args.push("--headless=new".to_string());
            }
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
        BrowserKind::Firefox => {
            let mut args = vec![
                format!("--width={}", browser.window_width),
                format!("--height={}", browser.window_height),
            ];
            if browser.headless {
                args.push("-headless".to_string());
            }
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert(
                "moz:firefoxOptions".to_string(),
                json!({
                    "args": args,
                    "prefs": { "general.useragent.override": user_agent },
                }),
            );
        }
    }

    caps
}

#[async_trait]
impl ScriptRunner for WebDriverRunner {
    /// Only the browser's own error pages fail here. WebDriver does not
    /// expose the HTTP status, so a server error page loads normally and is
    /// caught by the page probe or the reader marker check instead.
    async fn navigate(&mut self, url: &Url) -> Result<(), BridgeError> {
        let client = self.client()?;
        let failed = |message: String| BridgeError::Navigation {
            url: url.to_string(),
            message,
        };

        client.goto(url.as_str()).await.map_err(|e| failed(e.to_string()))?;

        let landed = client.current_url().await.map_err(|e| failed(e.to_string()))?;
        let error_page = landed.scheme() == "chrome-error"
            || (landed.scheme() == "about" && landed.path() == "neterror");
        if error_page {
            return Err(failed(format!("browser error page at {}", landed)));
        }

        let title = client.title().await.map_err(|e| failed(e.to_string()))?;
        if LOAD_ERROR_TITLES.contains(&title.as_str()) {
            return Err(failed(title));
        }

        Ok(())
    }

    async fn run(&mut self, script: &Script) -> Result<Value, BridgeError> {
        let client = self.client()?;
        let source = script.render();
        let args = script.args().to_vec();

        let result = match script.mode() {
            ScriptMode::Sync => client.execute(&source, args).await,
            ScriptMode::Async => client.execute_async(&source, args).await,
        };

        result.map_err(|e| BridgeError::script(script.name(), e.to_string()))
    }

    async fn shutdown(&mut self) -> Result<(), BridgeError> {
        let closed = match self.client.take() {
            Some(client) => client
                .close()
                .await
                .map_err(|e| BridgeError::Browser(format!("failed to close session: {}", e))),
            None => Ok(()),
        };

        if let Some(mut driver) = self.driver.take() {
            driver.kill().await?;
        }

        closed
    }
}
