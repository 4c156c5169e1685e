//! WebDriver executable management.
//!
//! Optionally spawns a driver (chromedriver, geckodriver) and waits for its
//! `/status` endpoint to report ready before a session is opened.

use crate::error::BridgeError;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// A driver process spawned by Lector. Killed on drop.
#[derive(Debug)]
pub struct DriverProcess {
    child: Child,
    port: u16,
}

impl DriverProcess {
    /// Spawns `command` (looked up on `PATH`) listening on `port`.
    pub fn spawn(command: &str, port: u16) -> Result<Self, BridgeError> {
        let program = which::which(command)
            .map_err(|e| BridgeError::Browser(format!("driver '{}' not found: {}", command, e)))?;

        let child = Command::new(&program)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BridgeError::Browser(format!("failed to start {}: {}", program.display(), e))
            })?;

        tracing::info!(driver = %program.display(), port, "spawned WebDriver");
        Ok(Self { child, port })
    }

    /// Endpoint the spawned driver serves.
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub async fn kill(&mut self) -> Result<(), BridgeError> {
        self.child
            .kill()
            .await
            .map_err(|e| BridgeError::Browser(format!("failed to stop driver: {}", e)))
    }
}

/// `GET /status` reply body.
#[derive(Debug, Deserialize)]
struct StatusReply {
    value: StatusValue,
}

#[derive(Debug, Deserialize)]
struct StatusValue {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    message: String,
}

/// Polls `<webdriver_url>/status` until the driver accepts new sessions.
pub async fn wait_until_ready(
    webdriver_url: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), BridgeError> {
    let client = reqwest::Client::builder()
        .timeout(interval.max(Duration::from_secs(1)))
        .build()
        .map_err(|e| BridgeError::Browser(e.to_string()))?;
    let status_url = format!("{}/status", webdriver_url.trim_end_matches('/'));
    let deadline = Instant::now() + timeout;
    let mut last_problem = String::from("no reply");

    loop {
        match client.get(&status_url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<StatusReply>().await {
                    Ok(reply) if reply.value.ready => return Ok(()),
                    Ok(reply) => last_problem = format!("not ready: {}", reply.value.message),
                    Err(e) => last_problem = format!("unreadable status: {}", e),
                }
            }
            Ok(response) => last_problem = format!("HTTP {}", response.status()),
            Err(e) => last_problem = e.to_string(),
        }

        if Instant::now() + interval >= deadline {
            return Err(BridgeError::Browser(format!(
                "WebDriver at {} unavailable ({})",
                webdriver_url, last_problem
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_missing_driver() {
        let err = DriverProcess::spawn("lector-no-such-driver-binary", 9515).unwrap_err();
        assert!(matches!(err, BridgeError::Browser(ref m) if m.contains("not found")));
    }

    #[test]
    fn test_status_reply_parsing() {
        let reply: StatusReply =
            serde_json::from_str(r#"{"value": {"ready": true, "message": "ChromeDriver ready"}}"#)
                .unwrap();
        assert!(reply.value.ready);

        let reply: StatusReply = serde_json::from_str(r#"{"value": {}}"#).unwrap();
        assert!(!reply.value.ready);
    }

    #[tokio::test]
    async fn test_wait_until_ready_unreachable() {
        let err = wait_until_ready(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::Browser(ref m) if m.contains("unavailable")));
    }
}
