//! Script runner trait and the script model shared by all runners.
//!
//! A runner owns one browser process. It can load a page and evaluate a
//! script inside it; everything the crate knows about the reader application
//! comes back through [`ScriptRunner::execute`].

mod driver;
#[cfg(test)]
pub(crate) mod fake;
mod webdriver;

pub use driver::DriverProcess;
pub use webdriver::WebDriverRunner;

use crate::error::{BridgeError, Phase};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use url::Url;

/// Helpers prepended to every script body.
const PRELUDE: &str = r#"
function readerWindow() {
    var frame = document.getElementById('KindleReaderIFrame');
    if (frame && frame.contentWindow) {
        return frame.contentWindow;
    }
    return window.KindleModuleManager ? window : null;
}
"#;

/// Where a script runs.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Stay on the page currently loaded.
    Current,
    /// Load this page first.
    Url(&'a Url),
}

/// How a script reports its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// The body `return`s its value.
    Sync,
    /// The body calls `done(value)` when finished.
    Async,
}

/// A named in-page script plus the JSON arguments passed alongside it.
///
/// Arguments travel out-of-band (WebDriver `arguments`), so callers never
/// splice values into the source. Inside the body they are available as
/// `args`.
#[derive(Clone)]
pub struct Script {
    name: &'static str,
    body: &'static str,
    mode: ScriptMode,
    args: Vec<Value>,
}

impl Script {
    pub fn sync(name: &'static str, body: &'static str) -> Self {
        Self {
            name,
            body,
            mode: ScriptMode::Sync,
            args: Vec::new(),
        }
    }

    pub fn asynchronous(name: &'static str, body: &'static str) -> Self {
        Self {
            name,
            body,
            mode: ScriptMode::Async,
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn mode(&self) -> ScriptMode {
        self.mode
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Full source as handed to the browser.
    pub fn render(&self) -> String {
        match self.mode {
            ScriptMode::Sync => format!(
                "{PRELUDE}\nreturn (function (args) {{\n{}\n}})(Array.prototype.slice.call(arguments));",
                self.body
            ),
            ScriptMode::Async => format!(
                "{PRELUDE}\nvar __args = Array.prototype.slice.call(arguments);\nvar __done = __args.pop();\n(function (args, done) {{\ntry {{\n{}\n}} catch (e) {{ done({{__lector_error: String(e)}}); }}\n}})(__args, __done);",
                self.body
            ),
        }
    }
}

// Arguments may carry credentials.
impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("args", &format_args!("<{} redacted>", self.args.len()))
            .finish()
    }
}

/// Converts an in-page failure reported by an async body into an error.
///
/// Async bodies cannot throw across the callback boundary, so the wrapper in
/// [`Script::render`] reports exceptions as `{"__lector_error": "..."}`.
pub fn check_script_error(script: &Script, value: Value) -> Result<Value, BridgeError> {
    if let Some(message) = value.get("__lector_error").and_then(Value::as_str) {
        return Err(BridgeError::script(script.name(), message));
    }
    Ok(value)
}

/// A headless browser process that can load pages and evaluate scripts.
///
/// Calls take `&mut self`: one process never runs two scripts at once.
#[async_trait]
pub trait ScriptRunner: Send {
    /// Loads `url` and waits for the page's load-complete signal.
    async fn navigate(&mut self, url: &Url) -> Result<(), BridgeError>;

    /// Evaluates `script` on the current page and returns its JSON result.
    async fn run(&mut self, script: &Script) -> Result<Value, BridgeError>;

    /// Releases the browser process.
    async fn shutdown(&mut self) -> Result<(), BridgeError>;

    /// Optionally navigates, then runs `script`, all within one deadline.
    async fn execute(
        &mut self,
        target: Target<'_>,
        script: &Script,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let deadline = Instant::now() + timeout;

        if let Target::Url(url) = target {
            tracing::debug!(url = %url, "navigating");
            timeout_at(deadline, self.navigate(url))
                .await
                .map_err(|_| BridgeError::Timeout {
                    phase: Phase::Navigation,
                    after: timeout,
                })??;
        }

        tracing::debug!(script = script.name(), "running page script");
        let value = timeout_at(deadline, self.run(script))
            .await
            .map_err(|_| BridgeError::Timeout {
                phase: Phase::Script,
                after: timeout,
            })??;

        check_script_error(script, value)
    }
}

/// Re-runs `script` on the current page until `accept` yields a value.
///
/// `accept` sees every attempt's outcome, so it can treat a script error on a
/// page that is mid-navigation as "not yet". Each attempt is bounded by what
/// is left of `timeout`; once the budget is spent the call fails with a
/// script-phase timeout.
pub async fn poll_until<R, T, F>(
    runner: &mut R,
    script: &Script,
    timeout: Duration,
    interval: Duration,
    mut accept: F,
) -> Result<T, BridgeError>
where
    R: ScriptRunner + ?Sized,
    F: FnMut(Result<Value, BridgeError>) -> Result<Option<T>, BridgeError> + Send,
{
    let deadline = Instant::now() + timeout;
    let expired = || BridgeError::Timeout {
        phase: Phase::Script,
        after: timeout,
    };

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(expired());
        }

        let value = runner.execute(Target::Current, script, remaining).await;
        if let Err(BridgeError::Timeout { .. }) = value {
            return Err(expired());
        }

        if let Some(found) = accept(value)? {
            return Ok(found);
        }

        if Instant::now() + interval >= deadline {
            return Err(expired());
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeKindle;
    use serde_json::json;

    #[test]
    fn test_render_sync_wraps_body() {
        let script = Script::sync("probe", "return 1;");
        let source = script.render();
        assert!(source.contains("function readerWindow()"));
        assert!(source.contains("return (function (args) {"));
        assert!(source.contains("return 1;"));
    }

    #[test]
    fn test_render_async_pops_callback() {
        let script = Script::asynchronous("lib", "done(args[0]);").arg("x");
        let source = script.render();
        assert!(source.contains("var __done = __args.pop();"));
        assert!(source.contains("done(args[0]);"));
        assert_eq!(script.args(), &[json!("x")]);
    }

    #[test]
    fn test_debug_hides_args() {
        let script = Script::sync("submit", "return true;").arg("hunter2");
        let debug = format!("{:?}", script);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<1 redacted>"));
    }

    #[test]
    fn test_check_script_error() {
        let script = Script::asynchronous("lib", "");
        let err = check_script_error(&script, json!({"__lector_error": "boom"})).unwrap_err();
        assert!(matches!(err, BridgeError::Script { ref message, .. } if message == "boom"));

        let ok = check_script_error(&script, json!([1, 2])).unwrap();
        assert_eq!(ok, json!([1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out_on_stalled_script() {
        let fake = FakeKindle::new().signed_in();
        fake.stall_script(crate::scripts::READER_MARKER, 1);
        let mut runner = fake.clone();

        let err = runner
            .execute(
                Target::Current,
                &crate::scripts::reader_marker(),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Timeout {
                phase: Phase::Script,
                ..
            }
        ));

        let value = runner
            .execute(
                Target::Current,
                &crate::scripts::reader_marker(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(value, json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out_on_stalled_navigation() {
        let fake = FakeKindle::new();
        fake.stall_next_navigation();
        let mut runner = fake.clone();
        let url = Url::parse("https://read.amazon.com").unwrap();

        let err = runner
            .execute(
                Target::Url(&url),
                &crate::scripts::probe_page(),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(err.is_navigation_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_gives_up() {
        let mut runner = FakeKindle::new();
        let err = poll_until(
            &mut runner,
            &crate::scripts::reader_marker(),
            Duration::from_secs(2),
            Duration::from_millis(250),
            |value| Ok(value?.as_bool().filter(|ready| *ready)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
    }
}
