//! Deterministic stand-in for a browser running Kindle Cloud Reader.
//!
//! Scripts are dispatched by name instead of being evaluated. The fake
//! models the sign-in redirect, a fixture library and progress fixtures,
//! and can stall scripts or navigations to exercise timeouts.

use super::{Script, ScriptRunner};
use crate::error::BridgeError;
use crate::scripts;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
enum Page {
    Blank,
    SignIn { error: bool },
    Challenge,
    Reader,
    Unreachable,
}

#[derive(Debug)]
struct State {
    accounts: Vec<(String, String)>,
    challenged: Vec<String>,
    library: Vec<Value>,
    progress: HashMap<String, Value>,
    page: Page,
    signed_in: bool,
    unreachable: bool,
    blank_after_submit: bool,
    blank_on_load: bool,
    navigations: Vec<String>,
    scripts: Vec<&'static str>,
    stalled_scripts: HashMap<&'static str, usize>,
    stalled_navigations: usize,
    shut_down: bool,
}

/// Handle to a fake browser. Clones share state, so a test can keep one
/// handle for inspection after moving another into a session.
#[derive(Debug, Clone)]
pub(crate) struct FakeKindle {
    state: Arc<Mutex<State>>,
}

impl FakeKindle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                accounts: Vec::new(),
                challenged: Vec::new(),
                library: Vec::new(),
                progress: HashMap::new(),
                page: Page::Blank,
                signed_in: false,
                unreachable: false,
                blank_after_submit: false,
                blank_on_load: false,
                navigations: Vec::new(),
                scripts: Vec::new(),
                stalled_scripts: HashMap::new(),
                stalled_navigations: 0,
                shut_down: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_account(self, username: &str, password: &str) -> Self {
        self.lock()
            .accounts
            .push((username.to_string(), password.to_string()));
        self
    }

    /// Accepts the password but then asks for a one-time code.
    pub fn with_challenge_for(self, username: &str) -> Self {
        self.lock().challenged.push(username.to_string());
        self
    }

    pub fn with_library(self, entries: Vec<Value>) -> Self {
        self.lock().library = entries;
        self
    }

    /// Registers the `ok` progress reply for `asin`, minus the status tag.
    pub fn with_progress(self, asin: &str, reply: Value) -> Self {
        self.lock().progress.insert(asin.to_string(), reply);
        self
    }

    /// Starts with the reader already loaded, as if cookies survived.
    pub fn signed_in(self) -> Self {
        {
            let mut state = self.lock();
            state.signed_in = true;
            state.page = Page::Reader;
        }
        self
    }

    pub fn unreachable(self) -> Self {
        self.lock().unreachable = true;
        self
    }

    /// Leaves a blank page behind any submit, as an unrecognized
    /// interstitial would.
    pub fn blank_after_submit(self) -> Self {
        self.lock().blank_after_submit = true;
        self
    }

    /// Loads complete but never render anything recognizable.
    pub fn blank_on_load(self) -> Self {
        self.lock().blank_on_load = true;
        self
    }

    /// Makes the next `times` runs of `name` hang forever.
    pub fn stall_script(&self, name: &'static str, times: usize) {
        self.lock().stalled_scripts.insert(name, times);
    }

    pub fn stall_next_navigation(&self) {
        self.lock().stalled_navigations += 1;
    }

    /// Drops the server-side session, as an expiry would.
    pub fn expire_session(&self) {
        self.lock().signed_in = false;
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn scripts_run(&self) -> Vec<&'static str> {
        self.lock().scripts.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    fn probe(page: &Page) -> Value {
        let (signin_form, error_banner, challenge_form, reader_frame, url, title) = match page {
            Page::Blank => (false, None, false, false, "about:blank", ""),
            Page::SignIn { error } => (
                true,
                error.then_some("Your password is incorrect"),
                false,
                false,
                "https://www.amazon.com/ap/signin",
                "Amazon Sign-In",
            ),
            Page::Challenge => (
                false,
                None,
                true,
                false,
                "https://www.amazon.com/ap/mfa",
                "Two-Step Verification",
            ),
            Page::Reader => (
                false,
                None,
                false,
                true,
                "https://read.amazon.com/",
                "Kindle Cloud Reader",
            ),
            Page::Unreachable => (
                false,
                None,
                false,
                false,
                "chrome-error://chromewebdata/",
                "read.amazon.com",
            ),
        };
        json!({
            "signin_form": signin_form,
            "error_banner": error_banner,
            "challenge_form": challenge_form,
            "reader_frame": reader_frame,
            "stale": false,
            "url": url,
            "title": title,
        })
    }

    fn dispatch(state: &mut State, script: &Script) -> Result<Option<Value>, BridgeError> {
        let arg = |i: usize| {
            script
                .args()
                .get(i)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let reply = match script.name() {
            scripts::PROBE_PAGE => Self::probe(&state.page),
            scripts::SUBMIT_CREDENTIALS => {
                if !matches!(state.page, Page::SignIn { .. }) {
                    return Ok(Some(json!(false)));
                }
                let (username, password) = (arg(0), arg(1));
                let known = state
                    .accounts
                    .iter()
                    .any(|(u, p)| *u == username && *p == password);
                state.page = if state.blank_after_submit {
                    Page::Blank
                } else if !known {
                    Page::SignIn { error: true }
                } else if state.challenged.contains(&username) {
                    Page::Challenge
                } else {
                    state.signed_in = true;
                    Page::Reader
                };
                json!(true)
            }
            // A page without the reader never becomes ready.
            scripts::READER_READY if state.page != Page::Reader => return Ok(None),
            scripts::READER_READY => json!(true),
            scripts::READER_MARKER => json!(state.page == Page::Reader),
            scripts::LIBRARY_METADATA if state.page != Page::Reader => {
                json!({"__lector_error": "Error: reader application is not loaded"})
            }
            scripts::LIBRARY_METADATA => Value::Array(state.library.clone()),
            scripts::BOOK_METADATA => {
                let asin = arg(0);
                state
                    .library
                    .iter()
                    .find(|entry| entry.get("asin").and_then(Value::as_str) == Some(asin.as_str()))
                    .cloned()
                    .unwrap_or(Value::Null)
            }
            scripts::BOOK_PROGRESS => {
                if state.page != Page::Reader {
                    json!({"status": "signed_out"})
                } else {
                    match state.progress.get(&arg(0)) {
                        Some(reply) => {
                            let mut reply = reply.clone();
                            if let Some(map) = reply.as_object_mut() {
                                map.insert("status".to_string(), json!("ok"));
                            }
                            reply
                        }
                        None => json!({"status": "unknown_book"}),
                    }
                }
            }
            other => {
                return Err(BridgeError::script(other, "ReferenceError: unknown script"));
            }
        };
        Ok(Some(reply))
    }
}

#[async_trait]
impl ScriptRunner for FakeKindle {
    async fn navigate(&mut self, url: &Url) -> Result<(), BridgeError> {
        let stalled = {
            let mut state = self.lock();
            state.navigations.push(url.to_string());
            if state.stalled_navigations > 0 {
                state.stalled_navigations -= 1;
                state.page = Page::Blank;
                true
            } else {
                state.page = if state.unreachable {
                    Page::Unreachable
                } else if state.blank_on_load {
                    Page::Blank
                } else if state.signed_in {
                    Page::Reader
                } else {
                    Page::SignIn { error: false }
                };
                false
            }
        };

        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn run(&mut self, script: &Script) -> Result<Value, BridgeError> {
        let reply = {
            let mut state = self.lock();
            state.scripts.push(script.name());
            let stalled = match state.stalled_scripts.get_mut(script.name()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            if stalled {
                None
            } else {
                Self::dispatch(&mut state, script)?
            }
        };

        match reply {
            Some(value) => Ok(value),
            None => std::future::pending().await,
        }
    }

    async fn shutdown(&mut self) -> Result<(), BridgeError> {
        self.lock().shut_down = true;
        Ok(())
    }
}
