//! Sign-in flow for Kindle Cloud Reader.
//!
//! The reader home redirects to the Amazon sign-in form when there is no
//! session. The authenticator fills the form once, then classifies whatever
//! page follows. It never retries: a second submit with the same
//! credentials can lock the account or loop on a challenge.

use crate::config::{Config, ReaderConfig, TimeoutsConfig};
use crate::credentials::Credentials;
use crate::error::{AuthError, BridgeError};
use crate::runner::{ScriptRunner, Target, poll_until};
use crate::scripts;
use crate::session::Session;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

/// Sign-in URLs that ask for a second factor, a captcha, or account
/// verification.
static CHALLENGE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/ap/(mfa|cvf|challenge|captcha)").unwrap());

/// Error pages browsers show instead of the requested URL.
static LOAD_ERROR_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(chrome-error:|about:neterror)").unwrap());

/// Raw page signals reported by the probe script.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageProbe {
    pub signin_form: bool,
    pub error_banner: Option<String>,
    pub challenge_form: bool,
    pub reader_frame: bool,
    /// The document the credentials were submitted from is still showing.
    pub stale: bool,
    pub url: String,
    pub title: String,
}

/// What the browser is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// The reader application.
    Reader,
    /// The sign-in form, with the error banner text if one is shown.
    SignIn { error: Option<String> },
    /// A verification step the crate cannot complete.
    Challenge(String),
    /// The browser's own error page.
    LoadError(String),
    /// Still loading, or nothing recognizable yet.
    Pending,
}

impl PageProbe {
    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        serde_json::from_value(value)
            .map_err(|e| BridgeError::script(scripts::PROBE_PAGE, e.to_string()))
    }

    pub fn classify(&self) -> PageKind {
        if self.stale {
            return PageKind::Pending;
        }
        if LOAD_ERROR_URL.is_match(&self.url) || self.title == "Problem loading page" {
            return PageKind::LoadError(format!("browser error page ({})", self.url));
        }
        if self.reader_frame {
            return PageKind::Reader;
        }
        if self.challenge_form || CHALLENGE_URL.is_match(&self.url) {
            return PageKind::Challenge(format!("verification requested at {}", self.url));
        }
        if self.signin_form {
            let error = self
                .error_banner
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string);
            return PageKind::SignIn { error };
        }
        PageKind::Pending
    }
}

/// Drives the sign-in form and hands back a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    reader: ReaderConfig,
    timeouts: TimeoutsConfig,
}

impl SessionAuthenticator {
    pub fn new(config: &Config) -> Self {
        Self {
            reader: config.reader.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Signs in on `runner` and binds it to a new session.
    ///
    /// On any failure the runner is shut down and the error returned.
    pub async fn authenticate<R: ScriptRunner>(
        &self,
        mut runner: R,
        credentials: Credentials,
    ) -> Result<Session<R>, BridgeError> {
        tracing::info!("signing in to Kindle Cloud Reader");

        match self.sign_in(&mut runner, &credentials).await {
            Ok(()) => {
                tracing::info!("signed in");
                Ok(Session::new(runner))
            }
            Err(err) => {
                tracing::warn!(error = %err, "sign-in failed");
                if let Err(shutdown_err) = runner.shutdown().await {
                    tracing::warn!(error = %shutdown_err, "failed to shut down browser");
                }
                Err(err)
            }
        }
    }

    async fn sign_in<R: ScriptRunner>(
        &self,
        runner: &mut R,
        credentials: &Credentials,
    ) -> Result<(), BridgeError> {
        let home = self.reader.home_url()?;
        let not_loaded = |message: &str| BridgeError::Navigation {
            url: home.to_string(),
            message: message.to_string(),
        };

        let first = runner
            .execute(
                Target::Url(&home),
                &scripts::probe_page(),
                self.timeouts.page_load(),
            )
            .await?;

        let kind = match PageProbe::from_value(first)?.classify() {
            PageKind::Pending => {
                wait_for_settled(runner, self.timeouts.page_load(), self.timeouts.poll_interval())
                    .await
                    .map_err(|err| match err {
                        BridgeError::Timeout { .. } => {
                            not_loaded("sign-in page never finished loading")
                        }
                        other => other,
                    })?
            }
            kind => kind,
        };

        match kind {
            PageKind::Reader => tracing::debug!("reader already signed in"),
            PageKind::SignIn { .. } => self.submit(runner, credentials).await?,
            PageKind::Challenge(reason) => return Err(AuthError::ChallengeRequired(reason).into()),
            PageKind::LoadError(message) => return Err(not_loaded(&message)),
            PageKind::Pending => return Err(not_loaded("sign-in page not recognized")),
        }

        runner
            .execute(
                Target::Current,
                &scripts::reader_ready(),
                self.timeouts.page_load(),
            )
            .await?;
        Ok(())
    }

    /// `LoginFormLoaded -> CredentialsSubmitted -> outcome`.
    async fn submit<R: ScriptRunner>(
        &self,
        runner: &mut R,
        credentials: &Credentials,
    ) -> Result<(), BridgeError> {
        let accepted = runner
            .execute(
                Target::Current,
                &scripts::submit_credentials(credentials),
                self.timeouts.script(),
            )
            .await?;
        if accepted != Value::Bool(true) {
            return Err(BridgeError::script(
                scripts::SUBMIT_CREDENTIALS,
                "sign-in form fields not found",
            ));
        }

        let settled =
            wait_for_settled(runner, self.timeouts.sign_in(), self.timeouts.poll_interval()).await;
        let outcome = match settled {
            Ok(kind) => kind,
            Err(BridgeError::Timeout { .. }) => PageKind::Pending,
            Err(other) => return Err(other),
        };

        match outcome {
            PageKind::Reader => Ok(()),
            PageKind::SignIn { error } => {
                tracing::debug!(banner = ?error, "sign-in form shown again");
                Err(AuthError::InvalidCredentials.into())
            }
            PageKind::Challenge(reason) => Err(AuthError::ChallengeRequired(reason).into()),
            PageKind::LoadError(message) => Err(BridgeError::Navigation {
                url: self.reader.signin_url.clone(),
                message,
            }),
            PageKind::Pending => Err(AuthError::ChallengeRequired(
                "sign-in did not reach a recognized page".to_string(),
            )
            .into()),
        }
    }
}

/// Probes the current page until it is something other than `Pending`.
///
/// Script errors while polling mean the document is being replaced.
pub(crate) async fn wait_for_settled<R: ScriptRunner + ?Sized>(
    runner: &mut R,
    timeout: Duration,
    interval: Duration,
) -> Result<PageKind, BridgeError> {
    poll_until(runner, &scripts::probe_page(), timeout, interval, |outcome| {
        match outcome {
            Ok(value) => {
                let kind = PageProbe::from_value(value)?.classify();
                Ok((kind != PageKind::Pending).then_some(kind))
            }
            Err(BridgeError::Script { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    })
    .await
}
