//! Error types for Lector.
//!
//! Uses `thiserror` for structured error definitions so a caller can tell
//! failures apart by kind and decide whether to prompt for credentials,
//! retry later, or give up.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which half of a runner call was in flight when a deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Loading a page.
    Navigation,
    /// Waiting for an in-page script to signal completion.
    Script,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Navigation => f.write_str("navigating"),
            Phase::Script => f.write_str("running a page script"),
        }
    }
}

/// Reasons the sign-in flow did not produce a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The sign-in form came back, with or without an error banner.
    #[error("Sign-in rejected: invalid credentials")]
    InvalidCredentials,

    /// The service wants an extra verification step (OTP, captcha, ...).
    #[error("Sign-in requires additional verification: {0}")]
    ChallengeRequired(String),
}

/// Main error type for everything that talks to the reader application.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A page could not be loaded.
    #[error("Failed to load {url}: {message}")]
    Navigation { url: String, message: String },

    /// No completion signal arrived within the budget.
    #[error("Timed out after {after:?} while {phase}")]
    Timeout { phase: Phase, after: Duration },

    /// The in-page script threw or returned something unusable.
    #[error("Page script '{script}' failed: {message}")]
    Script { script: String, message: String },

    /// Sign-in failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The session was assumed valid but the reader marker was missing.
    #[error("Session is not authenticated: {0}")]
    NotAuthenticated(String),

    /// The library has no book with this identifier.
    #[error("Unknown book: {0}")]
    UnknownBook(String),

    /// Another call is already running against this session.
    #[error("Another operation is already running on this session")]
    Busy,

    /// The session was torn down, either explicitly or by a failed sign-in.
    #[error("Session is closed")]
    SessionClosed,

    /// The browser or WebDriver endpoint is unavailable.
    #[error("Browser unavailable: {0}")]
    Browser(String),
}

/// What a caller can sensibly do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Ask for credentials (or a verification step) and build a new session.
    Reauthenticate,
    /// Wait and try the same call again.
    Retry,
    /// Nothing to gain from retrying.
    Abort,
}

impl BridgeError {
    /// Builds a [`BridgeError::Script`] for the named script.
    pub fn script(script: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Script {
            script: script.into(),
            message: message.into(),
        }
    }

    /// Classifies the failure for retry decisions. Nothing in the crate
    /// retries on its own.
    pub fn recovery(&self) -> Recovery {
        match self {
            BridgeError::Auth(_)
            | BridgeError::NotAuthenticated(_)
            | BridgeError::SessionClosed => Recovery::Reauthenticate,
            BridgeError::Timeout { .. } | BridgeError::Navigation { .. } | BridgeError::Busy => {
                Recovery::Retry
            }
            BridgeError::Script { .. } | BridgeError::UnknownBook(_) | BridgeError::Browser(_) => {
                Recovery::Abort
            }
        }
    }

    /// Returns true for timeouts that happened while a page was loading.
    pub fn is_navigation_timeout(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout {
                phase: Phase::Navigation,
                ..
            }
        )
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for loading credentials.
#[derive(Error, Debug)]
pub enum CredentialsError {
    /// Failed to read the credential file
    #[error("Failed to read credential file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Credential file is not valid JSON
    #[error("Failed to parse credential file: {0}")]
    ParseError(#[from] serde_json::Error),

    /// A required field is empty
    #[error("Credential field '{0}' is empty")]
    EmptyField(&'static str),

    /// Environment variable not set
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),
}
