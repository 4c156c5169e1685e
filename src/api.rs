//! Public façade over one Kindle Cloud Reader session.
//!
//! The façade owns the browser, signs in lazily on the first data call and
//! forwards every call to the matching extractor. Calls are strictly
//! sequential: a call made while another is still running fails with
//! [`BridgeError::Busy`] instead of interleaving scripts in the same page.

use crate::auth::SessionAuthenticator;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::BridgeError;
use crate::library::LibraryExtractor;
use crate::progress::ProgressExtractor;
use crate::records::{BookRecord, Library, ProgressRecord};
use crate::runner::{ScriptRunner, WebDriverRunner};
use crate::session::Session;
use tokio::sync::{Mutex, MutexGuard};

enum ApiState<R: ScriptRunner> {
    /// Browser is up but nobody has signed in yet.
    Pending { runner: R, credentials: Credentials },
    Ready(Session<R>),
    Closed,
}

/// Reads library metadata and reading progress from Kindle Cloud Reader.
pub struct KindleCloudReaderApi<R: ScriptRunner = WebDriverRunner> {
    authenticator: SessionAuthenticator,
    library: LibraryExtractor,
    progress: ProgressExtractor,
    state: Mutex<ApiState<R>>,
}

impl KindleCloudReaderApi<WebDriverRunner> {
    /// Launches a browser as configured and wraps it.
    pub async fn connect(credentials: Credentials, config: &Config) -> Result<Self, BridgeError> {
        let runner = WebDriverRunner::launch(config).await?;
        Ok(Self::new(runner, credentials, config))
    }
}

impl<R: ScriptRunner> KindleCloudReaderApi<R> {
    /// Wraps `runner`. Nothing is loaded until the first data call.
    pub fn new(runner: R, credentials: Credentials, config: &Config) -> Self {
        Self {
            authenticator: SessionAuthenticator::new(config),
            library: LibraryExtractor::new(config),
            progress: ProgressExtractor::new(config),
            state: Mutex::new(ApiState::Pending {
                runner,
                credentials,
            }),
        }
    }

    /// All books in the library.
    pub async fn get_library_metadata(&self) -> Result<Library, BridgeError> {
        let mut state = self.lock()?;
        let session = self.session(&mut state).await?;
        self.library.get_library(session).await
    }

    /// Metadata for one book.
    pub async fn get_book_metadata(&self, asin: &str) -> Result<BookRecord, BridgeError> {
        let mut state = self.lock()?;
        let session = self.session(&mut state).await?;
        self.library.get_book(session, asin).await
    }

    /// Reading progress through one book.
    pub async fn get_book_progress(&self, asin: &str) -> Result<ProgressRecord, BridgeError> {
        let mut state = self.lock()?;
        let session = self.session(&mut state).await?;
        self.progress.get_progress(session, asin).await
    }

    /// Reading progress for every book in the library, in library order.
    ///
    /// Stops at the first book that fails.
    pub async fn get_library_progress(&self) -> Result<Vec<ProgressRecord>, BridgeError> {
        let mut state = self.lock()?;
        let session = self.session(&mut state).await?;

        let library = self.library.get_library(session).await?;
        let mut records = Vec::with_capacity(library.len());
        for book in library.iter() {
            records.push(self.progress.get_progress(session, &book.asin).await?);
        }
        Ok(records)
    }

    /// Shuts the browser down. Later calls fail with `SessionClosed`.
    pub async fn close(&self) -> Result<(), BridgeError> {
        let mut state = self.lock()?;
        match std::mem::replace(&mut *state, ApiState::Closed) {
            ApiState::Pending { mut runner, .. } => runner.shutdown().await,
            ApiState::Ready(session) => session.close().await,
            ApiState::Closed => Ok(()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ApiState<R>>, BridgeError> {
        self.state.try_lock().map_err(|_| BridgeError::Busy)
    }

    /// Signs in on first use.
    ///
    /// The state reads `Closed` while sign-in is in flight, so a failed or
    /// cancelled sign-in leaves the façade closed.
    async fn session<'a>(
        &self,
        state: &'a mut ApiState<R>,
    ) -> Result<&'a mut Session<R>, BridgeError> {
        if matches!(state, ApiState::Pending { .. }) {
            if let ApiState::Pending {
                runner,
                credentials,
            } = std::mem::replace(state, ApiState::Closed)
            {
                let session = self.authenticator.authenticate(runner, credentials).await?;
                *state = ApiState::Ready(session);
            }
        }

        match state {
            ApiState::Ready(session) => Ok(session),
            _ => Err(BridgeError::SessionClosed),
        }
    }
}
