//! Lector - read-only bridge to Kindle Cloud Reader.
//!
//! This library provides functionality for:
//! - Signing in to the cloud reader in a WebDriver-controlled browser
//! - Listing the books in the signed-in library
//! - Reading per-book progress in positions, locations and page numbers

pub mod api;
pub mod auth;
pub mod config;
pub mod console;
pub mod credentials;
pub mod error;
pub mod library;
pub mod progress;
pub mod records;
pub mod runner;
pub mod scripts;
pub mod session;

// Re-export commonly used types
pub use api::KindleCloudReaderApi;
pub use config::Config;
pub use console::Console;
pub use credentials::Credentials;
pub use error::{AuthError, BridgeError, ConfigError, CredentialsError, Recovery};
pub use records::{BookRecord, Library, Pagination, ProgressRecord, ProgressTriple};
pub use runner::{ScriptRunner, WebDriverRunner};
