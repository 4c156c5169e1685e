//! Kindle account credentials.
//!
//! Credentials live in memory only until the sign-in step consumes them.
//! The password never appears in `Debug` output.

use crate::error::CredentialsError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Environment variable holding the account e-mail.
pub const USERNAME_ENV: &str = "LECTOR_USERNAME";

/// Environment variable holding the account password.
pub const PASSWORD_ENV: &str = "LECTOR_PASSWORD";

/// E-mail and password for a Kindle account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

/// On-disk shape of a credential file.
#[derive(Deserialize)]
struct CredentialFile {
    id: String,
    secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Loads credentials from a JSON file of the form
    /// `{"id": "<email>", "secret": "<password>"}`.
    pub fn from_json_file(path: &Path) -> Result<Self, CredentialsError> {
        let content = std::fs::read_to_string(path)?;
        let file: CredentialFile = serde_json::from_str(&content)?;
        Self::checked(file.id, file.secret)
    }

    /// Loads credentials from `LECTOR_USERNAME` and `LECTOR_PASSWORD`.
    pub fn from_env() -> Result<Self, CredentialsError> {
        let username =
            std::env::var(USERNAME_ENV).map_err(|_| CredentialsError::MissingEnv(USERNAME_ENV))?;
        let password =
            std::env::var(PASSWORD_ENV).map_err(|_| CredentialsError::MissingEnv(PASSWORD_ENV))?;
        Self::checked(username, password)
    }

    fn checked(username: String, password: String) -> Result<Self, CredentialsError> {
        if username.trim().is_empty() {
            return Err(CredentialsError::EmptyField("id"));
        }
        if password.is_empty() {
            return Err(CredentialsError::EmptyField("secret"));
        }
        Ok(Self::new(username.trim(), password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("reader@example.com", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("reader@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(
            &path,
            r#"{"id": " reader@example.com ", "secret": "hunter2"}"#,
        )
        .unwrap();

        let creds = Credentials::from_json_file(&path).unwrap();
        assert_eq!(creds.username(), "reader@example.com");
        assert_eq!(creds.password(), "hunter2");
    }

    #[test]
    fn test_from_json_file_empty_secret() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"id": "reader@example.com", "secret": ""}"#).unwrap();

        let err = Credentials::from_json_file(&path).unwrap_err();
        assert!(matches!(err, CredentialsError::EmptyField("secret")));
    }

    #[test]
    fn test_from_json_file_missing_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"id": "reader@example.com"}"#).unwrap();

        let err = Credentials::from_json_file(&path).unwrap_err();
        assert!(matches!(err, CredentialsError::ParseError(_)));
    }
}
