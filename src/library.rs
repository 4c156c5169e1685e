//! Library metadata extraction.
//!
//! The reader keeps every book of the account in an in-page database once
//! the user is signed in. Entries come back as loosely typed JSON and are
//! validated one by one: malformed entries are dropped and counted instead of
//! failing the whole listing.

use crate::auth::{PageKind, PageProbe, wait_for_settled};
use crate::config::{Config, ReaderConfig, TimeoutsConfig};
use crate::error::BridgeError;
use crate::records::{BookRecord, DropReason, DroppedEntry, Library};
use crate::runner::{ScriptRunner, Target};
use crate::scripts;
use crate::session::Session;
use serde_json::Value;
use std::collections::HashSet;

/// Outcome of validating one raw library entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEntry {
    Book(BookRecord),
    Dropped(DropReason),
}

/// Validates one raw `{asin, title, authors}` entry.
pub fn parse_entry(value: &Value) -> ParsedEntry {
    let Some(entry) = value.as_object() else {
        return ParsedEntry::Dropped(DropReason::NotAnObject);
    };

    let text = |key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let Some(asin) = text("asin") else {
        return ParsedEntry::Dropped(DropReason::MissingIdentifier);
    };
    let Some(title) = text("title") else {
        return ParsedEntry::Dropped(DropReason::MissingTitle);
    };

    // Single-author books sometimes carry a bare string.
    let authors = match entry.get("authors") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(author)) if !author.trim().is_empty() => {
            vec![author.trim().to_string()]
        }
        _ => Vec::new(),
    };

    ParsedEntry::Book(BookRecord {
        asin,
        title,
        authors,
    })
}

/// Validates the whole listing, keeping the remote order.
pub fn parse_library(value: Value) -> Result<Library, BridgeError> {
    let Value::Array(entries) = value else {
        return Err(BridgeError::script(
            scripts::LIBRARY_METADATA,
            format!("expected an array, got {}", json_kind(&value)),
        ));
    };

    let mut library = Library::default();
    let mut seen = HashSet::new();

    for (index, raw) in entries.iter().enumerate() {
        let parsed = match parse_entry(raw) {
            ParsedEntry::Book(book) if !seen.insert(book.asin.clone()) => {
                ParsedEntry::Dropped(DropReason::DuplicateIdentifier)
            }
            other => other,
        };

        match parsed {
            ParsedEntry::Book(book) => library.books.push(book),
            ParsedEntry::Dropped(reason) => {
                library.dropped.push(DroppedEntry { index, reason });
            }
        }
    }

    if !library.dropped.is_empty() {
        tracing::warn!(
            dropped = library.dropped_count(),
            kept = library.len(),
            "skipped malformed library entries"
        );
    }

    Ok(library)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reads library metadata out of a signed-in session.
#[derive(Debug, Clone)]
pub struct LibraryExtractor {
    reader: ReaderConfig,
    timeouts: TimeoutsConfig,
}

impl LibraryExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            reader: config.reader.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Every book in the library, in the order the reader lists them.
    pub async fn get_library<R: ScriptRunner>(
        &self,
        session: &mut Session<R>,
    ) -> Result<Library, BridgeError> {
        self.ensure_reader(session).await?;

        let value = session
            .execute(
                Target::Current,
                &scripts::library_metadata(),
                self.timeouts.script(),
            )
            .await?;

        let library = parse_library(value)?;
        tracing::debug!(books = library.len(), "library extracted");
        Ok(library)
    }

    /// Metadata for a single book.
    pub async fn get_book<R: ScriptRunner>(
        &self,
        session: &mut Session<R>,
        asin: &str,
    ) -> Result<BookRecord, BridgeError> {
        self.ensure_reader(session).await?;

        let value = session
            .execute(
                Target::Current,
                &scripts::book_metadata(asin),
                self.timeouts.script(),
            )
            .await?;

        if value.is_null() {
            return Err(BridgeError::UnknownBook(asin.to_string()));
        }
        match parse_entry(&value) {
            ParsedEntry::Book(book) => Ok(book),
            ParsedEntry::Dropped(reason) => Err(BridgeError::script(
                scripts::BOOK_METADATA,
                format!("malformed book entry: {}", reason),
            )),
        }
    }

    /// Confirms the reader is loaded, re-verifying an unverified session by
    /// loading the reader home.
    async fn ensure_reader<R: ScriptRunner>(
        &self,
        session: &mut Session<R>,
    ) -> Result<(), BridgeError> {
        if session.is_verified() {
            let marker = session
                .execute(
                    Target::Current,
                    &scripts::reader_marker(),
                    self.timeouts.script(),
                )
                .await?;
            if marker != Value::Bool(true) {
                session.mark_unverified();
                return Err(BridgeError::NotAuthenticated(
                    "reader application is not loaded".to_string(),
                ));
            }
            return Ok(());
        }

        tracing::info!("re-verifying session");
        let home = self.reader.home_url()?;
        let first = session
            .execute(
                Target::Url(&home),
                &scripts::probe_page(),
                self.timeouts.page_load(),
            )
            .await?;

        let kind = match PageProbe::from_value(first)?.classify() {
            PageKind::Pending => {
                wait_for_settled(
                    session.runner_mut(),
                    self.timeouts.page_load(),
                    self.timeouts.poll_interval(),
                )
                .await?
            }
            kind => kind,
        };

        if kind != PageKind::Reader {
            return Err(BridgeError::NotAuthenticated(format!(
                "reader home shows {:?}",
                kind
            )));
        }

        session
            .execute(
                Target::Current,
                &scripts::reader_ready(),
                self.timeouts.page_load(),
            )
            .await?;
        session.mark_verified();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeKindle;
    use crate::session::SessionState;
    use serde_json::json;
    use std::time::Duration;

    fn book(asin: &str, title: &str) -> Value {
        json!({"asin": asin, "title": title, "authors": ["Ann Author"]})
    }

    fn extractor() -> LibraryExtractor {
        LibraryExtractor::new(&Config::default())
    }

    #[test]
    fn test_parse_entry_well_formed() {
        let parsed = parse_entry(&json!({
            "asin": "B000000001",
            "title": " Dune ",
            "authors": ["Frank Herbert", "", 7]
        }));
        assert_eq!(
            parsed,
            ParsedEntry::Book(BookRecord {
                asin: "B000000001".to_string(),
                title: "Dune".to_string(),
                authors: vec!["Frank Herbert".to_string()],
            })
        );
    }

    #[test]
    fn test_parse_entry_author_variants() {
        let ParsedEntry::Book(single) =
            parse_entry(&json!({"asin": "B1", "title": "T", "authors": "Solo"}))
        else {
            panic!("expected a book");
        };
        assert_eq!(single.authors, vec!["Solo".to_string()]);

        let ParsedEntry::Book(none) = parse_entry(&json!({"asin": "B2", "title": "T"})) else {
            panic!("expected a book");
        };
        assert!(none.authors.is_empty());
    }

    #[test]
    fn test_parse_entry_drop_reasons() {
        assert_eq!(
            parse_entry(&json!(null)),
            ParsedEntry::Dropped(DropReason::NotAnObject)
        );
        assert_eq!(
            parse_entry(&json!({"title": "No id"})),
            ParsedEntry::Dropped(DropReason::MissingIdentifier)
        );
        assert_eq!(
            parse_entry(&json!({"asin": "  ", "title": "Blank id"})),
            ParsedEntry::Dropped(DropReason::MissingIdentifier)
        );
        assert_eq!(
            parse_entry(&json!({"asin": "B3", "title": 12})),
            ParsedEntry::Dropped(DropReason::MissingTitle)
        );
    }

    #[test]
    fn test_parse_library_counts_drops() {
        let library = parse_library(json!([
            book("B1", "One"),
            {"asin": "B2"},
            book("B3", "Three"),
            "garbage",
            book("B1", "One again"),
            book("B4", "Four"),
        ]))
        .unwrap();

        let asins: Vec<_> = library.iter().map(|b| b.asin.as_str()).collect();
        assert_eq!(asins, vec!["B1", "B3", "B4"]);
        assert_eq!(library.dropped_count(), 3);
        assert_eq!(
            library.dropped,
            vec![
                DroppedEntry {
                    index: 1,
                    reason: DropReason::MissingTitle
                },
                DroppedEntry {
                    index: 3,
                    reason: DropReason::NotAnObject
                },
                DroppedEntry {
                    index: 4,
                    reason: DropReason::DuplicateIdentifier
                },
            ]
        );
    }

    #[test]
    fn test_parse_library_empty_and_wrong_shape() {
        let library = parse_library(json!([])).unwrap();
        assert!(library.is_empty());
        assert_eq!(library.dropped_count(), 0);

        let err = parse_library(json!({"books": []})).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Script { ref message, .. } if message.contains("an object")
        ));
    }

    #[tokio::test]
    async fn test_get_library_in_order() {
        let entries: Vec<Value> = (1..=5)
            .map(|i| book(&format!("B{:09}", i), &format!("Book {}", i)))
            .collect();
        let fake = FakeKindle::new().signed_in().with_library(entries);
        let mut session = Session::new(fake.clone());

        let library = extractor().get_library(&mut session).await.unwrap();
        assert_eq!(library.len(), 5);
        assert_eq!(library.books[0].asin, "B000000001");
        assert_eq!(library.books[4].title, "Book 5");
        assert_eq!(library.dropped_count(), 0);

        let again = extractor().get_library(&mut session).await.unwrap();
        assert_eq!(library, again);
    }

    #[tokio::test]
    async fn test_get_library_drops_malformed() {
        let fake = FakeKindle::new().signed_in().with_library(vec![
            book("B1", "One"),
            json!({"title": "missing id"}),
            book("B2", "Two"),
            json!({"asin": "B9"}),
        ]);
        let mut session = Session::new(fake);

        let library = extractor().get_library(&mut session).await.unwrap();
        assert_eq!(library.len(), 2);
        assert_eq!(library.dropped_count(), 2);
    }

    #[tokio::test]
    async fn test_get_library_not_authenticated() {
        let fake = FakeKindle::new();
        let mut session = Session::new(fake);

        let err = extractor().get_library(&mut session).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotAuthenticated(_)));
        assert_eq!(session.state(), SessionState::Unverified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_library_script_times_out_then_recovers() {
        let fake = FakeKindle::new()
            .signed_in()
            .with_library(vec![book("B1", "One")]);
        fake.stall_script(scripts::LIBRARY_METADATA, 1);
        let mut config = Config::default();
        config.timeouts.script_sec = 5.0;
        let extractor = LibraryExtractor::new(&config);
        let mut session = Session::new(fake);

        let err = extractor.get_library(&mut session).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Timeout { after, .. } if after == Duration::from_secs(5)
        ));
        assert!(session.is_verified());

        let library = extractor.get_library(&mut session).await.unwrap();
        assert_eq!(library.len(), 1);
    }

    #[tokio::test]
    async fn test_unverified_session_reverifies() {
        let fake = FakeKindle::new()
            .signed_in()
            .with_library(vec![book("B1", "One")]);
        let mut session = Session::new(fake.clone());
        session.mark_unverified();

        let library = extractor().get_library(&mut session).await.unwrap();
        assert_eq!(library.len(), 1);
        assert!(session.is_verified());
        assert_eq!(fake.navigations(), vec!["https://read.amazon.com/".to_string()]);
    }

    #[tokio::test]
    async fn test_unverified_expired_session() {
        let fake = FakeKindle::new().signed_in();
        fake.expire_session();
        let mut session = Session::new(fake);
        session.mark_unverified();

        let err = extractor().get_library(&mut session).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotAuthenticated(_)));
        assert!(!session.is_verified());
    }

    #[tokio::test]
    async fn test_get_book() {
        let fake = FakeKindle::new()
            .signed_in()
            .with_library(vec![book("B1", "One"), book("B2", "Two")]);
        let mut session = Session::new(fake);

        let found = extractor().get_book(&mut session, "B2").await.unwrap();
        assert_eq!(found.title, "Two");

        let err = extractor()
            .get_book(&mut session, "nonexistent-id")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownBook(ref id) if id == "nonexistent-id"));
    }
}
