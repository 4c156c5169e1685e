//! Reading progress extraction.

use crate::config::{Config, ReaderConfig, TimeoutsConfig};
use crate::error::BridgeError;
use crate::records::{Pagination, ProgressRecord, ProgressTriple};
use crate::runner::{ScriptRunner, Target};
use crate::scripts;
use crate::session::Session;
use serde::Deserialize;
use serde_json::Value;

/// Reply of the progress script, tagged by `status`.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ProgressReply {
    Ok {
        #[serde(default)]
        asin: Option<String>,
        #[serde(default)]
        positions: Value,
        #[serde(default)]
        locations: Value,
        #[serde(default)]
        pages: Value,
    },
    UnknownBook,
    SignedOut,
}

/// Reads one integer the reader may report as a number or a numeric string.
fn read_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.floor() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a `[start, current, end]` array.
fn read_triple(value: &Value) -> Option<ProgressTriple> {
    let [start, current, end] = value.as_array()?.as_slice() else {
        return None;
    };
    ProgressTriple::new(
        read_number(start)?,
        read_number(current)?,
        read_number(end)?,
    )
}

/// Validates a progress reply for `asin`.
pub fn parse_progress(asin: &str, value: Value) -> Result<ProgressReplyOutcome, BridgeError> {
    let malformed =
        |message: String| BridgeError::script(scripts::BOOK_PROGRESS, message);

    let reply: ProgressReply =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    let (reported, positions, locations, pages) = match reply {
        ProgressReply::Ok {
            asin,
            positions,
            locations,
            pages,
        } => (asin, positions, locations, pages),
        ProgressReply::UnknownBook => return Ok(ProgressReplyOutcome::UnknownBook),
        ProgressReply::SignedOut => return Ok(ProgressReplyOutcome::SignedOut),
    };

    if let Some(reported) = reported.as_deref() {
        if reported != asin {
            return Err(malformed(format!(
                "progress reported for {} instead of {}",
                reported, asin
            )));
        }
    }

    let positions = read_triple(&positions)
        .ok_or_else(|| malformed(format!("invalid position range {}", positions)))?;
    let locations = read_triple(&locations)
        .ok_or_else(|| malformed(format!("invalid location range {}", locations)))?;

    let pages = match read_triple(&pages) {
        Some(triple) => Pagination::Pages(triple),
        None => {
            if !pages.is_null() {
                tracing::debug!(asin, pages = %pages, "ignoring unusable page range");
            }
            Pagination::Unavailable
        }
    };

    Ok(ProgressReplyOutcome::Progress(ProgressRecord {
        asin: asin.to_string(),
        positions,
        locations,
        pages,
    }))
}

/// What a well-formed progress reply says.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressReplyOutcome {
    Progress(ProgressRecord),
    UnknownBook,
    SignedOut,
}

/// Opens books in the reader and reads how far the user got.
#[derive(Debug, Clone)]
pub struct ProgressExtractor {
    reader: ReaderConfig,
    timeouts: TimeoutsConfig,
}

impl ProgressExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            reader: config.reader.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Progress through the book `asin`.
    ///
    /// Loading the book view and waiting for its page map share one
    /// deadline of the page-load plus pagination budgets.
    pub async fn get_progress<R: ScriptRunner>(
        &self,
        session: &mut Session<R>,
        asin: &str,
    ) -> Result<ProgressRecord, BridgeError> {
        session.require_verified()?;

        let url = self.reader.book_url(asin)?;
        let value = session
            .execute(
                Target::Url(&url),
                &scripts::book_progress(asin),
                self.timeouts.page_load() + self.timeouts.pagination(),
            )
            .await?;

        match parse_progress(asin, value)? {
            ProgressReplyOutcome::Progress(record) => {
                tracing::debug!(asin, paginated = record.has_page_progress(), "progress read");
                Ok(record)
            }
            ProgressReplyOutcome::UnknownBook => Err(BridgeError::UnknownBook(asin.to_string())),
            ProgressReplyOutcome::SignedOut => {
                session.mark_unverified();
                Err(BridgeError::NotAuthenticated(
                    "reader redirected to sign-in".to_string(),
                ))
            }
        }
    }
}
