//! Domain records returned by the extractors.
//!
//! Records are built fresh on every call and owned by the caller afterwards.

use serde::Serialize;
use std::fmt;

/// Metadata for one book in the Kindle library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookRecord {
    /// Amazon Standard Identification Number; unique within a library.
    pub asin: String,

    /// Book title.
    pub title: String,

    /// Authors in the order the library lists them.
    pub authors: Vec<String>,
}

impl fmt::Display for BookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.title)?;
        match self.authors.as_slice() {
            [] => Ok(()),
            [only] => write!(f, " by {}", only),
            [first, second] => write!(f, " by {} and {}", first, second),
            [rest @ .., last] => write!(f, " by {}, and {}", rest.join(", "), last),
        }
    }
}

/// Why a library entry was left out of the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NotAnObject,
    MissingIdentifier,
    MissingTitle,
    DuplicateIdentifier,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::NotAnObject => "entry is not an object",
            DropReason::MissingIdentifier => "missing identifier",
            DropReason::MissingTitle => "missing title",
            DropReason::DuplicateIdentifier => "duplicate identifier",
        };
        f.write_str(text)
    }
}

/// A library entry that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedEntry {
    /// Position of the entry in the raw listing.
    pub index: usize,
    pub reason: DropReason,
}

/// The user's library, in the order the reader application returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Library {
    pub books: Vec<BookRecord>,
    pub dropped: Vec<DroppedEntry>,
}

impl Library {
    /// Number of raw entries that were malformed and skipped.
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BookRecord> {
        self.books.iter()
    }
}

impl IntoIterator for Library {
    type Item = BookRecord;
    type IntoIter = std::vec::IntoIter<BookRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.books.into_iter()
    }
}

/// A `(start, current, end)` reading position with `start <= current <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressTriple {
    pub start: u64,
    pub current: u64,
    pub end: u64,
}

impl ProgressTriple {
    /// Builds a triple, clamping `current` into `start..=end`.
    ///
    /// Returns `None` when `start > end`.
    pub fn new(start: u64, current: u64, end: u64) -> Option<Self> {
        if start > end {
            return None;
        }
        Some(Self {
            start,
            current: current.clamp(start, end),
            end,
        })
    }

    /// Share of the range already read, from 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        let span = self.end - self.start;
        if span == 0 {
            return 0.0;
        }
        (self.current - self.start) as f64 / span as f64
    }
}

/// Page-number progress, when the book has a page map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "pages", rename_all = "snake_case")]
pub enum Pagination {
    Pages(ProgressTriple),
    /// The book exposes no real page numbers; only locations are known.
    Unavailable,
}

/// Reading progress through one book.
///
/// Positions are the reader service's internal unit; locations are the
/// user-visible unit available on every title; page numbers correspond to
/// the print edition and exist only for some titles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub asin: String,
    pub positions: ProgressTriple,
    pub locations: ProgressTriple,
    pub pages: Pagination,
}

impl ProgressRecord {
    pub fn has_page_progress(&self) -> bool {
        matches!(self.pages, Pagination::Pages(_))
    }

    /// Page triple, if the book is paginated.
    pub fn page_triple(&self) -> Option<ProgressTriple> {
        match self.pages {
            Pagination::Pages(pages) => Some(pages),
            Pagination::Unavailable => None,
        }
    }

    /// Share of the book read, preferring page numbers over locations.
    pub fn fraction(&self) -> f64 {
        self.page_triple().unwrap_or(self.locations).fraction()
    }
}

impl fmt::Display for ProgressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pages {
            Pagination::Pages(pages) => write!(f, "Page {} of {}", pages.current, pages.end),
            Pagination::Unavailable => write!(
                f,
                "Location {} of {}",
                self.locations.current, self.locations.end
            ),
        }
    }
}
