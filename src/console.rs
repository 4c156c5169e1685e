//! Terminal output for the `lector` binary.
//!
//! Status lines go to stdout and failures to stderr. Each stream is colored
//! only when it is a terminal and `NO_COLOR` is unset.

use crate::error::Recovery;
use crate::records::{BookRecord, ProgressRecord};
use std::io::{self, IsTerminal};

/// ANSI styles used by the CLI.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    fn sgr(self) -> u8 {
        match self {
            Style::Bold => 1,
            Style::Dim => 2,
            Style::Red => 31,
            Style::Green => 32,
            Style::Yellow => 33,
            Style::Magenta => 35,
            Style::Cyan => 36,
            Style::Gray => 90,
        }
    }
}

/// Bracketed line prefix such as `[STEP]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Step,
    Ok,
    Warn,
    Error,
    Hint,
}

impl Tag {
    fn text(self) -> &'static str {
        match self {
            Tag::Step => "STEP",
            Tag::Ok => "OK",
            Tag::Warn => "WARN",
            Tag::Error => "ERROR",
            Tag::Hint => "HINT",
        }
    }

    fn color(self) -> Style {
        match self {
            Tag::Step => Style::Cyan,
            Tag::Ok => Style::Green,
            Tag::Warn | Tag::Hint => Style::Yellow,
            Tag::Error => Style::Red,
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Tag::Error | Tag::Hint)
    }
}

/// Width of the progress bar, in cells.
const BAR_WIDTH: usize = 20;

#[derive(Debug)]
pub struct Console {
    stdout_colors: bool,
    stderr_colors: bool,
}

impl Console {
    pub fn new() -> Self {
        let allowed = std::env::var_os("NO_COLOR").is_none();
        Self {
            stdout_colors: allowed && io::stdout().is_terminal(),
            stderr_colors: allowed && io::stderr().is_terminal(),
        }
    }

    /// Forces colors on or off for both streams.
    pub fn with_colors(enabled: bool) -> Self {
        Self {
            stdout_colors: enabled,
            stderr_colors: enabled,
        }
    }

    fn paint(&self, text: &str, styles: &[Style], colors: bool) -> String {
        if !colors || styles.is_empty() {
            return text.to_string();
        }
        let codes: Vec<String> = styles.iter().map(|s| s.sgr().to_string()).collect();
        format!("\x1b[{}m{}\x1b[0m", codes.join(";"), text)
    }

    /// Styles text bound for stdout.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        self.paint(text, styles, self.stdout_colors)
    }

    fn tagged(&self, tag: Tag, message: &str) -> String {
        let colors = if tag.to_stderr() {
            self.stderr_colors
        } else {
            self.stdout_colors
        };
        let prefix = self.paint(tag.text(), &[tag.color(), Style::Bold], colors);
        format!("[{}] {}", prefix, message)
    }

    fn emit(&self, tag: Tag, message: &str) {
        let line = self.tagged(tag, message);
        if tag.to_stderr() {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    pub fn step(&self, message: &str) {
        self.emit(Tag::Step, message);
    }

    pub fn success(&self, message: &str) {
        self.emit(Tag::Ok, message);
    }

    pub fn warning(&self, message: &str) {
        self.emit(Tag::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Tag::Error, message);
    }

    /// Prints what the user can do about a failure.
    pub fn hint(&self, recovery: Recovery) {
        self.emit(Tag::Hint, hint_text(recovery));
    }

    /// Blank line, then a bold magenta heading.
    pub fn section(&self, title: &str) {
        println!();
        println!("{}", self.style(title, &[Style::Magenta, Style::Bold]));
    }

    pub fn count(&self, n: usize) -> String {
        self.style(&n.to_string(), &[Style::Green, Style::Bold])
    }

    fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// `"Title" by Author` followed by the muted ASIN.
    pub fn book_line(&self, book: &BookRecord) -> String {
        format!("{} {}", book, self.muted(&book.asin))
    }

    /// A fixed-width bar like `[#####---------------]  25%`.
    fn bar(&self, fraction: f64) -> String {
        let fraction = fraction.clamp(0.0, 1.0);
        let filled = (fraction * BAR_WIDTH as f64).round() as usize;
        let cells = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));
        format!(
            "[{}] {:>3.0}%",
            self.style(&cells, &[Style::Green]),
            fraction * 100.0
        )
    }

    /// ASIN, bar, and the page or location reading.
    pub fn progress_line(&self, record: &ProgressRecord) -> String {
        let detail = if record.has_page_progress() {
            record.to_string()
        } else {
            format!("{} {}", record, self.muted("(no page numbers)"))
        };
        format!(
            "{} {} {}",
            self.style(&record.asin, &[Style::Bold]),
            self.bar(record.fraction()),
            detail
        )
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn hint_text(recovery: Recovery) -> &'static str {
    match recovery {
        Recovery::Reauthenticate => {
            "Check your credentials or complete verification in a browser, then run again."
        }
        Recovery::Retry => "This may be temporary. Try again in a moment.",
        Recovery::Abort => "Retrying will not help.",
    }
}
