//! Lector CLI - read library metadata and progress from Kindle Cloud Reader.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lector::config::Config;
use lector::console::Console;
use lector::{BridgeError, Credentials, KindleCloudReaderApi};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Read-only access to a Kindle Cloud Reader library.
#[derive(Parser, Debug)]
#[command(name = "lector")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file with `id` and `secret` fields. Falls back to the
    /// LECTOR_USERNAME and LECTOR_PASSWORD environment variables.
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// WebDriver endpoint, overriding the config file.
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Log navigation and script activity.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every book in the library.
    Library,
    /// Show metadata for one book.
    Book { asin: String },
    /// Show reading progress for one book.
    Progress { asin: String },
    /// Show reading progress for every book in the library.
    LibraryProgress,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let console = Console::new();

    // RUST_LOG wins over the -v default.
    let default_filter = if args.verbose { "lector=debug" } else { "lector=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    console.section("Lector - Kindle Cloud Reader");

    console.step("Loading configuration...");
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(url) = &args.webdriver_url {
        config.browser.webdriver_url = url.clone();
    }
    config.validate().context("Invalid configuration")?;

    let credentials = match &args.credentials {
        Some(path) => Credentials::from_json_file(path)
            .with_context(|| format!("Failed to read credentials from {}", path.display()))?,
        None => Credentials::from_env().context("No credentials given")?,
    };
    console.success("Configuration loaded");

    console.step("Starting browser...");
    let api = KindleCloudReaderApi::connect(credentials, &config)
        .await
        .context("Failed to start browser")?;

    let outcome = run(&api, &args.command, &console).await;
    if let Err(err) = api.close().await {
        console.warning(&format!("Failed to shut the browser down: {}", err));
    }

    if let Err(err) = outcome {
        console.error(&err.to_string());
        console.hint(err.recovery());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    api: &KindleCloudReaderApi,
    command: &Command,
    console: &Console,
) -> Result<(), BridgeError> {
    match command {
        Command::Library => {
            console.step("Reading library...");
            let library = api.get_library_metadata().await?;
            console.success(&format!("Found {} books", console.count(library.len())));
            if library.dropped_count() > 0 {
                console.warning(&format!(
                    "Skipped {} malformed entries",
                    library.dropped_count()
                ));
            }
            for book in library {
                println!("  {}", console.book_line(&book));
            }
        }
        Command::Book { asin } => {
            console.step(&format!("Looking up {}...", asin));
            let book = api.get_book_metadata(asin).await?;
            println!("  {}", console.book_line(&book));
        }
        Command::Progress { asin } => {
            console.step(&format!("Opening {}...", asin));
            let record = api.get_book_progress(asin).await?;
            println!("  {}", console.progress_line(&record));
        }
        Command::LibraryProgress => {
            console.step("Reading progress for every book...");
            let records = api.get_library_progress().await?;
            let count = console.count(records.len());
            console.success(&format!("Read progress for {} books", count));
            for record in &records {
                println!("  {}", console.progress_line(record));
            }
        }
    }
    Ok(())
}
