//! Main entry point for the tiles3tz CLI application.
//!
//! This binary lists, prints, converts and validates tileset archives,
//! reading 3TZ files from the local filesystem or from HTTP URLs.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tiles3tz::archive::ArchiveKind;
use tiles3tz::archive3tz::{ROOT_KEY, Severity};
use tiles3tz::cli::{Command, LogLevel};
use tiles3tz::io::is_http_url;
use tiles3tz::{
    Archive3tzReader, Cli, HttpOptions, HttpRangeReader, ReadAt, TilesetSource, create_target,
    open_source,
};

/// Application entry point.
///
/// Parses command-line arguments and dispatches to the subcommand handler.
/// Exits with status 1 when validation finds the archive invalid.
fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);
    let http = cli.http_options();

    match &cli.command {
        Command::List { archive, patterns } => {
            let opened = OpenedSource::open(archive, &http)?;
            list_keys(opened.source.as_ref(), patterns)?;
            opened.report_transfer();
        }
        Command::Cat { archive, key } => {
            let opened = OpenedSource::open(archive, &http)?;
            let data = opened
                .source
                .entry(key)?
                .ok_or_else(|| anyhow!("{archive}: no entry named {key}"))?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
            opened.report_transfer();
        }
        Command::Convert {
            input,
            output,
            force,
        } => {
            let opened = OpenedSource::open(input, &http)?;
            convert(opened.source.as_ref(), output, *force)?;
            opened.report_transfer();
        }
        Command::Validate { archive, quick } => {
            if ArchiveKind::detect(archive)? != ArchiveKind::ThreeTz {
                bail!("{archive}: only 3TZ archives can be validated");
            }
            let (reader, remote) = open_3tz(archive, &http)?;
            let valid = validate(&reader, archive, *quick)?;
            report_transfer(remote.as_deref());
            if !valid {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Log to stderr, filtered by RUST_LOG or else by `--log-level`.
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tiles3tz={}", level.as_filter())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// An opened source, plus the HTTP reader behind it for transfer statistics.
struct OpenedSource {
    source: Box<dyn TilesetSource>,
    remote: Option<Arc<HttpRangeReader>>,
}

impl OpenedSource {
    fn open(path: &str, http: &HttpOptions) -> Result<Self> {
        if is_http_url(path) {
            let (reader, remote) = open_3tz(path, http)?;
            return Ok(Self {
                source: Box::new(reader),
                remote,
            });
        }
        let source = open_source(path, http).with_context(|| format!("cannot open {path}"))?;
        Ok(Self {
            source,
            remote: None,
        })
    }

    fn report_transfer(&self) {
        report_transfer(self.remote.as_deref());
    }
}

/// Open a 3TZ archive, keeping a handle on the HTTP reader for remote ones.
fn open_3tz(
    path: &str,
    http: &HttpOptions,
) -> Result<(Archive3tzReader, Option<Arc<HttpRangeReader>>)> {
    let mut reader = Archive3tzReader::with_http_options(http.clone());
    if is_http_url(path) {
        let remote = Arc::new(HttpRangeReader::new(path.to_string(), http)?);
        let shared: Arc<dyn ReadAt> = remote.clone();
        reader
            .open_with(shared)
            .with_context(|| format!("cannot open {path}"))?;
        Ok((reader, Some(remote)))
    } else {
        reader
            .open(path)
            .with_context(|| format!("cannot open {path}"))?;
        Ok((reader, None))
    }
}

/// Display network transfer statistics for HTTP sources
fn report_transfer(remote: Option<&HttpRangeReader>) {
    if let Some(remote) = remote {
        eprintln!(
            "\nTotal bytes transferred: {}",
            format_size(remote.transferred_bytes())
        );
    }
}

/// Print every key, or only those matching one of `patterns`.
fn list_keys(source: &dyn TilesetSource, patterns: &[String]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for key in source.keys()? {
        let key = key?;
        if patterns.is_empty() || patterns.iter().any(|p| glob_match(p, &key)) {
            writeln!(stdout, "{key}")?;
        }
    }
    Ok(())
}

/// Copy all entries of `source` into a new archive at `output`.
fn convert(source: &dyn TilesetSource, output: &str, overwrite: bool) -> Result<()> {
    let mut target =
        create_target(output, overwrite).with_context(|| format!("cannot create {output}"))?;

    let mut count = 0usize;
    let mut has_root = false;
    for key in source.keys()? {
        let key = key?;
        let data = source
            .entry(&key)?
            .ok_or_else(|| anyhow!("entry {key} disappeared while converting"))?;
        target.add_entry(&key, &data)?;
        has_root |= key == ROOT_KEY;
        count += 1;
    }
    target.end()?;

    if !has_root {
        warn!("{output} has no {ROOT_KEY}");
    }
    info!(entries = count, output, "converted");
    Ok(())
}

/// Print the validation findings and return whether the archive is valid.
fn validate(reader: &Archive3tzReader, archive: &str, quick: bool) -> Result<bool> {
    let report = reader.validate(quick)?;
    for diagnostic in &report.diagnostics {
        let label = match diagnostic.severity() {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        println!("{label}: {diagnostic}");
    }
    println!(
        "{archive}: {} ({} index records)",
        if report.valid { "valid" } else { "INVALID" },
        reader.index()?.len()
    );
    Ok(report.valid)
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// # Examples
///
/// ```ignore
/// assert!(glob_match("*.b3dm", "0/0/0.b3dm"));
/// assert!(glob_match("tile?.pnts", "tile1.pnts"));
/// assert!(!glob_match("*.json", "0/0/0.b3dm"));
/// ```
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    /// Recursive helper function for glob matching.
    ///
    /// Uses a simple backtracking algorithm to handle `*` wildcards.
    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            // Both exhausted: match successful
            (None, None) => true,
            // Star matches zero or more characters
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            // Question mark matches exactly one character
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            // Literal character match
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            // No match
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
