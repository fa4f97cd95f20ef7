//! xmlcrawl - stream XML files out of large, flaky directory trees.
//!
//! Usage:
//!   xmlcrawl list [ROOT]               Print every XML file found
//!   xmlcrawl archive [ROOT] -o FILE    Pack every XML file into a zip archive
//!   xmlcrawl count [ROOT]              Count XML files and directories
//!   xmlcrawl --help                    Show help

use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Datelike, Local, Timelike};
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use xmlcrawl_walk::{
    CrawlConfig, CrawlError, CrawlProgress, CrawlSummary, Crawler, TransientKind, WorkerFailure,
};

/// Exit code used when the crawl is interrupted with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "xmlcrawl",
    version,
    about = "Concurrent crawler for XML files on large, flaky directory trees",
    long_about = "xmlcrawl walks a directory tree with a pool of worker threads and \
                  streams every XML file it finds.\n\n\
                  Transient filesystem errors (common on network shares) are retried; \
                  any other error aborts the crawl with a description of what failed."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List discovered files
    List {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Print a JSON array instead of one path per line
        #[arg(long)]
        json: bool,

        /// Include size and modification time
        #[arg(short, long)]
        long: bool,
    },

    /// Write discovered files into a zip archive
    Archive {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Output archive
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Count discovered files and listed directories
    Count {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CrawlArgs {
    /// Directory to crawl (defaults to the configured root, then ".")
    root: Option<PathBuf>,

    /// Load crawl settings from a JSON file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of worker threads (0 = one per CPU)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// File extensions to deliver, comma separated ("*" for every file)
    #[arg(long = "ext", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Glob patterns of directory names to skip
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Do not descend more than this many levels below the root
    #[arg(long)]
    max_depth: Option<u32>,

    /// Include hidden entries
    #[arg(long, overrides_with = "no_hidden")]
    hidden: bool,

    /// Skip hidden entries
    #[arg(long, overrides_with = "hidden")]
    no_hidden: bool,

    /// Follow symbolic links
    #[arg(long)]
    follow_symlinks: bool,

    /// Attempts per operation before a transient error becomes fatal
    #[arg(long)]
    retries: Option<u32>,

    /// Wait between two attempts, in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Error kinds treated as transient (e.g. not-found,invalid-input,timed-out)
    #[arg(long, value_delimiter = ',')]
    transient: Vec<TransientKind>,
}

impl CrawlArgs {
    /// Merge the config file (if any) with the command line flags.
    fn to_config(&self) -> Result<CrawlConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => CrawlConfig::default(),
        };

        if let Some(root) = &self.root {
            config.root = root.clone();
        } else if config.root.as_os_str().is_empty() {
            config.root = PathBuf::from(".");
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if !self.extensions.is_empty() {
            config.extensions = if self.extensions.iter().any(|e| e == "*") {
                Vec::new()
            } else {
                self.extensions.clone()
            };
        }
        if !self.exclude.is_empty() {
            config.exclude = self.exclude.clone();
        }
        if self.max_depth.is_some() {
            config.max_depth = self.max_depth;
        }
        if self.hidden {
            config.include_hidden = true;
        }
        if self.no_hidden {
            config.include_hidden = false;
        }
        if self.follow_symlinks {
            config.follow_symlinks = true;
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry.delay_ms = delay;
        }
        if !self.transient.is_empty() {
            config.retry.transient = self.transient.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// One entry of `list --json` output.
#[derive(Serialize)]
struct ListedFile {
    path: PathBuf,
    size: u64,
    modified: DateTime<Local>,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let outcome = match cli.command {
        Command::List { crawl, json, long } => run_list(&crawl, json, long)?,
        Command::Archive { crawl, output } => run_archive(&crawl, &output)?,
        Command::Count { crawl, json } => run_count(&crawl, json)?,
    };

    match outcome {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(CrawlError::Interrupted) => {
            eprintln!("Interrupted, partial results only");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(CrawlError::Aborted(failure)) => {
            for line in abort_report(&failure) {
                eprintln!("{line}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err::<ExitCode, _>(err).context("Crawl failed"),
    }
}

/// Lines printed when a worker failure aborts the crawl.
fn abort_report(failure: &WorkerFailure) -> Vec<String> {
    let mut lines = vec!["Crawl aborted:".to_string()];
    lines.extend(failure.lines());
    lines.push("Crawl interrupted, results above are partial".to_string());
    lines
}

/// Print every discovered file.
fn run_list(args: &CrawlArgs, json: bool, long: bool) -> Result<Result<CrawlSummary, CrawlError>> {
    let config = args.to_config()?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut listed = Vec::new();

    let outcome = crawl(config, |file| {
        let modified = DateTime::<Local>::from(file.modified);
        let size = file.len() as u64;
        if json {
            listed.push(ListedFile {
                path: file.path,
                size,
                modified,
            });
        } else if long {
            writeln!(
                out,
                "{:>10}  {}  {}",
                format_size(size),
                modified.format("%Y-%m-%d %H:%M"),
                file.path.display()
            )?;
        } else {
            writeln!(out, "{}", file.path.display())?;
        }
        Ok::<_, io::Error>(())
    })?;

    if json {
        serde_json::to_writer_pretty(&mut out, &listed)?;
        writeln!(out)?;
    }
    out.flush()?;

    Ok(outcome)
}

/// Write every discovered file into a zip archive.
fn run_archive(args: &CrawlArgs, output: &Path) -> Result<Result<CrawlSummary, CrawlError>> {
    let config = args.to_config()?;
    let root = config.root.clone();

    let file = File::create(output)
        .with_context(|| format!("Failed to create archive {}", output.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let base_options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let outcome = crawl(config, |file| {
        let name = archive_name(&root, &file.path);
        let options = match zip_timestamp(DateTime::<Local>::from(file.modified)) {
            Some(time) => base_options.last_modified_time(time),
            None => base_options,
        };
        zip.start_file(name, options)?;
        zip.write_all(&file.content)?;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    })?;

    let mut writer = zip.finish().context("Failed to finalize archive")?;
    writer.flush()?;

    if let Ok(summary) = &outcome {
        eprintln!(
            "Archived {} files to {}",
            summary.files_delivered,
            output.display()
        );
    }
    Ok(outcome)
}

/// Print only the crawl summary.
fn run_count(args: &CrawlArgs, json: bool) -> Result<Result<CrawlSummary, CrawlError>> {
    let config = args.to_config()?;
    let outcome = crawl(config, |_| Ok::<_, io::Error>(()))?;

    if let Ok(summary) = &outcome {
        if json {
            println!("{}", serde_json::to_string_pretty(summary)?);
        } else {
            println!(
                "{} files in {} directories ({:.2}s)",
                summary.files_delivered,
                summary.dirs_listed,
                summary.elapsed.as_secs_f64()
            );
            let retries = summary.list_retries + summary.read_retries;
            if retries > 0 {
                println!(
                    "{} retries ({} listing, {} reading)",
                    retries, summary.list_retries, summary.read_retries
                );
            }
        }
    }
    Ok(outcome)
}

/// Run one crawl session with Ctrl-C handling and a progress line.
///
/// The outer error covers setup failures; the inner result is the crawl's own
/// outcome, which the caller maps to an exit code.
fn crawl<C, E>(config: CrawlConfig, consumer: C) -> Result<Result<CrawlSummary, CrawlError>>
where
    C: FnMut(xmlcrawl_walk::FoundFile) -> std::result::Result<(), E>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let crawler = Crawler::new(config).context("Failed to start crawl workers")?;

    let cancel = crawler.cancel_signal();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        cancel.cancel();
    })
    .context("Failed to set signal handler")?;

    let progress = spawn_progress_line(&crawler);
    let outcome = crawler.run(consumer);

    // The crawler is gone, so the progress channel is closed.
    if let Some(handle) = progress {
        let _ = handle.join();
    }
    Ok(outcome)
}

/// Render progress updates on stderr while the crawl runs.
fn spawn_progress_line(crawler: &Crawler) -> Option<JoinHandle<()>> {
    if !io::stderr().is_terminal() {
        return None;
    }
    let mut progress_rx = crawler.subscribe();

    thread::Builder::new()
        .name("crawl-progress".to_string())
        .spawn(move || {
            let mut shown = false;
            loop {
                match progress_rx.blocking_recv() {
                    Ok(progress) => {
                        render_progress(&progress);
                        shown = true;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Progress line fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            if shown {
                eprintln!();
            }
        })
        .ok()
}

fn render_progress(progress: &CrawlProgress) {
    eprint!(
        "\r\x1b[2K{} ({:.0} files/s)",
        progress,
        progress.files_per_second()
    );
    let _ = io::stderr().flush();
}

fn setup_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Name of a file inside the archive: its path relative to the crawl root,
/// always relative and with `/` separators.
fn archive_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Zip timestamps cannot represent dates before 1980.
fn zip_timestamp(time: DateTime<Local>) -> Option<zip::DateTime> {
    let year = u16::try_from(time.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .ok()
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_name_is_relative() {
        let root = Path::new("/share/icons");
        assert_eq!(
            archive_name(root, Path::new("/share/icons/a/b/set.xml")),
            "a/b/set.xml"
        );
        assert_eq!(archive_name(root, Path::new("/elsewhere/x.xml")), "elsewhere/x.xml");
        assert_eq!(
            archive_name(root, Path::new("/share/icons/../../etc/x.xml")),
            "etc/x.xml"
        );
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "xmlcrawl",
            "count",
            "/share",
            "-j",
            "8",
            "--ext",
            "xml,svg",
            "--no-hidden",
            "--retries",
            "5",
            "--transient",
            "not-found,timed-out",
        ]);
        let Command::Count { crawl, .. } = cli.command else {
            panic!("expected count");
        };
        let config = crawl.to_config().unwrap();

        assert_eq!(config.root, PathBuf::from("/share"));
        assert_eq!(config.workers, 8);
        assert_eq!(config.extensions, vec!["xml", "svg"]);
        assert!(!config.include_hidden);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(
            config.retry.transient,
            vec![TransientKind::NotFound, TransientKind::TimedOut]
        );
    }

    #[test]
    fn test_star_extension_means_every_file() {
        let cli = Cli::parse_from(["xmlcrawl", "list", "--ext", "*"]);
        let Command::List { crawl, .. } = cli.command else {
            panic!("expected list");
        };
        assert!(crawl.to_config().unwrap().extensions.is_empty());
    }

    #[test]
    fn test_abort_report_ends_with_notice() {
        let failure = WorkerFailure::new(
            xmlcrawl_walk::WorkerId(2),
            xmlcrawl_walk::FsOperation::List,
            "/share/dirB",
            &io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            1,
            xmlcrawl_walk::FailureCause::NonTransient,
        );
        let report = abort_report(&failure);

        assert_eq!(report.len(), failure.lines().len() + 2);
        assert_eq!(report[1..report.len() - 1], failure.lines()[..]);
        assert!(report.last().unwrap().contains("interrupted"));
    }

    #[test]
    fn test_zip_timestamp_range() {
        let now = Local::now();
        assert!(zip_timestamp(now).is_some());
    }
}
