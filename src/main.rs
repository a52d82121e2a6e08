//! reelkeep - keep a media library tidy from the command line.
//!
//! Usage:
//!   reelkeep tags                      Tag usage across the library
//!   reelkeep search QUERY              Find files by tag (or name)
//!   reelkeep retag PATH add|remove TAG Rename a file's tag block
//!   reelkeep dupes [PATH]              Find (and quarantine) duplicates
//!   reelkeep clips PATH START-END...   Cut clips out of a file
//!   reelkeep queue ...                 Manage the ordered queue
//!   reelkeep export DEST               Copy the queue out in order
//!   reelkeep merge [FILES...]          Merge files (or the queue) with ffmpeg
//!   reelkeep --help                    Show help

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use reelkeep_analyze::DuplicateGroup;
use reelkeep_core::LibraryConfig;
use reelkeep_jobs::{JobId, JobStatus};
use reelkeep_ops::{
    ClipSegment, Library, MergeProfile, OrderedQueue, ScanStatus, TagAction, TransferMode,
};
use reelkeep_scan::{MatchMode, MediaEntry, search_names, search_tags, tag_counts};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "reelkeep",
    version,
    about = "Keep a media library tidy",
    long_about = "reelkeep indexes the tags in your media file names, finds byte-identical \
                  duplicates, and merges or exports an ordered queue of clips."
)]
struct Cli {
    /// Library config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Media root (overrides the config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Log more (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tag usage counts
    Tags {
        /// Rebuild the index before answering
        #[arg(long)]
        refresh: bool,

        /// Number of tags to show
        #[arg(short = 'n', long, default_value = "30")]
        top: usize,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Search files by tag, or by name with --names
    Search {
        /// Tags (or name fragments) separated by spaces or commas
        query: String,

        /// How tags combine: and, or
        #[arg(short, long, default_value = "and")]
        mode: MatchMode,

        /// Match file names instead of tags
        #[arg(long)]
        names: bool,

        /// Maximum number of results
        #[arg(short, long, default_value = "200")]
        limit: usize,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Add or remove a tag by renaming the file
    Retag {
        /// File path relative to the media root
        path: String,

        /// add or remove
        action: TagAction,

        tag: String,
    },

    /// Find byte-identical duplicates
    Dupes {
        /// Folder relative to the media root
        #[arg(default_value = "")]
        path: String,

        /// Move every non-kept copy into the quarantine folder
        #[arg(short, long)]
        quarantine: bool,

        /// Only quarantine this group
        #[arg(short, long, requires = "quarantine")]
        group: Option<String>,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Cut segments of a file into numbered clips beside it
    Clips {
        /// File relative to the media root
        path: String,

        /// Segments in seconds, e.g. 12.5-20
        #[arg(required = true)]
        segments: Vec<ClipSegment>,
    },

    /// Manage the ordered queue
    Queue {
        #[command(subcommand)]
        action: QueueCommand,
    },

    /// Copy the queue into the export root, prefixed by position
    Export {
        /// Folder inside the export root
        destination: String,

        /// Empty a non-empty destination first
        #[arg(long)]
        clear: bool,
    },

    /// Merge files (or the queue when none are given) into one
    Merge {
        /// Files relative to the target root, in order
        files: Vec<String>,

        /// fast_copy or compatible
        #[arg(short, long, default_value = "fast_copy")]
        profile: MergeProfile,

        /// Return the job id instead of waiting
        #[arg(long)]
        detach: bool,
    },

    /// Show a merge job started earlier
    MergeStatus { id: JobId },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Show the queue
    List,
    /// Append a file from the target root
    Add { path: String },
    /// Remove an item by id
    Remove { id: u64 },
    /// Put items in this order (every id exactly once)
    Reorder { ids: Vec<u64> },
    /// Remove everything
    Clear,
    /// Copy (or move) a media-root file into the target root and queue it
    Transfer {
        source: String,

        /// Folder relative to the target root
        #[arg(short, long, default_value = "")]
        into: String,

        #[arg(short, long, default_value = "copy")]
        mode: TransferMode,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.root)?;
    let queue_path = config.state_dir.join("queue.json");
    debug!(
        root = %config.media_root.display(),
        state = %config.state_dir.display(),
        "library config loaded"
    );
    let library = Library::new(config);

    match cli.command {
        Command::Tags {
            refresh,
            top,
            format,
        } => run_tags(&library, refresh, top, format)?,
        Command::Search {
            query,
            mode,
            names,
            limit,
            format,
        } => run_search(&library, &query, mode, names, limit, format)?,
        Command::Retag { path, action, tag } => {
            let outcome = library.retag(&path, action, &tag)?;
            if outcome.changed {
                println!("{path} -> {}", outcome.relpath);
            } else {
                println!("{path} unchanged");
            }
        }
        Command::Dupes {
            path,
            quarantine,
            group,
            format,
        } => run_dupes(&library, &path, quarantine, group.as_deref(), format).await?,
        Command::Clips { path, segments } => {
            let outcome = library.cut_clips(&path, &segments).await?;
            for clip in &outcome.created {
                println!(" {:.2}-{:.2} -> {}", clip.start, clip.end, clip.relpath);
            }
            eprintln!("Created {} clip(s)", outcome.created.len());
        }
        Command::Queue { action } => run_queue(&library, &queue_path, action)?,
        Command::Export { destination, clear } => {
            let queue = OrderedQueue::load(&queue_path)?;
            let outcome = library.export(&queue, &destination, clear)?;
            for file in &outcome.exported {
                println!(" {} -> {}", file.source, file.dest_relpath);
            }
            for skipped in &outcome.skipped {
                println!(" skipped {} ({})", skipped.source, skipped.reason);
            }
            eprintln!(
                "Exported {} file(s) to {}",
                outcome.exported.len(),
                library.config().export_root().join(&outcome.destination).display()
            );
        }
        Command::Merge {
            files,
            profile,
            detach,
        } => {
            let id = if files.is_empty() {
                library.merge_queue(&OrderedQueue::load(&queue_path)?, profile)?
            } else {
                library.merges().start(&files, profile)?
            };
            if detach {
                println!("{id}");
            } else {
                wait_for_merge(&library, id).await?;
            }
        }
        Command::MergeStatus { id } => {
            let status = library.merges().status(id)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<LibraryConfig> {
    let mut config = match path {
        Some(path) => LibraryConfig::load(path).context("Could not load config")?,
        None => LibraryConfig::new(PathBuf::from(".")),
    };
    if let Some(root) = root {
        config.media_root = root;
    }
    config.media_root = config
        .media_root
        .canonicalize()
        .with_context(|| format!("Invalid media root {}", config.media_root.display()))?;
    Ok(config)
}

/// Show tag usage counts.
fn run_tags(library: &Library, refresh: bool, top: usize, format: OutputFormat) -> Result<()> {
    let snapshot = if refresh {
        library.tags().refresh_now()?
    } else {
        library.tags().get(false)?
    };
    let counts = tag_counts(&snapshot);

    let status = library.tags().status();
    if status.building {
        eprintln!("(index rebuild in progress; showing last snapshot)");
    }
    if let Some(err) = &status.last_error {
        eprintln!("(last rebuild failed: {err})");
    }

    match format {
        OutputFormat::Text => {
            println!(
                " {} files, {} distinct tags",
                snapshot.len(),
                counts.len()
            );
            println!("{}", "─".repeat(40));
            for count in counts.iter().take(top) {
                println!(" {:<30} {:>6}", count.tag, count.count);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&counts)?),
    }
    Ok(())
}

/// Search the tag index.
fn run_search(
    library: &Library,
    query: &str,
    mode: MatchMode,
    names: bool,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = library.tags().get(false)?;
    let results: Vec<&MediaEntry> = if names {
        search_names(&snapshot, query, limit)
    } else {
        search_tags(&snapshot, query, mode, limit)
    };

    match format {
        OutputFormat::Text => {
            for entry in &results {
                println!(
                    " {:<60} {:>10}  {}",
                    entry.path,
                    format_size(entry.size_bytes),
                    entry.tags.join(" ")
                );
            }
            eprintln!("{} match(es)", results.len());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
    }
    Ok(())
}

/// Run a duplicate scan, print the groups and optionally quarantine them.
async fn run_dupes(
    library: &Library,
    path: &str,
    quarantine: bool,
    group: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let scans = library.scans();
    let id = scans.start(path)?;
    eprintln!("Scanning {}...", library.media_root().join(path).display());

    let status = wait_for_scan(library, id).await?;
    let groups = status.groups.unwrap_or_default();

    match format {
        OutputFormat::Text => print_groups(&groups),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&groups)?),
    }

    if quarantine && !groups.is_empty() {
        let outcome = scans.quarantine(id, group)?;
        for moved in &outcome.moved {
            println!(" moved {} -> {}", moved.from, moved.to);
        }
        for skipped in &outcome.skipped {
            println!(" could not move {skipped}");
        }
        eprintln!(
            "Quarantined {} file(s), {} skipped",
            outcome.moved.len(),
            outcome.skipped.len()
        );
    }
    Ok(())
}

async fn wait_for_scan(library: &Library, id: JobId) -> Result<ScanStatus> {
    let mut last_phase = String::new();
    loop {
        let status = library.scans().status(id)?;
        if status.phase != last_phase {
            eprintln!(
                "  {} ({} dirs, {} files, {} hashed)",
                status.phase,
                status.progress.dirs_visited,
                status.progress.files_seen,
                status.progress.hashed_files
            );
            last_phase.clone_from(&status.phase);
        }
        match status.status {
            JobStatus::Running => tokio::time::sleep(POLL_INTERVAL).await,
            JobStatus::Done => return Ok(status),
            JobStatus::Error => bail!(
                "Duplicate scan failed: {}",
                status.error.unwrap_or_default()
            ),
        }
    }
}

fn print_groups(groups: &[DuplicateGroup]) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" Duplicate File Report");
    println!("{}", "─".repeat(70));
    println!();

    if groups.is_empty() {
        println!(" No duplicate files found.");
        return;
    }

    let wasted: u64 = groups.iter().map(DuplicateGroup::wasted_bytes).sum();
    println!(" Found {} duplicate groups", groups.len());
    println!(" Total wasted space: {}", format_size(wasted));
    println!();

    for group in groups {
        println!(
            " {} ({} files, {} each)",
            group.group_id,
            group.count(),
            format_size(group.size_bytes)
        );
        for member in &group.members {
            let marker = if *member == group.keep { "keep" } else { "    " };
            println!("   [{marker}] {member}");
        }
        println!();
    }
}

/// Queue subcommands; the queue lives in the state directory between runs.
fn run_queue(library: &Library, queue_path: &Path, action: QueueCommand) -> Result<()> {
    let mut queue = OrderedQueue::load(queue_path)?;

    match action {
        QueueCommand::List => {
            if queue.is_empty() {
                println!(" Queue is empty.");
            }
            for (pos, item) in queue.items().iter().enumerate() {
                println!(" {:>3}. [{}] {}", pos + 1, item.id, item.target_path);
            }
            return Ok(());
        }
        QueueCommand::Add { path } => {
            let (item, created) = library.enqueue(&mut queue, &path)?;
            if created {
                println!(" queued [{}] {}", item.id, item.target_path);
            } else {
                println!(" already queued as [{}]", item.id);
            }
        }
        QueueCommand::Remove { id } => {
            let item = queue.remove(id)?;
            println!(" removed {}", item.target_path);
        }
        QueueCommand::Reorder { ids } => queue.reorder(&ids)?,
        QueueCommand::Clear => {
            let removed = queue.clear();
            println!(" removed {removed} item(s)");
        }
        QueueCommand::Transfer { source, into, mode } => {
            let item = library.transfer(&mut queue, &source, &into, mode)?;
            println!(" {mode} {source} -> [{}] {}", item.id, item.target_path);
        }
    }

    queue.save(queue_path)?;
    Ok(())
}

async fn wait_for_merge(library: &Library, id: JobId) -> Result<()> {
    eprintln!("Merge job {id}");
    let mut last_pct = None;
    loop {
        let status = library.merges().status(id)?;
        if last_pct != Some(status.progress_pct) {
            eprintln!("  {:>3}% {}", status.progress_pct, status.phase);
            last_pct = Some(status.progress_pct);
        }
        match status.status {
            JobStatus::Running => tokio::time::sleep(POLL_INTERVAL).await,
            JobStatus::Done => {
                let output = library.merges().download_path(id)?;
                println!("{}", output.display());
                return Ok(());
            }
            JobStatus::Error => bail!(
                "Merge failed ({}): {}",
                status.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                status.error.unwrap_or_default()
            ),
        }
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
