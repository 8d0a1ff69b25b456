//! # Chronolog CLI - inspect and rewind an event timeline
//!
//! Operator interface for a chronolog store.
//!
//! ## Usage
//! ```bash
//! # Create a store in .chronolog
//! chronolog init
//!
//! # Append an event
//! chronolog log --type FILE_CREATED --actor user --payload '{"path":"a.txt"}'
//!
//! # Read events back
//! chronolog query --category file --limit 20
//!
//! # Reconstruct the state as of a past instant
//! chronolog rewind 2025-01-01T12:00:00Z --output ./rewound
//! ```

use anyhow::{anyhow, bail, Context};
use chronolog::utils::{format_bytes, format_timestamp, parse_timestamp};
use chronolog::{
    CausationNode, ComparisonStatus, CompressionStrategy, Event, EventCategory, EventInput, EventType, GitMode,
    ProgressInfo, QueryFilter, RewindOptions, SortOrder, Timeline, TimelineBuilder, TimelineError,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Chronolog CLI - event timeline with time-travel rewind
#[derive(Parser)]
#[command(name = "chronolog")]
#[command(version)]
#[command(about = "Append-only event timeline with snapshots and time-travel rewind")]
#[command(long_about = None)]
struct Cli {
    /// Store directory
    #[arg(short, long, global = true, default_value = ".chronolog")]
    store: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new store
    Init {
        /// Compression for blobs and snapshots
        #[arg(long, value_enum, default_value = "fast")]
        compression: CompressionMode,

        /// Largest file content stored as a blob, in bytes (0 = unlimited)
        #[arg(long)]
        max_blob_size: Option<u64>,

        /// Snapshot after this many events (0 disables)
        #[arg(long)]
        events_interval: Option<u64>,

        /// Snapshots kept by retention (0 keeps all)
        #[arg(long)]
        max_snapshots: Option<usize>,
    },

    /// Append an event
    Log {
        /// Event type, e.g. FILE_CREATED
        #[arg(short = 't', long = "type")]
        event_type: String,

        /// Who produced the event
        #[arg(short, long, default_value = "user")]
        actor: String,

        /// JSON payload
        #[arg(short, long)]
        payload: Option<String>,

        /// Aggregate id, e.g. a file path
        #[arg(long)]
        aggregate: Option<String>,

        /// Aggregate type, e.g. file
        #[arg(long)]
        aggregate_type: Option<String>,

        /// Correlation id shared by related events
        #[arg(long)]
        correlation: Option<String>,

        /// Id of the event that caused this one
        #[arg(long)]
        causation: Option<String>,
    },

    /// Filter events
    #[command(alias = "q")]
    Query {
        /// Event types (repeatable)
        #[arg(short = 't', long = "type")]
        types: Vec<String>,

        /// Categories (repeatable)
        #[arg(short, long)]
        category: Vec<String>,

        #[arg(long)]
        actor: Option<String>,

        #[arg(long)]
        aggregate: Option<String>,

        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        correlation: Option<String>,

        /// Inclusive start (ISO-8601 or epoch ms)
        #[arg(long)]
        since: Option<String>,

        /// Inclusive end (ISO-8601 or epoch ms)
        #[arg(long)]
        until: Option<String>,

        #[arg(short, long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Newest first
        #[arg(long)]
        desc: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show everything an event caused
    Chain {
        event_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Show all events sharing a correlation id
    Correlation {
        correlation_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Search payload text
    Search {
        text: String,

        #[arg(short, long, default_value = "100")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Event counts by type, category and actor
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Check events, blobs and snapshots for corruption
    Verify {
        #[arg(long)]
        json: bool,
    },

    /// Manage snapshots
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Reconstruct the state at a past instant
    Rewind {
        /// Target (ISO-8601 or epoch ms)
        timestamp: String,

        /// Output directory (must not exist)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compare restored files with this directory
        #[arg(long)]
        compare: Option<PathBuf>,

        /// Skip file contents
        #[arg(long)]
        no_files: bool,

        /// Omit the conversation from session_state.json
        #[arg(long)]
        no_conversations: bool,

        /// Git output: none, metadata or full
        #[arg(long, default_value = "metadata")]
        git_mode: GitMode,

        /// Repository cloned by --git-mode full (defaults to the current directory)
        #[arg(long)]
        git_source: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Read and write blobs
    Blob {
        #[command(subcommand)]
        command: BlobCommand,
    },
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Take a snapshot now
    Create {
        #[arg(short, long, default_value = "manual")]
        reason: String,
    },
    /// List snapshots, newest first
    #[command(alias = "ls")]
    List,
    /// Apply retention now
    Cleanup,
    /// Snapshot count and sizes
    Stats,
}

#[derive(Subcommand)]
enum BlobCommand {
    /// Store a file, printing its hash
    Put { file: PathBuf },
    /// Write a blob to stdout or a file
    Get {
        hash: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CompressionMode {
    None,
    Fast,
    Adaptive,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store = cli.store;
    match cli.command {
        Commands::Init {
            compression,
            max_blob_size,
            events_interval,
            max_snapshots,
        } => cmd_init(&store, compression, max_blob_size, events_interval, max_snapshots),
        Commands::Log {
            event_type,
            actor,
            payload,
            aggregate,
            aggregate_type,
            correlation,
            causation,
        } => cmd_log(
            &open(&store)?,
            &event_type,
            actor,
            payload,
            aggregate,
            aggregate_type,
            correlation,
            causation,
        ),
        Commands::Query {
            types,
            category,
            actor,
            aggregate,
            session,
            correlation,
            since,
            until,
            limit,
            offset,
            desc,
            json,
        } => {
            let filter = QueryFilter {
                start_time: since.as_deref().map(parse_timestamp).transpose()?,
                end_time: until.as_deref().map(parse_timestamp).transpose()?,
                event_types: types
                    .iter()
                    .map(|t| t.parse::<EventType>().map_err(|e| anyhow!(e)))
                    .collect::<anyhow::Result<_>>()?,
                categories: category
                    .iter()
                    .map(|c| c.parse::<EventCategory>().map_err(|e| anyhow!(e)))
                    .collect::<anyhow::Result<_>>()?,
                actor,
                aggregate_id: aggregate,
                session_id: session,
                correlation_id: correlation,
                limit: Some(limit),
                offset,
                order: if desc { SortOrder::Desc } else { SortOrder::Asc },
                ..Default::default()
            };
            cmd_query(&open(&store)?, &filter, json)
        }
        Commands::Chain { event_id, json } => cmd_chain(&open(&store)?, &event_id, json),
        Commands::Correlation { correlation_id, json } => {
            let events = open(&store)?.query().get_correlation_chain(&correlation_id)?;
            if json {
                return print_json(&events);
            }
            if events.is_empty() {
                println!("{}", "No events share that correlation id.".yellow());
            }
            for event in &events {
                print_event(event);
            }
            Ok(())
        }
        Commands::Search { text, limit, json } => {
            let filter = QueryFilter {
                limit: Some(limit),
                ..Default::default()
            };
            let result = open(&store)?.query().search_payload(&text, &filter)?;
            if json {
                return print_json(&result);
            }
            for event in &result.events {
                print_event(event);
            }
            println!("{}", format!("{} matches", result.total).dimmed());
            Ok(())
        }
        Commands::Stats { json } => cmd_stats(&open(&store)?, json),
        Commands::Verify { json } => cmd_verify(&open(&store)?, json),
        Commands::Snapshot { command } => cmd_snapshot(&open(&store)?, command),
        Commands::Rewind {
            timestamp,
            output,
            compare,
            no_files,
            no_conversations,
            git_mode,
            git_source,
            json,
        } => {
            let mut options = RewindOptions::new(parse_timestamp(&timestamp)?)
                .include_files(!no_files)
                .include_conversations(!no_conversations)
                .git_mode(git_mode)
                .requested_by("cli");
            if let Some(output) = output {
                options = options.output_dir(output);
            }
            if let Some(compare) = compare {
                options = options.compare_with(compare);
            }
            if let Some(repo) = git_source {
                options = options.git_source(repo);
            }
            cmd_rewind(&open(&store)?, options, json)
        }
        Commands::Blob { command } => cmd_blob(&open(&store)?, command),
    }
}

fn open(store: &Path) -> anyhow::Result<Timeline> {
    Timeline::open(store).map_err(|e| anyhow!(e.user_message()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn cmd_init(
    store: &Path,
    compression: CompressionMode,
    max_blob_size: Option<u64>,
    events_interval: Option<u64>,
    max_snapshots: Option<usize>,
) -> anyhow::Result<()> {
    if Timeline::exists(store) {
        bail!("a store already exists at {}", store.display());
    }

    let mut builder = TimelineBuilder::new().compression_strategy(match compression {
        CompressionMode::None => CompressionStrategy::None,
        CompressionMode::Fast => CompressionStrategy::Fast,
        CompressionMode::Adaptive => CompressionStrategy::Adaptive { min_size: 4096 },
    });
    if let Some(size) = max_blob_size {
        builder = builder.max_blob_size(size);
    }
    if let Some(events) = events_interval {
        builder = builder.events_interval(events);
    }
    if let Some(count) = max_snapshots {
        builder = builder.max_snapshots(count);
    }
    let timeline = builder
        .init(store)
        .with_context(|| format!("failed to initialize store at {}", store.display()))?;

    println!("{} Initialized chronolog store", "✓".green().bold());
    println!("  Store: {}", timeline.root().display().to_string().cyan());
    println!(
        "  Snapshots: every {} events, keeping {}",
        timeline.config().snapshot.events_interval.to_string().cyan(),
        timeline.config().snapshot.max_snapshots.to_string().cyan()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_log(
    timeline: &Timeline,
    event_type: &str,
    actor: String,
    payload: Option<String>,
    aggregate: Option<String>,
    aggregate_type: Option<String>,
    correlation: Option<String>,
    causation: Option<String>,
) -> anyhow::Result<()> {
    let event_type: EventType = event_type.parse().map_err(|e: String| anyhow!(e))?;
    let mut input = EventInput::new(event_type, actor);
    if let Some(payload) = payload {
        let value: serde_json::Value = serde_json::from_str(&payload).context("payload is not valid JSON")?;
        input = input.payload_json(value);
    }
    if let Some(id) = aggregate {
        input = input.aggregate(id, aggregate_type.unwrap_or_else(|| "unknown".to_string()));
    }
    if let Some(id) = correlation {
        input = input.correlation(id);
    }
    if let Some(id) = causation {
        input = input.caused_by(id);
    }
    if let Ok(host) = hostname::get() {
        input = input.metadata(serde_json::json!({ "host": host.to_string_lossy(), "source": "cli" }));
    }

    let result = timeline.log(input);
    if !result.success {
        bail!(result.error.unwrap_or_else(|| "event was not recorded".to_string()));
    }
    println!(
        "{} Logged event {} (sequence {})",
        "✓".green().bold(),
        result.event_id.unwrap_or_default().yellow(),
        result.sequence_number.unwrap_or_default().to_string().cyan()
    );
    Ok(())
}

fn print_event(event: &Event) {
    let aggregate = match (&event.aggregate_type, &event.aggregate_id) {
        (Some(kind), Some(id)) => format!("{}:{}", kind, id),
        (None, Some(id)) => id.clone(),
        _ => String::new(),
    };
    println!(
        "{:>6} {} {} {} {}",
        format!("#{}", event.sequence_number).dimmed(),
        format_timestamp(event.timestamp).dimmed(),
        event.event_type.as_str().yellow().bold(),
        event.actor.cyan(),
        aggregate
    );
}

fn cmd_query(timeline: &Timeline, filter: &QueryFilter, json: bool) -> anyhow::Result<()> {
    let result = timeline.query().query(filter)?;
    if json {
        return print_json(&result);
    }
    if result.events.is_empty() {
        println!("{}", "No matching events.".yellow());
        return Ok(());
    }
    for event in &result.events {
        print_event(event);
    }
    let shown_to = result.offset.saturating_add(result.events.len());
    println!(
        "{}",
        format!("Showing {}-{} of {}", result.offset.saturating_add(1), shown_to, result.total).dimmed()
    );
    if result.has_more {
        println!("{}", format!("More available: --offset {}", shown_to).dimmed());
    }
    Ok(())
}

fn print_node(node: &CausationNode, prefix: &str, last: bool, root: bool) {
    let connector = if root {
        ""
    } else if last {
        "└── "
    } else {
        "├── "
    };
    println!(
        "{}{}{} {} {}",
        prefix,
        connector,
        node.event.event_type.as_str().yellow().bold(),
        node.event.id.dimmed(),
        format_timestamp(node.event.timestamp).dimmed()
    );
    let child_prefix = if root {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, if last { "    " } else { "│   " })
    };
    for (i, child) in node.children.iter().enumerate() {
        print_node(child, &child_prefix, i + 1 == node.children.len(), false);
    }
}

fn cmd_chain(timeline: &Timeline, event_id: &str, json: bool) -> anyhow::Result<()> {
    let tree = timeline
        .query()
        .get_causation_chain(event_id)?
        .ok_or_else(|| anyhow!(TimelineError::EventNotFound(event_id.to_string())))?;
    if json {
        return print_json(&tree);
    }
    print_node(&tree, "", true, true);
    println!(
        "{}",
        format!("{} caused events, depth {}", tree.descendant_count(), tree.height()).dimmed()
    );
    Ok(())
}

fn cmd_stats(timeline: &Timeline, json: bool) -> anyhow::Result<()> {
    let stats = timeline.query().get_stats(&QueryFilter::default())?;
    if json {
        return print_json(&stats);
    }
    println!("{}", "Timeline statistics".blue().bold());
    println!("  Events: {}", stats.total_events.to_string().cyan());
    if stats.total_events > 0 {
        println!(
            "  Range: {} .. {}",
            format_timestamp(stats.time_range.earliest).cyan(),
            format_timestamp(stats.time_range.latest).cyan()
        );
    }
    for (title, counts) in [
        ("By category", &stats.events_by_category),
        ("By type", &stats.events_by_type),
        ("By actor", &stats.events_by_actor),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!("\n{}", title.bold());
        let mut sorted: Vec<_> = counts.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (name, count) in sorted {
            println!("  {:<32} {}", name, count.to_string().cyan());
        }
    }
    Ok(())
}

fn cmd_verify(timeline: &Timeline, json: bool) -> anyhow::Result<()> {
    let pb = spinner("Verifying store...");
    let report = timeline.verify()?;
    pb.finish_and_clear();

    if json {
        print_json(&report)?;
    } else {
        println!("{}", report.summary());
    }
    if !report.is_valid() {
        bail!("integrity problems found");
    }
    println!("{} Store is consistent", "✓".green().bold());
    Ok(())
}

fn cmd_snapshot(timeline: &Timeline, command: SnapshotCommand) -> anyhow::Result<()> {
    let snapshots = timeline.snapshots();
    match command {
        SnapshotCommand::Create { reason } => {
            let pb = spinner("Creating snapshot...");
            let metadata = timeline.create_snapshot(&reason)?;
            pb.finish_and_clear();
            println!("{} Created snapshot {}", "✓".green().bold(), metadata.snapshot_id.yellow());
            println!("  Sequence: {}", metadata.sequence_number.to_string().cyan());
            println!("  Files: {}", metadata.file_count.to_string().cyan());
            println!(
                "  Size: {} ({} uncompressed)",
                format_bytes(metadata.compressed_size_bytes).cyan(),
                format_bytes(metadata.uncompressed_size_bytes)
            );
        }
        SnapshotCommand::List => {
            let list = snapshots.list_snapshots()?;
            if list.is_empty() {
                println!("{}", "No snapshots.".yellow());
            }
            for snapshot in list {
                println!(
                    "{} {} seq {} {} files {} {}",
                    snapshot.snapshot_id.yellow(),
                    format_timestamp(snapshot.timestamp).dimmed(),
                    snapshot.sequence_number.to_string().cyan(),
                    snapshot.file_count,
                    format_bytes(snapshot.compressed_size_bytes),
                    snapshot.reason.dimmed()
                );
            }
        }
        SnapshotCommand::Cleanup => {
            let removed = snapshots.cleanup()?;
            println!("{} Removed {} snapshots", "✓".green().bold(), removed.to_string().cyan());
        }
        SnapshotCommand::Stats => {
            let stats = snapshots.get_stats()?;
            println!("  Snapshots: {}", stats.total_snapshots.to_string().cyan());
            println!("  Total size: {}", format_bytes(stats.total_compressed_bytes).cyan());
            println!("  Average: {:.1} KiB", stats.avg_compressed_size_kb);
            if let (Some(oldest), Some(newest)) = (stats.oldest_timestamp, stats.newest_timestamp) {
                println!("  Range: {} .. {}", format_timestamp(oldest), format_timestamp(newest));
            }
        }
    }
    Ok(())
}

fn cmd_rewind(timeline: &Timeline, options: RewindOptions, json: bool) -> anyhow::Result<()> {
    let pb = spinner("Rewinding...");
    let progress_bar = pb.clone();
    let options = options.on_progress(Arc::new(move |info: ProgressInfo| {
        match info.total {
            Some(total) if total > 1 => progress_bar.set_message(format!("{} ({}/{})", info.message, info.processed, total)),
            _ => progress_bar.set_message(info.message),
        }
    }));
    let report = timeline.rewind(&options);
    pb.finish_and_clear();

    if json {
        print_json(&report)?;
        if !report.success {
            bail!(report.error.unwrap_or_default());
        }
        return Ok(());
    }

    if !report.success {
        let step = report.failed_step.map(|s| s.to_string()).unwrap_or_default();
        bail!("rewind failed at {}: {}", step, report.error.unwrap_or_default());
    }

    println!(
        "{} Rewound to {}",
        "✓".green().bold(),
        format_timestamp(report.target_timestamp).yellow()
    );
    println!("  Output: {}", report.output_directory.display().to_string().cyan());
    println!(
        "  Snapshot: {}",
        report.snapshot_used.as_deref().unwrap_or("none (full replay)").cyan()
    );
    println!("  Events replayed: {}", report.events_replayed.to_string().cyan());
    println!("  Files restored: {}", report.files_restored.to_string().cyan());
    if report.files_skipped > 0 {
        println!("  Files skipped: {}", report.files_skipped.to_string().yellow());
    }
    if let Some(repo) = &report.git_repository {
        println!("  Repository: {}", repo.display().to_string().cyan());
    }
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );

    if let Some(comparison) = &report.comparison {
        println!(
            "\n{} {} added, {} deleted, {} modified, {} unchanged",
            "Comparison:".bold(),
            comparison.added.to_string().green(),
            comparison.deleted.to_string().red(),
            comparison.modified.to_string().yellow(),
            comparison.unchanged
        );
        for file in comparison.files.iter().filter(|f| f.status != ComparisonStatus::Unchanged) {
            let marker = match file.status {
                ComparisonStatus::Added => "+".green(),
                ComparisonStatus::Deleted => "-".red(),
                ComparisonStatus::Modified => "~".yellow(),
                ComparisonStatus::Unchanged => " ".normal(),
            };
            println!("  {} {}", marker, file.path);
        }
    }
    Ok(())
}

fn cmd_blob(timeline: &Timeline, command: BlobCommand) -> anyhow::Result<()> {
    match command {
        BlobCommand::Put { file } => {
            let content = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            match timeline.store_blob(&content)? {
                Some(hash) => println!("{}", hash),
                None => bail!(
                    "{} is {} which exceeds the blob size limit",
                    file.display(),
                    format_bytes(content.len() as u64)
                ),
            }
        }
        BlobCommand::Get { hash, output } => {
            let content = timeline
                .retrieve_blob(&hash)
                .ok_or_else(|| anyhow!(TimelineError::BlobNotFound(hash.clone())))?;
            match output {
                Some(path) => {
                    fs::write(&path, &content).with_context(|| format!("failed to write {}", path.display()))?;
                    println!("{} Wrote {} to {}", "✓".green().bold(), format_bytes(content.len() as u64), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&content)?;
                }
            }
        }
    }
    Ok(())
}
