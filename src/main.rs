//! CLI entry point for `mboxrank`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mboxrank::config::{self, Config};
use mboxrank::consolidate::consolidate;
use mboxrank::engine::{CancelToken, Engine, Progress, RunOutput};
use mboxrank::model::filter::{DateWindow, FilterSpec};
use mboxrank::model::ranked::RankedGroup;
use mboxrank::parser::header::parse_date;
use mboxrank::source::{ByteSource, FileSource};
use mboxrank::store::sqlite::store_path_for;
use mboxrank::store::{MemoryStore, OverflowStore, SqliteStore};

#[derive(Parser)]
#[command(
    name = "mboxrank",
    version,
    about = "Rank the sending domains of an MBOX archive"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Count messages per sender domain
    Analyze(AnalyzeArgs),
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// MBOX file to analyze
    #[arg(value_name = "FILE")]
    path: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Drop domains containing this text (repeatable)
    #[arg(long, value_name = "DOMAIN")]
    exclude: Vec<String>,

    /// Fold subdomains into their root domain
    #[arg(long)]
    join_subdomains: bool,

    /// Keep domains active on or after this date
    #[arg(long, value_name = "DATE", value_parser = parse_since)]
    since: Option<DateTime<Utc>>,

    /// Keep domains active on or before this date
    #[arg(long, value_name = "DATE", value_parser = parse_until)]
    until: Option<DateTime<Utc>>,

    /// Hide domains with fewer messages
    #[arg(long, value_name = "N", default_value_t = 0)]
    min_count: u64,

    /// Show only the first N domains
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Senders listed under each domain in table output
    #[arg(long, value_name = "N", default_value_t = 3)]
    senders: usize,

    /// Keep spilled aggregates in memory instead of an on-disk store
    #[arg(long)]
    memory_store: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Analyze(args) => cmd_analyze(&args, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = config::log_file_path(config);
    let log_dir = log_file.parent().map(Path::to_path_buf);
    match log_dir {
        Some(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let file_appender = tracing_appender::rolling::never(&dir, "mboxrank.log");
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxrank", &mut std::io::stdout());
    Ok(())
}

fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Rank the sender domains of one file.
fn cmd_analyze(args: &AnalyzeArgs, config: &Config) -> anyhow::Result<()> {
    let options = config.engine_options()?;
    let mut source = FileSource::open(&args.path)?;
    let file_size = source.len();

    let store: Box<dyn OverflowStore> = if args.memory_store {
        Box::new(MemoryStore::new())
    } else {
        let store_path = store_path_for(&args.path, &config::cache_dir(config));
        Box::new(SqliteStore::open(store_path)?)
    };
    let mut engine = Engine::new(store, options);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "Could not install interrupt handler");
    }

    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Analyzing [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
            )?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let result = engine.run(
        &mut source,
        Some(&|p: &Progress| {
            pb.set_position(p.bytes_processed);
            let mut msg = format!("{} msgs", p.messages);
            if let Some(mem) = p.memory {
                msg.push_str(&format!(
                    ", ~{} of ~{} in memory",
                    format_size(mem.used_bytes, BINARY),
                    format_size(mem.total_bytes, BINARY)
                ));
            }
            pb.set_message(msg);
        }),
        &cancel,
    );
    pb.finish_and_clear();

    let output = match result {
        Ok(output) => output,
        Err(e) if e.is_cancelled() => {
            eprintln!("  Cancelled.");
            RunOutput::empty()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("analyzing {}", args.path.display()));
        }
    };
    let elapsed = start.elapsed();

    let filter = FilterSpec {
        excluded_domains: args.exclude.clone(),
        join_subdomains: args.join_subdomains,
        date_window: match (args.since, args.until) {
            (None, None) => None,
            (start, end) => Some(DateWindow { start, end }),
        },
        min_count: args.min_count,
    };
    let mut groups = consolidate(output.groups.clone(), &filter, &config.domains.domain_tables());
    if let Some(top) = args.top {
        groups.truncate(top);
    }

    if args.json {
        print_json(&args.path, file_size, &output, &groups, elapsed)
    } else {
        print_table(&args.path, file_size, &output, &groups, args.senders, elapsed);
        Ok(())
    }
}

fn parse_since(s: &str) -> Result<DateTime<Utc>, String> {
    parse_cli_date(s, false)
}

fn parse_until(s: &str) -> Result<DateTime<Utc>, String> {
    parse_cli_date(s, true)
}

/// A bare `YYYY-MM-DD` covers the whole day; anything else goes through the
/// mail date parser.
fn parse_cli_date(s: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(day) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        let time = if end_of_day {
            day.and_hms_opt(23, 59, 59)
        } else {
            day.and_hms_opt(0, 0, 0)
        };
        return time
            .map(|t| t.and_utc())
            .ok_or_else(|| format!("invalid date '{s}'"));
    }
    parse_date(s).ok_or_else(|| format!("unrecognized date '{s}' (try YYYY-MM-DD)"))
}

fn date_span(earliest: Option<DateTime<Utc>>, latest: Option<DateTime<Utc>>) -> String {
    let fmt = |d: Option<DateTime<Utc>>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "?".to_string())
    };
    if earliest.is_none() && latest.is_none() {
        String::new()
    } else {
        format!("{} .. {}", fmt(earliest), fmt(latest))
    }
}

fn print_table(
    path: &Path,
    file_size: u64,
    output: &RunOutput,
    groups: &[RankedGroup],
    senders: usize,
    elapsed: std::time::Duration,
) {
    let summary = &output.summary;
    println!();
    println!("  {:<20} {}", "File", path.display());
    println!("  {:<20} {}", "File size", format_size(file_size, BINARY));
    println!("  {:<20} {}", "Messages", summary.messages);
    println!("  {:<20} {}", "Domains", output.groups.len());
    println!("  {:<20} {}", "Batches", summary.batches);
    println!("  {:<20} {}", "Spills", summary.spills);
    if summary.failed_store_writes > 0 {
        println!(
            "  {:<20} {} domain(s) lost",
            "Failed store writes", summary.failed_store_writes
        );
    }
    println!("  {:<20} {:.2?}", "Time", elapsed);
    println!();

    if groups.is_empty() {
        println!("  No domains to show.");
        println!();
        return;
    }

    println!("  {:<5} {:>8}  {:<40} {:<3} {}", "#", "Count", "Domain", "", "Active");
    println!("  {}", "-".repeat(84));
    for (i, group) in groups.iter().enumerate() {
        let domain: String = group.domain.chars().take(40).collect();
        println!(
            "  {:<5} {:>8}  {:<40} {:<3} {}",
            i + 1,
            group.total_count,
            domain,
            if group.is_personal { "(p)" } else { "" },
            date_span(group.earliest, group.latest)
        );
        for sender in group.senders.iter().take(senders) {
            println!("  {:<5} {:>8}    {}", "", sender.count, sender.address);
        }
        if group.senders.len() > senders && senders > 0 {
            println!(
                "  {:<5} {:>8}    ... {} more",
                "",
                "",
                group.senders.len() - senders
            );
        }
    }
    println!();
}

fn print_json(
    path: &Path,
    file_size: u64,
    output: &RunOutput,
    groups: &[RankedGroup],
    elapsed: std::time::Duration,
) -> anyhow::Result<()> {
    let summary = &output.summary;
    let doc = serde_json::json!({
        "file": path.to_string_lossy(),
        "file_size": file_size,
        "messages": summary.messages,
        "domains": output.groups.len(),
        "batches": summary.batches,
        "spills": summary.spills,
        "failed_store_writes": summary.failed_store_writes,
        "elapsed_ms": elapsed.as_millis(),
        "groups": groups,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
