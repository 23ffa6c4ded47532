//! Tree Inventory CLI
//!
//! Walks a local or network directory and reports per-file metadata.

use clap::{Parser, Subcommand};
use env_logger::Env;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use tree_inventory::{
    cache::{DEFAULT_MAX_AGE_DAYS, DEFAULT_MAX_ENTRIES},
    config::parse_extensions,
    duplicate_stats, find_duplicates, notify_all, CancellationToken, LogNotifier, Notifier, ProgressReporter,
    ResultSink, ScanCache, ScanDatabase, ScanOptions, ScanResult, ScanSession, ScanState, ScanSummary,
};

const ABOUT: &str = r#"
Tree Inventory - network-aware directory inventory

Examples:
  tree_inventory scan /srv/projects                       inventory a local tree
  tree_inventory scan //fileserver/share --ext pdf,docx   only PDFs and Word files
  tree_inventory scan /mnt/nas --db inventory.db          store the result in SQLite
  tree_inventory scan /data --json --progress             JSON result, progress on stderr
  tree_inventory scan /mnt/nas --cache scans.db           reuse a recent scan of the same root
  tree_inventory scan /mnt/nas --time-limit 600           stop after ten minutes
"#;

/// Network-aware directory inventory
#[derive(Parser)]
#[command(name = "tree_inventory")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inventory the files below a directory
    Scan {
        /// Root directory to scan
        root: PathBuf,

        /// Comma separated extensions to include (default: all)
        #[arg(long)]
        ext: Option<String>,

        /// Number of folder columns per record
        #[arg(long)]
        folder_columns: Option<usize>,

        /// Label for the root folder
        #[arg(long)]
        root_name: Option<String>,

        /// Skip creation and modification dates
        #[arg(long)]
        no_dates: bool,

        /// Skip author lookup for office documents
        #[arg(long)]
        no_author: bool,

        /// Keep folder names as they are
        #[arg(long)]
        no_title_case: bool,

        /// Budget for each metadata step in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Extraction workers (0 = auto)
        #[arg(long)]
        workers: Option<usize>,

        /// JSON file with scan options; flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// SQLite database to store the result in
        #[arg(short = 'd', long)]
        db: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Write JSON progress lines to stderr
        #[arg(long)]
        progress: bool,

        /// Report files with identical content
        #[arg(long)]
        duplicates: bool,

        /// SQLite scan cache; a fresh cached scan of the same root is reused
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Roots kept in the scan cache
        #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES)]
        cache_size: usize,

        /// Days before a cached scan expires
        #[arg(long, default_value_t = DEFAULT_MAX_AGE_DAYS)]
        cache_max_age_days: i64,

        /// Cancel the scan after this many seconds
        #[arg(long)]
        time_limit: Option<u64>,
    },
}

/// Options and outputs collected from the command line
struct ScanArgs {
    options: ScanOptions,
    db: Option<PathBuf>,
    json: bool,
    progress: bool,
    duplicates: bool,
    cache: Option<ScanCache>,
    time_limit: Option<Duration>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Scan {
            root,
            ext,
            folder_columns,
            root_name,
            no_dates,
            no_author,
            no_title_case,
            timeout_ms,
            workers,
            config,
            db,
            json,
            progress,
            duplicates,
            cache,
            cache_size,
            cache_max_age_days,
            time_limit,
        }) => {
            let mut options = match config {
                Some(path) => match ScanOptions::load_json(&path) {
                    Ok(options) => options,
                    Err(e) => {
                        eprintln!("Error: cannot load {:?}: {}", path, e);
                        return ExitCode::from(1);
                    }
                },
                None => ScanOptions::default(),
            };
            options.root = root;
            if let Some(list) = ext {
                options.extensions = parse_extensions(&list);
            }
            if let Some(columns) = folder_columns {
                options.folder_columns = columns;
            }
            if root_name.is_some() {
                options.root_name = root_name;
            }
            if let Some(ms) = timeout_ms {
                options.timeout_ms = ms;
            }
            if let Some(n) = workers {
                options.workers = n;
            }
            options.include_dates &= !no_dates;
            options.include_author &= !no_author;
            options.title_case &= !no_title_case;

            let cache = match cache {
                Some(path) => match ScanCache::open(&path) {
                    Ok(cache) => Some(cache.with_limits(cache_size, cache_max_age_days)),
                    Err(e) => {
                        warn!("Scan cache {:?} unavailable: {}", path, e);
                        None
                    }
                },
                None => None,
            };

            run_scan(ScanArgs {
                options,
                db,
                json,
                progress,
                duplicates,
                cache,
                time_limit: time_limit.map(Duration::from_secs),
            })
        }
        None => {
            println!("{}", ABOUT);
            println!("Use 'tree_inventory scan -h' for scan options");
            ExitCode::SUCCESS
        }
    }
}

fn run_scan(mut args: ScanArgs) -> ExitCode {
    info!("Starting inventory of {:?}", args.options.root);
    info!(
        "Timeout: {:?}, workers: {}",
        Duration::from_millis(args.options.timeout_ms),
        if args.options.workers == 0 {
            "auto".to_string()
        } else {
            args.options.workers.to_string()
        }
    );

    let session = match ScanSession::new(args.options.clone()) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    let cached = args.cache.as_mut().and_then(|cache| match cache.get(&session.options().root) {
        Ok(cached) => cached,
        Err(e) => {
            warn!("Scan cache lookup failed: {}", e);
            None
        }
    });

    let result = match cached {
        Some(result) => {
            info!("Using cached scan of {:?} ({} records)", result.root, result.record_count());
            result
        }
        None => match execute(&session, &args) {
            Ok(result) => {
                if let Some(cache) = args.cache.as_mut() {
                    match cache.put(&result) {
                        Ok(Some(scan_id)) => info!("Cached scan {} of {:?}", scan_id, result.root),
                        Ok(None) => {}
                        Err(e) => warn!("Failed to cache scan: {}", e),
                    }
                }
                result
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
        },
    };

    if args.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Failed to serialize result: {}", e),
        }
    } else {
        print_summary(&result);
    }

    if args.duplicates && !result.records.is_empty() {
        let groups = find_duplicates(&result.records);
        let stats = duplicate_stats(&groups);
        if args.json {
            match serde_json::to_string_pretty(&serde_json::json!({ "groups": groups, "stats": stats })) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to serialize duplicates: {}", e),
            }
        } else {
            println!("Duplicates:");
            println!("  Groups: {}", stats.groups);
            println!("  Duplicate files: {}", stats.duplicate_files);
            println!("  Wasted bytes: {}", stats.wasted_bytes);
            for group in &groups {
                println!("  {} x {} bytes ({})", group.count(), group.size, group.hash);
                for path in &group.paths {
                    println!("    {}", path.display());
                }
            }
        }
    }

    match result.state {
        ScanState::Completed | ScanState::Running => ExitCode::SUCCESS,
        ScanState::Aborted => ExitCode::from(2),
        ScanState::Cancelled => ExitCode::from(3),
    }
}

/// Run the walk with reporting, then store and announce the result
fn execute(session: &ScanSession, args: &ScanArgs) -> tree_inventory::error::Result<ScanResult> {
    let reporter = ProgressReporter::new(args.progress, 200);
    reporter.report_start(&session.options().root, session.location(), &session.throttle());

    let cancel = CancellationToken::new();
    let watchdog = args.time_limit.map(|limit| start_watchdog(limit, cancel.clone()));
    let result = session.run(
        |p| {
            reporter.report_progress(p);
        },
        &cancel,
    );
    drop(watchdog);
    let result = result?;

    for error in &result.errors {
        reporter.report_error(error);
    }
    reporter.report_done(&result);

    let output = if result.is_complete() {
        args.db.as_ref().map(|path| write_database(path, &result))
    } else {
        None
    };

    if let Some(summary) = ScanSummary::from_outcome(&result, output) {
        let notifiers: [&dyn Notifier; 2] = [&LogNotifier, &reporter];
        notify_all(&notifiers, &summary);
    }
    Ok(result)
}

/// Cancel `token` once `limit` passes, unless the returned sender is dropped first
fn start_watchdog(limit: Duration, token: CancellationToken) -> Sender<()> {
    let (done_tx, done_rx) = bounded::<()>(0);
    thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(limit) {
            warn!("Time limit of {:?} reached; cancelling scan", limit);
            token.cancel();
        }
    });
    done_tx
}

fn write_database(path: &Path, result: &ScanResult) -> tree_inventory::error::Result<String> {
    let mut db = ScanDatabase::open(path)?;
    db.write(result)
}

fn print_summary(result: &ScanResult) {
    println!("Scan {}:", result.state);
    println!("  Root: {} ({})", result.root.display(), result.location);
    println!("  Records: {}", result.record_count());
    println!("  Errors: {}", result.error_count());
    println!("  Processed: {}", result.processed);
    println!("  Directories: {}", result.dirs_visited);
    println!("  Duration: {}ms", result.duration_ms);
}
