//! pcinfo - page-cache residency inspector.
//!
//! Prints which files occupy the page cache, either by scanning every
//! physical frame or by walking the dentry and inode lists of supported
//! filesystems. Reports are read through the same named entries a
//! long-running consumer would open.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::Read;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pcinfo_core::collector::HostSource;
#[cfg(target_os = "linux")]
use pcinfo_core::collector::{ImageCollector, MincoreProbe, RealFs};
#[cfg(not(target_os = "linux"))]
use pcinfo_core::collector::{ImageCollector, MockFs};
use pcinfo_core::config::PcInfoConfig;
use pcinfo_core::engine::Accounting;
use pcinfo_core::module::{PcInfoModule, ReportData, ReportKind, build_report};
use pcinfo_core::report::ReportStyle;
use pcinfo_core::transport::ProcRoot;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportArg {
    /// Full scan of physical memory, one line per cached file.
    Pagecache,
    /// Dentry LRU of supported filesystems.
    Dentries,
    /// Inode LRU of supported filesystems.
    Inodes,
    /// Every live inode of supported filesystems.
    AllInodes,
}

impl From<ReportArg> for ReportKind {
    fn from(arg: ReportArg) -> Self {
        match arg {
            ReportArg::Pagecache => ReportKind::PageCache,
            ReportArg::Dentries => ReportKind::Dentries,
            ReportArg::Inodes => ReportKind::InodeLru,
            ReportArg::AllInodes => ReportKind::AllInodes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Page-cache residency inspector.
#[derive(Parser)]
#[command(name = "pcinfo", about = "Page-cache residency inspector", version)]
struct Args {
    /// Report to produce.
    #[arg(value_enum, default_value = "pagecache")]
    report: ReportArg,

    /// Bytes credited per frame: "per-frame" or "file-level".
    #[arg(long, default_value = "per-frame")]
    accounting: Accounting,

    /// Maximum distinct files per full scan. Unbounded by default.
    #[arg(long)]
    pool_capacity: Option<usize>,

    /// Files examined per mounted filesystem.
    #[arg(long, default_value_t = PcInfoConfig::DEFAULT_MAX_FILES_PER_MOUNT)]
    max_files: usize,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Print sizes as "1.5M" instead of exact byte counts.
    #[arg(long)]
    human: bool,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Repeat the report every N seconds until interrupted.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// One report in `--format json`.
#[derive(Serialize)]
struct JsonReport<'a> {
    timestamp: String,
    report: &'a str,
    accounting: &'a str,
    data: ReportData,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr so reports on stdout stay clean.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pcinfo={}", level).parse().unwrap())
        .add_directive(format!("pcinfo_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(target_os = "linux")]
fn host_source(args: &Args) -> Arc<dyn HostSource> {
    Arc::new(
        ImageCollector::new(RealFs::new(), MincoreProbe::new(), &args.proc_path)
            .with_max_files_per_mount(args.max_files),
    )
}

#[cfg(not(target_os = "linux"))]
fn host_source(args: &Args) -> Arc<dyn HostSource> {
    warn!("Not running on Linux, reporting on the mock host");
    let fs = MockFs::typical_host();
    Arc::new(ImageCollector::new(fs.clone(), fs, &args.proc_path).with_max_files_per_mount(args.max_files))
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_text(root: &ProcRoot, kind: ReportKind, stamped: bool) -> Result<(), String> {
    let name = kind.entry_name();
    let mut file = root.open(name).map_err(|e| e.to_string())?;
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|e| format!("reading {}: {}", name, e))?;
    if stamped {
        println!("=== {} {} ===", timestamp(), name);
    }
    print!("{}", text);
    Ok(())
}

fn print_json(source: &dyn HostSource, kind: ReportKind, config: &PcInfoConfig) -> Result<(), String> {
    let image = source.image().map_err(|e| e.to_string())?;
    let data = build_report(kind, &image, config).map_err(|e| e.to_string())?;
    let report = JsonReport {
        timestamp: timestamp(),
        report: kind.entry_name(),
        accounting: config.accounting.name(),
        data,
    };
    let line = serde_json::to_string(&report).map_err(|e| e.to_string())?;
    println!("{}", line);
    Ok(())
}

/// Sleeps up to `interval`, returning early once `running` clears.
fn wait(interval: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(200)));
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!(
        "pcinfo {} ({}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("PCINFO_GIT_SHA")
    );

    let style = if args.human {
        ReportStyle::Human
    } else {
        ReportStyle::Raw
    };
    let config = PcInfoConfig::new(args.accounting, args.pool_capacity)
        .with_style(style)
        .with_proc_path(&args.proc_path)
        .with_max_files_per_mount(args.max_files);
    let kind = ReportKind::from(args.report);
    debug!(
        "Config: report={}, accounting={}, proc={}, max_files={}",
        kind.entry_name(),
        config.accounting.name(),
        config.proc_path,
        config.max_files_per_mount
    );

    let source = host_source(&args);
    let root = Arc::new(ProcRoot::from_config(&config));
    let module = match PcInfoModule::init(Arc::clone(&root), Arc::clone(&source), config.clone()) {
        Ok(module) => module,
        Err(e) => {
            error!("Failed to register report entries: {}", e);
            process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    if let Some(secs) = args.interval {
        let r = running.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            r.store(false, Ordering::SeqCst);
        }) {
            warn!("Failed to set Ctrl-C handler: {}", e);
        }
        info!("Reporting every {}s", secs);
    }

    let mut reports: u64 = 0;
    let mut failed = false;
    loop {
        let result = match args.format {
            OutputFormat::Text => print_text(&root, kind, args.interval.is_some()),
            OutputFormat::Json => print_json(source.as_ref(), kind, &config),
        };
        reports += 1;
        if let Err(e) = result {
            error!("Report #{} failed: {}", reports, e);
            failed = true;
        }

        let Some(secs) = args.interval else {
            break;
        };
        wait(Duration::from_secs(secs), &running);
        if !running.load(Ordering::SeqCst) {
            break;
        }
    }

    drop(module);
    debug!("Produced {} report(s)", reports);
    if failed && args.interval.is_none() {
        process::exit(1);
    }
}
