use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use gauge_catalog::config::Settings;
use gauge_catalog::linefind::{LineFindError, LineFindItem, LineFinder, TimestampSource};
use gauge_catalog::{logging, scan, Registry};

#[derive(Parser)]
#[command(name = "gauge-catalog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Catalog gauge images and run the line finder over them", long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to the per-user settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, global = true, env = "GAUGE_CATALOG_DB")]
    db: Option<PathBuf>,

    /// Line-finder executable
    #[arg(long, global = true, env = "LINE_FINDER_BIN")]
    line_finder: Option<PathBuf>,

    /// Seconds before a line-finder run is killed (0 = no limit)
    #[arg(long, global = true, env = "LINE_FINDER_TIMEOUT")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List images under a folder without touching the catalog
    Scan { folder: PathBuf },

    /// Rebuild the catalog from every image under a folder
    Init { folder: PathBuf },

    /// Print catalog rows as filepath<TAB>result
    List,

    /// Run the line finder on one image
    FindLine(FindLineArgs),
}

#[derive(Args)]
struct FindLineArgs {
    /// Read the job from a JSON file instead of flags
    #[arg(long, conflicts_with_all = ["image", "calib"])]
    job: Option<PathBuf>,

    #[arg(long, required_unless_present = "job")]
    image: Option<String>,

    /// filename or exif
    #[arg(long, default_value = "filename")]
    timestamp_src: TimestampSource,

    #[arg(long, default_value_t = 0)]
    timestamp_start_pos: u32,

    #[arg(long, default_value = "yy-mm-dd-hh-mm")]
    timestamp_format: String,

    /// Calibration JSON file
    #[arg(long, required_unless_present = "job")]
    calib: Option<String>,

    /// Where the line finder should write its annotated image
    #[arg(long, default_value = "")]
    result_image: String,

    /// Print the job and command line without running anything
    #[arg(long)]
    dry_run: bool,

    /// Store the output in this image's catalog row
    #[arg(long)]
    record: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let settings = resolve_settings(&cli)?;
    debug!(?settings, "effective settings");

    match &cli.command {
        Commands::Scan { folder } => run_scan(folder),
        Commands::Init { folder } => run_init(&settings, folder),
        Commands::List => run_list(&settings),
        Commands::FindLine(args) => run_find_line(&settings, args),
    }
}

/// Settings file first, then flags and environment on top
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    if let Some(db) = &cli.db {
        settings.database_path = db.clone();
    }
    if let Some(line_finder) = &cli.line_finder {
        settings.line_finder_path = line_finder.clone();
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        settings.timeout_secs = timeout_secs;
    }

    Ok(settings)
}

fn run_scan(folder: &Path) -> Result<()> {
    let paths = scan::scan(folder)
        .with_context(|| format!("Failed to scan {}", folder.display()))?;

    let mut out = io::stdout().lock();
    for path in &paths {
        writeln!(out, "{}", path.display())?;
    }

    info!(count = paths.len(), "🔍 scan complete");
    Ok(())
}

fn run_init(settings: &Settings, folder: &Path) -> Result<()> {
    let mut registry = Registry::new();
    registry
        .open(&settings.database_path)
        .with_context(|| format!("Failed to open {}", settings.database_path.display()))?;

    let report = registry
        .init(folder)
        .with_context(|| format!("Failed to build catalog from {}", folder.display()))?;
    registry.close()?;

    if report.is_empty() {
        println!("No images found in {}", folder.display());
    } else {
        println!(
            "✅ Catalogued {} images in {}",
            report.image_count,
            settings.database_path.display()
        );
    }
    Ok(())
}

fn run_list(settings: &Settings) -> Result<()> {
    let registry = open_existing(&settings.database_path)?;

    let mut out = io::stdout().lock();
    for entry in registry.entries()? {
        writeln!(
            out,
            "{}\t{}",
            entry.filepath,
            entry.result.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

fn run_find_line(settings: &Settings, args: &FindLineArgs) -> Result<()> {
    let job = build_job(args)?;
    let finder = settings.line_finder();

    if args.dry_run {
        println!("{}", job.to_json()?);
        println!(
            "{} {}",
            finder.binary().display(),
            LineFinder::args(&job).join(" ")
        );
        return Ok(());
    }

    let invocation = match finder.invoke(&job) {
        Ok(invocation) => invocation,
        Err(e) => {
            // Pass the line finder's own complaint through before ours
            if let LineFindError::Exit { stderr, .. } = &e {
                io::stderr().write_all(stderr)?;
            }
            return Err(e)
                .with_context(|| format!("Line finder failed for {}", job.image_filepath()));
        }
    };

    io::stdout().write_all(&invocation.stdout)?;

    if !invocation.stderr.is_empty() {
        debug!(stderr = %String::from_utf8_lossy(&invocation.stderr), "line finder stderr");
    }
    info!(
        started_at = %invocation.started_at.to_rfc3339(),
        elapsed_ms = invocation.duration.as_millis() as u64,
        "line finder finished"
    );

    if args.record {
        let mut registry = open_existing(&settings.database_path)?;
        let updated = registry.set_result(job.image_filepath(), &invocation.stdout_lossy())?;
        registry.close()?;
        if updated == 0 {
            bail!(
                "{} is not in the catalog at {}",
                job.image_filepath(),
                settings.database_path.display()
            );
        }
    }

    Ok(())
}

fn build_job(args: &FindLineArgs) -> Result<LineFindItem> {
    if let Some(path) = &args.job {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        return LineFindItem::from_json(&json)
            .with_context(|| format!("Invalid job file {}", path.display()));
    }

    let image = args.image.clone().context("--image is required")?;
    let calib = args.calib.clone().context("--calib is required")?;

    Ok(LineFindItem::new(
        image,
        args.timestamp_src,
        args.timestamp_start_pos,
        args.timestamp_format.clone(),
        calib,
    )
    .with_result_image(args.result_image.clone()))
}

/// Open a catalog that must already exist; never creates an empty file
fn open_existing(db_path: &Path) -> Result<Registry> {
    if !db_path.is_file() {
        bail!(
            "No catalog at {}, run `gauge-catalog init <folder>` first",
            db_path.display()
        );
    }

    let mut registry = Registry::new();
    registry
        .open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    Ok(registry)
}
