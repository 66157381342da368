use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use walkdir::WalkDir;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use imgload::image::GenericImageView;
use imgload::{DecodeMode, LoadResult, Loader, LoaderConfig};

#[derive(Parser)]
#[command(name = "imgload-cli")]
#[command(about = "Load image files off the main thread and report what was decoded", long_about = None)]
#[command(version)]
struct Args {
    /// Image files, or directories to search for images
    #[arg(value_name = "INPUT", required = true)]
    input: Vec<PathBuf>,

    /// Where the decoder reads from
    #[arg(short, long, value_enum)]
    mode: Option<DecodeModeArg>,

    /// Number of decoding threads, defaults to the number of logical CPUs
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// Config file, defaults to ~/.config/imgload/config.json
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save the effective settings to the config file before loading
    #[arg(long, default_value_t)]
    save_config: bool,

    /// Print one JSON object per file
    #[arg(long, default_value_t)]
    json: bool,

    /// Verbose output
    #[arg(short, long, default_value_t)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, default_value_t)]
    quiet: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum DecodeModeArg {
    Memory,
    Path,
}

impl From<DecodeModeArg> for DecodeMode {
    fn from(arg: DecodeModeArg) -> Self {
        match arg {
            DecodeModeArg::Memory => DecodeMode::Memory,
            DecodeModeArg::Path => DecodeMode::Path,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct Report {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<LoadResult<usize>> for Report {
    fn from(result: LoadResult<usize>) -> Self {
        let dimensions = result.data.as_ref().map(|img| img.dimensions());
        Report {
            color: result.data.as_ref().map(|img| format!("{:?}", img.color())),
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            error: (!result.error.is_empty()).then_some(result.error),
            path: result.filename,
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "ico", "pnm", "pbm", "pgm", "ppm",
    "tga", "qoi",
];

fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose, args.quiet);

    let config = build_config(&args)?;
    log::debug!("loader config: {config:?}");

    if args.save_config {
        let path = save_config(&config, args.config.as_deref())?;
        log::info!("Saved config to {}", path.display());
    }

    let files = find_files(&args.input);
    if files.is_empty() {
        anyhow::bail!("No image files found");
    }

    if !args.quiet {
        log::info!("Loading {} files", files.len());
    }

    let reports = load_all(&files, &config);

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    for report in &reports {
        print_report(report, args.json)?;
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} files could not be loaded", reports.len());
    }

    Ok(())
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<LoaderConfig> {
    let mut config = match &args.config {
        // about to be created
        Some(path) if args.save_config && !path.exists() => LoaderConfig::default(),
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::load().unwrap_or_default(),
    };

    if let Some(mode) = args.mode {
        config.decode_mode = mode.into();
    }

    if let Some(threads) = args.threads {
        if threads == 0 {
            anyhow::bail!("Thread count must be at least 1");
        }
        config.worker_threads = Some(threads);
    }

    Ok(config)
}

fn save_config(config: &LoaderConfig, path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => {
            config.save_to(path)?;
            Ok(path.to_owned())
        }
        None => config.save(),
    }
}

fn find_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    fn is_image(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            // named explicitly, let the loader decide
            files.push(input.clone());
            continue;
        }

        for entry in WalkDir::new(input).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_image(entry.path()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable entry: {e}"),
            }
        }
    }

    files
}

/// Submit every file at once so decoding overlaps, then drive the loader
fn load_all(files: &[PathBuf], config: &LoaderConfig) -> Vec<Report> {
    let loader = Loader::with_config(config);
    let results: Rc<RefCell<Vec<LoadResult<usize>>>> = Rc::default();

    for (i, file) in files.iter().enumerate() {
        let results = Rc::clone(&results);
        loader.decode(file.clone(), i, move |result| {
            if !result.error.is_empty() {
                log::debug!("{}: {}", result.filename.display(), result.error);
            }
            results.borrow_mut().push(result);
        });
    }
    loader.run_until_idle();

    let mut results = results.take();
    results.sort_by_key(|result| result.user_token);
    results.into_iter().map(Report::from).collect()
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(report).context("Failed to serialize report")?;
        println!("{line}");
        return Ok(());
    }

    match (&report.error, report.width, report.height, &report.color) {
        (Some(error), ..) => println!("{}: {error}", report.path.display()),
        (None, Some(w), Some(h), Some(color)) => {
            println!("{}: {w}x{h} {color}", report.path.display())
        }
        _ => println!("{}: no image", report.path.display()),
    }

    Ok(())
}
