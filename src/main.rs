use clap::{Parser, Subcommand};
use image_enhance::config::{self, AppConfig};
use image_enhance::imaging::{OutputFormat, codec};
use image_enhance::metrics::{JsonFileMetricsStore, MetricsStore};
use image_enhance::output::{self, FileReport};
use image_enhance::pipeline::TransformFlags;
use image_enhance::request::ProcessRequest;
use image_enhance::service::{EnhanceService, ServiceConfig};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "image_enhance=info";

/// Which enhancement to apply. At most one may be given.
#[derive(clap::Args, Clone)]
#[group(multiple = false)]
struct OperationArgs {
    /// Histogram equalization
    #[arg(long)]
    hist: bool,
    /// Contrast stretching
    #[arg(long)]
    cont: bool,
    /// Log compression
    #[arg(long)]
    log: bool,
    /// Reverse video (negative)
    #[arg(long)]
    rev: bool,
    /// Gamma correction (exponent from config)
    #[arg(long)]
    gamma: bool,
}

impl From<&OperationArgs> for TransformFlags {
    fn from(args: &OperationArgs) -> Self {
        TransformFlags {
            hist: args.hist,
            cont: args.cont,
            log: args.log,
            rev: args.rev,
            gamma: args.gamma,
        }
    }
}

#[derive(Parser)]
#[command(name = "image-enhance")]
#[command(about = "Batch image enhancement with per-user usage metrics")]
#[command(long_about = "\
Batch image enhancement with per-user usage metrics

Applies one of five point operations to every image in a batch and keeps a
per-user record of how often each operation ran and how long it took.

Operations:
  --hist    histogram equalization
  --cont    contrast stretching
  --log     log compression
  --rev     reverse video
  --gamma   gamma correction (exponent from config.toml)

With no operation, images pass through unchanged (unless
transforms.require_selection is set).

Run 'image-enhance gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Metrics document (overrides metrics.store_path)
    #[arg(long, global = true)]
    metrics: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enhance image files and write the results
    Process {
        /// User the run is recorded against
        #[arg(long)]
        email: String,
        #[command(flatten)]
        operation: OperationArgs,
        /// Output format (jpeg, png, tiff); defaults to output.format
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Where processed images are written
        #[arg(long, default_value = "processed")]
        out_dir: PathBuf,
        /// Input images
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Handle a JSON request document and print the JSON response
    Request {
        /// Request file, or '-' for stdin
        #[arg(long, default_value = "-")]
        input: PathBuf,
    },
    /// Show stored metrics for a user
    Metrics {
        #[arg(long)]
        email: String,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Process {
            email,
            operation,
            format,
            out_dir,
            files,
        } => {
            let (app_config, store_path) = load_settings(&cli.config_dir, cli.metrics)?;
            init_thread_pool(&app_config.processing);
            let service = open_service(&app_config, &store_path)?;

            let mut payloads = Vec::with_capacity(files.len());
            for file in &files {
                payloads.push(codec::wrap_bytes(&std::fs::read(file)?));
            }
            let mut request = ProcessRequest::new(email, TransformFlags::from(&operation), payloads);
            request.format = format;

            let response = service.handle(&request)?;

            std::fs::create_dir_all(&out_dir)?;
            let suffix = response.operation.map(|k| k.key()).unwrap_or("copy");
            let mut reports = Vec::with_capacity(files.len());
            for (file, payload) in files.iter().zip(&response.processed_images) {
                let out = out_dir.join(output_name(file, suffix, response.format));
                std::fs::write(&out, codec::unwrap_payload(payload)?)?;
                reports.push(FileReport {
                    source: display_name(file),
                    output: Some(out),
                });
            }
            output::print_process_output(&response, &reports);
        }
        Command::Request { input } => {
            let (app_config, store_path) = load_settings(&cli.config_dir, cli.metrics)?;
            init_thread_pool(&app_config.processing);
            let service = open_service(&app_config, &store_path)?;

            let body = read_input(&input)?;
            let (status, json) = service.respond_json(&body)?;
            println!("{json}");
            if status != 200 {
                return Err(format!("request failed with status {status}").into());
            }
        }
        Command::Metrics { email } => {
            let (_, store_path) = load_settings(&cli.config_dir, cli.metrics)?;
            let store = JsonFileMetricsStore::open(&store_path)?;
            output::print_metrics(&email, &store.snapshot(&email)?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: `info` for this crate).
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. Users can lower it, not raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Resolved config plus the metrics document path (`--metrics` wins).
fn load_settings(
    config_dir: &Path,
    metrics: Option<PathBuf>,
) -> Result<(AppConfig, PathBuf), config::ConfigError> {
    let app_config = config::load_config(config_dir)?;
    let store_path =
        metrics.unwrap_or_else(|| app_config.metrics.resolve_store_path(config_dir));
    Ok((app_config, store_path))
}

fn open_service(
    app_config: &AppConfig,
    store_path: &Path,
) -> Result<EnhanceService<JsonFileMetricsStore>, Box<dyn std::error::Error>> {
    let store = JsonFileMetricsStore::open(store_path)?;
    Ok(EnhanceService::new(
        ServiceConfig::from_app_config(app_config),
        store,
    ))
}

fn read_input(input: &Path) -> std::io::Result<String> {
    if input.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        Ok(body)
    } else {
        std::fs::read_to_string(input)
    }
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

/// `dawn.jpg` + `rev` + png → `dawn-rev.png`
fn output_name(file: &Path, suffix: &str, format: OutputFormat) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}-{suffix}.{}", format.extension())
}
