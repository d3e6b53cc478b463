use clap::{Parser, Subcommand, ValueEnum};
use photofeed::config::{self, ServiceConfig};
use photofeed::imaging::{OutputFormat, RustBackend, TransformError, crop_icon, render_derivative};
use photofeed::render::Renderer;
use photofeed::sizes::{DerivativeKind, SizeClass};
use photofeed::{logging, prewarm};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "photofeed")]
#[command(about = "Maintenance tool for the photofeed image store")]
#[command(long_about = "\
Maintenance tool for the photofeed image store

Originals live under the data directory, derivatives under the cache
directory:

  data/
  ├── image/{ref}.jpg          # Uploaded photos, as received
  └── icon/{ref}.png           # Avatars, square-cropped at upload
  static/
  ├── image/{s,m,l}/{ref}.jpg  # Photo derivatives (s/m cropped + resized, l = original)
  └── icon/{s,m,l}/{ref}.png   # Avatar derivatives (resized)

Derivatives are created lazily on first request. 'prewarm' creates every
photo derivative up front.

Run 'photofeed gen-config' to generate a documented photofeed.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, env = "PHOTOFEED_CONFIG", default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate every photo derivative for every stored original
    Prewarm,
    /// Run the derivative pipeline on a single file; the output extension
    /// (jpg, jpeg or png) picks the encoding
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Size class
        #[arg(long, default_value = "s")]
        size: SizeArg,
        /// Size table to use (and square-crop step for icons)
        #[arg(long, value_enum, default_value_t = KindArg::Image)]
        kind: KindArg,
    },
    /// Print a stock photofeed.toml with all options documented
    GenConfig,
    /// Load and validate the config file
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Image,
    Icon,
}

impl From<KindArg> for DerivativeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => DerivativeKind::Image,
            KindArg::Icon => DerivativeKind::Icon,
        }
    }
}

#[derive(Clone, Copy)]
struct SizeArg(SizeClass);

impl std::str::FromStr for SizeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SizeClass::parse(s)
            .map(SizeArg)
            .ok_or_else(|| format!("expected s, m or l, got {s:?}"))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::CheckConfig => {
            let config = config::load_config(&cli.config)?;
            println!("==> {} is valid", cli.config.display());
            println!("    data:   {}", config.data_dir.display());
            println!("    cache:  {}", config.cache_dir.display());
            println!(
                "    feed:   {}s timeout, {}s interval, {} per page",
                config.feed.timeout_secs, config.feed.interval_secs, config.feed.page_size
            );
        }
        Command::Prewarm => {
            let config = config::load_config(&cli.config)?;
            logging::init(&config.log_level);
            init_thread_pool(&config.processing);

            let renderer = Renderer::from_config(&config, Box::new(RustBackend::new()));
            println!("==> Prewarming {}", config.data_dir.display());
            let report = prewarm::prewarm(&renderer)?;
            println!("Derivatives: {report}");
            println!("Cache: {}", renderer.cache().stats());
        }
        Command::Convert {
            input,
            output,
            size,
            kind,
        } => {
            let config = config::load_config(&cli.config)?;
            logging::init(&config.log_level);
            convert(&config, &input, &output, kind.into(), size.0)?;
        }
    }

    Ok(())
}

/// Encoding named by the output file's extension.
fn output_format(output: &Path) -> Result<OutputFormat, TransformError> {
    let ext = output.extension().and_then(|e| e.to_str()).unwrap_or_default();
    OutputFormat::from_extension(ext)
}

/// Icons are cropped first, the way uploads are, then resized.
///
/// Nothing is written unless the whole pipeline succeeds.
fn convert(
    config: &ServiceConfig,
    input: &Path,
    output: &Path,
    kind: DerivativeKind,
    size: SizeClass,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = output_format(output)?;
    let backend = RustBackend::new();
    let mut source = std::fs::read(input)?;
    let table = match kind {
        DerivativeKind::Image => &config.images,
        DerivativeKind::Icon => {
            source = crop_icon(&backend, &source)?;
            &config.icons
        }
    };

    let mut plan = kind.plan(size, table);
    if plan.target.is_original() && format != plan.format {
        return Err(format!(
            "size {size} passes the original through unchanged; write it to a .{} file",
            plan.format.extension()
        )
        .into());
    }
    plan.format = format;
    let bytes = render_derivative(&backend, source, &plan)?;
    std::fs::write(output, &bytes)?;
    info!(input = %input.display(), output = %output.display(), %kind, %size, "converted");
    println!("{} → {} ({} bytes)", input.display(), output.display(), bytes.len());
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores; config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
