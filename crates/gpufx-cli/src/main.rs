//! gpufx - Gaussian blur on GPU rendering contexts
//!
//! Blurs image files, prints kernels and lists the available backends.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use gpufx_core::log::{LOG_CATEGORIES_ENV, LogCategories};
use gpufx_filter::Backend;
use gpufx_filter::kernel::DEFAULT_MAX_RADIUS;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gpufx")]
#[command(author, version, about = "Separable Gaussian blur on GPU rendering contexts")]
#[command(long_about = "
Separable Gaussian blur running on a GPU (wgpu) or software rendering context.

Examples:
  gpufx blur in.png -o out.png -s 2.5           # Blur with std_dev 2.5
  gpufx blur in.png -o out.png --clip           # Drop border pixels
  gpufx blur in.exr -o out.exr -f rgba32f --float-kernel
  gpufx blur in.png -o out.png --contexts 4     # Same filter on 4 contexts
  gpufx kernel -s 1.0                           # Print kernel weights
  gpufx backends                                # List rendering backends

Logging:
  --log SHADER:MEMORY or GPUFX_LOG_CATEGORIES=SHADER:MEMORY
  RUST_LOG overrides both.
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Rendering backend: auto, cpu, wgpu
    #[arg(short, long, global = true, default_value = "auto")]
    backend: String,

    /// Log categories, colon separated (e.g. SHADER:MEMORY)
    #[arg(long, global = true)]
    log: Option<String>,

    /// Number of threads for the software context (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Blur an image file
    Blur(BlurArgs),

    /// Print the Gaussian kernel for a standard deviation
    #[command(visible_alias = "k")]
    Kernel(KernelArgs),

    /// List rendering backends
    Backends,
}

#[derive(Args)]
struct BlurArgs {
    /// Input image
    input: PathBuf,

    /// Output image (.exr keeps float values)
    #[arg(short, long)]
    output: PathBuf,

    /// Standard deviation in pixels
    #[arg(short = 's', long, default_value = "2.0")]
    std_dev: f32,

    /// Only output pixels whose kernel lies fully inside the image
    #[arg(long)]
    clip: bool,

    /// Use full-precision kernel weights
    #[arg(long)]
    float_kernel: bool,

    /// Edge rule: clamp, repeat, mirror
    #[arg(short, long, default_value = "clamp")]
    wrap: String,

    /// Texture format: i8, rgba8, bgra8, rgba16f, rgba32f
    #[arg(short, long, default_value = "rgba8")]
    format: String,

    /// Largest kernel radius
    #[arg(long, default_value_t = DEFAULT_MAX_RADIUS)]
    max_radius: u32,

    /// Run the same filter on this many contexts in parallel
    #[arg(long, default_value = "1")]
    contexts: usize,
}

#[derive(Args)]
struct KernelArgs {
    /// Standard deviation in pixels
    #[arg(short = 's', long, default_value = "1.0")]
    std_dev: f32,

    /// Full-precision weights instead of 1/255 steps
    #[arg(long)]
    float: bool,

    /// Largest kernel radius
    #[arg(long, default_value_t = DEFAULT_MAX_RADIUS)]
    max_radius: u32,
}

/// Installs the stderr subscriber.
///
/// Categories come from `--log`, else from the environment; `RUST_LOG`
/// replaces the resulting filter entirely.
fn init_logging(verbose: u8, categories: Option<&str>) -> Result<()> {
    let categories = match categories {
        Some(list) => LogCategories::parse(list).context("Invalid --log value")?,
        None => LogCategories::from_env().with_context(|| format!("Invalid {LOG_CATEGORIES_ENV}"))?,
    };
    let mut directives = categories.to_filter_directives();
    match verbose {
        0 => {}
        1 => directives.push_str(",gpufx=debug"),
        _ => directives.push_str(",gpufx=trace"),
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log.as_deref())?;

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let backend: Backend = cli.backend.parse()?;

    match cli.command {
        Commands::Blur(args) => commands::blur::run(args, backend, cli.verbose),
        Commands::Kernel(args) => commands::kernel::run(args),
        Commands::Backends => commands::backends::run(cli.verbose),
    }
}
