//! Blur command
//!
//! Loads an image, blurs it on one or more rendering contexts and saves the
//! result. With several contexts the filter object is shared between threads
//! and every context must produce the same image.

use anyhow::{Result, anyhow, bail};
use std::thread;
use tracing::{debug, info, trace};

use gpufx_core::log::target;
use gpufx_core::{Bitmap, PixelFormat, WrapMode};
use gpufx_filter::{Backend, BlurFilterConfig, GpuBlurFilter, GpuLimits};

use crate::BlurArgs;

pub fn run(args: BlurArgs, backend: Backend, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), std_dev = args.std_dev, "blur::run");

    let format: PixelFormat = args.format.parse()?;
    let wrap_mode: WrapMode = args.wrap.parse()?;
    if args.contexts == 0 {
        bail!("--contexts must be at least 1");
    }

    let source = super::load_bitmap(&args.input, format)?;
    let filter = GpuBlurFilter::with_config(BlurFilterConfig {
        size: source.size(),
        src_format: format,
        dest_format: format,
        std_dev: args.std_dev,
        clip_borders: args.clip,
        use_float_kernel: args.float_kernel,
        wrap_mode,
        max_radius: args.max_radius,
        ..Default::default()
    })?;

    info!(target: target::APP, size = %source.size(), %format, std_dev = args.std_dev, radius = filter.radius(), contexts = args.contexts, "Applying blur");
    if verbose > 0 {
        println!(
            "Blurring {} ({}, {}) with std_dev {} (radius {})",
            args.input.display(),
            source.size(),
            format,
            args.std_dev,
            filter.radius()
        );
    }

    let outputs = thread::scope(|s| {
        let handles: Vec<_> = (0..args.contexts)
            .map(|_| {
                let (filter, source) = (&filter, &source);
                s.spawn(move || -> Result<(Bitmap, String)> {
                    let mut ctx = super::open_context(backend)?;
                    let out = filter.apply_bitmap(ctx.as_mut(), source)?;
                    filter.release_context(ctx.as_mut());
                    debug!(target: target::APP, context = %ctx.id(), backend = ctx.backend_name(), "context done");
                    Ok((out, ctx.backend_name().to_string()))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("blur thread panicked")).and_then(|r| r))
            .collect::<Result<Vec<_>>>()
    })?;

    let Some((first, backend_name)) = outputs.first() else {
        bail!("no output produced");
    };
    if let Some(i) = outputs.iter().position(|(out, _)| out != first) {
        bail!("context {i} produced a different image");
    }

    super::save_bitmap(&args.output, first)?;

    if verbose > 0 {
        let used = GpuLimits::texture_bytes(first.size(), format);
        println!(
            "Wrote {} ({}, {} per image) on {} context(s) [{}]",
            args.output.display(),
            first.size(),
            super::format_size(used),
            outputs.len(),
            backend_name
        );
    }

    Ok(())
}
