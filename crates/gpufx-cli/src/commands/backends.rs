//! Backends command

use anyhow::Result;

use gpufx_filter::{describe_backends, select_best_backend};

pub fn run(verbose: u8) -> Result<()> {
    print!("{}", describe_backends());
    let best = select_best_backend();
    println!("auto -> {best}");

    if verbose > 0 {
        let ctx = super::open_context(best)?;
        let limits = ctx.limits();
        println!(
            "{}: max texture {}px, {} texture memory",
            ctx.backend_name(),
            limits.max_texture_dim,
            super::format_size(limits.available_memory)
        );
    }
    Ok(())
}
