//! Kernel command
//!
//! Prints the blur kernel a standard deviation produces.

use anyhow::Result;

use gpufx_filter::{KernelPrecision, build_kernel};

use crate::KernelArgs;

pub fn run(args: KernelArgs) -> Result<()> {
    let precision = KernelPrecision::from_float_flag(args.float);
    let kernel = build_kernel(args.std_dev, args.max_radius, precision)?;

    println!(
        "std_dev {}  radius {}  taps {}  sum {:.6}  precision {:?}",
        kernel.std_dev(),
        kernel.radius(),
        kernel.width(),
        kernel.sum(),
        kernel.precision()
    );
    if kernel.is_clamped() {
        println!("(radius clamped to {})", args.max_radius);
    }

    let r = kernel.radius() as i32;
    for offset in -r..=r {
        let w = kernel.weight(offset);
        match precision {
            KernelPrecision::Quantized => println!("{offset:>5}  {w:.6}  ({:>3}/255)", (w * 255.0).round() as u32),
            KernelPrecision::Float => println!("{offset:>5}  {w:.6}"),
        }
    }
    Ok(())
}
