//! # gpufx-core
//!
//! Types shared between the gpufx filter engine and the code around it:
//!
//! - [`IntSize`], [`IntRect`] - texel-space geometry
//! - [`PixelFormat`], [`WrapMode`] - storage formats and edge rules
//! - [`Bitmap`] - CPU-side image for uploads and readback
//! - [`log`] - engine log categories mapped onto `tracing` targets
//!
//! ## Crate Structure
//!
//! ```text
//! gpufx-core (this crate)
//!    ^
//!    +-- gpufx-filter (kernel, contexts, pipeline, blur)
//!    +-- gpufx-cli
//!    +-- gpufx-bench
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod bitmap;
pub mod error;
pub mod format;
pub mod geom;
pub mod log;

pub use bitmap::Bitmap;
pub use error::{Error, Result};
pub use format::{PixelFormat, WrapMode};
pub use geom::{IntRect, IntSize};
