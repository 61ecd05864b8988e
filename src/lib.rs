//! Live finger counting from a webcam feed.
//!
//! Each camera frame runs through a fixed, memoryless pipeline: grayscale conversion, Gaussian
//! blur, binary threshold, external contour extraction, selection of the largest plausibly-sized
//! contour, and convex hull / convexity defect analysis. Every sufficiently deep defect is taken to
//! be the gap between two fingers, so the finger estimate is the number of deep defects plus one.
//!
//! The entry point is [`pipeline::FramePipeline`].
//!
//! # Coordinates
//!
//! All pixel coordinates use image conventions: X points right, Y points *down*, and `(0, 0)` is
//! the top left corner. "Clockwise" always refers to how a polygon looks on screen.
//!
//! # Environment Variables
//!
//! Some parts of the crate can be overridden by setting environment variables:
//!
//! * `HANDCOUNT_THRESHOLD`, `HANDCOUNT_POLARITY`, `HANDCOUNT_BLUR_KERNEL`, `HANDCOUNT_MIN_AREA`,
//!   `HANDCOUNT_MAX_AREA`, `HANDCOUNT_DEFECT_DEPTH`, `HANDCOUNT_MIRROR`: override fields of the
//!   [`PipelineConfig`] created by [`PipelineConfig::from_env`].
//! * `HANDCOUNT_JPEG_BACKEND`: Configures the JPEG image decoder to use. Allowed values are:
//!   * `mozjpeg`: uses the [mozjpeg] library to decode JPEG images (the default).
//!   * `zune-jpeg`: uses the [zune-jpeg] crate.
//!   * `jpeg-decoder`: uses the [jpeg-decoder] crate.
//! * `HANDCOUNT_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name.
//!
//! [mozjpeg]: https://github.com/mozilla/mozjpeg
//! [zune-jpeg]: https://github.com/etemesi254/zune-jpeg
//! [jpeg-decoder]: https://github.com/image-rs/jpeg-decoder/
//! [`Webcam`]: video::webcam::Webcam
//! [`PipelineConfig`]: pipeline::PipelineConfig
//! [`PipelineConfig::from_env`]: pipeline::PipelineConfig::from_env

use log::LevelFilter;

pub mod contour;
pub mod gui;
pub mod hull;
pub mod image;
pub mod pipeline;
pub mod segment;
pub mod termination;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this crate will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `wgpu` will always log at *warn* level. `RUST_LOG` is parsed afterwards and can override any of
/// this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
