//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::{cmp::Reverse, env, path::PathBuf};

use anyhow::{bail, Context};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::image::{Image, Resolution};
use crate::timer::Timer;

const ENV_VAR_WEBCAM_NAME: &str = "HANDCOUNT_WEBCAM_NAME";

/// Which capture device to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// Opens `/dev/video<N>`.
    Index(u32),
    /// Opens the first device that supports capturing JPEG frames.
    #[default]
    FirstAvailable,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
}

/// Device selection and format negotiation options.
#[derive(Debug, Default)]
pub struct WebcamOptions {
    device: DeviceSelector,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Selects the capture device to open.
    ///
    /// By default, the first supported device is used.
    #[inline]
    pub fn device(mut self, device: DeviceSelector) -> Self {
        self.device = device;
        self
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> u32 {
        (1.0 / self.frame_interval.as_f32()).round() as u32
    }
}

fn negotiate_format(device: &Device, mut prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found (need JPEG or MJPG)");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    loop {
        if let Some(fmt) = negotiate_format_step(&formats, prefs) {
            return Ok((
                PixFormat::new(
                    fmt.resolution.width(),
                    fmt.resolution.height(),
                    pixel_format,
                ),
                fmt.frame_interval,
            ));
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        if !relax(&mut prefs) {
            break;
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }

    bail!("failed to negotiate a webcam format")
}

/// Drops the least important remaining preference (frame rate before resolution). Returns
/// `false` if there was none left.
fn relax(prefs: &mut FramePrefs) -> bool {
    prefs.fps.take().is_some() || prefs.resolution.take().is_some()
}

fn negotiate_format_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| fmt.resolution.contains(res))
                && prefs.fps.map_or(true, |fps| fmt.fps() >= fps)
        })
        .copied()
        .collect::<Vec<_>>();
    // Pick the smallest resolution that fits, so a requested VGA stream isn't upgraded to 4K.
    eligible.sort_by_key(|fmt| (Reverse(fmt.resolution.num_pixels()), fmt.fps()));
    eligible.last().copied()
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the webcam selected by `options`.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let name = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &name {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
        }
        let name = name.as_deref();

        match options.device {
            DeviceSelector::Index(index) => {
                let path = PathBuf::from(format!("/dev/video{index}"));
                let dev = Device::open(&path).with_context(|| path.display().to_string())?;
                match Self::open_impl(dev, name, options.frame)
                    .with_context(|| path.display().to_string())?
                {
                    Some(webcam) => Ok(webcam),
                    None => bail!(
                        "{} is not a supported video capture device",
                        path.display()
                    ),
                }
            }
            DeviceSelector::FirstAvailable => {
                for res in linuxvideo::list()? {
                    match res {
                        Ok(dev) => match Self::open_impl(dev, name, options.frame) {
                            Ok(Some(webcam)) => return Ok(webcam),
                            Ok(None) => {}
                            Err(e) => {
                                log::debug!("{:#}", e);
                            }
                        },
                        Err(e) => {
                            log::warn!("{}", e);
                        }
                    }
                }

                bail!("no supported webcam device found")
            }
        }
    }

    fn open_impl(
        dev: Device,
        name: Option<&str>,
        prefs: FramePrefs,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = name {
            if caps.card() != name {
                log::debug!("skipping device '{}' (looking for '{name}')", caps.card());
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, prefs)?;

        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let width = format.width();
        let height = format.height();

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            caps.card(),
            path.display(),
            width,
            height,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Some(Self {
            stream,
            width,
            height,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is. Frames that fail to decode
    /// are logged and replaced with a blank image of the stream's resolution.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let image = match self.t_decode.time(|| Image::decode_jpeg(&buf)) {
                    Ok(image) => image,
                    Err(e) => {
                        // USB transfer errors occasionally corrupt MJPEG frames. Skipping the frame
                        // would stall the preview, so a blank frame is shown instead.
                        log::error!("webcam decode error: {}", e);
                        Image::new(self.width, self.height)
                    }
                };
                Ok(image)
            })
            .map_err(Into::into)
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            fmt(320, 240, 30),
            fmt(640, 480, 15),
            fmt(640, 480, 30),
            fmt(1280, 720, 10),
            fmt(1920, 1080, 5),
        ]
    }

    #[test]
    fn picks_smallest_matching_format() {
        let prefs = FramePrefs {
            resolution: Some(Resolution::RES_VGA),
            fps: Some(30),
        };
        assert_eq!(
            negotiate_format_step(&formats(), prefs),
            Some(fmt(640, 480, 30))
        );
    }

    #[test]
    fn no_match() {
        let prefs = FramePrefs {
            resolution: Some(Resolution::RES_720P),
            fps: Some(30),
        };
        assert_eq!(negotiate_format_step(&formats(), prefs), None);
    }

    #[test]
    fn relaxing_drops_frame_rate_first() {
        let mut prefs = FramePrefs {
            resolution: Some(Resolution::RES_720P),
            fps: Some(30),
        };
        assert!(relax(&mut prefs));
        assert_eq!(prefs.fps, None);
        assert_eq!(prefs.resolution, Some(Resolution::RES_720P));
        assert_eq!(
            negotiate_format_step(&formats(), prefs),
            Some(fmt(1280, 720, 10))
        );

        assert!(relax(&mut prefs));
        assert_eq!(prefs.resolution, None);
        assert_eq!(
            negotiate_format_step(&formats(), prefs),
            Some(fmt(320, 240, 30))
        );
        assert!(!relax(&mut prefs));
    }
}
