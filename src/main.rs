//! Counts the fingers of a hand held in front of the webcam.
//!
//! Pass `--picam` to use the first supported capture device instead of `/dev/video0`. Press `q`
//! or close the window to quit.

use std::time::Duration;

use handcount::{
    gui::{self, Key},
    image::Resolution,
    pipeline::{FramePipeline, PipelineConfig},
    termination::Failure,
    timer::FpsCounter,
    video::webcam::{DeviceSelector, Webcam, WebcamOptions},
};

const WINDOW_TITLE: &str = "Hand Gesture Counter";
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn main() {
    handcount::init_logger!();

    let device = parse_args(std::env::args().skip(1));
    gui::run(move || run(device));
}

/// Maps the command line arguments to the capture device to open.
fn parse_args(args: impl IntoIterator<Item = String>) -> DeviceSelector {
    let mut device = DeviceSelector::Index(0);
    for arg in args {
        match arg.as_str() {
            // The Raspberry Pi camera doesn't have a fixed device index.
            "--picam" => device = DeviceSelector::FirstAvailable,
            _ => log::warn!("ignoring unrecognized argument '{arg}'"),
        }
    }
    device
}

fn run(device: DeviceSelector) -> Result<(), Failure> {
    let config = PipelineConfig::from_env().map_err(Failure::config)?;
    let pipeline = FramePipeline::new(config);

    let mut webcam = Webcam::open(
        WebcamOptions::default()
            .device(device)
            .resolution(Resolution::RES_VGA)
            .fps(30),
    )
    .map_err(Failure::camera)?;

    let mut fps = FpsCounter::new("hand gesture counter");
    loop {
        let mut image = match webcam.read() {
            Ok(image) => image,
            Err(e) => {
                log::info!("capture stream ended: {e}");
                break;
            }
        };
        if pipeline.config().is_mirrored() {
            image.flip_horizontal_in_place();
        }

        pipeline.process(&mut image);
        gui::show_image(WINDOW_TITLE, &image)?;

        match gui::wait_key(KEY_POLL_INTERVAL)? {
            Some(Key::Char('q')) => {
                log::info!("'q' pressed, exiting");
                break;
            }
            Some(Key::WindowClosed) => break,
            Some(Key::Char(_)) | None => {}
        }

        fps.tick_with(webcam.timers().chain(pipeline.timers()));
    }

    Ok(())
}
