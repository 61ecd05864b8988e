//! Runs the finger counting pipeline on a still image and saves the annotated result.
//!
//! Usage: `annotate_image <input.{jpg,png}> [output.{jpg,png}]`

use anyhow::{bail, Context};
use handcount::{
    image::Image,
    pipeline::{FramePipeline, PipelineConfig},
};

fn main() -> anyhow::Result<()> {
    handcount::init_logger!();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        bail!("usage: annotate_image <input.{{jpg,png}}> [output.{{jpg,png}}]");
    };
    let output = args.next().unwrap_or_else(|| "annotated.png".to_string());

    let config = PipelineConfig::from_env()?;
    let pipeline = FramePipeline::new(config);

    let mut image = Image::load(&input).with_context(|| format!("failed to load '{input}'"))?;
    if pipeline.config().is_mirrored() {
        image.flip_horizontal_in_place();
    }

    match pipeline.analyze(&image) {
        Some(analysis) => {
            log::info!(
                "hand contour: {} points, area {}, {} hull vertices",
                analysis.contour().len(),
                analysis.contour().area(),
                analysis.hull().len(),
            );
            for defect in analysis.defects() {
                log::debug!(
                    "defect at {:?}: depth {:.1} px",
                    analysis.contour().points()[defect.farthest],
                    defect.depth,
                );
            }
            log::info!(
                "fingers: {} (label {})",
                analysis.finger_count(),
                if analysis.should_label() { "shown" } else { "hidden" },
            );
            pipeline.annotate(&mut image, &analysis);
        }
        None => log::info!("no hand-sized contour found"),
    }

    for timer in pipeline.timers() {
        log::debug!("{timer}");
    }

    image
        .save(&output)
        .with_context(|| format!("failed to save '{output}'"))?;
    log::info!("saved annotated image to '{output}'");
    Ok(())
}
