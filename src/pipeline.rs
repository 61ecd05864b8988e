//! The per-frame finger counting pipeline.
//!
//! [`FramePipeline::process`] runs every stage on a camera frame and draws the results onto it.
//! The analysis and drawing halves are also available separately as [`FramePipeline::analyze`]
//! and [`FramePipeline::annotate`].
//!
//! No state is carried from one frame to the next: all intermediate buffers are owned by a single
//! [`FramePipeline::analyze`] call.

use std::{env, fmt, ops::RangeInclusive, str::FromStr};

use anyhow::{anyhow, bail};
use imageproc::point::Point;

use crate::{
    contour::{self, Contour},
    hull::{self, ConvexHull, Defect},
    image::{draw, Color, Image},
    segment::{self, Polarity},
    timer::Timer,
};

const ENV_VAR_THRESHOLD: &str = "HANDCOUNT_THRESHOLD";
const ENV_VAR_POLARITY: &str = "HANDCOUNT_POLARITY";
const ENV_VAR_BLUR_KERNEL: &str = "HANDCOUNT_BLUR_KERNEL";
const ENV_VAR_MIN_AREA: &str = "HANDCOUNT_MIN_AREA";
const ENV_VAR_MAX_AREA: &str = "HANDCOUNT_MAX_AREA";
const ENV_VAR_DEFECT_DEPTH: &str = "HANDCOUNT_DEFECT_DEPTH";
const ENV_VAR_MIRROR: &str = "HANDCOUNT_MIRROR";

const DEFECT_MARKER_RADIUS: u32 = 5;
const CONTOUR_STROKE_WIDTH: u32 = 2;
const LABEL_STROKE_WIDTH: u32 = 2;
const LABEL_POS: (i32, i32) = (10, 30);

/// Tunable parameters of a [`FramePipeline`].
///
/// The defaults work for a dark hand held in front of a bright background at a distance of about
/// half a meter from a VGA webcam.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    threshold: u8,
    polarity: Polarity,
    blur_kernel: u32,
    min_area: f64,
    max_area: f64,
    defect_depth_threshold: f32,
    label_range: RangeInclusive<u32>,
    mirror: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: 70,
            polarity: Polarity::DarkForeground,
            blur_kernel: 7,
            min_area: 1000.0,
            max_area: 50000.0,
            defect_depth_threshold: 15000.0,
            label_range: 5..=10,
            mirror: false,
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration and applies any `HANDCOUNT_*` environment variable
    /// overrides.
    ///
    /// Returns an error naming the offending variable if a value cannot be parsed, or if the
    /// resulting configuration is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| match env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(anyhow!("`{name}`: {e}")),
        })
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> anyhow::Result<Option<String>>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(threshold) = parse_var(&lookup, ENV_VAR_THRESHOLD)? {
            config.threshold = threshold;
        }
        if let Some(polarity) = parse_var(&lookup, ENV_VAR_POLARITY)? {
            config.polarity = polarity;
        }
        if let Some(kernel) = parse_var(&lookup, ENV_VAR_BLUR_KERNEL)? {
            config.blur_kernel = kernel;
        }
        if let Some(area) = parse_var(&lookup, ENV_VAR_MIN_AREA)? {
            config.min_area = area;
        }
        if let Some(area) = parse_var(&lookup, ENV_VAR_MAX_AREA)? {
            config.max_area = area;
        }
        if let Some(depth) = parse_var(&lookup, ENV_VAR_DEFECT_DEPTH)? {
            config.defect_depth_threshold = depth;
        }
        if let Some(mirror) = lookup(ENV_VAR_MIRROR)? {
            config.mirror = match mirror.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => bail!("invalid value for `{ENV_VAR_MIRROR}`: '{other}' (expected 0 or 1)"),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the parameters describe a usable pipeline.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            bail!(
                "blur kernel size must be a positive odd number (got {})",
                self.blur_kernel
            );
        }
        if !self.defect_depth_threshold.is_finite() {
            bail!(
                "defect depth threshold must be finite (got {})",
                self.defect_depth_threshold
            );
        }
        if !self.min_area.is_finite() || !self.max_area.is_finite() {
            bail!(
                "contour area bounds must be finite (got {}..{})",
                self.min_area,
                self.max_area
            );
        }
        if self.min_area >= self.max_area {
            bail!(
                "minimum contour area {} must be below maximum area {}",
                self.min_area,
                self.max_area
            );
        }
        Ok(())
    }

    /// Sets the binarization threshold (0-255).
    #[inline]
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets which side of the threshold is treated as the hand.
    #[inline]
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Sets the size of the Gaussian blur kernel. A size of 1 disables blurring.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or even.
    #[inline]
    pub fn blur_kernel(mut self, size: u32) -> Self {
        assert!(size % 2 == 1, "blur kernel size must be odd (got {size})");
        self.blur_kernel = size;
        self
    }

    /// Sets the exclusive range of contour areas (in square pixels) that can be selected as the
    /// hand.
    #[inline]
    pub fn area_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_area = min;
        self.max_area = max;
        self
    }

    /// Sets the depth a convexity defect must exceed to count as the gap between two fingers.
    ///
    /// The depth is the distance in pixels between the line through a hull edge and the deepest
    /// contour point below it. The default of 15000 exceeds any distance in a VGA frame, so the
    /// count stays at 1 until a smaller threshold is configured.
    #[inline]
    pub fn defect_depth_threshold(mut self, depth: f32) -> Self {
        self.defect_depth_threshold = depth;
        self
    }

    /// Sets the range of finger counts for which the "Fingers: N" label is drawn.
    #[inline]
    pub fn label_range(mut self, range: RangeInclusive<u32>) -> Self {
        self.label_range = range;
        self
    }

    /// Enables or disables mirroring of camera frames before they are processed.
    #[inline]
    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Returns whether frames should be flipped horizontally before processing.
    #[inline]
    pub fn is_mirrored(&self) -> bool {
        self.mirror
    }
}

fn parse_var<T>(
    lookup: impl Fn(&str) -> anyhow::Result<Option<String>>,
    name: &str,
) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(value) = lookup(name)? else {
        return Ok(None);
    };
    log::debug!("config override: `{name}` is set to '{value}'");
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e| anyhow!("invalid value for `{name}`: '{value}' ({e})"))
}

/// Result of analyzing the hand contour of a frame.
#[derive(Debug, Clone)]
pub struct HandAnalysis {
    contour: Contour,
    hull: ConvexHull,
    defects: Vec<Defect>,
    /// Indices into `defects` of the defects deeper than the configured threshold.
    qualifying: Vec<usize>,
    label: bool,
}

impl HandAnalysis {
    /// Computes the convex hull and convexity defects of `contour` and counts the fingers.
    ///
    /// The contour does not have to come from an image, which allows analyzing synthetic shapes.
    pub fn from_contour(contour: Contour, config: &PipelineConfig) -> Self {
        let hull = ConvexHull::of(&contour);
        let defects = hull::convexity_defects(&contour, &hull);
        let qualifying = defects
            .iter()
            .enumerate()
            .filter(|(_, defect)| defect.depth > config.defect_depth_threshold)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let label = config
            .label_range
            .contains(&(qualifying.len() as u32 + 1));

        Self {
            contour,
            hull,
            defects,
            qualifying,
            label,
        }
    }

    /// Returns the contour that was selected as the hand.
    #[inline]
    pub fn contour(&self) -> &Contour {
        &self.contour
    }

    #[inline]
    pub fn hull(&self) -> &ConvexHull {
        &self.hull
    }

    /// Returns all convexity defects of the contour, including shallow ones.
    #[inline]
    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    /// Returns the defects deep enough to be the gaps between fingers.
    pub fn qualifying_defects(&self) -> impl Iterator<Item = &Defect> + '_ {
        self.qualifying.iter().map(|&i| &self.defects[i])
    }

    /// Returns the deepest contour point of every qualifying defect.
    pub fn defect_points(&self) -> impl Iterator<Item = Point<i32>> + '_ {
        self.qualifying_defects()
            .map(|defect| self.contour.points()[defect.farthest])
    }

    /// Returns the estimated number of extended fingers (qualifying defects + 1).
    #[inline]
    pub fn finger_count(&self) -> u32 {
        self.qualifying.len() as u32 + 1
    }

    /// Returns whether the finger count lies in the configured label range.
    #[inline]
    pub fn should_label(&self) -> bool {
        self.label
    }
}

/// Counts fingers in camera frames and annotates them.
pub struct FramePipeline {
    config: PipelineConfig,
    t_grayscale: Timer,
    t_blur: Timer,
    t_threshold: Timer,
    t_contours: Timer,
    t_hull: Timer,
}

impl Default for FramePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl FramePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        log::debug!("creating frame pipeline with {config:?}");
        Self {
            config,
            t_grayscale: Timer::new("grayscale"),
            t_blur: Timer::new("blur"),
            t_threshold: Timer::new("threshold"),
            t_contours: Timer::new("contours"),
            t_hull: Timer::new("hull"),
        }
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Segments `image`, selects the hand contour and analyzes it.
    ///
    /// Returns `None` if no foreground region has an area within the configured bounds.
    pub fn analyze(&self, image: &Image) -> Option<HandAnalysis> {
        let gray = self.t_grayscale.time(|| segment::grayscale(image));
        let blurred = self
            .t_blur
            .time(|| segment::blur(&gray, self.config.blur_kernel));
        let mask = self.t_threshold.time(|| {
            segment::threshold(&blurred, self.config.threshold, self.config.polarity)
        });
        let mut contours = self.t_contours.time(|| contour::find_external(&mask));

        let index = contour::select_hand(&contours, self.config.min_area, self.config.max_area)?;
        let hand = contours.swap_remove(index);

        let analysis = self
            .t_hull
            .time(|| HandAnalysis::from_contour(hand, &self.config));
        log::trace!(
            "{} contours, hand area {}, {} defects, {} fingers",
            contours.len() + 1,
            analysis.contour().area(),
            analysis.defects().len(),
            analysis.finger_count(),
        );
        Some(analysis)
    }

    /// Draws the results of `analysis` onto `image`.
    ///
    /// Qualifying defects are marked with red dots and the hand contour is outlined in green. The
    /// "Fingers: N" label is only drawn when the count lies in the configured label range.
    pub fn annotate(&self, image: &mut Image, analysis: &HandAnalysis) {
        for point in analysis.defect_points() {
            draw::circle(image, point.x, point.y, DEFECT_MARKER_RADIUS)
                .filled()
                .color(Color::RED);
        }

        draw::contour(image, analysis.contour().points())
            .color(Color::GREEN)
            .stroke_width(CONTOUR_STROKE_WIDTH);

        if analysis.should_label() {
            let label = format!("Fingers: {}", analysis.finger_count());
            let (x, y) = LABEL_POS;
            draw::text(image, x, y, &label)
                .align_left()
                .align_baseline()
                .stroke_width(LABEL_STROKE_WIDTH)
                .color(Color::GREEN);
        }
    }

    /// Analyzes `image` and draws the results onto it.
    ///
    /// The image is left untouched if no hand contour is found.
    pub fn process(&self, image: &mut Image) {
        if let Some(analysis) = self.analyze(image) {
            self.annotate(image, &analysis);
        }
    }

    /// Returns profiling timers for the pipeline stages.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [
            &self.t_grayscale,
            &self.t_blur,
            &self.t_threshold,
            &self.t_contours,
            &self.t_hull,
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::f64::consts::PI;

    use super::*;

    /// A star with `spikes` tips at `outer` radius and valleys at `inner` radius.
    fn star(spikes: usize, outer: f64, inner: f64) -> Contour {
        let (cx, cy) = (320.0, 240.0);
        Contour::from_coords((0..spikes * 2).map(|i| {
            let radius = if i % 2 == 0 { outer } else { inner };
            let angle = i as f64 * PI / spikes as f64;
            (
                (cx + radius * angle.cos()).round() as i32,
                (cy + radius * angle.sin()).round() as i32,
            )
        }))
    }

    /// Counts every defect deeper than 40 pixels.
    fn counting() -> PipelineConfig {
        PipelineConfig::default().defect_depth_threshold(40.0)
    }

    fn lookup(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> anyhow::Result<Option<String>> + 'static {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| Ok(vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.threshold, 70);
        assert_eq!(config.polarity, Polarity::DarkForeground);
        assert_eq!(config.blur_kernel, 7);
        assert_eq!(config.min_area, 1000.0);
        assert_eq!(config.max_area, 50000.0);
        assert_eq!(config.defect_depth_threshold, 15000.0);
        assert_eq!(config.label_range, 5..=10);
        assert!(!config.is_mirrored());
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (ENV_VAR_THRESHOLD, "100"),
            (ENV_VAR_POLARITY, "light"),
            (ENV_VAR_BLUR_KERNEL, " 5 "),
            (ENV_VAR_MIN_AREA, "500"),
            (ENV_VAR_MAX_AREA, "1e5"),
            (ENV_VAR_DEFECT_DEPTH, "8000"),
            (ENV_VAR_MIRROR, "1"),
        ]))
        .unwrap();

        assert_eq!(
            config,
            PipelineConfig::default()
                .threshold(100)
                .polarity(Polarity::LightForeground)
                .blur_kernel(5)
                .area_bounds(500.0, 100000.0)
                .defect_depth_threshold(8000.0)
                .mirror(true)
        );

        assert_eq!(
            PipelineConfig::from_lookup(lookup(&[])).unwrap(),
            PipelineConfig::default()
        );
    }

    #[test]
    fn invalid_env_values_name_the_variable() {
        for vars in [
            [(ENV_VAR_THRESHOLD, "300")],
            [(ENV_VAR_POLARITY, "inverse")],
            [(ENV_VAR_MIN_AREA, "lots")],
            [(ENV_VAR_MIRROR, "yes")],
        ] {
            let err = PipelineConfig::from_lookup(lookup(&vars)).unwrap_err();
            let msg = format!("{err:#}");
            assert!(msg.contains(vars[0].0), "{msg}");
        }
    }

    #[test]
    fn invalid_configs() {
        let err = PipelineConfig::from_lookup(lookup(&[(ENV_VAR_BLUR_KERNEL, "4")])).unwrap_err();
        assert!(err.to_string().contains("odd"), "{err}");

        let err = PipelineConfig::from_lookup(lookup(&[(ENV_VAR_MIN_AREA, "60000")])).unwrap_err();
        assert!(err.to_string().contains("below"), "{err}");

        assert!(PipelineConfig::default()
            .area_bounds(f64::NAN, 10.0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .defect_depth_threshold(f32::INFINITY)
            .validate()
            .is_err());
    }

    #[test]
    #[should_panic]
    fn even_blur_kernel_panics() {
        PipelineConfig::default().blur_kernel(6);
    }

    #[test]
    fn convex_shape_counts_one() {
        let rect = Contour::from_coords([(200, 100), (300, 100), (300, 200), (200, 200)]);
        let analysis = HandAnalysis::from_contour(rect, &PipelineConfig::default());
        assert_eq!(analysis.finger_count(), 1);
        assert!(!analysis.should_label());
        assert_eq!(analysis.defect_points().count(), 0);
    }

    #[test]
    fn four_deep_defects_count_five() {
        let analysis = HandAnalysis::from_contour(star(4, 150.0, 20.0), &counting());
        assert_eq!(analysis.defects().len(), 4);
        assert_eq!(analysis.finger_count(), 5);
        assert!(analysis.should_label());

        // every valley is a defect point
        let valleys = star(4, 150.0, 20.0)
            .points()
            .iter()
            .skip(1)
            .step_by(2)
            .copied()
            .collect::<Vec<_>>();
        for point in analysis.defect_points() {
            assert!(valleys.contains(&point), "{point:?}");
        }
    }

    #[test]
    fn ten_deep_defects_count_eleven() {
        let analysis = HandAnalysis::from_contour(star(10, 150.0, 20.0), &counting());
        assert_eq!(analysis.finger_count(), 11);
        assert!(!analysis.should_label());
    }

    #[test]
    fn default_threshold_is_in_pixels() {
        // valleys ~122px deep: far below 15000 pixels
        let analysis =
            HandAnalysis::from_contour(star(10, 150.0, 20.0), &PipelineConfig::default());
        assert_eq!(analysis.defects().len(), 10);
        for defect in analysis.defects() {
            assert!((120.0..125.0).contains(&defect.depth), "{defect:?}");
        }
        assert_eq!(analysis.finger_count(), 1);
        assert_eq!(analysis.defect_points().count(), 0);
        assert!(!analysis.should_label());
    }

    #[test]
    fn shallow_defects_do_not_count() {
        // valleys ~16px deep
        let analysis = HandAnalysis::from_contour(star(4, 150.0, 90.0), &counting());
        assert_eq!(analysis.defects().len(), 4);
        assert_eq!(analysis.finger_count(), 1);

        let config = PipelineConfig::default().defect_depth_threshold(10.0);
        let analysis = HandAnalysis::from_contour(star(4, 150.0, 90.0), &config);
        assert_eq!(analysis.finger_count(), 5);
    }

    #[test]
    fn label_range_is_configurable() {
        let config = counting().label_range(1..=3);
        let rect = Contour::from_coords([(200, 100), (300, 100), (300, 200), (200, 200)]);
        assert!(HandAnalysis::from_contour(rect, &config).should_label());
        assert!(!HandAnalysis::from_contour(star(4, 150.0, 20.0), &config).should_label());
    }

    #[test]
    fn timers_cover_every_stage() {
        let pipeline = FramePipeline::default();
        let names = pipeline.timers().map(Timer::name).collect::<Vec<_>>();
        assert_eq!(names, ["grayscale", "blur", "threshold", "contours", "hull"]);
    }
}
