//! Drawing helpers for visualizing analysis results.
//!
//! Every function returns a guard that performs the drawing when dropped, so optional settings can
//! be chained onto the call.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Circle, Polyline, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use image::{GrayImage, Luma};
use imageproc::{filter::separable_filter_equal, point::Point as ImagePoint};

use crate::image::{Color, Image};

/// Guard returned by [`circle`]; draws the circle when dropped and allows customization.
pub struct DrawCircle<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    radius: u32,
    stroke_width: u32,
    filled: bool,
    color: Color,
}

impl<'a> DrawCircle<'a> {
    /// Sets the circle's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the circle's stroke width.
    ///
    /// By default, a stroke width of 1 is used. Ignored for filled circles.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }

    /// Fills the circle instead of only drawing its outline.
    pub fn filled(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl<'a> Drop for DrawCircle<'a> {
    fn drop(&mut self) {
        let style = if self.filled {
            PrimitiveStyle::with_fill(self.color)
        } else {
            PrimitiveStyle::with_stroke(self.color, self.stroke_width)
        };
        let circle = Circle::with_center(Point::new(self.x, self.y), self.radius * 2 + 1);
        match circle.into_styled(style).draw(&mut Target(&mut *self.image)) {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`contour`]; draws the closed outline when dropped and allows customization.
pub struct DrawContour<'a> {
    image: &'a mut Image,
    points: Vec<Point>,
    color: Color,
    stroke_width: u32,
}

impl<'a> DrawContour<'a> {
    /// Sets the outline color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the outline's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl<'a> Drop for DrawContour<'a> {
    fn drop(&mut self) {
        match Polyline::new(&self.points)
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width))
            .draw(&mut Target(&mut *self.image))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`text`]; draws the text when dropped and allows customization.
pub struct DrawText<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    text: &'a str,
    color: Color,
    alignment: Alignment,
    baseline: Baseline,
    stroke_width: u32,
}

impl<'a> DrawText<'a> {
    /// Sets the text color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the horizontal stroke width of the glyphs.
    ///
    /// By default, a stroke width of 1 is used. Wider strokes repeat the glyphs one pixel further
    /// to the right for every extra pixel.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width.max(1);
        self
    }

    /// Puts the text's baseline on the `y` coordinate, like handwriting on a ruled line.
    pub fn align_baseline(&mut self) -> &mut Self {
        self.baseline = Baseline::Alphabetic;
        self
    }

    /// Aligns the left side of the text with the `x` coordinate.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }
}

impl<'a> Drop for DrawText<'a> {
    fn drop(&mut self) {
        let character_style = MonoTextStyle::new(&ascii::FONT_10X20, BinaryColor::On);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        let text_at =
            |pos: Point| Text::with_text_style(self.text, pos, character_style, text_style);

        // The glyphs are rasterized into a coverage mask with a 1 pixel border for the smoothed
        // edges, then blended onto the image.
        let bbox = text_at(Point::new(self.x, self.y)).bounding_box();
        let origin = bbox.top_left - Point::new(1, 1);
        let mut mask = Mask(GrayImage::new(
            bbox.size.width + self.stroke_width + 1,
            bbox.size.height + 2,
        ));
        for dx in 0..self.stroke_width as i32 {
            let pos = Point::new(self.x + dx, self.y) - origin;
            match text_at(pos).draw(&mut mask) {
                Ok(_) => {}
                Err(infallible) => match infallible {},
            }
        }

        let smoothed = separable_filter_equal(&mask.0, &[0.25f32, 0.5, 0.25]);
        for (mx, my, &Luma([hard])) in mask.0.enumerate_pixels() {
            let coverage = hard.max(smoothed[(mx, my)].0[0]);
            let (x, y) = (origin.x + mx as i32, origin.y + my as i32);
            if coverage == 0
                || x < 0
                || y < 0
                || x as u32 >= self.image.width()
                || y as u32 >= self.image.height()
            {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            let blended = blend(self.image.get(x, y), self.color, coverage);
            self.image.set(x, y, blended);
        }
    }
}

/// Mixes `fg` over `bg`, with `coverage` 255 yielding `fg` and 0 yielding `bg`.
fn blend(bg: Color, fg: Color, coverage: u8) -> Color {
    let a = u32::from(coverage);
    let mix = |i: usize| {
        ((u32::from(fg.0[i]) * a + u32::from(bg.0[i]) * (255 - a) + 127) / 255) as u8
    };
    Color([mix(0), mix(1), mix(2), bg.0[3].max(coverage)])
}

/// Draws a circle of the given radius around `(x, y)`.
pub fn circle(image: &mut Image, x: i32, y: i32, radius: u32) -> DrawCircle<'_> {
    DrawCircle {
        image,
        x,
        y,
        radius,
        stroke_width: 1,
        filled: false,
        color: Color::RED,
    }
}

/// Draws the outline of a closed polygon, connecting the last point back to the first.
pub fn contour<'a>(image: &'a mut Image, points: &[ImagePoint<i32>]) -> DrawContour<'a> {
    let mut points = points
        .iter()
        .map(|p| Point::new(p.x, p.y))
        .collect::<Vec<_>>();
    if let Some(&first) = points.first() {
        points.push(first);
    }
    DrawContour {
        image,
        points,
        color: Color::GREEN,
        stroke_width: 1,
    }
}

/// Draws a text string onto an image.
///
/// By default, the text is drawn centered horizontally and vertically around `x` and `y`.
pub fn text<'a>(image: &'a mut Image, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        image,
        x,
        y,
        text,
        color: Color::from_rgb8(255, 0, 0),
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
        stroke_width: 1,
    }
}

struct Target<'a>(&'a mut Image);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = (self.0.width(), self.0.height());

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for pixel in pixels {
            let rgb = pixel.1 .0;
            if pixel.0.x >= 0
                && (pixel.0.x as u32) < self.0.width()
                && pixel.0.y >= 0
                && (pixel.0.y as u32) < self.0.height()
            {
                self.0.set(pixel.0.x as _, pixel.0.y as _, Color(rgb));
            }
        }

        Ok(())
    }
}

/// Single-channel glyph coverage, 255 where the font sets a pixel.
struct Mask(GrayImage);

impl OriginDimensions for Mask {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Mask {
    type Color = BinaryColor;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for Pixel(p, color) in pixels {
            if color.is_on()
                && p.x >= 0
                && (p.x as u32) < self.0.width()
                && p.y >= 0
                && (p.y as u32) < self.0.height()
            {
                self.0.put_pixel(p.x as u32, p.y as u32, Luma([255]));
            }
        }

        Ok(())
    }
}
