//! Foreground segmentation: grayscale conversion, smoothing and binary thresholding.
//!
//! All functions here allocate and return a fresh single-channel buffer. The buffers are owned by
//! the caller and dropped at the end of the frame that produced them.

use std::str::FromStr;

use anyhow::bail;
use image::{GrayImage, Luma, Rgba};
use imageproc::{filter::separable_filter_equal, map::map_colors};

use crate::image::Image;

/// Which side of the threshold counts as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Pixels darker than the threshold are foreground (binary inverse threshold).
    ///
    /// Suited for a dark hand in front of a lighter background.
    #[default]
    DarkForeground,
    /// Pixels at or above the threshold are foreground.
    LightForeground,
}

impl FromStr for Polarity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "dark" => Ok(Self::DarkForeground),
            "light" => Ok(Self::LightForeground),
            _ => bail!("unknown polarity '{s}' (expected `dark` or `light`)"),
        }
    }
}

/// Converts an RGBA image to 8-bit luma using the BT.601 weights `0.299 R + 0.587 G + 0.114 B`.
///
/// The alpha channel is ignored.
pub fn grayscale(image: &Image) -> GrayImage {
    map_colors(&image.buf, |Rgba([r, g, b, _])| {
        let luma = u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114;
        Luma([((luma + 500) / 1000) as u8])
    })
}

/// Computes a normalized 1D Gaussian kernel of `size` taps with sigma derived from the size.
///
/// Sizes up to 7 use the classic fixed binomial-like tables, larger sizes use
/// `sigma = 0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
///
/// # Panics
///
/// Panics if `size` is even.
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    assert!(size % 2 == 1, "blur kernel size must be odd (got {size})");

    match size {
        1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![
            0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
        ],
        _ => {
            let sigma = 0.3 * ((size - 1) as f32 * 0.5 - 1.0) + 0.8;
            let center = (size / 2) as f32;
            let weights = (0..size)
                .map(|i| {
                    let x = i as f32 - center;
                    (-(x * x) / (2.0 * sigma * sigma)).exp()
                })
                .collect::<Vec<_>>();
            let sum: f32 = weights.iter().sum();
            weights.into_iter().map(|w| w / sum).collect()
        }
    }
}

/// Smooths `gray` with a `kernel_size x kernel_size` Gaussian blur.
pub fn blur(gray: &GrayImage, kernel_size: u32) -> GrayImage {
    if kernel_size <= 1 {
        return gray.clone();
    }
    separable_filter_equal(gray, &gaussian_kernel(kernel_size))
}

/// Binarizes `gray` into a mask where foreground pixels are 255 and background pixels are 0.
///
/// With [`Polarity::DarkForeground`], pixels strictly below `level` are foreground. With
/// [`Polarity::LightForeground`], pixels at or above `level` are.
pub fn threshold(gray: &GrayImage, level: u8, polarity: Polarity) -> GrayImage {
    map_colors(gray, |Luma([v])| {
        let foreground = match polarity {
            Polarity::DarkForeground => v < level,
            Polarity::LightForeground => v >= level,
        };
        Luma([if foreground { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::image::Color;

    #[test]
    fn grayscale_uses_bt601_weights() {
        let mut image = Image::new(4, 1);
        image.set(0, 0, Color::RED);
        image.set(1, 0, Color::GREEN);
        image.set(2, 0, Color::BLUE);
        image.set(3, 0, Color::WHITE);

        let gray = grayscale(&image);
        assert_eq!(gray[(0, 0)].0, [76]);
        assert_eq!(gray[(1, 0)].0, [150]);
        assert_eq!(gray[(2, 0)].0, [29]);
        assert_eq!(gray[(3, 0)].0, [255]);
    }

    #[test]
    fn kernels_are_normalized() {
        for size in [1, 3, 5, 7, 9, 15] {
            let kernel = gaussian_kernel(size);
            assert_eq!(kernel.len(), size as usize);
            assert_relative_eq!(kernel.iter().sum::<f32>(), 1.0, epsilon = 1e-5);

            // symmetric, peak in the middle
            let mid = kernel.len() / 2;
            for i in 0..mid {
                assert_relative_eq!(kernel[i], kernel[kernel.len() - 1 - i]);
                assert!(kernel[i] <= kernel[i + 1]);
            }
        }
    }

    #[test]
    #[should_panic]
    fn even_kernel_panics() {
        gaussian_kernel(4);
    }

    #[test]
    fn blur_keeps_flat_regions() {
        let gray = GrayImage::from_pixel(16, 16, Luma([90]));
        let blurred = blur(&gray, 7);
        assert!(blurred.pixels().all(|p| p.0[0].abs_diff(90) <= 1));
    }

    #[test]
    fn blur_spreads_a_dot() {
        let mut gray = GrayImage::new(15, 15);
        gray.put_pixel(7, 7, Luma([255]));
        let blurred = blur(&gray, 7);
        assert!(blurred[(7, 7)].0[0] < 255);
        assert!(blurred[(8, 7)].0[0] > 0);
        assert!(blurred[(7, 9)].0[0] > 0);
        assert_eq!(blurred[(0, 0)].0[0], 0);
    }

    #[test]
    fn threshold_polarity() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[69, 70, 71][x as usize]]));

        let inv = threshold(&gray, 70, Polarity::DarkForeground);
        assert_eq!(inv.as_raw(), &[255, 0, 0]);

        let normal = threshold(&gray, 70, Polarity::LightForeground);
        assert_eq!(normal.as_raw(), &[0, 255, 255]);
    }

    #[test]
    fn parse_polarity() {
        assert_eq!("dark".parse::<Polarity>().unwrap(), Polarity::DarkForeground);
        assert_eq!("light".parse::<Polarity>().unwrap(), Polarity::LightForeground);
        assert!("Dark".parse::<Polarity>().is_err());
    }
}
