use std::{
    env::{self, VarError},
    panic::catch_unwind,
};

use anyhow::{anyhow, bail};
use image::ImageBuffer;
use once_cell::sync::Lazy;

use super::Image;

const ENV_VAR_JPEG_BACKEND: &str = "HANDCOUNT_JPEG_BACKEND";

/// Webcams deliver MJPEG, so we support a few different JPEG decoding backends.
#[derive(Debug)]
enum JpegBackend {
    /// Uses the `jpeg-decoder` crate (through `image`), a robust but slow pure-Rust JPEG decoder.
    JpegDecoder,
    /// Uses the `mozjpeg` crate, a wrapper around Mozilla's libjpeg fork. Robust and fast-ish, but
    /// C.
    MozJpeg,
    /// Uses the `zune-jpeg` crate, a pure-Rust JPEG decoder somewhat faster than `jpeg-decoder`.
    ZuneJpeg,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::MozJpeg;

static JPEG_BACKEND: Lazy<JpegBackend> = Lazy::new(|| {
    let backend = match env::var(ENV_VAR_JPEG_BACKEND) {
        Ok(v) if v == "mozjpeg" => JpegBackend::MozJpeg,
        Ok(v) if v == "zune-jpeg" => JpegBackend::ZuneJpeg,
        Ok(v) if v == "jpeg-decoder" => JpegBackend::JpegDecoder,
        Ok(v) => {
            log::warn!("invalid value set for `{ENV_VAR_JPEG_BACKEND}` variable: '{v}'; ignoring");
            DEFAULT_BACKEND
        }
        Err(VarError::NotPresent) => DEFAULT_BACKEND,
        Err(VarError::NotUnicode(s)) => {
            log::warn!(
                "invalid value set for `{ENV_VAR_JPEG_BACKEND}` variable: {}; ignoring",
                s.to_string_lossy()
            );
            DEFAULT_BACKEND
        }
    };
    log::debug!("using JPEG decode backend: {:?}", backend);
    backend
});

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let buf = match *JPEG_BACKEND {
        JpegBackend::JpegDecoder => {
            image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8()
        }
        JpegBackend::MozJpeg => {
            // mozjpeg crate unfortunately reports errors only via unwinding
            let (buf, width, height) = catch_unwind(|| -> anyhow::Result<_> {
                let mut decompress = mozjpeg::Decompress::new_mem(data)?;

                // Tune settings for decode performance.
                decompress.do_fancy_upsampling(false);
                decompress.dct_method(mozjpeg::DctMethod::IntegerFast);

                let mut decompress = decompress.rgba()?;
                let buf = decompress
                    .read_scanlines_flat()
                    .ok_or_else(|| anyhow!("failed to decode image"))?;
                Ok((buf, decompress.width(), decompress.height()))
            })
            .map_err(|payload| match payload.downcast::<String>() {
                Ok(string) => anyhow::Error::msg(string),
                Err(_) => anyhow!("<unknown panic message>"),
            })??;

            ImageBuffer::from_raw(u32::try_from(width)?, u32::try_from(height)?, buf)
                .ok_or_else(|| anyhow!("decoded buffer does not match image size"))?
        }
        JpegBackend::ZuneJpeg => {
            use zune_jpeg::zune_core::colorspace::ColorSpace;
            use zune_jpeg::zune_core::options::DecoderOptions;

            let mut decomp = zune_jpeg::JpegDecoder::new_with_options(
                DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGBA),
                data,
            );
            decomp.decode_headers()?;
            let colorspace = decomp.get_output_colorspace();
            if colorspace != Some(ColorSpace::RGBA) {
                bail!("unsupported colorspace {colorspace:?} (expected RGBA)");
            }

            let size = decomp
                .output_buffer_size()
                .ok_or_else(|| anyhow!("JPEG headers not decoded"))?;
            let mut buf = vec![0; size];
            decomp.decode_into(&mut buf)?;
            let (width, height) = decomp
                .dimensions()
                .ok_or_else(|| anyhow!("JPEG headers not decoded"))?;
            ImageBuffer::from_raw(width.into(), height.into(), buf)
                .ok_or_else(|| anyhow!("decoded buffer does not match image size"))?
        }
    };

    Ok(Image { buf })
}
