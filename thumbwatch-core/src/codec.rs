//! Image decode/resample/encode seam.

use std::fmt;
use std::io;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, ImageResult};
use thiserror::Error;

use crate::prefs::ResampleAlgorithm;

/// Why a source image could not be opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// The bytes are not (yet) a recognizable image. Treated as transient:
    /// the file may still be mid-write.
    #[error("unrecognized image format: {0}")]
    Unrecognized(String),
    #[error("{0}")]
    Other(String),
}

pub trait ImageCodec: Send + Sync + 'static {
    fn open(&self, path: &Path) -> Result<DynamicImage, OpenError>;

    fn resample(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
        algorithm: ResampleAlgorithm,
    ) -> DynamicImage;

    fn save(&self, image: &DynamicImage, path: &Path) -> ImageResult<()>;
}

/// [`ImageCodec`] backed by the `image` crate.
///
/// Formats are sniffed from content first and from the extension second.
/// Thumbnails are filled to the exact requested size and center-cropped.
#[derive(Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl fmt::Debug for ImageCrateCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImageCrateCodec")
    }
}

impl ImageCrateCodec {
    /// Closest `image` filter for each algorithm.
    pub fn filter_for(algorithm: ResampleAlgorithm) -> FilterType {
        match algorithm {
            ResampleAlgorithm::NearestNeighbor | ResampleAlgorithm::Box => FilterType::Nearest,
            ResampleAlgorithm::Linear | ResampleAlgorithm::Bartlett => FilterType::Triangle,
            ResampleAlgorithm::Hermite
            | ResampleAlgorithm::MitchellNetravali
            | ResampleAlgorithm::CatmullRom
            | ResampleAlgorithm::BSpline => FilterType::CatmullRom,
            ResampleAlgorithm::Gaussian => FilterType::Gaussian,
            ResampleAlgorithm::Lanczos
            | ResampleAlgorithm::Hann
            | ResampleAlgorithm::Hamming
            | ResampleAlgorithm::Blackman
            | ResampleAlgorithm::Welch
            | ResampleAlgorithm::Cosine => FilterType::Lanczos3,
        }
    }
}

fn classify_decode_error(err: ImageError) -> OpenError {
    match err {
        ImageError::Unsupported(_) | ImageError::Decoding(_) => {
            OpenError::Unrecognized(err.to_string())
        }
        // Truncated files surface as EOF from the decoder.
        ImageError::IoError(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
            OpenError::Unrecognized(err.to_string())
        }
        other => OpenError::Other(other.to_string()),
    }
}

impl ImageCodec for ImageCrateCodec {
    fn open(&self, path: &Path) -> Result<DynamicImage, OpenError> {
        let reader = ImageReader::open(path)
            .map_err(|err| OpenError::Other(err.to_string()))?
            .with_guessed_format()
            .map_err(|err| OpenError::Other(err.to_string()))?;

        if reader.format().is_none() {
            return Err(OpenError::Unrecognized(format!(
                "no decoder for {}",
                path.display()
            )));
        }

        reader.decode().map_err(classify_decode_error)
    }

    fn resample(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
        algorithm: ResampleAlgorithm,
    ) -> DynamicImage {
        image.resize_to_fill(width.max(1), height.max(1), Self::filter_for(algorithm))
    }

    fn save(&self, image: &DynamicImage, path: &Path) -> ImageResult<()> {
        let format = ImageFormat::from_path(path)?;
        match format {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg if image.color().has_alpha() => {
                DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format)
            }
            _ => image.save_with_format(path, format),
        }
    }
}
