use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use thiserror::Error;
use tracing::debug;

use crate::filters;

/// Images whose height or width falls below this are upscaled before OCR.
pub const MIN_DIMENSION: u32 = 200;

const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_GRID: (u32, u32) = (8, 8);
const DENOISE_STRENGTH: f32 = 10.0;
const DENOISE_TEMPLATE: u32 = 7;
const DENOISE_SEARCH: u32 = 21;
const BLUR_KERNEL: usize = 5;
const CLOSE_KERNEL: u8 = 2;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error(
        "Could not load image from {}: {source}. Check the file path and that the file is a readable image.",
        .path.display()
    )]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Decode an image file into a pixel buffer.
pub fn load_image(path: &Path) -> Result<DynamicImage, PreprocessError> {
    image::open(path).map_err(|source| PreprocessError::Load { path: path.to_path_buf(), source })
}

/// Load an image file and turn it into a binarized buffer ready for OCR.
pub fn prepare_for_ocr(path: &Path) -> Result<GrayImage, PreprocessError> {
    let img = load_image(path)?;
    Ok(normalize(img))
}

/// upscale → grayscale → CLAHE → denoise → blur → Otsu → close.
///
/// The result only ever holds the values 0 and 255.
pub fn normalize(img: DynamicImage) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.to_luma8();
    }
    let img = upscale_if_small(img);
    debug!(width = img.width(), height = img.height(), "normalizing receipt image");

    let gray = img.to_luma8();
    let gray = filters::clahe(&gray, CLAHE_CLIP_LIMIT, CLAHE_GRID);
    let gray = filters::nl_means_denoise(&gray, DENOISE_STRENGTH, DENOISE_TEMPLATE, DENOISE_SEARCH);
    let gray = filters::gaussian_blur(&gray, BLUR_KERNEL);
    let binary = filters::otsu_binarize(&gray);
    filters::close_rect(&binary, CLOSE_KERNEL)
}

/// Uniformly scale the image up so its smaller side reaches [`MIN_DIMENSION`].
/// Images that are already large enough are returned untouched.
pub fn upscale_if_small(img: DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width >= MIN_DIMENSION && height >= MIN_DIMENSION {
        return img;
    }
    let scale = (MIN_DIMENSION as f64 / height as f64).max(MIN_DIMENSION as f64 / width as f64);
    let new_width = (width as f64 * scale).round() as u32;
    let new_height = (height as f64 * scale).round() as u32;
    debug!(width, height, new_width, new_height, "upscaling small image");
    img.resize_exact(new_width, new_height, FilterType::CatmullRom)
}
