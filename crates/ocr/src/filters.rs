//! Classical image filters used by the OCR preprocessing chain.
//!
//! Thresholding, blurring and morphology lean on `imageproc`; CLAHE and
//! non-local-means denoising are not provided there and are implemented here.
//! Border pixels are sampled with reflect-101 (`dcb|abcd|cba`) where a filter
//! reads outside the image.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::{grayscale_close, Mask};

/// Weights below this are treated as zero by the denoiser.
const NLM_WEIGHT_THRESHOLD: f32 = 0.001;

// ── CLAHE ─────────────────────────────────────────────────────────────────────

/// Contrast Limited Adaptive Histogram Equalization.
///
/// The image is split into a `grid.0 × grid.1` grid of tiles. Each tile's
/// histogram is clipped at `clip_limit × (tile area / 256)`, the excess is
/// spread evenly over all bins, and the resulting equalization curves are
/// bilinearly interpolated between neighbouring tile centres.
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tiles_x = grid.0.clamp(1, width);
    let tiles_y = grid.1.clamp(1, height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let area = (tile_w * tile_h) as usize;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * area as f32 / 256.0) as usize).max(1)
    } else {
        usize::MAX
    };
    let lut_scale = 255.0 / area as f32;

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0usize; 256];
            // Tiles overhanging the right/bottom edge read reflected pixels so
            // every tile has the same area.
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect101(y as i64, height as i64) as u32;
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect101(x as i64, width as i64) as u32;
                    hist[image.get_pixel(sx, sy)[0] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cumulative = 0usize;
            for (value, count) in hist.iter().enumerate() {
                cumulative += count;
                lut[value] = (cumulative as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    let lut_at = |tx: i64, ty: i64, v: usize| luts[(ty as u32 * tiles_x + tx as u32) as usize][v] as f32;
    let neighbours = |pos: u32, tile: u32, tiles: u32| {
        let f = pos as f32 / tile as f32 - 0.5;
        let lo = f.floor() as i64;
        let frac = f - lo as f32;
        (lo.max(0), (lo + 1).min(tiles as i64 - 1), frac)
    };

    ImageBuffer::from_fn(width, height, |x, y| {
        let v = image.get_pixel(x, y)[0] as usize;
        let (tx1, tx2, xa) = neighbours(x, tile_w, tiles_x);
        let (ty1, ty2, ya) = neighbours(y, tile_h, tiles_y);
        let top = lut_at(tx1, ty1, v) * (1.0 - xa) + lut_at(tx2, ty1, v) * xa;
        let bottom = lut_at(tx1, ty2, v) * (1.0 - xa) + lut_at(tx2, ty2, v) * xa;
        Luma([(top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8])
    })
}

fn clip_histogram(hist: &mut [usize; 256], clip: usize) {
    let mut excess = 0usize;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    let batch = excess / 256;
    let residual = excess - batch * 256;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        for count in hist.iter_mut().step_by(step).take(residual) {
            *count += 1;
        }
    }
}

// ── Non-local means ───────────────────────────────────────────────────────────

/// Non-local-means denoising of a single-channel image.
///
/// Each output pixel is a weighted mean of the pixels in a `search_size`
/// window around it, weighted by `exp(-d / h²)` where `d` is the mean squared
/// difference between the `template_size` patches centred on the two pixels.
/// Patch distances are computed per search offset with a summed-area table,
/// so the cost is independent of the template size.
pub fn nl_means_denoise(image: &GrayImage, h: f32, template_size: u32, search_size: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || h <= 0.0 {
        return image.clone();
    }

    let (w, hh) = (width as i64, height as i64);
    let tr = (template_size / 2) as i64;
    let sr = (search_size / 2) as i64;
    let pad = tr + sr;
    let pw = w + 2 * pad;
    let ph = hh + 2 * pad;

    let padded: Vec<i32> = (0..ph)
        .flat_map(|y| {
            let sy = reflect101(y - pad, hh) as u32;
            (0..pw).map(move |x| {
                let sx = reflect101(x - pad, w) as u32;
                image.get_pixel(sx, sy)[0] as i32
            })
        })
        .collect();
    let at = |x: i64, y: i64| padded[(y * pw + x) as usize];

    // Mean squared patch distance → weight, for every possible distance.
    let patch_area = ((2 * tr + 1) * (2 * tr + 1)) as u64;
    let weights: Vec<f32> = (0..=255u32 * 255)
        .map(|d| {
            let wgt = (-(d as f32) / (h * h)).exp();
            if wgt < NLM_WEIGHT_THRESHOLD { 0.0 } else { wgt }
        })
        .collect();

    // The distance region covers every pixel plus a template radius of margin.
    let rw = (w + 2 * tr) as usize;
    let rh = (hh + 2 * tr) as usize;
    let stride = rw + 1;
    let mut integral = vec![0u64; stride * (rh + 1)];
    let mut sum_w = vec![0f32; (w * hh) as usize];
    let mut sum_v = vec![0f32; (w * hh) as usize];
    let span = (2 * tr + 1) as usize;

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            for ry in 0..rh {
                let mut row = 0u64;
                let py = ry as i64 + sr;
                for rx in 0..rw {
                    let px = rx as i64 + sr;
                    let diff = (at(px, py) - at(px + dx, py + dy)) as i64;
                    row += (diff * diff) as u64;
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + row;
                }
            }

            for y in 0..hh as usize {
                for x in 0..w as usize {
                    let ssd = integral[(y + span) * stride + x + span] + integral[y * stride + x]
                        - integral[y * stride + x + span]
                        - integral[(y + span) * stride + x];
                    let wgt = weights[(ssd / patch_area) as usize];
                    if wgt == 0.0 {
                        continue;
                    }
                    let idx = y * w as usize + x;
                    sum_w[idx] += wgt;
                    sum_v[idx] += wgt * at(x as i64 + pad + dx, y as i64 + pad + dy) as f32;
                }
            }
        }
    }

    ImageBuffer::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        // The zero offset always contributes weight 1, so sum_w > 0.
        Luma([(sum_v[idx] / sum_w[idx]).round().clamp(0.0, 255.0) as u8])
    })
}

// ── Blur / threshold / morphology ─────────────────────────────────────────────

/// Normalized 1-D Gaussian kernel of odd length `size`, as OpenCV builds it
/// when sigma is left at zero: fixed binomial taps up to 7, otherwise sampled
/// with sigma derived from the size.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    match size {
        1 => return vec![1.0],
        3 => return vec![0.25, 0.5, 0.25],
        5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => return vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
        _ => {}
    }
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let centre = (size / 2) as f32;
    let raw: Vec<f32> = (0..size)
        .map(|i| (-(i as f32 - centre).powi(2) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// `size × size` Gaussian blur.
pub fn gaussian_blur(image: &GrayImage, size: usize) -> GrayImage {
    separable_filter_equal(image, &gaussian_kernel(size))
}

/// Global Otsu binarization: pixels above the Otsu level become 255, the rest 0.
pub fn otsu_binarize(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Morphological closing with a `size × size` rectangular structuring element.
pub fn close_rect(image: &GrayImage, size: u8) -> GrayImage {
    if size == 0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let element = GrayImage::from_pixel(size as u32, size as u32, Luma([255u8]));
    let mask = Mask::from_image(&element, size / 2, size / 2);
    grayscale_close(image, &mask)
}

/// Reflect-101 border index: `-1 → 1`, `n → n - 2`.
fn reflect101(i: i64, n: i64) -> i64 {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let i = i.rem_euclid(period);
    if i >= n {
        period - i
    } else {
        i
    }
}
