//! Perceptual hashes and text-layout detection over decoded images.
//!
//! Every hash is 64 bits, rendered as 16 lower-case hex characters, so
//! [`memedoc_core::fingerprint::hamming_distance`] can compare any two
//! hashes of the same kind.
//!
//! | Hash | Construction |
//! |------|--------------|
//! | `phash` | 32×32 grayscale, 2-D DCT-II, top-left 8×8 coefficients vs. their median |
//! | `dhash` | 9×8 grayscale, each pixel vs. its right-hand neighbour |
//! | `whash` | 16×16 grayscale, one Haar level, 8×8 approximation band vs. its median |
//! | `colorhash` | sixteen 4-bit fractions: black, gray, 7 faint hue bins, 7 saturated hue bins |
//!
//! Layout detection looks for rows dense with strong horizontal gradients
//! (caption text), groups them into regions, and reports which vertical
//! bands those regions sit in.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

use memedoc_core::models::{Fingerprint, HashKind, LayoutTag};

const HASH_SIDE: usize = 8;
const PHASH_SIDE: usize = 32;
const WHASH_SIDE: usize = 16;
const COLOR_THUMB: u32 = 128;
const HUE_BINS: usize = 7;

const LAYOUT_SIDE: u32 = 64;
/// Minimum neighbour difference that counts as an edge.
const EDGE_DELTA: i16 = 40;
/// Fraction of edge pixels that makes a row a text row.
const TEXT_ROW_DENSITY: f64 = 0.15;
/// Regions shorter than this many rows are noise.
const MIN_REGION_ROWS: usize = 2;
const TOP_BAND: f64 = 0.3;
const BOTTOM_BAND: f64 = 0.7;

/// Compute every hash kind and the layout tag for `img`.
pub fn fingerprint_image(img: &DynamicImage) -> Fingerprint {
    Fingerprint::new(detect_layout(img))
        .with_hash(HashKind::Perceptual, to_hex(phash(img)))
        .with_hash(HashKind::Difference, to_hex(dhash(img)))
        .with_hash(HashKind::Wavelet, to_hex(whash(img)))
        .with_hash(HashKind::Color, to_hex(colorhash(img)))
}

pub fn to_hex(hash: u64) -> String {
    format!("{:016x}", hash)
}

fn gray(img: &DynamicImage, width: u32, height: u32) -> GrayImage {
    img.resize_exact(width, height, FilterType::Triangle).to_luma8()
}

fn pack_bits(bits: impl IntoIterator<Item = bool>) -> u64 {
    bits.into_iter()
        .fold(0u64, |acc, bit| (acc << 1) | u64::from(bit))
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn above_median(values: &[f64]) -> u64 {
    let m = median(values);
    pack_bits(values.iter().map(|&v| v > m))
}

/// Unnormalised DCT-II of `input`, first `keep` coefficients only.
fn dct_1d(input: &[f64], keep: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..keep)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI / n * (i as f64 + 0.5) * k as f64).cos()
                })
                .sum()
        })
        .collect()
}

/// DCT perceptual hash.
pub fn phash(img: &DynamicImage) -> u64 {
    let side = PHASH_SIDE as u32;
    let pixels = gray(img, side, side);

    let rows: Vec<Vec<f64>> = pixels
        .rows()
        .map(|row| {
            let values: Vec<f64> = row.map(|p| f64::from(p[0])).collect();
            dct_1d(&values, HASH_SIDE)
        })
        .collect();

    let mut low = vec![0.0; HASH_SIDE * HASH_SIDE];
    for u in 0..HASH_SIDE {
        let column: Vec<f64> = rows.iter().map(|r| r[u]).collect();
        for (v, coeff) in dct_1d(&column, HASH_SIDE).into_iter().enumerate() {
            low[v * HASH_SIDE + u] = coeff;
        }
    }
    above_median(&low)
}

/// Horizontal difference hash.
pub fn dhash(img: &DynamicImage) -> u64 {
    let pixels = gray(img, HASH_SIDE as u32 + 1, HASH_SIDE as u32);
    pack_bits((0..HASH_SIDE as u32).flat_map(|y| {
        let pixels = &pixels;
        (0..HASH_SIDE as u32)
            .map(move |x| pixels.get_pixel(x + 1, y)[0] > pixels.get_pixel(x, y)[0])
    }))
}

/// Single-level Haar wavelet hash.
pub fn whash(img: &DynamicImage) -> u64 {
    let side = WHASH_SIDE as u32;
    let pixels = gray(img, side, side);
    let mut approx = Vec::with_capacity(HASH_SIDE * HASH_SIDE);
    for y in 0..HASH_SIDE as u32 {
        for x in 0..HASH_SIDE as u32 {
            let sum: f64 = [(0, 0), (1, 0), (0, 1), (1, 1)]
                .iter()
                .map(|(dx, dy)| f64::from(pixels.get_pixel(2 * x + dx, 2 * y + dy)[0]))
                .sum();
            approx.push(sum / 2.0);
        }
    }
    above_median(&approx)
}

/// Colour-distribution hash.
pub fn colorhash(img: &DynamicImage) -> u64 {
    let thumb = img.thumbnail(COLOR_THUMB, COLOR_THUMB).to_rgb8();
    let total = (thumb.width() * thumb.height()).max(1) as f64;

    let mut black = 0usize;
    let mut grayish = 0usize;
    let mut faint = [0usize; HUE_BINS];
    let mut bright = [0usize; HUE_BINS];

    for p in thumb.pixels() {
        let [r, g, b] = p.0;
        let luma = (2126 * u32::from(r) + 7152 * u32::from(g) + 722 * u32::from(b)) / 10_000;
        if luma < 32 {
            black += 1;
            continue;
        }
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let saturation = if max == 0 {
            0
        } else {
            u32::from(max - min) * 255 / u32::from(max)
        };
        if saturation < 85 {
            grayish += 1;
            continue;
        }
        let bin = ((hue_degrees(r, g, b) / 360.0 * HUE_BINS as f64) as usize).min(HUE_BINS - 1);
        if saturation > 170 {
            bright[bin] += 1;
        } else {
            faint[bin] += 1;
        }
    }

    let colorful = (total as usize - black - grayish).max(1) as f64;
    let field = |count: usize, of: f64| ((count as f64 / of * 16.0) as u64).min(15);

    let fields = [field(black, total), field(grayish, total)]
        .into_iter()
        .chain(faint.iter().map(|&c| field(c, colorful)))
        .chain(bright.iter().map(|&c| field(c, colorful)));
    fields.fold(0u64, |acc, f| (acc << 4) | f)
}

fn hue_degrees(r: u8, g: u8, b: u8) -> f64 {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return 0.0;
    }
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    h * 60.0
}

/// Classify where caption-like text sits in the image.
pub fn detect_layout(img: &DynamicImage) -> LayoutTag {
    let pixels = gray(img, LAYOUT_SIDE, LAYOUT_SIDE);
    let width = pixels.width();

    let text_rows: Vec<bool> = pixels
        .rows()
        .map(|row| {
            let values: Vec<i16> = row.map(|p| i16::from(p[0])).collect();
            let edges = values
                .windows(2)
                .filter(|w| (w[1] - w[0]).abs() > EDGE_DELTA)
                .count();
            edges as f64 / f64::from(width - 1) > TEXT_ROW_DENSITY
        })
        .collect();

    let regions = text_regions(&text_rows);
    match regions.len() {
        0 => LayoutTag::NoText,
        1 => LayoutTag::SingleText,
        _ => {
            let height = text_rows.len() as f64;
            let (mut top, mut middle, mut bottom) = (false, false, false);
            for (start, end) in regions {
                let centre = (start + end) as f64 / 2.0 / height;
                if centre < TOP_BAND {
                    top = true;
                } else if centre > BOTTOM_BAND {
                    bottom = true;
                } else {
                    middle = true;
                }
            }
            LayoutTag::from_bands(top, middle, bottom)
        }
    }
}

/// Runs of consecutive text rows as `(first, last)` row indices.
fn text_regions(rows: &[bool]) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut start = None;
    for (i, &is_text) in rows.iter().chain(std::iter::once(&false)).enumerate() {
        match (is_text, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= MIN_REGION_ROWS {
                    regions.push((s, i - 1));
                }
                start = None;
            }
            _ => {}
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32, increasing: bool) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            let step = if increasing { x } else { width - 1 - x };
            let v = (step * 2) as u8;
            Rgb([v, v, v])
        }))
    }

    /// White image with black/white vertical stripes in the given row ranges.
    fn captioned(bands: &[(u32, u32)]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            let in_band = bands.iter().any(|&(a, b)| y >= a && y < b);
            if in_band && (x / 4) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }))
    }

    #[test]
    fn hashes_are_sixteen_hex_chars() {
        let fp = fingerprint_image(&gradient(90, 40, true));
        for kind in HashKind::ALL {
            let h = fp.get(kind).unwrap();
            assert_eq!(h.len(), 16, "{kind}");
            assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn identical_images_hash_identically() {
        let a = fingerprint_image(&gradient(90, 40, true));
        let b = fingerprint_image(&gradient(90, 40, true));
        assert_eq!(a, b);
    }

    #[test]
    fn dhash_follows_gradient_direction() {
        assert_eq!(to_hex(dhash(&gradient(90, 40, true))), "ffffffffffffffff");
        assert_eq!(to_hex(dhash(&gradient(90, 40, false))), "0000000000000000");
    }

    #[test]
    fn colorhash_of_black_image() {
        let black = DynamicImage::ImageRgb8(RgbImage::new(20, 20));
        assert_eq!(to_hex(colorhash(&black)), "f000000000000000");
    }

    #[test]
    fn colorhash_of_saturated_red() {
        let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([255, 0, 0])));
        // black, gray, 7 faint bins, then bright bin 0 full.
        assert_eq!(to_hex(colorhash(&red)), "000000000f000000");
    }

    #[test]
    fn layout_without_text() {
        let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([200, 200, 200])));
        assert_eq!(detect_layout(&blank), LayoutTag::NoText);
    }

    #[test]
    fn layout_single_caption() {
        assert_eq!(detect_layout(&captioned(&[(28, 36)])), LayoutTag::SingleText);
    }

    #[test]
    fn layout_top_and_bottom_captions() {
        assert_eq!(
            detect_layout(&captioned(&[(2, 10), (54, 62)])),
            LayoutTag::TopBottom
        );
    }

    #[test]
    fn text_regions_drop_single_rows() {
        let rows = [false, true, false, true, true, true, false, true];
        assert_eq!(text_regions(&rows), vec![(3, 5)]);
    }
}
