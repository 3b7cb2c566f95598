// Binary masks of rendered equi-M sets.
// Pixels that did not escape are "bounded"; everything else is background.

use std::path::Path;

use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Thresholding applied to the renderer's raster output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    /// Luminance below this value counts as bounded.
    pub threshold: u8,
    /// Flip the test: luminance at or above `threshold` is bounded.
    pub invert: bool,
}

impl Default for MaskOptions {
    fn default() -> Self {
        // netbrot paints points that never escape black
        MaskOptions {
            threshold: 128,
            invert: false,
        }
    }
}

impl MaskOptions {
    fn is_bounded(&self, luma: u8) -> bool {
        (luma < self.threshold) != self.invert
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterMask {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl RasterMask {
    /// An all-background mask.
    pub fn new(width: usize, height: usize) -> Self {
        RasterMask {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        RasterMask {
            width,
            height,
            cells,
        }
    }

    pub fn from_image(img: &DynamicImage, options: MaskOptions) -> Self {
        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();
        RasterMask::from_fn(width as usize, height as usize, |x, y| {
            options.is_bounded(gray.get_pixel(x as u32, y as u32)[0])
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Bounded state of pixel `(x, y)`; out-of-range pixels are background.
    pub fn get(&self, x: isize, y: isize) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        self.cells[y as usize * self.width + x as usize]
    }

    pub fn set(&mut self, x: usize, y: usize, bounded: bool) {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) out of range", x, y);
        self.cells[y * self.width + x] = bounded;
    }

    /// Number of bounded pixels.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Render the mask the way netbrot would: bounded black, escaped white.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            if self.get(x as isize, y as isize) {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        })
    }
}

/// Decode a rendered image and threshold it into a mask.
pub fn load_mask<P: AsRef<Path>>(path: P, options: MaskOptions) -> Result<RasterMask> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(format!("image '{}'", path.display())));
    }
    let img = image::open(path).map_err(|e| Error::format(path, e))?;
    Ok(RasterMask::from_image(&img, options))
}
