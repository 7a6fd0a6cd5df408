//! Colour histogram embeddings.

use std::path::Path;

use image::RgbImage;

use super::Embedder;
use crate::error::Result;

/// Bins per channel used by [`ColorHistogramEmbedder::default`].
pub const DEFAULT_BINS: usize = 4;

/// Joint RGB histogram, L1-normalised, with `bins³` dimensions.
#[derive(Debug, Clone)]
pub struct ColorHistogramEmbedder {
    bins: usize,
}

impl Default for ColorHistogramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_BINS)
    }
}

impl ColorHistogramEmbedder {
    /// `bins` is clamped to `1..=256`.
    pub fn new(bins: usize) -> Self {
        Self {
            bins: bins.clamp(1, 256),
        }
    }

    /// Histogram of an already decoded image. Empty for a zero-sized image.
    pub fn embed_rgb(&self, img: &RgbImage) -> Vec<f32> {
        let total = img.width() as usize * img.height() as usize;
        if total == 0 {
            return Vec::new();
        }

        let b = self.bins;
        let mut hist = vec![0.0f32; b * b * b];
        for pixel in img.pixels() {
            let [r, g, bl] = pixel.0;
            let idx = self.bin(r) * b * b + self.bin(g) * b + self.bin(bl);
            hist[idx] += 1.0;
        }

        let norm = total as f32;
        for h in &mut hist {
            *h /= norm;
        }
        hist
    }

    fn bin(&self, value: u8) -> usize {
        value as usize * self.bins / 256
    }
}

impl Embedder for ColorHistogramEmbedder {
    fn name(&self) -> &str {
        "color-histogram"
    }

    fn dim(&self) -> usize {
        self.bins * self.bins * self.bins
    }

    fn embed(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path)?.to_rgb8();
        Ok(self.embed_rgb(&img))
    }
}
