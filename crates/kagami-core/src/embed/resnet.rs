//! # ResNet-50 Embeddings
//!
//! Pretrained ResNet-50 backbone with the classification head removed,
//! run with candle. Produces 2048-dimensional pooled features.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Func, Module, VarBuilder};
use candle_transformers::models::resnet;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use super::Embedder;
use crate::error::{KagamiError, Result};

/// Output width of the pooled backbone.
pub const RESNET50_DIM: usize = 2048;

const RESIZE: u32 = 256;
const CROP: u32 = 224;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// ResNet-50 feature extractor.
pub struct ResNetEmbedder {
    model: Func<'static>,
    device: Device,
}

impl ResNetEmbedder {
    /// Load weights from a safetensors file.
    ///
    /// Fails with `ModelLoad` if the file is missing so callers can pick
    /// another provider.
    pub fn load(weights: &Path) -> Result<Self> {
        if !weights.exists() {
            return Err(KagamiError::ModelLoad(format!(
                "weights not found at {}",
                weights.display()
            )));
        }

        let device = Device::Cpu;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .map_err(|e| KagamiError::ModelLoad(e.to_string()))?;
        let model = resnet::resnet50_no_final_layer(vb)
            .map_err(|e| KagamiError::ModelLoad(e.to_string()))?;

        info!(weights = %weights.display(), "loaded resnet50 weights");
        Ok(Self { model, device })
    }

    /// Resize the shorter side to 256, centre-crop 224x224 and normalise
    /// with ImageNet statistics. Returns a `(3, 224, 224)` tensor.
    fn preprocess(&self, img: &DynamicImage) -> Result<Tensor> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(KagamiError::Image("image has zero size".into()));
        }

        let scale = RESIZE as f32 / w.min(h) as f32;
        let nw = ((w as f32 * scale).round() as u32).max(CROP);
        let nh = ((h as f32 * scale).round() as u32).max(CROP);
        let resized = img.resize_exact(nw, nh, FilterType::Triangle);
        let cropped = resized
            .crop_imm((nw - CROP) / 2, (nh - CROP) / 2, CROP, CROP)
            .to_rgb8();

        let side = CROP as usize;
        let pixels = Tensor::from_vec(cropped.into_raw(), (side, side, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?;
        let pixels = (pixels / 255.)?;

        let mean = Tensor::new(&IMAGENET_MEAN, &self.device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&IMAGENET_STD, &self.device)?.reshape((3, 1, 1))?;
        Ok(pixels.broadcast_sub(&mean)?.broadcast_div(&std)?)
    }

    /// Embed an already decoded image.
    pub fn embed_image(&self, img: &DynamicImage) -> Result<Vec<f32>> {
        let input = self.preprocess(img)?.unsqueeze(0)?;
        let features = self.model.forward(&input)?;
        let features: Vec<f32> = features.squeeze(0)?.to_vec1()?;
        debug!(dim = features.len(), "extracted resnet features");
        Ok(features)
    }
}

impl Embedder for ResNetEmbedder {
    fn name(&self) -> &str {
        "resnet50"
    }

    fn dim(&self) -> usize {
        RESNET50_DIM
    }

    fn embed(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path)?;
        self.embed_image(&img)
    }
}
