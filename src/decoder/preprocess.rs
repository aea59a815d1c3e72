use crate::error::DecodeError;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

/// Fixed input geometry the model was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: u32,
    pub width: u32,
}

/// Grayscale intensities in [0, 1], width-major: `pixels[x * height + y]`.
///
/// Width is the sequence axis the recurrent layers walk over.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f32>,
}

impl ModelInput {
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.pixels[x * self.height + y]
    }
}

/// Decode image bytes into the network's input layout
pub fn preprocess(bytes: &[u8], shape: InputShape) -> Result<ModelInput, DecodeError> {
    let decoded = image::load_from_memory(bytes)?;

    // Normalize before resizing so interpolation happens on [0, 1] intensities
    let gray = decoded.to_luma32f();
    let resized = imageops::resize(&gray, shape.width, shape.height, FilterType::Triangle);

    let (width, height) = (shape.width as usize, shape.height as usize);
    let mut pixels = Vec::with_capacity(width * height);
    for x in 0..shape.width {
        for y in 0..shape.height {
            pixels.push(resized.get_pixel(x, y).0[0].clamp(0.0, 1.0));
        }
    }

    Ok(ModelInput {
        width,
        height,
        pixels,
    })
}
