//! Convolutional-recurrent network emitting one class distribution per
//! horizontal step, run on the CPU through the ndarray backend.

use crate::decoder::preprocess::{InputShape, ModelInput};
use crate::decoder::{ProbabilityMatrix, SequenceModel};
use crate::error::{ArtifactError, DecodeError};
use burn::{
    nn::{
        BiLstm, BiLstmConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{TensorData, activation::softmax},
};
use burn_ndarray::NdArray;
use std::path::Path;

type Backend = NdArray;

/// Channels after the second convolution block
const FEATURE_CHANNELS: usize = 64;
/// Both pooling layers halve width and height
const DOWNSAMPLE: usize = 4;

#[derive(Config, Debug)]
pub struct CrnnConfig {
    pub image_height: usize,
    pub image_width: usize,
    pub num_classes: usize,
}

impl CrnnConfig {
    pub fn from_shape(shape: InputShape, num_classes: usize) -> Self {
        Self::new(shape.height as usize, shape.width as usize, num_classes)
    }

    /// Steps emitted per image
    pub fn sequence_length(&self) -> usize {
        self.image_width / DOWNSAMPLE
    }

    pub fn init<B: burn::tensor::backend::Backend>(&self, device: &B::Device) -> Crnn<B> {
        let features = (self.image_height / DOWNSAMPLE) * FEATURE_CHANNELS;
        Crnn {
            conv1: Conv2dConfig::new([1, 32], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([32, FEATURE_CHANNELS], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
            dense: LinearConfig::new(features, 64).init(device),
            lstm1: BiLstmConfig::new(64, 128, true).init(device),
            lstm2: BiLstmConfig::new(256, 64, true).init(device),
            output: LinearConfig::new(128, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct Crnn<B: burn::tensor::backend::Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
    dense: Linear<B>,
    lstm1: BiLstm<B>,
    lstm2: BiLstm<B>,
    output: Linear<B>,
}

impl<B: burn::tensor::backend::Backend> Crnn<B> {
    /// `[batch, 1, width, height]` in, `[batch, steps, classes]` probabilities out
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 3> {
        let x = self.activation.forward(self.conv1.forward(input));
        let x = self.pool.forward(x);
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);

        // Width becomes the time axis
        let [batch, channels, steps, rows] = x.dims();
        let x = x.permute([0, 2, 3, 1]).reshape([batch, steps, rows * channels]);

        let x = self.activation.forward(self.dense.forward(x));
        let (x, _) = self.lstm1.forward(x, None);
        let (x, _) = self.lstm2.forward(x, None);

        softmax(self.output.forward(x), 2)
    }

    pub fn num_classes(&self) -> usize {
        self.output.weight.val().dims()[1]
    }
}

/// Trained CRNN loaded from a named MessagePack record
pub struct CrnnModel {
    model: Crnn<Backend>,
    device: <Backend as burn::tensor::backend::Backend>::Device,
}

impl CrnnModel {
    pub fn load(path: impl AsRef<Path>, config: CrnnConfig) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let device = Default::default();

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .init::<Backend>(&device)
            .load_file(path.to_path_buf(), &recorder, &device)
            .map_err(|e| ArtifactError::Model {
                path: path.display().to_string(),
                reason: format!("{:?}", e),
            })?;

        Ok(Self { model, device })
    }
}

impl SequenceModel for CrnnModel {
    fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    fn infer(&self, input: &ModelInput) -> Result<ProbabilityMatrix, DecodeError> {
        let data = TensorData::new(input.pixels.clone(), [1, 1, input.width, input.height]);
        let tensor = Tensor::<Backend, 4>::from_data(data, &self.device);

        let output = self.model.forward(tensor);
        let [_, steps, classes] = output.dims();
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| DecodeError::Inference(format!("{:?}", e)))?;

        ProbabilityMatrix::new(steps, classes, values)
    }
}
