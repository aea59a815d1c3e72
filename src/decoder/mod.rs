pub mod alphabet;
pub mod crnn;
pub mod ctc;
pub mod preprocess;

use crate::error::{ArtifactError, DecodeError};
use crate::results::Prediction;
use alphabet::Alphabet;
use preprocess::{InputShape, ModelInput, preprocess};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model artifacts and decoding thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Trained weights (burn named MessagePack record)
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Companion JSON list of characters the model was trained with
    #[serde(default = "default_alphabet_path")]
    pub alphabet_path: PathBuf,

    #[serde(default = "default_image_width")]
    pub image_width: u32,

    #[serde(default = "default_image_height")]
    pub image_height: u32,

    /// Predictions below this confidence are flagged
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f32,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model/ocr_crnn.mpk")
}

fn default_alphabet_path() -> PathBuf {
    PathBuf::from("model/characters.json")
}

fn default_image_width() -> u32 {
    200
}

fn default_image_height() -> u32 {
    50
}

fn default_low_confidence_threshold() -> f32 {
    0.5
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            alphabet_path: default_alphabet_path(),
            image_width: default_image_width(),
            image_height: default_image_height(),
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

impl DecoderConfig {
    pub fn input_shape(&self) -> InputShape {
        InputShape {
            height: self.image_height,
            width: self.image_width,
        }
    }
}

/// Per-step class probabilities, row-major `[steps][classes]`
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMatrix {
    steps: usize,
    classes: usize,
    data: Vec<f32>,
}

impl ProbabilityMatrix {
    pub fn new(steps: usize, classes: usize, data: Vec<f32>) -> Result<Self, DecodeError> {
        if classes == 0 || data.len() != steps * classes {
            return Err(DecodeError::Inference(format!(
                "{} values do not form {} steps of {} classes",
                data.len(),
                steps,
                classes
            )));
        }
        Ok(Self {
            steps,
            classes,
            data,
        })
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks(self.classes)
    }
}

/// Black-box sequence model: one class distribution per time step
pub trait SequenceModel: Send {
    /// Classes emitted per step (alphabet + unknown + blank)
    fn num_classes(&self) -> usize;

    fn infer(&self, input: &ModelInput) -> Result<ProbabilityMatrix, DecodeError>;
}

/// Alphabet and model loaded together at startup, immutable afterwards
pub struct DecoderArtifacts {
    alphabet: Alphabet,
    model: Box<dyn SequenceModel>,
    shape: InputShape,
    low_confidence_threshold: f32,
}

impl DecoderArtifacts {
    pub fn new(
        alphabet: Alphabet,
        model: Box<dyn SequenceModel>,
        shape: InputShape,
        low_confidence_threshold: f32,
    ) -> Self {
        Self {
            alphabet,
            model,
            shape,
            low_confidence_threshold,
        }
    }

    /// Load the character list and the CRNN weights named in the config
    pub fn load(config: &DecoderConfig) -> Result<Self, ArtifactError> {
        let alphabet = Alphabet::from_file(&config.alphabet_path)?;
        ::log::info!(
            "Loaded alphabet of {} characters from {}",
            alphabet.len(),
            config.alphabet_path.display()
        );

        let crnn_config =
            crnn::CrnnConfig::from_shape(config.input_shape(), alphabet.num_classes());
        let model = crnn::CrnnModel::load(&config.model_path, crnn_config)?;
        ::log::info!("Loaded model weights from {}", config.model_path.display());

        Ok(Self::new(
            alphabet,
            Box::new(model),
            config.input_shape(),
            config.low_confidence_threshold,
        ))
    }
}

/// Summary of the loaded artifacts
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub characters: String,
    pub alphabet_size: usize,
    pub num_classes: usize,
    pub image_width: u32,
    pub image_height: u32,
}

/// Turns a captured image into text
pub struct Decoder {
    artifacts: DecoderArtifacts,
}

impl Decoder {
    /// Refuses artifacts whose model and alphabet disagree on the class count
    pub fn new(artifacts: DecoderArtifacts) -> Result<Self, ArtifactError> {
        let model = artifacts.model.num_classes();
        let expected = artifacts.alphabet.num_classes();
        if model != expected {
            return Err(ArtifactError::Mismatch {
                model,
                alphabet: expected,
            });
        }
        Ok(Self { artifacts })
    }

    pub fn from_config(config: &DecoderConfig) -> Result<Self, ArtifactError> {
        Self::new(DecoderArtifacts::load(config)?)
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            characters: self.artifacts.alphabet.characters().iter().collect(),
            alphabet_size: self.artifacts.alphabet.len(),
            num_classes: self.artifacts.alphabet.num_classes(),
            image_width: self.artifacts.shape.width,
            image_height: self.artifacts.shape.height,
        }
    }

    /// Predict the text of an encoded image
    pub fn predict(&self, image_bytes: &[u8]) -> Result<Prediction, DecodeError> {
        let input = preprocess(image_bytes, self.artifacts.shape)?;
        let probabilities = self.artifacts.model.infer(&input)?;
        self.decode(&probabilities)
    }

    pub fn predict_file(&self, path: impl AsRef<Path>) -> Result<Prediction, DecodeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.predict(&bytes)
    }

    /// Greedy CTC decode plus the mean max-probability confidence
    pub fn decode(&self, probabilities: &ProbabilityMatrix) -> Result<Prediction, DecodeError> {
        let alphabet = &self.artifacts.alphabet;
        if probabilities.classes() != alphabet.num_classes() {
            return Err(DecodeError::ClassCount {
                got: probabilities.classes(),
                expected: alphabet.num_classes(),
            });
        }
        if probabilities.steps() == 0 {
            return Err(DecodeError::EmptyOutput);
        }
        if probabilities.rows().flatten().any(|p| !p.is_finite()) {
            return Err(DecodeError::NonFinite);
        }

        let path = ctc::best_path(probabilities);
        let classes: Vec<usize> = path.iter().map(|(class, _)| *class).collect();
        let text = ctc::decode_classes(&classes, alphabet);

        let mean = path.iter().map(|(_, p)| *p).sum::<f32>() / path.len() as f32;
        let confidence = mean.clamp(0.0, 1.0);
        let low_confidence =
            text.is_empty() || confidence < self.artifacts.low_confidence_threshold;

        if low_confidence {
            ::log::warn!("Low-confidence prediction {:?} ({:.3})", text, confidence);
        } else {
            ::log::debug!("Predicted {:?} ({:.3})", text, confidence);
        }

        Ok(Prediction {
            text,
            confidence,
            low_confidence,
        })
    }
}
