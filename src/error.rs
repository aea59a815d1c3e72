use thiserror::Error;

/// Failure while querying the live page. Always recovered inside a locator stage.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("element not present: {0}")]
    NotPresent(String),

    #[error("stale element reference")]
    Stale,

    #[error("webdriver command failed: {0}")]
    Driver(String),
}

impl LookupError {
    /// Whether the lookup simply ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, LookupError::Timeout(_))
    }
}

/// Failure that aborts a whole page visit
#[derive(Debug, Error)]
pub enum VisitError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("page failed to load: {0}")]
    Transport(String),

    #[error("no webdriver session available: {0}")]
    Session(String),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Model or alphabet artifacts could not be loaded. Fatal at startup.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("alphabet file {path} is not a JSON list of characters: {source}")]
    AlphabetFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),

    #[error("failed to load model weights from {path}: {reason}")]
    Model { path: String, reason: String },

    #[error("model emits {model} classes but alphabet requires {alphabet}")]
    Mismatch { model: usize, alphabet: usize },
}

/// Capture or metadata write failure
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot is not a readable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Inference-time failure of the decoder
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("model produced no time steps")]
    EmptyOutput,

    #[error("model output has {got} classes per step, expected {expected}")]
    ClassCount { got: usize, expected: usize },

    #[error("model output contains non-finite probabilities")]
    NonFinite,

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Configuration file could not be used
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failure of a locate-then-decode request
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Visit(#[from] VisitError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no decoder loaded")]
    NoDecoder,
}
