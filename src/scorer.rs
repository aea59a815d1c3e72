use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword tables and size thresholds for the candidate scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Patterns that mark an element as a text CAPTCHA regardless of its size
    #[serde(default = "default_captcha_keywords")]
    pub captcha_keywords: Vec<String>,

    /// Patterns of third-party challenge widgets handled by another flow
    #[serde(default = "default_provider_keywords")]
    pub provider_keywords: Vec<String>,

    /// Patterns of decorative images (veto only when no captcha keyword matches)
    #[serde(default = "default_skip_keywords")]
    pub skip_keywords: Vec<String>,

    /// Elements this wide or narrower are rejected outright
    #[serde(default = "default_min_width")]
    pub min_width: u32,

    /// Elements this tall or shorter are rejected outright
    #[serde(default = "default_min_height")]
    pub min_height: u32,

    /// Exclusive width bounds of the size envelope
    #[serde(default = "default_width_envelope")]
    pub width_envelope: (u32, u32),

    /// Exclusive height bounds of the size envelope
    #[serde(default = "default_height_envelope")]
    pub height_envelope: (u32, u32),
}

fn default_captcha_keywords() -> Vec<String> {
    [
        "captcha",
        "verify",
        "verification",
        "code",
        "challenge",
        "kcaptcha",
        "securimage",
        "cap_code",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_provider_keywords() -> Vec<String> {
    ["recaptcha", "grecaptcha", "hcaptcha"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_skip_keywords() -> Vec<String> {
    ["logo", "banner", "icon", "avatar", "button"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_min_width() -> u32 {
    50
}

fn default_min_height() -> u32 {
    20
}

fn default_width_envelope() -> (u32, u32) {
    (100, 400)
}

fn default_height_envelope() -> (u32, u32) {
    (40, 150)
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            captcha_keywords: default_captcha_keywords(),
            provider_keywords: default_provider_keywords(),
            skip_keywords: default_skip_keywords(),
            min_width: default_min_width(),
            min_height: default_min_height(),
            width_envelope: default_width_envelope(),
            height_envelope: default_height_envelope(),
        }
    }
}

/// Attributes of an on-page image or canvas element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateAttributes {
    pub width: u32,
    pub height: u32,
    pub src: Option<String>,
    pub alt: Option<String>,
    pub class: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
}

impl CandidateAttributes {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_src(mut self, src: &str) -> Self {
        self.src = Some(src.to_string());
        self
    }

    pub fn with_alt(mut self, alt: &str) -> Self {
        self.alt = Some(alt.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Lower-cased `src alt class id name`, missing attributes contributing empty strings
    pub fn text_blob(&self) -> String {
        [&self.src, &self.alt, &self.class, &self.id, &self.name]
            .iter()
            .map(|attr| attr.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Why a candidate was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptReason {
    Keyword,
    Size,
}

impl fmt::Display for AcceptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptReason::Keyword => write!(f, "keyword"),
            AcceptReason::Size => write!(f, "size"),
        }
    }
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooSmall,
    Provider,
    SkipKeyword,
    OutsideEnvelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept(AcceptReason),
    Reject(RejectReason),
}

/// Decides whether an element is CAPTCHA-shaped
#[derive(Debug)]
pub struct CandidateScorer {
    config: ScorerConfig,
    captcha: RegexSet,
    provider: RegexSet,
    skip: RegexSet,
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new(ScorerConfig::default()).expect("Default keyword patterns should be valid")
    }
}

impl CandidateScorer {
    /// Create a new scorer, compiling the keyword tables
    pub fn new(config: ScorerConfig) -> Result<Self, regex::Error> {
        let captcha = compile(&config.captcha_keywords)?;
        let provider = compile(&config.provider_keywords)?;
        let skip = compile(&config.skip_keywords)?;

        Ok(Self {
            config,
            captcha,
            provider,
            skip,
        })
    }

    /// Score a single element
    pub fn score(&self, candidate: &CandidateAttributes) -> Verdict {
        let (width, height) = (candidate.width, candidate.height);

        if width <= self.config.min_width || height <= self.config.min_height {
            return Verdict::Reject(RejectReason::TooSmall);
        }

        let blob = candidate.text_blob();

        if self.provider.is_match(&blob) {
            return Verdict::Reject(RejectReason::Provider);
        }

        if self.captcha.is_match(&blob) {
            return Verdict::Accept(AcceptReason::Keyword);
        }

        // Skip keywords only veto when no captcha keyword matched
        if self.skip.is_match(&blob) {
            return Verdict::Reject(RejectReason::SkipKeyword);
        }

        if self.in_envelope(width, height) {
            return Verdict::Accept(AcceptReason::Size);
        }

        Verdict::Reject(RejectReason::OutsideEnvelope)
    }

    fn in_envelope(&self, width: u32, height: u32) -> bool {
        let (min_w, max_w) = self.config.width_envelope;
        let (min_h, max_h) = self.config.height_envelope;
        min_w < width && width < max_w && min_h < height && height < max_h
    }
}

fn compile(patterns: &[String]) -> Result<RegexSet, regex::Error> {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
}
