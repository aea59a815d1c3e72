use crate::capture::CaptureConfig;
use crate::decoder::DecoderConfig;
use crate::error::ConfigError;
use crate::locator::consent::ConsentConfig;
use crate::scorer::ScorerConfig;
use crate::submit::SubmitConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Configuration for the WebDriver session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDriverConfig {
    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub url: String,

    /// Run the browser without a window
    #[serde(default)]
    pub headless: bool,

    /// Maximum time for a page to load before the visit is abandoned
    #[serde(default = "default_page_load_secs")]
    pub page_load_secs: u64,
}

/// Waits and pauses used by the locator stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// How long to wait for image/canvas elements to appear in a context
    #[serde(default = "default_element_wait_ms")]
    pub element_wait_ms: u64,

    /// How long to wait for each consent rule to yield a control
    #[serde(default = "default_control_wait_ms")]
    pub control_wait_ms: u64,

    /// Pause after each programmatic scroll so lazy content can render
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Pause after switching into a frame
    #[serde(default = "default_frame_pause_ms")]
    pub frame_pause_ms: u64,

    /// Pause after a consent control is clicked or an answer is submitted
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl LocatorConfig {
    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn control_wait(&self) -> Duration {
        Duration::from_millis(self.control_wait_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn frame_pause(&self) -> Duration {
        Duration::from_millis(self.frame_pause_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Configuration with every wait and pause set to zero
    pub fn immediate() -> Self {
        Self {
            element_wait_ms: 0,
            control_wait_ms: 0,
            scroll_pause_ms: 0,
            frame_pause_ms: 0,
            settle_ms: 0,
        }
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            element_wait_ms: default_element_wait_ms(),
            control_wait_ms: default_control_wait_ms(),
            scroll_pause_ms: default_scroll_pause_ms(),
            frame_pause_ms: default_frame_pause_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            headless: false,
            page_load_secs: default_page_load_secs(),
        }
    }
}

/// Top-level configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub webdriver: WebDriverConfig,

    #[serde(default)]
    pub locator: LocatorConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub consent: ConsentConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub submit: SubmitConfig,
}

impl AppConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(io_err)?;

        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.apply_env();
        Ok(config)
    }

    /// Override the WebDriver URL with an environment variable if provided
    pub fn apply_env(&mut self) {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver.url = webdriver_url;
            }
        }
    }
}

/// Default value for webdriver url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_page_load_secs() -> u64 {
    45
}

fn default_element_wait_ms() -> u64 {
    10_000
}

fn default_control_wait_ms() -> u64 {
    1_000
}

fn default_scroll_pause_ms() -> u64 {
    1_000
}

fn default_frame_pause_ms() -> u64 {
    1_000
}

fn default_settle_ms() -> u64 {
    2_000
}
