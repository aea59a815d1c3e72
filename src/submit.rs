use crate::config::LocatorConfig;
use crate::locator::browser::Browser;
use crate::locator::consent::ControlRule;
use crate::locator::{Detection, FrameId, pause};
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

/// Rule tables for typing a decoded answer back into the page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Submit answers after a successful decode
    #[serde(default)]
    pub enabled: bool,

    /// Answer field rules, tried in order before looking next to the image
    #[serde(default = "default_input_rules")]
    pub input_rules: Vec<ControlRule>,

    /// Submit control rules; Enter in the answer field is the fallback
    #[serde(default = "default_submit_rules")]
    pub submit_rules: Vec<ControlRule>,

    /// Words that signal an accepted answer
    #[serde(default = "default_success_markers")]
    pub success_markers: Vec<String>,

    /// Words that signal a rejected answer
    #[serde(default = "default_error_markers")]
    pub error_markers: Vec<String>,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            input_rules: default_input_rules(),
            submit_rules: default_submit_rules(),
            success_markers: default_success_markers(),
            error_markers: default_error_markers(),
        }
    }
}

fn default_input_rules() -> Vec<ControlRule> {
    [
        "input#captcha",
        "input#captcha_code",
        "input#captchaInput",
        "input#code",
        "input#verification_code",
        "input[name='captcha']",
        "input[name='code']",
        "input[placeholder*='captcha']",
        "input[placeholder*='code']",
        "input[class*='captcha']",
        "input[type='text']",
    ]
    .into_iter()
    .map(ControlRule::css)
    .collect()
}

fn default_submit_rules() -> Vec<ControlRule> {
    let labelled = ["Submit", "Verify", "Check", "Valider", "Send"]
        .into_iter()
        .map(|label| ControlRule::text("button", label));
    let typed = ["button[type='submit']", "input[type='submit']"]
        .into_iter()
        .map(ControlRule::css);
    labelled.chain(typed).collect()
}

fn default_success_markers() -> Vec<String> {
    ["success", "successful", "successfully", "correct", "valid", "succès"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_error_markers() -> Vec<String> {
    ["error", "incorrect", "invalid", "erreur"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// How the form was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMethod {
    Button,
    Enter,
}

/// How far a submission got
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionReport {
    pub input_found: bool,
    pub filled: bool,
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<SubmitMethod>,

    /// `None` when the page showed neither a success nor an error marker
    pub success: Option<bool>,
}

/// Fills in and submits a decoded answer next to a located CAPTCHA
#[derive(Debug)]
pub struct Submitter {
    config: SubmitConfig,
    success: RegexSet,
    error: RegexSet,
    timing: LocatorConfig,
}

impl Submitter {
    pub fn new(config: SubmitConfig, timing: LocatorConfig) -> Result<Self, regex::Error> {
        let success = markers(&config.success_markers)?;
        let error = markers(&config.error_markers)?;
        Ok(Self {
            config,
            success,
            error,
            timing,
        })
    }

    /// Type `answer` into the CAPTCHA's field, submit it and read the verdict.
    ///
    /// Works in the frame the CAPTCHA was found in; the browser is back on the
    /// top-level document when this returns.
    pub async fn submit<B: Browser>(
        &self,
        browser: &mut B,
        detection: &Detection,
        answer: &str,
    ) -> SubmissionReport {
        let mut report = SubmissionReport::default();

        if let FrameId::Frame(index) = detection.frame {
            if let Err(e) = browser.enter_frame(index).await {
                ::log::warn!("Could not re-enter {}: {}", detection.frame, e);
                return report;
            }
        }

        self.fill_and_send(browser, detection, answer, &mut report)
            .await;

        if let Err(e) = browser.enter_root().await {
            ::log::error!("Failed to return to the main document: {}", e);
        }
        report
    }

    async fn fill_and_send<B: Browser>(
        &self,
        browser: &mut B,
        detection: &Detection,
        answer: &str,
        report: &mut SubmissionReport,
    ) {
        let Some(input) = self.find_input(browser, detection).await else {
            ::log::info!("No answer field found in {}", detection.frame);
            return;
        };
        report.input_found = true;

        let before = browser.page_text().await.unwrap_or_default();

        if let Err(e) = browser.type_text(&input, answer).await {
            ::log::warn!("Could not type the answer: {}", e);
            return;
        }
        report.filled = true;
        ::log::info!("Answer entered: {:?}", answer);

        let Some(method) = self.send(browser, &input).await else {
            ::log::info!("No way to submit the answer");
            return;
        };
        report.submitted = true;
        report.method = Some(method);
        pause(self.timing.settle()).await;

        match browser.page_text().await {
            Ok(after) => report.success = self.verdict(&before, &after),
            Err(e) => ::log::debug!("Page text unavailable after submit: {}", e),
        }
        match report.success {
            Some(true) => ::log::info!("Answer accepted"),
            Some(false) => ::log::info!("Answer rejected"),
            None => ::log::info!("Answer outcome uncertain"),
        }
    }

    async fn find_input<B: Browser>(
        &self,
        browser: &mut B,
        detection: &Detection,
    ) -> Option<B::Element> {
        for (idx, rule) in self.config.input_rules.iter().enumerate() {
            match browser.find_control(rule, self.timing.control_wait()).await {
                Ok(Some(input)) => {
                    ::log::debug!("Answer field matched rule #{}: {}", idx + 1, rule);
                    return Some(input);
                }
                Ok(None) => {}
                Err(e) => ::log::trace!("Input rule #{} failed: {}", idx + 1, e),
            }
        }

        let src = detection.attributes.src.as_deref()?;
        match browser.find_input_near(src).await {
            Ok(input) => input,
            Err(e) => {
                ::log::debug!("No input next to the CAPTCHA image: {}", e);
                None
            }
        }
    }

    async fn send<B: Browser>(&self, browser: &mut B, input: &B::Element) -> Option<SubmitMethod> {
        for (idx, rule) in self.config.submit_rules.iter().enumerate() {
            let button = match browser.find_control(rule, self.timing.control_wait()).await {
                Ok(Some(button)) => button,
                Ok(None) => continue,
                Err(e) => {
                    ::log::trace!("Submit rule #{} failed: {}", idx + 1, e);
                    continue;
                }
            };
            match browser.activate(&button).await {
                Ok(()) => {
                    ::log::info!("Submit control clicked (rule #{}: {})", idx + 1, rule);
                    return Some(SubmitMethod::Button);
                }
                Err(e) => ::log::debug!("Submit control #{} not clickable: {}", idx + 1, e),
            }
        }

        match browser.press_enter(input).await {
            Ok(()) => {
                ::log::info!("Submitted via Enter");
                Some(SubmitMethod::Enter)
            }
            Err(e) => {
                ::log::warn!("Enter key failed: {}", e);
                None
            }
        }
    }

    /// Classify the page after submitting. Markers already shown before do not count.
    pub fn verdict(&self, before: &str, after: &str) -> Option<bool> {
        let appeared = |set: &RegexSet| {
            let seen = set.matches(before);
            set.matches(after).iter().any(|idx| !seen.matched(idx))
        };

        if appeared(&self.success) {
            Some(true)
        } else if appeared(&self.error) {
            Some(false)
        } else {
            None
        }
    }
}

/// Whole-word, case-insensitive marker patterns
fn markers(words: &[String]) -> Result<RegexSet, regex::Error> {
    RegexSetBuilder::new(
        words
            .iter()
            .map(|word| format!(r"\b{}\b", regex::escape(word))),
    )
    .case_insensitive(true)
    .build()
}
