pub mod browser;
pub mod consent;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod tests;

use crate::config::LocatorConfig;
use crate::error::VisitError;
use crate::scorer::{AcceptReason, CandidateAttributes, CandidateScorer, Verdict};
use browser::{Browser, ScrollPosition};
use consent::ConsentConfig;
use std::fmt;
use std::time::Duration;

pub use browser::VISUAL_XPATH;

/// Document a lookup is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameId {
    Root,
    /// Zero-based index of a frame embedded in the top-level document
    Frame(usize),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::Root => write!(f, "main document"),
            FrameId::Frame(index) => write!(f, "iframe {}", index + 1),
        }
    }
}

/// Mutable state threaded through one locate attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionContext {
    pub frame: FrameId,
    pub scroll: ScrollPosition,
    pub consent_attempted: bool,
    /// Scans that gave up waiting for any visual element to appear
    pub timed_out_scans: usize,
}

impl Default for DetectionContext {
    fn default() -> Self {
        Self {
            frame: FrameId::Root,
            scroll: ScrollPosition::Top,
            consent_attempted: false,
            timed_out_scans: 0,
        }
    }
}

/// Fallback strategy that produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Visible,
    Scroll,
    Consent,
    /// One-based frame position in document order
    Iframe(usize),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Visible => write!(f, "visible"),
            Stage::Scroll => write!(f, "scroll"),
            Stage::Consent => write!(f, "consent"),
            Stage::Iframe(position) => write!(f, "iframe:{}", position),
        }
    }
}

/// An accepted candidate, snapshotted while its frame was current
#[derive(Debug, Clone)]
pub struct Detection {
    pub attributes: CandidateAttributes,
    pub reason: AcceptReason,
    pub frame: FrameId,
    pub png: Vec<u8>,
}

/// Result of scanning one document for candidates
#[derive(Debug)]
pub enum ScanOutcome {
    Found(Detection),
    NotPresent,
    Timeout,
}

/// Result of a whole locate attempt
#[derive(Debug)]
pub enum LocateOutcome {
    Found { detection: Detection, stage: Stage },
    /// Every stage came up empty; `context` is the state the last stage left behind
    NotFound { context: DetectionContext },
}

impl LocateOutcome {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            LocateOutcome::Found { stage, .. } => Some(*stage),
            LocateOutcome::NotFound { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StageKind {
    VisibleScan,
    ScrollRescan,
    ConsentDismissal,
    IframeDescent,
}

/// Stages in the order they are attempted
const STAGES: [StageKind; 4] = [
    StageKind::VisibleScan,
    StageKind::ScrollRescan,
    StageKind::ConsentDismissal,
    StageKind::IframeDescent,
];

/// Finds one CAPTCHA-shaped element on a live page
pub struct Locator {
    scorer: CandidateScorer,
    consent: ConsentConfig,
    config: LocatorConfig,
}

impl Locator {
    pub fn new(scorer: CandidateScorer, consent: ConsentConfig, config: LocatorConfig) -> Self {
        Self {
            scorer,
            consent,
            config,
        }
    }

    /// Open `url` and locate a candidate on it.
    ///
    /// Only a page that fails to load is an error; everything that goes wrong
    /// while searching the loaded page ends in `LocateOutcome::NotFound`.
    pub async fn visit<B: Browser>(
        &self,
        browser: &mut B,
        url: &str,
    ) -> Result<LocateOutcome, VisitError> {
        ::log::info!("Opening: {}", url);
        browser.open(url).await?;
        Ok(self.locate(browser).await)
    }

    /// Run the fallback stages against the currently loaded page.
    ///
    /// The browser is back on the top-level document when this returns.
    pub async fn locate<B: Browser>(&self, browser: &mut B) -> LocateOutcome {
        let mut ctx = DetectionContext::default();
        let found = self.run_stages(browser, &mut ctx).await;
        self.restore_root(browser, &mut ctx).await;

        match found {
            Some((detection, stage)) => {
                ::log::info!(
                    "CAPTCHA found at stage {} ({}x{}, by {})",
                    stage,
                    detection.attributes.width,
                    detection.attributes.height,
                    detection.reason
                );
                LocateOutcome::Found { detection, stage }
            }
            None => {
                ::log::info!(
                    "No CAPTCHA found on this page (scrolled to {:?}, consent attempted: {}, \
                     {} scan(s) timed out)",
                    ctx.scroll,
                    ctx.consent_attempted,
                    ctx.timed_out_scans
                );
                LocateOutcome::NotFound { context: ctx }
            }
        }
    }

    async fn run_stages<B: Browser>(
        &self,
        browser: &mut B,
        ctx: &mut DetectionContext,
    ) -> Option<(Detection, Stage)> {
        for kind in STAGES {
            if let Some(found) = self.run_stage(kind, browser, ctx).await {
                return Some(found);
            }
        }
        None
    }

    async fn run_stage<B: Browser>(
        &self,
        kind: StageKind,
        browser: &mut B,
        ctx: &mut DetectionContext,
    ) -> Option<(Detection, Stage)> {
        ::log::debug!("Entering stage {:?}", kind);
        match kind {
            StageKind::VisibleScan => self.scan(browser, ctx).await.found(Stage::Visible),
            StageKind::ScrollRescan => {
                self.scroll_to(browser, ctx, ScrollPosition::Bottom).await;
                self.scroll_to(browser, ctx, ScrollPosition::Middle).await;
                self.scan(browser, ctx).await.found(Stage::Scroll)
            }
            StageKind::ConsentDismissal => {
                if !self.dismiss_consent(browser, ctx).await {
                    return None;
                }
                self.scroll_to(browser, ctx, ScrollPosition::Top).await;
                self.scan(browser, ctx).await.found(Stage::Consent)
            }
            StageKind::IframeDescent => self.descend_frames(browser, ctx).await,
        }
    }

    /// Score every visual element in the current document; first accepted wins
    async fn scan<B: Browser>(&self, browser: &mut B, ctx: &mut DetectionContext) -> ScanOutcome {
        let elements = match browser.visual_elements(self.config.element_wait()).await {
            Ok(elements) => elements,
            Err(e) if e.is_timeout() => {
                ::log::debug!("No visual elements appeared in {}", ctx.frame);
                ctx.timed_out_scans += 1;
                return ScanOutcome::Timeout;
            }
            Err(e) => {
                ::log::debug!("Visual element lookup failed in {}: {}", ctx.frame, e);
                return ScanOutcome::NotPresent;
            }
        };
        ::log::info!("Found {} visual elements in {}", elements.len(), ctx.frame);

        for element in &elements {
            let attributes = match browser.inspect(element).await {
                Ok(attributes) => attributes,
                Err(e) => {
                    ::log::debug!("Skipping element that could not be inspected: {}", e);
                    continue;
                }
            };

            let reason = match self.scorer.score(&attributes) {
                Verdict::Accept(reason) => reason,
                Verdict::Reject(why) => {
                    ::log::debug!(
                        "Rejected {}x{} element ({:?})",
                        attributes.width,
                        attributes.height,
                        why
                    );
                    continue;
                }
            };

            match browser.snapshot(element).await {
                Ok(png) => {
                    return ScanOutcome::Found(Detection {
                        attributes,
                        reason,
                        frame: ctx.frame,
                        png,
                    });
                }
                Err(e) => {
                    ::log::warn!("Accepted element could not be captured: {}", e);
                }
            }
        }

        ScanOutcome::NotPresent
    }

    async fn scroll_to<B: Browser>(
        &self,
        browser: &mut B,
        ctx: &mut DetectionContext,
        position: ScrollPosition,
    ) {
        match browser.scroll(position).await {
            Ok(()) => ctx.scroll = position,
            Err(e) => ::log::debug!("Scroll to {:?} failed: {}", position, e),
        }
        pause(self.config.scroll_pause()).await;
    }

    /// Click the first visible consent control. Returns whether one was clicked.
    async fn dismiss_consent<B: Browser>(
        &self,
        browser: &mut B,
        ctx: &mut DetectionContext,
    ) -> bool {
        ctx.consent_attempted = true;

        // Consent banners are frequently injected only once the page is scrolled
        self.scroll_to(browser, ctx, ScrollPosition::Bottom).await;

        ::log::info!("Trying {} consent rules", self.consent.rules.len());
        for (idx, rule) in self.consent.rules.iter().enumerate() {
            let control = match browser.find_control(rule, self.config.control_wait()).await {
                Ok(Some(control)) => control,
                Ok(None) => continue,
                Err(e) => {
                    ::log::trace!("Consent rule #{} failed: {}", idx + 1, e);
                    continue;
                }
            };

            match browser.activate(&control).await {
                Ok(()) => {
                    ::log::info!("Consent control clicked (rule #{}: {})", idx + 1, rule);
                    pause(self.config.settle()).await;
                    return true;
                }
                Err(e) => {
                    ::log::debug!("Consent control for rule #{} not clickable: {}", idx + 1, e);
                }
            }
        }

        ::log::info!("No consent control found");
        false
    }

    /// Rescan inside each embedded frame in document order
    async fn descend_frames<B: Browser>(
        &self,
        browser: &mut B,
        ctx: &mut DetectionContext,
    ) -> Option<(Detection, Stage)> {
        let count = match browser.frame_count().await {
            Ok(count) => count,
            Err(e) => {
                ::log::debug!("Frame lookup failed: {}", e);
                return None;
            }
        };
        if count == 0 {
            ::log::info!("No iframes found");
            return None;
        }
        ::log::info!("Checking {} iframe(s)", count);

        for index in 0..count {
            if let Err(e) = browser.enter_frame(index).await {
                ::log::warn!("Could not enter iframe {}: {}", index + 1, e);
                self.restore_root(browser, ctx).await;
                continue;
            }
            ctx.frame = FrameId::Frame(index);
            pause(self.config.frame_pause()).await;

            match self.scan(browser, ctx).await {
                ScanOutcome::Found(detection) => {
                    return Some((detection, Stage::Iframe(index + 1)));
                }
                ScanOutcome::Timeout => {
                    ::log::info!("iframe {} has no visual elements", index + 1)
                }
                ScanOutcome::NotPresent => {
                    ::log::info!("No candidate accepted in iframe {}", index + 1)
                }
            }

            self.restore_root(browser, ctx).await;
        }
        None
    }

    async fn restore_root<B: Browser>(&self, browser: &mut B, ctx: &mut DetectionContext) {
        match browser.enter_root().await {
            Ok(()) => ctx.frame = FrameId::Root,
            Err(e) => ::log::error!("Failed to return to the main document: {}", e),
        }
    }
}

impl ScanOutcome {
    fn found(self, stage: Stage) -> Option<(Detection, Stage)> {
        match self {
            ScanOutcome::Found(detection) => Some((detection, stage)),
            ScanOutcome::NotPresent | ScanOutcome::Timeout => None,
        }
    }
}

pub(crate) async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
