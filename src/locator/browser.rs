use crate::error::{LookupError, VisitError};
use crate::locator::consent::ControlRule;
use crate::scorer::CandidateAttributes;
use async_trait::async_trait;
use std::time::Duration;

/// XPath matching every image-like element a CAPTCHA may be rendered into
pub const VISUAL_XPATH: &str = "//img | //canvas";

/// Programmatic scroll targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPosition {
    Top,
    Middle,
    Bottom,
}

impl ScrollPosition {
    /// JavaScript performing the scroll
    pub fn script(&self) -> &'static str {
        match self {
            ScrollPosition::Top => "window.scrollTo(0, 0);",
            ScrollPosition::Middle => "window.scrollTo(0, document.body.scrollHeight / 2);",
            ScrollPosition::Bottom => "window.scrollTo(0, document.body.scrollHeight);",
        }
    }
}

/// A live browsing session the locator drives.
///
/// The session owns the "current frame" state: every lookup is evaluated in
/// whichever document the last `enter_frame`/`enter_root` call selected.
#[async_trait]
pub trait Browser: Send {
    /// Handle to an element in the current document
    type Element: Send + Sync;

    /// Navigate to `url` and wait for the document body
    async fn open(&mut self, url: &str) -> Result<(), VisitError>;

    /// Title of the top-level document
    async fn title(&mut self) -> Result<String, LookupError>;

    /// All image and canvas elements, waiting at most `wait` for the first to appear
    async fn visual_elements(
        &mut self,
        wait: Duration,
    ) -> Result<Vec<Self::Element>, LookupError>;

    /// Rendered size and identifying attributes of an element
    async fn inspect(
        &mut self,
        element: &Self::Element,
    ) -> Result<CandidateAttributes, LookupError>;

    /// PNG snapshot of exactly this element
    async fn snapshot(&mut self, element: &Self::Element) -> Result<Vec<u8>, LookupError>;

    async fn scroll(&mut self, position: ScrollPosition) -> Result<(), LookupError>;

    /// First displayed control among those matching `rule`.
    ///
    /// Waits at most `wait` for any match to be present; hidden matches are skipped.
    async fn find_control(
        &mut self,
        rule: &ControlRule,
        wait: Duration,
    ) -> Result<Option<Self::Element>, LookupError>;

    /// Scroll a control into view and click it
    async fn activate(&mut self, element: &Self::Element) -> Result<(), LookupError>;

    /// First displayed text input sharing a container with the image whose `src` is given
    async fn find_input_near(&mut self, src: &str) -> Result<Option<Self::Element>, LookupError>;

    /// Clear a field and type `text` into it
    async fn type_text(&mut self, element: &Self::Element, text: &str) -> Result<(), LookupError>;

    /// Send the Enter key to an element
    async fn press_enter(&mut self, element: &Self::Element) -> Result<(), LookupError>;

    /// Rendered text of the current document
    async fn page_text(&mut self) -> Result<String, LookupError>;

    /// Number of embedded frames in the current document
    async fn frame_count(&mut self) -> Result<usize, LookupError>;

    /// Switch into the frame at `index` (document order, zero based)
    async fn enter_frame(&mut self, index: usize) -> Result<(), LookupError>;

    /// Switch back to the top-level document
    async fn enter_root(&mut self) -> Result<(), LookupError>;
}
