//! In-memory `Browser` over HTML fixtures.
//!
//! Fixture conventions:
//! - `<img>`/`<canvas>` take their rendered size from `width`/`height` attributes
//! - `data-lazy` elements only exist once the page has been scrolled to the bottom
//! - `data-after-consent` elements only exist once a consent control was clicked
//! - `<iframe srcdoc="...">` embeds a nested document
//! - controls with a `hidden` attribute, `display:none` style or `type="hidden"` are not displayed
//! - clicking a control inside a `<form>` submits it; clicking one outside dismisses consent
//! - text of `data-after-submit` elements only renders once the form was submitted

use crate::error::{LookupError, VisitError};
use crate::locator::browser::{Browser, ScrollPosition};
use crate::locator::consent::ControlRule;
use crate::scorer::CandidateAttributes;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::io::Cursor;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StaticElement {
    frame: Option<usize>,
    attributes: CandidateAttributes,
    submits: bool,
}

pub struct StaticPage {
    root: String,
    frames: Vec<String>,
    current: Option<usize>,
    scrolled_to_bottom: bool,
    consent_clicked: bool,
    submitted: bool,
    failing_frames: HashSet<usize>,
    unreachable: bool,
    pub typed: Option<String>,
    pub events: Vec<String>,
}

impl StaticPage {
    pub fn new(html: &str) -> Self {
        let frames = frame_documents(html);
        Self {
            root: html.to_string(),
            frames,
            current: None,
            scrolled_to_bottom: false,
            consent_clicked: false,
            submitted: false,
            failing_frames: HashSet::new(),
            unreachable: false,
            typed: None,
            events: Vec::new(),
        }
    }

    /// Entering this frame (zero based) fails with a driver error
    pub fn failing_frame(mut self, index: usize) -> Self {
        self.failing_frames.insert(index);
        self
    }

    /// The page never loads
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn current_frame(&self) -> Option<usize> {
        self.current
    }

    pub fn position_of(&self, event: &str) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }

    fn document(&self) -> &str {
        match self.current {
            None => &self.root,
            Some(index) => &self.frames[index],
        }
    }

    fn control_element(&self, submits: bool) -> StaticElement {
        StaticElement {
            frame: self.current,
            attributes: CandidateAttributes::default(),
            submits,
        }
    }

    fn context_name(&self) -> String {
        match self.current {
            None => "root".to_string(),
            Some(index) => format!("frame {}", index),
        }
    }
}

fn frame_documents(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("iframe").unwrap();
    doc.select(&selector)
        .map(|frame| frame.value().attr("srcdoc").unwrap_or("").to_string())
        .collect()
}

fn attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element.value().attr(name).map(|v| v.to_string())
}

fn dimension(element: &ElementRef<'_>, name: &str) -> u32 {
    element
        .value()
        .attr(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn is_displayed(element: &ElementRef<'_>) -> bool {
    let style = element
        .value()
        .attr("style")
        .unwrap_or("")
        .replace(' ', "");
    element.value().attr("hidden").is_none()
        && element.value().attr("type") != Some("hidden")
        && !style.contains("display:none")
}

fn has_ancestor(
    element: &ElementRef<'_>,
    predicate: impl Fn(&scraper::node::Element) -> bool,
) -> bool {
    element
        .ancestors()
        .any(|node| node.value().as_element().is_some_and(&predicate))
}

fn in_form(element: &ElementRef<'_>) -> bool {
    has_ancestor(element, |e| e.name() == "form")
}

fn visuals(html: &str, scrolled: bool, consented: bool) -> Vec<CandidateAttributes> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("img, canvas").unwrap();
    doc.select(&selector)
        .filter(|el| scrolled || el.value().attr("data-lazy").is_none())
        .filter(|el| consented || el.value().attr("data-after-consent").is_none())
        .map(|el| CandidateAttributes {
            width: dimension(&el, "width"),
            height: dimension(&el, "height"),
            src: attr(&el, "src"),
            alt: attr(&el, "alt"),
            class: attr(&el, "class"),
            id: attr(&el, "id"),
            name: attr(&el, "name"),
        })
        .collect()
}

fn parse_selector(selector: &str) -> Result<Selector, LookupError> {
    Selector::parse(selector).map_err(|e| LookupError::Driver(format!("{:?}", e)))
}

/// Whether the first displayed control matching the rule submits a form
fn control(html: &str, rule: &ControlRule) -> Result<Option<bool>, LookupError> {
    let doc = Html::parse_document(html);
    let found = match rule {
        ControlRule::Css { selector } => doc
            .select(&parse_selector(selector)?)
            .find(is_displayed)
            .map(|el| in_form(&el)),
        ControlRule::Text { tag, text } => doc
            .select(&parse_selector(tag)?)
            .filter(|el| {
                let own_text = el.text().collect::<String>();
                let value = el.value().attr("value").unwrap_or("");
                own_text.contains(text.as_str()) || value.contains(text.as_str())
            })
            .find(is_displayed)
            .map(|el| in_form(&el)),
        ControlRule::XPath { .. } => {
            return Err(LookupError::Driver(
                "xpath is not supported by the static page".to_string(),
            ));
        }
    };
    Ok(found)
}

/// First displayed text input under the parent of the image with this `src`
fn input_near(html: &str, src: &str) -> Option<bool> {
    let doc = Html::parse_document(html);
    let images = Selector::parse("[src]").unwrap();
    let inputs = Selector::parse("input").unwrap();

    let image = doc
        .select(&images)
        .find(|el| el.value().attr("src") == Some(src))?;
    let parent = image.parent().and_then(ElementRef::wrap)?;
    parent
        .select(&inputs)
        .filter(|el| matches!(el.value().attr("type"), None | Some("") | Some("text")))
        .find(is_displayed)
        .map(|el| in_form(&el))
}

fn rendered_text(html: &str, submitted: bool) -> String {
    let doc = Html::parse_document(html);
    let mut text = String::new();
    for node in doc.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let gated = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| e.attr("data-after-submit").is_some())
        });
        if submitted || !gated {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_luma8(width.max(1), height.max(1))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[async_trait]
impl Browser for StaticPage {
    type Element = StaticElement;

    async fn open(&mut self, url: &str) -> Result<(), VisitError> {
        self.events.push(format!("open {}", url));
        if self.unreachable {
            return Err(VisitError::Transport(format!("connection refused: {}", url)));
        }
        self.current = None;
        self.scrolled_to_bottom = false;
        self.consent_clicked = false;
        self.submitted = false;
        self.typed = None;
        Ok(())
    }

    async fn title(&mut self) -> Result<String, LookupError> {
        let doc = Html::parse_document(&self.root);
        let selector = Selector::parse("title").unwrap();
        Ok(doc
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>())
            .unwrap_or_default())
    }

    async fn visual_elements(
        &mut self,
        _wait: Duration,
    ) -> Result<Vec<StaticElement>, LookupError> {
        self.events.push(format!("scan {}", self.context_name()));
        let found = visuals(self.document(), self.scrolled_to_bottom, self.consent_clicked);
        if found.is_empty() {
            return Err(LookupError::Timeout("//img | //canvas".to_string()));
        }
        Ok(found
            .into_iter()
            .map(|attributes| StaticElement {
                frame: self.current,
                attributes,
                submits: false,
            })
            .collect())
    }

    async fn inspect(
        &mut self,
        element: &StaticElement,
    ) -> Result<CandidateAttributes, LookupError> {
        if element.frame != self.current {
            return Err(LookupError::Stale);
        }
        Ok(element.attributes.clone())
    }

    async fn snapshot(&mut self, element: &StaticElement) -> Result<Vec<u8>, LookupError> {
        if element.frame != self.current {
            return Err(LookupError::Stale);
        }
        Ok(png(element.attributes.width, element.attributes.height))
    }

    async fn scroll(&mut self, position: ScrollPosition) -> Result<(), LookupError> {
        self.events.push(format!("scroll {:?}", position).to_lowercase());
        if position == ScrollPosition::Bottom {
            self.scrolled_to_bottom = true;
        }
        Ok(())
    }

    async fn find_control(
        &mut self,
        rule: &ControlRule,
        _wait: Duration,
    ) -> Result<Option<StaticElement>, LookupError> {
        Ok(control(self.document(), rule)?.map(|submits| self.control_element(submits)))
    }

    async fn activate(&mut self, element: &StaticElement) -> Result<(), LookupError> {
        if element.submits {
            self.events.push("submit click".to_string());
            self.submitted = true;
        } else {
            self.events.push("consent click".to_string());
            self.consent_clicked = true;
        }
        Ok(())
    }

    async fn find_input_near(&mut self, src: &str) -> Result<Option<StaticElement>, LookupError> {
        Ok(input_near(self.document(), src).map(|submits| self.control_element(submits)))
    }

    async fn type_text(&mut self, element: &StaticElement, text: &str) -> Result<(), LookupError> {
        if element.frame != self.current {
            return Err(LookupError::Stale);
        }
        self.events.push(format!("type {}", text));
        self.typed = Some(text.to_string());
        Ok(())
    }

    async fn press_enter(&mut self, element: &StaticElement) -> Result<(), LookupError> {
        self.events.push("press enter".to_string());
        if element.submits {
            self.submitted = true;
        }
        Ok(())
    }

    async fn page_text(&mut self) -> Result<String, LookupError> {
        Ok(rendered_text(self.document(), self.submitted))
    }

    async fn frame_count(&mut self) -> Result<usize, LookupError> {
        Ok(frame_documents(self.document()).len())
    }

    async fn enter_frame(&mut self, index: usize) -> Result<(), LookupError> {
        self.events.push(format!("enter frame {}", index));
        if self.failing_frames.contains(&index) {
            return Err(LookupError::Driver(format!("no such frame {}", index)));
        }
        if index >= self.frames.len() {
            return Err(LookupError::NotPresent(format!("frame {}", index)));
        }
        self.current = Some(index);
        Ok(())
    }

    async fn enter_root(&mut self) -> Result<(), LookupError> {
        self.events.push("enter root".to_string());
        self.current = None;
        Ok(())
    }
}
