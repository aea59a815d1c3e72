use serde::{Deserialize, Serialize};
use std::fmt;

/// A way of locating a page control (consent button, answer field, submit button)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControlRule {
    /// Structural CSS selector
    Css { selector: String },
    /// Raw XPath expression
    XPath { expression: String },
    /// Element of `tag` whose text (or `value` for inputs) contains `text`
    Text { tag: String, text: String },
}

/// Selector in a form the WebDriver locator strategies accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLocator {
    Css(String),
    XPath(String),
}

impl ControlRule {
    pub fn css(selector: &str) -> Self {
        ControlRule::Css {
            selector: selector.to_string(),
        }
    }

    pub fn xpath(expression: &str) -> Self {
        ControlRule::XPath {
            expression: expression.to_string(),
        }
    }

    pub fn text(tag: &str, text: &str) -> Self {
        ControlRule::Text {
            tag: tag.to_string(),
            text: text.to_string(),
        }
    }

    /// Convert the rule into a CSS or XPath locator
    pub fn to_locator(&self) -> RuleLocator {
        match self {
            ControlRule::Css { selector } => RuleLocator::Css(selector.clone()),
            ControlRule::XPath { expression } => RuleLocator::XPath(expression.clone()),
            ControlRule::Text { tag, text } => {
                let literal = xpath_literal(text);
                if tag == "input" {
                    RuleLocator::XPath(format!("//input[contains(@value, {})]", literal))
                } else {
                    RuleLocator::XPath(format!("//{}[contains(., {})]", tag, literal))
                }
            }
        }
    }
}

impl fmt::Display for ControlRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRule::Css { selector } => write!(f, "css {}", selector),
            ControlRule::XPath { expression } => write!(f, "xpath {}", expression),
            ControlRule::Text { tag, text } => write!(f, "text <{}> {:?}", tag, text),
        }
    }
}

/// Quote a string for use inside an XPath expression
pub(crate) fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts = text
            .split('\'')
            .map(|part| format!("'{}'", part))
            .collect::<Vec<_>>()
            .join(", \"'\", ");
        format!("concat({})", parts)
    }
}

/// Ordered consent rule table: structural rules first, text rules after
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<ControlRule>,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

fn default_rules() -> Vec<ControlRule> {
    let structural = [
        "#onetrust-accept-btn-handler",
        "#didomi-notice-agree-button",
        "#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll",
        "#CybotCookiebotDialogBodyButtonAccept",
        ".qc-cmp2-summary-buttons button[mode='primary']",
        ".cc-btn.cc-allow",
        ".cookiefirst-root [data-cookiefirst-action='accept']",
        "button[data-testid='uc-accept-all-button']",
        "#axeptio_btn_acceptAll",
        "button.fc-cta-consent",
    ];
    let attribute = [
        "//*[contains(@class, 'save-preference-btn-handler')]",
        "//*[contains(@class, 'qc-cmp-save-and-exit')]",
    ];
    let text = [
        ("button", "Accept all"),
        ("button", "Accept"),
        ("button", "I agree"),
        ("button", "Agree"),
        ("a", "Accept"),
        ("input", "Accept"),
        ("button", "Tout accepter"),
        ("button", "Accepter"),
        ("button", "J'accepte"),
        ("button", "Alle akzeptieren"),
        ("button", "Akzeptieren"),
        ("button", "Aceptar"),
        ("input", "Я согласен с этими правилами"),
        ("button", "Согласен"),
        ("button", "Принимаю"),
        ("button", "Принять"),
        ("input", "согласен"),
    ];

    structural
        .iter()
        .map(|s| ControlRule::css(s))
        .chain(attribute.iter().map(|x| ControlRule::xpath(x)))
        .chain(text.iter().map(|(tag, text)| ControlRule::text(tag, text)))
        .collect()
}
