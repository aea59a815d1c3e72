use crate::config::WebDriverConfig;
use crate::error::{LookupError, VisitError};
use crate::locator::browser::{Browser, ScrollPosition, VISUAL_XPATH};
use crate::locator::consent::{ControlRule, RuleLocator, xpath_literal};
use crate::scorer::CandidateAttributes;
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::key::Key;
use fantoccini::{Client, ClientBuilder, Locator};
use std::time::Duration;
use tokio::time::timeout;

/// Common WebDriver endpoints tried when the configured one is unreachable
const FALLBACK_URLS: [&str; 3] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4444", // Selenium / geckodriver default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

/// Browser session backed by a WebDriver server
pub struct WebDriverSession {
    client: Client,
    page_load: Duration,
}

impl WebDriverSession {
    /// Connects to the configured WebDriver instance, falling back to common local endpoints
    pub async fn connect(config: &WebDriverConfig) -> Result<Self, VisitError> {
        let page_load = Duration::from_secs(config.page_load_secs);

        match connect_to(&config.url, config.headless).await {
            Ok(client) => {
                ::log::debug!("Connected to WebDriver at {}", config.url);
                return Ok(Self { client, page_load });
            }
            Err(e) => {
                ::log::error!("Failed to connect to WebDriver at {}: {}", config.url, e);
            }
        }

        for url in FALLBACK_URLS.iter() {
            if *url == config.url {
                continue;
            }

            ::log::info!("Trying fallback WebDriver URL: {}", url);
            if let Ok(client) = connect_to(url, config.headless).await {
                ::log::debug!("Connected to fallback WebDriver at {}", url);
                return Ok(Self { client, page_load });
            }
        }

        ::log::error!(
            "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
        );
        Err(VisitError::Session(format!(
            "could not connect to {} or any fallback WebDriver",
            config.url
        )))
    }

    /// Ends the browser session
    pub async fn close(self) {
        if let Err(e) = self.client.close().await {
            ::log::warn!("Failed to close WebDriver session: {}", e);
        }
    }
}

async fn connect_to(
    url: &str,
    headless: bool,
) -> Result<Client, fantoccini::error::NewSessionError> {
    let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
    if headless {
        args.push("--headless=new");
    }

    let mut capabilities = serde_json::Map::new();
    capabilities.insert(
        "goog:chromeOptions".to_string(),
        serde_json::json!({ "args": args }),
    );

    ClientBuilder::native()
        .capabilities(capabilities)
        .connect(url)
        .await
}

/// Maps a WebDriver command failure onto the lookup taxonomy
fn lookup_error(error: CmdError, what: &str) -> LookupError {
    if matches!(error, CmdError::WaitTimeout) {
        return LookupError::Timeout(what.to_string());
    }
    if error.is_no_such_element() {
        return LookupError::NotPresent(what.to_string());
    }

    let message = error.to_string();
    if message.contains("stale element") {
        LookupError::Stale
    } else {
        LookupError::Driver(message)
    }
}

fn to_fantoccini(locator: &RuleLocator) -> Locator<'_> {
    match locator {
        RuleLocator::Css(selector) => Locator::Css(selector),
        RuleLocator::XPath(expression) => Locator::XPath(expression),
    }
}

async fn optional_attr(element: &Element, name: &str) -> Result<Option<String>, LookupError> {
    element
        .attr(name)
        .await
        .map_err(|e| lookup_error(e, name))
}

#[async_trait]
impl Browser for WebDriverSession {
    type Element = Element;

    async fn open(&mut self, url: &str) -> Result<(), VisitError> {
        match timeout(self.page_load, self.client.goto(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if e.to_string().contains("Unable to find session") {
                    return Err(VisitError::Session(e.to_string()));
                }
                return Err(VisitError::Transport(e.to_string()));
            }
            Err(_) => {
                return Err(VisitError::Transport(format!(
                    "timed out after {}s loading {}",
                    self.page_load.as_secs(),
                    url
                )));
            }
        }

        self.client
            .wait()
            .at_most(self.page_load)
            .for_element(Locator::Css("body"))
            .await
            .map_err(|e| VisitError::Transport(format!("document body never appeared: {}", e)))?;

        if let Ok(title) = self.client.title().await {
            ::log::info!("Page loaded: {}", title);
        }
        Ok(())
    }

    async fn title(&mut self) -> Result<String, LookupError> {
        self.client
            .title()
            .await
            .map_err(|e| lookup_error(e, "title"))
    }

    async fn visual_elements(&mut self, wait: Duration) -> Result<Vec<Element>, LookupError> {
        self.client
            .wait()
            .at_most(wait)
            .for_element(Locator::XPath(VISUAL_XPATH))
            .await
            .map_err(|e| lookup_error(e, VISUAL_XPATH))?;

        self.client
            .find_all(Locator::XPath(VISUAL_XPATH))
            .await
            .map_err(|e| lookup_error(e, VISUAL_XPATH))
    }

    async fn inspect(&mut self, element: &Element) -> Result<CandidateAttributes, LookupError> {
        let (_, _, width, height) = element
            .rectangle()
            .await
            .map_err(|e| lookup_error(e, "element rectangle"))?;

        Ok(CandidateAttributes {
            width: width.max(0.0).round() as u32,
            height: height.max(0.0).round() as u32,
            src: optional_attr(element, "src").await?,
            alt: optional_attr(element, "alt").await?,
            class: optional_attr(element, "class").await?,
            id: optional_attr(element, "id").await?,
            name: optional_attr(element, "name").await?,
        })
    }

    async fn snapshot(&mut self, element: &Element) -> Result<Vec<u8>, LookupError> {
        element
            .screenshot()
            .await
            .map_err(|e| lookup_error(e, "element screenshot"))
    }

    async fn scroll(&mut self, position: ScrollPosition) -> Result<(), LookupError> {
        self.client
            .execute(position.script(), vec![])
            .await
            .map(|_| ())
            .map_err(|e| lookup_error(e, "scroll"))
    }

    async fn find_control(
        &mut self,
        rule: &ControlRule,
        wait: Duration,
    ) -> Result<Option<Element>, LookupError> {
        let locator = rule.to_locator();
        if let Err(e) = self
            .client
            .wait()
            .at_most(wait)
            .for_element(to_fantoccini(&locator))
            .await
        {
            return match lookup_error(e, "control") {
                LookupError::Timeout(_) | LookupError::NotPresent(_) => Ok(None),
                other => Err(other),
            };
        }

        let matches = self
            .client
            .find_all(to_fantoccini(&locator))
            .await
            .map_err(|e| lookup_error(e, "control"))?;

        // Controls hidden through CSS are not clickable
        for element in matches {
            match element.is_displayed().await {
                Ok(true) => return Ok(Some(element)),
                Ok(false) => continue,
                Err(e) => ::log::trace!("Skipping control for {}: {}", rule, e),
            }
        }
        Ok(None)
    }

    async fn activate(&mut self, element: &Element) -> Result<(), LookupError> {
        let reference =
            serde_json::to_value(element).map_err(|e| LookupError::Driver(e.to_string()))?;
        self.client
            .execute("arguments[0].scrollIntoView({block: 'center'});", vec![reference])
            .await
            .map_err(|e| lookup_error(e, "scroll into view"))?;

        element
            .click()
            .await
            .map_err(|e| lookup_error(e, "click"))
    }

    async fn find_input_near(&mut self, src: &str) -> Result<Option<Element>, LookupError> {
        let xpath = format!("//*[@src={}]/..//input", xpath_literal(src));
        let inputs = self
            .client
            .find_all(Locator::XPath(&xpath))
            .await
            .map_err(|e| lookup_error(e, "input near captcha"))?;

        for input in inputs {
            let kind = optional_attr(&input, "type").await?.unwrap_or_default();
            if !(kind.is_empty() || kind.eq_ignore_ascii_case("text")) {
                continue;
            }
            if input
                .is_displayed()
                .await
                .map_err(|e| lookup_error(e, "input near captcha"))?
            {
                return Ok(Some(input));
            }
        }
        Ok(None)
    }

    async fn type_text(&mut self, element: &Element, text: &str) -> Result<(), LookupError> {
        element
            .clear()
            .await
            .map_err(|e| lookup_error(e, "clear input"))?;
        element
            .send_keys(text)
            .await
            .map_err(|e| lookup_error(e, "type into input"))
    }

    async fn press_enter(&mut self, element: &Element) -> Result<(), LookupError> {
        let enter: char = Key::Enter.into();
        element
            .send_keys(&enter.to_string())
            .await
            .map_err(|e| lookup_error(e, "enter key"))
    }

    async fn page_text(&mut self) -> Result<String, LookupError> {
        let body = self
            .client
            .find(Locator::Css("body"))
            .await
            .map_err(|e| lookup_error(e, "body"))?;
        body.text().await.map_err(|e| lookup_error(e, "body text"))
    }

    async fn frame_count(&mut self) -> Result<usize, LookupError> {
        self.client
            .find_all(Locator::Css("iframe"))
            .await
            .map(|frames| frames.len())
            .map_err(|e| lookup_error(e, "iframe"))
    }

    async fn enter_frame(&mut self, index: usize) -> Result<(), LookupError> {
        let index = u16::try_from(index)
            .map_err(|_| LookupError::NotPresent(format!("iframe {}", index + 1)))?;
        self.client
            .enter_frame(Some(index))
            .await
            .map_err(|e| lookup_error(e, "iframe"))
    }

    async fn enter_root(&mut self) -> Result<(), LookupError> {
        self.client
            .enter_frame(None)
            .await
            .map_err(|e| lookup_error(e, "default content"))
    }
}
