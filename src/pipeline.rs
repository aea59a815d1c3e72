use crate::capture::{CaptureStore, CapturedImage};
use crate::config::AppConfig;
use crate::decoder::Decoder;
use crate::error::{ConfigError, SolveError, VisitError};
use crate::locator::browser::Browser;
use crate::locator::webdriver::WebDriverSession;
use crate::locator::{LocateOutcome, Locator, Stage};
use crate::results::{BatchSummary, SolveReport, VisitReport};
use crate::scorer::CandidateScorer;
use crate::submit::Submitter;
use std::time::Instant;
use url::Url;

/// Locate, capture and optionally decode CAPTCHAs on a sequence of pages
pub struct Pipeline {
    config: AppConfig,
    locator: Locator,
    store: CaptureStore,
    submitter: Submitter,
    decoder: Option<Decoder>,
}

impl Pipeline {
    /// Create a pipeline from loaded configuration. Fails if a keyword or
    /// marker pattern is invalid.
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let scorer = CandidateScorer::new(config.scorer.clone())?;
        let locator = Locator::new(scorer, config.consent.clone(), config.locator.clone());
        let store = CaptureStore::new(&config.capture);
        let submitter = Submitter::new(config.submit.clone(), config.locator.clone())?;
        Ok(Self {
            config,
            locator,
            store,
            submitter,
            decoder: None,
        })
    }

    /// Set the WebDriver endpoint used by [`Pipeline::connect`]
    pub fn with_webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver.url = url.into();
        self
    }

    /// Run the browser without a visible window
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.config.webdriver.headless = headless;
        self
    }

    /// Attach a decoder so captures can be solved
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Type decoded answers back into the page after solving
    pub fn with_submission(mut self, enabled: bool) -> Self {
        self.config.submit.enabled = enabled;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &CaptureStore {
        &self.store
    }

    /// Open a WebDriver session with the configured endpoint
    pub async fn connect(&self) -> Result<WebDriverSession, VisitError> {
        WebDriverSession::connect(&self.config.webdriver).await
    }

    /// Visit one page, capture the first accepted candidate and record it
    pub async fn locate_url<B: Browser>(&self, browser: &mut B, url: &str) -> VisitReport {
        match self.capture_from(browser, url).await {
            Ok(Some((captured, _))) => VisitReport::Captured {
                url: url.to_string(),
                record: captured.record,
            },
            Ok(None) => VisitReport::NotFound {
                url: url.to_string(),
            },
            Err(e) => {
                ::log::error!("Visit to {} failed: {}", url, e);
                VisitReport::Failed {
                    url: url.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Locate, capture and decode the CAPTCHA on one page, then submit the
    /// answer when submission is enabled.
    ///
    /// A detection is always recorded, even when decoding fails.
    pub async fn solve_url<B: Browser>(
        &self,
        browser: &mut B,
        url: &str,
    ) -> Result<SolveReport, SolveError> {
        let decoder = self.decoder.as_ref().ok_or(SolveError::NoDecoder)?;
        let start = Instant::now();

        let validated = parse_url(url)?;
        let outcome = self.locator.visit(browser, validated.as_str()).await?;
        let (detection, stage) = match outcome {
            LocateOutcome::Found { detection, stage } => (detection, stage),
            LocateOutcome::NotFound { .. } => {
                return Ok(SolveReport {
                    url: url.to_string(),
                    found: false,
                    stage: None,
                    text: None,
                    confidence: None,
                    low_confidence: false,
                    image_path: None,
                    submission: None,
                    duration_secs: start.elapsed().as_secs_f64(),
                });
            }
        };

        let title = page_title(browser).await;
        let prediction = match decoder.predict(&detection.png) {
            Ok(prediction) => prediction,
            Err(e) => {
                ::log::error!("Decoding the capture from {} failed: {}", url, e);
                if let Err(record_err) = self.store.capture(&detection, stage, url, &title) {
                    ::log::error!("Capture from {} not recorded: {}", url, record_err);
                }
                return Err(e.into());
            }
        };

        let submission = if self.config.submit.enabled && !prediction.text.is_empty() {
            Some(
                self.submitter
                    .submit(browser, &detection, &prediction.text)
                    .await,
            )
        } else {
            None
        };

        let mut captured = self.store.save_image(&detection, stage, url, &title)?;
        captured.record.prediction = Some(prediction.clone());
        if let Some(report) = submission.as_ref().filter(|r| r.filled) {
            captured.record.solution = Some(prediction.text.clone());
            captured.record.success = report.success;
        }
        self.store.append(&captured.record)?;

        ::log::info!(
            "Solved {} as {:?} (confidence {:.3})",
            url,
            prediction.text,
            prediction.confidence
        );
        Ok(SolveReport {
            url: url.to_string(),
            found: true,
            stage: Some(stage.to_string()),
            text: Some(prediction.text),
            confidence: Some(prediction.confidence),
            low_confidence: prediction.low_confidence,
            image_path: Some(captured.path.display().to_string()),
            submission,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Visit each URL in turn. A failed visit is recorded and the next URL proceeds.
    pub async fn run_batch<B: Browser>(
        &self,
        browser: &mut B,
        urls: &[String],
    ) -> (Vec<VisitReport>, BatchSummary) {
        let start = Instant::now();
        let mut summary = BatchSummary::default();
        let mut reports = Vec::with_capacity(urls.len());

        for (idx, url) in urls.iter().enumerate() {
            ::log::info!("Processing URL {}/{}: {}", idx + 1, urls.len(), url);
            let report = self.locate_url(browser, url).await;
            summary.add(&report);
            reports.push(report);
        }

        ::log::info!(
            "Batch complete - {} processed, {} captured, {} failed in {:.2} seconds",
            summary.processed,
            summary.found,
            summary.failed,
            start.elapsed().as_secs_f64()
        );
        (reports, summary)
    }

    async fn capture_from<B: Browser>(
        &self,
        browser: &mut B,
        url: &str,
    ) -> Result<Option<(CapturedImage, Stage)>, VisitError> {
        let validated = parse_url(url)?;
        let (detection, stage) = match self.locator.visit(browser, validated.as_str()).await? {
            LocateOutcome::Found { detection, stage } => (detection, stage),
            LocateOutcome::NotFound { .. } => return Ok(None),
        };

        let title = page_title(browser).await;
        let captured = self.store.capture(&detection, stage, url, &title)?;
        Ok(Some((captured, stage)))
    }
}

fn parse_url(url: &str) -> Result<Url, VisitError> {
    Url::parse(url).map_err(|source| VisitError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

async fn page_title<B: Browser>(browser: &mut B) -> String {
    browser.title().await.unwrap_or_else(|e| {
        ::log::debug!("Page title unavailable: {}", e);
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureConfig;
    use crate::config::LocatorConfig;
    use crate::decoder::alphabet::Alphabet;
    use crate::decoder::preprocess::ModelInput;
    use crate::decoder::{DecoderArtifacts, DecoderConfig, ProbabilityMatrix, SequenceModel};
    use crate::error::DecodeError;
    use crate::locator::tests::static_page::StaticPage;
    use std::fs;
    use std::path::Path;

    const CAPTCHA_PAGE: &str = r#"<html><head><title>Sign up</title></head><body>
        <img src="/captcha.php?id=1" width="180" height="60">
    </body></html>"#;

    /// Always emits "42" with the given peak probability
    struct FortyTwo {
        alphabet: Alphabet,
        peak: f32,
    }

    impl SequenceModel for FortyTwo {
        fn num_classes(&self) -> usize {
            self.alphabet.num_classes()
        }

        fn infer(&self, _input: &ModelInput) -> Result<ProbabilityMatrix, DecodeError> {
            let classes = self.num_classes();
            let blank = self.alphabet.blank();
            let path = [
                self.alphabet.class_of('4'),
                blank,
                self.alphabet.class_of('2'),
            ];
            let rest = (1.0 - self.peak) / (classes - 1) as f32;
            let data = path
                .iter()
                .flat_map(|&best| {
                    (0..classes).map(move |c| if c == best { self.peak } else { rest })
                })
                .collect();
            ProbabilityMatrix::new(path.len(), classes, data)
        }
    }

    /// Inference always fails
    struct Broken {
        classes: usize,
    }

    impl SequenceModel for Broken {
        fn num_classes(&self) -> usize {
            self.classes
        }

        fn infer(&self, _input: &ModelInput) -> Result<ProbabilityMatrix, DecodeError> {
            Err(DecodeError::Inference("backend unavailable".to_string()))
        }
    }

    fn digits() -> Alphabet {
        Alphabet::new("0123456789".chars().collect()).unwrap()
    }

    fn with_model(alphabet: Alphabet, model: Box<dyn SequenceModel>) -> Decoder {
        Decoder::new(DecoderArtifacts::new(
            alphabet,
            model,
            DecoderConfig::default().input_shape(),
            0.5,
        ))
        .unwrap()
    }

    fn decoder(peak: f32) -> Decoder {
        let alphabet = digits();
        let model = FortyTwo {
            alphabet: alphabet.clone(),
            peak,
        };
        with_model(alphabet, Box::new(model))
    }

    fn pipeline(dir: &Path) -> Pipeline {
        let config = AppConfig {
            locator: LocatorConfig::immediate(),
            capture: CaptureConfig {
                image_dir: dir.join("raw"),
                metadata_path: dir.join("captures.jsonl"),
            },
            ..AppConfig::default()
        };
        Pipeline::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_locate_url_records_capture() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let mut page = StaticPage::new(CAPTCHA_PAGE);

        let report = pipeline.locate_url(&mut page, "https://example.com/signup").await;

        match report {
            VisitReport::Captured { record, .. } => {
                assert_eq!(record.page_title, "Sign up");
                assert_eq!(record.stage, "visible");
                assert!(record.prediction.is_none());
                assert!(dir.path().join("raw").join(&record.filename).exists());
            }
            other => panic!("unexpected report {:?}", other),
        }
        assert_eq!(pipeline.store().records().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_continues_after_failed_visit() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let mut page = StaticPage::new(CAPTCHA_PAGE);
        let urls = vec![
            "not a url".to_string(),
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
        ];

        let (reports, summary) = pipeline.run_batch(&mut page, &urls).await;

        assert!(matches!(reports[0], VisitReport::Failed { .. }));
        assert_eq!(reports[2].url(), "https://example.com/b");
        assert_eq!(
            summary,
            BatchSummary {
                processed: 3,
                found: 2,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_page_is_a_failed_visit() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let mut page = StaticPage::new(CAPTCHA_PAGE).unreachable();

        let report = pipeline.locate_url(&mut page, "https://down.example").await;

        assert!(matches!(report, VisitReport::Failed { .. }));
        assert!(pipeline.store().records().is_empty());
    }

    #[tokio::test]
    async fn test_solve_url_decodes_and_records_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).with_decoder(decoder(0.9));
        let mut page = StaticPage::new(CAPTCHA_PAGE);

        let report = pipeline
            .solve_url(&mut page, "https://example.com/signup")
            .await
            .unwrap();

        assert!(report.found);
        assert_eq!(report.stage.as_deref(), Some("visible"));
        assert_eq!(report.text.as_deref(), Some("42"));
        assert!(!report.low_confidence);
        assert!(report.image_path.is_some());

        let records = pipeline.store().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prediction.as_ref().unwrap().text, "42");
    }

    #[tokio::test]
    async fn test_solve_url_without_captcha() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).with_decoder(decoder(0.9));
        let mut page = StaticPage::new("<html><body><p>nothing here</p></body></html>");

        let report = pipeline
            .solve_url(&mut page, "https://example.com/")
            .await
            .unwrap();

        assert!(!report.found);
        assert!(report.text.is_none());
        assert_eq!(page.current_frame(), None);
    }

    #[tokio::test]
    async fn test_solve_requires_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let mut page = StaticPage::new(CAPTCHA_PAGE);

        let result = pipeline.solve_url(&mut page, "https://example.com/").await;
        assert!(matches!(result, Err(SolveError::NoDecoder)));
    }

    #[tokio::test]
    async fn test_failed_decode_still_records_capture() {
        let dir = tempfile::tempdir().unwrap();
        let alphabet = digits();
        let classes = alphabet.num_classes();
        let broken = with_model(alphabet, Box::new(Broken { classes }));
        let pipeline = pipeline(dir.path()).with_decoder(broken);
        let mut page = StaticPage::new(CAPTCHA_PAGE);

        let result = pipeline.solve_url(&mut page, "https://example.com/signup").await;
        assert!(matches!(result, Err(SolveError::Decode(_))));

        let pngs = fs::read_dir(dir.path().join("raw")).unwrap().count();
        let records = pipeline.store().records();
        assert_eq!(pngs, 1);
        assert_eq!(records.len(), pngs);
        assert!(records[0].prediction.is_none());
    }

    #[tokio::test]
    async fn test_solve_url_submits_and_records_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path())
            .with_decoder(decoder(0.9))
            .with_submission(true);
        let mut page = StaticPage::new(
            r#"<html><head><title>Sign up</title></head><body><form>
                <img src="/captcha.php?id=1" width="180" height="60">
                <input id="captcha" type="text">
                <button type="submit">Submit</button>
                <p data-after-submit>Correct, welcome aboard</p>
            </form></body></html>"#,
        );

        let report = pipeline
            .solve_url(&mut page, "https://example.com/signup")
            .await
            .unwrap();

        let submission = report.submission.unwrap();
        assert!(submission.submitted);
        assert_eq!(submission.success, Some(true));
        assert_eq!(page.typed.as_deref(), Some("42"));

        let records = pipeline.store().records();
        assert_eq!(records[0].solution.as_deref(), Some("42"));
        assert_eq!(records[0].success, Some(true));
    }

    #[tokio::test]
    async fn test_submission_is_off_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).with_decoder(decoder(0.9));
        let mut page = StaticPage::new(
            r#"<body><form><img src="/captcha.php" width="180" height="60">
                <input id="captcha"></form></body>"#,
        );

        let report = pipeline
            .solve_url(&mut page, "https://example.com/")
            .await
            .unwrap();

        assert!(report.submission.is_none());
        assert!(page.typed.is_none());
        assert!(pipeline.store().records()[0].solution.is_none());
    }

    #[test]
    fn test_builder_overrides_webdriver() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path())
            .with_webdriver_url("http://localhost:9515")
            .with_headless(true);
        assert_eq!(pipeline.config().webdriver.url, "http://localhost:9515");
        assert!(pipeline.config().webdriver.headless);
    }
}
