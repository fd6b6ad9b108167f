//! Page fetching.
//!
//! [`PageFetcher`] is the seam between the scrape loop and the network. The
//! production implementation is [`HttpFetcher`]; tests script their own.
//! Each fetcher instance is one session: the batch loop gives every worker
//! its own.

use crate::config::FetchSettings;
use crate::error::{FetchError, ScrapeError};
use crate::models::Page;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// An element a document must contain to count as fully loaded.
#[derive(Debug, Clone)]
pub struct Awaited {
    css: String,
    selector: Selector,
}

impl Awaited {
    pub fn parse(css: &str) -> Result<Self, ScrapeError> {
        let selector = Selector::parse(css).map_err(|_| ScrapeError::Selector(css.to_string()))?;
        Ok(Self {
            css: css.to_string(),
            selector,
        })
    }

    pub fn css(&self) -> &str {
        &self.css
    }
}

/// What to fetch for one work item.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Listing pages render their table late; a page without it is retried.
    pub wait_for: Option<Awaited>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_for: None,
        }
    }

    pub fn wait_for(mut self, awaited: Awaited) -> Self {
        self.wait_for = Some(awaited);
        self
    }
}

/// One network or browser session able to fetch documents.
pub trait PageFetcher {
    /// Fetch a document, classifying any failure.
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError>;
}

impl<T: PageFetcher> PageFetcher for &T {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        (**self).fetch(request).await
    }
}

/// Plain HTTP session over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }

    /// Build `sessions` independent clients, one per worker.
    pub fn pool(settings: &FetchSettings, sessions: usize) -> Result<Vec<Self>, ScrapeError> {
        (0..sessions.max(1)).map(|_| Self::new(settings)).collect()
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(&request.url).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "Response received");

        match status {
            StatusCode::IM_A_TEAPOT => return Err(FetchError::RateLimited),
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound),
            s if !s.is_success() => return Err(FetchError::Status(s.as_u16())),
            _ => {}
        }

        let html = response.text().await?;
        if let Some(awaited) = &request.wait_for {
            check_awaited(&html, awaited)?;
        }

        Ok(Page {
            url: request.url.clone(),
            status: status.as_u16(),
            html,
        })
    }
}

/// Fail with [`FetchError::MissingSelector`] unless `html` contains the awaited element.
pub fn check_awaited(html: &str, awaited: &Awaited) -> Result<(), FetchError> {
    let document = Html::parse_document(html);
    if document.select(&awaited.selector).next().is_some() {
        Ok(())
    } else {
        warn!(selector = %awaited.css, bytes = html.len(), "Awaited element missing from document");
        Err(FetchError::MissingSelector(awaited.css.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch_status(code: u16, body: &str) -> Result<Page, FetchError> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(code).set_body_string(body))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&FetchSettings::default()).unwrap();
        fetcher
            .fetch(&FetchRequest::new(format!("{}/page", server.uri())))
            .await
    }

    #[tokio::test]
    async fn success_returns_body() {
        let page = fetch_status(200, "<html><h1>Haaland</h1></html>").await.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.html.contains("Haaland"));
    }

    #[tokio::test]
    async fn teapot_is_rate_limited() {
        assert_eq!(fetch_status(418, "").await, Err(FetchError::RateLimited));
    }

    #[tokio::test]
    async fn missing_page_is_not_found() {
        assert_eq!(fetch_status(404, "").await, Err(FetchError::NotFound));
    }

    #[tokio::test]
    async fn server_error_is_status() {
        assert_eq!(fetch_status(503, "").await, Err(FetchError::Status(503)));
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>late</p>")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let settings = FetchSettings {
            timeout: Duration::from_millis(100),
            ..FetchSettings::default()
        };
        let fetcher = HttpFetcher::new(&settings).unwrap();

        assert_eq!(
            fetcher.fetch(&FetchRequest::new(server.uri())).await,
            Err(FetchError::Timeout)
        );
    }

    #[tokio::test]
    async fn wait_for_selector_must_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&FetchSettings::default()).unwrap();
        let request = FetchRequest::new(server.uri())
            .wait_for(Awaited::parse("td.td-player a[title]").unwrap());

        assert_eq!(
            fetcher.fetch(&request).await,
            Err(FetchError::MissingSelector("td.td-player a[title]".into()))
        );
    }

    #[test]
    fn awaited_element_present() {
        let awaited = Awaited::parse("td.td-player a[title]").unwrap();
        let html = r#"<table><tr><td class="td-player"><a title="x" href="/p">x</a></td></tr></table>"#;
        assert!(check_awaited(html, &awaited).is_ok());
    }

    #[test]
    fn invalid_css_is_rejected() {
        assert!(matches!(
            Awaited::parse("td[["),
            Err(ScrapeError::Selector(_))
        ));
    }
}
