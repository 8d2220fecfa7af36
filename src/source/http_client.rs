use crate::config::SourceConfig;
use crate::errors::{Error, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

/// Thin reqwest wrapper shared by the adapters.
///
/// One request, one answer: failures are returned to the caller as
/// [`Error::Fetch`] and never retried here.
pub struct HttpClient {
    inner: reqwest::Client,
    provider: &'static str,
    request_delay: Duration,
}

impl HttpClient {
    pub fn new(provider: &'static str, config: &SourceConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .map_err(|e| Error::fetch(provider, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            provider,
            request_delay: Duration::from_millis(config.request_delay_ms),
        })
    }

    /// Fetch a URL as text. Any non-success status is a fetch error.
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        match self.get_text_opt(url).await? {
            Some(body) => Ok(body),
            None => Err(Error::fetch(self.provider, format!("HTTP 404 for {url}"))),
        }
    }

    /// Like [`get_text`](Self::get_text), but a 404 means "no such symbol"
    /// and comes back as `None`.
    pub async fn get_text_opt(&self, url: &Url) -> Result<Option<String>> {
        self.polite_delay().await;
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::fetch(self.provider, format!("request error: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::fetch(self.provider, format!("HTTP error {status} for {url}")));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| Error::fetch(self.provider, format!("failed to read response body: {e}")))?;
        Ok(Some(text))
    }

    async fn polite_delay(&self) {
        if !self.request_delay.is_zero() {
            sleep(self.request_delay).await;
        }
    }
}
