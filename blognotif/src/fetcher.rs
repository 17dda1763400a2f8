use anyhow::{Context, Result};
use common::FetchConfig;
use reqwest::Client;
use scraper::Html;
use std::time::Duration;
use tracing::debug;

/// Downloads blog pages and parses them into HTML documents.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self { client })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Self::new(config.timeout_seconds(), config.user_agent())
    }

    /// GET `url` and parse the body. Any transport error or non-2xx status is an error.
    pub async fn fetch(&self, url: &str) -> Result<Html> {
        let body = self.fetch_body(url).await?;
        Ok(Html::parse_document(&body))
    }

    async fn fetch_body(&self, url: &str) -> Result<String> {
        let url = url::Url::parse(url).with_context(|| format!("invalid blog URL '{}'", url))?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("failed to fetch blog page")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("blog page fetch failed with status: {}", status));
        }

        let body = response.text().await.context("failed to read response body")?;
        debug!(url = %url, bytes = body.len(), "fetched blog page");
        Ok(body)
    }
}
