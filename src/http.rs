/// Page transport.
///
/// Listing and detail parsers only need "give me this page as text", so the
/// transport sits behind [`PageFetcher`] and the discovery pipeline can be
/// driven by an in-memory fake in tests.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::{config::AppConfig, error::FetchError};

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str());

        if let Some(proxy) = config.proxy.as_deref()
            && !proxy.is_empty()
        {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // BBC pages are UTF-8 whatever the Content-Type header claims, so
        // decode the raw bytes ourselves rather than trusting the charset.
        let bytes = response.bytes().await?;
        tracing::debug!("Fetched {url}: {} bytes", bytes.len());
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config(proxy: Option<&str>) -> AppConfig {
        serde_json::from_value(json!({ "proxy": proxy })).unwrap()
    }

    #[test]
    fn blank_proxy_is_ignored() {
        assert!(HttpFetcher::new(&config(Some(""))).is_ok());
        assert!(HttpFetcher::new(&config(None)).is_ok());
    }

    #[test]
    fn proxy_is_accepted() {
        assert!(HttpFetcher::new(&config(Some("http://127.0.0.1:3128"))).is_ok());
    }
}
