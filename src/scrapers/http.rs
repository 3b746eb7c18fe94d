//! Plain HTTP page retrieval shared by both strategies.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, instrument};

/// A pooled `reqwest` client that sends the outlet-friendly user agent.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// GET `url` and return the body. Non-2xx statuses are failures.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(url, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchFailure {
                url: url.to_string(),
                reason: format!("status {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest(url, e, self.timeout))?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
