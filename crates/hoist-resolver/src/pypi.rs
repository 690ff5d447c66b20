use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::debug;

use crate::index::{index_url_for, parse_index_response, unresolved_message};
use crate::VersionResolver;

/// Resolves versions against a PyPI-compatible index over HTTP.
pub struct PypiResolver {
    client: Client,
}

impl PypiResolver {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("hoist/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn fetch(&self, url: &str) -> Option<String> {
        debug!("GET {url}");
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(err) => {
                debug!("GET {url} failed: {err}");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!("GET {url} returned {status}");
            return None;
        }

        match response.text() {
            Ok(body) => Some(body),
            Err(err) => {
                debug!("failed to read response body from {url}: {err}");
                None
            }
        }
    }
}

impl VersionResolver for PypiResolver {
    fn latest_version(&self, index: &str, package: &str) -> Result<String, String> {
        let url = index_url_for(index, package);
        match self.fetch(&url) {
            Some(body) => parse_index_response(&body, &url, package),
            None => Err(unresolved_message(&url)),
        }
    }
}
