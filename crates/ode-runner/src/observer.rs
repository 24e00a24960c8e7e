//! Built-in observation producers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::error::ProducerError;
use crate::producer::{Observation, Producer};

pub const DEFAULT_QUERY: &str = "artificial intelligence developments";

/// Yields a fixed observation about `query` without touching the network.
#[derive(Debug, Clone)]
pub struct SimulatedObserver {
    query: String,
}

impl SimulatedObserver {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

impl Default for SimulatedObserver {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY)
    }
}

#[async_trait]
impl Producer for SimulatedObserver {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn produce(&self, agent_id: &str) -> Result<Observation, ProducerError> {
        info!(agent_id, query = %self.query, "Observing");
        Ok(Observation {
            entry_type: "OBSERVATION".to_string(),
            payload: json!({
                "source": "simulated_web_scan",
                "findings": [
                    {"title": "Autonomous systems scaling", "impact": "high"},
                    {"title": "Open Decision Engines gaining traction", "impact": "medium"}
                ],
                "summary": format!("Detected 2 new major developments regarding {}.", self.query),
            }),
            confidence: 0.95,
            references: vec!["https://example.com/ai-news".to_string()],
        })
    }
}

/// Fetches a page and records what it found there.
pub struct WebObserver {
    client: reqwest::Client,
    url: String,
    query: String,
    timeout: Duration,
}

impl WebObserver {
    pub fn new(
        url: impl Into<String>,
        query: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProducerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ode-runner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            query: query.into(),
            timeout,
        })
    }
}

#[async_trait]
impl Producer for WebObserver {
    fn name(&self) -> &str {
        "web"
    }

    async fn produce(&self, agent_id: &str) -> Result<Observation, ProducerError> {
        info!(agent_id, url = %self.url, "Fetching page");
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProducerError::Timeout(self.timeout)
            } else {
                ProducerError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProducerError::Upstream(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let body = response.text().await?;
        let title = extract_title(&body);
        debug!(bytes = body.len(), title = ?title, "Page fetched");

        Ok(Observation {
            entry_type: "OBSERVATION".to_string(),
            payload: json!({
                "source": "web_fetch",
                "url": self.url,
                "status": status.as_u16(),
                "content_length": body.len(),
                "title": title,
                "summary": summarize(&self.url, title.as_deref(), body.len(), &self.query),
            }),
            confidence: 0.6,
            references: vec![self.url.clone()],
        })
    }
}

/// Contents of the first `<title>` element, whitespace-collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = html[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn summarize(url: &str, title: Option<&str>, bytes: usize, query: &str) -> String {
    format!(
        "Fetched {} ({}, {} bytes) while observing {}.",
        url,
        title.unwrap_or("untitled"),
        bytes,
        query
    )
}
