//! Knowledge search over HTTP.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::application::ports::KnowledgeSearch;
use crate::domain::remediation::PriorSolution;

/// Environment variable holding the bearer token for the knowledge service.
pub const TOKEN_ENV: &str = "HATCHERY_KNOWLEDGE_TOKEN";

const RESULT_LIMIT: &str = "3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PriorSolution>,
}

/// `KnowledgeSearch` against `GET {url}/v1/search`. Returns nothing when no
/// URL is configured.
pub struct HttpKnowledgeSearch {
    base_url: Option<String>,
    token: Option<String>,
}

impl HttpKnowledgeSearch {
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            token: std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()),
        }
    }
}

impl KnowledgeSearch for HttpKnowledgeSearch {
    async fn search(&self, query: &str) -> Result<Vec<PriorSolution>> {
        let Some(base) = &self.base_url else {
            return Ok(Vec::new());
        };
        let url = format!("{base}/v1/search");
        let token = self.token.clone();
        let query = query.to_string();
        debug!(%url, %query, "knowledge search");
        tokio::task::spawn_blocking(move || {
            let mut req = ureq::get(&url)
                .query("q", &query)
                .query("limit", RESULT_LIMIT)
                .timeout(REQUEST_TIMEOUT);
            if let Some(token) = &token {
                req = req.set("Authorization", &format!("Bearer {token}"));
            }
            let body = match req.call() {
                Ok(resp) => resp.into_string().context("reading knowledge response")?,
                Err(ureq::Error::Status(code, _)) => {
                    anyhow::bail!("knowledge search failed: HTTP {code}")
                }
                Err(ureq::Error::Transport(t)) => anyhow::bail!("knowledge search failed: {t}"),
            };
            let parsed: SearchResponse =
                serde_json::from_str(&body).context("parsing knowledge response")?;
            Ok(parsed.results)
        })
        .await
        .context("knowledge search task panicked")?
    }
}
