use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// Descriptions containing this are disambiguation notices.
const DISAMBIGUATION_MARKER: &str = "may refer";

const DESCRIPTION_INDEX: usize = 2;
const URL_INDEX: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub description: Option<String>,
    pub url: Option<String>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.url.is_none()
    }
}

#[async_trait]
pub trait EncyclopediaSearch: Send + Sync {
    /// Opensearch lookup; the payload is returned undecoded.
    async fn opensearch(&self, term: &str) -> AppResult<Value>;
}

#[derive(Clone)]
pub struct SummaryEnricher {
    search: Arc<dyn EncyclopediaSearch>,
}

impl SummaryEnricher {
    pub fn new(search: Arc<dyn EncyclopediaSearch>) -> Self {
        Self { search }
    }

    /// Best effort: every failure collapses to `None`.
    pub async fn enrich(&self, name: &str) -> Option<Summary> {
        match self.fetch_summary(name).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                debug!(?err, name, "summary enrichment unavailable");
                None
            }
        }
    }

    pub async fn fetch_summary(&self, name: &str) -> AppResult<Summary> {
        let payload = self
            .search
            .opensearch(name)
            .await
            .map_err(|_| AppError::EnrichmentUnavailable(name.to_string()))?;
        let summary = parse_opensearch(&payload);
        if summary.is_empty() {
            return Err(AppError::EnrichmentUnavailable(name.to_string()));
        }
        Ok(summary)
    }
}

/// Reads `[term, [titles], [descriptions], [urls]]`, keeping only the first
/// description and URL.
pub fn parse_opensearch(payload: &Value) -> Summary {
    let description = first_text(payload, DESCRIPTION_INDEX)
        .filter(|text| !text.contains(DISAMBIGUATION_MARKER));
    let url = first_text(payload, URL_INDEX);
    Summary { description, url }
}

fn first_text(payload: &Value, index: usize) -> Option<String> {
    payload
        .get(index)
        .and_then(|entry| entry.get(0))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub struct HttpEncyclopedia {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpEncyclopedia {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: config.encyclopedia_endpoint.clone(),
        })
    }

    fn request_url(&self, term: &str) -> AppResult<Url> {
        Url::parse_with_params(
            &self.endpoint,
            &[("action", "opensearch"), ("search", term), ("format", "json")],
        )
        .map_err(|err| AppError::Config(format!("invalid encyclopedia endpoint: {err}")))
    }
}

#[async_trait]
impl EncyclopediaSearch for HttpEncyclopedia {
    async fn opensearch(&self, term: &str) -> AppResult<Value> {
        let url = self.request_url(term)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct FixedEncyclopedia(Option<Value>);

    #[async_trait]
    impl EncyclopediaSearch for FixedEncyclopedia {
        async fn opensearch(&self, _term: &str) -> AppResult<Value> {
            self.0
                .clone()
                .ok_or_else(|| AppError::Config("network down".into()))
        }
    }

    fn enricher(payload: Option<Value>) -> SummaryEnricher {
        SummaryEnricher::new(Arc::new(FixedEncyclopedia(payload)))
    }

    #[tokio::test]
    async fn keeps_description_and_link() {
        let summary = enricher(Some(json!([
            "Kigali",
            ["Kigali"],
            ["Kigali is the capital city of Rwanda."],
            ["https://en.wikipedia.org/wiki/Kigali"]
        ])))
        .enrich("Kigali")
        .await
        .unwrap();

        assert_eq!(
            summary.description.as_deref(),
            Some("Kigali is the capital city of Rwanda.")
        );
        assert_eq!(
            summary.url.as_deref(),
            Some("https://en.wikipedia.org/wiki/Kigali")
        );
    }

    #[tokio::test]
    async fn drops_disambiguation_but_keeps_link() {
        let summary = enricher(Some(json!([
            "Foo",
            ["Foo"],
            ["Foo may refer to several things"],
            ["https://en.wikipedia.org/wiki/Foo"]
        ])))
        .enrich("Foo")
        .await
        .unwrap();

        assert_eq!(summary.description, None);
        assert_eq!(summary.url.as_deref(), Some("https://en.wikipedia.org/wiki/Foo"));
    }

    #[tokio::test]
    async fn network_failure_is_none() {
        assert_eq!(enricher(None).enrich("Kigali").await, None);
    }

    #[tokio::test]
    async fn empty_arrays_are_unavailable() {
        let enricher = enricher(Some(json!(["Nowhere", [], [], []])));
        assert!(matches!(
            enricher.fetch_summary("Nowhere").await,
            Err(AppError::EnrichmentUnavailable(name)) if name == "Nowhere"
        ));
        assert_eq!(enricher.enrich("Nowhere").await, None);
    }

    #[test]
    fn tolerates_short_or_malformed_payloads() {
        assert!(parse_opensearch(&json!(["Only a term"])).is_empty());
        assert!(parse_opensearch(&json!({"error": "bad request"})).is_empty());
        let link_only = parse_opensearch(&json!(["x", ["x"], [""], ["https://x"]]));
        assert_eq!(link_only.description, None);
        assert_eq!(link_only.url.as_deref(), Some("https://x"));
    }
}
