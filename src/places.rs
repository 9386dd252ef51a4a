use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::map::{LatLng, MapBounds};

pub const STATUS_OK: &str = "OK";

/// Raw payload of a place text search.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceSearchResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<PlaceResult>,
}

impl PlaceSearchResponse {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
    #[serde(default)]
    pub viewport: Option<GeometryViewport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryViewport {
    pub northeast: LatLng,
    pub southwest: LatLng,
}

/// Canonical place as returned by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceRecord {
    pub name: String,
    pub position: LatLng,
    pub viewport: Option<MapBounds>,
}

impl PlaceRecord {
    pub fn new(name: impl Into<String>, position: LatLng) -> Self {
        Self {
            name: name.into(),
            position,
            viewport: None,
        }
    }
}

impl From<PlaceResult> for PlaceRecord {
    fn from(result: PlaceResult) -> Self {
        Self {
            name: result.name,
            position: result.geometry.location,
            viewport: result.geometry.viewport.map(|v| MapBounds {
                south_west: v.southwest,
                north_east: v.northeast,
            }),
        }
    }
}

#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn text_search(&self, query: &str) -> AppResult<PlaceSearchResponse>;
}

/// Turns a free-text query into the first matching place.
#[derive(Clone)]
pub struct PlaceResolver {
    search: Arc<dyn PlaceSearch>,
}

impl PlaceResolver {
    pub fn new(search: Arc<dyn PlaceSearch>) -> Self {
        Self { search }
    }

    /// Issues exactly one search call. Anything but an `OK` status with at
    /// least one result is `ResolutionFailed`.
    pub async fn resolve(&self, query: &str) -> AppResult<PlaceRecord> {
        let response = match self.search.text_search(query).await {
            Ok(response) => response,
            Err(err) => {
                debug!(?err, query, "place search transport failure");
                return Err(AppError::ResolutionFailed(query.to_string()));
            }
        };

        if response.status != STATUS_OK {
            debug!(query, status = %response.status, "place search returned non-OK status");
            return Err(AppError::ResolutionFailed(query.to_string()));
        }

        let record = response
            .results
            .into_iter()
            .next()
            .map(PlaceRecord::from)
            .ok_or_else(|| AppError::ResolutionFailed(query.to_string()))?;
        trace!(query, name = %record.name, "place resolved");
        Ok(record)
    }
}

pub struct HttpPlaceSearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpPlaceSearch {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: config.places_endpoint.clone(),
            api_key: config.google_places_api_key.clone(),
        })
    }

    fn request_url(&self, query: &str) -> AppResult<Url> {
        let mut params = vec![("query", query)];
        if let Some(key) = &self.api_key {
            params.push(("key", key.expose_secret()));
        }
        Url::parse_with_params(&self.endpoint, &params)
            .map_err(|err| AppError::Config(format!("invalid places endpoint: {err}")))
    }
}

#[async_trait]
impl PlaceSearch for HttpPlaceSearch {
    async fn text_search(&self, query: &str) -> AppResult<PlaceSearchResponse> {
        let url = self.request_url(query)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        let parsed: PlaceSearchResponse = response.json().await?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    struct ScriptedSearch {
        responses: Mutex<Vec<AppResult<PlaceSearchResponse>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        fn new(responses: Vec<AppResult<PlaceSearchResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PlaceSearch for ScriptedSearch {
        async fn text_search(&self, query: &str) -> AppResult<PlaceSearchResponse> {
            self.calls.lock().push(query.to_string());
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Ok(PlaceSearchResponse::with_status("ZERO_RESULTS")))
        }
    }

    fn ok_response() -> PlaceSearchResponse {
        serde_json::from_value(serde_json::json!({
            "status": "OK",
            "results": [
                {
                    "name": "Kigali",
                    "geometry": {
                        "location": { "lat": -1.9441, "lng": 30.0619 },
                        "viewport": {
                            "northeast": { "lat": -1.8, "lng": 30.2 },
                            "southwest": { "lat": -2.1, "lng": 29.9 }
                        }
                    }
                },
                {
                    "name": "Kigali Heights",
                    "geometry": { "location": { "lat": -1.95, "lng": 30.09 } }
                }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn returns_first_result_on_ok_status() {
        let search = Arc::new(ScriptedSearch::new(vec![Ok(ok_response())]));
        let resolver = PlaceResolver::new(search.clone());

        let record = resolver.resolve("Kigali Rwanda").await.unwrap();
        assert_eq!(record.name, "Kigali");
        assert_eq!(record.position, LatLng::new(-1.9441, 30.0619));
        assert!(record.viewport.unwrap().contains(record.position));
        assert_eq!(search.calls.lock().as_slice(), ["Kigali Rwanda"]);
    }

    #[tokio::test]
    async fn non_ok_status_is_resolution_failure() {
        let search = Arc::new(ScriptedSearch::new(vec![Ok(
            PlaceSearchResponse::with_status("OVER_QUERY_LIMIT"),
        )]));
        let resolver = PlaceResolver::new(search.clone());

        let err = resolver.resolve("Atlantis Rwanda").await.unwrap_err();
        assert!(matches!(err, AppError::ResolutionFailed(name) if name == "Atlantis Rwanda"));
        assert_eq!(search.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn ok_without_results_and_transport_errors_fail() {
        let search = Arc::new(ScriptedSearch::new(vec![
            Err(AppError::Config("offline".into())),
            Ok(PlaceSearchResponse::with_status(STATUS_OK)),
        ]));
        let resolver = PlaceResolver::new(search.clone());

        assert!(matches!(
            resolver.resolve("Empty").await,
            Err(AppError::ResolutionFailed(_))
        ));
        assert!(matches!(
            resolver.resolve("Offline").await,
            Err(AppError::ResolutionFailed(_))
        ));
        assert_eq!(search.calls.lock().len(), 2);
    }

    #[test]
    fn request_url_carries_query_and_key() {
        let mut config = AppConfig::for_region("Rwanda");
        config.places_endpoint = "http://localhost:1/textsearch".into();
        config.google_places_api_key = Some(SecretString::from("k3y".to_string()));
        let client = HttpPlaceSearch::new(&config).unwrap();

        let url = client.request_url("Lake Kivu Rwanda").unwrap();
        let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                ("query".to_string(), "Lake Kivu Rwanda".to_string()),
                ("key".to_string(), "k3y".to_string()),
            ]
        );
    }
}
