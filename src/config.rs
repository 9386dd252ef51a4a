use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::map::LatLng;

/// Places that are always on the map, in dispatch order.
pub const BUILTIN_LOCATIONS: &[&str] = &[
    "Lake Kivu",
    "Gisenyi",
    "Kigali",
    "Ruhengeri",
    "Kigarama",
    "Butare",
    "Kibungo",
    "Kinazi",
    "Nyungwe Forest National Park",
];

const DEFAULT_PLACES_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const DEFAULT_ENCYCLOPEDIA_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const DEFAULT_BURST_LIMIT: usize = 10;
const DEFAULT_BURST_WINDOW_MS: u64 = 1_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_places_api_key: Option<SecretString>,
    pub places_endpoint: String,
    pub encyclopedia_endpoint: String,
    pub region_qualifier: String,
    pub builtin_locations: Vec<String>,
    pub places_burst_limit: usize,
    pub places_burst_window_ms: u64,
    pub user_batch_delay_ms: u64,
    pub message_duration_ms: u64,
    pub reveal_message_duration_ms: u64,
    pub http_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub store_file_name: String,
    pub map_center: LatLng,
    pub map_zoom: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub places_endpoint: String,
    pub encyclopedia_endpoint: String,
    pub region_qualifier: String,
    pub places_burst_limit: usize,
    pub places_burst_window_ms: u64,
    pub user_batch_delay_ms: u64,
    pub message_duration_ms: u64,
    pub reveal_message_duration_ms: u64,
    pub data_dir: String,
    pub store_file_name: String,
    pub has_google_places_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            google_places_api_key: env::var("GOOGLE_PLACES_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            places_endpoint: env::var("PLACES_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_PLACES_ENDPOINT.to_string()),
            encyclopedia_endpoint: env::var("ENCYCLOPEDIA_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENCYCLOPEDIA_ENDPOINT.to_string()),
            region_qualifier: env::var("REGION_QUALIFIER")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "Rwanda".to_string()),
            builtin_locations: default_builtin_locations(),
            places_burst_limit: parse_usize("PLACES_BURST_LIMIT", DEFAULT_BURST_LIMIT).max(1),
            places_burst_window_ms: parse_u64("PLACES_BURST_WINDOW_MS", DEFAULT_BURST_WINDOW_MS),
            user_batch_delay_ms: parse_u64("USER_BATCH_DELAY_MS", 400),
            message_duration_ms: parse_u64("MESSAGE_DURATION_MS", 1_500),
            reveal_message_duration_ms: parse_u64("REVEAL_MESSAGE_DURATION_MS", 2_000),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", 10).max(1),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            store_file_name: env::var("STORE_FILE_NAME")
                .unwrap_or_else(|_| "place-map.db".to_string()),
            map_center: LatLng::new(
                parse_f64("MAP_CENTER_LAT", -1.930820),
                parse_f64("MAP_CENTER_LNG", 29.874024),
            ),
            map_zoom: parse_u8("MAP_ZOOM", 9),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            places_endpoint: self.places_endpoint.clone(),
            encyclopedia_endpoint: self.encyclopedia_endpoint.clone(),
            region_qualifier: self.region_qualifier.clone(),
            places_burst_limit: self.places_burst_limit,
            places_burst_window_ms: self.places_burst_window_ms,
            user_batch_delay_ms: self.user_batch_delay_ms,
            message_duration_ms: self.message_duration_ms,
            reveal_message_duration_ms: self.reveal_message_duration_ms,
            data_dir: self.data_dir.to_string_lossy().to_string(),
            store_file_name: self.store_file_name.clone(),
            has_google_places_key: self.google_places_api_key.is_some(),
        }
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_millis(self.places_burst_window_ms)
    }

    pub fn user_batch_delay(&self) -> Duration {
        Duration::from_millis(self.user_batch_delay_ms)
    }

    pub fn message_duration(&self) -> Duration {
        Duration::from_millis(self.message_duration_ms)
    }

    pub fn reveal_message_duration(&self) -> Duration {
        Duration::from_millis(self.reveal_message_duration_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Configuration with fixed values and no environment lookups.
    pub fn for_region(region: impl Into<String>) -> Self {
        Self {
            google_places_api_key: None,
            places_endpoint: DEFAULT_PLACES_ENDPOINT.to_string(),
            encyclopedia_endpoint: DEFAULT_ENCYCLOPEDIA_ENDPOINT.to_string(),
            region_qualifier: region.into(),
            builtin_locations: default_builtin_locations(),
            places_burst_limit: DEFAULT_BURST_LIMIT,
            places_burst_window_ms: DEFAULT_BURST_WINDOW_MS,
            user_batch_delay_ms: 400,
            message_duration_ms: 1_500,
            reveal_message_duration_ms: 2_000,
            http_timeout_secs: 10,
            data_dir: PathBuf::from("data"),
            store_file_name: "place-map.db".to_string(),
            map_center: LatLng::new(-1.930820, 29.874024),
            map_zoom: 9,
        }
    }
}

fn default_builtin_locations() -> Vec<String> {
    BUILTIN_LOCATIONS.iter().map(|name| name.to_string()).collect()
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u8(key: &str, default: u8) -> u8 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
