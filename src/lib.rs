pub mod batch;
pub mod browser;
pub mod commands;
pub mod config;
pub mod encyclopedia;
pub mod errors;
pub mod location;
pub mod map;
pub mod messages;
pub mod pacing;
pub mod places;
pub mod popup;
pub mod reveal;
pub mod search;
pub mod sequencer;
pub mod state;
pub mod store;
pub mod timers;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::commands::{dispatch, parse_command, CommandOutcome, HELP};
use crate::encyclopedia::HttpEncyclopedia;
use crate::errors::AppResult;
use crate::map::HeadlessMap;
use crate::places::HttpPlaceSearch;
use crate::store::SqliteStore;

pub use browser::{BrowserSnapshot, MapBrowser, Startup};
pub use config::AppConfig;
pub use errors::AppError;

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,place_map_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok();
    });
}

/// Wires the HTTP collaborators, the on-disk store and a headless map into a
/// [`MapBrowser`].
pub fn build_browser(config: &AppConfig) -> AppResult<MapBrowser> {
    let store = SqliteStore::open(&config.data_dir, &config.store_file_name)?;
    if store.recovered() {
        warn!(path = ?store.path(), "unreadable store was replaced with an empty one");
    }
    let map = Arc::new(HeadlessMap::new(config.map_center, config.map_zoom));
    info!(center = ?map.center(), zoom = map.zoom(), "headless map ready");
    MapBrowser::new(
        config,
        Arc::new(HttpPlaceSearch::new(config)?),
        Arc::new(HttpEncyclopedia::new(config)?),
        map,
        Arc::new(store),
    )
}

async fn drive(browser: MapBrowser) -> AppResult<()> {
    let startup = browser.start();
    eprintln!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, "unrecognised command");
                eprintln!("{HELP}");
                continue;
            }
        };
        if dispatch(&browser, command).await == CommandOutcome::Quit {
            break;
        }
        println!("{}", serde_json::to_string(&browser.snapshot())?);
    }

    startup.abort();
    info!("input closed, shutting down");
    Ok(())
}

pub fn run() {
    init_tracing();
    let config = AppConfig::from_env();
    if config.google_places_api_key.is_none() {
        warn!("GOOGLE_PLACES_API_KEY is not set; place searches will be rejected");
    }
    info!(config = ?config.public_profile(), "starting place map browser");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("error while building the tokio runtime");

    let result = runtime.block_on(async {
        let browser = build_browser(&config)?;
        drive(browser).await
    });
    if let Err(err) = result {
        error!(?err, "place map browser stopped");
        std::process::exit(1);
    }
}
