use std::sync::Arc;
use std::time::Duration;

use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;
use tempfile::tempdir;

use place_map_lib::encyclopedia::HttpEncyclopedia;
use place_map_lib::location::Category;
use place_map_lib::map::HeadlessMap;
use place_map_lib::places::HttpPlaceSearch;
use place_map_lib::store::{load_user_names, save_user_names, SqliteStore};
use place_map_lib::{AppConfig, AppError, MapBrowser};

fn place(server: &Server, query: &'static str, name: &'static str, lat: f64, lng: f64) {
    server.expect(
        Expectation::matching(all_of!(
            request::method_path("GET", "/textsearch"),
            request::query(url_decoded(contains(("query", query)))),
        ))
        .times(1)
        .respond_with(json_encoded(json!({
            "status": "OK",
            "results": [{
                "name": name,
                "geometry": { "location": { "lat": lat, "lng": lng } }
            }]
        }))),
    );
}

fn summary(server: &Server, term: &'static str, payload: serde_json::Value) {
    server.expect(
        Expectation::matching(all_of!(
            request::method_path("GET", "/w/api.php"),
            request::query(url_decoded(contains(("action", "opensearch")))),
            request::query(url_decoded(contains(("search", term)))),
        ))
        .times(..)
        .respond_with(json_encoded(payload)),
    );
}

async fn wait_for_description(browser: &MapBrowser, name: &str) -> Option<String> {
    for _ in 0..100 {
        let snapshot = browser.snapshot();
        let description = snapshot
            .locations
            .iter()
            .find(|location| location.name == name)
            .and_then(|location| location.description.clone());
        if description.is_some() {
            return description;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::test]
async fn startup_reveal_and_user_additions() {
    let server = Server::run();

    place(&server, "Kigali Rwanda", "Kigali", -1.9441, 30.0619);
    place(&server, "Gisenyi Rwanda", "Gisenyi", -1.7028, 29.2564);
    place(&server, "kigali Rwanda", "Kigali", -1.9441, 30.0619);
    place(&server, "Musanze Rwanda", "Musanze", -1.4998, 29.6349);
    server.expect(
        Expectation::matching(all_of!(
            request::method_path("GET", "/textsearch"),
            request::query(url_decoded(contains(("query", "Atlantis Rwanda")))),
        ))
        .times(1)
        .respond_with(status_code(503)),
    );

    summary(
        &server,
        "Kigali",
        json!([
            "Kigali",
            ["Kigali"],
            ["Kigali is the capital and largest city of Rwanda."],
            ["https://en.wikipedia.org/wiki/Kigali"]
        ]),
    );
    summary(
        &server,
        "Gisenyi",
        json!([
            "Gisenyi",
            ["Gisenyi"],
            ["Gisenyi may refer to:"],
            ["https://en.wikipedia.org/wiki/Gisenyi"]
        ]),
    );
    summary(&server, "Musanze", json!(["Musanze", [], [], []]));

    let dir = tempdir().unwrap();
    let mut config = AppConfig::for_region("Rwanda");
    config.places_endpoint = server.url_str("/textsearch");
    config.encyclopedia_endpoint = server.url_str("/w/api.php");
    config.builtin_locations = vec!["Kigali".into(), "Atlantis".into()];
    config.user_batch_delay_ms = 10;
    config.message_duration_ms = 20;
    config.reveal_message_duration_ms = 20;
    config.data_dir = dir.path().to_path_buf();

    let store = Arc::new(SqliteStore::open(&config.data_dir, &config.store_file_name).unwrap());
    save_user_names(store.as_ref(), &["Gisenyi".to_string()]).unwrap();

    let map = Arc::new(HeadlessMap::new(config.map_center, config.map_zoom));
    let browser = MapBrowser::new(
        &config,
        Arc::new(HttpPlaceSearch::new(&config).unwrap()),
        Arc::new(HttpEncyclopedia::new(&config).unwrap()),
        map.clone(),
        store.clone(),
    )
    .unwrap();

    browser.start().finished().await;

    let snapshot = browser.snapshot();
    assert!(snapshot.ready);
    assert_eq!(snapshot.builtin_batch.treated, 2);
    assert_eq!(snapshot.user_batch.treated, 1);
    assert_eq!(snapshot.locations.len(), 2);
    assert_eq!(map.attached_count(), 2);

    let kigali = snapshot
        .locations
        .iter()
        .find(|location| location.name == "Kigali")
        .unwrap();
    assert_eq!(kigali.category, Category::Builtin);
    assert_eq!(kigali.image_url.as_deref(), Some("img/kigali.jpg"));

    assert_eq!(
        wait_for_description(&browser, "Kigali").await.as_deref(),
        Some("Kigali is the capital and largest city of Rwanda.")
    );
    let gisenyi = browser
        .snapshot()
        .locations
        .into_iter()
        .find(|location| location.name == "Gisenyi")
        .unwrap();
    assert_eq!(gisenyi.category, Category::UserAdded);
    assert!(gisenyi.description.is_none());

    let duplicate = browser.add_location("kigali").await;
    assert!(matches!(duplicate, Err(AppError::DuplicateLocation(name)) if name == "Kigali"));
    assert_eq!(
        browser.snapshot().message.as_deref(),
        Some("Already occupied!")
    );
    assert_eq!(
        load_user_names(store.as_ref()).unwrap(),
        vec!["Gisenyi".to_string()]
    );

    let id = browser.add_location("Musanze").await.unwrap();
    let snapshot = browser.snapshot();
    assert_eq!(snapshot.locations[id].name, "Musanze");
    assert_eq!(snapshot.message.as_deref(), Some("A new sugar cane!"));
    assert_eq!(map.attached_count(), 3);

    drop(browser);
    drop(store);
    let reopened = SqliteStore::open(dir.path(), &config.store_file_name).unwrap();
    assert_eq!(
        load_user_names(&reopened).unwrap(),
        vec!["Gisenyi".to_string(), "Musanze".to_string()]
    );
}

#[tokio::test]
async fn empty_startup_becomes_ready_without_requests() {
    let server = Server::run();
    let dir = tempdir().unwrap();
    let mut config = AppConfig::for_region("Rwanda");
    config.places_endpoint = server.url_str("/textsearch");
    config.encyclopedia_endpoint = server.url_str("/w/api.php");
    config.builtin_locations = Vec::new();
    config.reveal_message_duration_ms = 10;

    let store = Arc::new(SqliteStore::open(dir.path(), "kv.db").unwrap());
    let browser = MapBrowser::new(
        &config,
        Arc::new(HttpPlaceSearch::new(&config).unwrap()),
        Arc::new(HttpEncyclopedia::new(&config).unwrap()),
        Arc::new(HeadlessMap::new(config.map_center, config.map_zoom)),
        store,
    )
    .unwrap();

    browser.start().finished().await;
    let snapshot = browser.snapshot();
    assert!(snapshot.ready);
    assert!(snapshot.locations.is_empty());
    assert_eq!(snapshot.builtin_batch.expected, 0);
}
