use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batch::BatchProgress;
use crate::config::AppConfig;
use crate::encyclopedia::{EncyclopediaSearch, SummaryEnricher};
use crate::errors::AppResult;
use crate::location::{Category, LocationBuilder};
use crate::map::{LatLng, MapSurface};
use crate::messages::Messenger;
use crate::pacing::BurstLimiter;
use crate::places::{PlaceResolver, PlaceSearch};
use crate::reveal::RevealController;
use crate::search::{self, InputBar};
use crate::sequencer::{Sequencer, SequencerParts};
use crate::state::{AppState, LocationId, SharedState};
use crate::store::{load_user_names, KeyValueStore};
use crate::timers::ScheduledTask;

pub const NOTHING_HIGHLIGHTED_MESSAGE: &str = "Not in stock sorry!";

#[derive(Debug, Clone, Serialize)]
pub struct LocationSnapshot {
    pub id: LocationId,
    pub name: String,
    pub category: Category,
    pub position: LatLng,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub highlighted: bool,
    pub popup_open: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserSnapshot {
    pub ready: bool,
    pub builtin_batch: BatchProgress,
    pub user_batch: BatchProgress,
    pub locations: Vec<LocationSnapshot>,
    pub matching: Vec<LocationId>,
    pub highlighted: Option<LocationId>,
    pub bar: InputBar,
    pub input_text: String,
    pub message: Option<String>,
}

/// Background work started by [`MapBrowser::start`].
pub struct Startup {
    builtin: JoinHandle<BatchProgress>,
    user: Option<ScheduledTask>,
    reveal: JoinHandle<()>,
}

impl Startup {
    /// Waits for both batches and the whole reveal sequence.
    pub async fn finished(self) {
        if let Err(err) = self.builtin.await {
            warn!(?err, "built-in batch task failed");
        }
        if let Some(user) = self.user {
            user.wait().await;
        }
        if let Err(err) = self.reveal.await {
            warn!(?err, "reveal task failed");
        }
    }

    /// Stops whatever startup work is still pending.
    pub fn abort(self) {
        self.builtin.abort();
        if let Some(user) = self.user {
            user.cancel();
        }
        self.reveal.abort();
    }
}

/// Entry point for every user-facing operation.
pub struct MapBrowser {
    state: SharedState,
    map: Arc<dyn MapSurface>,
    sequencer: Sequencer,
    reveal: RevealController,
    messenger: Messenger,
}

impl MapBrowser {
    pub fn new(
        config: &AppConfig,
        places: Arc<dyn PlaceSearch>,
        encyclopedia: Arc<dyn EncyclopediaSearch>,
        map: Arc<dyn MapSurface>,
        store: Arc<dyn KeyValueStore>,
    ) -> AppResult<Self> {
        let user_names = load_user_names(store.as_ref())?;
        info!(
            builtin = config.builtin_locations.len(),
            user = user_names.len(),
            region = %config.region_qualifier,
            "map browser initialised"
        );
        let state = AppState::new(
            config.builtin_locations.clone(),
            user_names,
            &config.region_qualifier,
        )
        .shared();

        let messenger = Messenger::new(state.clone(), map.clone(), config.message_duration());
        let builder = LocationBuilder::new(
            state.clone(),
            map.clone(),
            SummaryEnricher::new(encyclopedia),
        );
        let sequencer = Sequencer::new(
            SequencerParts {
                state: state.clone(),
                map: map.clone(),
                resolver: PlaceResolver::new(places),
                builder,
                limiter: Arc::new(BurstLimiter::new(
                    config.places_burst_limit,
                    config.burst_window(),
                )),
                store,
                messenger: messenger.clone(),
            },
            config.region_qualifier.clone(),
            config.user_batch_delay(),
        );
        let reveal = RevealController::new(
            state.clone(),
            map.clone(),
            messenger.clone(),
            config.reveal_message_duration(),
        );

        Ok(Self {
            state,
            map,
            sequencer,
            reveal,
            messenger,
        })
    }

    /// Dispatches the built-in batch, schedules the stored user batch and
    /// starts the reveal sequence. Must run inside a tokio runtime.
    pub fn start(&self) -> Startup {
        let reveal = self.reveal.clone();
        let reveal = tokio::spawn(async move { reveal.run().await });
        let sequencer = self.sequencer.clone();
        let builtin = tokio::spawn(async move { sequencer.run_builtin_batch().await });
        let user = self.sequencer.schedule_user_batch();
        Startup {
            builtin,
            user,
            reveal,
        }
    }

    pub fn snapshot(&self) -> BrowserSnapshot {
        let state = self.state.lock();
        BrowserSnapshot {
            ready: state.ready,
            builtin_batch: state.builtin_batch.progress(),
            user_batch: state.user_batch.progress(),
            locations: state
                .locations
                .iter()
                .map(|location| LocationSnapshot {
                    id: location.id,
                    name: location.name.clone(),
                    category: location.category,
                    position: location.position,
                    image_url: location.image_url.clone(),
                    description: location
                        .summary
                        .as_ref()
                        .and_then(|summary| summary.description.clone()),
                    url: location.summary.as_ref().and_then(|summary| summary.url.clone()),
                    highlighted: location.highlighted,
                    popup_open: location.popup_open,
                })
                .collect(),
            matching: state.view.matching.clone(),
            highlighted: search::highlighted_location(&state),
            bar: state.view.bar,
            input_text: state.view.input_text.clone(),
            message: state.view.message.clone(),
        }
    }

    /// Enter: activates the highlighted match in the search bar, submits the
    /// text in the add bar.
    pub async fn on_enter_key(&self) {
        let bar = self.state.lock().view.bar;
        match bar {
            InputBar::Search => self.activate(),
            InputBar::Add => self.submit_add().await,
            InputBar::None => {}
        }
    }

    pub fn on_up_arrow(&self) -> bool {
        let mut state = self.state.lock();
        state.view.bar == InputBar::Search && search::highlight_previous(&mut state)
    }

    pub fn on_down_arrow(&self) -> bool {
        let mut state = self.state.lock();
        state.view.bar == InputBar::Search && search::highlight_next(&mut state)
    }

    pub fn on_escape(&self) {
        let mut state = self.state.lock();
        search::hide(&mut state, self.map.as_ref());
    }

    pub fn on_search_button(&self) {
        let mut state = self.state.lock();
        search::toggle_search_bar(&mut state, self.map.as_ref());
    }

    /// Submits when the add bar holds real input, toggles the add bar
    /// otherwise.
    pub async fn on_add_button(&self) {
        let add_active = self.state.lock().view.add_active();
        if add_active {
            self.submit_add().await;
        } else {
            let mut state = self.state.lock();
            search::toggle_add_bar(&mut state, self.map.as_ref());
        }
    }

    pub fn set_input(&self, text: &str) {
        let mut state = self.state.lock();
        search::set_input(&mut state, self.map.as_ref(), text);
    }

    /// Click into the input field.
    pub fn clear_input(&self) {
        let mut state = self.state.lock();
        search::clear_input(&mut state, self.map.as_ref());
    }

    pub fn show_builtin(&self) {
        self.show_category(Category::Builtin);
    }

    pub fn show_user_added(&self) {
        self.show_category(Category::UserAdded);
    }

    fn show_category(&self, category: Category) {
        let mut state = self.state.lock();
        search::show_category(&mut state, self.map.as_ref(), category);
    }

    /// Click on the bare map.
    pub fn map_click(&self) {
        let mut state = self.state.lock();
        search::close_all(&mut state, self.map.as_ref());
    }

    pub fn marker_click(&self, id: LocationId) {
        let mut state = self.state.lock();
        if state.location(id).is_none() {
            debug!(id, "click on unknown marker");
            return;
        }
        search::toggle_location(&mut state, self.map.as_ref(), id);
    }

    pub fn list_select(&self, id: LocationId) -> Option<LocationId> {
        let mut state = self.state.lock();
        search::select(&mut state, self.map.as_ref(), id)
    }

    /// Opens the highlighted match, or tells the user there is nothing to
    /// open.
    pub fn activate(&self) {
        let activated = {
            let mut state = self.state.lock();
            search::activate_highlighted(&mut state, self.map.as_ref())
        };
        if activated.is_none() {
            self.messenger.notify(NOTHING_HIGHLIGHTED_MESSAGE);
        }
    }

    pub async fn add_location(&self, input: &str) -> AppResult<LocationId> {
        self.sequencer.add_location(input).await
    }

    async fn submit_add(&self) {
        let input = self.state.lock().view.input_text.clone();
        if let Err(err) = self.add_location(&input).await {
            debug!(?err, "location not added");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::errors::AppError;
    use crate::map::HeadlessMap;
    use crate::places::PlaceSearchResponse;
    use crate::store::{save_user_names, SqliteStore};

    struct Gazetteer;

    #[async_trait]
    impl PlaceSearch for Gazetteer {
        async fn text_search(&self, query: &str) -> AppResult<PlaceSearchResponse> {
            let (name, lat, lng) = match query {
                "Kigali Rwanda" => ("Kigali", -1.94, 30.06),
                "Butare Rwanda" => ("Butare", -2.59, 29.74),
                "Gisenyi Rwanda" => ("Gisenyi", -1.70, 29.26),
                "Musanze Rwanda" => ("Musanze", -1.50, 29.63),
                _ => return Ok(PlaceSearchResponse::with_status("ZERO_RESULTS")),
            };
            Ok(serde_json::from_value(json!({
                "status": "OK",
                "results": [{ "name": name, "geometry": { "location": { "lat": lat, "lng": lng } } }]
            }))?)
        }
    }

    struct Encyclopedia;

    #[async_trait]
    impl EncyclopediaSearch for Encyclopedia {
        async fn opensearch(&self, term: &str) -> AppResult<Value> {
            if term == "Kigali" {
                return Ok(json!([
                    "Kigali",
                    ["Kigali"],
                    ["Kigali is the capital of Rwanda."],
                    ["https://en.wikipedia.org/wiki/Kigali"]
                ]));
            }
            Err(AppError::EnrichmentUnavailable(term.to_string()))
        }
    }

    fn browser(builtin: &[&str], stored: &[&str]) -> (MapBrowser, Arc<HeadlessMap>) {
        let mut config = AppConfig::for_region("Rwanda");
        config.builtin_locations = builtin.iter().map(|s| s.to_string()).collect();
        let map = Arc::new(HeadlessMap::new(config.map_center, config.map_zoom));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let stored = stored.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        save_user_names(store.as_ref(), &stored).unwrap();
        let browser = MapBrowser::new(
            &config,
            Arc::new(Gazetteer),
            Arc::new(Encyclopedia),
            map.clone(),
            store,
        )
        .unwrap();
        (browser, map)
    }

    #[tokio::test(start_paused = true)]
    async fn startup_reveals_both_categories() {
        let (browser, map) = browser(&["Kigali", "Atlantis", "Butare"], &["Musanze"]);
        browser.start().finished().await;

        let snapshot = browser.snapshot();
        assert!(snapshot.ready);
        assert_eq!(snapshot.builtin_batch.treated, 3);
        assert_eq!(snapshot.user_batch.treated, 1);
        assert_eq!(snapshot.locations.len(), 3);
        assert_eq!(map.attached_count(), 3);
        assert_eq!(snapshot.bar, InputBar::None);
        assert!(snapshot.message.is_none());

        let kigali = snapshot
            .locations
            .iter()
            .find(|location| location.name == "Kigali")
            .unwrap();
        assert_eq!(
            kigali.description.as_deref(),
            Some("Kigali is the capital of Rwanda.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn search_then_enter_opens_match() {
        let (browser, map) = browser(&["Kigali", "Butare", "Gisenyi"], &[]);
        browser.start().finished().await;

        browser.on_search_button();
        browser.set_input("  GI ");
        let snapshot = browser.snapshot();
        let names = snapshot
            .matching
            .iter()
            .map(|id| snapshot.locations[*id].name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Kigali") && names.contains(&"Gisenyi"));
        assert_eq!(snapshot.highlighted, Some(snapshot.matching[0]));

        assert!(browser.on_down_arrow());
        assert!(!browser.on_down_arrow());
        let second = snapshot.matching[1];

        browser.on_enter_key().await;
        let snapshot = browser.snapshot();
        assert_eq!(snapshot.bar, InputBar::None);
        assert!(snapshot.locations[second].popup_open);
        assert_eq!(map.open_popups().len(), 1);
        assert_eq!(map.center(), snapshot.locations[second].position);
    }

    #[tokio::test(start_paused = true)]
    async fn enter_without_match_reports_empty_stock() {
        let (browser, _map) = browser(&["Kigali"], &[]);
        browser.start().finished().await;

        browser.on_search_button();
        browser.set_input("zzz");
        browser.on_enter_key().await;
        assert_eq!(
            browser.snapshot().message.as_deref(),
            Some(NOTHING_HIGHLIGHTED_MESSAGE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn add_bar_submits_typed_place() {
        let (browser, map) = browser(&["Kigali"], &[]);
        browser.start().finished().await;

        browser.on_add_button().await;
        assert_eq!(browser.snapshot().bar, InputBar::Add);
        browser.on_add_button().await;
        assert_eq!(browser.snapshot().bar, InputBar::None);

        browser.on_add_button().await;
        browser.set_input("Musanze");
        browser.on_enter_key().await;

        let snapshot = browser.snapshot();
        assert_eq!(snapshot.locations.len(), 2);
        assert_eq!(snapshot.locations[1].category, Category::UserAdded);
        assert_eq!(map.attached_count(), 2);
        assert_eq!(snapshot.message.as_deref(), Some("A new sugar cane!"));
        assert_eq!(snapshot.user_batch.treated, 0);

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        let snapshot = browser.snapshot();
        assert!(snapshot.message.is_none());
        assert!(snapshot.input_text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_builds_each_place_once() {
        let (browser, _map) = browser(&["Kigali", "Butare"], &["Musanze"]);
        let first = browser.start();
        let second = browser.start();
        first.finished().await;
        second.finished().await;

        let snapshot = browser.snapshot();
        assert_eq!(snapshot.locations.len(), 3);
        assert_eq!(snapshot.builtin_batch.treated, 2);
        assert_eq!(snapshot.user_batch.treated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_startup_never_reveals() {
        let (browser, map) = browser(&["Kigali"], &["Musanze"]);
        browser.start().abort();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = browser.snapshot();
        assert!(!snapshot.ready);
        assert!(snapshot.locations.is_empty());
        assert_eq!(map.attached_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn marker_click_toggles_popup() {
        let (browser, map) = browser(&["Kigali", "Butare"], &[]);
        browser.start().finished().await;

        browser.marker_click(0);
        browser.marker_click(1);
        assert_eq!(map.open_popups().len(), 1);
        assert!(browser.snapshot().locations[1].popup_open);

        browser.marker_click(1);
        assert!(map.open_popups().is_empty());

        browser.list_select(0);
        browser.map_click();
        assert!(map.open_popups().is_empty());
        browser.marker_click(42);
    }
}
