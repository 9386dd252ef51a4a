use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::encyclopedia::{Summary, SummaryEnricher};
use crate::map::{LatLng, MapBounds, MapSurface, MarkerId, MarkerSpec};
use crate::places::PlaceRecord;
use crate::popup::render_popup;
use crate::search;
use crate::state::{LocationId, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Builtin,
    UserAdded,
}

impl Category {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Category::Builtin => "builtin",
            Category::UserAdded => "user_added",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Category::Builtin => "img/gorilla-pin.png",
            Category::UserAdded => "img/sugar-cane-pin.png",
        }
    }

    /// Only built-in places ship with a picture.
    pub fn image_url(&self, name: &str) -> Option<String> {
        match self {
            Category::Builtin => Some(format!("img/{}.jpg", image_slug(name))),
            Category::UserAdded => None,
        }
    }
}

fn image_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

#[derive(Debug, Clone)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub position: LatLng,
    pub category: Category,
    pub image_url: Option<String>,
    pub summary: Option<Summary>,
    pub highlighted: bool,
    pub popup_open: bool,
    pub marker: MarkerId,
    pub popup_content: String,
}

impl Location {
    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }

    fn apply_summary(&mut self, summary: Option<Summary>) -> &str {
        self.summary = summary;
        self.popup_content = render_popup(
            &self.name,
            self.image_url.as_deref(),
            self.summary.as_ref(),
        );
        &self.popup_content
    }
}

/// Turns resolved places into locations on the map.
#[derive(Clone)]
pub struct LocationBuilder {
    state: SharedState,
    map: Arc<dyn MapSurface>,
    enricher: SummaryEnricher,
    bounds: Arc<Mutex<Option<MapBounds>>>,
}

impl LocationBuilder {
    pub fn new(state: SharedState, map: Arc<dyn MapSurface>, enricher: SummaryEnricher) -> Self {
        Self {
            state,
            map,
            enricher,
            bounds: Arc::new(Mutex::new(None)),
        }
    }

    /// Builds a location with a detached marker. Never fails; the popup starts
    /// without encyclopedia sections.
    pub fn build(&self, id: LocationId, record: PlaceRecord, category: Category) -> Location {
        self.register_position(record.position, record.viewport);

        let marker = self.map.create_marker(MarkerSpec {
            position: record.position,
            icon: category.icon(),
            title: record.name.clone(),
        });
        let image_url = category.image_url(&record.name);
        let popup_content = render_popup(&record.name, image_url.as_deref(), None);
        self.map.set_popup_content(marker, &popup_content);

        Location {
            id,
            name: record.name,
            position: record.position,
            category,
            image_url,
            summary: None,
            highlighted: false,
            popup_open: false,
            marker,
            popup_content,
        }
    }

    /// Appends a freshly built location to the collection and starts its
    /// enrichment in the background.
    pub fn insert(&self, record: PlaceRecord, category: Category) -> LocationId {
        let (id, name) = {
            let mut state = self.state.lock();
            let id = state.locations.len();
            let location = self.build(id, record, category);
            let name = location.name.clone();
            state.locations.push(location);
            search::refresh(&mut state, self.map.as_ref());
            (id, name)
        };
        debug!(id, name = %name, category = category.as_tag(), "location built");
        self.spawn_enrichment(id, name);
        id
    }

    fn spawn_enrichment(&self, id: LocationId, name: String) {
        let builder = self.clone();
        tokio::spawn(async move {
            let summary = builder.enricher.enrich(&name).await;
            builder.complete_enrichment(id, summary);
        });
    }

    fn complete_enrichment(&self, id: LocationId, summary: Option<Summary>) {
        let mut state = self.state.lock();
        let Some(location) = state.locations.get_mut(id) else {
            return;
        };
        if location.summary.is_some() {
            return;
        }
        let marker = location.marker;
        let content = location.apply_summary(summary);
        self.map.set_popup_content(marker, content);
        trace!(id, "popup content enriched");
    }

    /// Grows the fitted area by the position and, when the place came with
    /// one, its viewport.
    fn register_position(&self, position: LatLng, viewport: Option<MapBounds>) {
        let mut bounds = self.bounds.lock();
        let mut fitted = match *bounds {
            Some(existing) => existing,
            None => MapBounds::from_point(position),
        };
        fitted.extend(position);
        if let Some(viewport) = viewport {
            fitted.extend(viewport.south_west);
            fitted.extend(viewport.north_east);
        }
        *bounds = Some(fitted);
        self.map.fit_bounds(&fitted);
    }
}
