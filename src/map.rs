use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned box that only ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl MapBounds {
    pub fn from_point(point: LatLng) -> Self {
        Self {
            south_west: point,
            north_east: point,
        }
    }

    pub fn extend(&mut self, point: LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSpec {
    pub position: LatLng,
    pub icon: &'static str,
    pub title: String,
}

/// The rendering surface markers and popups live on.
///
/// Markers are created detached; nothing is drawn until `attach_marker`.
pub trait MapSurface: Send + Sync {
    fn create_marker(&self, spec: MarkerSpec) -> MarkerId;
    fn attach_marker(&self, marker: MarkerId);
    fn set_marker_visible(&self, marker: MarkerId, visible: bool);
    fn set_popup_content(&self, marker: MarkerId, content: &str);
    fn open_popup(&self, marker: MarkerId);
    fn close_popup(&self, marker: MarkerId);
    fn pan_to(&self, position: LatLng);
    fn fit_bounds(&self, bounds: &MapBounds);
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerState {
    pub spec: MarkerSpec,
    pub attached: bool,
    pub visible: bool,
    pub popup_open: bool,
    pub popup_content: String,
}

impl MarkerState {
    /// Attached and not hidden by a filter.
    pub fn is_shown(&self) -> bool {
        self.attached && self.visible
    }
}

#[derive(Debug)]
struct Viewport {
    center: LatLng,
    zoom: u8,
    bounds: Option<MapBounds>,
}

/// In-process map surface that records every call.
pub struct HeadlessMap {
    next_id: AtomicU64,
    markers: Mutex<HashMap<MarkerId, MarkerState>>,
    viewport: Mutex<Viewport>,
}

impl HeadlessMap {
    pub fn new(center: LatLng, zoom: u8) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            markers: Mutex::new(HashMap::new()),
            viewport: Mutex::new(Viewport {
                center,
                zoom,
                bounds: None,
            }),
        }
    }

    pub fn marker(&self, marker: MarkerId) -> Option<MarkerState> {
        self.markers.lock().get(&marker).cloned()
    }

    pub fn attached_count(&self) -> usize {
        self.markers.lock().values().filter(|m| m.attached).count()
    }

    pub fn open_popups(&self) -> Vec<MarkerId> {
        let markers = self.markers.lock();
        let mut open = markers
            .iter()
            .filter(|(_, state)| state.popup_open)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        open.sort_by_key(|id| id.0);
        open
    }

    pub fn center(&self) -> LatLng {
        self.viewport.lock().center
    }

    pub fn zoom(&self) -> u8 {
        self.viewport.lock().zoom
    }

    pub fn bounds(&self) -> Option<MapBounds> {
        self.viewport.lock().bounds
    }

    fn with_marker(&self, marker: MarkerId, update: impl FnOnce(&mut MarkerState)) {
        match self.markers.lock().get_mut(&marker) {
            Some(state) => update(state),
            None => trace!(marker = marker.0, "ignoring call for unknown marker"),
        }
    }
}

impl MapSurface for HeadlessMap {
    fn create_marker(&self, spec: MarkerSpec) -> MarkerId {
        let id = MarkerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        trace!(marker = id.0, title = %spec.title, "marker created");
        self.markers.lock().insert(
            id,
            MarkerState {
                spec,
                attached: false,
                visible: true,
                popup_open: false,
                popup_content: String::new(),
            },
        );
        id
    }

    fn attach_marker(&self, marker: MarkerId) {
        self.with_marker(marker, |state| state.attached = true);
    }

    fn set_marker_visible(&self, marker: MarkerId, visible: bool) {
        self.with_marker(marker, |state| state.visible = visible);
    }

    fn set_popup_content(&self, marker: MarkerId, content: &str) {
        self.with_marker(marker, |state| state.popup_content = content.to_string());
    }

    fn open_popup(&self, marker: MarkerId) {
        self.with_marker(marker, |state| state.popup_open = true);
    }

    fn close_popup(&self, marker: MarkerId) {
        self.with_marker(marker, |state| state.popup_open = false);
    }

    fn pan_to(&self, position: LatLng) {
        self.viewport.lock().center = position;
    }

    fn fit_bounds(&self, bounds: &MapBounds) {
        let mut viewport = self.viewport.lock();
        viewport.bounds = Some(*bounds);
        viewport.center = bounds.center();
    }
}
