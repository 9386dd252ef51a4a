//! Derived search/filter state and the operations that drive it.
//!
//! Every mutation of the inputs (`input_text`, `bar`, `show_mode`, `message`
//! or the location collection) is followed by [`refresh`], which recomputes
//! the match set, marker visibility and the default highlight.

use serde::Serialize;

use crate::location::{Category, Location};
use crate::map::MapSurface;
use crate::state::{AppState, LocationId};

pub const ADD_PROMPT: &str = "Add a new place !";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputBar {
    None,
    Search,
    Add,
}

#[derive(Debug, Clone)]
pub struct ViewState {
    pub input_text: String,
    pub bar: InputBar,
    pub show_mode: Category,
    pub message: Option<String>,
    pub matching: Vec<LocationId>,
    search_prompt: String,
}

impl ViewState {
    pub fn new(region: &str) -> Self {
        Self {
            input_text: String::new(),
            bar: InputBar::None,
            show_mode: Category::Builtin,
            message: None,
            matching: Vec::new(),
            search_prompt: format!("Search places in {region}"),
        }
    }

    pub fn search_prompt(&self) -> &str {
        &self.search_prompt
    }

    /// The search bar is open, holds real input and no message covers it.
    pub fn search_active(&self) -> bool {
        self.bar == InputBar::Search
            && self.input_text != self.search_prompt
            && self.message.is_none()
    }

    pub fn add_active(&self) -> bool {
        self.bar == InputBar::Add && self.input_text != ADD_PROMPT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matches {
    pub ids: Vec<LocationId>,
    /// Marker visibility, indexed like the location collection.
    pub visible: Vec<bool>,
}

pub fn derive_matches(locations: &[Location], view: &ViewState) -> Matches {
    if !view.search_active() {
        return Matches {
            ids: locations.iter().map(|location| location.id).collect(),
            visible: vec![true; locations.len()],
        };
    }

    let needle = view.input_text.trim().to_lowercase();
    let visible = locations
        .iter()
        .map(|location| {
            location.category == view.show_mode
                && (needle.is_empty() || location.name_contains(&needle))
        })
        .collect::<Vec<_>>();
    let ids = locations
        .iter()
        .zip(&visible)
        .filter(|(_, shown)| **shown)
        .map(|(location, _)| location.id)
        .collect();
    Matches { ids, visible }
}

pub fn refresh(state: &mut AppState, map: &dyn MapSurface) {
    let matches = derive_matches(&state.locations, &state.view);
    for (location, visible) in state.locations.iter().zip(&matches.visible) {
        map.set_marker_visible(location.marker, *visible);
    }
    state.view.matching = matches.ids;
    match state.view.matching.first().copied() {
        Some(first) => highlight(state, first),
        None => state
            .locations
            .iter_mut()
            .for_each(|location| location.highlighted = false),
    }
}

pub fn highlight(state: &mut AppState, id: LocationId) {
    for location in state.locations.iter_mut() {
        location.highlighted = location.id == id;
    }
}

pub fn highlighted_location(state: &AppState) -> Option<LocationId> {
    state
        .view
        .matching
        .iter()
        .copied()
        .find(|id| state.locations.get(*id).is_some_and(|l| l.highlighted))
}

/// Moves the highlight one step down the match set. No wrapping.
pub fn highlight_next(state: &mut AppState) -> bool {
    step_highlight(state, 1)
}

/// Moves the highlight one step up the match set. No wrapping.
pub fn highlight_previous(state: &mut AppState) -> bool {
    step_highlight(state, -1)
}

fn step_highlight(state: &mut AppState, step: isize) -> bool {
    let Some(current) = highlighted_location(state) else {
        return false;
    };
    let Some(position) = state.view.matching.iter().position(|id| *id == current) else {
        return false;
    };
    let target = match position.checked_add_signed(step) {
        Some(target) if target < state.view.matching.len() => state.view.matching[target],
        _ => return false,
    };
    highlight(state, target);
    true
}

pub fn close_all(state: &mut AppState, map: &dyn MapSurface) {
    for location in state.locations.iter_mut().filter(|l| l.popup_open) {
        location.popup_open = false;
        map.close_popup(location.marker);
    }
}

/// Closes every other popup and opens the one for `id`.
pub fn open_location(state: &mut AppState, map: &dyn MapSurface, id: LocationId) {
    close_all(state, map);
    if let Some(location) = state.locations.get_mut(id) {
        location.popup_open = true;
        map.open_popup(location.marker);
    }
}

/// Marker click: hides the bars, then opens or closes the popup.
pub fn toggle_location(state: &mut AppState, map: &dyn MapSurface, id: LocationId) {
    hide(state, map);
    let is_open = state.locations.get(id).is_some_and(|l| l.popup_open);
    if is_open {
        if let Some(location) = state.locations.get_mut(id) {
            location.popup_open = false;
            map.close_popup(location.marker);
        }
    } else {
        open_location(state, map, id);
    }
}

/// Opens and pans to the highlighted match. Returns `None` when nothing is
/// highlighted.
pub fn activate_highlighted(state: &mut AppState, map: &dyn MapSurface) -> Option<LocationId> {
    let id = highlighted_location(state)?;
    hide(state, map);
    open_location(state, map, id);
    if let Some(location) = state.locations.get(id) {
        map.pan_to(location.position);
    }
    Some(id)
}

/// List-item click.
pub fn select(state: &mut AppState, map: &dyn MapSurface, id: LocationId) -> Option<LocationId> {
    if !state.view.matching.contains(&id) {
        return None;
    }
    highlight(state, id);
    activate_highlighted(state, map)
}

pub fn open_search_bar(state: &mut AppState, map: &dyn MapSurface) {
    state.view.bar = InputBar::Search;
    refresh(state, map);
}

pub fn open_add_bar(state: &mut AppState, map: &dyn MapSurface) {
    state.view.bar = InputBar::Add;
    refresh(state, map);
}

pub fn hide(state: &mut AppState, map: &dyn MapSurface) {
    state.view.bar = InputBar::None;
    refresh(state, map);
}

/// Search button: closes the search bar when open, otherwise opens it with
/// the prompt in the input.
pub fn toggle_search_bar(state: &mut AppState, map: &dyn MapSurface) {
    if state.view.bar == InputBar::Search {
        hide(state, map);
    } else {
        state.view.input_text = state.view.search_prompt.clone();
        open_search_bar(state, map);
    }
}

pub fn toggle_add_bar(state: &mut AppState, map: &dyn MapSurface) {
    if state.view.bar == InputBar::Add {
        hide(state, map);
    } else {
        state.view.input_text = ADD_PROMPT.to_string();
        open_add_bar(state, map);
    }
}

pub fn set_input(state: &mut AppState, map: &dyn MapSurface, text: &str) {
    state.view.input_text = text.to_string();
    refresh(state, map);
}

/// Clicking into the input clears it and closes open popups.
pub fn clear_input(state: &mut AppState, map: &dyn MapSurface) {
    state.view.input_text.clear();
    close_all(state, map);
    refresh(state, map);
}

/// Switching category resets the query.
pub fn show_category(state: &mut AppState, map: &dyn MapSurface, category: Category) {
    if state.view.show_mode == category {
        return;
    }
    state.view.input_text.clear();
    state.view.show_mode = category;
    refresh(state, map);
}
