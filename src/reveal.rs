use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::batch::wait_until_complete;
use crate::location::Category;
use crate::map::MapSurface;
use crate::messages::Messenger;
use crate::search;
use crate::state::{AppState, SharedState};

pub const BUILTIN_REVEAL_MESSAGE: &str = "My gorillas!";
pub const USER_REVEAL_MESSAGE: &str = "And your sugar canes!";

/// Puts markers on the map once their batch has been fully treated.
#[derive(Clone)]
pub struct RevealController {
    state: SharedState,
    map: Arc<dyn MapSurface>,
    messenger: Messenger,
    duration: Duration,
}

impl RevealController {
    pub fn new(
        state: SharedState,
        map: Arc<dyn MapSurface>,
        messenger: Messenger,
        duration: Duration,
    ) -> Self {
        Self {
            state,
            map,
            messenger,
            duration,
        }
    }

    /// Runs the whole reveal: built-in places first, then the stored user
    /// places when there were any at startup.
    pub async fn run(&self) {
        let (builtin_phase, user_phase) = {
            let state = self.state.lock();
            let user_phase =
                (state.user_batch.expected() > 0).then(|| state.user_batch.subscribe());
            (state.builtin_batch.subscribe(), user_phase)
        };

        wait_until_complete(builtin_phase).await;
        let shown = {
            let mut state = self.state.lock();
            state.ready = true;
            let shown = self.attach(&state, Category::Builtin);
            search::open_search_bar(&mut state, self.map.as_ref());
            shown
        };
        info!(markers = shown, "map ready");
        self.messenger.flash(BUILTIN_REVEAL_MESSAGE, self.duration).await;
        self.hide_bars();

        let Some(user_phase) = user_phase else {
            return;
        };
        wait_until_complete(user_phase).await;
        let shown = {
            let mut state = self.state.lock();
            let shown = self.attach(&state, Category::UserAdded);
            search::open_add_bar(&mut state, self.map.as_ref());
            shown
        };
        info!(markers = shown, "user locations revealed");
        self.messenger.flash(USER_REVEAL_MESSAGE, self.duration).await;
        self.hide_bars();
    }

    fn attach(&self, state: &AppState, category: Category) -> usize {
        let mut shown = 0;
        for location in state.locations.iter().filter(|l| l.category == category) {
            self.map.attach_marker(location.marker);
            shown += 1;
        }
        shown
    }

    fn hide_bars(&self) {
        let mut state = self.state.lock();
        search::hide(&mut state, self.map.as_ref());
    }
}
