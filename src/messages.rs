use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::map::MapSurface;
use crate::search;
use crate::state::SharedState;
use crate::timers::ScheduledTask;

/// Transient messages shown in place of the input bar.
///
/// A newer message replaces an older one; only the newest message's expiry
/// clears the area.
#[derive(Clone)]
pub struct Messenger {
    state: SharedState,
    map: Arc<dyn MapSurface>,
    default_duration: Duration,
    generation: Arc<AtomicU64>,
}

impl Messenger {
    pub fn new(state: SharedState, map: Arc<dyn MapSurface>, default_duration: Duration) -> Self {
        Self {
            state,
            map,
            default_duration,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shows `text` for the default duration without waiting for it. The
    /// expiry runs detached.
    pub fn notify(&self, text: &str) {
        drop(self.show_for(text, self.default_duration));
    }

    /// Shows `text` and returns once it has been taken down.
    pub async fn flash(&self, text: &str, duration: Duration) {
        self.show_for(text, duration).wait().await;
    }

    fn show_for(&self, text: &str, duration: Duration) -> ScheduledTask {
        let generation = self.show(text);
        let messenger = self.clone();
        ScheduledTask::after(duration, async move {
            messenger.expire(generation);
        })
    }

    fn show(&self, text: &str) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        state.view.message = Some(text.to_string());
        search::refresh(&mut state, self.map.as_ref());
        info!(target: "messages", text, "message shown");
        generation
    }

    fn expire(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let mut state = self.state.lock();
        state.view.message = None;
        state.view.input_text.clear();
        search::refresh(&mut state, self.map.as_ref());
    }
}
