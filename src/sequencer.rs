use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::batch::{BatchProgress, BatchStart};
use crate::errors::{AppError, AppResult};
use crate::location::{Category, LocationBuilder};
use crate::map::MapSurface;
use crate::messages::Messenger;
use crate::pacing::BurstLimiter;
use crate::places::{PlaceRecord, PlaceResolver};
use crate::state::{AppState, LocationId, SharedState};
use crate::store::{save_user_names, KeyValueStore};
use crate::timers::ScheduledTask;

pub const INPUT_TOO_SHORT_MESSAGE: &str = "Type a location to add!";
pub const DUPLICATE_MESSAGE: &str = "Already occupied!";
pub const ADDED_MESSAGE: &str = "A new sugar cane!";

/// Drives place names through the resolver and keeps the batch counters.
#[derive(Clone)]
pub struct Sequencer {
    state: SharedState,
    map: Arc<dyn MapSurface>,
    resolver: PlaceResolver,
    builder: LocationBuilder,
    limiter: Arc<BurstLimiter>,
    store: Arc<dyn KeyValueStore>,
    messenger: Messenger,
    region: String,
    user_batch_delay: Duration,
}

pub struct SequencerParts {
    pub state: SharedState,
    pub map: Arc<dyn MapSurface>,
    pub resolver: PlaceResolver,
    pub builder: LocationBuilder,
    pub limiter: Arc<BurstLimiter>,
    pub store: Arc<dyn KeyValueStore>,
    pub messenger: Messenger,
}

impl Sequencer {
    pub fn new(parts: SequencerParts, region: impl Into<String>, user_batch_delay: Duration) -> Self {
        Self {
            state: parts.state,
            map: parts.map,
            resolver: parts.resolver,
            builder: parts.builder,
            limiter: parts.limiter,
            store: parts.store,
            messenger: parts.messenger,
            region: region.into(),
            user_batch_delay,
        }
    }

    /// The resolver query, biased towards the configured region.
    pub fn query_for(&self, name: &str) -> String {
        format!("{} {}", name.trim(), self.region)
    }

    pub fn not_found_message(&self) -> String {
        format!("Not found in {}!", self.region)
    }

    pub async fn run_builtin_batch(&self) -> BatchProgress {
        self.run_batch(Category::Builtin).await
    }

    pub async fn run_user_batch(&self) -> BatchProgress {
        self.run_batch(Category::UserAdded).await
    }

    /// Starts the persisted user batch after the configured delay. Nothing is
    /// scheduled when the stored list is empty.
    pub fn schedule_user_batch(&self) -> Option<ScheduledTask> {
        let pending = self.state.lock().user_batch.expected();
        if pending == 0 {
            return None;
        }
        let sequencer = self.clone();
        Some(ScheduledTask::after(self.user_batch_delay, async move {
            sequencer.run_user_batch().await;
        }))
    }

    /// Dispatches every name of the batch through the shared burst limiter
    /// and waits for all of them to be treated. Completion order is whatever
    /// the network gives. Only the call that starts the batch dispatches.
    async fn run_batch(&self, category: Category) -> BatchProgress {
        let names = {
            let mut state = self.state.lock();
            match state.batch_mut(category).begin() {
                BatchStart::Started => startup_names(&state, category),
                BatchStart::Empty => return state.batch(category).progress(),
                BatchStart::AlreadyStarted => {
                    debug!(category = category.as_tag(), "batch already dispatched");
                    return state.batch(category).progress();
                }
            }
        };
        info!(category = category.as_tag(), size = names.len(), "dispatching batch");

        let mut tasks = Vec::with_capacity(names.len());
        for name in names {
            self.limiter.acquire().await;
            let sequencer = self.clone();
            tasks.push(tokio::spawn(async move {
                sequencer.treat(category, name).await;
            }));
        }

        for result in join_all(tasks).await {
            if let Err(err) = result {
                warn!(?err, category = category.as_tag(), "batch task aborted");
            }
        }
        self.state.lock().batch(category).progress()
    }

    async fn treat(&self, category: Category, name: String) {
        match self.resolve_name(&name).await {
            Ok(record) => {
                self.builder.insert(record, category);
            }
            Err(err) => {
                debug!(?err, name = %name, category = category.as_tag(), "startup location not resolved");
            }
        }
        self.state.lock().batch_mut(category).record_treated();
    }

    /// Resolves `name` with the region qualifier appended. Failures carry the
    /// bare name.
    async fn resolve_name(&self, name: &str) -> AppResult<PlaceRecord> {
        self.resolver
            .resolve(&self.query_for(name))
            .await
            .map_err(|_| AppError::ResolutionFailed(name.trim().to_string()))
    }

    /// Resolves a name typed by the user and, when it is new, stores it and
    /// drops its marker on the map. The outcome is also shown as a message.
    pub async fn add_location(&self, input: &str) -> AppResult<LocationId> {
        let input = input.trim();
        if input.chars().count() <= 1 {
            self.messenger.notify(INPUT_TOO_SHORT_MESSAGE);
            return Err(AppError::InvalidInput(input.to_string()));
        }

        self.limiter.acquire().await;
        let record = match self.resolve_name(input).await {
            Ok(record) => record,
            Err(err) => {
                self.messenger.notify(&self.not_found_message());
                return Err(err);
            }
        };

        let names = {
            let mut state = self.state.lock();
            if state.has_location(&record.name) {
                drop(state);
                info!(name = %record.name, "location already on the map");
                self.messenger.notify(DUPLICATE_MESSAGE);
                return Err(AppError::DuplicateLocation(record.name));
            }
            state.user_names.push(record.name.clone());
            state.user_names.clone()
        };
        if let Err(err) = save_user_names(self.store.as_ref(), &names) {
            warn!(?err, name = %record.name, "failed to persist user locations");
        }

        let name = record.name.clone();
        let id = self.builder.insert(record, Category::UserAdded);
        if let Some(marker) = self.state.lock().location(id).map(|l| l.marker) {
            self.map.attach_marker(marker);
        }
        info!(id, name = %name, "user location added");
        self.messenger.notify(ADDED_MESSAGE);
        Ok(id)
    }
}

/// Names a startup batch dispatches. The user list only grows after
/// startup, so its batch covers the first `expected` entries.
fn startup_names(state: &AppState, category: Category) -> Vec<String> {
    let names = match category {
        Category::Builtin => &state.builtin_names,
        Category::UserAdded => &state.user_names,
    };
    let expected = state.batch(category).expected();
    names.iter().take(expected).cloned().collect()
}
