use std::sync::Arc;

use parking_lot::Mutex;

use crate::batch::BatchTracker;
use crate::location::{Category, Location};
use crate::search::ViewState;

/// Index into `AppState::locations`.
pub type LocationId = usize;

pub type SharedState = Arc<Mutex<AppState>>;

/// Everything the engine mutates. Components receive it through their
/// constructors; the lock is never held across an await point.
pub struct AppState {
    pub builtin_names: Vec<String>,
    pub user_names: Vec<String>,
    pub locations: Vec<Location>,
    pub builtin_batch: BatchTracker,
    pub user_batch: BatchTracker,
    pub ready: bool,
    pub view: ViewState,
}

impl AppState {
    pub fn new(builtin_names: Vec<String>, user_names: Vec<String>, region: &str) -> Self {
        let builtin_batch = BatchTracker::new(Category::Builtin, builtin_names.len());
        let user_batch = BatchTracker::new(Category::UserAdded, user_names.len());
        Self {
            builtin_names,
            user_names,
            locations: Vec::new(),
            builtin_batch,
            user_batch,
            ready: false,
            view: ViewState::new(region),
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin_names.iter().any(|known| known == name)
    }

    /// Whether `name` is already a built-in or a stored user name.
    pub fn has_location(&self, name: &str) -> bool {
        self.is_builtin(name) || self.user_names.iter().any(|known| known == name)
    }

    pub fn batch(&self, category: Category) -> &BatchTracker {
        match category {
            Category::Builtin => &self.builtin_batch,
            Category::UserAdded => &self.user_batch,
        }
    }

    pub fn batch_mut(&mut self, category: Category) -> &mut BatchTracker {
        match category {
            Category::Builtin => &mut self.builtin_batch,
            Category::UserAdded => &mut self.user_batch,
        }
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(id)
    }
}
