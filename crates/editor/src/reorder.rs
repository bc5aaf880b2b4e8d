use crate::edit_tracker::{EditKey, EditTracker};
use crate::navigation::Navigation;

/// Moves `items[from]` to index `to` by remove + insert.
/// Returns false, leaving `items` untouched, when either index is out of range.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= items.len() || to >= items.len() {
        return false;
    }
    if from != to {
        let item = items.remove(from);
        items.insert(to, item);
    }
    true
}

/// A row can be dragged unless it is expanded or has an open form.
pub fn can_reorder(id: &str, navigation: &Navigation, tracker: &EditTracker) -> bool {
    !navigation.is_expanded(id) && !tracker.is_editing(&EditKey::rule(id))
}

/// A local change that is shown before the service confirms it.
///
/// Holds the pre-change snapshot until the caller either commits or rolls back.
#[derive(Debug)]
#[must_use = "an optimistic edit must be committed or rolled back"]
pub struct OptimisticEdit<T: Clone> {
    snapshot: T,
}

impl<T: Clone> OptimisticEdit<T> {
    pub fn apply(state: &mut T, change: impl FnOnce(&mut T)) -> Self {
        let snapshot = state.clone();
        change(state);
        Self { snapshot }
    }

    /// Like [`apply`](Self::apply) for changes that can fail; a failed change
    /// leaves `state` as it was.
    pub fn try_apply<E>(
        state: &mut T,
        change: impl FnOnce(&mut T) -> Result<(), E>,
    ) -> Result<Self, E> {
        let snapshot = state.clone();
        match change(state) {
            Ok(()) => Ok(Self { snapshot }),
            Err(err) => {
                *state = snapshot;
                Err(err)
            }
        }
    }

    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }

    pub fn commit(self) {}

    pub fn rollback(self, state: &mut T) {
        *state = self.snapshot;
    }

    /// Commits on `Ok`, rolls back on `Err`, passing the outcome through.
    pub fn settle<R, E>(self, state: &mut T, outcome: Result<R, E>) -> Result<R, E> {
        match outcome {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(err) => {
                self.rollback(state);
                Err(err)
            }
        }
    }
}
