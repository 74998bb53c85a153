use crate::error::OverflowError;
use crate::Activity;
use std::sync::Arc;

/// The observers of one event loop, kept in registration order.
///
/// Optimized for firing and adding while being slow on removal.
/// Firing hands out a snapshot so that callbacks are free to
/// register or unregister observers while they run.
#[derive(Debug)]
pub(crate) struct Observers<T> {
    entries: Vec<Entry<T>>,
    next_token: usize,
}

impl<T> Observers<T> {
    pub(crate) const fn new() -> Self {
        /// The first token is 1 and not 0 so that
        /// we can have an "invalid" token that never matches anything.
        const FIRST_TOKEN: usize = 1;
        Self {
            entries: Vec::new(),
            next_token: FIRST_TOKEN,
        }
    }

    pub(crate) fn add(
        &mut self,
        activities: Activity,
        value: T,
    ) -> Result<ObserverToken, OverflowError> {
        let token = self.next_token;
        self.next_token = self.next_token.checked_add(1).ok_or(OverflowError)?;
        self.entries.push(Entry {
            token,
            activities,
            value: Arc::new(value),
        });
        Ok(ObserverToken(token))
    }

    pub(crate) fn remove(&mut self, token: ObserverToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.token != token.0);
        self.entries.len() != before
    }

    /// Every observer interested in `activity`, in registration order.
    pub(crate) fn matching(&self, activity: Activity) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter(|e| e.activities.intersects(activity))
            .map(|e| Arc::clone(&e.value))
            .collect()
    }

    /// Tests if `value` (as handed out by [`Observers::matching`]) is still registered.
    pub(crate) fn contains(&self, value: &Arc<T>) -> bool {
        self.entries.iter().any(|e| Arc::ptr_eq(&e.value, value))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Identifies an observer registered with an [`EventLoop`](crate::EventLoop).
/// Passing it to [`RunLoop::remove_observer`](crate::RunLoop::remove_observer)
/// unregisters the observer.
#[derive(Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct ObserverToken(usize);

#[derive(Debug)]
struct Entry<T> {
    token: usize,
    activities: Activity,
    value: Arc<T>,
}
