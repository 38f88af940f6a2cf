use serde::{Deserialize, Serialize};

/// Handle returned by a `subscribe` call; pass it back to unsubscribe.
///
/// Dropping it does nothing: a callback that is never unsubscribed stays
/// registered for the lifetime of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Registration-ordered list of observers with stable ids.
pub(crate) struct ObserverList<T> {
    next_id: u64,
    entries: Vec<(SubscriptionId, T)>,
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

impl<T> ObserverList<T> {
    pub(crate) fn add(&mut self, entry: T) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, entry));
        id
    }

    /// Removes the entry immediately; returns `false` for unknown ids.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(ix) => {
                self.entries.remove(ix);
                true
            }
            None => false,
        }
    }

    pub(crate) fn get_mut(&mut self, id: SubscriptionId) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, entry)| entry)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, entry)| entry)
    }
}
