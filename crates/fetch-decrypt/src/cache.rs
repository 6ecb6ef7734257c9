use kafka_protocol::messages::TopicName;
use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

// Slot represents the resolution state of a single topic id, which may be:
// - Ready (if the channel holds Some name)
// - Pending a lookup (if the channel holds None)
// - Absent (if there is no Slot at all).
// Waiters subscribe to the channel and are woken when a name is sent,
// or observe a closed channel if the pending Slot is released.
type Slot = watch::Sender<Option<TopicName>>;

/// TopicNameCache maps topic ids to topic names. It's shared by every
/// connection of the proxy, and is populated from background Metadata
/// lookups as well as from Metadata responses observed in passing.
#[derive(Clone, Default)]
pub struct TopicNameCache {
    slots: Arc<std::sync::Mutex<HashMap<Uuid, Slot>>>,
}

impl TopicNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a resolved name for `id`, replacing any prior name.
    /// Tasks waiting on a pending lookup of `id` are woken.
    pub fn put(&self, id: Uuid, name: TopicName) {
        let mut slots = self.lock();

        match slots.entry(id) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(Some(name));
            }
            Entry::Vacant(entry) => {
                entry.insert(watch::Sender::new(Some(name)));
            }
        }
    }

    /// Returns the name of `id` only if it's already resolved. Never waits.
    pub fn peek_ready(&self, id: &Uuid) -> Option<TopicName> {
        let slots = self.lock();
        let slot = slots.get(id)?;
        let name = slot.borrow();

        name.as_ref().filter(|n| !n.as_str().is_empty()).cloned()
    }

    /// Wait up to `timeout` for the name of `id` to become available.
    /// Returns None if there's no entry for `id`, if the wait times out,
    /// or if its pending lookup was released without producing a name.
    pub async fn await_ready(&self, id: &Uuid, timeout: Duration) -> Option<TopicName> {
        let mut rx = {
            let slots = self.lock();
            slots.get(id)?.subscribe()
        };

        let name = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(name)) => name.clone().filter(|n| !n.as_str().is_empty()),
            Ok(Err(_released)) => {
                tracing::debug!(topic_id = %id, "pending topic id lookup was released");
                None
            }
            Err(_elapsed) => {
                tracing::warn!(topic_id = %id, ?timeout, "timed out waiting for topic name");
                None
            }
        };
        name
    }

    /// Mark each absent id as pending a lookup, returning the ids which were marked.
    /// Ids which are already pending or resolved are skipped, as are nil ids.
    pub fn begin_lookup<'i>(&self, ids: impl IntoIterator<Item = &'i Uuid>) -> Vec<Uuid> {
        let mut slots = self.lock();
        let mut marked = Vec::new();

        for id in ids {
            if id.is_nil() {
                continue;
            }
            if let Entry::Vacant(entry) = slots.entry(*id) {
                entry.insert(watch::Sender::new(None));
                marked.push(*id);
            }
        }
        marked
    }

    /// Release ids whose lookup has finished without resolving them,
    /// so that a later fetch may begin a new lookup.
    pub fn release_pending<'i>(&self, ids: impl IntoIterator<Item = &'i Uuid>) {
        let mut slots = self.lock();

        for id in ids {
            if let Entry::Occupied(entry) = slots.entry(*id) {
                if entry.get().borrow().is_none() {
                    entry.remove();
                }
            }
        }
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.borrow().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Acquire non-async lock which *cannot* be held across an await point.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Slot>> {
        // A panic while holding the lock cannot leave a Slot half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
