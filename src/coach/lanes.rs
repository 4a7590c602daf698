//! Per-user serialization and conversation state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::types::UserId;
use crate::session::ConversationState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One async lock per user, keyed by the channel's external id.
///
/// Holding a user's lane is what orders that user's events. Different users
/// never share a lane. The key is known before any storage access, so the
/// lane is queued for in the order events arrive. An entry lives only while
/// someone holds or waits on it.
#[derive(Default)]
pub(crate) struct UserLanes {
    lanes: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLanes {
    pub(crate) fn lane(&self, external_id: i64) -> Lane<'_> {
        let lane = Arc::clone(lock(&self.lanes).entry(external_id).or_default());
        Lane {
            lanes: self,
            external_id,
            lane,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.lanes).len()
    }
}

/// A handle on one user's lane. Dropping the last handle removes the entry.
pub(crate) struct Lane<'a> {
    lanes: &'a UserLanes,
    external_id: i64,
    lane: Arc<tokio::sync::Mutex<()>>,
}

impl Lane<'_> {
    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lane.lock().await
    }
}

impl Drop for Lane<'_> {
    fn drop(&mut self) {
        let mut lanes = lock(&self.lanes.lanes);
        // Handles are only cloned under the map lock, so the count is exact:
        // one for the map and one for this handle.
        if Arc::strong_count(&self.lane) == 2 {
            lanes.remove(&self.external_id);
        }
    }
}

/// Conversation state per user. Process-local and lost on restart.
#[derive(Default)]
pub(crate) struct ConversationStore {
    states: Mutex<HashMap<UserId, ConversationState>>,
}

impl ConversationStore {
    pub(crate) fn get(&self, user_id: UserId) -> ConversationState {
        lock(&self.states)
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn set(&self, user_id: UserId, state: ConversationState) {
        let mut states = lock(&self.states);
        if state == ConversationState::Idle {
            states.remove(&user_id);
        } else {
            states.insert(user_id, state);
        }
    }
}
