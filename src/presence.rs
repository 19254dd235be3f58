use crate::model::Presence;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// Last-activity map fed by client heartbeats. Ephemeral by design: presence
/// is derived state and restarts simply report everyone offline until the
/// next heartbeat.
pub struct PresenceTracker {
    last: Mutex<HashMap<Uuid, i64>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Record a heartbeat. Last-write-wins: an older timestamp than the
    /// stored one is dropped. Returns whether the heartbeat was accepted.
    pub fn heartbeat(&self, user: Uuid, at: i64) -> bool {
        let mut guard = self.last.lock();
        match guard.get(&user) {
            Some(&prev) if prev > at => false,
            _ => {
                guard.insert(user, at);
                true
            }
        }
    }

    /// Derive presence for a caller-supplied `now` and threshold. Pure reads,
    /// safe to compute on every request.
    pub fn get(&self, user: Uuid, now: i64, threshold_secs: i64) -> Presence {
        match self.last.lock().get(&user).copied() {
            None => Presence {
                is_online: false,
                last_seen: None,
            },
            Some(last) => {
                let is_online = now - last < threshold_secs;
                Presence {
                    is_online,
                    last_seen: if is_online { None } else { Some(last) },
                }
            }
        }
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
