use chrono::{DateTime, Duration, Utc};
use crate::expiring::ExpiringMap;

/// Cooldown gate for one notification class. Keys are kept for twice the
/// cooldown and swept on demand.
pub struct DedupeWindow {
    cooldown: Duration,
    sent: ExpiringMap<String, ()>,
}

impl DedupeWindow {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            sent: ExpiringMap::new(cooldown * 2),
        }
    }

    /// True if nothing was sent for `key` within the cooldown; the send is
    /// recorded at `now`.
    pub fn try_acquire(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(last_sent) = self.sent.inserted_at(key, now) {
            if now - last_sent < self.cooldown {
                return false;
            }
        }
        self.sent.insert(key.to_string(), (), now);
        true
    }

    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.sent.sweep(now)
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }
}
