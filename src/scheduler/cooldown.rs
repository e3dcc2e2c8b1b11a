use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Per-worker rate limit with an explicit time-to-live.
///
/// Uses tokio's clock so paused-time tests can move it.
#[derive(Debug)]
pub struct CooldownStore {
    ttl: Duration,
    stamps: HashMap<u64, Instant>,
}

impl CooldownStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            stamps: HashMap::new(),
        }
    }

    /// Time left before `key` may act again, if any.
    pub fn remaining(&self, key: u64) -> Option<Duration> {
        let stamp = self.stamps.get(&key)?;
        let elapsed = stamp.elapsed();
        if elapsed >= self.ttl {
            None
        } else {
            Some(self.ttl - elapsed)
        }
    }

    /// Starts a fresh window for `key`.
    pub fn touch(&mut self, key: u64) {
        self.stamps.insert(key, Instant::now());
    }

    /// Drops expired stamps.
    pub fn purge(&mut self) {
        let ttl = self.ttl;
        self.stamps.retain(|_, stamp| stamp.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_expires_after_ttl() {
        let mut cooldowns = CooldownStore::new(Duration::from_secs(600));
        assert!(cooldowns.remaining(1).is_none());

        cooldowns.touch(1);
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(cooldowns.remaining(1), Some(Duration::from_secs(500)));
        assert!(cooldowns.remaining(2).is_none());

        tokio::time::advance(Duration::from_secs(500)).await;
        assert!(cooldowns.remaining(1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let mut cooldowns = CooldownStore::new(Duration::from_secs(10));
        cooldowns.touch(1);
        tokio::time::advance(Duration::from_secs(6)).await;
        cooldowns.touch(2);
        tokio::time::advance(Duration::from_secs(5)).await;

        cooldowns.purge();
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns.remaining(2).is_some());
    }
}
