//! Per-memory last-played timestamps so clips do not retrigger back to back.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct CooldownLedger {
    last_played: HashMap<String, u64>,
}

impl CooldownLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `id` never played or its cooldown has fully elapsed.
    #[must_use]
    pub fn admit(&self, id: &str, now_ms: u64, cooldown_ms: u64) -> bool {
        match self.last_played.get(id) {
            None => true,
            Some(&last) => now_ms.saturating_sub(last) >= cooldown_ms,
        }
    }

    pub fn record(&mut self, id: &str, now_ms: u64) {
        self.last_played.insert(id.to_string(), now_ms);
    }

    /// Drops entries older than `max_age_ms`; returns how many were removed.
    pub fn sweep(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.last_played.len();
        self.last_played
            .retain(|_, last| now_ms.saturating_sub(*last) <= max_age_ms);
        before - self.last_played.len()
    }

    #[must_use]
    pub fn last_played(&self, id: &str) -> Option<u64> {
        self.last_played.get(id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_played.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_played.is_empty()
    }
}
