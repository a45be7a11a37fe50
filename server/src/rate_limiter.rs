//! Per-player sliding window admission control for boosts.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub window_start: u64,
    pub count: u32,
}

#[derive(Debug)]
pub struct BoostRateLimiter {
    windows: HashMap<String, RateWindow>,
    limit: u32,
    window_ms: u64,
}

impl BoostRateLimiter {
    pub fn new(limit: u32, window_ms: u64) -> Self {
        Self {
            windows: HashMap::new(),
            limit,
            window_ms,
        }
    }

    /// Consumes one unit of the player's budget.
    ///
    /// Returns false, leaving the count untouched, once the ceiling for the
    /// current window is reached. A window restarts when `window_ms` have
    /// passed since it opened.
    pub fn try_acquire(&mut self, player_id: &str, now: u64) -> bool {
        let window = self
            .windows
            .entry(player_id.to_string())
            .or_insert(RateWindow {
                window_start: now,
                count: 0,
            });

        if now.saturating_sub(window.window_start) >= self.window_ms {
            window.window_start = now;
            window.count = 0;
        }
        if window.count >= self.limit {
            return false;
        }

        window.count += 1;
        true
    }

    pub fn window(&self, player_id: &str) -> Option<RateWindow> {
        self.windows.get(player_id).copied()
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let mut limiter = BoostRateLimiter::new(50, 1_000);
        for _ in 0..50 {
            assert!(limiter.try_acquire("p1", 0));
        }
        assert!(!limiter.try_acquire("p1", 999));
        assert_eq!(limiter.window("p1").map(|w| w.count), Some(50));
    }

    #[test]
    fn test_rejection_does_not_consume_budget() {
        let mut limiter = BoostRateLimiter::new(2, 1_000);
        assert!(limiter.try_acquire("p1", 0));
        assert!(limiter.try_acquire("p1", 10));
        for _ in 0..5 {
            assert!(!limiter.try_acquire("p1", 20));
        }
        assert_eq!(limiter.window("p1").map(|w| w.count), Some(2));
    }

    #[test]
    fn test_window_resets_after_elapsed() {
        let mut limiter = BoostRateLimiter::new(3, 1_000);
        for _ in 0..3 {
            assert!(limiter.try_acquire("p1", 100));
        }
        assert!(!limiter.try_acquire("p1", 1_099));
        assert!(limiter.try_acquire("p1", 1_100));
        assert_eq!(
            limiter.window("p1"),
            Some(RateWindow {
                window_start: 1_100,
                count: 1
            })
        );
    }

    #[test]
    fn test_players_have_independent_windows() {
        let mut limiter = BoostRateLimiter::new(1, 1_000);
        assert!(limiter.try_acquire("p1", 0));
        assert!(!limiter.try_acquire("p1", 0));
        assert!(limiter.try_acquire("p2", 0));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut limiter = BoostRateLimiter::new(1, 1_000);
        limiter.try_acquire("p1", 0);
        limiter.clear();
        assert!(limiter.is_empty());
        assert!(limiter.try_acquire("p1", 0));
    }
}
