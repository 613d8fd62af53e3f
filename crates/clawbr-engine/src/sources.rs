//! Time and randomness sources
//!
//! Both are injected so tests and simulations can pin them down.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt::Debug;

/// Source of the current time
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Coin flip deciding side assignment for a new match.
///
/// `true` puts the higher seed on PRO.
pub trait CoinFlip: Send + Sync + Debug {
    fn flip(&self) -> bool;
}

/// Uniform random coin
#[derive(Debug)]
pub struct RandomCoin {
    rng: Mutex<StdRng>,
}

impl RandomCoin {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reproducible sequence of flips
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomCoin {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinFlip for RandomCoin {
    fn flip(&self) -> bool {
        self.rng.lock().random_bool(0.5)
    }
}

/// Always lands the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedCoin(pub bool);

impl CoinFlip for FixedCoin {
    fn flip(&self) -> bool {
        self.0
    }
}

/// Plays back a script, then falls back to a fixed value
#[derive(Debug)]
pub struct ScriptedCoin {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
}

impl ScriptedCoin {
    pub fn new(script: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl CoinFlip for ScriptedCoin {
    fn flip(&self) -> bool {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(13));
        assert_eq!(clock.now(), start + Duration::hours(13));
    }

    #[test]
    fn test_scripted_coin_then_fallback() {
        let coin = ScriptedCoin::new([false, true], true);
        assert!(!coin.flip());
        assert!(coin.flip());
        assert_eq!(coin.remaining(), 0);
        assert!(coin.flip());
    }

    #[test]
    fn test_seeded_coin_is_reproducible() {
        let a = RandomCoin::seeded(7);
        let b = RandomCoin::seeded(7);
        let left: Vec<bool> = (0..32).map(|_| a.flip()).collect();
        let right: Vec<bool> = (0..32).map(|_| b.flip()).collect();
        assert_eq!(left, right);
        assert!(left.iter().any(|&x| x) && left.iter().any(|&x| !x));
    }
}
