//! Time-integrated loot spawning.
//!
//! The generator accumulates elapsed time and decides how many new objects
//! a session should receive so that the expected count converges towards
//! one object per looter, approached at `probability` per `base_interval`.

use std::time::Duration;

/// Decides spawn counts; one instance is shared by every session.
#[derive(Debug, Clone)]
pub struct LootGenerator {
    base_interval: Duration,
    probability: f64,
    unspawned_time: Duration,
}

impl LootGenerator {
    pub fn new(base_interval: Duration, probability: f64) -> Self {
        Self {
            base_interval,
            probability,
            unspawned_time: Duration::ZERO,
        }
    }

    /// Returns how many objects to spawn after `delta` has elapsed, given
    /// `loot_count` objects already present and `looter_count` dogs.
    ///
    /// The accumulated time is reduced to its residue modulo the base
    /// interval, so sub-interval ticks add up rather than being lost.
    pub fn generate(&mut self, delta: Duration, loot_count: usize, looter_count: usize) -> usize {
        if self.base_interval.is_zero() {
            return 0;
        }
        self.unspawned_time += delta;

        let ratio = self.unspawned_time.as_secs_f64() / self.base_interval.as_secs_f64();
        let expected = looter_count as f64 * (1.0 - (1.0 - self.probability).powf(ratio));
        let wanted = expected.floor() as usize;

        let whole_intervals = ratio.floor() as u32;
        self.unspawned_time = self
            .unspawned_time
            .saturating_sub(self.base_interval * whole_intervals);

        wanted.saturating_sub(loot_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn half_probability_spawns_one_for_two_dogs() {
        let mut gen = LootGenerator::new(secs(5), 0.5);
        assert_eq!(gen.generate(secs(5), 0, 2), 1);
    }

    #[test]
    fn certain_probability_spawns_one_per_dog() {
        let mut gen = LootGenerator::new(secs(5), 1.0);
        assert_eq!(gen.generate(secs(5), 0, 2), 2);
    }

    #[test]
    fn zero_probability_spawns_nothing() {
        let mut gen = LootGenerator::new(secs(5), 0.0);
        assert_eq!(gen.generate(secs(5), 0, 2), 0);
        assert_eq!(gen.generate(secs(500), 0, 10), 0);
    }

    #[test]
    fn existing_loot_is_subtracted() {
        let mut gen = LootGenerator::new(secs(5), 1.0);
        assert_eq!(gen.generate(secs(5), 2, 2), 0);
        let mut gen = LootGenerator::new(secs(5), 1.0);
        assert_eq!(gen.generate(secs(5), 5, 2), 0);
    }

    #[test]
    fn sub_interval_ticks_accumulate() {
        // Two half-interval ticks see the same total as one full interval.
        let mut split = LootGenerator::new(secs(5), 0.5);
        let first = split.generate(Duration::from_millis(2500), 0, 2);
        let second = split.generate(Duration::from_millis(2500), first, 2);
        assert_eq!(first, 0);
        assert_eq!(second, 1);

        let mut whole = LootGenerator::new(secs(5), 0.5);
        assert_eq!(whole.generate(secs(5), 0, 2), first + second);
    }

    #[test]
    fn accumulator_keeps_only_the_residue() {
        let mut gen = LootGenerator::new(secs(5), 1.0);
        assert_eq!(gen.generate(secs(12), 0, 1), 1);
        // 12s consumed two full intervals; 2s remain. Another 3s completes
        // the third interval and spawns for the (still lootless) dog.
        assert_eq!(gen.generate(secs(3), 0, 1), 1);
    }

    #[test]
    fn no_dogs_no_loot() {
        let mut gen = LootGenerator::new(secs(5), 1.0);
        assert_eq!(gen.generate(secs(5), 0, 0), 0);
    }

    #[test]
    fn zero_interval_is_inert() {
        let mut gen = LootGenerator::new(Duration::ZERO, 1.0);
        assert_eq!(gen.generate(secs(5), 0, 3), 0);
    }
}
