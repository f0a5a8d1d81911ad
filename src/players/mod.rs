//! Player registry: bearer tokens, scores, and activity accounting.

use std::collections::HashMap;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Length of an auth token: two 64-bit draws as zero-padded hex.
pub const TOKEN_LEN: usize = 32;

/// Per-player state. The dog itself is owned by the session; the player
/// keeps the (session, dog id) back-reference.
#[derive(Debug, Clone)]
pub struct Player {
    pub session: usize,
    pub dog_id: u64,
    pub score: u64,
    /// Time the dog has existed and moved (plus folded-in stop stretches
    /// that ended in movement).
    pub live_time: Duration,
    /// Current uninterrupted stopped time.
    pub stop_time: Duration,
}

impl Player {
    pub fn new(session: usize, dog_id: u64) -> Self {
        Self {
            session,
            dog_id,
            score: 0,
            live_time: Duration::ZERO,
            stop_time: Duration::ZERO,
        }
    }

    /// Called when a stopped dog starts moving again: the stretch it stood
    /// still still counts as play time.
    pub fn fold_stop_into_live(&mut self) {
        self.live_time += self.stop_time;
        self.stop_time = Duration::ZERO;
    }
}

/// Data handed to the leaderboard when a player retires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetiredPlayer {
    pub name: String,
    pub score: u64,
    pub play_time: Duration,
}

#[derive(Debug, thiserror::Error)]
#[error("token already registered")]
pub struct TokenTaken;

/// The token-keyed registry. Token generation uses two independent RNG
/// streams, each seeded from OS entropy once per process.
pub struct Players {
    by_token: HashMap<String, Player>,
    token_rng_hi: ChaCha8Rng,
    token_rng_lo: ChaCha8Rng,
}

impl Players {
    pub fn new() -> Self {
        Self {
            by_token: HashMap::new(),
            token_rng_hi: ChaCha8Rng::from_entropy(),
            token_rng_lo: ChaCha8Rng::from_entropy(),
        }
    }

    /// Deterministic token stream for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            by_token: HashMap::new(),
            token_rng_hi: ChaCha8Rng::seed_from_u64(seed),
            token_rng_lo: ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
        }
    }

    /// Registers a fresh player and returns its token.
    pub fn add(&mut self, session: usize, dog_id: u64) -> String {
        let token = loop {
            let candidate = self.generate_token();
            if !self.by_token.contains_key(&candidate) {
                break candidate;
            }
        };
        self.by_token.insert(token.clone(), Player::new(session, dog_id));
        token
    }

    /// Inserts a player under a known token (snapshot restore). Re-inserting
    /// an existing token is rejected.
    pub fn insert(&mut self, token: String, player: Player) -> Result<(), TokenTaken> {
        if self.by_token.contains_key(&token) {
            return Err(TokenTaken);
        }
        self.by_token.insert(token, player);
        Ok(())
    }

    pub fn find(&self, token: &str) -> Option<&Player> {
        self.by_token.get(token)
    }

    pub fn find_mut(&mut self, token: &str) -> Option<&mut Player> {
        self.by_token.get_mut(token)
    }

    pub fn remove(&mut self, token: &str) -> Option<Player> {
        self.by_token.remove(token)
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Player)> {
        self.by_token.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Player)> {
        self.by_token.iter_mut()
    }

    fn generate_token(&mut self) -> String {
        format!(
            "{:016x}{:016x}",
            self.token_rng_hi.gen::<u64>(),
            self.token_rng_lo.gen::<u64>()
        )
    }
}

impl Default for Players {
    fn default() -> Self {
        Self::new()
    }
}
