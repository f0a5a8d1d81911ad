//! Persistence: the SQL leaderboard and the world snapshot file.

pub mod records;
pub mod snapshot;

pub use records::{RecordStore, ScoreRow};
pub use snapshot::{restore_from_file, PersistenceError, StateSaver};
