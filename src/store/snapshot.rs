//! Crash-consistent snapshots of the live world.
//!
//! The archive is versioned JSON written to a temp file, fsynced, then
//! renamed over the live state file; a torn temp file from a crash can
//! never shadow a good snapshot. Restore refuses anything that disagrees
//! with the loaded config.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::application::{restore_player, Application};
use crate::game::{BagItem, Direction, Dog, LostObject, Point2D, Vec2D};

/// Bumped whenever the archive layout changes; older files are rejected,
/// never migrated.
pub const STATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("state file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not a valid archive: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {found} (expected {STATE_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("snapshot references unknown map {0:?}")]
    UnknownMap(String),
    #[error("snapshot loot type count disagrees with config for map {0:?}")]
    TypeCountMismatch(String),
    #[error("snapshot lost object is invalid on map {0:?}")]
    InvalidLostObject(String),
    #[error("snapshot dog {dog} has bag capacity {found}, map {map:?} uses {expected}")]
    BagCapacityMismatch {
        map: String,
        dog: u64,
        found: usize,
        expected: usize,
    },
    #[error("snapshot dog {dog} is off the road network of map {map:?}")]
    OffRoadDog { map: String, dog: u64 },
    #[error("snapshot dog {dog} carries an invalid bag on map {map:?}")]
    InvalidBag { map: String, dog: u64 },
    #[error("snapshot dog {0} has no player entry")]
    MissingPlayer(u64),
    #[error("snapshot session for map {0:?} pairs {1} dogs with {2} players")]
    PlayerCountMismatch(String, usize, usize),
    #[error("snapshot contains a duplicate token")]
    DuplicateToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateArchive {
    pub version: u32,
    pub sessions: Vec<SessionArchive>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArchive {
    pub map_id: String,
    pub type_count: usize,
    pub lost_objects: Vec<LostObject>,
    pub dogs: Vec<DogArchive>,
    pub players: BTreeMap<u64, PlayerArchive>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DogArchive {
    pub id: u64,
    pub name: String,
    pub position: Point2D,
    pub bag_capacity: usize,
    pub speed: Vec2D,
    pub direction: Direction,
    pub bag: Vec<BagItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerArchive {
    pub score: u64,
    pub token: String,
}

/// Serializes every live session.
pub fn capture(app: &Application) -> StateArchive {
    let game = app.game();
    let players = app.players();
    let sessions = game
        .sessions
        .iter()
        .enumerate()
        .map(|(session_index, session)| {
            let mut archived_players = BTreeMap::new();
            for (token, player) in players.iter() {
                if player.session == session_index {
                    archived_players.insert(
                        player.dog_id,
                        PlayerArchive {
                            score: player.score,
                            token: token.clone(),
                        },
                    );
                }
            }
            SessionArchive {
                map_id: game.maps[session.map_index].id.clone(),
                type_count: session.type_count,
                lost_objects: session.lost_objects.clone(),
                dogs: session
                    .dogs
                    .iter()
                    .map(|dog| DogArchive {
                        id: dog.id,
                        name: dog.name.clone(),
                        position: dog.position,
                        bag_capacity: dog.bag_capacity(),
                        speed: dog.speed,
                        direction: dog.direction,
                        bag: dog.bag_items(),
                    })
                    .collect(),
                players: archived_players,
            }
        })
        .collect();
    StateArchive {
        version: STATE_FORMAT_VERSION,
        sessions,
    }
}

/// Rebuilds sessions, dogs, and players from `archive` into a freshly
/// configured application. Every cross-check against the live config must
/// pass; a failed restore leaves startup aborted.
pub fn restore(app: &mut Application, archive: StateArchive) -> Result<(), PersistenceError> {
    if archive.version != STATE_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: archive.version,
        });
    }

    for session_archive in &archive.sessions {
        validate_session(app, session_archive)?;

        let map_index = app
            .game()
            .map_index(&session_archive.map_id)
            .expect("validated map id");
        let session_index = app.game_mut().create_session(map_index);

        {
            let session = &mut app.game_mut().sessions[session_index];
            session.lost_objects = session_archive.lost_objects.clone();
            for dog_archive in &session_archive.dogs {
                let mut dog = Dog::new(
                    dog_archive.id,
                    dog_archive.name.clone(),
                    dog_archive.position,
                    dog_archive.bag_capacity,
                );
                dog.speed = dog_archive.speed;
                dog.direction = dog_archive.direction;
                for item in &dog_archive.bag {
                    dog.add_item(*item);
                }
                session.restore_dog(dog);
            }
        }

        for dog_archive in &session_archive.dogs {
            let player = &session_archive.players[&dog_archive.id];
            restore_player(
                app.players_mut(),
                player.token.clone(),
                session_index,
                dog_archive.id,
                player.score,
            )
            .map_err(|_| PersistenceError::DuplicateToken)?;
        }
    }
    Ok(())
}

fn validate_session(
    app: &Application,
    session: &SessionArchive,
) -> Result<(), PersistenceError> {
    let map = app
        .find_map(&session.map_id)
        .ok_or_else(|| PersistenceError::UnknownMap(session.map_id.clone()))?;

    if map.loot_type_count() != session.type_count {
        return Err(PersistenceError::TypeCountMismatch(session.map_id.clone()));
    }
    for object in &session.lost_objects {
        if object.type_index >= session.type_count || !map.contains_point(object.position) {
            return Err(PersistenceError::InvalidLostObject(session.map_id.clone()));
        }
    }
    if session.players.len() != session.dogs.len() {
        return Err(PersistenceError::PlayerCountMismatch(
            session.map_id.clone(),
            session.dogs.len(),
            session.players.len(),
        ));
    }
    for dog in &session.dogs {
        if dog.bag_capacity != map.bag_capacity {
            return Err(PersistenceError::BagCapacityMismatch {
                map: session.map_id.clone(),
                dog: dog.id,
                found: dog.bag_capacity,
                expected: map.bag_capacity,
            });
        }
        if !map.contains_point(dog.position) {
            return Err(PersistenceError::OffRoadDog {
                map: session.map_id.clone(),
                dog: dog.id,
            });
        }
        if dog.bag.len() > dog.bag_capacity
            || dog.bag.iter().any(|item| item.type_index >= session.type_count)
        {
            return Err(PersistenceError::InvalidBag {
                map: session.map_id.clone(),
                dog: dog.id,
            });
        }
        if !session.players.contains_key(&dog.id) {
            return Err(PersistenceError::MissingPlayer(dog.id));
        }
    }
    Ok(())
}

/// Loads the state file if it exists; its absence is a clean first start.
pub fn restore_from_file(app: &mut Application, path: &Path) -> Result<(), PersistenceError> {
    if !path.exists() {
        return Ok(());
    }
    let data = fs::read_to_string(path)?;
    let archive: StateArchive = serde_json::from_str(&data)?;
    restore(app, archive)?;
    info!(path = %path.display(), "server state restored");
    Ok(())
}

/// Writes snapshots, periodically from the tick signal and explicitly on
/// shutdown.
pub struct StateSaver {
    state_path: PathBuf,
    tmp_path: PathBuf,
    save_period: Option<Duration>,
    since_save: Duration,
}

impl StateSaver {
    pub fn new(state_path: PathBuf, save_period_ms: Option<u64>) -> Self {
        let tmp_path = PathBuf::from(format!("{}_tmp.state", state_path.display()));
        Self {
            state_path,
            tmp_path,
            save_period: save_period_ms.map(Duration::from_millis),
            since_save: Duration::ZERO,
        }
    }

    /// Accumulates ticked time and saves once it exceeds the configured
    /// period. Failures are logged and retried on the next tick.
    pub fn save_on_tick(&mut self, app: &Application, delta: Duration) {
        let Some(period) = self.save_period else {
            return;
        };
        self.since_save += delta;
        if self.since_save > period {
            match self.save(app) {
                Ok(()) => self.since_save = Duration::ZERO,
                Err(err) => warn!(error = %err, "periodic state save failed"),
            }
        }
    }

    /// Atomic save: temp file, fsync, rename.
    pub fn save(&self, app: &Application) -> Result<(), PersistenceError> {
        let archive = capture(app);
        let data = serde_json::to_vec_pretty(&archive)?;
        let mut file = File::create(&self.tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&self.tmp_path, &self.state_path)?;
        Ok(())
    }
}
