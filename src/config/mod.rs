//! Configuration: command-line flags and the JSON game config.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use serde_json::Value;

use crate::game::loot::LootGenerator;
use crate::game::map::{Building, DuplicateMap, Game, GridPoint, Map, Office, Road};

const DEFAULT_DOG_SPEED: f64 = 1.0;
const DEFAULT_BAG_CAPACITY: usize = 3;
const DEFAULT_RETIREMENT_SECS: f64 = 60.0;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "game_server", about = "Lost & Found multiplayer game server", version)]
pub struct Args {
    /// Simulation tick period in milliseconds; when omitted, time advances
    /// only through the tick endpoint
    #[arg(long = "tick-period")]
    pub tick_period: Option<u64>,

    /// Path to the JSON game config
    #[arg(long = "config-file")]
    pub config_file: PathBuf,

    /// Directory of static content to serve
    #[arg(long = "www-root")]
    pub www_root: PathBuf,

    /// Spawn dogs at random road positions instead of the first road start
    #[arg(long = "randomize-spawn-points")]
    pub randomize_spawn_points: bool,

    /// File the world is snapshotted to and restored from
    #[arg(long = "state-file")]
    pub state_file: Option<PathBuf>,

    /// Milliseconds of ticked time between periodic snapshots
    #[arg(long = "save-state-period")]
    pub save_state_period: Option<u64>,
}

/// Configuration errors; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("map {map:?}: road must set exactly one of x1/y1")]
    InvalidRoad { map: String },

    #[error("map {map:?} has no roads")]
    NoRoads { map: String },

    #[error("map {map:?}: duplicate office id {office:?}")]
    DuplicateOffice { map: String, office: String },

    #[error("map {map:?}: loot type {index} carries no integer value")]
    MissingLootValue { map: String, index: usize },

    #[error(transparent)]
    DuplicateMap(#[from] DuplicateMap),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub default_dog_speed: Option<f64>,
    pub default_bag_capacity: Option<usize>,
    pub loot_generator_config: LootGeneratorConfig,
    /// Seconds of continuous inactivity before a dog retires.
    pub dog_retirement_time: Option<f64>,
    pub maps: Vec<MapConfig>,
}

#[derive(Debug, Deserialize)]
pub struct LootGeneratorConfig {
    /// Base interval in seconds.
    pub period: f64,
    pub probability: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    pub id: String,
    pub name: String,
    pub dog_speed: Option<f64>,
    pub bag_capacity: Option<usize>,
    #[serde(default)]
    pub roads: Vec<RoadConfig>,
    #[serde(default)]
    pub buildings: Vec<BuildingConfig>,
    #[serde(default)]
    pub offices: Vec<OfficeConfig>,
    #[serde(default)]
    pub loot_types: Vec<Value>,
}

/// `{x0,y0,x1}` is horizontal, `{x0,y0,y1}` is vertical.
#[derive(Debug, Deserialize)]
pub struct RoadConfig {
    pub x0: i32,
    pub y0: i32,
    pub x1: Option<i32>,
    pub y1: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct BuildingConfig {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficeConfig {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub offset_x: i32,
    pub offset_y: i32,
}

/// The world built from a config file, ready to hand to the application.
pub struct LoadedGame {
    pub game: Game,
    pub loot_generator: LootGenerator,
    pub retirement_time: Duration,
}

pub fn load_game(path: &Path) -> Result<LoadedGame, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: GameConfig = serde_json::from_str(&raw)?;
    build_game(&config)
}

pub fn build_game(config: &GameConfig) -> Result<LoadedGame, ConfigError> {
    let default_speed = config.default_dog_speed.unwrap_or(DEFAULT_DOG_SPEED);
    let default_capacity = config.default_bag_capacity.unwrap_or(DEFAULT_BAG_CAPACITY);

    let mut game = Game::new();
    for map_config in &config.maps {
        game.add_map(build_map(map_config, default_speed, default_capacity)?)?;
    }

    Ok(LoadedGame {
        game,
        loot_generator: LootGenerator::new(
            Duration::from_secs_f64(config.loot_generator_config.period),
            config.loot_generator_config.probability,
        ),
        retirement_time: Duration::from_secs_f64(
            config.dog_retirement_time.unwrap_or(DEFAULT_RETIREMENT_SECS),
        ),
    })
}

fn build_map(
    config: &MapConfig,
    default_speed: f64,
    default_capacity: usize,
) -> Result<Map, ConfigError> {
    let mut roads = Vec::with_capacity(config.roads.len());
    for road in &config.roads {
        let start = GridPoint {
            x: road.x0,
            y: road.y0,
        };
        let road = match (road.x1, road.y1) {
            (Some(x1), None) => Road::horizontal(start, x1),
            (None, Some(y1)) => Road::vertical(start, y1),
            _ => {
                return Err(ConfigError::InvalidRoad {
                    map: config.id.clone(),
                })
            }
        };
        roads.push(road);
    }
    if roads.is_empty() {
        return Err(ConfigError::NoRoads {
            map: config.id.clone(),
        });
    }

    let buildings = config
        .buildings
        .iter()
        .map(|b| Building {
            x: b.x,
            y: b.y,
            w: b.w,
            h: b.h,
        })
        .collect();

    let mut office_ids = HashSet::new();
    let mut offices = Vec::with_capacity(config.offices.len());
    for office in &config.offices {
        if !office_ids.insert(office.id.as_str()) {
            return Err(ConfigError::DuplicateOffice {
                map: config.id.clone(),
                office: office.id.clone(),
            });
        }
        offices.push(Office {
            id: office.id.clone(),
            position: GridPoint {
                x: office.x,
                y: office.y,
            },
            offset_x: office.offset_x,
            offset_y: office.offset_y,
        });
    }

    let mut loot_values = Vec::with_capacity(config.loot_types.len());
    for (index, loot_type) in config.loot_types.iter().enumerate() {
        let value = loot_type
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| ConfigError::MissingLootValue {
                map: config.id.clone(),
                index,
            })?;
        loot_values.push(value);
    }

    Ok(Map {
        id: config.id.clone(),
        name: config.name.clone(),
        roads,
        buildings,
        offices,
        dog_speed: config.dog_speed.unwrap_or(default_speed),
        bag_capacity: config.bag_capacity.unwrap_or(default_capacity),
        loot_types: config.loot_types.clone(),
        loot_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "defaultDogSpeed": 3.0,
        "defaultBagCapacity": 3,
        "lootGeneratorConfig": { "period": 5.0, "probability": 0.5 },
        "dogRetirementTime": 15.5,
        "maps": [
            {
                "id": "town",
                "name": "Town",
                "dogSpeed": 4.0,
                "roads": [
                    { "x0": 0, "y0": 0, "x1": 40 },
                    { "x0": 40, "y0": 0, "y1": 30 }
                ],
                "buildings": [ { "x": 5, "y": 5, "w": 30, "h": 20 } ],
                "offices": [ { "id": "o0", "x": 40, "y": 30, "offsetX": 5, "offsetY": 0 } ],
                "lootTypes": [
                    { "name": "key", "file": "key.obj", "value": 10 },
                    { "name": "wallet", "file": "wallet.obj", "value": 30 }
                ]
            },
            {
                "id": "empty",
                "name": "Empty",
                "roads": [ { "x0": 0, "y0": 0, "x1": 5 } ]
            }
        ]
    }"#;

    fn parse(raw: &str) -> Result<LoadedGame, ConfigError> {
        build_game(&serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn sample_config_builds_the_world() {
        let loaded = parse(SAMPLE).unwrap();
        assert_eq!(loaded.game.maps.len(), 2);
        assert_eq!(loaded.retirement_time, Duration::from_millis(15_500));

        let town = loaded.game.find_map("town").unwrap();
        assert_eq!(town.name, "Town");
        assert_eq!(town.dog_speed, 4.0);
        assert_eq!(town.bag_capacity, 3);
        assert_eq!(town.roads.len(), 2);
        assert!(town.roads[0].is_horizontal());
        assert!(!town.roads[1].is_horizontal());
        assert_eq!(town.offices.len(), 1);
        assert_eq!(town.loot_values, vec![10, 30]);
        assert_eq!(town.loot_type_count(), 2);

        // No per-map override falls back to the top-level default.
        let empty = loaded.game.find_map("empty").unwrap();
        assert_eq!(empty.dog_speed, 3.0);
        assert_eq!(empty.loot_type_count(), 0);
    }

    #[test]
    fn road_with_both_ends_is_invalid() {
        let raw = SAMPLE.replace(
            r#"{ "x0": 0, "y0": 0, "x1": 40 }"#,
            r#"{ "x0": 0, "y0": 0, "x1": 40, "y1": 7 }"#,
        );
        assert!(matches!(parse(&raw), Err(ConfigError::InvalidRoad { .. })));
    }

    #[test]
    fn map_without_roads_is_invalid() {
        let raw = SAMPLE.replace(
            r#""roads": [ { "x0": 0, "y0": 0, "x1": 5 } ]"#,
            r#""roads": []"#,
        );
        assert!(matches!(parse(&raw), Err(ConfigError::NoRoads { .. })));
    }

    #[test]
    fn loot_type_without_value_is_invalid() {
        let raw = SAMPLE.replace(r#", "value": 30 "#, " ");
        assert!(matches!(
            parse(&raw),
            Err(ConfigError::MissingLootValue { index: 1, .. })
        ));
    }

    #[test]
    fn duplicate_office_is_invalid() {
        let raw = SAMPLE.replace(
            r#"[ { "id": "o0", "x": 40, "y": 30, "offsetX": 5, "offsetY": 0 } ]"#,
            r#"[ { "id": "o0", "x": 40, "y": 30, "offsetX": 5, "offsetY": 0 },
                { "id": "o0", "x": 0, "y": 0, "offsetX": 1, "offsetY": 1 } ]"#,
        );
        assert!(matches!(
            parse(&raw),
            Err(ConfigError::DuplicateOffice { .. })
        ));
    }

    #[test]
    fn duplicate_map_is_invalid() {
        let raw = SAMPLE.replace(r#""id": "empty""#, r#""id": "town""#);
        assert!(matches!(parse(&raw), Err(ConfigError::DuplicateMap(_))));
    }

    #[test]
    fn retirement_time_defaults_to_a_minute() {
        let raw = SAMPLE.replace(r#""dogRetirementTime": 15.5,"#, "");
        let loaded = parse(&raw).unwrap();
        assert_eq!(loaded.retirement_time, Duration::from_secs(60));
    }
}
