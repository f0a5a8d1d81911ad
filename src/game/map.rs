//! Static world geometry: roads, buildings, offices, maps, and the game
//! world that owns them.

use std::collections::HashMap;

use serde_json::Value;

use super::geom::Point2D;
use super::session::GameSession;

/// Half the width of every road, in road-units.
pub const ROAD_HALF_WIDTH: f64 = 0.4;

/// An integer grid point (road endpoints, office positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

/// An axis-aligned road segment with integer endpoints.
///
/// A road occupies the rectangle spanned by its endpoints, widened by
/// [`ROAD_HALF_WIDTH`] on every side.
#[derive(Debug, Clone, Copy)]
pub struct Road {
    start: GridPoint,
    end: GridPoint,
}

impl Road {
    pub fn horizontal(start: GridPoint, end_x: i32) -> Self {
        Self {
            start,
            end: GridPoint { x: end_x, y: start.y },
        }
    }

    pub fn vertical(start: GridPoint, end_y: i32) -> Self {
        Self {
            start,
            end: GridPoint { x: start.x, y: end_y },
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    pub fn start(&self) -> GridPoint {
        self.start
    }

    pub fn end(&self) -> GridPoint {
        self.end
    }

    pub fn start_pos(&self) -> Point2D {
        Point2D::new(self.start.x as f64, self.start.y as f64)
    }

    pub fn end_pos(&self) -> Point2D {
        Point2D::new(self.end.x as f64, self.end.y as f64)
    }

    /// The road's bounding box including the half-width margin:
    /// `(min corner, max corner)`.
    pub fn bounds(&self) -> (Point2D, Point2D) {
        let min = Point2D::new(
            self.start.x.min(self.end.x) as f64 - ROAD_HALF_WIDTH,
            self.start.y.min(self.end.y) as f64 - ROAD_HALF_WIDTH,
        );
        let max = Point2D::new(
            self.start.x.max(self.end.x) as f64 + ROAD_HALF_WIDTH,
            self.start.y.max(self.end.y) as f64 + ROAD_HALF_WIDTH,
        );
        (min, max)
    }

    pub fn contains(&self, p: Point2D) -> bool {
        let (min, max) = self.bounds();
        p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
    }
}

/// An opaque rectangle; buildings only matter to clients drawing the map.
#[derive(Debug, Clone, Copy)]
pub struct Building {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// A drop-off point that converts carried loot into score.
#[derive(Debug, Clone)]
pub struct Office {
    pub id: String,
    pub position: GridPoint,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Office {
    pub fn position_f(&self) -> Point2D {
        Point2D::new(self.position.x as f64, self.position.y as f64)
    }
}

/// An immutable map: geometry plus the per-map movement and loot settings
/// resolved from the config defaults.
#[derive(Debug, Clone)]
pub struct Map {
    pub id: String,
    pub name: String,
    pub roads: Vec<Road>,
    pub buildings: Vec<Building>,
    pub offices: Vec<Office>,
    /// Resolved dog speed in road-units per second.
    pub dog_speed: f64,
    /// Resolved bag capacity for dogs spawned on this map.
    pub bag_capacity: usize,
    /// The raw `lootTypes` config array, echoed verbatim in the map JSON.
    pub loot_types: Vec<Value>,
    /// Deposit value per loot type, extracted from `loot_types`.
    pub loot_values: Vec<u64>,
}

impl Map {
    /// Number of distinct loot types on this map.
    pub fn loot_type_count(&self) -> usize {
        self.loot_values.len()
    }

    /// Whether `p` lies on the street area (the union of road boxes).
    pub fn contains_point(&self, p: Point2D) -> bool {
        self.roads.iter().any(|road| road.contains(p))
    }
}

/// The world: every configured map plus the sessions spun up for them.
#[derive(Debug, Default)]
pub struct Game {
    pub maps: Vec<Map>,
    map_index: HashMap<String, usize>,
    pub sessions: Vec<GameSession>,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a map. Fails on a duplicate id.
    pub fn add_map(&mut self, map: Map) -> Result<(), DuplicateMap> {
        if self.map_index.contains_key(&map.id) {
            return Err(DuplicateMap(map.id));
        }
        self.map_index.insert(map.id.clone(), self.maps.len());
        self.maps.push(map);
        Ok(())
    }

    pub fn map_index(&self, id: &str) -> Option<usize> {
        self.map_index.get(id).copied()
    }

    pub fn find_map(&self, id: &str) -> Option<&Map> {
        self.map_index(id).map(|i| &self.maps[i])
    }

    /// Finds the session running `map_index`, if any.
    pub fn session_for_map(&self, map_index: usize) -> Option<usize> {
        self.sessions.iter().position(|s| s.map_index == map_index)
    }

    /// Creates a session for `map_index` and returns its index.
    pub fn create_session(&mut self, map_index: usize) -> usize {
        let type_count = self.maps[map_index].loot_type_count();
        self.sessions.push(GameSession::new(map_index, type_count));
        self.sessions.len() - 1
    }

    /// Splits the world into its immutable maps and mutable sessions so the
    /// tick pipeline can hold both at once.
    pub fn split_mut(&mut self) -> (&[Map], &mut [GameSession]) {
        (&self.maps, &mut self.sessions)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("map with id {0:?} already exists")]
pub struct DuplicateMap(pub String);
