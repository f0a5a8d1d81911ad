//! Mutable per-session state: dogs, their bags, and the loot scattered on
//! the roads.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::geom::{Point2D, Vec2D};
use super::map::Map;

/// Facing direction of a dog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    /// Wire form: `"U"`, `"D"`, `"L"`, `"R"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "U",
            Direction::South => "D",
            Direction::West => "L",
            Direction::East => "R",
        }
    }

    pub fn from_str(s: &str) -> Option<Direction> {
        match s {
            "U" => Some(Direction::North),
            "D" => Some(Direction::South),
            "L" => Some(Direction::West),
            "R" => Some(Direction::East),
            _ => None,
        }
    }

    /// Velocity of a dog facing this way at `speed` units per second.
    /// North is negative y.
    pub fn velocity(self, speed: f64) -> Vec2D {
        match self {
            Direction::North => Vec2D::new(0.0, -speed),
            Direction::South => Vec2D::new(0.0, speed),
            Direction::West => Vec2D::new(-speed, 0.0),
            Direction::East => Vec2D::new(speed, 0.0),
        }
    }
}

/// One carried item: the lost object's session-local ordinal at pickup time
/// and its type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagItem {
    pub id: usize,
    #[serde(rename = "type")]
    pub type_index: usize,
}

/// A player-controlled avatar.
#[derive(Debug, Clone)]
pub struct Dog {
    pub id: u64,
    pub name: String,
    pub position: Point2D,
    pub speed: Vec2D,
    pub direction: Direction,
    bag: Vec<Option<BagItem>>,
}

impl Dog {
    pub fn new(id: u64, name: String, position: Point2D, bag_capacity: usize) -> Self {
        Self {
            id,
            name,
            position,
            speed: Vec2D::ZERO,
            direction: Direction::North,
            bag: vec![None; bag_capacity],
        }
    }

    pub fn bag_capacity(&self) -> usize {
        self.bag.len()
    }

    /// The occupied bag slots, in slot order.
    pub fn bag_items(&self) -> Vec<BagItem> {
        self.bag.iter().filter_map(|slot| *slot).collect()
    }

    /// Puts `item` into the first empty slot. Returns false when the bag is
    /// full.
    pub fn add_item(&mut self, item: BagItem) -> bool {
        match self.bag.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(item);
                true
            }
            None => false,
        }
    }

    /// Empties the bag and returns how many items it held.
    pub fn clear_bag(&mut self) -> usize {
        let count = self.bag.iter().filter(|slot| slot.is_some()).count();
        self.bag.iter_mut().for_each(|slot| *slot = None);
        count
    }
}

/// A collectible lying on the road network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LostObject {
    #[serde(rename = "type")]
    pub type_index: usize,
    pub position: Point2D,
}

/// The live state bound to one map: its dogs and its loot.
#[derive(Debug, Default)]
pub struct GameSession {
    pub map_index: usize,
    /// Number of loot types the session was created with; lost-object and
    /// bag-item type indices stay below this.
    pub type_count: usize,
    pub dogs: Vec<Dog>,
    pub lost_objects: Vec<LostObject>,
    next_dog_id: u64,
}

impl GameSession {
    pub fn new(map_index: usize, type_count: usize) -> Self {
        Self {
            map_index,
            type_count,
            dogs: Vec::new(),
            lost_objects: Vec::new(),
            next_dog_id: 0,
        }
    }

    /// Spawns a dog and returns its id. Ids are dense and never reused, even
    /// after retirement removes earlier dogs.
    pub fn create_dog(&mut self, name: &str, position: Point2D, bag_capacity: usize) -> u64 {
        let id = self.next_dog_id;
        self.next_dog_id += 1;
        self.dogs.push(Dog::new(id, name.to_string(), position, bag_capacity));
        id
    }

    /// Re-creates a dog from a snapshot, keeping the id counter ahead of it.
    pub fn restore_dog(&mut self, dog: Dog) {
        self.next_dog_id = self.next_dog_id.max(dog.id + 1);
        self.dogs.push(dog);
    }

    pub fn dog(&self, id: u64) -> Option<&Dog> {
        self.dogs.iter().find(|d| d.id == id)
    }

    pub fn dog_mut(&mut self, id: u64) -> Option<&mut Dog> {
        self.dogs.iter_mut().find(|d| d.id == id)
    }

    pub fn remove_dog(&mut self, id: u64) {
        self.dogs.retain(|d| d.id != id);
    }

    /// Drops the lost objects picked up this tick. Indices are removed in
    /// descending order so earlier removals don't shift later ones.
    pub fn remove_lost_objects(&mut self, taken: &BTreeSet<usize>) {
        for &index in taken.iter().rev() {
            self.lost_objects.remove(index);
        }
    }

    /// Scatters `count` new objects with uniformly random types and road
    /// positions. A map without loot types never generates anything.
    pub fn spawn_lost_objects(&mut self, count: usize, map: &Map, rng: &mut ChaCha8Rng) {
        if self.type_count == 0 {
            return;
        }
        for _ in 0..count {
            self.lost_objects.push(LostObject {
                type_index: rng.gen_range(0..self.type_count),
                position: random_road_position(map, rng),
            });
        }
    }
}

/// A uniformly random point on the centerline of a uniformly chosen road.
pub fn random_road_position(map: &Map, rng: &mut ChaCha8Rng) -> Point2D {
    let road = &map.roads[rng.gen_range(0..map.roads.len())];
    let start = road.start_pos();
    let end = road.end_pos();
    if road.is_horizontal() {
        let (lo, hi) = (start.x.min(end.x), start.x.max(end.x));
        Point2D::new(if lo == hi { lo } else { rng.gen_range(lo..=hi) }, start.y)
    } else {
        let (lo, hi) = (start.y.min(end.y), start.y.max(end.y));
        Point2D::new(start.x, if lo == hi { lo } else { rng.gen_range(lo..=hi) })
    }
}
