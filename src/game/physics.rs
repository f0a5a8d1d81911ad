//! Road-constrained kinematics.
//!
//! Dogs move in a straight line until the candidate position leaves the
//! street area; they are then clamped to the furthest road boundary
//! reachable along their facing direction and flagged as stopped.

use std::collections::HashSet;
use std::time::Duration;

use super::geom::Point2D;
use super::map::{Map, Road, ROAD_HALF_WIDTH};
use super::session::{Direction, Dog};

/// The outcome of one movement step, not yet committed to the dog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextState {
    pub position: Point2D,
    pub stopped: bool,
}

/// Computes where `dog` ends up after `delta` on `map`.
///
/// If the free-motion candidate stays on the street area it is accepted
/// as-is. Otherwise the dog is clamped: starting from its current position,
/// every road containing the working point pushes it to that road's outer
/// boundary along the facing direction, until no unseen road contains the
/// point. Overlapping roads thus chain, yielding the maximum reachable
/// coordinate.
pub fn next_state(map: &Map, dog: &Dog, delta: Duration) -> NextState {
    if dog.speed.is_zero() {
        return NextState {
            position: dog.position,
            stopped: true,
        };
    }

    let dt = delta.as_secs_f64();
    let candidate = Point2D::new(
        dog.position.x + dog.speed.x * dt,
        dog.position.y + dog.speed.y * dt,
    );
    if map.contains_point(candidate) {
        return NextState {
            position: candidate,
            stopped: false,
        };
    }

    let mut position = dog.position;
    let mut seen = HashSet::new();
    while let Some(index) = containing_road(map, position, &seen) {
        seen.insert(index);
        position = clamp_to_boundary(&map.roads[index], position, dog.direction);
    }
    NextState {
        position,
        stopped: true,
    }
}

fn containing_road(map: &Map, p: Point2D, seen: &HashSet<usize>) -> Option<usize> {
    map.roads
        .iter()
        .enumerate()
        .find(|(i, road)| !seen.contains(i) && road.contains(p))
        .map(|(i, _)| i)
}

fn clamp_to_boundary(road: &Road, p: Point2D, direction: Direction) -> Point2D {
    let (start, end) = (road.start(), road.end());
    match direction {
        Direction::North => Point2D::new(p.x, start.y.min(end.y) as f64 - ROAD_HALF_WIDTH),
        Direction::South => Point2D::new(p.x, start.y.max(end.y) as f64 + ROAD_HALF_WIDTH),
        Direction::West => Point2D::new(start.x.min(end.x) as f64 - ROAD_HALF_WIDTH, p.y),
        Direction::East => Point2D::new(start.x.max(end.x) as f64 + ROAD_HALF_WIDTH, p.y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geom::Vec2D;
    use crate::game::map::GridPoint;
    use assert_approx_eq::assert_approx_eq;

    fn single_road_map() -> Map {
        Map {
            id: "m".into(),
            name: "m".into(),
            roads: vec![Road::horizontal(GridPoint { x: 0, y: 0 }, 10)],
            buildings: Vec::new(),
            offices: Vec::new(),
            dog_speed: 2.0,
            bag_capacity: 3,
            loot_types: Vec::new(),
            loot_values: Vec::new(),
        }
    }

    fn dog_at(x: f64, y: f64, direction: Direction, speed: f64) -> Dog {
        let mut dog = Dog::new(0, "Rex".into(), Point2D::new(x, y), 3);
        dog.direction = direction;
        dog.speed = direction.velocity(speed);
        dog
    }

    #[test]
    fn free_motion_inside_street_area() {
        let map = single_road_map();
        let dog = dog_at(2.0, 0.0, Direction::East, 2.0);
        let next = next_state(&map, &dog, Duration::from_secs(1));
        assert_eq!(next.position, Point2D::new(4.0, 0.0));
        assert!(!next.stopped);
    }

    #[test]
    fn clamp_at_east_wall() {
        // Dog at (9, 0) moving east at 2.0 for one second overshoots and
        // stops at the road edge x = 10.4.
        let map = single_road_map();
        let dog = dog_at(9.0, 0.0, Direction::East, 2.0);
        let next = next_state(&map, &dog, Duration::from_secs(1));
        assert_approx_eq!(next.position.x, 10.4, 1e-12);
        assert_approx_eq!(next.position.y, 0.0, 1e-12);
        assert!(next.stopped);
    }

    #[test]
    fn clamp_at_west_wall() {
        let map = single_road_map();
        let dog = dog_at(1.0, 0.0, Direction::West, 4.0);
        let next = next_state(&map, &dog, Duration::from_secs(1));
        assert_approx_eq!(next.position.x, -0.4, 1e-12);
        assert!(next.stopped);
    }

    #[test]
    fn clamp_across_the_half_width_band() {
        // Moving north off a horizontal road stops at the band edge.
        let map = single_road_map();
        let dog = dog_at(5.0, 0.0, Direction::North, 1.0);
        let next = next_state(&map, &dog, Duration::from_secs(2));
        assert_approx_eq!(next.position.y, -0.4, 1e-12);
        assert_approx_eq!(next.position.x, 5.0, 1e-12);
        assert!(next.stopped);
    }

    #[test]
    fn clamp_chains_over_overlapping_roads() {
        // Two collinear roads sharing an endpoint: the dog runs past both
        // and stops at the far edge of the second.
        let mut map = single_road_map();
        map.roads.push(Road::horizontal(GridPoint { x: 10, y: 0 }, 20));
        let dog = dog_at(9.5, 0.0, Direction::East, 100.0);
        let next = next_state(&map, &dog, Duration::from_secs(1));
        assert_approx_eq!(next.position.x, 20.4, 1e-12);
        assert!(next.stopped);
    }

    #[test]
    fn crossing_onto_a_perpendicular_road() {
        // A vertical road crossing at x = 5 lets the dog leave the first
        // road's band going south.
        let mut map = single_road_map();
        map.roads.push(Road::vertical(GridPoint { x: 5, y: 0 }, 6));
        let dog = dog_at(5.0, 0.0, Direction::South, 3.0);
        let next = next_state(&map, &dog, Duration::from_secs(1));
        assert_eq!(next.position, Point2D::new(5.0, 3.0));
        assert!(!next.stopped);
    }

    #[test]
    fn stationary_dog_reports_stopped_in_place() {
        let map = single_road_map();
        let mut dog = dog_at(5.0, 0.0, Direction::East, 1.0);
        dog.speed = Vec2D::ZERO;
        let next = next_state(&map, &dog, Duration::from_secs(10));
        assert_eq!(next.position, dog.position);
        assert!(next.stopped);
    }

    #[test]
    fn zero_delta_keeps_position() {
        let map = single_road_map();
        let dog = dog_at(5.0, 0.0, Direction::East, 1.0);
        let next = next_state(&map, &dog, Duration::ZERO);
        assert_eq!(next.position, Point2D::new(5.0, 0.0));
        assert!(!next.stopped);
    }
}
