//! Swept collection detector.
//!
//! A gatherer sweeps a circle of its width along the segment from `start`
//! to `end`; an item is collected when the closest approach of the sweep to
//! the item's position falls within the segment and inside the combined
//! radii. The same detector serves office visits and loot pickups.

use super::geom::Point2D;

/// A stationary collectible (or office) with a collection radius.
#[derive(Debug, Clone, Copy)]
pub struct Item {
    pub position: Point2D,
    pub width: f64,
}

/// A moving collector: one dog's movement over a tick.
#[derive(Debug, Clone, Copy)]
pub struct Gatherer {
    pub start: Point2D,
    pub end: Point2D,
    pub width: f64,
}

/// One detected collection, at fraction `time` of the gatherer's sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatheringEvent {
    pub item_index: usize,
    pub gatherer_index: usize,
    pub sq_distance: f64,
    pub time: f64,
}

/// Closest-approach data for a point against a directed segment.
#[derive(Debug, Clone, Copy)]
pub struct CollectionResult {
    /// Squared distance from the item to the closest point of the segment.
    pub sq_distance: f64,
    /// Fraction of the segment at which the closest approach occurs.
    pub proj_ratio: f64,
}

impl CollectionResult {
    pub fn is_collected(&self, collect_radius: f64) -> bool {
        self.proj_ratio >= 0.0
            && self.proj_ratio <= 1.0
            && self.sq_distance <= collect_radius * collect_radius
    }
}

/// Projects item `c` onto the segment `a -> b`. The segment must be
/// non-degenerate; stationary gatherers are filtered out before this runs.
pub fn try_collect_point(a: Point2D, b: Point2D, c: Point2D) -> CollectionResult {
    debug_assert!(b.x != a.x || b.y != a.y);
    let u_x = c.x - a.x;
    let u_y = c.y - a.y;
    let v_x = b.x - a.x;
    let v_y = b.y - a.y;
    let u_dot_v = u_x * v_x + u_y * v_y;
    let u_len2 = u_x * u_x + u_y * u_y;
    let v_len2 = v_x * v_x + v_y * v_y;
    CollectionResult {
        sq_distance: u_len2 - (u_dot_v * u_dot_v) / v_len2,
        proj_ratio: u_dot_v / v_len2,
    }
}

/// Tests every (gatherer, item) pair and returns the collections sorted by
/// ascending `time`. Gatherers that do not move never collect anything.
pub fn find_gather_events(gatherers: &[Gatherer], items: &[Item]) -> Vec<GatheringEvent> {
    let mut events = Vec::new();
    for (gatherer_index, gatherer) in gatherers.iter().enumerate() {
        if gatherer.start == gatherer.end {
            continue;
        }
        for (item_index, item) in items.iter().enumerate() {
            let result = try_collect_point(gatherer.start, gatherer.end, item.position);
            if result.is_collected(gatherer.width + item.width) {
                events.push(GatheringEvent {
                    item_index,
                    gatherer_index,
                    sq_distance: result.sq_distance,
                    time: result.proj_ratio,
                });
            }
        }
    }
    events.sort_by(|a, b| a.time.total_cmp(&b.time));
    events
}
