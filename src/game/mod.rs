//! Game simulation modules: static geometry, per-session state, and the
//! pure pieces of the tick pipeline (kinematics, collection, loot).

pub mod collision;
pub mod geom;
pub mod loot;
pub mod map;
pub mod physics;
pub mod session;

pub use geom::{Point2D, Vec2D};
pub use map::{Game, GridPoint, Map, Office, Road, ROAD_HALF_WIDTH};
pub use session::{BagItem, Direction, Dog, GameSession, LostObject};
