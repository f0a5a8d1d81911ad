//! The application core: everything that mutates the world runs through
//! here, serialized by the strand in [`crate::app::AppState`].

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::game::collision::{self, Gatherer, Item};
use crate::game::loot::LootGenerator;
use crate::game::physics;
use crate::game::session::random_road_position;
use crate::game::{BagItem, Direction, Game, GameSession, LostObject, Map, Point2D, Vec2D};
use crate::players::{Player, Players, RetiredPlayer};
use crate::store::records::{RecordStore, ScoreRow};

/// Sweep radius of a moving dog.
const GATHERER_WIDTH: f64 = 0.6;
/// Collection radius of an office.
const OFFICE_WIDTH: f64 = 0.5;
/// Lost objects are points.
const LOOT_WIDTH: f64 = 0.0;

/// Errors surfaced by application operations; the HTTP layer maps them to
/// wire codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("user name is empty")]
    EmptyName,
    #[error("map not found")]
    UnknownMap,
    #[error("no player with this token")]
    UnknownToken,
    #[error("failed to parse direction")]
    InvalidDirection,
    #[error("time delta must be non-negative")]
    InvalidTime,
    #[error("invalid start value")]
    InvalidStart,
    #[error("invalid maxItems value")]
    InvalidMaxItems,
    #[error("records database is not configured")]
    NoDatabase,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Startup switches that change application behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppOptions {
    pub randomize_spawn_points: bool,
    /// When the wall clock drives ticks, the test tick endpoint is refused.
    pub auto_tick_enabled: bool,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub token: String,
    pub player_id: u64,
}

/// One dog's slice of the game-state view.
#[derive(Debug, Clone)]
pub struct DogState {
    pub id: u64,
    pub position: Point2D,
    pub speed: Vec2D,
    pub direction: Direction,
    pub bag: Vec<BagItem>,
    pub score: u64,
}

/// The session view returned to an authorized player.
#[derive(Debug, Clone)]
pub struct StateView {
    pub dogs: Vec<DogState>,
    pub lost_objects: Vec<LostObject>,
}

/// The authoritative game application.
pub struct Application {
    game: Game,
    players: Players,
    loot_generator: LootGenerator,
    retirement_time: Duration,
    options: AppOptions,
    world_rng: ChaCha8Rng,
    records: Option<RecordStore>,
    tick_tx: broadcast::Sender<Duration>,
}

impl Application {
    pub fn new(
        game: Game,
        loot_generator: LootGenerator,
        retirement_time: Duration,
        options: AppOptions,
        records: Option<RecordStore>,
    ) -> Self {
        Self::with_rngs(
            game,
            loot_generator,
            retirement_time,
            options,
            records,
            ChaCha8Rng::from_entropy(),
            Players::new(),
        )
    }

    /// Constructor with explicit random streams for deterministic tests.
    pub fn with_rngs(
        game: Game,
        loot_generator: LootGenerator,
        retirement_time: Duration,
        options: AppOptions,
        records: Option<RecordStore>,
        world_rng: ChaCha8Rng,
        players: Players,
    ) -> Self {
        let (tick_tx, _) = broadcast::channel(64);
        Self {
            game,
            players,
            loot_generator,
            retirement_time,
            options,
            world_rng,
            records,
            tick_tx,
        }
    }

    pub fn auto_tick_enabled(&self) -> bool {
        self.options.auto_tick_enabled
    }

    pub fn maps(&self) -> &[Map] {
        &self.game.maps
    }

    pub fn find_map(&self, id: &str) -> Option<&Map> {
        self.game.find_map(id)
    }

    /// Subscribes to the tick signal; every completed tick broadcasts its
    /// delta in order.
    pub fn subscribe_ticks(&self) -> broadcast::Receiver<Duration> {
        self.tick_tx.subscribe()
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut Players {
        &mut self.players
    }

    /// Joins `user_name` onto `map_id`: finds or creates the session,
    /// spawns a dog, and issues a token.
    pub fn join_game(&mut self, user_name: &str, map_id: &str) -> Result<JoinOutcome, AppError> {
        if user_name.is_empty() {
            return Err(AppError::EmptyName);
        }
        let map_index = self.game.map_index(map_id).ok_or(AppError::UnknownMap)?;
        let session_index = match self.game.session_for_map(map_index) {
            Some(index) => index,
            None => self.game.create_session(map_index),
        };

        let map = &self.game.maps[map_index];
        let spawn = if self.options.randomize_spawn_points {
            random_road_position(map, &mut self.world_rng)
        } else {
            map.roads[0].start_pos()
        };
        let bag_capacity = map.bag_capacity;

        let dog_id = self.game.sessions[session_index].create_dog(user_name, spawn, bag_capacity);
        let token = self.players.add(session_index, dog_id);

        info!(map_id, player_id = dog_id, "player joined");
        Ok(JoinOutcome {
            token,
            player_id: dog_id,
        })
    }

    /// Lists `(dog id, name)` for everyone sharing the caller's session.
    pub fn session_roster(&self, token: &str) -> Result<Vec<(u64, String)>, AppError> {
        let player = self.players.find(token).ok_or(AppError::UnknownToken)?;
        let session = &self.game.sessions[player.session];
        Ok(session
            .dogs
            .iter()
            .map(|dog| (dog.id, dog.name.clone()))
            .collect())
    }

    /// The full session view for an authorized player.
    pub fn game_state(&self, token: &str) -> Result<StateView, AppError> {
        let player = self.players.find(token).ok_or(AppError::UnknownToken)?;
        let session = &self.game.sessions[player.session];
        let dogs = session
            .dogs
            .iter()
            .map(|dog| DogState {
                id: dog.id,
                position: dog.position,
                speed: dog.speed,
                direction: dog.direction,
                bag: dog.bag_items(),
                score: self.score_of(player.session, dog.id),
            })
            .collect();
        Ok(StateView {
            dogs,
            lost_objects: session.lost_objects.clone(),
        })
    }

    fn score_of(&self, session: usize, dog_id: u64) -> u64 {
        self.players
            .iter()
            .find(|(_, p)| p.session == session && p.dog_id == dog_id)
            .map(|(_, p)| p.score)
            .unwrap_or(0)
    }

    /// Applies a move command. An empty command stops the dog without
    /// changing its facing direction.
    pub fn action(&mut self, token: &str, move_cmd: &str) -> Result<(), AppError> {
        let direction = if move_cmd.is_empty() {
            None
        } else {
            Some(Direction::from_str(move_cmd).ok_or(AppError::InvalidDirection)?)
        };

        let player = self.players.find_mut(token).ok_or(AppError::UnknownToken)?;
        let session_index = player.session;
        let map_index = self.game.sessions[session_index].map_index;
        let map_speed = self.game.maps[map_index].dog_speed;
        let dog = self.game.sessions[session_index]
            .dog_mut(player.dog_id)
            .expect("player refers to a live dog");

        match direction {
            None => dog.speed = Vec2D::ZERO,
            Some(direction) => {
                let was_stopped = dog.speed.is_zero();
                dog.direction = direction;
                dog.speed = direction.velocity(map_speed);
                if was_stopped && !dog.speed.is_zero() {
                    player.fold_stop_into_live();
                }
            }
        }
        Ok(())
    }

    /// A leaderboard page; validates paging before touching the store.
    pub async fn records(
        &self,
        start: Option<i64>,
        max_items: Option<i64>,
    ) -> Result<Vec<ScoreRow>, AppError> {
        let start = start.unwrap_or(0);
        let max_items = max_items.unwrap_or(100);
        if start < 0 {
            return Err(AppError::InvalidStart);
        }
        if !(0..=100).contains(&max_items) {
            return Err(AppError::InvalidMaxItems);
        }
        let store = self.records.as_ref().ok_or(AppError::NoDatabase)?;
        Ok(store.top(start, max_items).await?)
    }

    /// Advances the simulation by `delta`.
    ///
    /// Phases, in order: per-session movement/collection/scoring, loot
    /// generation, retirement (with leaderboard writes), tick signal.
    /// Returns the players retired by this tick.
    pub async fn tick(&mut self, delta: Duration) -> Result<Vec<RetiredPlayer>, AppError> {
        // Group players by session, ordered by dog id so event application
        // is deterministic.
        let mut grouped: BTreeMap<usize, Vec<(u64, String)>> = BTreeMap::new();
        for (token, player) in self.players.iter() {
            grouped
                .entry(player.session)
                .or_default()
                .push((player.dog_id, token.clone()));
        }
        for group in grouped.values_mut() {
            group.sort_by_key(|(dog_id, _)| *dog_id);
        }

        {
            let (maps, sessions) = self.game.split_mut();

            for (&session_index, group) in &grouped {
                let session = &mut sessions[session_index];
                let map = &maps[session.map_index];
                let tokens: Vec<&str> = group.iter().map(|(_, t)| t.as_str()).collect();
                run_session_tick(map, session, &mut self.players, &tokens, delta);
            }

            // Loot generation for every live session.
            for session in sessions.iter_mut() {
                let map = &maps[session.map_index];
                let count = self.loot_generator.generate(
                    delta,
                    session.lost_objects.len(),
                    session.dogs.len(),
                );
                session.spawn_lost_objects(count, map, &mut self.world_rng);
            }

            // Retirement accounting.
            let mut retiring: Vec<String> = Vec::new();
            for (token, player) in self.players.iter_mut() {
                let session = &sessions[player.session];
                let dog = session
                    .dog(player.dog_id)
                    .expect("player refers to a live dog");
                if dog.speed.is_zero() {
                    player.stop_time += delta;
                    if player.stop_time >= self.retirement_time {
                        retiring.push(token.clone());
                    }
                } else {
                    player.live_time += delta;
                }
            }

            let mut retired = Vec::with_capacity(retiring.len());
            for token in retiring {
                let player = self
                    .players
                    .remove(&token)
                    .expect("retiring token is registered");
                let session = &mut sessions[player.session];
                let name = session
                    .dog(player.dog_id)
                    .map(|dog| dog.name.clone())
                    .unwrap_or_default();
                session.remove_dog(player.dog_id);
                debug!(player = %name, score = player.score, "player retired");
                retired.push(RetiredPlayer {
                    name,
                    score: player.score,
                    play_time: player.live_time + self.retirement_time,
                });
            }

            if let Some(store) = &self.records {
                for record in &retired {
                    if let Err(err) = store.add_retired(record).await {
                        error!(player = %record.name, error = %err, "failed to persist retirement record");
                    }
                }
            }

            let _ = self.tick_tx.send(delta);
            Ok(retired)
        }
    }
}

/// The per-item discriminator the tick uses to interpret gathering events.
enum Target {
    Office,
    Loot(usize),
}

/// Movement, collection, and scoring for one session.
fn run_session_tick(
    map: &Map,
    session: &mut GameSession,
    players: &mut Players,
    tokens: &[&str],
    delta: Duration,
) {
    // Uncommitted next positions plus the sweeps they induce.
    let mut next_states = Vec::with_capacity(tokens.len());
    let mut gatherers = Vec::with_capacity(tokens.len());
    for token in tokens {
        let player = players.find(token).expect("grouped token is registered");
        let dog = session
            .dog(player.dog_id)
            .expect("player refers to a live dog");
        let next = physics::next_state(map, dog, delta);
        gatherers.push(Gatherer {
            start: dog.position,
            end: next.position,
            width: GATHERER_WIDTH,
        });
        next_states.push(next);
    }

    // Offices occupy the low indices, loot the high ones; the tag array
    // tells the two apart without re-deriving the partition.
    let mut items = Vec::with_capacity(map.offices.len() + session.lost_objects.len());
    let mut targets = Vec::with_capacity(map.offices.len() + session.lost_objects.len());
    for office in &map.offices {
        items.push(Item {
            position: office.position_f(),
            width: OFFICE_WIDTH,
        });
        targets.push(Target::Office);
    }
    for (index, object) in session.lost_objects.iter().enumerate() {
        items.push(Item {
            position: object.position,
            width: LOOT_WIDTH,
        });
        targets.push(Target::Loot(index));
    }

    let events = collision::find_gather_events(&gatherers, &items);

    // Apply events in time order; each lost object has one consumer per
    // tick, office visits deposit the whole bag.
    let mut taken: BTreeSet<usize> = BTreeSet::new();
    for event in &events {
        let token = tokens[event.gatherer_index];
        let player = players
            .find_mut(token)
            .expect("grouped token is registered");
        match targets[event.item_index] {
            Target::Office => {
                let dog = session
                    .dog_mut(player.dog_id)
                    .expect("player refers to a live dog");
                for item in dog.bag_items() {
                    player.score += map.loot_values[item.type_index];
                }
                dog.clear_bag();
            }
            Target::Loot(index) => {
                if taken.contains(&index) {
                    continue;
                }
                let type_index = session.lost_objects[index].type_index;
                let dog = session
                    .dog_mut(player.dog_id)
                    .expect("player refers to a live dog");
                if dog.add_item(BagItem {
                    id: index,
                    type_index,
                }) {
                    taken.insert(index);
                }
            }
        }
    }
    session.remove_lost_objects(&taken);

    // Commit movement; dogs clamped at a road edge lose their velocity.
    for (token, next) in tokens.iter().zip(&next_states) {
        let player = players.find(token).expect("grouped token is registered");
        let dog = session
            .dog_mut(player.dog_id)
            .expect("player refers to a live dog");
        dog.position = next.position;
        if next.stopped {
            dog.speed = Vec2D::ZERO;
        }
    }
}

/// Restore hook used by the snapshot loader: recreates a player under a
/// known token.
pub(crate) fn restore_player(
    players: &mut Players,
    token: String,
    session: usize,
    dog_id: u64,
    score: u64,
) -> Result<(), crate::players::TokenTaken> {
    let mut player = Player::new(session, dog_id);
    player.score = score;
    players.insert(token, player)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::{GridPoint, Office, Road};
    use serde_json::json;

    fn town(bag_capacity: usize) -> Map {
        Map {
            id: "town".into(),
            name: "Town".into(),
            roads: vec![Road::horizontal(GridPoint { x: 0, y: 0 }, 10)],
            buildings: Vec::new(),
            offices: vec![Office {
                id: "o0".into(),
                position: GridPoint { x: 10, y: 0 },
                offset_x: 5,
                offset_y: 0,
            }],
            dog_speed: 1.0,
            bag_capacity,
            loot_types: vec![
                json!({ "name": "key", "value": 5 }),
                json!({ "name": "wallet", "value": 3 }),
            ],
            loot_values: vec![5, 3],
        }
    }

    fn app_with(map: Map, loot_generator: LootGenerator) -> Application {
        let mut game = Game::new();
        game.add_map(map).unwrap();
        Application::with_rngs(
            game,
            loot_generator,
            Duration::from_secs(60),
            AppOptions::default(),
            None,
            ChaCha8Rng::seed_from_u64(5),
            Players::with_seed(5),
        )
    }

    fn quiet_app(bag_capacity: usize) -> Application {
        app_with(
            town(bag_capacity),
            LootGenerator::new(Duration::from_secs(5), 0.0),
        )
    }

    fn drop_loot(app: &mut Application, type_index: usize, x: f64) {
        app.game.sessions[0].lost_objects.push(LostObject {
            type_index,
            position: Point2D::new(x, 0.0),
        });
    }

    #[test]
    fn join_validates_name_and_map() {
        let mut app = quiet_app(3);
        assert!(matches!(app.join_game("", "town"), Err(AppError::EmptyName)));
        assert!(matches!(
            app.join_game("Rex", "atlantis"),
            Err(AppError::UnknownMap)
        ));

        let first = app.join_game("Rex", "town").unwrap();
        let second = app.join_game("Max", "town").unwrap();
        assert_eq!(first.player_id, 0);
        assert_eq!(second.player_id, 1);
        assert_ne!(first.token, second.token);
        // Both dogs share the single session for the map.
        assert_eq!(app.game.sessions.len(), 1);
        assert_eq!(app.game.sessions[0].dogs.len(), 2);
    }

    #[test]
    fn action_validates_token_and_direction() {
        let mut app = quiet_app(3);
        let joined = app.join_game("Rex", "town").unwrap();

        assert!(matches!(
            app.action("ffffffffffffffffffffffffffffffff", "R"),
            Err(AppError::UnknownToken)
        ));
        assert!(matches!(
            app.action(&joined.token, "Q"),
            Err(AppError::InvalidDirection)
        ));

        app.action(&joined.token, "U").unwrap();
        let dog = &app.game.sessions[0].dogs[0];
        assert_eq!(dog.direction, Direction::North);
        assert_eq!(dog.speed, Vec2D::new(0.0, -1.0));

        app.action(&joined.token, "").unwrap();
        let dog = &app.game.sessions[0].dogs[0];
        assert_eq!(dog.speed, Vec2D::ZERO);
        assert_eq!(dog.direction, Direction::North);
    }

    #[tokio::test]
    async fn tick_signal_preserves_delta_order() {
        let mut app = quiet_app(3);
        let mut ticks = app.subscribe_ticks();
        app.tick(Duration::from_millis(100)).await.unwrap();
        app.tick(Duration::from_millis(250)).await.unwrap();
        assert_eq!(ticks.try_recv().unwrap(), Duration::from_millis(100));
        assert_eq!(ticks.try_recv().unwrap(), Duration::from_millis(250));
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test]
    async fn office_deposit_scores_the_whole_bag() {
        let mut app = quiet_app(3);
        let joined = app.join_game("Rex", "town").unwrap();
        {
            let dog = &mut app.game.sessions[0].dogs[0];
            dog.position = Point2D::new(9.0, 0.0);
            dog.add_item(BagItem { id: 0, type_index: 0 });
            dog.add_item(BagItem { id: 1, type_index: 1 });
        }
        app.action(&joined.token, "R").unwrap();
        app.tick(Duration::from_secs(2)).await.unwrap();

        let state = app.game_state(&joined.token).unwrap();
        assert_eq!(state.dogs[0].score, 8);
        assert!(state.dogs[0].bag.is_empty());
        // Clamped at the wall past the office.
        assert_eq!(state.dogs[0].position, Point2D::new(10.4, 0.0));
        assert_eq!(state.dogs[0].speed, Vec2D::ZERO);
    }

    #[tokio::test]
    async fn full_bag_leaves_loot_on_the_road() {
        let mut app = quiet_app(1);
        let joined = app.join_game("Rex", "town").unwrap();
        drop_loot(&mut app, 0, 3.0);
        drop_loot(&mut app, 1, 7.0);

        app.action(&joined.token, "R").unwrap();
        app.tick(Duration::from_secs(8)).await.unwrap();

        // Only the first object fit; the second stays where it was.
        let session = &app.game.sessions[0];
        assert_eq!(session.lost_objects.len(), 1);
        assert_eq!(session.lost_objects[0].position, Point2D::new(7.0, 0.0));
        let dog = &session.dogs[0];
        assert_eq!(dog.bag_items(), vec![BagItem { id: 0, type_index: 0 }]);
    }

    #[tokio::test]
    async fn each_object_has_one_consumer_per_tick() {
        let mut app = quiet_app(3);
        let first = app.join_game("Rex", "town").unwrap();
        let second = app.join_game("Max", "town").unwrap();
        drop_loot(&mut app, 0, 3.0);

        app.action(&first.token, "R").unwrap();
        app.action(&second.token, "R").unwrap();
        app.tick(Duration::from_secs(5)).await.unwrap();

        let session = &app.game.sessions[0];
        assert!(session.lost_objects.is_empty());
        let carried: usize = session
            .dogs
            .iter()
            .map(|dog| dog.bag_items().len())
            .sum();
        assert_eq!(carried, 1);
    }

    #[tokio::test]
    async fn loot_generation_fills_live_sessions() {
        let mut app = app_with(town(3), LootGenerator::new(Duration::from_secs(5), 1.0));
        app.join_game("Rex", "town").unwrap();
        app.join_game("Max", "town").unwrap();

        app.tick(Duration::from_secs(5)).await.unwrap();

        let session = &app.game.sessions[0];
        assert_eq!(session.lost_objects.len(), 2);
        let map = &app.game.maps[0];
        for object in &session.lost_objects {
            assert!(object.type_index < map.loot_type_count());
            assert!(map.contains_point(object.position));
        }
    }

    #[tokio::test]
    async fn retirement_counts_only_uninterrupted_stops() {
        let mut app = quiet_app(3);
        let joined = app.join_game("Rex", "town").unwrap();

        // Thirty idle seconds, then movement folds them into play time.
        app.tick(Duration::from_secs(30)).await.unwrap();
        app.action(&joined.token, "R").unwrap();
        app.tick(Duration::from_secs(4)).await.unwrap();
        app.action(&joined.token, "").unwrap();

        // A fresh 59-second stretch is still short of the threshold.
        let retired = app.tick(Duration::from_secs(59)).await.unwrap();
        assert!(retired.is_empty());

        let retired = app.tick(Duration::from_secs(1)).await.unwrap();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].name, "Rex");
        // 30 s folded + 4 s moving + the final 60 s threshold.
        assert_eq!(retired[0].play_time, Duration::from_secs(94));
        assert!(app.players.is_empty());
        assert!(app.game.sessions[0].dogs.is_empty());
    }

    #[tokio::test]
    async fn zero_delta_is_a_no_op_tick() {
        let mut app = quiet_app(3);
        let joined = app.join_game("Rex", "town").unwrap();
        app.action(&joined.token, "R").unwrap();
        app.tick(Duration::ZERO).await.unwrap();
        let state = app.game_state(&joined.token).unwrap();
        assert_eq!(state.dogs[0].position, Point2D::new(0.0, 0.0));
    }

    #[tokio::test]
    async fn records_paging_is_validated() {
        let app = quiet_app(3);
        assert!(matches!(
            app.records(Some(-1), None).await,
            Err(AppError::InvalidStart)
        ));
        assert!(matches!(
            app.records(None, Some(-1)).await,
            Err(AppError::InvalidMaxItems)
        ));
        assert!(matches!(
            app.records(None, Some(101)).await,
            Err(AppError::InvalidMaxItems)
        ));
    }
}
