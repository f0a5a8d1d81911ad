//! Retirement leaderboard backed by Postgres.

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::players::RetiredPlayer;

/// One leaderboard row as served to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRow {
    pub name: String,
    pub score: i32,
    pub play_time_ms: i32,
}

/// A handle to the `retired_players` table. The pool is capped at one
/// connection: every write happens on the strand anyway, and a single
/// session keeps operation order equal to submission order.
#[derive(Clone)]
pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    /// Connects using the `GAME_DB_URL`-style connection string.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(1).connect(url).await?;
        Ok(Self { pool })
    }

    /// Creates the table and its ordering index; must run before the first
    /// query.
    pub async fn prepare(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS retired_players (
                id UUID PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                score INTEGER NOT NULL,
                play_time_ms INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS retired_players_order_idx
             ON retired_players (score DESC, play_time_ms, name)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Appends one retirement row under a fresh UUID.
    pub async fn add_retired(&self, record: &RetiredPlayer) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO retired_players (id, name, score, play_time_ms)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(&record.name)
        .bind(record.score as i32)
        .bind(record.play_time.as_millis() as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A leaderboard page ordered by score desc, then play time asc, then
    /// name asc. Paging bounds are validated by the caller.
    pub async fn top(&self, offset: i64, limit: i64) -> Result<Vec<ScoreRow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT name, score, play_time_ms FROM retired_players
             ORDER BY score DESC, play_time_ms ASC, name ASC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoreRow {
                name: row.get("name"),
                score: row.get("score"),
                play_time_ms: row.get("play_time_ms"),
            })
            .collect())
    }
}
