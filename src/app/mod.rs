//! Application state shared across routes, plus the strand that serializes
//! every world mutation.

pub mod application;

pub use application::{AppError, AppOptions, Application};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::error;

use crate::store::snapshot::StateSaver;

/// Shared application state.
///
/// The world lives behind one fair `tokio::sync::Mutex`: handlers and the
/// ticker queue on it in arrival order, so mutations never interleave with
/// tick execution.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Mutex<Application>>,
    saver: Option<Arc<Mutex<StateSaver>>>,
}

impl AppState {
    pub fn new(app: Application, saver: Option<StateSaver>) -> Self {
        Self {
            app: Arc::new(Mutex::new(app)),
            saver: saver.map(|s| Arc::new(Mutex::new(s))),
        }
    }

    /// Advances the simulation by `delta` and runs the periodic snapshot in
    /// the same critical section, so the saver always sees a settled world.
    pub async fn advance(&self, delta: Duration) -> Result<(), AppError> {
        let mut app = self.app.lock().await;
        app.tick(delta).await?;
        if let Some(saver) = &self.saver {
            saver.lock().await.save_on_tick(&app, delta);
        }
        Ok(())
    }

    /// The explicit save issued on graceful shutdown.
    pub async fn save_now(&self) -> Result<(), crate::store::PersistenceError> {
        if let Some(saver) = &self.saver {
            let app = self.app.lock().await;
            saver.lock().await.save(&app)?;
        }
        Ok(())
    }
}

/// Drives the simulation from the wall clock when `--tick-period` is set.
/// Missed ticks are skipped rather than bunched.
pub fn spawn_auto_ticker(state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of `interval` fires immediately; skip it so the
        // first simulated step happens one period after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = state.advance(period).await {
                error!(error = %err, "tick failed");
            }
        }
    });
}
