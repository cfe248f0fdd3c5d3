//! # Compclock
//!
//! The round-state and timing engine for live bouldering and lead competitions.
//!
//! Compclock runs the countdowns of a competition round, rotates athletes
//! through the boulders (or routes) as stages advance, and tells every display
//! surface what changed. It is a library the venue application drives; the
//! transport that carries events to screens is up to the caller.
//!
//! ## Core Concepts
//!
//! - **Round phases**: A round alternates between a *stage* (athletes climb)
//!   and a *turnover* (athletes move to their next boulder). Either clock can
//!   be paused, zeroed or skipped by an operator.
//! - **Rotation**: The on-deck assignment is a pure function of the round
//!   index, the roster and the settings. Round-robin, finals and lead layouts
//!   are supported.
//! - **Event-Driven**: Every state change is published as a `CompetitionEvent`
//!   on one broadcast stream.
//! - **Ports**: Status file, state backup and audio cues sit behind small
//!   traits and never block the engine.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use compclock::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load the configuration (compclock.toml + COMPCLOCK__* env vars).
//!     let config = CompetitionConfig::load(None)?;
//!
//!     // 2. Spawn the engine with a broadcast hub and the file-backed ports.
//!     let (engine, _task) = compclock::runtime::spawn(
//!         &config,
//!         BroadcastHub::default(),
//!         Arc::new(FileStatusSink::new(&config.status_file, &config.backup_file)),
//!         Arc::new(NullCuePlayer),
//!     );
//!
//!     // 3. Subscribe before issuing commands.
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{}", event.name());
//!         }
//!     });
//!
//!     // 4. Drive the round.
//!     engine.start_timer().await?;
//!     tokio::signal::ctrl_c().await?;
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Compclock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod ports;
pub mod runtime;

/// A prelude module for easy importing of the most common Compclock types.
pub mod prelude {
    pub use crate::common::{Athlete, CategoryId, ClockKind, Phase};
    pub use crate::components::roster::{AthleteRecord, AthleteUpload};
    pub use crate::config::{CompetitionConfig, RoundSettings, SettingsPatch};
    pub use crate::engine::{CompetitionEngine, CompetitionSnapshot, FullSnapshot, RoundChange};
    pub use crate::error::{CompetitionError, Result};
    pub use crate::events::{CompetitionEvent, OndeckAssignment, OndeckUpdate};
    pub use crate::ports::{
        BroadcastHub, FileStatusSink, NullCuePlayer, NullStatusSink, SystemCuePlayer,
    };
    pub use crate::runtime::CompetitionHandle;
}
