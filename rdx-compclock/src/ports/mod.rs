//! Narrow interfaces to the engine's external collaborators.
//!
//! The engine calls every port synchronously from its event loop and never
//! waits on the outcome. Implementations must return immediately: any I/O is
//! handed off to a background task, and failures are logged at the port.

pub mod broadcast;
pub mod cue;
pub mod status;

use crate::events::CompetitionEvent;
use serde::Serialize;
use std::sync::Arc;

pub use self::broadcast::BroadcastHub;
pub use self::cue::{NullCuePlayer, SystemCuePlayer};
pub use self::status::{FileStatusSink, NullStatusSink};

/// Fan-out of state events to every connected display surface.
pub trait Broadcast: Send + Sync {
    fn emit(&self, event: CompetitionEvent);
}

/// Best-effort persistence of the human-readable status line and the
/// round-position backup.
pub trait StatusSink: Send + Sync {
    /// Overwrites the one-line status file.
    fn write_status(&self, line: String);
    /// Records where the round is, after every advance.
    fn save_backup(&self, backup: StateBackup);
}

/// Plays and stops sound cues identified by path.
pub trait CuePlayer: Send + Sync {
    fn play(&self, path: &str);
    fn stop(&self);
}

/// The round position written to the backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateBackup {
    pub round_name: String,
    pub round_index: i64,
    pub remaining_stage_seconds: u32,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

/// The set of ports one engine talks to.
#[derive(Clone)]
pub struct Ports {
    pub broadcast: Arc<dyn Broadcast>,
    pub status: Arc<dyn StatusSink>,
    pub cues: Arc<dyn CuePlayer>,
}
