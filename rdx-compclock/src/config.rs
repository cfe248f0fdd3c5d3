//! Defines all configuration structures for the competition engine.
//!
//! These structs are designed to be deserialized with `serde`, layered by the
//! `config` crate: built-in defaults, then an optional TOML file, then
//! `COMPCLOCK__*` environment variables. This lets venue specifics (sound files,
//! status file location, default round timings) live outside the code.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File stem looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "compclock";

/// Cue path that stops playback instead of starting a sound.
pub const MUTE_CUE: &str = "MUTE";

/// The top-level configuration for the `CompetitionEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompetitionConfig {
    /// Round settings the engine is constructed (and reset) with.
    #[serde(default)]
    pub round_settings: RoundSettings,

    /// Audio cues keyed by remaining seconds.
    #[serde(default)]
    pub cues: CueConfig,

    /// Base directory cue paths are resolved against for local playback.
    #[serde(default = "default_sounds_dir")]
    pub sounds_dir: PathBuf,

    /// One-line status file overwritten on every timer update.
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,

    /// JSON backup of the round position, rewritten on every advance.
    #[serde(default = "default_backup_file")]
    pub backup_file: PathBuf,

    /// Timestamped mirror of every log line. Empty disables it.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// A `timer_mode` equal to this value is an observation timer: the stage
    /// clock reloads on expiry and never hands over to a turnover.
    #[serde(default = "default_observation_seconds")]
    pub observation_seconds: u32,

    /// Length of the countdown before the first stage of a normal round.
    #[serde(default = "default_pre_round_seconds")]
    pub pre_round_seconds: u32,
}

/// Per-round timing and layout settings. Mutable while the engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundSettings {
    /// Seconds per climbing stage.
    pub timer_mode: u32,
    /// Seconds of transit time between stages (observation time in lead mode).
    pub turnover: u32,
    /// Simultaneous boulder/route slots per category.
    pub boulders: u32,
    /// Zones per boulder. Display only.
    pub zones: u32,
    /// Staggered finals rotation instead of round-robin.
    pub finals_mode: bool,
    /// Observation before every climber, advanced at stage end.
    pub lead_mode: bool,
    /// Desired concurrent climbers on the wall in finals.
    pub finals_climbers: u32,
}

/// A partial update to [`RoundSettings`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub timer_mode: Option<u32>,
    pub turnover: Option<u32>,
    pub boulders: Option<u32>,
    pub zones: Option<u32>,
    pub finals_mode: Option<bool>,
    pub lead_mode: Option<bool>,
    pub finals_climbers: Option<u32>,
}

impl RoundSettings {
    /// Merges `patch` into these settings.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(timer_mode) = patch.timer_mode {
            self.timer_mode = timer_mode;
        }
        if let Some(turnover) = patch.turnover {
            self.turnover = turnover;
        }
        if let Some(boulders) = patch.boulders {
            self.boulders = boulders;
        }
        if let Some(zones) = patch.zones {
            self.zones = zones;
        }
        if let Some(finals_mode) = patch.finals_mode {
            self.finals_mode = finals_mode;
        }
        if let Some(lead_mode) = patch.lead_mode {
            self.lead_mode = lead_mode;
        }
        if let Some(finals_climbers) = patch.finals_climbers {
            self.finals_climbers = finals_climbers;
        }
    }
}

/// Sound cues played at fixed points of a countdown.
#[derive(Debug, Clone, Deserialize)]
pub struct CueConfig {
    /// Cues fired when a clock tick lands on `at` remaining seconds.
    #[serde(default = "default_cue_marks")]
    pub marks: Vec<CueMark>,
    /// Cue played when a stage is resumed or climbing begins by hand.
    #[serde(default = "default_go_cue")]
    pub go: Option<String>,
}

/// One entry of the remaining-seconds cue table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CueMark {
    pub at: u32,
    /// Sound path, or [`MUTE_CUE`] to stop whatever is playing.
    pub path: String,
}

impl CueConfig {
    /// The cue registered for `remaining` seconds, if any.
    pub fn at(&self, remaining: u32) -> Option<&str> {
        self.marks
            .iter()
            .find(|mark| mark.at == remaining)
            .map(|mark| mark.path.as_str())
    }
}

impl CompetitionConfig {
    /// Loads the configuration from `path` (or `compclock.toml` if present)
    /// and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = match path {
            Some(path) => Config::builder().add_source(File::from(path)),
            None => Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        let config = builder
            .add_source(
                Environment::with_prefix("COMPCLOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let loaded: CompetitionConfig = config.try_deserialize()?;
        debug!("Loaded configuration: {:?}", loaded);
        Ok(loaded)
    }
}

// --- Default value functions for serde ---

fn default_sounds_dir() -> PathBuf {
    PathBuf::from("client")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("misc/timer.txt")
}

fn default_backup_file() -> PathBuf {
    PathBuf::from("misc/state-backup.json")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("misc/server.log")
}

fn default_observation_seconds() -> u32 {
    120
}

fn default_pre_round_seconds() -> u32 {
    6
}

fn default_cue_marks() -> Vec<CueMark> {
    vec![
        CueMark {
            at: 60,
            path: "/static/sounds/beep.mp3".to_string(),
        },
        CueMark {
            at: 5,
            path: "/static/sounds/5beeps-boop.mp3".to_string(),
        },
    ]
}

fn default_go_cue() -> Option<String> {
    Some("/static/sounds/boop.mp3".to_string())
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            timer_mode: 300,
            turnover: 15,
            boulders: 5,
            zones: 0,
            finals_mode: false,
            lead_mode: false,
            finals_climbers: 1,
        }
    }
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            marks: default_cue_marks(),
            go: default_go_cue(),
        }
    }
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            round_settings: RoundSettings::default(),
            cues: CueConfig::default(),
            sounds_dir: default_sounds_dir(),
            status_file: default_status_file(),
            backup_file: default_backup_file(),
            log_file: default_log_file(),
            observation_seconds: default_observation_seconds(),
            pre_round_seconds: default_pre_round_seconds(),
        }
    }
}
