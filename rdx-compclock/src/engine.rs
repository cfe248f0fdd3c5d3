//! The core engine that owns a competition round.
//!
//! `CompetitionEngine` is a plain, synchronous state machine. It holds the
//! round settings, the roster, the phase, both clocks and the round index, and
//! every mutation goes through one of its command methods or
//! [`CompetitionEngine::on_clock_tick`]. It is driven by the single event loop
//! in [`crate::runtime`], so there is never concurrent access and no locking.
//!
//! Side effects leave through [`Ports`] and are never awaited.

use crate::common::{ClockKind, Groups, Phase};
use crate::components::clock::{ClockTick, RoundClock, TickOutcome};
use crate::components::roster::{AthleteUpload, Roster};
use crate::components::scheduler::{compute_ondeck, rotation_horizon, steps_for_placement, steps_for_stage};
use crate::config::{CompetitionConfig, CueConfig, RoundSettings, SettingsPatch, MUTE_CUE};
use crate::error::{CompetitionError, Result};
use crate::events::{CompetitionEvent, OndeckAssignment, OndeckUpdate};
use crate::ports::status::format_clock;
use crate::ports::{Ports, StateBackup};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Largest stage number, in either direction, an operator jump accepts.
pub const MAX_STAGE_JUMP: i64 = 1_000_000;

/// An administrative jump to a round position.
///
/// Either `stage` or `athlete_id` (+ `boulder`) selects the target; `stage`
/// wins when both are given. A negative `stage` backs the round index up
/// directly instead of replaying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundChange {
    pub athlete_id: Option<String>,
    pub boulder: Option<u32>,
    pub stage: Option<i64>,
    /// Resume straight into the target stage with this many seconds left.
    pub seed_time: Option<u32>,
}

/// The phase-machine state a display surface needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetitionSnapshot {
    pub round_index: i64,
    pub phase: Phase,
    pub remaining_stage_time: u32,
    pub remaining_turnover_time: u32,
    pub round_name: String,
    pub round_started: bool,
    pub next_climber_requested: bool,
    pub manual_round_selected: bool,
}

/// Everything a (re)connecting surface needs to render without a replay.
#[derive(Debug, Clone, Serialize)]
pub struct FullSnapshot {
    pub state: CompetitionSnapshot,
    pub assignment: OndeckAssignment,
    pub settings: RoundSettings,
    pub groups: Groups,
    pub roster: Roster,
}

/// The round-state and timing engine for one competition run.
pub struct CompetitionEngine {
    settings: RoundSettings,
    cues: CueConfig,
    pre_round_seconds: u32,
    roster: Roster,
    ondeck: OndeckAssignment,
    round_index: i64,
    round_name: String,
    phase: Phase,
    round_started: bool,
    next_climber_requested: bool,
    manual_round_selected: bool,
    stage_clock: RoundClock,
    turnover_clock: RoundClock,
    ports: Ports,
}

// Core implementation block for internal logic.
impl CompetitionEngine {
    /// Creates an engine in `StagePending` with the configured default settings.
    ///
    /// With a `ticks` sender every clock run spawns a ticker feeding that
    /// channel; without one, time only passes through [`Self::tick`].
    pub fn new(
        config: &CompetitionConfig,
        ports: Ports,
        ticks: Option<mpsc::UnboundedSender<ClockTick>>,
    ) -> Self {
        let settings = config.round_settings.clone();
        let stage_clock = RoundClock::new(
            ClockKind::Stage,
            settings.timer_mode,
            Some(config.observation_seconds),
            ticks.clone(),
        );
        let turnover_clock = RoundClock::new(ClockKind::Turnover, settings.turnover, None, ticks);
        let roster = Roster::default();
        let ondeck = compute_ondeck(0, &roster, &settings);
        Self {
            settings,
            cues: config.cues.clone(),
            pre_round_seconds: config.pre_round_seconds,
            roster,
            ondeck,
            round_index: 0,
            round_name: String::new(),
            phase: Phase::StagePending,
            round_started: false,
            next_climber_requested: false,
            manual_round_selected: false,
            stage_clock,
            turnover_clock,
            ports,
        }
    }

    fn emit(&self, event: CompetitionEvent) {
        self.ports.broadcast.emit(event);
    }

    fn clock_mut(&mut self, kind: ClockKind) -> &mut RoundClock {
        match kind {
            ClockKind::Stage => &mut self.stage_clock,
            ClockKind::Turnover => &mut self.turnover_clock,
        }
    }

    /// Runs the `kind` clock from its current remaining time. The other clock
    /// is always cancelled first, so at most one is ever running.
    fn run_clock(&mut self, kind: ClockKind) {
        let other = match kind {
            ClockKind::Stage => ClockKind::Turnover,
            ClockKind::Turnover => ClockKind::Stage,
        };
        self.clock_mut(other).cancel();
        let clock = self.clock_mut(kind);
        let from = clock.remaining();
        clock.start(from);
        self.phase = Phase::running(kind);
    }

    fn halt_clocks(&mut self) {
        self.stage_clock.cancel();
        self.turnover_clock.cancel();
    }

    /// Moves the rotation one step, recomputes the whole assignment and
    /// records the new position.
    fn advance(&mut self) {
        self.step();
        self.save_backup();
    }

    fn step(&mut self) {
        self.round_index += 1;
        self.recompute_ondeck();
    }

    fn save_backup(&self) {
        self.ports.status.save_backup(StateBackup {
            round_name: self.round_name.clone(),
            round_index: self.round_index,
            remaining_stage_seconds: self.stage_clock.remaining(),
            saved_at: chrono::Utc::now(),
        });
    }

    fn recompute_ondeck(&mut self) {
        self.ondeck = compute_ondeck(self.round_index, &self.roster, &self.settings);
    }

    fn publish_ondeck(&self) {
        self.emit(CompetitionEvent::OndeckUpdate(OndeckUpdate {
            round_name: self.round_name.clone(),
            assignment: self.ondeck.clone(),
            round_index: self.round_index,
            groups: self.roster.groups(),
            manual_round_selected: self.manual_round_selected,
        }));
    }

    /// Emits both clocks, fires the cue for `cue_at` remaining seconds and
    /// rewrites the status line.
    fn publish_time(&self, cue_at: Option<u32>) {
        self.emit(CompetitionEvent::TimerTick {
            remaining_stage_seconds: self.stage_clock.remaining(),
            remaining_turnover_seconds: self.turnover_clock.remaining(),
        });
        if let Some(cue) = cue_at.and_then(|seconds| self.cues.at(seconds)) {
            self.play_cue(cue);
        }
        self.ports.status.write_status(self.status_line());
    }

    /// `stage<index>/MM:SS` while climbing, `transit<next index>/MM:SS` during
    /// a turnover.
    pub fn status_line(&self) -> String {
        match self.phase.interval() {
            Some(ClockKind::Turnover) => format!(
                "transit{}/{}",
                self.round_index + 1,
                format_clock(self.turnover_clock.remaining())
            ),
            _ => format!(
                "stage{}/{}",
                self.round_index,
                format_clock(self.stage_clock.remaining())
            ),
        }
    }

    fn play_cue(&self, cue: &str) {
        if cue == MUTE_CUE {
            self.stop_cue();
            return;
        }
        self.ports.cues.play(cue);
        self.emit(CompetitionEvent::PlayCue {
            cue_id: cue.to_string(),
        });
    }

    fn stop_cue(&self) {
        self.ports.cues.stop();
        self.emit(CompetitionEvent::StopCue);
    }

    fn play_go_cue(&self) {
        if let Some(go) = &self.cues.go {
            self.play_cue(go);
        }
    }

    fn enter_stage(&mut self) {
        self.next_climber_requested = false;
        self.stage_clock.set_remaining(self.settings.timer_mode);
        let groups = self.roster.groups();
        info!("stage {} begin: {}", self.round_index, groups.0.join("|"));
        self.emit(CompetitionEvent::RoundStageBegin {
            groups,
            round_index: self.round_index,
        });
        self.run_clock(ClockKind::Stage);
        self.publish_time(None);
    }

    fn enter_turnover(&mut self, seconds: u32) {
        self.turnover_clock.set_remaining(seconds);
        self.emit(CompetitionEvent::RoundTurnoverBegin);
        self.run_clock(ClockKind::Turnover);
        self.publish_time(None);
    }

    fn stage_expired(&mut self) {
        debug!("stage {} ended", self.round_index);
        self.emit(CompetitionEvent::RoundStageEnd);
        if self.settings.lead_mode {
            self.advance();
            self.publish_ondeck();
            self.enter_turnover(self.settings.turnover);
        } else if self.settings.finals_mode {
            // finals wait for the operator between climbers
            self.advance();
            self.stage_clock.set_remaining(self.settings.timer_mode);
            self.phase = Phase::Paused(ClockKind::Stage);
            self.publish_ondeck();
            self.publish_time(None);
        } else {
            self.enter_turnover(self.settings.turnover);
            self.publish_ondeck();
        }
    }

    fn turnover_expired(&mut self) {
        // lead observation precedes a climber who is already on deck
        if !self.settings.lead_mode {
            self.advance();
        }
        self.publish_ondeck();
        self.enter_stage();
    }

    /// Cancels clocks and clears round flags without touching the index.
    fn reset_state(&mut self) {
        self.halt_clocks();
        self.round_started = false;
        self.next_climber_requested = false;
        self.manual_round_selected = false;
        self.phase = Phase::StagePending;
        self.stage_clock.set_remaining(self.settings.timer_mode);
        self.turnover_clock.set_remaining(self.settings.turnover);
        self.emit(CompetitionEvent::RoundPhaseStarted { started: false });
        self.publish_time(None);
        self.emit(CompetitionEvent::SettingsChanged {
            settings: self.settings.clone(),
        });
        self.emit(CompetitionEvent::RoundStageEnd);
    }
}

// Command surface.
impl CompetitionEngine {
    /// Starts the round, or resumes whichever clock was paused.
    pub fn start_timer(&mut self) {
        if !self.round_started {
            info!("timer started");
            self.round_started = true;
            self.emit(CompetitionEvent::RoundPhaseStarted { started: true });
            if !self.settings.finals_mode && !self.settings.lead_mode {
                self.enter_turnover(self.pre_round_seconds);
                return;
            }
            self.recompute_ondeck();
            self.publish_ondeck();
            if self.settings.lead_mode {
                self.enter_turnover(self.settings.turnover);
            } else {
                self.enter_stage();
            }
            return;
        }

        match self.phase {
            Phase::Stage | Phase::Turnover => info!("timer already running"),
            Phase::Paused(ClockKind::Turnover) => {
                info!("resuming turnover timer");
                if self.turnover_clock.remaining() == 0 {
                    self.turnover_clock.set_remaining(self.settings.turnover);
                }
                self.run_clock(ClockKind::Turnover);
                self.publish_time(None);
            }
            Phase::Paused(ClockKind::Stage) => {
                info!("resuming timer");
                self.play_go_cue();
                if self.next_climber_requested {
                    self.next_climber_requested = false;
                    self.emit(CompetitionEvent::RoundStageBegin {
                        groups: self.roster.groups(),
                        round_index: self.round_index,
                    });
                    self.publish_ondeck();
                }
                if self.stage_clock.remaining() == 0 {
                    self.stage_clock.set_remaining(self.settings.timer_mode);
                }
                self.run_clock(ClockKind::Stage);
                self.publish_time(None);
            }
            Phase::StagePending => warn!("round marked started but still pending; use reset"),
        }
    }

    /// Halts the running clock, keeping its remaining time.
    pub fn pause_timer(&mut self) {
        let kind = match self.phase {
            Phase::Stage => ClockKind::Stage,
            Phase::Turnover => ClockKind::Turnover,
            _ => {
                debug!("pause ignored: no clock running");
                return;
            }
        };
        info!("timer paused");
        self.halt_clocks();
        self.phase = Phase::Paused(kind);
        self.stop_cue();
    }

    /// Halts the clock and reloads the full duration of the current interval.
    pub fn zero_timer(&mut self) {
        info!("timer zero-ed");
        self.halt_clocks();
        match self.phase.interval() {
            None => self.stage_clock.set_remaining(self.settings.timer_mode),
            Some(ClockKind::Stage) => {
                self.stage_clock.set_remaining(self.settings.timer_mode);
                self.phase = Phase::Paused(ClockKind::Stage);
            }
            Some(ClockKind::Turnover) => {
                self.turnover_clock.set_remaining(self.settings.turnover);
                self.phase = Phase::Paused(ClockKind::Turnover);
            }
        }
        self.publish_time(None);
    }

    /// Skips to the next climber: halts the clocks and advances once, leaving
    /// the round paused for the operator to start.
    pub fn next_climber(&mut self) {
        info!("next climber: timer paused, round advanced");
        self.halt_clocks();
        self.emit(CompetitionEvent::RoundStageEnd);
        self.round_started = true;
        self.next_climber_requested = true;
        self.manual_round_selected = false;
        self.stage_clock.set_remaining(self.settings.timer_mode);
        self.advance();
        if self.settings.lead_mode {
            self.turnover_clock.set_remaining(self.settings.turnover);
            self.phase = Phase::Paused(ClockKind::Turnover);
        } else {
            self.phase = Phase::Paused(ClockKind::Stage);
        }
        self.publish_ondeck();
        self.publish_time(None);
    }

    /// Ends a lead-mode observation early and starts climbing.
    pub fn begin_climbing(&mut self) {
        if !self.settings.lead_mode {
            debug!("begin climbing ignored: lead mode is off");
            return;
        }
        if self.phase.interval() != Some(ClockKind::Turnover) {
            debug!("begin climbing ignored: not in an observation");
            return;
        }
        info!("begin climbing: observation ended early");
        self.halt_clocks();
        self.turnover_clock.set_remaining(0);
        self.round_started = true;
        self.play_go_cue();
        self.enter_stage();
    }

    /// Puts the round back to its start, keeping roster and settings.
    pub fn reset_round(&mut self) {
        info!("round reset");
        self.reset_state();
        self.round_index = 0;
        if self.roster.is_populated() {
            self.round_index = -1;
            self.advance();
        } else {
            self.recompute_ondeck();
        }
        self.publish_ondeck();
    }

    pub fn update_round_name(&mut self, name: impl Into<String>) {
        self.round_name = name.into();
        info!("round name update: {}", self.round_name);
        self.publish_ondeck();
    }

    pub fn update_group_name(&mut self, category: u8, name: impl Into<String>) -> Result<()> {
        let category = crate::common::CategoryId::try_from(category)?;
        let name = name.into();
        info!("group name update: category {} is '{}'", category, name);
        self.roster.set_group_name(category, name);
        self.publish_ondeck();
        Ok(())
    }

    /// Stores a category roster. Rejected while the round is started.
    pub fn handle_athlete_upload(&mut self, upload: AthleteUpload) -> Result<String> {
        if self.round_started {
            warn!("athlete upload rejected: round in progress");
            return Err(CompetitionError::RoundInProgress);
        }
        let group_name = upload.group_name.clone();
        let (category, athletes) = upload.validate().inspect_err(|err| {
            warn!("bad athlete upload: {}", err);
        })?;
        info!(
            "athlete list received: {} ({} athletes, category {})",
            group_name,
            athletes.len(),
            category
        );
        self.roster.replace(category, athletes, group_name);
        self.recompute_ondeck();
        self.publish_ondeck();
        Ok("Athlete data stored successfully".to_string())
    }

    /// Empties every category.
    pub fn clear_roster(&mut self) -> String {
        info!("athlete data cleared");
        self.roster.clear();
        self.recompute_ondeck();
        self.publish_ondeck();
        "Athlete data cleared".to_string()
    }

    /// Jumps to a stage or athlete placement by resetting and replaying the
    /// rotation from index 0, step by step.
    ///
    /// Stages beyond `±MAX_STAGE_JUMP` are rejected before anything changes.
    /// Past the rotation horizon every slot stays empty, so the replay stops
    /// there and the index is set directly.
    pub fn change_round_state(&mut self, change: RoundChange) -> Result<()> {
        info!(
            "round state change: athlete# [{:?}] boulder# [{:?}] stage# [{:?}] time: [{:?}]",
            change.athlete_id, change.boulder, change.stage, change.seed_time
        );
        if let Some(stage) = change.stage {
            if !(-MAX_STAGE_JUMP..=MAX_STAGE_JUMP).contains(&stage) {
                warn!("rejected stage {}: outside ±{}", stage, MAX_STAGE_JUMP);
                return Err(CompetitionError::StageOutOfRange(stage));
            }
        }
        let steps = match change.stage.filter(|stage| *stage != 0) {
            Some(stage) if stage < 0 => {
                info!("setting round stage to {}", stage);
                self.reset_state();
                self.round_index = stage - 2;
                self.advance();
                self.manual_round_selected = true;
                self.publish_ondeck();
                return Ok(());
            }
            Some(stage) => steps_for_stage(stage),
            None => {
                let athlete_id = change.athlete_id.clone().unwrap_or_default();
                let Some((category, position)) = self.roster.position_of(&athlete_id) else {
                    warn!("could not place athlete, ID not found in list: {}", athlete_id);
                    return Err(CompetitionError::UnknownAthlete(athlete_id));
                };
                steps_for_placement(
                    position,
                    self.roster.athletes(category).len(),
                    change.boulder.unwrap_or(1),
                    self.settings.finals_mode,
                )
            }
        };
        // a seeded jump lands inside the target stage rather than before it
        let steps = match change.seed_time {
            Some(_) => steps.checked_add(1),
            None => Some(steps),
        }
        .filter(|steps| *steps <= MAX_STAGE_JUMP)
        .ok_or(CompetitionError::StageOutOfRange(steps))?;

        self.reset_state();
        self.round_index = 0;
        self.recompute_ondeck();
        let replayed = steps.min(rotation_horizon(&self.roster, &self.settings));
        info!("advancing {} steps", steps);
        for _ in 0..replayed {
            self.step();
        }
        if steps > replayed {
            debug!("rotation empty from index {}; jumping to {}", replayed, steps);
            self.round_index = steps;
            self.recompute_ondeck();
        }
        self.save_backup();
        self.round_started = true;
        self.manual_round_selected = true;
        self.emit(CompetitionEvent::RoundPhaseStarted { started: true });

        match change.seed_time {
            Some(seed) => {
                self.stage_clock.set_remaining(seed);
                self.phase = Phase::Paused(ClockKind::Stage);
            }
            None if self.settings.lead_mode => {
                self.turnover_clock.set_remaining(self.settings.turnover);
                self.phase = Phase::Paused(ClockKind::Turnover);
            }
            None if self.settings.finals_mode => {
                self.phase = Phase::Paused(ClockKind::Stage);
            }
            None => {
                self.turnover_clock.set_remaining(self.pre_round_seconds);
                self.phase = Phase::Paused(ClockKind::Turnover);
            }
        }
        self.publish_ondeck();
        self.publish_time(None);
        Ok(())
    }

    /// Merges a partial settings update.
    ///
    /// A changed stage duration reloads the stage clock live, except during a
    /// lead-mode observation. Toggling lead mode inside a turnover reloads it
    /// with the turnover duration.
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        let previous = self.settings.clone();
        self.settings.apply(&patch);
        if self.settings.lead_mode && !previous.lead_mode && !self.settings.finals_mode {
            info!("lead mode enables finals mode");
            self.settings.finals_mode = true;
        }
        info!("settings updated: {:?}", patch);

        let in_turnover = self.phase.interval() == Some(ClockKind::Turnover);
        let mut clocks_changed = false;
        if self.settings.timer_mode != previous.timer_mode && !(previous.lead_mode && in_turnover) {
            self.stage_clock.set_remaining(self.settings.timer_mode);
            clocks_changed = true;
        }
        if self.settings.lead_mode != previous.lead_mode && in_turnover {
            self.turnover_clock.set_remaining(self.settings.turnover);
            clocks_changed = true;
        }
        self.stage_clock.set_duration(self.settings.timer_mode);
        self.turnover_clock.set_duration(self.settings.turnover);

        if clocks_changed {
            self.publish_time(None);
        }
        self.emit(CompetitionEvent::SettingsChanged {
            settings: self.settings.clone(),
        });
    }

    /// Applies one tick from a clock's ticker.
    pub fn on_clock_tick(&mut self, tick: ClockTick) {
        let outcome = self.clock_mut(tick.kind).on_tick(tick);
        match outcome {
            TickOutcome::Stale => trace!("dropped stale {:?} tick", tick.kind),
            TickOutcome::Ticked(remaining) | TickOutcome::Restarted(remaining) => {
                trace!("{:?} clock at {}s", tick.kind, remaining);
                self.publish_time(Some(remaining));
            }
            TickOutcome::Expired => {
                self.publish_time(None);
                match tick.kind {
                    ClockKind::Stage => self.stage_expired(),
                    ClockKind::Turnover => self.turnover_expired(),
                }
            }
        }
    }

    /// Delivers one elapsed second to whichever clock is running, exactly as
    /// its ticker would.
    pub fn tick(&mut self) {
        let pending = self
            .stage_clock
            .pending_tick()
            .or_else(|| self.turnover_clock.pending_tick());
        if let Some(tick) = pending {
            self.on_clock_tick(tick);
        }
    }

    /// Cancels both clocks for process shutdown.
    pub fn shutdown(&mut self) {
        info!("Clearing all competition clocks.");
        self.halt_clocks();
    }
}

// Query surface.
impl CompetitionEngine {
    pub fn snapshot(&self) -> CompetitionSnapshot {
        CompetitionSnapshot {
            round_index: self.round_index,
            phase: self.phase,
            remaining_stage_time: self.stage_clock.remaining(),
            remaining_turnover_time: self.turnover_clock.remaining(),
            round_name: self.round_name.clone(),
            round_started: self.round_started,
            next_climber_requested: self.next_climber_requested,
            manual_round_selected: self.manual_round_selected,
        }
    }

    pub fn full_snapshot(&self) -> FullSnapshot {
        FullSnapshot {
            state: self.snapshot(),
            assignment: self.ondeck.clone(),
            settings: self.settings.clone(),
            groups: self.roster.groups(),
            roster: self.roster.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round_index(&self) -> i64 {
        self.round_index
    }

    pub fn settings(&self) -> &RoundSettings {
        &self.settings
    }

    pub fn ondeck(&self) -> &OndeckAssignment {
        &self.ondeck
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Number of clocks currently counting. Never more than one.
    pub fn running_clocks(&self) -> usize {
        usize::from(self.stage_clock.is_running()) + usize::from(self.turnover_clock.is_running())
    }
}

impl Drop for CompetitionEngine {
    fn drop(&mut self) {
        self.halt_clocks();
    }
}
