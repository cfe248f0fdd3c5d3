//! Defines all public event types broadcast by the competition engine.
//!
//! Every display surface (control panel, wall timer, transit roster, info
//! screen) subscribes to this one stream. Events are serialized as
//! `{"event": "<name>", "data": {...}}` so a transport can forward them as-is.

use crate::common::{Athlete, Groups, PerCategory};
use crate::config::RoundSettings;
use serde::{Deserialize, Serialize};

/// A boulder/route slot and whoever occupies it this round index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoulderSlot {
    /// 1-based boulder number.
    pub boulder: u32,
    pub athlete: Option<Athlete>,
}

/// Who is on which boulder, per category, for one round index.
pub type OndeckAssignment = PerCategory<Vec<BoulderSlot>>;

/// Payload of the `ondeck-update` notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OndeckUpdate {
    pub round_name: String,
    pub assignment: OndeckAssignment,
    pub round_index: i64,
    pub groups: Groups,
    pub manual_round_selected: bool,
}

/// Named state-change notifications fanned out to every display surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum CompetitionEvent {
    /// The round was started (`true`) or reset (`false`).
    RoundPhaseStarted { started: bool },
    /// A turnover countdown began.
    RoundTurnoverBegin,
    /// A climbing stage began.
    RoundStageBegin { groups: Groups, round_index: i64 },
    /// A climbing stage ended or the round was torn down.
    RoundStageEnd,
    /// One of the clocks changed.
    TimerTick {
        remaining_stage_seconds: u32,
        remaining_turnover_seconds: u32,
    },
    /// The on-deck assignment or its labels changed.
    OndeckUpdate(OndeckUpdate),
    /// Round settings changed.
    SettingsChanged { settings: RoundSettings },
    /// Surfaces with speakers should play this cue.
    PlayCue { cue_id: String },
    /// Surfaces should stop any cue that is playing.
    StopCue,
}

impl CompetitionEvent {
    /// The wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            CompetitionEvent::RoundPhaseStarted { .. } => "round-phase-started",
            CompetitionEvent::RoundTurnoverBegin => "round-turnover-begin",
            CompetitionEvent::RoundStageBegin { .. } => "round-stage-begin",
            CompetitionEvent::RoundStageEnd => "round-stage-end",
            CompetitionEvent::TimerTick { .. } => "timer-tick",
            CompetitionEvent::OndeckUpdate(_) => "ondeck-update",
            CompetitionEvent::SettingsChanged { .. } => "settings-changed",
            CompetitionEvent::PlayCue { .. } => "play-cue",
            CompetitionEvent::StopCue => "stop-cue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_under_their_wire_name() {
        let event = CompetitionEvent::TimerTick {
            remaining_stage_seconds: 240,
            remaining_turnover_seconds: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["remaining_stage_seconds"], 240);

        let json = serde_json::to_value(CompetitionEvent::StopCue).unwrap();
        assert_eq!(json["event"], "stop-cue");
    }
}
