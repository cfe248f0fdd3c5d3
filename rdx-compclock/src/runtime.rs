//! Runs a `CompetitionEngine` on its own task and hands out cloneable handles.
//!
//! Operator commands and clock ticks arrive on two channels and are applied one
//! at a time by a single loop, so a pause can never interleave with a tick that
//! was already being applied. Commands are polled first.

use crate::components::clock::ClockTick;
use crate::components::roster::AthleteUpload;
use crate::config::{CompetitionConfig, SettingsPatch};
use crate::engine::{CompetitionEngine, FullSnapshot, RoundChange};
use crate::error::{CompetitionError, Result};
use crate::events::CompetitionEvent;
use crate::ports::{BroadcastHub, CuePlayer, Ports, StatusSink};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const COMMAND_CAPACITY: usize = 64;

/// Everything an operator surface can ask of the engine.
#[derive(Debug)]
pub enum Command {
    StartTimer,
    PauseTimer,
    ZeroTimer,
    NextClimber,
    BeginClimbing,
    ResetRound,
    UpdateRoundName(String),
    UpdateGroupName {
        category: u8,
        name: String,
    },
    UploadAthletes {
        upload: AthleteUpload,
        reply: oneshot::Sender<Result<String>>,
    },
    ClearRoster {
        reply: oneshot::Sender<String>,
    },
    ChangeRoundState {
        change: RoundChange,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateSettings(SettingsPatch),
    Snapshot {
        reply: oneshot::Sender<FullSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A cloneable handle to a running engine.
#[derive(Clone)]
pub struct CompetitionHandle {
    commands: mpsc::Sender<Command>,
    hub: BroadcastHub,
}

/// Spawns the engine loop on the current runtime.
///
/// Events go out through `hub`; subscribe before sending commands to see
/// everything.
pub fn spawn(
    config: &CompetitionConfig,
    hub: BroadcastHub,
    status: Arc<dyn StatusSink>,
    cues: Arc<dyn CuePlayer>,
) -> (CompetitionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (tick_tx, tick_rx) = mpsc::unbounded_channel();
    let ports = Ports {
        broadcast: Arc::new(hub.clone()),
        status,
        cues,
    };
    let engine = CompetitionEngine::new(config, ports, Some(tick_tx));
    let task = tokio::spawn(event_loop(engine, command_rx, tick_rx));
    let handle = CompetitionHandle {
        commands: command_tx,
        hub,
    };
    (handle, task)
}

async fn event_loop(
    mut engine: CompetitionEngine,
    mut commands: mpsc::Receiver<Command>,
    mut ticks: mpsc::UnboundedReceiver<ClockTick>,
) {
    info!("Competition engine loop running.");
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    engine.shutdown();
                    reply.send(()).ok();
                    break;
                }
                Some(command) => dispatch(&mut engine, command),
                None => {
                    debug!("All handles dropped.");
                    engine.shutdown();
                    break;
                }
            },
            Some(tick) = ticks.recv() => engine.on_clock_tick(tick),
        }
    }
    info!("Competition engine loop has shut down.");
}

fn dispatch(engine: &mut CompetitionEngine, command: Command) {
    match command {
        Command::StartTimer => engine.start_timer(),
        Command::PauseTimer => engine.pause_timer(),
        Command::ZeroTimer => engine.zero_timer(),
        Command::NextClimber => engine.next_climber(),
        Command::BeginClimbing => engine.begin_climbing(),
        Command::ResetRound => engine.reset_round(),
        Command::UpdateRoundName(name) => engine.update_round_name(name),
        Command::UpdateGroupName { category, name } => {
            if let Err(err) = engine.update_group_name(category, name) {
                debug!("group name update dropped: {}", err);
            }
        }
        Command::UploadAthletes { upload, reply } => {
            reply.send(engine.handle_athlete_upload(upload)).ok();
        }
        Command::ClearRoster { reply } => {
            reply.send(engine.clear_roster()).ok();
        }
        Command::ChangeRoundState { change, reply } => {
            reply.send(engine.change_round_state(change)).ok();
        }
        Command::UpdateSettings(patch) => engine.update_settings(patch),
        Command::Snapshot { reply } => {
            reply.send(engine.full_snapshot()).ok();
        }
        Command::Shutdown { reply } => {
            engine.shutdown();
            reply.send(()).ok();
        }
    }
}

impl CompetitionHandle {
    /// Subscribes to the engine's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CompetitionEvent> {
        self.hub.subscribe()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CompetitionError::EngineStopped)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| CompetitionError::EngineStopped)
    }

    pub async fn start_timer(&self) -> Result<()> {
        self.send(Command::StartTimer).await
    }

    pub async fn pause_timer(&self) -> Result<()> {
        self.send(Command::PauseTimer).await
    }

    pub async fn zero_timer(&self) -> Result<()> {
        self.send(Command::ZeroTimer).await
    }

    pub async fn next_climber(&self) -> Result<()> {
        self.send(Command::NextClimber).await
    }

    pub async fn begin_climbing(&self) -> Result<()> {
        self.send(Command::BeginClimbing).await
    }

    pub async fn reset_round(&self) -> Result<()> {
        self.send(Command::ResetRound).await
    }

    pub async fn update_round_name(&self, name: impl Into<String>) -> Result<()> {
        self.send(Command::UpdateRoundName(name.into())).await
    }

    pub async fn update_group_name(&self, category: u8, name: impl Into<String>) -> Result<()> {
        self.send(Command::UpdateGroupName {
            category,
            name: name.into(),
        })
        .await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<()> {
        self.send(Command::UpdateSettings(patch)).await
    }

    /// Uploads a category roster and returns the confirmation message.
    pub async fn upload_athletes(&self, upload: AthleteUpload) -> Result<String> {
        self.request(|reply| Command::UploadAthletes { upload, reply })
            .await?
    }

    pub async fn clear_roster(&self) -> Result<String> {
        self.request(|reply| Command::ClearRoster { reply }).await
    }

    pub async fn change_round_state(&self, change: RoundChange) -> Result<()> {
        self.request(|reply| Command::ChangeRoundState { change, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<FullSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Cancels both clocks and stops the loop. Later calls report
    /// [`CompetitionError::EngineStopped`].
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
