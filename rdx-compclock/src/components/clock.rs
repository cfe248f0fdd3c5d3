//! The cancelable one-second countdown behind the stage and turnover timers.
//!
//! A [`RoundClock`] is a small state machine (`Idle`, `Running`, `Expired`,
//! `Cancelled`) plus an optional ticker task. The ticker never touches clock
//! state: it forwards [`ClockTick`]s into the engine's event loop, which hands
//! them back to [`RoundClock::on_tick`]. Every tick carries the generation it
//! was spawned for, and every start/cancel/expiry bumps the generation, so a
//! tick already in flight when the clock was cancelled is dropped.

use crate::common::ClockKind;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// One elapsed second, addressed to a specific clock run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub kind: ClockKind,
    pub generation: u64,
}

/// Lifecycle of a clock run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Running,
    Expired,
    Cancelled,
}

/// What a delivered tick did to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belonged to a cancelled or finished run and was dropped.
    Stale,
    /// One second was taken off; this many remain.
    Ticked(u32),
    /// The countdown reached zero. Signalled once per run.
    Expired,
    /// Observation clock reached zero and reloaded to this many seconds.
    Restarted(u32),
}

/// A second-resolution countdown that signals expiry exactly once.
pub struct RoundClock {
    kind: ClockKind,
    state: ClockState,
    remaining: u32,
    duration: u32,
    observation: Option<u32>,
    generation: u64,
    ticks: Option<mpsc::UnboundedSender<ClockTick>>,
    ticker: Option<JoinHandle<()>>,
}

impl RoundClock {
    /// Creates an idle clock.
    ///
    /// `duration` is the configured full length. When it equals `observation`
    /// the clock reloads itself on expiry instead of expiring. Without a
    /// `ticks` sender no ticker task is spawned and ticks must be delivered
    /// by hand.
    pub fn new(
        kind: ClockKind,
        duration: u32,
        observation: Option<u32>,
        ticks: Option<mpsc::UnboundedSender<ClockTick>>,
    ) -> Self {
        Self {
            kind,
            state: ClockState::Idle,
            remaining: duration,
            duration,
            observation,
            generation: 0,
            ticks,
            ticker: None,
        }
    }

    /// Starts counting down from `initial_seconds`.
    ///
    /// Starting a running clock restarts it. Keeping a second clock from
    /// running at the same time is the caller's job.
    pub fn start(&mut self, initial_seconds: u32) {
        self.stop_ticker();
        self.generation += 1;
        self.remaining = initial_seconds;
        self.state = ClockState::Running;
        if let Some(ticks) = &self.ticks {
            self.ticker = Some(spawn_ticker(self.kind, self.generation, ticks.clone()));
        }
        trace!("{:?} clock started at {}s (generation {})", self.kind, initial_seconds, self.generation);
    }

    /// Halts the clock, keeping the remaining time. Idempotent.
    pub fn cancel(&mut self) {
        self.stop_ticker();
        if matches!(self.state, ClockState::Running | ClockState::Idle) {
            self.state = ClockState::Cancelled;
            self.generation += 1;
        }
    }

    /// Applies one elapsed second.
    pub fn on_tick(&mut self, tick: ClockTick) -> TickOutcome {
        if self.state != ClockState::Running || tick.kind != self.kind || tick.generation != self.generation {
            return TickOutcome::Stale;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return TickOutcome::Ticked(self.remaining);
        }
        if self.duration > 0 && self.observation == Some(self.duration) {
            self.remaining = self.duration;
            return TickOutcome::Restarted(self.remaining);
        }
        self.stop_ticker();
        self.state = ClockState::Expired;
        self.generation += 1;
        TickOutcome::Expired
    }

    /// The tick the running clock expects next, if it is running.
    pub fn pending_tick(&self) -> Option<ClockTick> {
        (self.state == ClockState::Running).then_some(ClockTick {
            kind: self.kind,
            generation: self.generation,
        })
    }

    /// Overwrites the remaining time without changing the state.
    pub fn set_remaining(&mut self, seconds: u32) {
        self.remaining = seconds;
    }

    /// Updates the configured full length used by observation reloads.
    pub fn set_duration(&mut self, seconds: u32) {
        self.duration = seconds;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn kind(&self) -> ClockKind {
        self.kind
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for RoundClock {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// Spawns the task that forwards one tick per second until aborted or the
/// receiving loop goes away.
fn spawn_ticker(
    kind: ClockKind,
    generation: u64,
    ticks: mpsc::UnboundedSender<ClockTick>,
) -> JoinHandle<()> {
    let period = Duration::from_secs(1);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if ticks.send(ClockTick { kind, generation }).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(kind: ClockKind, duration: u32, observation: Option<u32>) -> RoundClock {
        RoundClock::new(kind, duration, observation, None)
    }

    fn tick(clock: &mut RoundClock) -> TickOutcome {
        let next = clock.pending_tick().unwrap_or(ClockTick {
            kind: clock.kind(),
            generation: u64::MAX,
        });
        clock.on_tick(next)
    }

    #[test]
    fn counts_down_and_expires_once() {
        let mut clock = manual(ClockKind::Turnover, 15, None);
        clock.start(3);
        assert_eq!(tick(&mut clock), TickOutcome::Ticked(2));
        assert_eq!(tick(&mut clock), TickOutcome::Ticked(1));
        assert_eq!(tick(&mut clock), TickOutcome::Expired);
        assert_eq!(clock.state(), ClockState::Expired);
        assert_eq!(clock.remaining(), 0);
        assert_eq!(tick(&mut clock), TickOutcome::Stale);
    }

    #[test]
    fn cancel_keeps_remaining_and_drops_in_flight_tick() {
        let mut clock = manual(ClockKind::Stage, 300, None);
        clock.start(300);
        let in_flight = clock.pending_tick().unwrap();
        clock.cancel();
        clock.cancel();
        assert_eq!(clock.state(), ClockState::Cancelled);
        assert_eq!(clock.on_tick(in_flight), TickOutcome::Stale);
        assert_eq!(clock.remaining(), 300);

        clock.start(clock.remaining());
        assert_eq!(clock.on_tick(in_flight), TickOutcome::Stale);
        assert_eq!(tick(&mut clock), TickOutcome::Ticked(299));
    }

    #[test]
    fn tick_for_other_clock_kind_is_ignored() {
        let mut clock = manual(ClockKind::Stage, 10, None);
        clock.start(10);
        let mut foreign = clock.pending_tick().unwrap();
        foreign.kind = ClockKind::Turnover;
        assert_eq!(clock.on_tick(foreign), TickOutcome::Stale);
        assert_eq!(clock.remaining(), 10);
    }

    #[test]
    fn observation_duration_reloads_forever() {
        let mut clock = manual(ClockKind::Stage, 120, Some(120));
        clock.start(2);
        assert_eq!(tick(&mut clock), TickOutcome::Ticked(1));
        assert_eq!(tick(&mut clock), TickOutcome::Restarted(120));
        assert!(clock.is_running());
        for _ in 0..119 {
            assert!(matches!(tick(&mut clock), TickOutcome::Ticked(_)));
        }
        assert_eq!(tick(&mut clock), TickOutcome::Restarted(120));
    }

    #[test]
    fn zero_start_expires_on_first_tick() {
        let mut clock = manual(ClockKind::Turnover, 0, None);
        clock.start(0);
        assert_eq!(tick(&mut clock), TickOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_delivers_one_tick_per_second() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = RoundClock::new(ClockKind::Turnover, 15, None, Some(tx));
        clock.start(3);

        let mut outcomes = Vec::new();
        let started = Instant::now();
        while let Some(tick) = rx.recv().await {
            let outcome = clock.on_tick(tick);
            outcomes.push(outcome);
            if outcome == TickOutcome::Expired {
                break;
            }
        }
        assert_eq!(
            outcomes,
            vec![TickOutcome::Ticked(2), TickOutcome::Ticked(1), TickOutcome::Expired]
        );
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_ticker_stops_sending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = RoundClock::new(ClockKind::Stage, 60, None, Some(tx));
        clock.start(60);
        let first = rx.recv().await.unwrap();
        assert_eq!(clock.on_tick(first), TickOutcome::Ticked(59));

        clock.cancel();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        while let Ok(late) = rx.try_recv() {
            assert_eq!(clock.on_tick(late), TickOutcome::Stale);
        }
        assert_eq!(clock.remaining(), 59);
    }
}
