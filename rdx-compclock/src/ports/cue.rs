//! Local audio playback of cues through whatever command-line player the
//! host has installed.

use super::CuePlayer;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Candidate players per platform, in order of preference, with the
/// arguments they need before the file path.
fn candidates() -> &'static [(&'static str, &'static [&'static str])] {
    if cfg!(target_os = "macos") {
        &[("afplay", &[]), ("mplayer", &["-really-quiet"]), ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]), ("vlc", &["--intf", "dummy", "--play-and-exit"])]
    } else if cfg!(target_os = "windows") {
        &[("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]), ("vlc", &["--intf", "dummy", "--play-and-exit"])]
    } else {
        &[
            ("mpg123", &["-q"]),
            ("mpg321", &["-q"]),
            ("mplayer", &["-really-quiet"]),
            ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
            ("vlc", &["--intf", "dummy", "--play-and-exit"]),
        ]
    }
}

/// A detected audio player command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PlayerCommand {
    /// Finds the first installed candidate player.
    pub fn detect() -> Option<Self> {
        let finder = if cfg!(target_os = "windows") { "where" } else { "which" };
        candidates().iter().find_map(|(program, args)| {
            let found = std::process::Command::new(finder)
                .arg(program)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            found.then(|| PlayerCommand {
                program: program.to_string(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
            })
        })
    }
}

enum CueCommand {
    Play(PathBuf),
    Stop,
}

/// Plays cues by spawning a system player; `stop` kills the cue in progress.
///
/// Spawning and killing happen on a worker task, so the engine only ever
/// queues a command.
pub struct SystemCuePlayer {
    player: Option<PlayerCommand>,
    base_dir: PathBuf,
    worker: Mutex<Option<mpsc::UnboundedSender<CueCommand>>>,
}

impl SystemCuePlayer {
    /// Detects a player once. Without one, cues are logged and skipped.
    pub fn detect(base_dir: impl Into<PathBuf>) -> Self {
        let player = PlayerCommand::detect();
        match &player {
            Some(player) => debug!("Using '{}' for audio cues", player.program),
            None => warn!("No audio player found on this system; cues will only be broadcast"),
        }
        Self::with_player(player, base_dir)
    }

    pub fn with_player(player: Option<PlayerCommand>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            player,
            base_dir: base_dir.into(),
            worker: Mutex::new(None),
        }
    }

    /// Resolves a cue path (as broadcast to surfaces) to a local file.
    pub fn resolve(&self, cue: &str) -> PathBuf {
        self.base_dir.join(Path::new(cue.trim_start_matches('/')))
    }

    fn send(&self, player: &PlayerCommand, command: CueCommand) {
        let Ok(mut worker) = self.worker.lock() else {
            return;
        };
        let command = match worker.as_ref() {
            Some(tx) => match tx.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(command)) => command,
            },
            None => command,
        };
        let Ok(handle) = Handle::try_current() else {
            debug!("no runtime; cue command dropped");
            return;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_player(player.clone(), rx));
        tx.send(command).ok();
        *worker = Some(tx);
    }
}

/// Owns the running player process. A new cue or a stop kills the previous
/// one; tokio reaps killed children in the background.
async fn run_player(player: PlayerCommand, mut commands: mpsc::UnboundedReceiver<CueCommand>) {
    let mut current: Option<Child> = None;
    while let Some(command) = commands.recv().await {
        if let Some(mut child) = current.take() {
            child.start_kill().ok();
        }
        let CueCommand::Play(file) = command else {
            continue;
        };
        let spawned = Command::new(&player.program)
            .args(&player.args)
            .arg(&file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => current = Some(child),
            Err(err) => error!("Could not play sound {}: {}", file.display(), err),
        }
    }
}

impl CuePlayer for SystemCuePlayer {
    fn play(&self, path: &str) {
        let Some(player) = &self.player else {
            debug!("Cue '{}' not played locally: no player", path);
            return;
        };
        self.send(player, CueCommand::Play(self.resolve(path)));
    }

    fn stop(&self) {
        if let Some(player) = &self.player {
            self.send(player, CueCommand::Stop);
        }
    }
}

/// Plays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCuePlayer;

impl CuePlayer for NullCuePlayer {
    fn play(&self, _path: &str) {}
    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_cue_against_base_dir() {
        let player = SystemCuePlayer::with_player(None, "/srv/comp/client");
        assert_eq!(
            player.resolve("/static/sounds/beep.mp3"),
            PathBuf::from("/srv/comp/client/static/sounds/beep.mp3")
        );
    }

    #[test]
    fn missing_player_is_not_fatal() {
        let player = SystemCuePlayer::with_player(None, ".");
        player.play("/static/sounds/beep.mp3");
        player.stop();
    }

    fn unspawnable() -> SystemCuePlayer {
        SystemCuePlayer::with_player(
            Some(PlayerCommand {
                program: "definitely-not-an-audio-player".to_string(),
                args: Vec::new(),
            }),
            ".",
        )
    }

    #[tokio::test]
    async fn unspawnable_player_is_logged_not_raised() {
        let player = unspawnable();
        player.play("/static/sounds/beep.mp3");
        player.stop();
        player.play("/static/sounds/go.mp3");
        tokio::task::yield_now().await;
        assert!(player.worker.lock().unwrap().is_some());
    }

    #[test]
    fn without_runtime_cues_are_dropped() {
        let player = unspawnable();
        player.play("/static/sounds/beep.mp3");
        player.stop();
        assert!(player.worker.lock().unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn a_new_cue_replaces_the_one_playing() {
        // `sleep` stands in for a long cue; the second play must not wait on it.
        let player = SystemCuePlayer::with_player(
            Some(PlayerCommand {
                program: "sleep".to_string(),
                args: Vec::new(),
            }),
            "",
        );
        let started = std::time::Instant::now();
        player.play("30");
        player.play("30");
        player.stop();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
