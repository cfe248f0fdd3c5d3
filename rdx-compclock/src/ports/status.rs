//! File-backed status line and state backup.

use super::{StateBackup, StatusSink};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Logs the first failure of a sustained outage and stays quiet until a write
/// succeeds again.
#[derive(Debug, Clone, Default)]
pub struct FailureLatch {
    latched: Arc<AtomicBool>,
}

impl FailureLatch {
    pub fn record(&self, what: &str, result: io::Result<()>) {
        match result {
            Ok(()) => {
                if self.latched.swap(false, Ordering::AcqRel) {
                    info!("{} write recovered", what);
                }
            }
            Err(err) => {
                if !self.latched.swap(true, Ordering::AcqRel) {
                    error!("{} write failed: {}", what, err);
                }
            }
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }
}

/// Owns one file and writes whatever value is newest, one write at a time.
///
/// Values queue through a `watch` channel, so a burst of updates collapses
/// to the latest one and the file can never end on an older value.
#[derive(Debug)]
struct LatestValueWriter {
    path: PathBuf,
    what: &'static str,
    latch: FailureLatch,
    sender: Mutex<Option<watch::Sender<String>>>,
}

impl LatestValueWriter {
    fn new(path: PathBuf, what: &'static str) -> Self {
        Self {
            path,
            what,
            latch: FailureLatch::default(),
            sender: Mutex::new(None),
        }
    }

    fn submit(&self, contents: String) {
        let Ok(mut sender) = self.sender.lock() else {
            return;
        };
        if let Some(tx) = sender.as_ref() {
            match tx.send(contents) {
                Ok(()) => return,
                // the writer went away with its runtime
                Err(watch::error::SendError(contents)) => {
                    *sender = None;
                    self.start_writer(&mut sender, contents);
                }
            }
        } else {
            self.start_writer(&mut sender, contents);
        }
    }

    fn start_writer(&self, slot: &mut Option<watch::Sender<String>>, contents: String) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("no runtime; skipping {} write", self.what);
                return;
            }
        };
        let (tx, mut rx) = watch::channel(contents);
        let path = self.path.clone();
        let latch = self.latch.clone();
        let what = self.what;
        handle.spawn(async move {
            loop {
                let contents = rx.borrow_and_update().clone();
                let result = tokio::fs::write(&path, contents).await;
                latch.record(what, result);
                if rx.changed().await.is_err() {
                    break;
                }
            }
            debug!("{} writer stopped", what);
        });
        *slot = Some(tx);
    }
}

/// Writes the status line and backup to files from background tasks, one
/// long-lived writer per file.
#[derive(Debug, Clone)]
pub struct FileStatusSink {
    status: Arc<LatestValueWriter>,
    backup: Arc<LatestValueWriter>,
}

impl FileStatusSink {
    pub fn new(status_path: impl Into<PathBuf>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            status: Arc::new(LatestValueWriter::new(status_path.into(), "Timer file")),
            backup: Arc::new(LatestValueWriter::new(backup_path.into(), "State backup")),
        }
    }

    /// Whether the status file is currently failing.
    pub fn status_failing(&self) -> bool {
        self.status.latch.is_latched()
    }
}

impl StatusSink for FileStatusSink {
    fn write_status(&self, line: String) {
        self.status.submit(line);
    }

    fn save_backup(&self, backup: StateBackup) {
        match serde_json::to_string(&backup) {
            Ok(json) => self.backup.submit(json),
            Err(err) => error!("Failed to serialize state backup: {}", err),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn write_status(&self, _line: String) {}
    fn save_backup(&self, _backup: StateBackup) {}
}

/// Formats seconds as `MM:SS`.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn format_clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(300), "05:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(3725), "62:05");
    }

    #[test]
    fn latch_sets_on_failure_and_clears_on_success() {
        let latch = FailureLatch::default();
        latch.record("test", Err(io::Error::new(io::ErrorKind::Other, "disk gone")));
        assert!(latch.is_latched());
        latch.record("test", Err(io::Error::new(io::ErrorKind::Other, "still gone")));
        assert!(latch.is_latched());
        latch.record("test", Ok(()));
        assert!(!latch.is_latched());
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn writes_status_line_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileStatusSink::new(dir.path().join("timer.txt"), dir.path().join("backup.json"));

        sink.write_status("stage3/04:59".to_string());
        sink.save_backup(StateBackup {
            round_name: "Qualifier".to_string(),
            round_index: 3,
            remaining_stage_seconds: 299,
            saved_at: chrono::Utc::now(),
        });
        settle().await;

        let line = std::fs::read_to_string(dir.path().join("timer.txt")).unwrap();
        assert_eq!(line, "stage3/04:59");
        let backup: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("backup.json")).unwrap()).unwrap();
        assert_eq!(backup["round_index"], 3);
        assert_eq!(backup["round_name"], "Qualifier");
    }

    #[tokio::test]
    async fn failing_path_latches_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing-dir").join("timer.txt");
        let sink = FileStatusSink::new(&missing, dir.path().join("backup.json"));

        sink.write_status("transit1/00:05".to_string());
        settle().await;
        assert!(sink.status_failing());

        std::fs::create_dir_all(missing.parent().unwrap()).unwrap();
        sink.write_status("transit1/00:04".to_string());
        settle().await;
        assert!(!sink.status_failing());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_of_writes_leaves_the_newest_value() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileStatusSink::new(dir.path().join("timer.txt"), dir.path().join("backup.json"));

        for index in 0..400 {
            sink.write_status(format!("stage{}/05:00", index));
            sink.save_backup(StateBackup {
                round_name: "Final".to_string(),
                round_index: index,
                remaining_stage_seconds: 300,
                saved_at: chrono::Utc::now(),
            });
        }
        settle().await;

        let line = std::fs::read_to_string(dir.path().join("timer.txt")).unwrap();
        assert_eq!(line, "stage399/05:00");
        let backup: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("backup.json")).unwrap()).unwrap();
        assert_eq!(backup["round_index"], 399);
    }

    #[test]
    fn without_runtime_writes_are_skipped() {
        let sink = FileStatusSink::new("/nonexistent/timer.txt", "/nonexistent/backup.json");
        sink.write_status("stage1/05:00".to_string());
        assert!(!sink.status_failing());
    }
}
