use anyhow::{Context, Result};
use colored::Colorize;
use compclock::prelude::*;
use compclock::{ENGINE_NAME, VERSION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Usage: `compclock [config.toml] [rosters.json]`
///
/// The roster file holds a JSON array of uploads, one per category:
/// `[{"category": 1, "group_name": "Open", "athletes": [{"id": "..", ...}]}]`.
#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load the configuration.
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let roster_path = args.next().map(PathBuf::from);
    let config = CompetitionConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    // 2. Initialize structured logging, mirrored to the log file.
    compclock::logging::init_tracing(&config.log_file);

    println!("{} v{}", ENGINE_NAME.cyan().bold(), VERSION);

    // 3. Spawn the engine with the file-backed ports.
    let (engine, task) = compclock::runtime::spawn(
        &config,
        BroadcastHub::default(),
        Arc::new(FileStatusSink::new(&config.status_file, &config.backup_file)),
        Arc::new(SystemCuePlayer::detect(&config.sounds_dir)),
    );
    spawn_event_listener(&engine);

    // 4. Load rosters and put the round at its start.
    if let Some(path) = roster_path {
        load_rosters(&engine, &path).await?;
    }
    engine.reset_round().await?;

    info!("{} running. Press Ctrl+C to shut down.", ENGINE_NAME.cyan());
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received.");
    engine.shutdown().await?;
    task.await?;
    info!("{} has shut down.", ENGINE_NAME);
    Ok(())
}

/// Logs every broadcast event. Clock ticks only show at debug level.
fn spawn_event_listener(engine: &CompetitionHandle) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                CompetitionEvent::TimerTick { .. } => debug!("[EVENT] {:?}", event),
                CompetitionEvent::OndeckUpdate(update) => info!(
                    "[EVENT] {} => round {} ({})",
                    event.name(),
                    update.round_index,
                    update.round_name
                ),
                _ => info!("[EVENT] {} => {:?}", event.name(), event),
            }
        }
    });
}

async fn load_rosters(engine: &CompetitionHandle, path: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read roster file {}", path.display()))?;
    let uploads: Vec<AthleteUpload> =
        serde_json::from_str(&text).with_context(|| format!("invalid roster file {}", path.display()))?;
    for upload in uploads {
        let category = upload.category;
        match engine.upload_athletes(upload).await {
            Ok(message) => info!("Category {}: {}", category, message),
            Err(err) => warn!("Category {} not loaded: {}", category, err),
        }
    }
    Ok(())
}
