use anyhow::Result;
use colored::Colorize;
use compclock::prelude::*;
use compclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", format!("  {} operator console", ENGINE_NAME).cyan().bold());
    println!("{}", "-".repeat(64).dimmed());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";
    println!("{}", license_blurb.dimmed());
    println!("{}", "-".repeat(64).dimmed());
}

/// Prints engine events as they arrive. Clock ticks are gated by the shared flag.
fn spawn_event_listener(engine: &CompetitionHandle, is_watching_ticks: Arc<AtomicBool>) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                CompetitionEvent::TimerTick {
                    remaining_stage_seconds,
                    remaining_turnover_seconds,
                } => {
                    if is_watching_ticks.load(Ordering::Relaxed) {
                        println!(
                            "<-- [TICK] stage {}s / turnover {}s",
                            remaining_stage_seconds, remaining_turnover_seconds
                        );
                    }
                }
                CompetitionEvent::OndeckUpdate(update) => {
                    println!(
                        "\n<-- [{}] round {} {}",
                        event.name().cyan(),
                        update.round_index,
                        update.round_name
                    );
                    print_assignment(&update.assignment, &update.groups);
                }
                CompetitionEvent::SettingsChanged { settings } => {
                    println!("\n<-- [{}] {:?}", event.name().cyan(), settings);
                }
                _ => println!("\n<-- [{}] {:?}", event.name().cyan(), event),
            }
        }
    });
}

fn print_assignment(assignment: &OndeckAssignment, groups: &compclock::common::Groups) {
    for (category, slots) in assignment.iter() {
        if slots.iter().all(|slot| slot.athlete.is_none()) {
            continue;
        }
        println!("    {} {}", format!("[{}]", category).bold(), groups[category]);
        for slot in slots {
            match &slot.athlete {
                Some(athlete) => println!("      boulder {:>2}: {}", slot.boulder, athlete),
                None => println!("      boulder {:>2}: {}", slot.boulder, "-".dimmed()),
            }
        }
    }
}

async fn print_status(engine: &CompetitionHandle) -> Result<()> {
    let snapshot = engine.snapshot().await?;
    let state = &snapshot.state;
    println!("Round:     {} (index {})", state.round_name, state.round_index);
    println!("Phase:     {:?}", state.phase);
    println!(
        "Clocks:    stage {}s, turnover {}s",
        state.remaining_stage_time, state.remaining_turnover_time
    );
    println!(
        "Flags:     started={} next_climber={} manual={}",
        state.round_started, state.next_climber_requested, state.manual_round_selected
    );
    println!("Settings:  {:?}", snapshot.settings);
    print_assignment(&snapshot.assignment, &snapshot.groups);
    Ok(())
}

/// Parses `set <field> <value>` into a settings patch.
fn parse_setting(field: &str, value: &str) -> Option<SettingsPatch> {
    let mut patch = SettingsPatch::default();
    match field {
        "timer" | "timer_mode" => patch.timer_mode = Some(value.parse().ok()?),
        "turnover" => patch.turnover = Some(value.parse().ok()?),
        "boulders" => patch.boulders = Some(value.parse().ok()?),
        "zones" => patch.zones = Some(value.parse().ok()?),
        "finals" | "finals_mode" => patch.finals_mode = Some(parse_flag(value)?),
        "lead" | "lead_mode" => patch.lead_mode = Some(parse_flag(value)?),
        "climbers" | "finals_climbers" => patch.finals_climbers = Some(value.parse().ok()?),
        _ => return None,
    }
    Some(patch)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Reads a roster from `path`: a JSON array of `{id, first_name, last_name}`.
async fn read_roster(path: &str) -> Result<Vec<AthleteRecord>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

fn report<T>(result: compclock::error::Result<T>, ok: impl FnOnce(T) -> String) {
    match result {
        Ok(value) => println!("--> {}", ok(value)),
        Err(err) => println!("{} {}", "Error:".red().bold(), err),
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  start                      - Starts the round or resumes the paused clock.");
    println!("  pause                      - Pauses the running clock.");
    println!("  zero                       - Reloads the current clock to its full duration.");
    println!("  next                       - Skips to the next climber and waits.");
    println!("  begin                      - Ends a lead observation and starts climbing.");
    println!("  reset                      - Resets the entire round.");
    println!("  name <TEXT>                - Sets the round name.");
    println!("  group <CAT> <TEXT>         - Sets the group name of category 1-3.");
    println!("  upload <CAT> <FILE> <NAME> - Loads a category roster from a JSON file.");
    println!("  clear                      - Clears every roster.");
    println!("  place <ID> [BOULDER] [SEC] - Jumps to an athlete's turn on a boulder.");
    println!("  stage <N> [SEC]            - Jumps to stage N (negative backs up).");
    println!("  set <FIELD> <VALUE>        - timer, turnover, boulders, zones, finals, lead, climbers.");
    println!("  status                     - Shows the round state.");
    println!("  watch ticks on|off         - Toggles printing of clock ticks.");
    println!("  exit                       - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    let config_path = env::args().nth(1);
    let config = CompetitionConfig::load(config_path.as_deref().map(std::path::Path::new))?;
    compclock::logging::init_tracing(&config.log_file);

    let (engine, engine_task) = compclock::runtime::spawn(
        &config,
        BroadcastHub::default(),
        Arc::new(FileStatusSink::new(&config.status_file, &config.backup_file)),
        Arc::new(SystemCuePlayer::detect(&config.sounds_dir)),
    );

    // Create the shared flag for the tick listener.
    let is_watching_ticks = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&engine, is_watching_ticks.clone());
    info!("Spawned {} in the background.", ENGINE_NAME.cyan());

    let mut rl = Editor::new()?;
    rl.set_helper(Some(MyHighlighter {}));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "start" => engine.start_timer().await?,
                        "pause" => engine.pause_timer().await?,
                        "zero" => engine.zero_timer().await?,
                        "next" => engine.next_climber().await?,
                        "begin" => engine.begin_climbing().await?,
                        "reset" => engine.reset_round().await?,
                        "name" => engine.update_round_name(args[1..].join(" ")).await?,
                        "group" => match args.get(1).and_then(|cat| cat.parse::<u8>().ok()) {
                            Some(category) => {
                                engine
                                    .update_group_name(category, args[2..].join(" "))
                                    .await?
                            }
                            None => println!("Usage: group <CAT> <TEXT>"),
                        },
                        "upload" => {
                            let category = args.get(1).and_then(|cat| cat.parse::<u8>().ok());
                            match (category, args.get(2)) {
                                (Some(category), Some(path)) => match read_roster(path).await {
                                    Ok(athletes) => {
                                        let upload = AthleteUpload {
                                            category,
                                            athletes,
                                            group_name: args[3..].join(" "),
                                        };
                                        report(engine.upload_athletes(upload).await, |msg| msg);
                                    }
                                    Err(err) => println!("Error: could not read '{}': {}", path, err),
                                },
                                _ => println!("Usage: upload <CAT> <FILE> <NAME>"),
                            }
                        }
                        "clear" => report(engine.clear_roster().await, |msg| msg),
                        "place" => match args.get(1) {
                            Some(athlete_id) => {
                                let change = RoundChange {
                                    athlete_id: Some(athlete_id.to_string()),
                                    boulder: args.get(2).and_then(|b| b.parse().ok()),
                                    seed_time: args.get(3).and_then(|s| s.parse().ok()),
                                    ..Default::default()
                                };
                                report(engine.change_round_state(change).await, |_| {
                                    format!("Placed athlete {}.", athlete_id)
                                });
                            }
                            None => println!("Usage: place <ID> [BOULDER] [SEC]"),
                        },
                        "stage" => match args.get(1).and_then(|s| s.parse::<i64>().ok()) {
                            Some(stage) => {
                                let change = RoundChange {
                                    stage: Some(stage),
                                    seed_time: args.get(2).and_then(|s| s.parse().ok()),
                                    ..Default::default()
                                };
                                report(engine.change_round_state(change).await, |_| {
                                    format!("Moved to stage {}.", stage)
                                });
                            }
                            None => println!("Usage: stage <N> [SEC]"),
                        },
                        "set" => match (args.get(1), args.get(2)) {
                            (Some(field), Some(value)) => match parse_setting(field, value) {
                                Some(patch) => engine.update_settings(patch).await?,
                                None => println!("Error: cannot set '{}' to '{}'.", field, value),
                            },
                            _ => println!("Usage: set <FIELD> <VALUE>"),
                        },
                        "status" => print_status(&engine).await?,
                        "watch" => match (args.get(1), args.get(2).and_then(|v| parse_flag(v))) {
                            (Some(&"ticks"), Some(on)) => {
                                is_watching_ticks.store(on, Ordering::Relaxed);
                                println!("--> Tick printing {}.", if on { "on" } else { "off" });
                            }
                            _ => println!("Usage: watch ticks on|off"),
                        },
                        "help" => print_help(),
                        "exit" => break,
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting compshell...");
                break;
            }
        }
    }

    engine.shutdown().await?;
    engine_task.await?;
    Ok(())
}
