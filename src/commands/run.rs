use std::io::{self, Write};

use anyhow::{bail, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::{RecvError, TryRecvError},
};

use crate::{
    settings::{PathStatus, Settings, SettingsStore},
    timer::{Collaborators, CycleController, CycleEvent, CycleSnapshot, CycleStatus},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

const STATUS_WIDTH: usize = 64;

/// Runs one cycle in the foreground, reading `p`/`r`/`s`/`q` from stdin.
pub async fn run(store: &SettingsStore, collaborators: Collaborators) -> Result<()> {
    let settings = store.snapshot();
    ensure_apps_configured(&settings)?;
    for check in settings.check_paths() {
        if check.status == PathStatus::Missing {
            log_warn!("{} path not found: {}", check.label, check.path);
        }
    }

    let controller = CycleController::new(collaborators);
    let mut events = controller.subscribe_events();
    let mut snapshots = controller.subscribe_snapshots();

    controller.start(&settings).await?;
    println!("Cycle started. Commands: p = pause, r = resume, s/q = stop");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut interrupted = false;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.status.is_active() {
                    break;
                }
                render_status(&snapshot);
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => log_warn!("Skipped {} cycle events", skipped),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_command(&controller, line.trim()).await?,
                Ok(None) => stdin_open = false,
                Err(err) => {
                    log_warn!("Stopped reading commands: {}", err);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                controller.stop().await?;
            }
        }
    }

    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    let finished = controller.get_snapshot().await;
    if finished.status == CycleStatus::Idle {
        println!("Cycle stopped.");
    }
    Ok(())
}

/// Refuses to start a cycle that has no game or study application to launch.
fn ensure_apps_configured(settings: &Settings) -> Result<()> {
    let unset: Vec<&str> = settings
        .check_paths()
        .into_iter()
        .filter(|check| check.status == PathStatus::NotConfigured)
        .map(|check| check.label)
        .collect();

    if !unset.is_empty() {
        bail!(
            "Please configure application paths first (no {} path set; try `pomoguard config set {}_path <path>`)",
            unset.join(" or "),
            if unset[0] == "game" { "game" } else { "study_app" }
        );
    }
    Ok(())
}

async fn handle_command(controller: &CycleController, command: &str) -> Result<()> {
    let outcome = match command {
        "" => return Ok(()),
        "p" | "pause" => controller.pause().await,
        "r" | "resume" => controller.resume().await,
        "s" | "q" | "stop" | "quit" => {
            controller.stop().await?;
            return Ok(());
        }
        other => {
            clear_status();
            println!("unknown command '{other}' (p, r, s, q)");
            return Ok(());
        }
    };

    if let Err(err) = outcome {
        clear_status();
        println!("{err}");
    }
    Ok(())
}

fn render_status(snapshot: &CycleSnapshot) {
    let line = status_line(snapshot);
    print!("\r{:<width$}", line, width = STATUS_WIDTH);
    let _ = io::stdout().flush();
}

fn clear_status() {
    print!("\r{:width$}\r", "", width = STATUS_WIDTH);
}

fn print_event(event: &CycleEvent) {
    if let Some(text) = describe_event(event) {
        clear_status();
        println!("{text}");
    }
}

fn status_line(snapshot: &CycleSnapshot) -> String {
    let label = snapshot.phase_label.as_deref().unwrap_or("-");
    let mut line = format!(
        "[{}/{}] {}  {}",
        snapshot.phase_index + 1,
        snapshot.phase_count,
        label,
        format_clock(snapshot.phase_remaining_secs)
    );
    if snapshot.status == CycleStatus::Paused {
        line.push_str("  (paused)");
    } else if snapshot.alert_stage > 0 || snapshot.focus_lost_secs > 0 {
        line.push_str(&format!(
            "  away {}s, alert {}",
            snapshot.focus_lost_secs, snapshot.alert_stage
        ));
    }
    line
}

fn describe_event(event: &CycleEvent) -> Option<String> {
    let text = match event {
        CycleEvent::PhaseStarted {
            label,
            duration_secs,
            ..
        } => format!("== {label} ({})", format_clock(*duration_secs)),
        CycleEvent::LaunchSucceeded {
            path,
            pid,
            already_running: true,
        } => format!("   {path} already running (pid {pid})"),
        CycleEvent::LaunchSucceeded { path, pid, .. } => format!("   launched {path} (pid {pid})"),
        CycleEvent::LaunchFailed { path, reason } if path.is_empty() => {
            format!("   no app configured: {reason}")
        }
        CycleEvent::LaunchFailed { path, reason } => format!("   could not launch {path}: {reason}"),
        CycleEvent::StageEscalated { stage } => format!("!! get back to work (alert stage {stage})"),
        CycleEvent::FocusRegained => "   back on track".to_string(),
        CycleEvent::Paused => "   paused".to_string(),
        CycleEvent::Resumed => "   resumed".to_string(),
        CycleEvent::Completed => "All cycles complete!".to_string(),
        CycleEvent::Cancelled => return None,
    };
    Some(text)
}

/// `MM:SS`; minutes are not wrapped into hours.
fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
