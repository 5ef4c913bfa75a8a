use anyhow::{bail, Result};

use crate::{
    cli::ConfigAction,
    settings::{PathCheck, PathStatus, Settings, SettingsStore},
    timer::{build_schedule, Phase},
};

pub fn run(store: &SettingsStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let settings = store.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print!("{}", settings.to_toml_string()?);
            }
        }
        ConfigAction::Set { key, value } => {
            store.update(|settings| settings.set(&key, &value))?;
            println!("{key} = {value}");
        }
        ConfigAction::Path => println!("{}", store.path().display()),
        ConfigAction::Check => {
            let checks = store.snapshot().check_paths();
            for check in &checks {
                println!("{}", describe_check(check));
            }
            let missing = checks
                .iter()
                .filter(|c| c.status == PathStatus::Missing)
                .count();
            if missing > 0 {
                bail!("{missing} configured path(s) could not be found");
            }
        }
    }
    Ok(())
}

pub fn print_schedule(settings: &Settings, json: bool) -> Result<()> {
    let schedule = build_schedule(settings);
    if json {
        println!("{}", serde_json::to_string_pretty(&schedule)?);
        return Ok(());
    }

    for (index, phase) in schedule.iter().enumerate() {
        println!("{}", describe_phase(index, phase));
    }
    let total: u64 = schedule.iter().map(|p| p.duration_secs).sum();
    println!("total: {} min", total / 60);
    Ok(())
}

fn describe_check(check: &PathCheck) -> String {
    let status = match check.status {
        PathStatus::NotConfigured => "not configured",
        PathStatus::Found => "ok",
        PathStatus::Missing => "MISSING",
    };
    if check.path.is_empty() {
        format!("{:<8} {}", check.label, status)
    } else {
        format!("{:<8} {:<15} {}", check.label, status, check.path)
    }
}

fn describe_phase(index: usize, phase: &Phase) -> String {
    let target = if phase.is_enforced() {
        format!("\"{}\"", phase.target_title)
    } else {
        "(not enforced)".to_string()
    };
    let app = if phase.app_path.is_empty() {
        "(no app)"
    } else {
        phase.app_path.as_str()
    };
    format!(
        "{}. {:<20} {:>3} min  {}  {}",
        index + 1,
        phase.label(),
        phase.duration_secs / 60,
        target,
        app
    )
}
