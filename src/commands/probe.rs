use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{self, MissedTickBehavior};

use crate::{
    audio,
    sensing::{probe::query_active_title, SystemWindowInspector, WindowInspector, PROBE_TIMEOUT},
    settings::Settings,
};

const WATCH_INTERVAL: Duration = Duration::from_secs(1);

pub async fn window(watch: bool) -> Result<()> {
    if !watch {
        let title = query_active_title(PROBE_TIMEOUT).context("could not read the active window")?;
        println!("{title}");
        return Ok(());
    }

    let inspector = SystemWindowInspector::new();
    let mut interval = time::interval(WATCH_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<Option<String>> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let title = inspector.active_window_title();
                if last.as_ref() != Some(&title) {
                    println!("{}", title.as_deref().unwrap_or("(unknown)"));
                    last = Some(title);
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

pub async fn sound(settings: &Settings, stage: u8, secs: u64) -> Result<()> {
    let player = audio::default_player();
    player.configure(&settings.sounds.stage_sounds());

    let source = settings
        .sounds
        .stage(stage as usize)
        .unwrap_or("built-in alarm");
    println!("stage {stage}: {source} ({secs}s, Ctrl-C to stop early)");

    player.play(stage);
    tokio::select! {
        _ = time::sleep(Duration::from_secs(secs)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    player.stop_all();
    Ok(())
}
