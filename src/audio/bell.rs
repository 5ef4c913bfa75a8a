use log::warn;
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use super::AlertPlayer;

const RING_EVERY: Duration = Duration::from_secs(1);

/// Rings the terminal bell once a second per active stage until stopped.
#[derive(Clone, Default)]
pub struct TerminalBell {
    generation: Arc<AtomicU64>,
}

impl TerminalBell {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertPlayer for TerminalBell {
    fn play(&self, stage: u8) {
        let generation = Arc::clone(&self.generation);
        let started_in = generation.load(Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name(format!("bell-stage-{stage}"))
            .spawn(move || {
                while generation.load(Ordering::SeqCst) == started_in {
                    let mut stderr = io::stderr();
                    let _ = stderr.write_all(b"\x07");
                    let _ = stderr.flush();
                    thread::sleep(RING_EVERY);
                }
            });

        if let Err(err) = spawned {
            warn!("Failed to start bell for stage {}: {}", stage, err);
        }
    }

    fn stop_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
