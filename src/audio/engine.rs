use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Sender},
        Arc, Mutex, PoisonError,
    },
    thread,
};

use crate::error::SoundError;
use crate::settings::{StageSounds, MAX_ALERT_STAGE};

use super::{tone::AlarmTone, AlertPlayer, TerminalBell};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

enum AudioCommand {
    Play { stage: u8, sound: Option<PathBuf> },
    StopAll,
}

/// Handle to the dedicated audio thread; cheap to share across tasks.
pub struct AudioEngineHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    sounds: Mutex<StageSounds>,
}

impl AudioEngineHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            sounds: Mutex::new(StageSounds::default()),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, SoundError> {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        // Spawn dedicated audio thread holding non-Send audio objects
        thread::Builder::new()
            .name("alert-audio".to_string())
            .spawn(move || {
                let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
                let mut sinks: Vec<Sink> = Vec::new();
                let bell = TerminalBell::new();

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play { stage, sound } => {
                            if output.is_none() {
                                match OutputStream::try_default() {
                                    Ok(pair) => output = Some(pair),
                                    Err(e) => {
                                        log_error!("Failed to create audio output stream: {}", e);
                                    }
                                }
                            }

                            let Some((_, handle)) = output.as_ref() else {
                                bell.play(stage);
                                continue;
                            };

                            let sink = match Sink::try_new(handle) {
                                Ok(sink) => sink,
                                Err(e) => {
                                    log_error!("Failed to create audio sink: {}", e);
                                    bell.play(stage);
                                    continue;
                                }
                            };

                            match sound.as_deref().map(open_looping) {
                                Some(Ok(source)) => sink.append(source),
                                Some(Err(e)) => {
                                    log_warn!("{}; using fallback tone for stage {}", e, stage);
                                    sink.append(AlarmTone::new(stage));
                                }
                                None => sink.append(AlarmTone::new(stage)),
                            }

                            sinks.push(sink);
                        }
                        AudioCommand::StopAll => {
                            if !sinks.is_empty() {
                                log_info!("Stopping {} alert sound(s)", sinks.len());
                            }
                            for sink in sinks.drain(..) {
                                sink.stop();
                            }
                            bell.stop_all();
                        }
                    }
                }
            })
            .map_err(|e| SoundError::Output(e.to_string()))?;

        let tx_clone = tx.clone();
        *guard = Some(tx);
        Ok(tx_clone)
    }

    fn send(&self, cmd: AudioCommand) -> Result<(), SoundError> {
        let tx = self.ensure_thread()?;
        tx.send(cmd).map_err(|e| SoundError::Output(e.to_string()))
    }
}

impl Default for AudioEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertPlayer for AudioEngineHandle {
    fn configure(&self, sounds: &StageSounds) {
        *self.sounds.lock().unwrap_or_else(PoisonError::into_inner) = sounds.clone();
    }

    fn play(&self, stage: u8) {
        let stage = stage.min(MAX_ALERT_STAGE);
        let sound = self.sounds.lock().unwrap_or_else(PoisonError::into_inner)[stage as usize].clone();
        if let Err(e) = self.send(AudioCommand::Play { stage, sound }) {
            log_error!("Failed to play alert stage {}: {}", stage, e);
        }
    }

    fn stop_all(&self) {
        // Nothing can be playing if the thread was never started.
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(tx) = tx {
            let _ = tx.send(AudioCommand::StopAll);
        }
    }
}

fn open_looping(path: &Path) -> Result<impl Source<Item = i16> + Send + 'static, SoundError> {
    let file = File::open(path).map_err(|source| SoundError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| SoundError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(decoder.repeat_infinite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_looping_reports_missing_and_garbage_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        assert!(matches!(open_looping(&missing), Err(SoundError::Open { .. })));

        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"definitely not audio").unwrap();
        assert!(matches!(open_looping(&garbage), Err(SoundError::Decode { .. })));
    }

    #[test]
    fn stop_without_playback_does_not_start_audio() {
        let handle = AudioEngineHandle::new();
        handle.stop_all();
        assert!(handle.tx.lock().unwrap().is_none());
    }
}
