pub mod bell;
#[cfg(feature = "sound")]
pub mod engine;
#[cfg(feature = "sound")]
pub mod tone;

use std::sync::Arc;

use crate::settings::StageSounds;

pub use bell::TerminalBell;
#[cfg(feature = "sound")]
pub use engine::AudioEngineHandle;

/// Plays escalating focus alerts. Failures are logged by implementations, never returned.
pub trait AlertPlayer: Send + Sync {
    /// Installs the stage → sound file mapping used by later `play` calls.
    fn configure(&self, _sounds: &StageSounds) {}

    /// Starts looping the sound for `stage` on top of anything already playing.
    fn play(&self, stage: u8);

    fn stop_all(&self);
}

#[cfg(feature = "sound")]
pub fn default_player() -> Arc<dyn AlertPlayer> {
    Arc::new(AudioEngineHandle::new())
}

#[cfg(not(feature = "sound"))]
pub fn default_player() -> Arc<dyn AlertPlayer> {
    Arc::new(TerminalBell::new())
}
