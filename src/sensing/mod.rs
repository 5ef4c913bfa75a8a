pub mod probe;

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Upper bound on a single probe; slower answers count as "unknown".
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(750);

/// Read-only probe for the title of the focused window.
pub trait WindowInspector: Send + Sync {
    /// `None` means the focus state is unknown, not that focus was lost.
    fn active_window_title(&self) -> Option<String>;
}

pub struct SystemWindowInspector {
    timeout: Duration,
    last_failure: Mutex<Option<String>>,
}

impl SystemWindowInspector {
    pub fn new() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
            last_failure: Mutex::new(None),
        }
    }
}

impl Default for SystemWindowInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowInspector for SystemWindowInspector {
    fn active_window_title(&self) -> Option<String> {
        let result = probe::query_active_title(self.timeout);
        let mut last_failure = self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match result {
            Ok(title) => {
                if last_failure.take().is_some() {
                    log_info!("Active window inspection recovered");
                }
                Some(title)
            }
            Err(err) => {
                let message = err.to_string();
                // Only report a failure when it changes, the probe runs every tick.
                if last_failure.as_deref() != Some(message.as_str()) {
                    log_warn!("Active window unknown: {}", message);
                    *last_failure = Some(message);
                } else {
                    log_debug!("Active window unknown: {}", message);
                }
                None
            }
        }
    }
}
