use log::{debug, info, warn};
use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::{Mutex, PoisonError},
    thread,
};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::LaunchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Spawned(u32),
    /// An instance of the executable was already running; nothing was started.
    AlreadyRunning(u32),
}

impl LaunchOutcome {
    pub fn pid(&self) -> u32 {
        match self {
            LaunchOutcome::Spawned(pid) | LaunchOutcome::AlreadyRunning(pid) => *pid,
        }
    }
}

pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, path: &str) -> Result<LaunchOutcome, LaunchError>;
}

/// Starts phase applications as detached children.
pub struct SystemLauncher {
    system: Mutex<System>,
    own_pid: u32,
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            own_pid: std::process::id(),
        }
    }

    fn running_instance(&self, exe: &Path) -> Option<u32> {
        let wanted = fs::canonicalize(exe).unwrap_or_else(|_| exe.to_path_buf());
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::everything());

        system.processes().iter().find_map(|(pid, process)| {
            let pid = pid.as_u32();
            if pid == self.own_pid {
                return None;
            }
            match process.exe() {
                Some(path) if path == wanted.as_path() => Some(pid),
                _ => None,
            }
        })
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, path: &str) -> Result<LaunchOutcome, LaunchError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(LaunchError::EmptyPath);
        }

        let exe = resolve_executable(trimmed)
            .ok_or_else(|| LaunchError::NotFound(PathBuf::from(trimmed)))?;

        if let Some(pid) = self.running_instance(&exe) {
            info!("{} already running as pid {}; not starting another", exe.display(), pid);
            return Ok(LaunchOutcome::AlreadyRunning(pid));
        }

        let mut child = Command::new(&exe)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                path: exe.clone(),
                source,
            })?;

        let pid = child.id();
        info!("Started {} (pid {})", exe.display(), pid);

        // Reap the child when it exits; its lifetime is otherwise not managed.
        let spawned = thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => debug!("pid {} exited with {}", pid, status),
                Err(err) => debug!("failed to wait on pid {}: {}", pid, err),
            });
        if let Err(err) = spawned {
            warn!("Could not watch pid {}: {}", pid, err);
        }

        Ok(LaunchOutcome::Spawned(pid))
    }
}

/// Resolves a configured executable: explicit paths must exist, bare names are looked up on `PATH`.
pub fn resolve_executable(path: &str) -> Option<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let candidate = Path::new(path);
    if candidate.exists() {
        return Some(candidate.to_path_buf());
    }

    let is_bare_name = candidate.components().count() == 1 && !candidate.is_absolute();
    if !is_bare_name {
        return None;
    }

    let search = env::var_os("PATH")?;
    env::split_paths(&search).find_map(|dir| {
        let full = dir.join(path);
        if full.is_file() {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = full.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_path_is_rejected() {
        let launcher = SystemLauncher::new();
        assert!(matches!(launcher.launch("   "), Err(LaunchError::EmptyPath)));
    }

    #[test]
    fn missing_executable_is_reported() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-game");
        let launcher = SystemLauncher::new();

        match launcher.launch(&missing.display().to_string()) {
            Err(LaunchError::NotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn resolves_explicit_paths_and_bare_names() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("study.sh");
        fs::write(&file, "#!/bin/sh\n").unwrap();

        assert_eq!(resolve_executable(&file.display().to_string()), Some(file));
        assert_eq!(resolve_executable(""), None);
        assert_eq!(
            resolve_executable(&dir.path().join("absent").display().to_string()),
            None
        );
        assert_eq!(resolve_executable("definitely-not-a-real-binary-0451"), None);
    }

    #[cfg(unix)]
    #[test]
    fn launches_a_real_executable() {
        let launcher = SystemLauncher::new();
        let outcome = launcher.launch("sh").expect("sh should be on PATH");
        assert!(outcome.pid() > 0);
    }
}
