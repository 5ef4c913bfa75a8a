use std::{
    io::Read,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::error::WindowQueryError;

const POLL_STEP: Duration = Duration::from_millis(10);

/// Runs `command` to completion and returns its stdout, killing it once `timeout` expires.
pub fn run_bounded(mut command: Command, timeout: Duration) -> Result<String, WindowQueryError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                WindowQueryError::Unsupported(format!("`{program}` is not installed"))
            }
            _ => WindowQueryError::Command(format!("{program}: {err}")),
        })?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WindowQueryError::Timeout(timeout.as_millis()));
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(err) => return Err(WindowQueryError::Command(format!("{program}: {err}"))),
        }
    };

    if !status.success() {
        return Err(WindowQueryError::Command(format!("{program} exited with {status}")));
    }

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_string(&mut output)
            .map_err(|err| WindowQueryError::Command(format!("{program}: {err}")))?;
    }
    Ok(output)
}

fn clean_title(raw: &str) -> Result<String, WindowQueryError> {
    let title = raw.trim_end_matches(['\r', '\n']);
    if title.trim().is_empty() {
        Err(WindowQueryError::NoWindow)
    } else {
        Ok(title.to_string())
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn query_active_title(timeout: Duration) -> Result<String, WindowQueryError> {
    let mut command = Command::new("xdotool");
    command.args(["getactivewindow", "getwindowname"]);
    if std::env::var_os("DISPLAY").is_none() && std::env::var_os("WAYLAND_DISPLAY").is_none() {
        command.env("DISPLAY", ":0");
    }
    clean_title(&run_bounded(command, timeout)?)
}

#[cfg(target_os = "macos")]
pub fn query_active_title(timeout: Duration) -> Result<String, WindowQueryError> {
    const SCRIPT: &str = "tell application \"System Events\" to get name of front window of \
                          (first application process whose frontmost is true)";
    let mut command = Command::new("osascript");
    command.args(["-e", SCRIPT]);
    clean_title(&run_bounded(command, timeout)?)
}

#[cfg(target_os = "windows")]
pub fn query_active_title(_timeout: Duration) -> Result<String, WindowQueryError> {
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW};

    unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.0.is_null() {
            return Err(WindowQueryError::NoWindow);
        }

        let mut title_buf = [0u16; 512];
        let len = GetWindowTextW(hwnd, &mut title_buf);
        if len <= 0 {
            return Err(WindowQueryError::NoWindow);
        }
        clean_title(&String::from_utf16_lossy(&title_buf[..len as usize]))
    }
}

#[cfg(not(any(unix, target_os = "windows")))]
pub fn query_active_title(_timeout: Duration) -> Result<String, WindowQueryError> {
    Err(WindowQueryError::Unsupported(std::env::consts::OS.to_string()))
}
