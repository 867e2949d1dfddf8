//! Process helpers shared by providers that launch external programs.

use std::process::Stdio;

use tokio::process::Command;

/// Quote a string for interpolation into an `sh -c` command line.
pub(crate) fn sh_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=%".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Run a command line through `sh -c`, detached from the daemon's process
/// group so it survives a daemon restart. The child is reaped in the
/// background.
pub(crate) fn spawn_detached(command: &str) -> std::io::Result<()> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(())
}

/// Like `spawn_detached`, but inside the user's terminal emulator. Falls
/// back to a plain detached spawn when `$TERMINAL` is unset.
pub(crate) fn spawn_in_terminal(command: &str) -> std::io::Result<()> {
    match std::env::var("TERMINAL") {
        Ok(term) if !term.is_empty() => {
            spawn_detached(&format!("{term} -e sh -c {}", sh_quote(command)))
        }
        _ => {
            tracing::warn!("TERMINAL not set, running action without a terminal");
            spawn_detached(command)
        }
    }
}

/// Current clipboard text, or empty when nothing is selectable.
pub(crate) async fn clipboard_text() -> String {
    match Command::new("wl-paste").arg("--no-newline").output().await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
        _ => String::new(),
    }
}

/// `exec.LookPath` equivalent: is the binary resolvable on `$PATH`?
pub(crate) fn binary_on_path(name: &str) -> bool {
    let Ok(path) = std::env::var("PATH") else {
        return false;
    };
    path.split(':').any(|dir| {
        if dir.is_empty() {
            return false;
        }
        let candidate = std::path::Path::new(dir).join(name);
        candidate.is_file()
    })
}
