//! Socket lifecycle: resolve the endpoint path, clean up stale sockets,
//! accept connections.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixListener;

use crate::connection::{handle_connection, ServerState};

/// `$XDG_RUNTIME_DIR/elephant/elephant.sock`, falling back to the temp
/// directory when the runtime dir is unset.
pub fn socket_path() -> PathBuf {
    let base = match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            tracing::error!("XDG_RUNTIME_DIR not set, falling back to temp dir");
            std::env::temp_dir()
        }
    };
    base.join("elephant").join("elephant.sock")
}

/// Bind the socket and serve until the process exits. Any stale socket file
/// from a previous run is removed first.
pub async fn listen(path: &Path, state: Arc<ServerState>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755));
        }
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    tracing::info!(path = %path.display(), "Listening");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(handle_connection(stream, Arc::clone(&state)));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
