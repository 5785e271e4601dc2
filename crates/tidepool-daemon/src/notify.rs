//! Process supervisor notifications over `$NOTIFY_SOCKET`.

use std::{env, path::PathBuf};

use tokio::net::UnixDatagram;
use tracing::{debug, warn};

pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Sends `KEY=VALUE` state lines to the supervisor, if there is one.
#[derive(Debug)]
pub struct Notifier {
    target: Option<(UnixDatagram, PathBuf)>,
}

impl Notifier {
    /// Notifier for the socket named by `$NOTIFY_SOCKET`. Does nothing when
    /// the variable is unset.
    pub fn from_env() -> Self {
        Self::new(env::var_os(NOTIFY_SOCKET_ENV).map(PathBuf::from))
    }

    pub fn new(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self { target: None };
        };
        // Abstract socket names are not supported.
        if path.as_os_str().to_string_lossy().starts_with('@') {
            warn!(socket = %path.display(), "Ignoring abstract notify socket");
            return Self { target: None };
        }
        match UnixDatagram::unbound() {
            Ok(socket) => Self {
                target: Some((socket, path)),
            },
            Err(e) => {
                warn!(error = %e, "Cannot create notify socket");
                Self { target: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Send one state line. Failures are logged and otherwise ignored.
    pub async fn notify(&self, state: &str) {
        let Some((socket, path)) = &self.target else {
            return;
        };
        match socket.send_to(state.as_bytes(), path).await {
            Ok(_) => debug!(state, "Notified supervisor"),
            Err(e) => warn!(state, error = %e, "Supervisor notification failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sends_state_to_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let listener = UnixDatagram::bind(&path).unwrap();

        let notifier = Notifier::new(Some(path));
        assert!(notifier.is_enabled());
        notifier.notify("READY=1").await;
        notifier.notify("WATCHDOG=1").await;

        let mut buf = [0u8; 64];
        let n = listener.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"READY=1");
        let n = listener.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"WATCHDOG=1");
    }

    #[tokio::test]
    async fn test_without_socket_is_a_no_op() {
        let notifier = Notifier::new(None);
        assert!(!notifier.is_enabled());
        notifier.notify("READY=1").await;
    }

    #[tokio::test]
    async fn test_missing_socket_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Notifier::new(Some(dir.path().join("absent.sock")));
        notifier.notify("WATCHDOG=1").await;
    }
}
