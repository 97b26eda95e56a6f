//! Connection listener for `-E server --pipe=<path>`
//!
//! Unix domain socket on Unix, named pipe on Windows. Exactly one client
//! connection is served per process.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::session::{Session, SessionEnd};
use crate::io::{StreamTransport, Transport};
use crate::logging::CLIENT_LOG;
use crate::project::ProjectContext;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to listen on {}: {source}", .path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept a connection on {}: {source}", .path.display())]
    Accept {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Removes the socket file when dropped
#[cfg(unix)]
struct SocketFileGuard {
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        remove_socket_file(&self.path);
    }
}

#[cfg(unix)]
fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove socket {}: {}", path.display(), e),
    }
}

/// Remove a socket left behind by an earlier run; anything else is kept
#[cfg(unix)]
fn remove_stale_socket(path: &Path) {
    use std::os::unix::fs::FileTypeExt;

    if let Ok(metadata) = std::fs::symlink_metadata(path)
        && metadata.file_type().is_socket()
    {
        info!("Removing stale socket {}", path.display());
        remove_socket_file(path);
    }
}

/// Session for an accepted client; `debug_output` forwards log records to it
fn new_session<T: Transport>(transport: T, context: ProjectContext, debug_output: bool) -> Session<T> {
    let session = Session::new(transport, context, debug_output);
    if debug_output {
        session.with_client_log(CLIENT_LOG.clone())
    } else {
        session
    }
}

/// Accept one client on `pipe` and serve it until the session ends
#[cfg(unix)]
pub async fn serve(
    pipe: &Path,
    context: ProjectContext,
    debug_output: bool,
) -> Result<SessionEnd, ListenerError> {
    use tokio::net::UnixListener;

    remove_stale_socket(pipe);
    let listener = UnixListener::bind(pipe).map_err(|source| ListenerError::Bind {
        path: pipe.to_path_buf(),
        source,
    })?;
    let _guard = SocketFileGuard {
        path: pipe.to_path_buf(),
    };
    info!("Listening on {}", pipe.display());

    let (stream, _) = listener
        .accept()
        .await
        .map_err(|source| ListenerError::Accept {
            path: pipe.to_path_buf(),
            source,
        })?;
    info!("Client connected");

    let session = new_session(StreamTransport::new(stream), context, debug_output);
    Ok(session.run().await)
}

/// Accept one client on the named pipe `pipe` and serve it until the session ends
#[cfg(windows)]
pub async fn serve(
    pipe: &Path,
    context: ProjectContext,
    debug_output: bool,
) -> Result<SessionEnd, ListenerError> {
    use tokio::net::windows::named_pipe::ServerOptions;

    let server = ServerOptions::new()
        .first_pipe_instance(true)
        .create(pipe)
        .map_err(|source| ListenerError::Bind {
            path: pipe.to_path_buf(),
            source,
        })?;
    info!("Listening on {}", pipe.display());

    server
        .connect()
        .await
        .map_err(|source| ListenerError::Accept {
            path: pipe.to_path_buf(),
            source,
        })?;
    debug!("Client connected");

    let session = new_session(StreamTransport::new(server), context, debug_output);
    Ok(session.run().await)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::server::framing::{FOOTER, HEADER};
    use crate::test_utils::{ProjectFixture, ScriptedRunner};
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn test_serves_one_client_and_removes_socket() {
        let fixture = ProjectFixture::new();
        let pipe = fixture.build.join("server.sock");
        let context = fixture.unbound_context(ScriptedRunner::new());

        let server = {
            let pipe = pipe.clone();
            tokio::spawn(async move { serve(&pipe, context, false).await })
        };

        let stream = loop {
            match UnixStream::connect(&pipe).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };
        let mut client = StreamTransport::new(stream);

        let mut hello = Vec::new();
        while !hello.ends_with(FOOTER) {
            let chunk = client.receive().await.unwrap();
            assert!(!chunk.is_empty());
            hello.extend(chunk);
        }
        assert!(hello.starts_with(HEADER));
        assert!(String::from_utf8_lossy(&hello).contains("\"hello\""));

        client.close().await.unwrap();
        let end = server.await.unwrap().unwrap();
        assert!(matches!(end, SessionEnd::Disconnected));
        assert!(!pipe.exists());
    }

    #[tokio::test]
    async fn test_bind_failure_names_path() {
        let fixture = ProjectFixture::new();
        let pipe = fixture.build.join("missing-dir").join("server.sock");
        let context = fixture.unbound_context(ScriptedRunner::new());

        let err = serve(&pipe, context, false).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(err.to_string().contains("missing-dir"));
    }

    #[test]
    fn test_stale_socket_removed_other_files_kept() {
        let fixture = ProjectFixture::new();
        let stale = fixture.build.join("stale.sock");
        drop(std::os::unix::net::UnixListener::bind(&stale).unwrap());
        assert!(stale.exists());

        remove_stale_socket(&stale);
        assert!(!stale.exists());

        let regular = fixture.build.join("not-a-socket");
        std::fs::write(&regular, "keep").unwrap();
        remove_stale_socket(&regular);
        assert!(regular.exists());
    }
}
