//! Unix domain socket runtime listener.

use std::io;
use std::os::unix::io::IntoRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, SockAddr, Socket, Type};

use crate::conn::Connection;
use crate::error::TransportError;

const BACKLOG: i32 = 16;

/// A bound `AF_UNIX` stream listener.
///
/// The socket path is unlinked before binding, so a stale inode left by a
/// crashed process does not block rebinding, and unlinked again on close.
/// Paths longer than the platform's `sun_path` limit fail with
/// [`TransportError::ListenFailed`].
pub struct UnixListener {
    socket: Socket,
    path: PathBuf,
    closed: AtomicBool,
}

impl UnixListener {
    /// Bind and listen on `path`.
    pub fn bind(path: &str) -> Result<Self, TransportError> {
        let sockaddr = SockAddr::unix(path)
            .map_err(|e| TransportError::ListenFailed(format!("{path}: {e}")))?;

        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!("removed stale socket at {path}"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!("unlinking {path}: {e}"),
        }

        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)
            .map_err(|e| TransportError::ListenFailed(e.to_string()))?;
        socket
            .bind(&sockaddr)
            .map_err(|e| TransportError::ListenFailed(format!("binding {path}: {e}")))?;
        socket
            .listen(BACKLOG)
            .map_err(|e| TransportError::ListenFailed(format!("listening on {path}: {e}")))?;

        tracing::debug!("unix listener bound at {path}");
        Ok(UnixListener {
            socket,
            path: PathBuf::from(path),
            closed: AtomicBool::new(false),
        })
    }

    /// Canonical URI of the bound endpoint.
    pub fn bound_uri(&self) -> String {
        format!("unix://{}", self.path.display())
    }

    /// Block until a peer connects. The accepted fd backs both ends.
    pub fn accept(&self) -> Result<Connection, TransportError> {
        loop {
            match self.socket.accept() {
                Ok((stream, _peer)) => {
                    let fd = stream.into_raw_fd();
                    return Ok(Connection::owned(fd, fd));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.closed.load(Ordering::SeqCst) {
                        return Err(TransportError::ListenerClosed(self.bound_uri()));
                    }
                    return Err(TransportError::AcceptFailed(e.to_string()));
                }
            }
        }
    }

    /// Stop listening and unlink the socket path. Idempotent; wakes any
    /// thread blocked in `accept`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.socket.shutdown(std::net::Shutdown::Both) {
            tracing::debug!("unix listener shutdown: {e}");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!("unlinking {}: {e}", self.path.display());
            }
        }
    }
}

impl Drop for UnixListener {
    fn drop(&mut self) {
        self.close();
    }
}
