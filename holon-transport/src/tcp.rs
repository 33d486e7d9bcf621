//! TCP runtime listener.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::IntoRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, Protocol, Socket, Type};

use crate::conn::Connection;
use crate::error::TransportError;

const BACKLOG: i32 = 16;

/// A bound TCP listener.
///
/// Binding resolves `(host, port)` and tries every candidate address in
/// order; the kernel-reported local address is read back afterwards so a
/// requested port of 0 shows up as the concrete port in [`bound_uri`].
///
/// [`bound_uri`]: TcpListener::bound_uri
pub struct TcpListener {
    socket: Socket,
    bound: SocketAddr,
    closed: AtomicBool,
}

impl TcpListener {
    /// Bind and listen. An empty host binds all interfaces.
    pub fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        let bind_host = if host.is_empty() { "0.0.0.0" } else { host };
        let candidates = (bind_host, port).to_socket_addrs().map_err(|e| {
            TransportError::ListenFailed(format!("resolving {bind_host}:{port}: {e}"))
        })?;

        let mut last_err: Option<io::Error> = None;
        for addr in candidates {
            match bind_one(addr) {
                Ok(socket) => {
                    let bound = socket
                        .local_addr()
                        .ok()
                        .and_then(|a| a.as_socket())
                        .unwrap_or(addr);
                    tracing::debug!("tcp listener bound at {bound}");
                    return Ok(TcpListener {
                        socket,
                        bound,
                        closed: AtomicBool::new(false),
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(TransportError::ListenFailed(match last_err {
            Some(e) => format!("binding {bind_host}:{port}: {e}"),
            None => format!("no addresses resolved for {bind_host}:{port}"),
        }))
    }

    /// The kernel-reported bound address.
    pub fn bound_addr(&self) -> SocketAddr {
        self.bound
    }

    /// Canonical URI of the bound endpoint (IPv6 hosts re-bracketed).
    pub fn bound_uri(&self) -> String {
        format!("tcp://{}", self.bound)
    }

    /// Block until a peer connects.
    ///
    /// The accepted fd backs both ends of the returned connection, which
    /// owns it.
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

    /// Stop listening. Idempotent; wakes any thread blocked in [`accept`].
    ///
    /// [`accept`]: TcpListener::accept
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.socket.shutdown(std::net::Shutdown::Both) {
            tracing::debug!("tcp listener shutdown: {e}");
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.close();
    }
}

fn bind_one(addr: SocketAddr) -> io::Result<Socket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    Ok(socket)
}
