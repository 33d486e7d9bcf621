#![warn(
    missing_docs,
    nonstandard_style,
    rust_2021_compatibility,
    rust_2018_idioms,
    clippy::unnested_or_patterns,
    clippy::redundant_closure_for_method_calls
)]

//! holon-transport: URI-addressed byte-stream listeners
//!
//! A uniform façade over four concrete listeners — TCP, Unix domain socket,
//! stdio, and an in-process memory pair. [`listen`] only decodes a URI into
//! its [`Listener`] descriptor; [`listen_runtime`] binds kernel resources and
//! returns a live [`RuntimeListener`] whose `accept` produces blocking
//! [`Connection`]s. `ws://` and `wss://` parse but have no runtime listener
//! here: serving WebSocket traffic belongs to an external collaborator, and
//! [`listen_runtime`] says so with [`TransportError::RuntimeUnsupported`].

mod conn;
mod error;
mod mem;
mod stdio;
mod tcp;
mod unix;
pub mod uri;

pub use conn::Connection;
pub use error::TransportError;
pub use mem::MemListener;
pub use stdio::StdioListener;
pub use tcp::TcpListener;
pub use unix::UnixListener;
pub use uri::{scheme_of, Scheme, Uri};

/// Parse-only listener descriptor: the decoded form of each scheme, with
/// defaults applied, and no kernel resources behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listener {
    /// `tcp://HOST:PORT` (empty host = all interfaces)
    Tcp {
        /// Host to bind; empty means all interfaces.
        host: String,
        /// Port to bind; 0 asks the kernel for one.
        port: u16,
    },
    /// `unix://PATH`
    Unix {
        /// Filesystem socket path.
        path: String,
    },
    /// `stdio://`
    Stdio,
    /// `mem://NAME`
    Mem {
        /// Listener name; may be empty.
        name: String,
    },
    /// `ws://HOST:PORT/PATH`
    Ws {
        /// Host part of the URL.
        host: String,
        /// Port, defaulted to 80.
        port: u16,
        /// HTTP path, defaulted to `/grpc`.
        path: String,
    },
    /// `wss://HOST:PORT/PATH`
    Wss {
        /// Host part of the URL.
        host: String,
        /// Port, defaulted to 443.
        port: u16,
        /// HTTP path, defaulted to `/grpc`.
        path: String,
    },
}

/// Decode `raw` into its [`Listener`] descriptor without binding anything.
pub fn listen(raw: &str) -> Result<Listener, TransportError> {
    let uri = Uri::parse(raw)?;
    let host = uri.host.clone().unwrap_or_default();
    let path = uri.path.clone().unwrap_or_default();
    Ok(match uri.scheme {
        Scheme::Tcp => Listener::Tcp {
            host,
            port: uri.port.unwrap_or(uri::DEFAULT_TCP_PORT),
        },
        Scheme::Unix => Listener::Unix { path },
        Scheme::Stdio => Listener::Stdio,
        Scheme::Mem => Listener::Mem { name: path },
        Scheme::Ws => Listener::Ws {
            host,
            port: uri.port.unwrap_or(uri::DEFAULT_WS_PORT),
            path,
        },
        Scheme::Wss => Listener::Wss {
            host,
            port: uri.port.unwrap_or(uri::DEFAULT_WSS_PORT),
            path,
        },
    })
}

/// A live, bound listener. Tagged union over the four runtime variants;
/// `ws`/`wss` are a declared gap at this layer and never appear here.
pub enum RuntimeListener {
    /// Bound TCP socket.
    Tcp(TcpListener),
    /// Bound Unix domain socket.
    Unix(UnixListener),
    /// The process's stdin/stdout, accepted at most once.
    Stdio(StdioListener),
    /// In-process dial/accept pair queue.
    Mem(MemListener),
}

impl RuntimeListener {
    /// Block until the next connection arrives.
    pub fn accept(&self) -> Result<Connection, TransportError> {
        match self {
            RuntimeListener::Tcp(l) => l.accept(),
            RuntimeListener::Unix(l) => l.accept(),
            RuntimeListener::Stdio(l) => l.accept(),
            RuntimeListener::Mem(l) => l.accept(),
        }
    }

    /// Close the listener. Idempotent and safe from any thread; a
    /// concurrently blocked `accept` reports `ListenerClosed`.
    pub fn close(&self) {
        match self {
            RuntimeListener::Tcp(l) => l.close(),
            RuntimeListener::Unix(l) => l.close(),
            RuntimeListener::Stdio(l) => l.close(),
            RuntimeListener::Mem(l) => l.close(),
        }
    }

    /// Canonical URI of the bound endpoint. For TCP this reflects the
    /// kernel-assigned port when the URI asked for port 0.
    pub fn bound_uri(&self) -> String {
        match self {
            RuntimeListener::Tcp(l) => l.bound_uri(),
            RuntimeListener::Unix(l) => l.bound_uri(),
            RuntimeListener::Stdio(l) => l.bound_uri(),
            RuntimeListener::Mem(l) => l.bound_uri(),
        }
    }
}

/// Bind a runtime listener for `raw`.
///
/// `ws://` and `wss://` return [`TransportError::RuntimeUnsupported`]: this
/// SDK dials WebSockets but never serves them.
pub fn listen_runtime(raw: &str) -> Result<RuntimeListener, TransportError> {
    let uri = Uri::parse(raw)?;
    match uri.scheme {
        Scheme::Tcp => Ok(RuntimeListener::Tcp(TcpListener::bind(
            uri.host.as_deref().unwrap_or(""),
            uri.port.unwrap_or(uri::DEFAULT_TCP_PORT),
        )?)),
        Scheme::Unix => Ok(RuntimeListener::Unix(UnixListener::bind(
            uri.path.as_deref().unwrap_or(""),
        )?)),
        Scheme::Stdio => Ok(RuntimeListener::Stdio(StdioListener::new())),
        Scheme::Mem => Ok(RuntimeListener::Mem(MemListener::new(
            uri.path.unwrap_or_default(),
        ))),
        Scheme::Ws | Scheme::Wss => Err(TransportError::RuntimeUnsupported(format!(
            "{}:// listeners are served by an external collaborator, not this SDK",
            uri.scheme
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn listen_is_referentially_transparent() {
        for raw in [
            "tcp://:9090",
            "tcp://[::1]:0",
            "unix:///tmp/h.sock",
            "stdio://",
            "mem://x",
            "ws://host:9091/grpc",
        ] {
            let parsed = Uri::parse(raw).unwrap();
            assert_eq!(listen(raw).unwrap(), listen(&parsed.to_string()).unwrap());
        }
    }

    #[test]
    fn ws_runtime_is_a_declared_gap() {
        for raw in ["ws://host:80/grpc", "wss://host/grpc"] {
            match listen_runtime(raw) {
                Err(TransportError::RuntimeUnsupported(reason)) => {
                    assert!(!reason.is_empty())
                }
                other => panic!("expected RuntimeUnsupported, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn mem_runtime_dials_through_the_union() {
        let listener = listen_runtime("mem://facade").unwrap();
        assert_eq!(listener.bound_uri(), "mem://facade");
        let RuntimeListener::Mem(mem) = &listener else {
            panic!("expected mem variant");
        };
        let client = mem.dial().unwrap();
        let server = listener.accept().unwrap();
        client.write(b"ok").unwrap();
        assert_eq!(server.read(2).unwrap(), b"ok");
    }
}
