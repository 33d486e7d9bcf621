//! Stdio runtime listener: the process's stdin/stdout as one connection.

use std::sync::Mutex;

use crate::conn::Connection;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Consumed,
    Closed,
}

/// A listener that accepts exactly one connection: the process's own
/// stdin/stdout pair. The connection owns neither descriptor.
pub struct StdioListener {
    state: Mutex<State>,
}

impl StdioListener {
    /// A fresh listener that has not yet handed out its connection.
    pub fn new() -> Self {
        StdioListener {
            state: Mutex::new(State::Fresh),
        }
    }

    /// Canonical URI of the endpoint.
    pub fn bound_uri(&self) -> String {
        "stdio://".to_owned()
    }

    /// Return the stdin/stdout connection the first time; fail afterwards.
    pub fn accept(&self) -> Result<Connection, TransportError> {
        let mut state = self.state.lock().expect("stdio listener lock poisoned");
        match *state {
            State::Fresh => {
                *state = State::Consumed;
                Ok(Connection::stdio())
            }
            State::Consumed => Err(TransportError::AcceptFailed(
                "stdio:// accepts exactly one connection".to_owned(),
            )),
            State::Closed => Err(TransportError::ListenerClosed(self.bound_uri())),
        }
    }

    /// Close the listener. Idempotent; never touches fds 0/1.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("stdio listener lock poisoned");
        *state = State::Closed;
    }
}

impl Default for StdioListener {
    fn default() -> Self {
        Self::new()
    }
}
