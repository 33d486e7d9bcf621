//! In-process memory transport: dial/accept over pipe pairs.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Condvar, Mutex};

use crate::conn::Connection;
use crate::error::TransportError;

struct MemState {
    queue: VecDeque<Connection>,
    closed: bool,
}

/// A name-tagged in-process listener.
///
/// [`dial`] creates two unidirectional pipes and hands the caller a client
/// connection `(to_client.read, to_server.write)` while the matching server
/// connection `(to_server.read, to_client.write)` queues for the next
/// [`accept`]. Dialers and acceptors pair FIFO under the monitor; `close`
/// drains the queue and broadcasts to all waiters.
///
/// [`dial`]: MemListener::dial
/// [`accept`]: MemListener::accept
pub struct MemListener {
    name: String,
    state: Mutex<MemState>,
    available: Condvar,
}

impl MemListener {
    /// A fresh listener tagged `name` (may be empty).
    pub fn new(name: impl Into<String>) -> Self {
        MemListener {
            name: name.into(),
            state: Mutex::new(MemState {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Canonical URI of the endpoint.
    pub fn bound_uri(&self) -> String {
        format!("mem://{}", self.name)
    }

    /// Connect in-process: returns the client side and queues the server
    /// side for the next `accept`.
    pub fn dial(&self) -> Result<Connection, TransportError> {
        let mut state = self.state.lock().expect("mem listener lock poisoned");
        if state.closed {
            return Err(TransportError::ListenerClosed(self.bound_uri()));
        }

        let (srv_read, cli_write) = pipe_pair()?;
        let (cli_read, srv_write) = match pipe_pair() {
            Ok(fds) => fds,
            Err(e) => {
                unsafe {
                    libc::close(srv_read);
                    libc::close(cli_write);
                }
                return Err(e);
            }
        };

        state
            .queue
            .push_back(Connection::owned(srv_read, srv_write));
        self.available.notify_one();
        Ok(Connection::owned(cli_read, cli_write))
    }

    /// Block until a dialer arrives or the listener closes.
    pub fn accept(&self) -> Result<Connection, TransportError> {
        let mut state = self.state.lock().expect("mem listener lock poisoned");
        loop {
            if let Some(conn) = state.queue.pop_front() {
                return Ok(conn);
            }
            if state.closed {
                return Err(TransportError::ListenerClosed(self.bound_uri()));
            }
            state = self
                .available
                .wait(state)
                .expect("mem listener lock poisoned");
        }
    }

    /// Close the listener: drop queued server connections and wake all
    /// waiters. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("mem listener lock poisoned");
        if state.closed {
            return;
        }
        state.closed = true;
        for conn in state.queue.drain(..) {
            conn.close();
        }
        self.available.notify_all();
    }
}

impl Drop for MemListener {
    fn drop(&mut self) {
        self.close();
    }
}

// Returns (read end, write end).
fn pipe_pair() -> Result<(RawFd, RawFd), TransportError> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(TransportError::Io(format!(
            "pipe: {}",
            io::Error::last_os_error()
        )));
    }
    Ok((fds[0], fds[1]))
}
