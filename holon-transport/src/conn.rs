//! Blocking byte-stream connection over a pair of file descriptors.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Mutex;

use crate::error::TransportError;

/// A full-duplex connection over two (possibly identical) file descriptors.
///
/// Ownership is explicit per descriptor: an accepted TCP or Unix connection
/// owns the one fd referenced by both ends, a mem connection owns two pipe
/// ends, and a stdio connection owns neither (the process keeps stdin and
/// stdout). `close` honours those flags and is idempotent; dropping an open
/// connection closes it.
///
/// The closed flag lives under a state lock, so reads and writes are
/// serialised against `close` but not against each other: concurrent read on
/// one fd with write on the other is the expected full-duplex use. Concurrent
/// same-direction calls are the caller's business to serialise.
#[derive(Debug)]
pub struct Connection {
    read_fd: RawFd,
    write_fd: RawFd,
    owns_read_fd: bool,
    owns_write_fd: bool,
    closed: Mutex<bool>,
}

impl Connection {
    pub(crate) fn new(
        read_fd: RawFd,
        write_fd: RawFd,
        owns_read_fd: bool,
        owns_write_fd: bool,
    ) -> Self {
        Connection {
            read_fd,
            write_fd,
            owns_read_fd,
            owns_write_fd,
            closed: Mutex::new(false),
        }
    }

    /// A connection owning both descriptors (accepted sockets, pipe ends).
    pub(crate) fn owned(read_fd: RawFd, write_fd: RawFd) -> Self {
        Self::new(read_fd, write_fd, true, true)
    }

    /// The process-wide stdin/stdout pair. The process keeps ownership.
    pub(crate) fn stdio() -> Self {
        Self::new(0, 1, false, false)
    }

    /// Descriptor reads come from.
    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// Descriptor writes go to.
    pub fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    /// Whether `close` will close [`read_fd`](Self::read_fd).
    pub fn owns_read_fd(&self) -> bool {
        self.owns_read_fd
    }

    /// Whether `close` will close [`write_fd`](Self::write_fd).
    pub fn owns_write_fd(&self) -> bool {
        self.owns_write_fd
    }

    fn check_open(&self) -> Result<(), TransportError> {
        let closed = self.closed.lock().expect("connection state lock poisoned");
        if *closed {
            Err(TransportError::ListenerClosed(
                "connection already closed".to_owned(),
            ))
        } else {
            Ok(())
        }
    }

    /// Read up to `max` bytes with a single kernel read.
    ///
    /// An empty vector signals peer EOF.
    pub fn read(&self, max: usize) -> Result<Vec<u8>, TransportError> {
        self.check_open()?;
        let mut buf = vec![0u8; max];
        let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(TransportError::Io(format!(
                "read: {}",
                io::Error::last_os_error()
            )));
        }
        buf.truncate(n as usize);
        Ok(buf)
    }

    /// Write the whole buffer, looping over short writes.
    ///
    /// Either every byte is written or an error is returned; partial success
    /// is never surfaced.
    pub fn write(&self, buf: &[u8]) -> Result<(), TransportError> {
        self.check_open()?;
        let mut off = 0;
        while off < buf.len() {
            let n = unsafe {
                libc::write(
                    self.write_fd,
                    buf[off..].as_ptr().cast(),
                    buf.len() - off,
                )
            };
            if n < 0 {
                return Err(TransportError::Io(format!(
                    "write: {}",
                    io::Error::last_os_error()
                )));
            }
            if n == 0 {
                return Err(TransportError::Io("zero-byte write".to_owned()));
            }
            off += n as usize;
        }
        Ok(())
    }

    /// Close the owned descriptors. Idempotent.
    ///
    /// `write_fd` is only closed when it is owned and distinct from
    /// `read_fd`; accepted sockets reference one fd from both ends.
    pub fn close(&self) {
        let mut closed = self.closed.lock().expect("connection state lock poisoned");
        if *closed {
            return;
        }
        *closed = true;
        if self.owns_read_fd {
            unsafe { libc::close(self.read_fd) };
        }
        if self.owns_write_fd && self.write_fd != self.read_fd {
            unsafe { libc::close(self.write_fd) };
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
