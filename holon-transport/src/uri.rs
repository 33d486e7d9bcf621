//! Scheme-tagged endpoint URIs.
//!
//! Six schemes address the fabric: `tcp`, `unix`, `stdio`, `mem`, `ws`, and
//! `wss`. Parsing is pure (no I/O, no resolution); the only failure modes are
//! [`TransportError::InvalidUri`] and [`TransportError::UnsupportedUri`].

use std::fmt;

use crate::error::TransportError;

/// Default port when a `tcp://` URI omits one.
pub const DEFAULT_TCP_PORT: u16 = 9090;
/// Default port for `ws://`.
pub const DEFAULT_WS_PORT: u16 = 80;
/// Default port for `wss://`.
pub const DEFAULT_WSS_PORT: u16 = 443;
/// Default HTTP path for `ws://` and `wss://` when the URI carries none.
pub const DEFAULT_WS_PATH: &str = "/grpc";

/// Returns the scheme prefix of `raw` (the part before `://`), or `raw`
/// itself when there is no separator.
pub fn scheme_of(raw: &str) -> &str {
    match raw.find("://") {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

/// The six endpoint schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `tcp://HOST:PORT`
    Tcp,
    /// `unix://PATH`
    Unix,
    /// `stdio://`
    Stdio,
    /// `mem://NAME`
    Mem,
    /// `ws://HOST:PORT/PATH`
    Ws,
    /// `wss://HOST:PORT/PATH`
    Wss,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Tcp => "tcp",
            Scheme::Unix => "unix",
            Scheme::Stdio => "stdio",
            Scheme::Mem => "mem",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        })
    }
}

/// A decoded endpoint URI.
///
/// `raw` is the verbatim input and does not participate in equality; the
/// canonical rendering is [`fmt::Display`], and `Uri::parse(&u.to_string())`
/// reproduces `u` for every valid `u` (IPv6 hosts are re-bracketed on print).
#[derive(Debug, Clone, Eq)]
pub struct Uri {
    /// The string this URI was parsed from.
    pub raw: String,
    /// Which of the six schemes.
    pub scheme: Scheme,
    /// Host for `tcp`/`ws`/`wss`; may be empty (bind all interfaces).
    pub host: Option<String>,
    /// Port for `tcp`/`ws`/`wss`, defaulted when absent.
    pub port: Option<u16>,
    /// Socket path (`unix`), listener name (`mem`), or HTTP path (`ws`/`wss`).
    pub path: Option<String>,
}

impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
    }
}

impl Uri {
    /// Parse `raw` into a [`Uri`].
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let (scheme_str, rest) = match raw.find("://") {
            Some(idx) => (&raw[..idx], &raw[idx + 3..]),
            None => {
                return Err(TransportError::InvalidUri(format!(
                    "missing scheme separator in {raw:?}"
                )))
            }
        };

        let mut uri = Uri {
            raw: raw.to_owned(),
            scheme: Scheme::Stdio,
            host: None,
            port: None,
            path: None,
        };

        match scheme_str {
            "tcp" => {
                let (host, port) = split_host_port(rest, raw)?;
                uri.scheme = Scheme::Tcp;
                uri.host = Some(host);
                uri.port = Some(port.unwrap_or(DEFAULT_TCP_PORT));
            }
            "unix" => {
                if rest.is_empty() {
                    return Err(TransportError::InvalidUri(format!(
                        "unix URI requires a socket path: {raw:?}"
                    )));
                }
                uri.scheme = Scheme::Unix;
                uri.path = Some(rest.to_owned());
            }
            "stdio" => {
                if !rest.is_empty() {
                    return Err(TransportError::InvalidUri(format!(
                        "stdio URI carries no address: {raw:?}"
                    )));
                }
            }
            "mem" => {
                uri.scheme = Scheme::Mem;
                uri.path = Some(rest.to_owned());
            }
            "ws" | "wss" => {
                let secure = scheme_str == "wss";
                let (authority, path) = match rest.find('/') {
                    Some(idx) => (&rest[..idx], rest[idx..].to_owned()),
                    None => (rest, DEFAULT_WS_PATH.to_owned()),
                };
                let (host, port) = split_host_port(authority, raw)?;
                uri.scheme = if secure { Scheme::Wss } else { Scheme::Ws };
                uri.host = Some(host);
                uri.port = Some(port.unwrap_or(if secure {
                    DEFAULT_WSS_PORT
                } else {
                    DEFAULT_WS_PORT
                }));
                uri.path = Some(path);
            }
            other => {
                return Err(TransportError::UnsupportedUri(format!(
                    "{other:?} is not a recognised scheme in {raw:?}"
                )))
            }
        }

        Ok(uri)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = self.host.as_deref().unwrap_or("");
        match self.scheme {
            Scheme::Tcp => write!(
                f,
                "tcp://{}:{}",
                bracketed(host),
                self.port.unwrap_or(DEFAULT_TCP_PORT)
            ),
            Scheme::Unix => write!(f, "unix://{}", self.path.as_deref().unwrap_or("")),
            Scheme::Stdio => f.write_str("stdio://"),
            Scheme::Mem => write!(f, "mem://{}", self.path.as_deref().unwrap_or("")),
            Scheme::Ws | Scheme::Wss => write!(
                f,
                "{}://{}:{}{}",
                self.scheme,
                bracketed(host),
                self.port.unwrap_or(0),
                self.path.as_deref().unwrap_or(DEFAULT_WS_PATH)
            ),
        }
    }
}

/// Re-bracket hosts with embedded colons (IPv6 literals) when emitting URIs.
fn bracketed(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

// Split `HOST`, `HOST:PORT`, `[V6]`, or `[V6]:PORT`. An absent port comes
// back as None so each scheme can apply its own default.
fn split_host_port(s: &str, raw: &str) -> Result<(String, Option<u16>), TransportError> {
    if let Some(v6) = s.strip_prefix('[') {
        let end = v6.find(']').ok_or_else(|| {
            TransportError::InvalidUri(format!("unterminated IPv6 literal in {raw:?}"))
        })?;
        let host = v6[..end].to_owned();
        let rest = &v6[end + 1..];
        if rest.is_empty() {
            Ok((host, None))
        } else if let Some(port) = rest.strip_prefix(':') {
            Ok((host, Some(parse_port(port, raw)?)))
        } else {
            Err(TransportError::InvalidUri(format!(
                "unexpected content after IPv6 literal in {raw:?}"
            )))
        }
    } else {
        match s.rfind(':') {
            Some(idx) => Ok((
                s[..idx].to_owned(),
                Some(parse_port(&s[idx + 1..], raw)?),
            )),
            None => Ok((s.to_owned(), None)),
        }
    }
}

fn parse_port(s: &str, raw: &str) -> Result<u16, TransportError> {
    s.parse::<u16>()
        .map_err(|e| TransportError::InvalidUri(format!("bad port in {raw:?}: {e}")))
}
