#![warn(missing_docs)]

//! This crate carries the collaborator-facing configuration surfaces of the
//! holons SDK: the human-authored identity file ([`Identity`]), the
//! `--listen`/`--port` serve-flag surface ([`listen_uri`]), the environment
//! variables the certification launcher reads ([`env`]), and the static
//! capability manifest the SDK publishes ([`Manifest`]).
//!
//! The transport and RPC crates do not depend on any of this; these are the
//! interfaces their callers wire together.

pub mod env;
mod identity;
mod manifest;
mod serve;

use std::path::PathBuf;

use thiserror::Error;

pub use identity::Identity;
pub use manifest::{Capabilities, Manifest};
pub use serve::{listen_uri, DEFAULT_LISTEN_URI};

/// Errors from the configuration surfaces.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The identity file does not start with a `---` header line.
    #[error("identity file has no frontmatter header")]
    MissingFrontmatter,

    /// The `---` header block is never closed.
    #[error("identity frontmatter is not terminated")]
    UnterminatedFrontmatter,

    /// A serve flag is present but malformed.
    #[error("invalid serve flag: {0}")]
    InvalidFlag(String),

    /// Reading a file failed.
    #[error("reading {}: {source}", path.display())]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
