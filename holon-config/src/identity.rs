//! Holon identity files.
//!
//! An identity file opens with a `---`-delimited frontmatter block of
//! `key: value` pairs describing the holon. Scalar values may be wrapped in
//! ASCII double quotes; `parents` and `aliases` take `[a, b]` lists. Keys
//! this SDK does not recognise are ignored.

use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::ConfigError;

/// The parsed frontmatter of an identity file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier of the holon.
    pub uuid: Option<String>,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Free-form motto line.
    pub motto: Option<String>,
    /// Who composed this holon.
    pub composer: Option<String>,
    /// Clade the holon belongs to.
    pub clade: Option<String>,
    /// Lifecycle status.
    pub status: Option<String>,
    /// Birth timestamp, as written.
    pub born: Option<String>,
    /// Implementation language.
    pub lang: Option<String>,
    /// Reproduction mode.
    pub reproduction: Option<String>,
    /// Tool that generated the file.
    pub generated_by: Option<String>,
    /// Protocol support status.
    pub proto_status: Option<String>,
    /// Parent holons.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Alternative names.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Identity {
    /// Parse the frontmatter header of an identity file.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = text.lines();
        match lines.next() {
            Some(line) if line.trim_end() == "---" => {}
            _ => return Err(ConfigError::MissingFrontmatter),
        }

        let mut identity = Identity::default();
        let mut terminated = false;
        for line in lines {
            let line = line.trim_end();
            if line == "---" {
                terminated = true;
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "uuid" => identity.uuid = Some(unquote(value)),
                "given_name" => identity.given_name = Some(unquote(value)),
                "family_name" => identity.family_name = Some(unquote(value)),
                "motto" => identity.motto = Some(unquote(value)),
                "composer" => identity.composer = Some(unquote(value)),
                "clade" => identity.clade = Some(unquote(value)),
                "status" => identity.status = Some(unquote(value)),
                "born" => identity.born = Some(unquote(value)),
                "lang" => identity.lang = Some(unquote(value)),
                "reproduction" => identity.reproduction = Some(unquote(value)),
                "generated_by" => identity.generated_by = Some(unquote(value)),
                "proto_status" => identity.proto_status = Some(unquote(value)),
                "parents" => identity.parents = parse_list(value),
                "aliases" => identity.aliases = parse_list(value),
                other => tracing::debug!("ignoring unrecognised identity key {other:?}"),
            }
        }

        if !terminated {
            return Err(ConfigError::UnterminatedFrontmatter);
        }
        Ok(identity)
    }

    /// Read and parse an identity file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

fn unquote(value: &str) -> String {
    let v = value.trim();
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        v[1..v.len() - 1].to_owned()
    } else {
        v.to_owned()
    }
}

// `[a, b]` list syntax; a bare scalar is treated as a one-element list.
fn parse_list(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    inner
        .split(',')
        .map(unquote)
        .filter(|item| !item.is_empty())
        .collect()
}
