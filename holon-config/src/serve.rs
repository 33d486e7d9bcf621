//! The serve-flag surface: where should this holon listen?

use crate::ConfigError;

/// Listen address used when neither `--listen` nor `--port` is given.
pub const DEFAULT_LISTEN_URI: &str = "tcp://:9090";

/// Extract the listen URI from an argument vector.
///
/// `--listen URI` is taken verbatim; `--port N` is rewritten to `tcp://:N`.
/// The first of the two flags wins. With neither present the default
/// `tcp://:9090` is returned. A flag missing its value, or a non-numeric
/// port, is an error rather than a silent fallback.
pub fn listen_uri<I, S>(args: I) -> Result<String, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--listen" => {
                return match iter.next() {
                    Some(uri) => Ok(uri.as_ref().to_owned()),
                    None => Err(ConfigError::InvalidFlag(
                        "--listen requires a URI".to_owned(),
                    )),
                }
            }
            "--port" => {
                let value = iter.next().ok_or_else(|| {
                    ConfigError::InvalidFlag("--port requires a number".to_owned())
                })?;
                let port: u16 = value.as_ref().parse().map_err(|_| {
                    ConfigError::InvalidFlag(format!(
                        "--port: {:?} is not a port number",
                        value.as_ref()
                    ))
                })?;
                return Ok(format!("tcp://:{port}"));
            }
            _ => {}
        }
    }
    Ok(DEFAULT_LISTEN_URI.to_owned())
}
