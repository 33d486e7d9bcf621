//! Environment variables read by the cross-SDK certification launcher.

/// Path of the helper Go binary, from `GO_BIN`, trimmed. `None` when the
/// variable is unset or blank.
pub fn go_bin() -> Option<String> {
    std::env::var("GO_BIN")
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// The Go build cache directory, from `GOCACHE`, defaulting to
/// `/tmp/go-cache` when the variable is unset or blank.
pub fn go_cache() -> String {
    match std::env::var("GOCACHE") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => "/tmp/go-cache".to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn go_bin_is_trimmed() {
        std::env::set_var("GO_BIN", "  /usr/local/bin/go \n");
        assert_eq!(go_bin().as_deref(), Some("/usr/local/bin/go"));

        std::env::set_var("GO_BIN", "   ");
        assert_eq!(go_bin(), None);

        std::env::remove_var("GO_BIN");
        assert_eq!(go_bin(), None);
    }

    #[test]
    #[serial]
    fn go_cache_defaults() {
        std::env::remove_var("GOCACHE");
        assert_eq!(go_cache(), "/tmp/go-cache");

        std::env::set_var("GOCACHE", "");
        assert_eq!(go_cache(), "/tmp/go-cache");

        std::env::set_var("GOCACHE", "/var/cache/go");
        assert_eq!(go_cache(), "/var/cache/go");
        std::env::remove_var("GOCACHE");
    }
}
