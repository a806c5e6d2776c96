//! Target URL validation.

use http::Uri;

use tidewatch_core::ConfigError;

/// Normalize a user-supplied target into a request URI.
///
/// A bare host (`example.com:8080/path`) gets `http://` prepended and a
/// trailing `/` is dropped. Targets without a hostname, or with a scheme
/// other than `http` or `https`, are rejected.
pub fn normalize_target(raw: &str) -> Result<Uri, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidUrl("empty URL".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let normalized = with_scheme.trim_end_matches('/');

    let uri: Uri = normalized
        .parse()
        .map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(other) => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        None => return Err(ConfigError::InvalidUrl(format!("{raw}: no scheme"))),
    }

    match uri.host() {
        Some(host) if !host.is_empty() => Ok(uri),
        _ => Err(ConfigError::InvalidUrl(format!("{raw}: no hostname"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_http_scheme() {
        let uri = normalize_target("my-lb-123.us-east-1.elb.amazonaws.com").unwrap();
        assert_eq!(uri.scheme_str(), Some("http"));
        assert_eq!(uri.host(), Some("my-lb-123.us-east-1.elb.amazonaws.com"));
    }

    #[test]
    fn port_and_path_kept() {
        let uri = normalize_target("localhost:8080/health").unwrap();
        assert_eq!(uri.port_u16(), Some(8080));
        assert_eq!(uri.path(), "/health");
    }

    #[test]
    fn trailing_slash_dropped() {
        let uri = normalize_target("http://example.com/api/").unwrap();
        assert_eq!(uri.to_string(), "http://example.com/api");
    }

    #[test]
    fn https_accepted() {
        let uri = normalize_target("https://example.com/status/").unwrap();
        assert_eq!(uri.scheme_str(), Some("https"));
        assert_eq!(uri.to_string(), "https://example.com/status");
    }

    #[test]
    fn other_scheme_rejected() {
        assert!(matches!(
            normalize_target("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn missing_host_rejected() {
        assert!(normalize_target("http://").is_err());
        assert!(normalize_target("").is_err());
        assert!(normalize_target("   ").is_err());
    }

    #[test]
    fn invalid_characters_rejected() {
        assert!(normalize_target("exa mple.com").is_err());
    }
}
