pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

pub(super) fn parse_http_url(raw: &str) -> super::Result<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|_| super::Error::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(super::Error::UnsupportedScheme(raw.to_string())),
    }
}

/// Checks that `raw` is an absolute http(s) URL usable as a request base.
pub fn validate_base_url(raw: &str) -> super::Result<()> {
    let parsed = parse_http_url(raw)?;
    if parsed.host_str().is_none() {
        return Err(super::Error::InvalidUrl(raw.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_keeps_explicit_port() {
        let u = url::Url::parse("http://localhost:8080/health")
            .unwrap_or_else(|e| panic!("parse: {e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("localhost:8080"));

        let u = url::Url::parse("http://example.com/").unwrap_or_else(|e| panic!("parse: {e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("example.com"));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            parse_http_url("ftp://example.com"),
            Err(super::super::Error::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(super::super::Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn base_url_validation() {
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("https://api.example.com/v1").is_ok());
        assert!(validate_base_url("localhost:8080").is_err());
        assert!(validate_base_url("ftp://example.com").is_err());
    }
}
