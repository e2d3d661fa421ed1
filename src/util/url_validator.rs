use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Why a URL was refused as an extraction target.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a public http(s) URL before it is handed to a third-party
/// extraction service.
///
/// Article links come from untrusted feeds, so loopback, private, link-local
/// and unspecified addresses are refused.
///
/// ```
/// use feedpipe::util::validate_url;
///
/// assert!(validate_url("https://example.com/post").is_ok());
/// assert!(validate_url("http://localhost/post").is_err());
/// assert!(validate_url("http://10.0.0.1/post").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }

    let ip = match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            return Err(UrlValidationError::Localhost)
        }
        Some(Host::Domain(_)) => return Ok(url),
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
    };

    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if is_non_public(&ip) {
        return Err(UrlValidationError::PrivateIp(ip));
    }
    Ok(url)
}

fn is_non_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        assert!(validate_url("https://example.com/post/1").is_ok());
        assert!(validate_url("http://news.example.org:8080/a").is_ok());
        assert!(validate_url("https://93.184.216.34/a").is_ok());
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_loopback_rejected() {
        for url in [
            "http://localhost/a",
            "http://LOCALHOST/a",
            "http://127.0.0.1/a",
            "http://[::1]/a",
        ] {
            assert!(
                matches!(validate_url(url), Err(UrlValidationError::Localhost)),
                "{url}"
            );
        }
    }

    #[test]
    fn test_private_ranges_rejected() {
        for url in [
            "http://10.0.0.1/a",
            "http://172.16.0.1/a",
            "http://192.168.1.1:8080/a",
            "http://169.254.1.1/a",
            "http://0.0.0.0/a",
            "http://[fe80::1]/a",
            "http://[fd00::1]/a",
        ] {
            assert!(
                matches!(validate_url(url), Err(UrlValidationError::PrivateIp(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
