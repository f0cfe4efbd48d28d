use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Checks that an entry link is an absolute http(s) URL with a host.
///
/// This is a shape check only; the link is never requested.
pub fn validate_link(link: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(link)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

/// Validates a URL before it is registered as a feed source.
///
/// On top of [`validate_link`], rejects localhost and private, link-local
/// and unique-local addresses so that `addfeed` cannot be used to make the
/// aggregator poll internal services (SSRF).
///
/// # Examples
///
/// ```
/// use gator::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = validate_link(url_str)?;

    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(UrlValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            // ::ffff:a.b.c.d reaches the IPv4 host a.b.c.d
            let ip = match ip {
                IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
                IpAddr::V4(_) => ip,
            };
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_unspecified() {
                return true;
            }
            let first = ipv6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_shapes() {
        assert!(validate_link("https://x/a").is_ok());
        assert!(validate_link("http://example.com/post?id=1#top").is_ok());
        assert!(validate_link("not a url").is_err());
        assert!(validate_link("/relative/path").is_err());
        assert!(matches!(
            validate_link("mailto:someone@example.com"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_links_may_point_anywhere() {
        // Entry links are stored, not fetched
        assert!(validate_link("http://localhost/post").is_ok());
        assert!(validate_link("http://10.0.0.1/post").is_ok());
    }

    #[test]
    fn test_feed_url_rejects_local_targets() {
        assert!(matches!(
            validate_feed_url("http://localhost/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(matches!(
            validate_feed_url("http://127.0.0.1/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(validate_feed_url("http://[::1]/feed").is_err());
        assert!(validate_feed_url("http://0.0.0.0/feed").is_err());
    }

    #[test]
    fn test_feed_url_rejects_private_ranges() {
        assert!(validate_feed_url("http://192.168.1.1:8080/feed").is_err());
        assert!(validate_feed_url("http://10.0.0.1/feed").is_err());
        assert!(validate_feed_url("http://172.16.0.1/feed").is_err());
        assert!(validate_feed_url("http://169.254.1.1/feed").is_err());
        assert!(validate_feed_url("http://[fe80::1]/feed").is_err());
        assert!(validate_feed_url("http://[fd00::1]/feed").is_err());
    }

    #[test]
    fn test_feed_url_rejects_ipv4_mapped_ipv6() {
        assert!(matches!(
            validate_feed_url("http://[::ffff:127.0.0.1]/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(matches!(
            validate_feed_url("http://[::ffff:10.0.0.1]/feed"),
            Err(UrlValidationError::PrivateIp(_))
        ));
        assert!(validate_feed_url("http://[::ffff:192.168.1.1]/feed").is_err());
        assert!(validate_feed_url("http://[::ffff:93.184.216.34]/rss").is_ok());
    }

    #[test]
    fn test_feed_url_accepts_public_hosts() {
        assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
        assert!(validate_feed_url("https://example.com:443/feed.xml").is_ok());
        assert!(validate_feed_url("http://93.184.216.34/rss").is_ok());
    }
}
