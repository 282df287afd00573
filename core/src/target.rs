//! Connection target derived from the server URL.

use std::fmt;

use url::Url;

use crate::error::PvError;

const DEFAULT_URL: &str = "http://localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Where RPM requests are posted: `{scheme}://{host}:{port}{path}`, with
/// `path` always ending in `/RPM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Target {
    /// Parse a server base URL. An empty string means `http://localhost`.
    pub fn parse(url: &str) -> Result<Self, PvError> {
        let url = url.trim();
        let url = if url.is_empty() { DEFAULT_URL } else { url };
        let parsed = Url::parse(url)?;

        let scheme = match parsed.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(PvError::UnsupportedScheme(other.to_string())),
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PvError::MissingHost(url.to_string()))?
            .to_string();
        let port = parsed.port().unwrap_or_else(|| scheme.default_port());
        let path = format!("{}/RPM", parsed.path().trim_end_matches('/'));

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    pub fn endpoint(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_rpm_path_and_default_port() {
        let target = Target::parse("http://pv.example.com").unwrap();
        assert_eq!(target.scheme, Scheme::Http);
        assert_eq!(target.host, "pv.example.com");
        assert_eq!(target.port, 80);
        assert_eq!(target.path, "/RPM");
        assert_eq!(target.endpoint(), "http://pv.example.com:80/RPM");
    }

    #[test]
    fn https_defaults_to_443() {
        let target = Target::parse("https://pv.example.com/").unwrap();
        assert_eq!(target.port, 443);
        assert_eq!(target.path, "/RPM");
    }

    #[test]
    fn base_path_and_port_are_kept() {
        let target = Target::parse("http://127.0.0.1:8080/PE/").unwrap();
        assert_eq!(target.port, 8080);
        assert_eq!(target.path, "/PE/RPM");
        assert_eq!(target.endpoint(), "http://127.0.0.1:8080/PE/RPM");
    }

    #[test]
    fn empty_url_means_localhost() {
        let target = Target::parse("").unwrap();
        assert_eq!(target.endpoint(), "http://localhost:80/RPM");
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = Target::parse("ftp://pv.example.com").unwrap_err();
        assert!(matches!(err, PvError::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    fn garbage_is_an_invalid_url() {
        let err = Target::parse("not a url").unwrap_err();
        assert!(matches!(err, PvError::InvalidUrl(_)));
    }
}
