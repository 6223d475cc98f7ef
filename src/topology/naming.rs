//! Origin URL parsing and host name derivation.
//!
//! Every origin becomes one emulated host whose name is derived from the
//! origin's scheme, hostname and port. Names are used for network namespaces
//! and log files, so anything outside `[0-9A-Za-z]` is collapsed to `_`.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::config::ConfigError;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^0-9a-zA-Z]+").expect("Invalid host name regex"));

/// The scheme, host and port of an origin URL. Path, query and fragment are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginUrl {
    pub scheme: String,
    pub hostname: String,
    pub port: Option<u16>,
}

impl OriginUrl {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidOrigin {
            origin: url.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let scheme_ok = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(invalid("malformed scheme"));
        }

        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        // Drop userinfo
        let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

        let (hostname, port) = match authority.strip_prefix('[') {
            Some(bracketed) => {
                let (host, after) = bracketed
                    .split_once(']')
                    .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
                let port = match after {
                    "" => None,
                    after => Some(after.strip_prefix(':').ok_or_else(|| invalid("junk after IPv6 literal"))?),
                };
                (host, port)
            }
            None => match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            },
        };

        if hostname.is_empty() {
            return Err(invalid("missing hostname"));
        }

        let port = port
            .filter(|port| !port.is_empty())
            .map(|port| port.parse::<u16>().map_err(|_| invalid("invalid port")))
            .transpose()?;

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            hostname: hostname.to_ascii_lowercase(),
            port,
        })
    }

    /// Explicit port, or the scheme's well-known port
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.scheme))
    }

    /// `scheme://hostname:port` with the port always spelled out
    pub fn origin(&self) -> String {
        let host = if self.hostname.contains(':') {
            format!("[{}]", self.hostname)
        } else {
            self.hostname.clone()
        };
        match self.effective_port() {
            Some(port) => format!("{}://{}:{}", self.scheme, host, port),
            None => format!("{}://{}", self.scheme, host),
        }
    }
}

impl fmt::Display for OriginUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin())
    }
}

/// Well-known port for a scheme
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Derive the emulated host name for an origin URL
///
/// `"{scheme}-{hostname}-{port}"` with every run of non-alphanumeric
/// characters replaced by a single underscore. An unknown scheme without an
/// explicit port renders the port as `None`.
pub fn host_name(origin: &str) -> Result<String, ConfigError> {
    let url = OriginUrl::parse(origin)?;
    let port = url
        .effective_port()
        .map_or_else(|| "None".to_string(), |port| port.to_string());
    let raw = format!("{}-{}-{}", url.scheme, url.hostname, port);
    Ok(NON_ALPHANUMERIC.replace_all(&raw, "_").into_owned())
}
