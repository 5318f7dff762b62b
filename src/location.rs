//! Repository source locations.
//!
//! A location is written in one of three forms:
//! - a URL with a scheme (`https://host/org/repo.git`, `ssh://git@host/repo`,
//!   `file:///srv/repo`),
//! - the scp-like shorthand understood by `git` (`git@host:org/repo.git`),
//! - a local path (`/srv/repo`, `./repo`, `../repo`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoLocation {
    Url(Url),
    Scp {
        user: Option<String>,
        host: String,
        path: String,
    },
    Local(PathBuf),
}

const SCP_PATTERN: &str = r"^(?:([A-Za-z0-9._-]+)@)?([A-Za-z0-9.-]+):(.+)$";

impl RepoLocation {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Configuration {
                message: "repository location is empty".to_string(),
                hint: Some("Set 'url' on the repository".to_string()),
            });
        }

        if text.contains("://") {
            return Url::parse(text).map(RepoLocation::Url).map_err(|e| {
                Error::configuration(format!("invalid repository URL '{}': {}", text, e))
            });
        }

        if text.starts_with('/') || text.starts_with("./") || text.starts_with("../") {
            return Ok(RepoLocation::Local(PathBuf::from(text)));
        }

        let scp = Regex::new(SCP_PATTERN).map_err(Error::Regex)?;
        if let Some(captures) = scp.captures(text) {
            return Ok(RepoLocation::Scp {
                user: captures.get(1).map(|m| m.as_str().to_string()),
                host: captures[2].to_string(),
                path: captures[3].to_string(),
            });
        }

        Err(Error::Configuration {
            message: format!("unrecognised repository location '{}'", text),
            hint: Some(
                "Use a URL (https://host/repo.git), user@host:path, or a path starting with /, ./ or ../"
                    .to_string(),
            ),
        })
    }

    pub fn is_local(&self) -> bool {
        match self {
            RepoLocation::Local(_) => true,
            RepoLocation::Url(url) => url.scheme() == "file",
            RepoLocation::Scp { .. } => false,
        }
    }
}

impl FromStr for RepoLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RepoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoLocation::Url(url) => write!(f, "{}", url),
            RepoLocation::Scp { user, host, path } => match user {
                Some(user) => write!(f, "{}@{}:{}", user, host, path),
                None => write!(f, "{}:{}", host, path),
            },
            RepoLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        let location: RepoLocation = "https://example.com/org/core.git".parse().unwrap();
        assert!(matches!(location, RepoLocation::Url(ref u) if u.host_str() == Some("example.com")));
        assert_eq!(location.to_string(), "https://example.com/org/core.git");
        assert!(!location.is_local());
    }

    #[test]
    fn test_parse_scp_form() {
        let location = RepoLocation::parse("git@github.com:org/core.git").unwrap();
        assert_eq!(
            location,
            RepoLocation::Scp {
                user: Some("git".to_string()),
                host: "github.com".to_string(),
                path: "org/core.git".to_string(),
            }
        );
        assert_eq!(location.to_string(), "git@github.com:org/core.git");
    }

    #[test]
    fn test_parse_local_paths() {
        assert!(RepoLocation::parse("/srv/git/core").unwrap().is_local());
        assert!(RepoLocation::parse("../core").unwrap().is_local());
        assert!(RepoLocation::parse("file:///srv/git/core").unwrap().is_local());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = RepoLocation::parse("just-a-name").unwrap_err();
        assert!(matches!(err, Error::Configuration { hint: Some(_), .. }));
        assert!(RepoLocation::parse("").is_err());
        assert!(RepoLocation::parse("https://exa mple.com/x").is_err());
    }
}
