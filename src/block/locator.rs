//! Target locator parsing.
//!
//! Disks are attached by locator: `scheme://target`. The scheme picks the
//! driver; the driver interprets the rest. Remote drivers use the full
//! `scheme://server/export/path[?param=value&...]` form.

use std::str::FromStr;

use thiserror::Error;

/// Why a locator was rejected. All of these fire before any network
/// activity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("missing `://` scheme separator")]
    MissingScheme,
    #[error("invalid server name")]
    InvalidServer,
    #[error("locator does not name an export and a file")]
    InvalidPath,
    #[error("unknown parameter `{0}`")]
    UnknownParam(String),
    #[error("parameter `{0}` requires a value")]
    MissingValue(String),
    #[error("parameter `{0}` is not a number")]
    BadNumber(String),
}

/// A locator split into its scheme and everything after `://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub scheme: String,
    pub target: String,
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Locator, LocatorError> {
        let mut parts = s.splitn(2, "://");
        let scheme = parts.next().unwrap();
        let target = parts.next().ok_or(LocatorError::MissingScheme)?;
        if scheme.is_empty() {
            return Err(LocatorError::MissingScheme);
        }
        Ok(Locator {
            scheme: scheme.to_owned(),
            target: target.to_owned(),
        })
    }
}

/// Connection parameters recognized in a remote locator's query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnParams {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub tcp_retry_count: Option<u32>,
}

/// The server, export and file path of a remote locator target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub server: String,
    /// Share mounted on the server, with a leading `/`.
    pub export: String,
    /// File path within the export, with a leading `/`.
    pub path: String,
    pub params: ConnParams,
}

impl RemoteTarget {
    /// Parse `server/export/path[?param=value&...]` (a [`Locator`] target).
    ///
    /// The export is everything between the server and the final path
    /// component, so the file's parent directory is what gets mounted.
    pub fn parse(target: &str) -> Result<RemoteTarget, LocatorError> {
        let mut parts = target.splitn(2, '?');
        let location = parts.next().unwrap();
        let query = parts.next();

        let slash = location.find('/').ok_or(LocatorError::InvalidPath)?;
        let (server, full_path) = location.split_at(slash);
        if server.is_empty() {
            return Err(LocatorError::InvalidServer);
        }

        let split = full_path.rfind('/').unwrap();
        let (export, path) = full_path.split_at(split);
        if export.is_empty() || path.len() <= 1 {
            return Err(LocatorError::InvalidPath);
        }

        let mut params = ConnParams::default();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let mut kv = pair.splitn(2, '=');
                let key = kv.next().unwrap();
                let value = match kv.next() {
                    Some(v) if !v.is_empty() => v,
                    _ => return Err(LocatorError::MissingValue(key.to_owned())),
                };
                let parsed = value
                    .parse::<u32>()
                    .map_err(|_| LocatorError::BadNumber(key.to_owned()))?;
                match key {
                    "uid" => params.uid = Some(parsed),
                    "gid" => params.gid = Some(parsed),
                    // matched on prefix, trailing characters are tolerated
                    k if k.starts_with("tcp-retry-count") => {
                        params.tcp_retry_count = Some(parsed)
                    }
                    _ => return Err(LocatorError::UnknownParam(key.to_owned())),
                }
            }
        }

        Ok(RemoteTarget {
            server: server.to_owned(),
            export: export.to_owned(),
            path: path.to_owned(),
            params,
        })
    }
}
