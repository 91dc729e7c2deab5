//! Line-based `key = value` configuration file parser.
//!
//! Grammar (matching `original_source/source/core/config_parser.cpp`):
//! `#` starts a comment (stripped before parsing), `key = value` pairs are
//! separated on the first `=`, surrounding whitespace is trimmed, and a
//! value wrapped in double quotes has the quotes stripped.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{OfsError, OfsResult};

/// Immutable configuration, fixed for the lifetime of a running instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub total_size: u64,
    pub header_size: u64,
    pub block_size: u64,
    pub max_files: usize,
    pub max_filename_length: usize,
    pub max_users: usize,
    pub admin_username: String,
    pub admin_password: String,
    pub require_auth: bool,
    pub port: u16,
    pub max_connections: usize,
    pub queue_timeout: u64,
}

impl Config {
    /// Parses a config file from `path`.
    pub fn load(path: impl AsRef<Path>) -> OfsResult<Config> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| OfsError::InvalidConfig(format!("could not open config file: {e}")))?;
        Self::parse(&text)
    }

    /// Parses config text directly; split out from `load` so tests don't
    /// need a filesystem fixture.
    pub fn parse(text: &str) -> OfsResult<Config> {
        let mut values: HashMap<String, String> = HashMap::new();

        for raw_line in text.lines() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let Some(sep) = line.find('=') else { continue };
            let key = line[..sep].trim();
            let mut value = line[sep + 1..].trim();
            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }
            if key.is_empty() || value.is_empty() {
                continue;
            }
            values.insert(key.to_string(), value.to_string());
        }

        let get = |k: &str| values.get(k).cloned();
        let parse_u64 = |k: &str, v: &str| {
            v.parse::<u64>()
                .map_err(|e| OfsError::InvalidConfig(format!("key '{k}' with value '{v}': {e}")))
        };
        let parse_usize = |k: &str, v: &str| {
            v.parse::<usize>()
                .map_err(|e| OfsError::InvalidConfig(format!("key '{k}' with value '{v}': {e}")))
        };

        let total_size = match get("total_size") {
            Some(v) => parse_u64("total_size", &v)?,
            None => return Err(OfsError::InvalidConfig("missing key 'total_size'".into())),
        };
        let header_size = match get("header_size") {
            Some(v) => parse_u64("header_size", &v)?,
            None => 0,
        };
        let block_size = match get("block_size") {
            Some(v) => parse_u64("block_size", &v)?,
            None => return Err(OfsError::InvalidConfig("missing key 'block_size'".into())),
        };
        let max_files = match get("max_files") {
            Some(v) => parse_usize("max_files", &v)?,
            None => return Err(OfsError::InvalidConfig("missing key 'max_files'".into())),
        };
        let max_filename_length = match get("max_filename_length") {
            Some(v) => parse_usize("max_filename_length", &v)?,
            None => 255,
        };
        let max_users = match get("max_users") {
            Some(v) => parse_usize("max_users", &v)?,
            None => return Err(OfsError::InvalidConfig("missing key 'max_users'".into())),
        };
        let admin_username = get("admin_username")
            .ok_or_else(|| OfsError::InvalidConfig("missing key 'admin_username'".into()))?;
        let admin_password = get("admin_password")
            .ok_or_else(|| OfsError::InvalidConfig("missing key 'admin_password'".into()))?;
        let require_auth = get("require_auth").map(|v| v == "true").unwrap_or(false);
        let port = match get("port") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|e| OfsError::InvalidConfig(format!("key 'port' with value '{v}': {e}")))?,
            None => 8080,
        };
        let max_connections = match get("max_connections") {
            Some(v) => parse_usize("max_connections", &v)?,
            None => 64,
        };
        let queue_timeout = match get("queue_timeout") {
            Some(v) => parse_u64("queue_timeout", &v)?,
            None => 0,
        };

        Ok(Config {
            total_size,
            header_size,
            block_size,
            max_files,
            max_filename_length,
            max_users,
            admin_username,
            admin_password,
            require_auth,
            port,
            max_connections,
            queue_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_and_quotes() {
        let text = r#"
            # a comment
            total_size = 1048576
            block_size=4096
            max_files = 64
            max_users = 16
            admin_username = "admin"
            admin_password="admin"
            require_auth = true
            port = 9090
            max_connections = 8
            queue_timeout = 30
        "#;
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.total_size, 1048576);
        assert_eq!(cfg.block_size, 4096);
        assert_eq!(cfg.max_files, 64);
        assert_eq!(cfg.max_users, 16);
        assert_eq!(cfg.admin_username, "admin");
        assert_eq!(cfg.admin_password, "admin");
        assert!(cfg.require_auth);
        assert_eq!(cfg.port, 9090);
    }

    #[test]
    fn missing_required_key_is_invalid_config() {
        let text = "block_size = 4096\n";
        assert!(matches!(Config::parse(text), Err(OfsError::InvalidConfig(_))));
    }

    #[test]
    fn unparsable_value_is_invalid_config() {
        let text = "total_size = not_a_number\nblock_size=4096\nmax_files=1\nmax_users=1\nadmin_username=a\nadmin_password=b\n";
        assert!(matches!(Config::parse(text), Err(OfsError::InvalidConfig(_))));
    }
}
