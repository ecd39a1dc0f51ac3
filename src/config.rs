use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::matcher::EndpointRule;

pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_RATE_WINDOW_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_RATE_LIMIT: u64 = 1000;
pub const DEFAULT_MAX_BODY_CAPTURE: usize = 1024 * 1024;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "ip-gatekeeper")]
#[command(about = "Reverse proxy that bans abusive addresses and logs selected requests")]
pub struct Args {
    // Port to run the guarded proxy on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Listen address for health, metrics and ban administration
    #[arg(long, default_value = "127.0.0.1:9090")]
    pub admin_addr: String,

    // Upstream that admitted requests are forwarded to
    #[arg(short, long, default_value = "http://localhost:3000")]
    pub upstream: String,

    // Directory holding blockedIps.json, rateLimit.json and requests.json
    #[arg(short, long, default_value = "logs")]
    pub data_dir: PathBuf,

    // Guard configuration file (JSON); defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    // Optional address -> location table (JSON object)
    #[arg(long)]
    pub geo_table: Option<PathBuf>,
}

/// Rate limiting settings passed to every observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in milliseconds.
    pub window: u64,
    /// Requests allowed per window; the next one bans the address.
    pub limit: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_RATE_WINDOW_MS,
            limit: DEFAULT_RATE_LIMIT,
        }
    }
}

/// Guard configuration, read from the JSON file named by `--config`.
///
/// Every key is optional:
///
/// ```json
/// {
///   "saveEndpoints": [{ "method": "*", "endpoint": "/api/*" }],
///   "maxSize": 10485760,
///   "rateLimitConfig": { "window": 1800000, "limit": 1000 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GuardConfig {
    pub save_endpoints: Vec<EndpointRule>,
    /// Request log size, in bytes, past which the log is wiped.
    pub max_size: u64,
    pub rate_limit_config: RateLimitConfig,
    /// Larger request bodies are logged as `null`.
    pub max_body_capture: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            save_endpoints: Vec::new(),
            max_size: DEFAULT_MAX_SIZE,
            rate_limit_config: RateLimitConfig::default(),
            max_body_capture: DEFAULT_MAX_BODY_CAPTURE,
        }
    }
}

impl GuardConfig {
    pub fn from_json(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let config: GuardConfig = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for rule in &self.save_endpoints {
            if rule.endpoint.matches('*').count() > 1 {
                return Err(ConfigError::Pattern(rule.endpoint.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<GuardConfig, ConfigError> {
        GuardConfig::from_json(Path::new("guard.json"), raw)
    }

    #[test]
    fn empty_object_gives_defaults() {
        let config = parse("{}").unwrap();
        assert_eq!(config, GuardConfig::default());
        assert!(config.save_endpoints.is_empty());
        assert_eq!(config.max_size, 10 * 1024 * 1024);
        assert_eq!(config.rate_limit_config.window, 1_800_000);
        assert_eq!(config.rate_limit_config.limit, 1000);
    }

    #[test]
    fn partial_rate_limit_config_keeps_other_default() {
        let config = parse(r#"{"rateLimitConfig": {"limit": 5}}"#).unwrap();
        assert_eq!(config.rate_limit_config.limit, 5);
        assert_eq!(config.rate_limit_config.window, DEFAULT_RATE_WINDOW_MS);
    }

    #[test]
    fn parses_full_config() {
        let config = parse(
            r#"{
                "saveEndpoints": [
                    {"method": "*", "endpoint": "/api/*"},
                    {"method": "POST", "endpoint": "/login"}
                ],
                "maxSize": 2048,
                "rateLimitConfig": {"window": 1000, "limit": 3},
                "maxBodyCapture": 512
            }"#,
        )
        .unwrap();

        assert_eq!(config.save_endpoints.len(), 2);
        assert_eq!(config.save_endpoints[1].method, "POST");
        assert_eq!(config.save_endpoints[1].endpoint, "/login");
        assert_eq!(config.max_size, 2048);
        assert_eq!(
            config.rate_limit_config,
            RateLimitConfig {
                window: 1000,
                limit: 3
            }
        );
        assert_eq!(config.max_body_capture, 512);
    }

    #[test]
    fn rejects_double_wildcard() {
        let err = parse(r#"{"saveEndpoints": [{"method": "*", "endpoint": "/a/*/b/*"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Pattern(p) if p == "/a/*/b/*"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(parse("{"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GuardConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
