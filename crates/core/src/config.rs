use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};
use crate::time::parse_duration_str;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub listen_addr: String,
    pub metrics_endpoint: String,
    pub metrics_protocol: String,
    pub metrics_compression: String,
    pub metrics_headers: Vec<(String, String)>,
    pub metrics_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9000".to_string(),
            metrics_endpoint: "http://127.0.0.1:4317".to_string(),
            metrics_protocol: "grpc".to_string(),
            metrics_compression: "none".to_string(),
            metrics_headers: Vec::new(),
            metrics_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides();
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

}

/// Accepted spellings of `metrics_protocol`, compared case-insensitively.
pub const METRICS_PROTOCOLS: &[&str] = &["grpc", "http", "http/protobuf", "httpprotobuf"];

/// Accepted values of `metrics_compression`, compared case-insensitively.
pub const METRICS_COMPRESSIONS: &[&str] = &["none", "gzip"];

fn check_choice(field: &str, value: &str, allowed: &[&str], source: &str) -> Result<()> {
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
        return Ok(());
    }
    Err(ProbeError::Config(format!(
        "bad {field} in {source}: expected one of {} (value={value})",
        allowed.join(", ")
    )))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    listen_addr: Option<String>,
    metrics_endpoint: Option<String>,
    metrics_protocol: Option<String>,
    metrics_compression: Option<String>,
    metrics_headers: Option<String>,
    metrics_timeout: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("DIALPROBE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("dialprobe/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ProbeError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| ProbeError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> ConfigOverrides {
    ConfigOverrides {
        listen_addr: env::var("DIALPROBE_LISTEN_ADDR").ok(),
        metrics_endpoint: env::var("DIALPROBE_METRICS_ENDPOINT").ok(),
        metrics_protocol: env::var("DIALPROBE_METRICS_PROTOCOL").ok(),
        metrics_compression: env::var("DIALPROBE_METRICS_COMPRESSION").ok(),
        metrics_headers: env::var("DIALPROBE_METRICS_HEADERS").ok(),
        metrics_timeout: env::var("DIALPROBE_METRICS_TIMEOUT").ok(),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.listen_addr {
        cfg.listen_addr = v;
    }
    if let Some(v) = overrides.metrics_endpoint {
        cfg.metrics_endpoint = v;
    }
    if let Some(v) = overrides.metrics_protocol {
        check_choice("metrics_protocol", &v, METRICS_PROTOCOLS, source)?;
        cfg.metrics_protocol = v;
    }
    if let Some(v) = overrides.metrics_compression {
        check_choice("metrics_compression", &v, METRICS_COMPRESSIONS, source)?;
        cfg.metrics_compression = v;
    }
    if let Some(v) = overrides.metrics_headers {
        cfg.metrics_headers = parse_headers(&v).map_err(|e| {
            ProbeError::Config(format!("bad metrics_headers in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.metrics_timeout {
        cfg.metrics_timeout = parse_duration_str(&v).map_err(|e| {
            ProbeError::Config(format!("bad metrics_timeout in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}

fn parse_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(ProbeError::Config(
                "header entries must use key=value syntax".to_string(),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ProbeError::Config("header key cannot be empty".to_string()));
        }
        out.push((key.to_string(), value.trim().to_string()));
    }
    Ok(out)
}
