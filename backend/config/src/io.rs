//! Config file reading.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Resolve the config path: explicit path, then `VENDORSCOPE_CONFIG`, then `./config.yml`.
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("VENDORSCOPE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

/// Read the config file as an untyped value tree.
///
/// Returns an empty object if the file doesn't exist, so a run can be driven
/// entirely from the command line.
pub async fn load_config_value(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let value = parse_config_value(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(value)
}

/// Parse YAML text into a value tree. An empty document is an empty object.
pub fn parse_config_value(raw: &str) -> Result<Value> {
    let value: Value = serde_yaml::from_str(raw)?;
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::VendorScopeConfig;

    #[test]
    fn parses_camel_case_yaml() {
        let raw = "vendorId: 755\nsiteList: sitelists/top.txt\ntimeouts:\n  pingMs: 5000\n";
        let value = parse_config_value(raw).unwrap();
        let cfg: VendorScopeConfig = serde_json::from_value(value).unwrap();
        assert_eq!(cfg.vendor_id, Some(755));
        assert_eq!(cfg.site_list.unwrap(), PathBuf::from("sitelists/top.txt"));
        assert_eq!(cfg.timeouts.unwrap().ping_ms, Some(5000));
    }

    #[test]
    fn empty_document_is_empty_object() {
        assert_eq!(parse_config_value("").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn explicit_path_wins() {
        let p = config_file_path(Some(Path::new("/tmp/custom.yml")));
        assert_eq!(p, PathBuf::from("/tmp/custom.yml"));
    }

    #[tokio::test]
    async fn missing_file_is_empty_object() {
        let value = load_config_value(Path::new("/definitely/not/here/config.yml"))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
