//! Modular configuration loader.
//!
//! Supports loading configuration from multiple files in one directory:
//! - `config.json` - Core configuration
//! - `secrets.json` - Credentials (API keys), deep-merged over the core file

use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result, ResultExt};

/// Configuration file names, in merge order.
pub const CONFIG_FILES: &[&str] = &["config.json", "secrets.json"];

/// Load a JSON file and return its contents as a Value.
/// Returns None if file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;

    let value: Value =
        serde_json::from_str(&content).context(format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
pub fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => {
                        merge_json(target_value, source_value);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load and merge every configuration file present in `dir`.
///
/// Priority (lowest to highest):
/// 1. `config.json`
/// 2. `secrets.json`
/// 3. Environment variables (applied separately)
pub fn load_modular_config(dir: &Path) -> Result<Value> {
    let mut config = Value::Object(Default::default());

    tracing::debug!("Loading modular config from {}", dir.display());

    for file in CONFIG_FILES {
        if let Some(value) = load_json_file(&dir.join(file))? {
            // Meta-fields like "$schema" are editor hints, not settings
            let value = match value {
                Value::Object(map) => Value::Object(
                    map.into_iter()
                        .filter(|(key, _)| !key.starts_with('$'))
                        .collect(),
                ),
                _ => {
                    return Err(Error::Config(format!(
                        "{} must contain a JSON object",
                        dir.join(file).display()
                    )))
                }
            };
            merge_json(&mut config, value);
            tracing::debug!("Loaded {}", file);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json_objects() {
        let mut target = json!({
            "a": 1,
            "b": {
                "x": 10,
                "y": 20
            }
        });

        let source = json!({
            "b": {
                "y": 25,
                "z": 30
            },
            "c": 3
        });

        merge_json(&mut target, source);

        assert_eq!(target["a"], 1);
        assert_eq!(target["b"]["x"], 10);
        assert_eq!(target["b"]["y"], 25);
        assert_eq!(target["b"]["z"], 30);
        assert_eq!(target["c"], 3);
    }

    #[test]
    fn test_merge_json_overwrite_non_object() {
        let mut target = json!({ "a": [1, 2, 3] });
        let source = json!({ "a": [4, 5] });

        merge_json(&mut target, source);

        assert_eq!(target["a"], json!([4, 5]));
    }

    #[test]
    fn test_load_modular_config_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let value = load_modular_config(dir.path()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_load_modular_config_strips_schema_and_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"$schema": "https://example.test/schema.json", "context": {"enabled": false}}"#,
        )
        .unwrap();
        let value = load_modular_config(dir.path()).unwrap();
        assert!(value.get("$schema").is_none());
        assert_eq!(value["context"]["enabled"], false);

        fs::write(dir.path().join("secrets.json"), "{not json").unwrap();
        let err = load_modular_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("secrets.json"));

        fs::write(dir.path().join("secrets.json"), "[1, 2]").unwrap();
        let err = load_modular_config(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
