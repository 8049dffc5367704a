//! Config file loader and serialization.

use nalgebra::Vector3;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::RunConfig;
use crate::error::ConfigError;
use crate::models::{MarkerTable, Sequence};

fn read_existing(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.display().to_string())
        } else {
            ConfigError::IoError(e)
        }
    })
}

/// Load `recon.toml`, falling back to defaults when the file is absent.
pub fn load_run_config(path: &Path) -> Result<RunConfig, ConfigError> {
    if !path.exists() {
        log::info!(
            "[Config] {} not found, using built-in defaults",
            path.display()
        );
        return Ok(RunConfig::default());
    }

    let content = read_existing(path)?;
    let config: RunConfig = toml::from_str(&content)?;
    log::info!("[Config] Loaded run configuration from {}", path.display());
    Ok(config)
}

/// Load the marker reference table (`label -> [x, y, z]`).
pub fn load_marker_table(path: &Path) -> Result<MarkerTable, ConfigError> {
    let content = read_existing(path)?;
    let raw: BTreeMap<String, Vec<f64>> = serde_json::from_str(&content)?;

    raw.into_iter()
        .map(|(label, coords)| match coords.as_slice() {
            [x, y, z] if coords.iter().all(|c| c.is_finite()) => {
                Ok((label, Vector3::new(*x, *y, *z)))
            }
            _ => Err(ConfigError::ValidationFailed(format!(
                "Marker '{}' must have exactly three finite coordinates, got {:?}",
                label, coords
            ))),
        })
        .collect()
}

/// Fail with `FileNotFound` unless `path` is an existing regular file.
pub fn require_input_file(path: &Path) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::FileNotFound(path.display().to_string()))
    }
}

/// Load the cached sequence list.
pub fn load_sequences(path: &Path) -> Result<Vec<Sequence>, ConfigError> {
    let content = read_existing(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the sequence list via a temp file in the same directory, then rename.
pub fn save_sequences(path: &Path, sequences: &[Sequence]) -> Result<(), ConfigError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(sequences)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(path).map_err(|e| ConfigError::IoError(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::settings::Accuracy;
    use tempfile::TempDir;

    #[test]
    fn test_missing_run_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_run_config(&temp_dir.path().join("recon.toml")).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_partial_run_config_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("recon.toml");
        fs::write(
            &path,
            r#"
[region]
size = [2.0, 3.0, 2.0]

[stages.matching]
accuracy = "medium"

[engine]
program = "/opt/engine/host"
"#,
        )
        .unwrap();

        let config = load_run_config(&path).unwrap();
        assert_eq!(config.region.size, [2.0, 3.0, 2.0]);
        assert_eq!(config.region.center, [0.0, 1.25, 0.0]);
        assert_eq!(config.stages.matching.accuracy, Accuracy::Medium);
        assert!(config.stages.matching.filter_mask);
        assert_eq!(config.engine.program, "/opt/engine/host");
        assert_eq!(config.catalog.realm, "realm1");
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("recon.toml");
        fs::write(&path, "[region\nsize = ").unwrap();
        assert!(matches!(
            load_run_config(&path),
            Err(ConfigError::InvalidToml(_))
        ));
    }

    #[test]
    fn test_load_marker_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("markers.json");
        fs::write(&path, r#"{"target 1": [1, 2, 3], "target 2": [0.5, 0, -1]}"#).unwrap();

        let table = load_marker_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("target 1"), Some(&Vector3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_marker_with_wrong_arity_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("markers.json");
        fs::write(&path, r#"{"target 1": [1, 2]}"#).unwrap();
        assert!(matches!(
            load_marker_table(&path),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_missing_marker_file() {
        let result = load_marker_table(Path::new("/nonexistent/markers.json"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_require_input_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cameras.xml");
        assert!(require_input_file(&path).is_err());
        fs::write(&path, "<document/>").unwrap();
        assert!(require_input_file(&path).is_ok());
    }

    #[test]
    fn test_save_then_load_sequences() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/sequences.json");
        let sequences = vec![Sequence::new(1, "Chair"), Sequence::new(2, "Lamp")];

        save_sequences(&path, &sequences).unwrap();
        assert_eq!(load_sequences(&path).unwrap(), sequences);
    }
}
