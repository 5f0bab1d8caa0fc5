use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use robo_advisor_core::EngineConfig;

/// Read a JSON file and deserialise into a typed struct.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = read_text(path)?;
    let value: T = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

pub fn read_text(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    Ok(contents)
}

/// Engine configuration: `.json` files parse as JSON, anything else as YAML.
pub fn read_config(path: &str) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = read_text(path)?;
    let is_json = canonical
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let config = if is_json {
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    } else {
        serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    };
    Ok(config)
}

/// Resolve and validate the path.
fn resolve_path(path: &str) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_yaml_config_overrides_defaults() {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(f, "drift_threshold: \"0.03\"\nbenchmark_symbol: VTI").unwrap();
        let config = read_config(f.path().to_str().unwrap()).unwrap();
        assert_eq!(config.drift_threshold, dec!(0.03));
        assert_eq!(config.benchmark_symbol, "VTI");
        assert_eq!(config.frontier_points, EngineConfig::default().frontier_points);
    }

    #[test]
    fn test_json_config_by_extension() {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(f, r#"{{"tax_rate": "0.25"}}"#).unwrap();
        let config = read_config(f.path().to_str().unwrap()).unwrap();
        assert_eq!(config.tax_rate, dec!(0.25));
    }

    #[test]
    fn test_missing_file() {
        let err = read_text("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
