use crate::config::types::Settings;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Loads and parses a run configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Settings)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let settings: Settings = toml::from_str(&content)?;

    validate(&settings)?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SweepPriority;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
profile = "weekly-europe"

[search]
destinations = ["tokyo", "group:Europe"]
nights = 3
adults = 2
program-filter = ["FHR"]

[date-range]
start = "+14d"
occurrences = 4
step-days = 7

[sweep]
priority = "destination-first"
pause-seconds = 2.5
max-consecutive-backend-failures = 3

[session]
base-url = "https://travel.example.com"
username = "user@example.com"
password = "secret"

[storage]
database-path = "./test.db"
journal-mode = "wal"
synchronous = "normal"

[catalog]
path = "./destinations.json"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let settings = load_config(file.path()).unwrap();

        assert_eq!(settings.profile, "weekly-europe");
        assert_eq!(settings.search.nights, 3);
        assert_eq!(settings.search.destinations.len(), 2);
        assert_eq!(settings.sweep.priority, SweepPriority::DestinationFirst);
        assert_eq!(settings.sweep.pause_seconds, 2.5);
        let range = settings.date_range.unwrap();
        assert_eq!(range.occurrences, Some(4));
        assert_eq!(range.step_days, 7);
    }

    #[test]
    fn test_defaults_applied() {
        let config = r#"
[session]
base-url = "https://travel.example.com"
"#;
        let file = create_temp_config(config);
        let settings = load_config(file.path()).unwrap();

        assert_eq!(settings.search.nights, 3);
        assert_eq!(settings.search.adults, 2);
        assert_eq!(settings.sweep.priority, SweepPriority::SweepFirst);
        assert!(settings.sweep.resume_completed);
        assert_eq!(settings.sweep.max_consecutive_backend_failures, 3);
        assert_eq!(settings.storage.journal_mode, "wal");
        assert_eq!(settings.storage.busy_timeout_ms, 2000);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/run_config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config = r#"
[session]
base-url = "https://travel.example.com"

[storage]
journal-mode = "bogus"
"#;
        let file = create_temp_config(config);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }
}
