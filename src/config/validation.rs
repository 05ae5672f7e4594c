use crate::config::types::{
    DateRangeSection, SearchSection, SessionSection, Settings, StorageSection, SweepSection,
};
use crate::store::{JournalMode, SynchronousMode};
use crate::sweep::parse_date_expr;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Unknown durability modes, impossible date ranges, and malformed URLs are
/// rejected here, before any session or database is opened.
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    validate_search(&settings.search)?;
    if let Some(range) = &settings.date_range {
        validate_date_range(range)?;
    }
    validate_sweep(&settings.sweep)?;
    validate_session(&settings.session)?;
    validate_storage(&settings.storage)?;
    Ok(())
}

fn validate_search(search: &SearchSection) -> Result<(), ConfigError> {
    if search.nights < 1 {
        return Err(ConfigError::Validation(format!(
            "search.nights must be >= 1, got {}",
            search.nights
        )));
    }

    if search.adults < 1 {
        return Err(ConfigError::Validation(format!(
            "search.adults must be >= 1, got {}",
            search.adults
        )));
    }

    for key in &search.destinations {
        if key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "search.destinations entries cannot be blank".to_string(),
            ));
        }
    }

    if let Some(check_in) = &search.check_in {
        parse_date_expr(check_in)?;
    }

    Ok(())
}

fn validate_date_range(range: &DateRangeSection) -> Result<(), ConfigError> {
    if range.end.is_none() && range.occurrences.is_none() {
        return Err(ConfigError::Validation(
            "date-range requires either 'end' or 'occurrences'".to_string(),
        ));
    }

    if range.step_days < 1 {
        return Err(ConfigError::Validation(format!(
            "date-range.step-days must be >= 1, got {}",
            range.step_days
        )));
    }

    if let Some(occurrences) = range.occurrences {
        if occurrences < 1 {
            return Err(ConfigError::Validation(
                "date-range.occurrences must be >= 1".to_string(),
            ));
        }
    }

    if let Some(nights) = range.nights {
        if nights < 1 {
            return Err(ConfigError::Validation(
                "date-range.nights must be >= 1".to_string(),
            ));
        }
    }

    parse_date_expr(&range.start)?;
    if let Some(end) = &range.end {
        parse_date_expr(end)?;
    }

    Ok(())
}

fn validate_sweep(sweep: &SweepSection) -> Result<(), ConfigError> {
    if sweep.max_consecutive_backend_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "sweep.max-consecutive-backend-failures must be >= 1, got {}",
            sweep.max_consecutive_backend_failures
        )));
    }

    if sweep.pause_seconds < 0.0 || !sweep.pause_seconds.is_finite() {
        return Err(ConfigError::Validation(format!(
            "sweep.pause-seconds must be a non-negative number, got {}",
            sweep.pause_seconds
        )));
    }

    Ok(())
}

fn validate_session(session: &SessionSection) -> Result<(), ConfigError> {
    let url = Url::parse(&session.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid session.base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "session.base-url must be an http(s) URL, got scheme '{}'",
            url.scheme()
        )));
    }

    if session.login_timeout_seconds < 1 {
        return Err(ConfigError::Validation(
            "session.login-timeout-seconds must be >= 1".to_string(),
        ));
    }

    if session.poll_interval_seconds < 1 {
        return Err(ConfigError::Validation(
            "session.poll-interval-seconds must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageSection) -> Result<(), ConfigError> {
    if storage.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "storage.database-path cannot be empty".to_string(),
        ));
    }

    storage
        .journal_mode
        .parse::<JournalMode>()
        .map_err(ConfigError::Validation)?;

    storage
        .synchronous
        .parse::<SynchronousMode>()
        .map_err(ConfigError::Validation)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::CatalogSection;

    fn base_settings() -> Settings {
        Settings {
            profile: "test".to_string(),
            search: SearchSection {
                destinations: vec!["tokyo".to_string()],
                check_in: None,
                nights: 3,
                adults: 2,
                program_filter: vec![],
            },
            date_range: None,
            sweep: SweepSection::default(),
            session: SessionSection {
                base_url: "https://travel.example.com".to_string(),
                username: None,
                password: None,
                otp_code: None,
                storage_state_path: None,
                login_timeout_seconds: 45,
                poll_interval_seconds: 2,
            },
            storage: StorageSection::default(),
            catalog: CatalogSection::default(),
            manual_destination: None,
        }
    }

    #[test]
    fn test_valid_settings_pass() {
        assert!(validate(&base_settings()).is_ok());
    }

    #[test]
    fn test_rejects_zero_nights() {
        let mut settings = base_settings();
        settings.search.nights = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_rejects_unknown_journal_mode() {
        let mut settings = base_settings();
        settings.storage.journal_mode = "ledger".to_string();
        let err = validate(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_unknown_synchronous_mode() {
        let mut settings = base_settings();
        settings.storage.synchronous = "turbo".to_string();
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_rejects_date_range_without_bounds() {
        let mut settings = base_settings();
        settings.date_range = Some(DateRangeSection {
            start: "+14d".to_string(),
            end: None,
            occurrences: None,
            step_days: 1,
            nights: None,
        });
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut settings = base_settings();
        settings.session.base_url = "not a url".to_string();
        assert!(matches!(
            validate(&settings).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_rejects_bad_check_in_expression() {
        let mut settings = base_settings();
        settings.search.check_in = Some("+14q".to_string());
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_rejects_zero_failure_threshold() {
        let mut settings = base_settings();
        settings.sweep.max_consecutive_backend_failures = 0;
        assert!(validate(&settings).is_err());
    }
}
