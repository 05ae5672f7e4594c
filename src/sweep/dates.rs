use crate::config::DateRangeSection;
use crate::ConfigError;
use chrono::{Duration, NaiveDate};

/// One check-in iteration within a configured date range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSweep {
    pub check_in: NaiveDate,

    /// Stay-length override; falls back to the global setting when absent
    pub nights: Option<u32>,

    /// Resume/grouping label; the ISO check-in date when range-generated
    pub label: Option<String>,
}

impl DateSweep {
    pub fn new(check_in: NaiveDate) -> Self {
        Self {
            check_in,
            nights: None,
            label: None,
        }
    }

    /// Label used in log lines, falling back to the check-in date
    pub fn label_text(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.check_in.format("%Y-%m-%d").to_string())
    }
}

/// A parsed date expression: either a fixed calendar date or an offset
/// relative to "today" that is resolved at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateExpr {
    Absolute(NaiveDate),
    RelativeDays(i64),
}

impl DateExpr {
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Absolute(date) => *date,
            Self::RelativeDays(days) => today + Duration::days(*days),
        }
    }
}

/// Parses a date expression: ISO 8601 (`2026-01-15`), `today`, or a relative
/// offset such as `+14d`, `+2w`, `+1m` (months are 30-day blocks).
/// `today+14d` is accepted as an alias for `+14d`.
pub fn parse_date_expr(value: &str) -> Result<DateExpr, ConfigError> {
    let text = value.trim();
    let lowered = text.to_ascii_lowercase();

    if lowered == "today" {
        return Ok(DateExpr::RelativeDays(0));
    }

    let relative = if let Some(rest) = lowered.strip_prefix("today+") {
        Some(rest)
    } else {
        lowered.strip_prefix('+')
    };

    if let Some(rest) = relative {
        let (count_str, unit) = rest.split_at(rest.len().saturating_sub(1));
        let count: i64 = count_str.parse().map_err(|_| {
            ConfigError::InvalidDate(format!(
                "Unsupported relative date '{}'. Use forms like '+14d', '+2w', '+1m'.",
                value
            ))
        })?;
        let days = match unit {
            "d" => count,
            "w" => count * 7,
            "m" => count * 30,
            _ => {
                return Err(ConfigError::InvalidDate(format!(
                    "Unsupported relative date '{}'. Use forms like '+14d', '+2w', '+1m'.",
                    value
                )))
            }
        };
        return Ok(DateExpr::RelativeDays(days));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(DateExpr::Absolute)
        .map_err(|_| {
            ConfigError::InvalidDate(format!(
                "Invalid date '{}'. Provide ISO format (YYYY-MM-DD) or a relative offset.",
                value
            ))
        })
}

/// Generates the sweep series for a date range, labelling each sweep with
/// its ISO check-in date
pub fn generate_sweeps(
    range: &DateRangeSection,
    today: NaiveDate,
) -> Result<Vec<DateSweep>, ConfigError> {
    let start = parse_date_expr(&range.start)?.resolve(today);
    let end = range
        .end
        .as_deref()
        .map(|expr| parse_date_expr(expr).map(|e| e.resolve(today)))
        .transpose()?;

    let mut sweeps = Vec::new();
    let mut current = start;
    let mut generated = 0u32;
    loop {
        if let Some(end) = end {
            if current > end {
                break;
            }
        }
        if let Some(occurrences) = range.occurrences {
            if generated >= occurrences {
                break;
            }
        }
        sweeps.push(DateSweep {
            check_in: current,
            nights: range.nights,
            label: Some(current.format("%Y-%m-%d").to_string()),
        });
        generated += 1;
        current = current + Duration::days(range.step_days as i64);
    }
    Ok(sweeps)
}
