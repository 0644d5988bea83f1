//! Entity API types

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::api::types::{ApiError, default_limit, default_page, validate_limit, validate_page};
use crate::core::constants::{DEFAULT_PERIOD_DAYS, MAX_PERIOD_DAYS};
use crate::data::pendo::Period;

fn validate_days(days: u32) -> Result<(), ValidationError> {
    if days == 0 || i64::from(days) > MAX_PERIOD_DAYS {
        return Err(ValidationError::new("days_range")
            .with_message(format!("Days must be between 1 and {}", MAX_PERIOD_DAYS).into()));
    }
    Ok(())
}

/// Query params for listing entities
#[derive(Debug, Deserialize, Validate, ToSchema, IntoParams)]
pub struct ListEntitiesQuery {
    #[serde(default = "default_page")]
    #[validate(custom(function = "validate_page"))]
    pub page: u32,

    #[serde(default = "default_limit")]
    #[validate(custom(function = "validate_limit"))]
    pub limit: u32,
}

/// Reporting window for analytics endpoints
///
/// `start` and `end` are inclusive dates (`YYYY-MM-DD`). Without `start`,
/// the window is the `days` days ending at `end` (default today, UTC).
#[derive(Debug, Deserialize, Validate, ToSchema, IntoParams)]
pub struct PeriodQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,

    #[validate(custom(function = "validate_days"))]
    pub days: Option<u32>,
}

impl PeriodQuery {
    pub fn to_period(&self) -> Result<Period, ApiError> {
        let end = self.end.unwrap_or_else(|| Utc::now().date_naive());
        let period = match self.start {
            Some(start) => Period::new(start, end),
            None => Period::last_days(self.days.unwrap_or(DEFAULT_PERIOD_DAYS), end),
        };
        period.map_err(|e| ApiError::bad_request("INVALID_PERIOD", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_explicit_period() {
        let query = PeriodQuery {
            start: Some(date("2024-01-01")),
            end: Some(date("2024-01-07")),
            days: None,
        };
        let period = query.to_period().unwrap();
        assert_eq!(period.days(), 7);
    }

    #[test]
    fn test_days_window() {
        let query = PeriodQuery {
            start: None,
            end: Some(date("2024-01-30")),
            days: Some(30),
        };
        assert_eq!(query.to_period().unwrap().start, date("2024-01-01"));
    }

    #[test]
    fn test_inverted_period_is_rejected() {
        let query = PeriodQuery {
            start: Some(date("2024-02-01")),
            end: Some(date("2024-01-01")),
            days: None,
        };
        assert!(matches!(
            query.to_period(),
            Err(ApiError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_days_validation() {
        assert!(validate_days(0).is_err());
        assert!(validate_days(30).is_ok());
    }
}
