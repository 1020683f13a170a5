use chrono::{DateTime, Duration, Utc};

use crate::model::CapacityError;

/// Parses a whole-day ISO-8601 duration (`P<n>D`) into a day count.
pub fn parse_horizon_days(horizon: &str) -> Result<u32, CapacityError> {
    let malformed = || CapacityError::MalformedHorizon(horizon.to_string());
    let digits = horizon
        .strip_prefix('P')
        .and_then(|rest| rest.strip_suffix('D'))
        .ok_or_else(malformed)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    digits.parse::<u32>().map_err(|_| malformed())
}

/// `now + min(days, cap)` days.
#[must_use]
pub fn due_at(now: DateTime<Utc>, days: u32, cap_days: u32) -> DateTime<Utc> {
    now + Duration::days(i64::from(days.min(cap_days)))
}
