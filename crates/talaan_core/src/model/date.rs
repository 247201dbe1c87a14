//! Calendar date value type used for birthdates and age evaluation.
//!
//! # Responsibility
//! - Represent a proleptic-Gregorian calendar date as `YYYY-MM-DD`.
//! - Provide whole-year age computation against an evaluation date.
//!
//! # Invariants
//! - A constructed `CivilDate` is always a real calendar day.
//! - The wire/storage form is always the zero-padded `YYYY-MM-DD` string.

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

const SECONDS_PER_DAY: i64 = 86_400;

/// Errors from parsing or constructing calendar dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CivilDateError {
    /// Input does not match the `YYYY-MM-DD` shape.
    InvalidFormat(String),
    /// Components parsed but do not name a real calendar day.
    OutOfRange { year: i32, month: u8, day: u8 },
}

impl Display for CivilDateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(value) => {
                write!(f, "invalid date `{value}`, expected YYYY-MM-DD")
            }
            Self::OutOfRange { year, month, day } => {
                write!(f, "date {year:04}-{month:02}-{day:02} is not a calendar day")
            }
        }
    }
}

impl Error for CivilDateError {}

/// Calendar date with day precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CivilDate {
    year: i32,
    month: u8,
    day: u8,
}

impl CivilDate {
    /// Creates a date after validating it names a real calendar day.
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self, CivilDateError> {
        if month < 1 || month > 12 || day < 1 || day > days_in_month(year, month) {
            return Err(CivilDateError::OutOfRange { year, month, day });
        }
        Ok(Self { year, month, day })
    }

    /// Parses the canonical `YYYY-MM-DD` form.
    pub fn parse(value: &str) -> Result<Self, CivilDateError> {
        let invalid = || CivilDateError::InvalidFormat(value.to_string());

        let bytes = value.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(invalid());
        }
        let year: i32 = value[0..4].parse().map_err(|_| invalid())?;
        let month: u8 = value[5..7].parse().map_err(|_| invalid())?;
        let day: u8 = value[8..10].parse().map_err(|_| invalid())?;
        Self::new(year, month, day)
    }

    /// Converts days since 1970-01-01 into a calendar date.
    ///
    /// Days-to-civil conversion follows the standard era/day-of-era
    /// decomposition, exact for the whole proleptic-Gregorian range used
    /// here.
    pub fn from_unix_days(days: i64) -> Self {
        let z = days + 719_468;
        let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
        let month = if mp < 10 { (mp + 3) as u8 } else { (mp - 9) as u8 };
        let march_year = yoe + era * 400;
        let year = if month <= 2 { march_year + 1 } else { march_year };
        Self {
            year: year as i32,
            month,
            day,
        }
    }

    /// Returns the current date in UTC.
    pub fn today() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0);
        Self::from_unix_days(seconds / SECONDS_PER_DAY)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    /// Whole completed years between `self` and `as_of`.
    ///
    /// Negative when `as_of` precedes `self`; callers treat out-of-window
    /// ages as disqualifying rather than rejecting them here.
    pub fn age_on(&self, as_of: CivilDate) -> i32 {
        let mut age = as_of.year - self.year;
        if (as_of.month, as_of.day) < (self.month, self.day) {
            age -= 1;
        }
        age
    }
}

impl Display for CivilDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl Serialize for CivilDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CivilDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(SerdeError::custom)
    }
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::{CivilDate, CivilDateError};

    #[test]
    fn parse_accepts_canonical_form() {
        let date = CivilDate::parse("1984-06-09").unwrap();
        assert_eq!(date.year(), 1984);
        assert_eq!(date.month(), 6);
        assert_eq!(date.day(), 9);
        assert_eq!(date.to_string(), "1984-06-09");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for value in ["1984/06/09", "1984-6-9", "19840609", "1984-06-09T00:00"] {
            let err = CivilDate::parse(value).unwrap_err();
            assert!(matches!(err, CivilDateError::InvalidFormat(_)), "{value}");
        }
    }

    #[test]
    fn new_rejects_impossible_days() {
        assert!(matches!(
            CivilDate::new(2023, 2, 29),
            Err(CivilDateError::OutOfRange { .. })
        ));
        assert!(matches!(
            CivilDate::new(2023, 13, 1),
            Err(CivilDateError::OutOfRange { .. })
        ));
        assert!(matches!(
            CivilDate::new(2023, 4, 31),
            Err(CivilDateError::OutOfRange { .. })
        ));
    }

    #[test]
    fn leap_day_is_valid_only_in_leap_years() {
        assert!(CivilDate::new(2024, 2, 29).is_ok());
        assert!(CivilDate::new(2000, 2, 29).is_ok());
        assert!(CivilDate::new(1900, 2, 29).is_err());
    }

    #[test]
    fn from_unix_days_matches_known_dates() {
        assert_eq!(CivilDate::from_unix_days(0), CivilDate::new(1970, 1, 1).unwrap());
        assert_eq!(
            CivilDate::from_unix_days(19_723),
            CivilDate::new(2024, 1, 1).unwrap()
        );
        assert_eq!(
            CivilDate::from_unix_days(-1),
            CivilDate::new(1969, 12, 31).unwrap()
        );
    }

    #[test]
    fn age_counts_completed_years_only() {
        let birth = CivilDate::new(1964, 8, 15).unwrap();
        let day_before = CivilDate::new(2024, 8, 14).unwrap();
        let birthday = CivilDate::new(2024, 8, 15).unwrap();
        assert_eq!(birth.age_on(day_before), 59);
        assert_eq!(birth.age_on(birthday), 60);
    }

    #[test]
    fn age_is_negative_before_birth() {
        let birth = CivilDate::new(2030, 1, 1).unwrap();
        let as_of = CivilDate::new(2024, 1, 1).unwrap();
        assert!(birth.age_on(as_of) < 0);
    }

    #[test]
    fn leap_birthday_rolls_over_on_march_first() {
        let birth = CivilDate::new(2004, 2, 29).unwrap();
        assert_eq!(birth.age_on(CivilDate::new(2023, 2, 28).unwrap()), 18);
        assert_eq!(birth.age_on(CivilDate::new(2023, 3, 1).unwrap()), 19);
    }

    #[test]
    fn dates_order_chronologically() {
        let earlier = CivilDate::new(2020, 5, 1).unwrap();
        let later = CivilDate::new(2020, 5, 2).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn serde_round_trips_as_string() {
        let date = CivilDate::new(1999, 12, 31).unwrap();
        let json = serde_json::to_value(date).unwrap();
        assert_eq!(json, serde_json::json!("1999-12-31"));
        let decoded: CivilDate = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, date);
    }

    #[test]
    fn deserialize_rejects_invalid_date() {
        let err = serde_json::from_value::<CivilDate>(serde_json::json!("2023-02-30")).unwrap_err();
        assert!(err.to_string().contains("not a calendar day"));
    }
}
