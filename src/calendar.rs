//! Fixed fiscal-quarter calendar and the date arithmetic shared by the rest of the crate.
//!
//! Two year-shifting rules exist and are deliberately kept apart:
//!
//! - [`with_year_overflowing`] substitutes the year field and lets an impossible day roll
//!   forward into the next month (Feb 29 in a non-leap year becomes Mar 1). Contract-year
//!   windows use this rule.
//! - [`add_years_clamped`] shifts by whole months and clamps to the last day of the target
//!   month (Feb 29 + 1 year becomes Feb 28). The reference-date offset uses this rule.

use crate::error::{AmcError, Result};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum FiscalQuarter {
    /// Jan 5 - Apr 4
    Jfm,
    /// Apr 5 - Jul 4
    Amj,
    /// Jul 5 - Oct 4
    Jas,
    /// Oct 5 - Jan 4 of the following year
    Ond,
}

impl FiscalQuarter {
    pub const ALL: [FiscalQuarter; 4] = [
        FiscalQuarter::Jfm,
        FiscalQuarter::Amj,
        FiscalQuarter::Jas,
        FiscalQuarter::Ond,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FiscalQuarter::Jfm => "JFM",
            FiscalQuarter::Amj => "AMJ",
            FiscalQuarter::Jas => "JAS",
            FiscalQuarter::Ond => "OND",
        }
    }

    /// 0-based position within the year (Q1 = 0).
    pub fn order(self) -> usize {
        match self {
            FiscalQuarter::Jfm => 0,
            FiscalQuarter::Amj => 1,
            FiscalQuarter::Jas => 2,
            FiscalQuarter::Ond => 3,
        }
    }

    /// Inclusive date range of this quarter's occurrence that starts in `year`.
    pub fn range(self, year: i32) -> Result<DateRange> {
        let (start, end) = match self {
            FiscalQuarter::Jfm => (ymd(year, 1, 5)?, ymd(year, 4, 4)?),
            FiscalQuarter::Amj => (ymd(year, 4, 5)?, ymd(year, 7, 4)?),
            FiscalQuarter::Jas => (ymd(year, 7, 5)?, ymd(year, 10, 4)?),
            FiscalQuarter::Ond => (ymd(year, 10, 5)?, ymd(year + 1, 1, 4)?),
        };
        Ok(DateRange { start, end })
    }

    /// Number of days in this quarter's occurrence for `year` (90-92).
    pub fn total_days(self, year: i32) -> Result<i64> {
        Ok(self.range(year)?.days())
    }
}

impl fmt::Display for FiscalQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Inclusive length in days. Zero when `end` precedes `start`.
    pub fn days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }

    pub fn intersects(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Days shared by both ranges, `max(0, min(end) - max(start) + 1)`.
    pub fn overlap_days(&self, other: &DateRange) -> i64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        ((end - start).num_days() + 1).max(0)
    }
}

/// All four quarter occurrences that start in `year`, in Q1..Q4 order.
pub fn quarter_dates(year: i32) -> Result<[(FiscalQuarter, DateRange); 4]> {
    Ok([
        (FiscalQuarter::Jfm, FiscalQuarter::Jfm.range(year)?),
        (FiscalQuarter::Amj, FiscalQuarter::Amj.range(year)?),
        (FiscalQuarter::Jas, FiscalQuarter::Jas.range(year)?),
        (FiscalQuarter::Ond, FiscalQuarter::Ond.range(year)?),
    ])
}

pub fn overlap_days(a: &DateRange, b: &DateRange) -> i64 {
    a.overlap_days(b)
}

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Replaces the year of `date`, rolling an out-of-range day into the following month.
pub fn with_year_overflowing(date: NaiveDate, year: i32) -> Result<NaiveDate> {
    ymd(year, date.month(), 1)?
        .checked_add_days(Days::new(u64::from(date.day0())))
        .ok_or_else(|| {
            AmcError::DateError(format!("Cannot move {} into year {}", date, year))
        })
}

/// Shifts `date` by whole years, clamping to the end of the target month.
pub fn add_years_clamped(date: NaiveDate, years: i32) -> Result<NaiveDate> {
    let months = years
        .unsigned_abs()
        .checked_mul(12)
        .map(Months::new)
        .ok_or_else(|| AmcError::DateError(format!("Year offset {} is out of range", years)))?;
    let shifted = if years >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    };
    shifted.ok_or_else(|| AmcError::DateError(format!("Cannot add {} years to {}", years, date)))
}

/// Parses an ISO `YYYY-MM-DD` date, optionally followed by `THH:MM:SS[.fff]`.
pub fn parse_reference_date(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(date_time) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(date_time);
        }
    }

    Err(AmcError::InvalidInput(format!(
        "Invalid reference date '{}'. Expected YYYY-MM-DD",
        value
    )))
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        AmcError::DateError(format!(
            "Date {:04}-{:02}-{:02} is out of range",
            year, month, day
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_quarter_boundaries() {
        let quarters = quarter_dates(2027).unwrap();
        assert_eq!(quarters[0].1, DateRange::new(date(2027, 1, 5), date(2027, 4, 4)));
        assert_eq!(quarters[1].1, DateRange::new(date(2027, 4, 5), date(2027, 7, 4)));
        assert_eq!(quarters[2].1, DateRange::new(date(2027, 7, 5), date(2027, 10, 4)));
        assert_eq!(quarters[3].1, DateRange::new(date(2027, 10, 5), date(2028, 1, 4)));
    }

    #[test]
    fn test_leap_year_day_counts() {
        assert_eq!(FiscalQuarter::Jfm.total_days(2024).unwrap(), 91);
        assert_eq!(FiscalQuarter::Jfm.total_days(2023).unwrap(), 90);
        assert_eq!(FiscalQuarter::Amj.total_days(2023).unwrap(), 91);
        assert_eq!(FiscalQuarter::Jas.total_days(2023).unwrap(), 92);
        assert_eq!(FiscalQuarter::Ond.total_days(2023).unwrap(), 92);
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
    }

    #[test]
    fn test_overlap_basic() {
        let q = FiscalQuarter::Jfm.range(2027).unwrap();
        let window = DateRange::new(date(2027, 3, 15), date(2028, 3, 14));
        assert_eq!(q.overlap_days(&window), 21);

        let disjoint = DateRange::new(date(2027, 4, 5), date(2027, 5, 1));
        assert_eq!(q.overlap_days(&disjoint), 0);
        assert!(!q.intersects(&disjoint));
    }

    #[test]
    fn test_overlap_symmetry_random() {
        let mut rng = rand::thread_rng();
        let base = date(2020, 1, 1);

        for _ in 0..500 {
            let a_start = base + Days::new(rng.gen_range(0..2000));
            let a_end = a_start + Days::new(rng.gen_range(0..400));
            let b_start = base + Days::new(rng.gen_range(0..2000));
            let b_end = b_start + Days::new(rng.gen_range(0..400));

            let a = DateRange::new(a_start, a_end);
            let b = DateRange::new(b_start, b_end);

            assert_eq!(overlap_days(&a, &b), overlap_days(&b, &a));
            assert_eq!(overlap_days(&a, &a), a.days());
            assert_eq!(a.intersects(&b), overlap_days(&a, &b) > 0);
        }
    }

    #[test]
    fn test_year_substitution_overflows_leap_day() {
        let leap_day = date(2024, 2, 29);
        assert_eq!(with_year_overflowing(leap_day, 2025).unwrap(), date(2025, 3, 1));
        assert_eq!(with_year_overflowing(leap_day, 2028).unwrap(), date(2028, 2, 29));
        assert_eq!(
            with_year_overflowing(date(2023, 7, 14), 2031).unwrap(),
            date(2031, 7, 14)
        );
    }

    #[test]
    fn test_add_years_clamps_leap_day() {
        assert_eq!(add_years_clamped(date(2024, 2, 29), 3).unwrap(), date(2027, 2, 28));
        assert_eq!(add_years_clamped(date(2024, 2, 29), 4).unwrap(), date(2028, 2, 29));
        assert_eq!(add_years_clamped(date(2024, 5, 1), -1).unwrap(), date(2023, 5, 1));
    }

    #[test]
    fn test_parse_reference_date() {
        let parsed = parse_reference_date("2024-01-05").unwrap();
        assert_eq!(parsed.date(), date(2024, 1, 5));

        let with_time = parse_reference_date("2024-01-05T10:30:00").unwrap();
        assert_eq!(with_time.time(), NaiveTime::from_hms_opt(10, 30, 0).unwrap());

        assert!(matches!(
            parse_reference_date("18-Oct-21"),
            Err(AmcError::InvalidInput(_))
        ));
        assert!(parse_reference_date("2023-02-30").is_err());
    }
}
