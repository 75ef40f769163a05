use crate::calendar::{with_year_overflowing, DateRange};
use crate::error::{AmcError, Result};
use chrono::{Datelike, Days, NaiveDateTime, NaiveTime};
use std::ops::RangeInclusive;

/// One contract year: `[start + k years, start + (k + 1) years - 1 day]`, inclusive.
///
/// Year offsets substitute the year field directly (see
/// [`with_year_overflowing`]), so a Feb 29 start rolls into Mar 1 in non-leap years
/// instead of clamping to Feb 28.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractYearWindow {
    pub index: usize,
    /// Keeps the time-of-day of the contract start.
    pub start: NaiveDateTime,
    /// Always 23:59:59.999 on the last day of the window.
    pub end: NaiveDateTime,
}

impl ContractYearWindow {
    pub fn new(contract_start: NaiveDateTime, index: usize) -> Result<Self> {
        let offset = i32::try_from(index)
            .map_err(|_| AmcError::DateError(format!("Contract year {} is out of range", index)))?;
        let base_year = contract_start.year();

        let start_year = checked_year(base_year, offset)?;
        let next_year = checked_year(start_year, 1)?;

        let start_date = with_year_overflowing(contract_start.date(), start_year)?;
        let end_date = with_year_overflowing(contract_start.date(), next_year)?
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| {
                AmcError::DateError(format!(
                    "Contract year {} ends before the supported date range",
                    index
                ))
            })?;

        Ok(Self {
            index,
            start: start_date.and_time(contract_start.time()),
            end: end_date.and_time(end_of_day()),
        })
    }

    /// The window as whole calendar days.
    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start.date(), self.end.date())
    }

    /// Calendar years touched by the window (one or two).
    pub fn calendar_years(&self) -> RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }
}

/// Windows for contract years `0..count`.
pub fn contract_year_windows(
    contract_start: NaiveDateTime,
    count: usize,
) -> Result<Vec<ContractYearWindow>> {
    (0..count)
        .map(|index| ContractYearWindow::new(contract_start, index))
        .collect()
}

fn checked_year(year: i32, offset: i32) -> Result<i32> {
    year.checked_add(offset)
        .ok_or_else(|| AmcError::DateError(format!("Year {} + {} overflows", year, offset)))
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at_midnight(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let window = ContractYearWindow::new(at_midnight(2027, 3, 15), 1).unwrap();
        assert_eq!(window.start, at_midnight(2028, 3, 15));
        assert_eq!(
            window.end,
            NaiveDate::from_ymd_opt(2029, 3, 14)
                .unwrap()
                .and_hms_milli_opt(23, 59, 59, 999)
                .unwrap()
        );
        assert_eq!(window.calendar_years(), 2028..=2029);
        assert_eq!(window.date_range().days(), 365);
    }

    #[test]
    fn test_window_keeps_time_of_day() {
        let start = NaiveDate::from_ymd_opt(2027, 7, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let window = ContractYearWindow::new(start, 2).unwrap();
        assert_eq!(window.start.time(), start.time());
        assert_eq!(window.start.date(), NaiveDate::from_ymd_opt(2029, 7, 5).unwrap());
    }

    #[test]
    fn test_jan_first_start_stays_in_one_calendar_year() {
        let window = ContractYearWindow::new(at_midnight(2027, 1, 1), 0).unwrap();
        assert_eq!(window.end.date(), NaiveDate::from_ymd_opt(2027, 12, 31).unwrap());
        assert_eq!(window.calendar_years(), 2027..=2027);
    }

    #[test]
    fn test_leap_day_start_overflows() {
        let windows = contract_year_windows(at_midnight(2028, 2, 29), 2).unwrap();

        // Feb 29 2029 does not exist: the end of year 0 is the day before Mar 1.
        assert_eq!(windows[0].end.date(), NaiveDate::from_ymd_opt(2029, 2, 28).unwrap());
        assert_eq!(windows[1].start.date(), NaiveDate::from_ymd_opt(2029, 3, 1).unwrap());
        assert_eq!(windows[1].end.date(), NaiveDate::from_ymd_opt(2030, 2, 28).unwrap());
    }

    #[test]
    fn test_consecutive_windows_tile() {
        let windows = contract_year_windows(at_midnight(2026, 11, 20), 4).unwrap();
        for pair in windows.windows(2) {
            let next_day = pair[0].end.date().succ_opt().unwrap();
            assert_eq!(next_day, pair[1].start.date());
        }
    }
}
