//! Weekly expiry date calculation.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::fmt;

/// Exchange holidays, read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }
}

/// Expiry date of the weekly contract, rendered as `17JUL2025`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpiryLabel(NaiveDate);

impl ExpiryLabel {
    /// Width of the rendered label: `DD` + `MON` + `YYYY`.
    pub const WIDTH: usize = 9;

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Parse a rendered label back into a date.
    pub fn parse(label: &str) -> Option<Self> {
        if label.len() != Self::WIDTH || !label.is_ascii() {
            return None;
        }
        // Title-case the month so chrono's `%b` matches regardless of case
        let normalized = format!(
            "{}{}{}",
            &label[..3],
            label[3..5].to_ascii_lowercase(),
            &label[5..]
        );
        NaiveDate::parse_from_str(&normalized, "%d%b%Y").ok().map(Self)
    }
}

impl fmt::Display for ExpiryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%d%b%Y").to_string().to_uppercase())
    }
}

/// Find this week's expiry: the next `expiry_weekday` on or after `today`,
/// moved one day earlier when that day is a holiday.
pub fn compute_expiry(
    today: NaiveDate,
    expiry_weekday: Weekday,
    holidays: &HolidayCalendar,
) -> ExpiryLabel {
    let target = i64::from(expiry_weekday.num_days_from_monday());
    let current = i64::from(today.weekday().num_days_from_monday());
    let offset = (target - current).rem_euclid(7);

    let scheduled = today + Duration::days(offset);
    if holidays.is_holiday(scheduled) {
        ExpiryLabel(scheduled - Duration::days(1))
    } else {
        ExpiryLabel(scheduled)
    }
}
