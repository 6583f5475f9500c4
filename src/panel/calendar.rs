use chrono::{Datelike, NaiveDate};

/// Calendar fields derived from a date alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub month: u32,
    /// Monday = 0 .. Sunday = 6
    pub weekday: u32,
    pub is_weekend: bool,
}

impl CalendarFields {
    pub fn for_date(date: NaiveDate) -> Self {
        let weekday = date.weekday().num_days_from_monday();
        CalendarFields {
            month: date.month(),
            weekday,
            is_weekend: weekday >= 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_fields() {
        // 2024-11-03 was a Sunday, 2024-11-04 a Monday
        let sun = CalendarFields::for_date(NaiveDate::from_ymd_opt(2024, 11, 3).unwrap());
        assert_eq!(sun, CalendarFields { month: 11, weekday: 6, is_weekend: true });

        let mon = CalendarFields::for_date(NaiveDate::from_ymd_opt(2024, 11, 4).unwrap());
        assert_eq!(mon.weekday, 0);
        assert!(!mon.is_weekend);

        let sat = CalendarFields::for_date(NaiveDate::from_ymd_opt(2025, 3, 8).unwrap());
        assert_eq!((sat.month, sat.weekday, sat.is_weekend), (3, 5, true));
    }
}
