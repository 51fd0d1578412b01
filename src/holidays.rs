use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Utc, Weekday};

use crate::models::{MasterTask, Priority, Recurrence};

/// Nth (1-based) `weekday` of `month` in `year`.
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

/// Last `weekday` of `month` in `year`.
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut day = first_of_next - Duration::days(1);
    while day.weekday() != weekday {
        day = day - Duration::days(1);
    }
    Some(day)
}

fn holiday_task(year: i32, title: &str, date: NaiveDate, offset: FixedOffset) -> Option<MasterTask> {
    let slug = title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let start = date
        .and_hms_opt(0, 0, 0)?
        .and_local_timezone(offset)
        .single()?
        .with_timezone(&Utc);
    Some(MasterTask {
        id: format!("holiday-{}-{}", slug, year),
        title: title.to_string(),
        description: None,
        start_time: Some(start),
        duration: 1440,
        priority: Priority::High,
        recurrence: Recurrence::None,
        completed: false,
        reminder: None,
        is_holiday: true,
    })
}

/// US federal holidays of `year` as full-day holiday tasks.
pub fn us_federal_holidays(year: i32, offset: FixedOffset) -> Vec<MasterTask> {
    let dates = [
        ("New Year's Day", NaiveDate::from_ymd_opt(year, 1, 1)),
        ("Martin Luther King, Jr. Day", nth_weekday(year, 1, Weekday::Mon, 3)),
        ("Presidents' Day", nth_weekday(year, 2, Weekday::Mon, 3)),
        ("Memorial Day", last_weekday(year, 5, Weekday::Mon)),
        ("Independence Day", NaiveDate::from_ymd_opt(year, 7, 4)),
        ("Labor Day", nth_weekday(year, 9, Weekday::Mon, 1)),
        ("Columbus Day", nth_weekday(year, 10, Weekday::Mon, 2)),
        ("Veterans Day", NaiveDate::from_ymd_opt(year, 11, 11)),
        ("Thanksgiving Day", nth_weekday(year, 11, Weekday::Thu, 4)),
        ("Christmas Day", NaiveDate::from_ymd_opt(year, 12, 25)),
    ];
    dates
        .iter()
        .filter_map(|(title, date)| holiday_task(year, title, (*date)?, offset))
        .collect()
}

/// Holidays for every year in `years`, in calendar order.
pub fn holidays_for_years(years: impl IntoIterator<Item = i32>, offset: FixedOffset) -> Vec<MasterTask> {
    years
        .into_iter()
        .flat_map(|year| us_federal_holidays(year, offset))
        .collect()
}
