// Pickup and delivery dates.
//
// Brokers write dates every way imaginable: 3/14, 03/14/24, 2024-03-14,
// "Mar 14th", "March 14, 2024". We collect every date-like token, resolve
// year-less ones against a reference date, sort, and call the earliest the
// pickup and the next one the delivery.

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// A year-less date this far before the reference is assumed to be next year.
const ROLLOVER_DAYS: i64 = 180;

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("iso date pattern")
});

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("numeric date pattern")
});

static MONTH_NAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december",
        r"|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b",
        r"(?:,?\s+(\d{4})\b)?",
    ))
    .expect("month name date pattern")
});

fn month_number(name: &str) -> Option<u32> {
    let month = match &name.to_ascii_lowercase()[..3] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn full_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

/// Resolve month/day (and maybe year) into a concrete date.
fn resolve(month: u32, day: u32, year: Option<i32>, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
    if reference - this_year > Duration::days(ROLLOVER_DAYS) {
        NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
    } else {
        Some(this_year)
    }
}

/// Every distinct date mentioned in `text`, in chronological order.
pub fn collect_dates(text: &str, reference: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = BTreeSet::new();

    for caps in ISO_DATE.captures_iter(text) {
        let parsed = (|| {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })();
        dates.extend(parsed);
    }

    for caps in NUMERIC_DATE.captures_iter(text) {
        let parsed = (|| {
            let month: u32 = caps.get(1)?.as_str().parse().ok()?;
            let day: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year = match caps.get(3) {
                Some(y) => Some(full_year(y.as_str())?),
                None => None,
            };
            resolve(month, day, year, reference)
        })();
        dates.extend(parsed);
    }

    for caps in MONTH_NAME_DATE.captures_iter(text) {
        let parsed = (|| {
            let month = month_number(caps.get(1)?.as_str())?;
            let day: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year = match caps.get(3) {
                Some(y) => Some(y.as_str().parse().ok()?),
                None => None,
            };
            resolve(month, day, year, reference)
        })();
        dates.extend(parsed);
    }

    dates.into_iter().collect()
}

/// (pickup, delivery): the earliest and second-earliest dates.
pub fn pickup_and_delivery(text: &str, reference: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let dates = collect_dates(text, reference);
    (dates.first().copied(), dates.get(1).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_mixed_formats_are_sorted() {
        let text = "Delivers March 15th. Picks up 3/13. Appt 2024-03-14.";
        assert_eq!(
            collect_dates(text, reference()),
            vec![ymd(2024, 3, 13), ymd(2024, 3, 14), ymd(2024, 3, 15)]
        );
    }

    #[test]
    fn test_pickup_is_earliest_delivery_second() {
        let (pickup, delivery) = pickup_and_delivery("DEL 03/16/24, PU 03/12/24", reference());
        assert_eq!(pickup, Some(ymd(2024, 3, 12)));
        assert_eq!(delivery, Some(ymd(2024, 3, 16)));
    }

    #[test]
    fn test_year_rolls_over_for_early_months() {
        let december = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        assert_eq!(collect_dates("pickup 1/3", december), vec![ymd(2025, 1, 3)]);
    }

    #[test]
    fn test_invalid_dates_are_ignored() {
        assert!(collect_dates("13/45 and Feb 31", reference()).is_empty());
        let (pickup, delivery) = pickup_and_delivery("no dates here", reference());
        assert!(pickup.is_none() && delivery.is_none());
    }
}
