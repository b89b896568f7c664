//! Tests for closing periods and amount helpers

use chrono::NaiveDate;
use core_kernel::{ClosingPeriod, CurrencyCode, Precision};
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_single_day_period() {
    let period = ClosingPeriod::single_day(date(2024, 6, 30));
    assert_eq!(period.day_count(), 1);
    assert_eq!(period.dates().next(), Some(date(2024, 6, 30)));
}

#[test]
fn test_full_year_period() {
    let period = ClosingPeriod::new(date(2023, 1, 1), date(2023, 12, 31)).unwrap();
    assert_eq!(period.day_count(), 365);
    assert_eq!(period.dates().last(), Some(date(2023, 12, 31)));
}

#[test]
fn test_period_crossing_year_boundary() {
    let period = ClosingPeriod::new(date(2023, 12, 30), date(2024, 1, 2)).unwrap();
    let dates: Vec<_> = period.dates().collect();
    assert_eq!(dates.len(), 4);
    assert!(period.contains(date(2024, 1, 1)));
    assert!(!period.contains(date(2024, 1, 3)));
}

#[test]
fn test_period_serde_roundtrip() {
    let period = ClosingPeriod::new(date(2024, 1, 1), date(2024, 3, 31)).unwrap();
    let json = serde_json::to_string(&period).unwrap();
    assert!(json.contains("2024-01-01"));
    let back: ClosingPeriod = serde_json::from_str(&json).unwrap();
    assert_eq!(period, back);
}

#[test]
fn test_precision_bounds() {
    assert!(Precision::new(2).is_ok());
    assert!(Precision::new(29).is_err());
    assert_eq!(Precision::new(0).unwrap().normalize(dec!(2.5)), dec!(3));
}

#[test]
fn test_currency_code_serde() {
    let code: CurrencyCode = serde_json::from_str("\"eur\"").unwrap();
    assert_eq!(code.as_str(), "EUR");
    assert!(serde_json::from_str::<CurrencyCode>("\"euro\"").is_err());
}
