//! Purpose: Julian day number <-> proleptic Gregorian calendar conversion.
//! Exports: `ymd_to_julian`, `julian_to_ymd`, `julian_to_date`.
//! Role: Fixed integer algorithm (Fliegel and Van Flandern) used by date and datetime decoders.
//! Invariants: Round-trips every date in 0001-01-01..=9999-12-31.
//! Invariants: `ymd_to_julian` accepts out-of-range days and rolls them forward.
use time::{Date, Month};

pub fn ymd_to_julian(year: i32, month: i32, day: i32) -> i64 {
    let (year, month, day) = (year as i64, month as i64, day as i64);
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045
}

pub fn julian_to_ymd(jd: i64) -> (i32, i32, i32) {
    let a = jd + 32044;
    let b = (4 * a + 3) / 146097;
    let c = a - (146097 * b) / 4;
    let d = (4 * c + 3) / 1461;
    let e = c - (1461 * d) / 4;
    let m = (5 * e + 2) / 153;

    let day = e - (153 * m + 2) / 5 + 1;
    let month = m + 3 - 12 * (m / 10);
    let year = 100 * b + d - 4800 + m / 10;
    (year as i32, month as i32, day as i32)
}

/// Converts a Julian day number into a calendar date, if representable.
pub fn julian_to_date(jd: i64) -> Option<Date> {
    let (year, month, day) = julian_to_ymd(jd);
    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    Date::from_calendar_date(year, month, u8::try_from(day).ok()?).ok()
}
