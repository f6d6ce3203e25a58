//! Conversions between wire representations of dates and times and [`jiff`] values.
//!
//! `Date` travels as days since 1970-01-01 in a `u16`, `DateTime` as seconds since the epoch in
//! a `u32`, and `DateTime64(p)` as an `i64` count of `10^-p` second ticks.

use colwire_error::{ColwireResult, colwire_bail, colwire_err};
use jiff::civil::{Date, DateTime, Time};
use jiff::tz::TimeZone;
use jiff::{Timestamp, Zoned};

/// The largest precision `DateTime64` supports.
pub const MAX_DATETIME64_PRECISION: u8 = 9;

const SECONDS_PER_DAY: i64 = 86_400;

/// Resolve a timezone name. `UTC` is always available, other names come from the tz database.
pub fn timezone(name: &str) -> ColwireResult<TimeZone> {
    if name.eq_ignore_ascii_case("UTC") {
        return Ok(TimeZone::UTC);
    }
    TimeZone::get(name).map_err(|e| colwire_err!(DataType: "unknown timezone '{}': {}", name, e))
}

/// The IANA name of the local timezone, or `UTC` if it has none.
pub fn system_timezone() -> String {
    TimeZone::system()
        .iana_name()
        .unwrap_or("UTC")
        .to_string()
}

/// Days since the epoch, as stored in a `Date` column.
pub fn date_to_days(date: Date) -> ColwireResult<u16> {
    let seconds = date
        .to_zoned(TimeZone::UTC)
        .map_err(|e| colwire_err!(DataType: "invalid date {}: {}", date, e))?
        .timestamp()
        .as_second();
    u16::try_from(seconds.div_euclid(SECONDS_PER_DAY))
        .map_err(|_| colwire_err!(DataType: "date {} is out of range for Date", date))
}

/// The date `days` after the epoch.
pub fn days_to_date(days: u16) -> ColwireResult<Date> {
    let ts = Timestamp::from_second(i64::from(days) * SECONDS_PER_DAY)
        .map_err(|e| colwire_err!(DataType: "invalid day number {}: {}", days, e))?;
    Ok(ts.to_zoned(TimeZone::UTC).date())
}

/// Seconds since the epoch, as stored in a `DateTime` column.
pub fn timestamp_to_seconds(ts: Timestamp) -> ColwireResult<u32> {
    u32::try_from(ts.as_second())
        .map_err(|_| colwire_err!(DataType: "timestamp {} is out of range for DateTime", ts))
}

/// The instant `seconds` after the epoch.
pub fn seconds_to_timestamp(seconds: u32) -> ColwireResult<Timestamp> {
    Timestamp::from_second(i64::from(seconds))
        .map_err(|e| colwire_err!(DataType: "invalid DateTime value {}: {}", seconds, e))
}

fn tick_nanos(precision: u8) -> ColwireResult<i128> {
    if precision > MAX_DATETIME64_PRECISION {
        colwire_bail!(
            DataType: "DateTime64 precision {} exceeds {}",
            precision,
            MAX_DATETIME64_PRECISION
        );
    }
    Ok(10i128.pow(u32::from(MAX_DATETIME64_PRECISION - precision)))
}

/// Ticks of `10^-precision` seconds since the epoch, truncating finer digits.
pub fn timestamp_to_ticks(ts: Timestamp, precision: u8) -> ColwireResult<i64> {
    let ticks = ts.as_nanosecond().div_euclid(tick_nanos(precision)?);
    i64::try_from(ticks).map_err(|_| {
        colwire_err!(DataType: "timestamp {} is out of range for DateTime64({})", ts, precision)
    })
}

/// The instant `ticks` of `10^-precision` seconds after the epoch.
pub fn ticks_to_timestamp(ticks: i64, precision: u8) -> ColwireResult<Timestamp> {
    let nanos = i128::from(ticks) * tick_nanos(precision)?;
    Timestamp::from_nanosecond(nanos)
        .map_err(|e| colwire_err!(DataType: "invalid DateTime64 value {}: {}", ticks, e))
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> ColwireResult<Date> {
    text.trim()
        .parse::<Date>()
        .map_err(|e| colwire_err!(Syntax: "invalid date '{}': {}", text, e))
}

/// Parse `YYYY-MM-DD[ hh:mm:ss[.fffffffff]]` as wall-clock time in `tz`.
pub fn parse_datetime(text: &str, tz: &TimeZone) -> ColwireResult<Timestamp> {
    let text = text.trim();
    let civil = if text.len() == 10 {
        parse_date(text)?.to_datetime(Time::midnight())
    } else {
        text.parse::<DateTime>()
            .map_err(|e| colwire_err!(Syntax: "invalid datetime '{}': {}", text, e))?
    };
    civil
        .to_zoned(tz.clone())
        .map(|z| z.timestamp())
        .map_err(|e| colwire_err!(DataType: "invalid datetime '{}': {}", text, e))
}

/// Format an instant as `YYYY-MM-DD hh:mm:ss[.f]` in `tz`.
pub fn format_timestamp(ts: Timestamp, tz: &TimeZone) -> String {
    let zoned: Zoned = ts.to_zoned(tz.clone());
    zoned.strftime("%Y-%m-%d %H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(date(1970, 1, 1), 0)]
    #[case(date(2000, 1, 1), 10957)]
    #[case(date(2149, 6, 6), u16::MAX)]
    fn dates(#[case] d: Date, #[case] days: u16) {
        assert_eq!(date_to_days(d).unwrap(), days);
        assert_eq!(days_to_date(days).unwrap(), d);
    }

    #[test]
    fn dates_out_of_range() {
        assert!(date_to_days(date(1969, 12, 31)).is_err());
        assert!(date_to_days(date(2149, 6, 7)).is_err());
    }

    #[test]
    fn ticks() {
        let ts = parse_datetime("2000-01-01 00:00:00.123456", &TimeZone::UTC).unwrap();
        assert_eq!(timestamp_to_ticks(ts, 3).unwrap(), 946_684_800_123);
        assert_eq!(timestamp_to_ticks(ts, 6).unwrap(), 946_684_800_123_456);
        let back = ticks_to_timestamp(946_684_800_123, 3).unwrap();
        assert_eq!(
            back,
            parse_datetime("2000-01-01 00:00:00.123", &TimeZone::UTC).unwrap()
        );
        assert!(timestamp_to_ticks(ts, 10).is_err());
    }

    #[test]
    fn seconds() {
        let ts = parse_datetime("2000-01-01", &TimeZone::UTC).unwrap();
        assert_eq!(timestamp_to_seconds(ts).unwrap(), 946_684_800);
        assert_eq!(seconds_to_timestamp(946_684_800).unwrap(), ts);
        assert_eq!(format_timestamp(ts, &TimeZone::UTC), "2000-01-01 00:00:00");
    }

    #[test]
    fn bad_text() {
        assert!(parse_date("2000-13-01").is_err());
        assert!(parse_datetime("yesterday", &TimeZone::UTC).is_err());
    }
}
