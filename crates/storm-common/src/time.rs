//! Time windows and CF-convention time units.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A closed time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    /// Window bounds as fractional unix seconds, shifted back by `epoch_offset`
    /// for sources that count from a non-unix epoch.
    pub fn unix_bounds(&self, epoch_offset: f64) -> (f64, f64) {
        (
            unix_seconds(&self.start) - epoch_offset,
            unix_seconds(&self.end) - epoch_offset,
        )
    }
}

fn unix_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}

/// Unit of a CF "<unit> since <reference>" time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

/// Parsed CF time units, e.g. `"hours since 1800-01-01 00:00:00"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub reference: DateTime<Utc>,
}

impl CfTimeUnits {
    /// Parse a CF units attribute. Returns `None` for anything that is not a
    /// "<unit> since <date>" expression.
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, reference) = units.trim().split_once(" since ")?;
        let unit = match unit.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => TimeUnit::Seconds,
            "min" | "mins" | "minute" | "minutes" => TimeUnit::Minutes,
            "h" | "hr" | "hrs" | "hour" | "hours" => TimeUnit::Hours,
            "d" | "day" | "days" => TimeUnit::Days,
            _ => return None,
        };
        let reference = parse_reference(reference.trim())?;
        Some(Self { unit, reference })
    }

    /// Raw axis value to a UTC timestamp. `None` when the value is not
    /// finite or lands outside the representable range.
    pub fn decode(&self, value: f64) -> Option<DateTime<Utc>> {
        let millis = (value * self.unit.seconds() * 1000.0).round();
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        let delta = Duration::try_milliseconds(millis as i64)?;
        self.reference.checked_add_signed(delta)
    }

    /// UTC timestamp to a raw axis value.
    pub fn encode(&self, dt: &DateTime<Utc>) -> f64 {
        let delta = *dt - self.reference;
        delta.num_milliseconds() as f64 / 1000.0 / self.unit.seconds()
    }
}

fn parse_reference(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim_end_matches('Z').trim_end_matches("UTC").trim();
    let s = s.strip_suffix("+00:00").unwrap_or(s).trim();

    let (date, time) = match s.split_once(['T', ' ']) {
        Some((date, time)) => (date, Some(time.trim())),
        None => (s, None),
    };

    let mut ymd = date.split('-').map(|p| p.parse::<i32>().ok());
    let year = ymd.next()??;
    let month = ymd.next()?? as u32;
    let day = ymd.next()?? as u32;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let (h, m, sec) = match time {
        Some(time) if !time.is_empty() => {
            let mut hms = time.split(':');
            let h = hms.next()?.parse::<u32>().ok()?;
            let m = hms.next().unwrap_or("0").parse::<u32>().ok()?;
            let sec = hms.next().unwrap_or("0").parse::<f64>().ok()?;
            (h, m, sec)
        }
        _ => (0, 0, 0.0),
    };

    let naive: NaiveDateTime = date.and_hms_milli_opt(
        h,
        m,
        sec.trunc() as u32,
        (sec.fract() * 1000.0).round() as u32,
    )?;
    Some(Utc.from_utc_datetime(&naive))
}
