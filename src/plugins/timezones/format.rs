//! Locale-aware date/time formatting in a named timezone.
//!
//! Each requested component (date, then time) is formatted on its own and the
//! pieces are joined with a single space, so `{date: full, time: short}` reads
//! `Monday, January 15, 2024 12:30 PM` in `en-US`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::plugin::DataStoreError;

#[derive(Error, Debug)]
pub enum TimezoneError {
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error(transparent)]
    Store(#[from] DataStoreError),
}

pub fn parse_timezone(name: &str) -> Result<Tz, TimezoneError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimezoneError::UnknownTimezone(name.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    Short,
    Medium,
    Long,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStyle {
    Short,
    Medium,
    Long,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatOptions {
    pub date: Option<DateStyle>,
    pub time: Option<TimeStyle>,
}

impl FormatOptions {
    pub const fn new(date: DateStyle, time: TimeStyle) -> Self {
        Self {
            date: Some(date),
            time: Some(time),
        }
    }
}

/// The three presets timestamps are rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Message headers
    Short,
    /// Profiles; currently identical to `Short`
    Medium,
    /// Tooltips
    Full,
}

impl Preset {
    pub const fn options(self) -> FormatOptions {
        match self {
            Preset::Short | Preset::Medium => FormatOptions::new(DateStyle::Short, TimeStyle::Short),
            Preset::Full => FormatOptions::new(DateStyle::Full, TimeStyle::Short),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    EnUs,
    EnGb,
}

impl Locale {
    /// Resolve a BCP 47 tag. Unsupported tags fall back to `en-US`.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().replace('_', "-").to_ascii_lowercase();
        match tag.as_str() {
            "en-gb" | "en-ie" | "en-au" | "en-nz" => Locale::EnGb,
            _ => Locale::EnUs,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Locale::EnUs => "en-US",
            Locale::EnGb => "en-GB",
        }
    }

    fn date_pattern(self, style: DateStyle) -> &'static str {
        match (self, style) {
            (Locale::EnUs, DateStyle::Short) => "%-m/%-d/%y",
            (Locale::EnUs, DateStyle::Medium) => "%b %-d, %Y",
            (Locale::EnUs, DateStyle::Long) => "%B %-d, %Y",
            (Locale::EnUs, DateStyle::Full) => "%A, %B %-d, %Y",
            (Locale::EnGb, DateStyle::Short) => "%d/%m/%Y",
            (Locale::EnGb, DateStyle::Medium) => "%-d %b %Y",
            (Locale::EnGb, DateStyle::Long) => "%-d %B %Y",
            (Locale::EnGb, DateStyle::Full) => "%A %-d %B %Y",
        }
    }

    fn time_pattern(self, style: TimeStyle, hour12: bool) -> &'static str {
        let with_seconds = !matches!(style, TimeStyle::Short);
        let with_zone = matches!(style, TimeStyle::Long | TimeStyle::Full);

        match (hour12, self, with_seconds, with_zone) {
            (false, _, false, _) => "%H:%M",
            (false, _, true, false) => "%H:%M:%S",
            (false, _, true, true) => "%H:%M:%S %Z",
            (true, Locale::EnUs, false, _) => "%-I:%M %p",
            (true, Locale::EnUs, true, false) => "%-I:%M:%S %p",
            (true, Locale::EnUs, true, true) => "%-I:%M:%S %p %Z",
            (true, Locale::EnGb, false, _) => "%-I:%M %P",
            (true, Locale::EnGb, true, false) => "%-I:%M:%S %P",
            (true, Locale::EnGb, true, true) => "%-I:%M:%S %P %Z",
        }
    }
}

/// Format `instant` in `timezone`.
///
/// `hour12` only changes how hours are written; the date part is unaffected.
pub fn get_time(
    timezone: &str,
    instant: DateTime<Utc>,
    options: FormatOptions,
    hour12: bool,
    locale: Locale,
) -> Result<String, TimezoneError> {
    let tz = parse_timezone(timezone)?;
    let local = instant.with_timezone(&tz);

    let mut parts = Vec::with_capacity(2);
    if let Some(style) = options.date {
        parts.push(local.format(locale.date_pattern(style)).to_string());
    }
    if let Some(style) = options.time {
        parts.push(local.format(locale.time_pattern(style, hour12)).to_string());
    }
    Ok(parts.join(" "))
}
