//! The timestamp component injected into profiles and message headers.

use crate::plugins::timezones::format::{get_time, Locale, Preset, TimezoneError};
use crate::plugins::timezones::store::TimezoneStore;
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const MESSAGE_CLASS: &str = "timezone-message-item";
pub const PROFILE_CLASS: &str = "timezone-profile-item";
pub const TOOLTIP_CLASS: &str = "timezone-tooltip";
pub const TOOLTIP_DELAY_MS: u64 = 750;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampKind {
    Message,
    Profile,
}

/// What the host draws: a span with a tooltip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedTimestamp {
    pub kind: TimestampKind,
    pub text: String,
    pub class_name: String,
    pub tooltip: String,
    pub tooltip_class_name: String,
    pub tooltip_delay_ms: u64,
}

/// Formatting inputs shared by every timestamp of one plugin instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampStyle {
    pub hour12: bool,
    pub locale: Locale,
    /// Host class appended to message timestamps
    pub host_class: Option<String>,
}

pub fn render_timestamp(
    timezone: &str,
    kind: TimestampKind,
    instant: DateTime<Utc>,
    style: &TimestampStyle,
) -> Result<RenderedTimestamp, TimezoneError> {
    let format = |preset: Preset| get_time(timezone, instant, preset.options(), style.hour12, style.locale);

    let (text, class_name) = match kind {
        TimestampKind::Message => {
            let class_name = match style.host_class.as_deref() {
                Some(host) if !host.is_empty() => format!("{MESSAGE_CLASS} {host}"),
                _ => MESSAGE_CLASS.to_string(),
            };
            (format!("({})", format(Preset::Short)?), class_name)
        }
        TimestampKind::Profile => (format(Preset::Medium)?, PROFILE_CLASS.to_string()),
    };

    Ok(RenderedTimestamp {
        kind,
        text,
        class_name,
        tooltip: format(Preset::Full)?,
        tooltip_class_name: TOOLTIP_CLASS.to_string(),
        tooltip_delay_ms: TOOLTIP_DELAY_MS,
    })
}

/// Time until a mounted profile timestamp re-renders: one second past the
/// next minute boundary.
pub fn next_refresh_delay(now: DateTime<Utc>) -> Duration {
    let seconds = u64::from(now.second());
    // Leap seconds report 1000..2000 ms
    let millis = u64::from(now.timestamp_subsec_millis().min(999));
    Duration::from_millis((60 - seconds) * 1000 + 1000 - millis)
}

/// A profile timestamp that keeps itself current until dropped.
///
/// The refresh task renders immediately, then again after each
/// [`next_refresh_delay`]. `style` is read on every refresh so setting
/// changes reach mounted timestamps. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct MountedTimestamp {
    rendered: watch::Receiver<Option<RenderedTimestamp>>,
    task: JoinHandle<()>,
}

impl MountedTimestamp {
    /// Must be called from within a tokio runtime.
    pub fn mount<F>(store: Arc<TimezoneStore>, user_id: String, style: F) -> Self
    where
        F: Fn() -> TimestampStyle + Send + 'static,
    {
        let (tx, rendered) = watch::channel(None);

        let task = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let style = style();
                let next = store.get(&user_id).and_then(|timezone| {
                    match render_timestamp(&timezone, TimestampKind::Profile, now, &style) {
                        Ok(rendered) => Some(rendered),
                        Err(e) => {
                            tracing::warn!(user = %user_id, "cannot render timestamp: {e}");
                            None
                        }
                    }
                });
                tx.send_replace(next);
                tokio::time::sleep(next_refresh_delay(now)).await;
            }
        });

        Self { rendered, task }
    }

    pub fn current(&self) -> Option<RenderedTimestamp> {
        self.rendered.borrow().clone()
    }

    /// Receiver notified on every refresh.
    pub fn subscribe(&self) -> watch::Receiver<Option<RenderedTimestamp>> {
        self.rendered.clone()
    }
}

impl Drop for MountedTimestamp {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::MemoryStore;
    use chrono::TimeZone;

    fn style() -> TimestampStyle {
        TimestampStyle {
            hour12: true,
            locale: Locale::EnUs,
            host_class: Some("timestamp_abc".to_string()),
        }
    }

    #[test]
    fn test_message_and_profile_variants() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 17, 30, 0).unwrap();

        let message = render_timestamp("America/New_York", TimestampKind::Message, instant, &style()).unwrap();
        assert_eq!(message.text, "(1/15/24 12:30 PM)");
        assert_eq!(message.class_name, "timezone-message-item timestamp_abc");
        assert_eq!(message.tooltip, "Monday, January 15, 2024 12:30 PM");

        let profile = render_timestamp("America/New_York", TimestampKind::Profile, instant, &style()).unwrap();
        assert_eq!(profile.text, "1/15/24 12:30 PM");
        assert_eq!(profile.class_name, PROFILE_CLASS);
        assert_eq!(profile.tooltip, message.tooltip);
    }

    #[test]
    fn test_next_refresh_delay() {
        let at = |s, ms| {
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, s).unwrap()
                + chrono::Duration::milliseconds(ms)
        };
        assert_eq!(next_refresh_delay(at(0, 0)), Duration::from_millis(61_000));
        assert_eq!(next_refresh_delay(at(59, 999)), Duration::from_millis(1_001));
        assert_eq!(next_refresh_delay(at(30, 250)), Duration::from_millis(30_750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mounted_timestamp_refreshes_until_dropped() {
        let datastore = Arc::new(MemoryStore::new());
        let store = TimezoneStore::new(datastore);
        store.load().unwrap();
        store.set("42", Some("UTC")).unwrap();

        let mounted = MountedTimestamp::mount(Arc::clone(&store), "42".to_string(), style);
        let mut rx = mounted.subscribe();

        rx.changed().await.unwrap();
        assert!(mounted.current().is_some());

        // Sleeps are virtual: the next refresh fires once time is advanced
        tokio::time::advance(Duration::from_secs(62)).await;
        rx.changed().await.unwrap();

        drop(mounted);
        assert!(rx.changed().await.is_err());
    }
}
