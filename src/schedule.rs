//! Next daily refresh time
//!
//! The configured `HH:MM` is interpreted as local wall-clock time. The
//! timezone travels along for display only; no conversion is applied when
//! comparing against the current instant.

use chrono::{Days, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::warn;

use crate::config::CacheConfig;

/// Next scheduled refresh, derived from config and the current instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledRefreshInfo {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_refresh: Option<NaiveDateTime>,
}

impl ScheduledRefreshInfo {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            scheduled: None,
            scheduled_time: None,
            timezone: None,
            next_refresh: None,
        }
    }
}

/// Parses `HH:MM` into a time of day
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let (hour, minute) = value.trim().split_once(':')?;
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

/// Next occurrence of the configured time strictly after `now`
pub fn next_occurrence(config: &CacheConfig, now: NaiveDateTime) -> ScheduledRefreshInfo {
    let scheduled = &config.scheduled_refresh;
    if !scheduled.enabled {
        return ScheduledRefreshInfo::disabled();
    }

    let next_refresh = match parse_time_of_day(&scheduled.time) {
        Some(time) => {
            let today = now.date().and_time(time);
            if today > now {
                Some(today)
            } else {
                today.checked_add_days(Days::new(1))
            }
        }
        None => {
            warn!(time = %scheduled.time, "Invalid scheduled refresh time, expected HH:MM");
            None
        }
    };

    ScheduledRefreshInfo {
        enabled: true,
        scheduled: Some(next_refresh.is_some()),
        scheduled_time: Some(scheduled.time.clone()),
        timezone: Some(scheduled.timezone.clone()),
        next_refresh,
    }
}
