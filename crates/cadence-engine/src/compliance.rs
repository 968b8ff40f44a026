// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Legal sending window in the recipient's local time.
//!
//! A [`ComplianceWindow`] is immutable. Runtime changes build a new window and
//! swap it into a [`ComplianceHandle`].

use std::sync::Arc;

use arc_swap::ArcSwap;
use cadence_config::model::ComplianceConfig;
use cadence_core::CadenceError;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Result of evaluating an instant against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplianceDecision {
    pub allowed: bool,
    /// Equal to the evaluated instant when `allowed`.
    pub next_valid: DateTime<Utc>,
}

/// Local-hour range `[start_hour, end_hour)` in which sending is permitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceWindow {
    start_hour: u32,
    end_hour: u32,
    default_tz: Tz,
}

impl ComplianceWindow {
    /// Build a window. Requires `0 <= start_hour < end_hour <= 24`.
    pub fn new(start_hour: u32, end_hour: u32, default_tz: Tz) -> Result<Self, CadenceError> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(CadenceError::Config(format!(
                "compliance window must satisfy 0 <= start < end <= 24, got {start_hour}..{end_hour}"
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
            default_tz,
        })
    }

    pub fn from_config(config: &ComplianceConfig) -> Result<Self, CadenceError> {
        let tz = config.default_timezone.parse::<Tz>().map_err(|e| {
            CadenceError::Config(format!(
                "unknown timezone `{}`: {e}",
                config.default_timezone
            ))
        })?;
        Self::new(config.start_hour, config.end_hour, tz)
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn default_timezone(&self) -> Tz {
        self.default_tz
    }

    /// Parse an IANA id, falling back to the default timezone.
    pub fn timezone(&self, name: &str) -> Tz {
        match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    timezone = name,
                    fallback = self.default_tz.name(),
                    "unknown timezone, using default"
                );
                self.default_tz
            }
        }
    }

    fn allows_hour(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }

    /// Whether `now` falls inside the window in `tz`, and if not, the next
    /// instant that does.
    pub fn evaluate(&self, now: DateTime<Utc>, tz: Tz) -> ComplianceDecision {
        let local = now.with_timezone(&tz);
        if self.allows_hour(local.hour()) {
            return ComplianceDecision {
                allowed: true,
                next_valid: now,
            };
        }

        let today = local.date_naive();
        let first_day = if local.hour() >= self.end_hour {
            today.succ_opt().unwrap_or(today)
        } else {
            today
        };

        // A window opening inside a DST gap can resolve past its own end;
        // move on to the following day in that case.
        let mut day = first_day;
        let mut candidate = local_instant(day, self.start_hour, tz);
        for _ in 0..7 {
            if candidate > now && self.allows_hour(candidate.with_timezone(&tz).hour()) {
                break;
            }
            day = day.succ_opt().unwrap_or(day);
            candidate = local_instant(day, self.start_hour, tz);
        }

        ComplianceDecision {
            allowed: false,
            next_valid: candidate,
        }
    }

    /// [`Self::evaluate`] for a timezone given by IANA id.
    pub fn evaluate_in(&self, now: DateTime<Utc>, timezone: &str) -> ComplianceDecision {
        self.evaluate(now, self.timezone(timezone))
    }
}

/// The instant at which the local clock in `tz` reads `date` at `hour:00`.
///
/// A time skipped by a DST gap resolves to the first valid instant after the
/// gap. A time repeated by a DST overlap resolves to its earliest instant.
pub fn local_instant(date: NaiveDate, hour: u32, tz: Tz) -> DateTime<Utc> {
    let (date, hour) = if hour >= 24 {
        (date.succ_opt().unwrap_or(date), hour - 24)
    } else {
        (date, hour)
    };
    let naive = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN));

    let mut candidate = naive;
    // Gaps are at most a few hours long; scan forward a minute at a time.
    for _ in 0..=(24 * 60) {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, latest) => {
                return earliest.min(latest).with_timezone(&Utc);
            }
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    // Unreachable for real tz data; treat the wall clock as UTC.
    Utc.from_utc_datetime(&naive)
}

/// Atomically swappable compliance window shared by every engine component.
#[derive(Debug, Clone)]
pub struct ComplianceHandle {
    inner: Arc<ArcSwap<ComplianceWindow>>,
}

impl ComplianceHandle {
    pub fn new(window: ComplianceWindow) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(window)),
        }
    }

    /// The window in force right now.
    pub fn current(&self) -> Arc<ComplianceWindow> {
        self.inner.load_full()
    }

    /// Replace the window. In-flight evaluations keep the window they loaded.
    pub fn replace(&self, window: ComplianceWindow) {
        tracing::info!(
            start_hour = window.start_hour,
            end_hour = window.end_hour,
            "compliance window updated"
        );
        self.inner.store(Arc::new(window));
    }
}
