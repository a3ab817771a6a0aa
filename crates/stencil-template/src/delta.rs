/*
 * delta.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Calendar-aware relative deltas.
//!
//! A [`RelativeDelta`] shifts dates by whole months first (clamping the day to
//! the end of the target month), then by days and seconds. It is the only way
//! templates can do date arithmetic.

use chrono::{Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;

use crate::error::{TemplateError, TemplateResult};

/// A relative calendar offset.
///
/// Years are folded into `months` and weeks into `days`; hours and minutes
/// are folded into `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelativeDelta {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
}

fn overflow() -> TemplateError {
    TemplateError::type_error("date value out of range")
}

impl RelativeDelta {
    pub fn new(months: i64, days: i64, seconds: i64) -> Self {
        Self {
            months,
            days,
            seconds,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.seconds == 0
    }

    /// Whether applying this delta to a date requires a time component.
    pub fn has_time(&self) -> bool {
        self.seconds != 0
    }

    pub fn checked_add(&self, other: &RelativeDelta) -> TemplateResult<RelativeDelta> {
        Ok(RelativeDelta {
            months: self.months.checked_add(other.months).ok_or_else(overflow)?,
            days: self.days.checked_add(other.days).ok_or_else(overflow)?,
            seconds: self.seconds.checked_add(other.seconds).ok_or_else(overflow)?,
        })
    }

    pub fn checked_neg(&self) -> TemplateResult<RelativeDelta> {
        Ok(RelativeDelta {
            months: self.months.checked_neg().ok_or_else(overflow)?,
            days: self.days.checked_neg().ok_or_else(overflow)?,
            seconds: self.seconds.checked_neg().ok_or_else(overflow)?,
        })
    }

    /// Shift a date. Only valid when [`has_time`](Self::has_time) is false.
    pub fn apply_to_date(&self, date: NaiveDate) -> TemplateResult<NaiveDate> {
        let shifted = shift_months(
            date,
            self.months,
            NaiveDate::checked_add_months,
            NaiveDate::checked_sub_months,
        )?;
        let days = TimeDelta::try_days(self.days).ok_or_else(overflow)?;
        shifted.checked_add_signed(days).ok_or_else(overflow)
    }

    pub fn apply_to_datetime(&self, datetime: NaiveDateTime) -> TemplateResult<NaiveDateTime> {
        let shifted = shift_months(
            datetime,
            self.months,
            NaiveDateTime::checked_add_months,
            NaiveDateTime::checked_sub_months,
        )?;
        let days = TimeDelta::try_days(self.days).ok_or_else(overflow)?;
        let seconds = TimeDelta::try_seconds(self.seconds).ok_or_else(overflow)?;
        shifted
            .checked_add_signed(days)
            .and_then(|dt| dt.checked_add_signed(seconds))
            .ok_or_else(overflow)
    }

    /// Shift a date that gains a time component because of this delta.
    pub fn apply_to_date_as_datetime(&self, date: NaiveDate) -> TemplateResult<NaiveDateTime> {
        self.apply_to_datetime(date.and_time(NaiveTime::MIN))
    }
}

fn shift_months<T>(
    value: T,
    months: i64,
    add: fn(T, Months) -> Option<T>,
    sub: fn(T, Months) -> Option<T>,
) -> TemplateResult<T> {
    let magnitude = u32::try_from(months.unsigned_abs()).map_err(|_| overflow())?;
    let result = if months >= 0 {
        add(value, Months::new(magnitude))
    } else {
        sub(value, Months::new(magnitude))
    };
    result.ok_or_else(overflow)
}

impl fmt::Display for RelativeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Normalized the way relativedelta reprs are: whole years out of
        // months, hours and minutes out of seconds, sign kept per component.
        let years = self.months / 12;
        let months = self.months % 12;
        let hours = self.seconds / 3600;
        let minutes = (self.seconds % 3600) / 60;
        let seconds = self.seconds % 60;

        let parts: Vec<String> = [
            ("years", years),
            ("months", months),
            ("days", self.days),
            ("hours", hours),
            ("minutes", minutes),
            ("seconds", seconds),
        ]
        .iter()
        .filter(|(_, v)| *v != 0)
        .map(|(name, v)| format!("{name}={v:+}"))
        .collect();

        write!(f, "relativedelta({})", parts.join(", "))
    }
}
