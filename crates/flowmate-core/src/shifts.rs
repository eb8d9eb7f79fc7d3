//! Shift records for the scheduler
//!
//! Shifts live in the owner's `schedules` sub-collection, next to notes.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::UserId;

/// Owner-scoped shift identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShiftId(String);

impl ShiftId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shift presets; each preset implies default hours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftType {
    #[default]
    Morning,
    Evening,
    Night,
    Custom,
}

impl ShiftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftType::Morning => "morning",
            ShiftType::Evening => "evening",
            ShiftType::Night => "night",
            ShiftType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "morning" => Some(ShiftType::Morning),
            "evening" => Some(ShiftType::Evening),
            "night" => Some(ShiftType::Night),
            "custom" => Some(ShiftType::Custom),
            _ => None,
        }
    }

    /// Default (start, end) hours for the preset
    pub fn default_hours(&self) -> Option<(NaiveTime, NaiveTime)> {
        let hm = |h| NaiveTime::from_hms_opt(h, 0, 0);
        match self {
            ShiftType::Morning => hm(7).zip(hm(15)),
            ShiftType::Evening => hm(15).zip(hm(23)),
            ShiftType::Night => hm(23).zip(hm(7)),
            ShiftType::Custom => None,
        }
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of a shift being created or edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDraft {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub location: String,
    #[serde(default)]
    pub notes: String,
    #[serde(rename = "type")]
    pub kind: ShiftType,
}

impl ShiftDraft {
    /// Draft a preset shift using the preset's default hours
    ///
    /// Custom shifts have no default hours and start as a zero-length
    /// 00:00 slot until times are set.
    pub fn preset(date: NaiveDate, kind: ShiftType, location: impl Into<String>) -> Self {
        let (start_time, end_time) = kind
            .default_hours()
            .unwrap_or((NaiveTime::MIN, NaiveTime::MIN));
        Self {
            date,
            start_time,
            end_time,
            location: location.into(),
            notes: String::new(),
            kind,
        }
    }

    pub fn with_times(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Date and times are typed; only the location can be missing
    pub fn validate(&self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(Error::Validation("a shift needs a location".to_string()));
        }
        Ok(())
    }
}

/// A stored shift
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: ShiftId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub draft: ShiftDraft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shift {
    /// Whether the shift runs past midnight
    pub fn is_overnight(&self) -> bool {
        self.draft.end_time <= self.draft.start_time
    }

    /// Length of the shift, wrapping past midnight
    pub fn duration(&self) -> Duration {
        let span = self.draft.end_time - self.draft.start_time;
        if span <= Duration::zero() {
            span + Duration::hours(24)
        } else {
            span
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    fn shift(draft: ShiftDraft) -> Shift {
        let now = Utc::now();
        Shift {
            id: ShiftId::new("s1"),
            user_id: UserId::from("alice"),
            draft,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_presets_have_default_hours() {
        let night = ShiftDraft::preset(date(), ShiftType::Night, "MICU");
        assert_eq!(night.start_time, NaiveTime::from_hms_opt(23, 0, 0).unwrap());
        assert_eq!(night.end_time, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert!(ShiftType::Custom.default_hours().is_none());
    }

    #[test]
    fn test_overnight_duration_wraps() {
        let night = shift(ShiftDraft::preset(date(), ShiftType::Night, "MICU"));
        assert!(night.is_overnight());
        assert_eq!(night.duration(), Duration::hours(8));

        let day = shift(ShiftDraft::preset(date(), ShiftType::Morning, "ER"));
        assert!(!day.is_overnight());
        assert_eq!(day.duration(), Duration::hours(8));
    }

    #[test]
    fn test_validate_requires_location() {
        let draft = ShiftDraft::preset(date(), ShiftType::Evening, "  ");
        assert!(matches!(draft.validate(), Err(Error::Validation(_))));
        assert!(ShiftDraft::preset(date(), ShiftType::Evening, "NICU")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_shift_type_parse() {
        assert_eq!(ShiftType::parse("Night"), Some(ShiftType::Night));
        assert_eq!(ShiftType::parse("swing"), None);
    }
}
