use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::device::camera::CapturedPhoto;
use crate::device::geo::Coordinate;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    ClockIn,
    ClockOut,
    #[serde(rename = "teaching")]
    #[strum(serialize = "teaching")]
    TeachingSession,
}

impl EventKind {
    /// Clock events are geofenced; teaching sessions only need a photo.
    pub fn is_clock(&self) -> bool {
        matches!(self, EventKind::ClockIn | EventKind::ClockOut)
    }
}

/// Attendance state of one teacher for one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    #[default]
    Idle,
    Present,
    Out,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TeachingDetails {
    #[schema(example = "Matematika")]
    pub subject: String,
    #[schema(example = "VII-A", nullable = true)]
    #[serde(default)]
    pub class_name: Option<String>,
    /// `HH:MM` local time
    #[schema(example = "08:00", nullable = true)]
    #[serde(default)]
    pub start_time: Option<String>,
    /// `HH:MM` local time
    #[schema(example = "09:30", nullable = true)]
    #[serde(default)]
    pub end_time: Option<String>,
}

/// One confirmed capture, built at submit time and sent once.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEvent {
    pub employee_name: String,
    pub employee_id: String,
    pub kind: EventKind,
    pub timestamp: DateTime<FixedOffset>,
    pub coordinate: Option<Coordinate>,
    pub distance_m: Option<f64>,
    pub photo: CapturedPhoto,
    pub teaching: Option<TeachingDetails>,
}
