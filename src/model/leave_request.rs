use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaveType {
    #[default]
    Permission,
    Sick,
    OfficialDuty,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LeaveRequest {
    #[serde(default)]
    #[schema(example = "sick")]
    pub leave_type: LeaveType,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-01-02", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    #[schema(example = "High fever since last night")]
    pub reason: String,
    /// Optional image evidence as a base64 data URL.
    #[serde(default)]
    #[schema(nullable = true)]
    pub attachment: Option<String>,
}
