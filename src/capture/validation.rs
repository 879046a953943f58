//! Form rules checked at submit time. Every rule reports into one list so the
//! client can mark all offending fields at once.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{NaiveDate, NaiveTime};

use crate::capture::controller::LocationState;
use crate::config::Config;
use crate::device::geo::Geofence;
use crate::error::FieldError;
use crate::model::attendance::{AttendanceStatus, EventKind, TeachingDetails};
use crate::model::leave_request::LeaveRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRules {
    pub clock_out_after: NaiveTime,
    pub enforce_teaching_time_range: bool,
}

impl From<&Config> for CaptureRules {
    fn from(config: &Config) -> Self {
        Self {
            clock_out_after: config.clock_out_after,
            enforce_teaching_time_range: config.enforce_teaching_time_range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveRules {
    pub reason_min_len: usize,
    pub attachment_max_bytes: usize,
}

impl From<&Config> for LeaveRules {
    fn from(config: &Config) -> Self {
        Self {
            reason_min_len: config.leave_reason_min_len,
            attachment_max_bytes: config.attachment_max_bytes,
        }
    }
}

/// Whether the day's status allows this clock event at all.
pub fn clock_gate(
    kind: EventKind,
    status: AttendanceStatus,
    local_time: NaiveTime,
    cutoff: NaiveTime,
) -> Option<FieldError> {
    match kind {
        EventKind::ClockIn if status != AttendanceStatus::Idle => {
            Some(FieldError::new("kind", "You have already clocked in today."))
        }
        EventKind::ClockOut if status != AttendanceStatus::Present => Some(FieldError::new(
            "kind",
            "Clock-out is only available after clocking in.",
        )),
        EventKind::ClockOut if local_time < cutoff => Some(FieldError::new(
            "kind",
            format!("Clock-out opens at {}.", cutoff.format("%H:%M")),
        )),
        _ => None,
    }
}

pub fn validate_clock(
    has_photo: bool,
    location: &LocationState,
    geofence: &Geofence,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if !has_photo {
        errors.push(FieldError::new(
            "photo",
            "A selfie is required as proof of attendance.",
        ));
    }

    match location {
        LocationState::Acquired { distance_m, .. } if !geofence.contains_distance(*distance_m) => {
            errors.push(FieldError::new(
                "location",
                format!(
                    "Your distance ({}m) is too far from the school.",
                    distance_m.round()
                ),
            ));
        }
        LocationState::Acquired { .. } => {}
        LocationState::Pending | LocationState::Unavailable(_) => {
            errors.push(FieldError::new(
                "location",
                "GPS must be enabled to record the attendance location.",
            ));
        }
    }

    errors
}

pub fn validate_teaching(
    has_photo: bool,
    details: Option<&TeachingDetails>,
    enforce_time_range: bool,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let empty = TeachingDetails::default();
    let details = details.unwrap_or(&empty);

    if details.subject.trim().is_empty() {
        errors.push(FieldError::new("subject", "Subject is required."));
    }

    let start = parse_time(details.start_time.as_deref());
    let end = parse_time(details.end_time.as_deref());
    if start.is_none() {
        errors.push(FieldError::new("startTime", "Start time is required (HH:MM)."));
    }
    if end.is_none() {
        errors.push(FieldError::new("endTime", "End time is required (HH:MM)."));
    }
    if let (Some(start), Some(end)) = (start, end) {
        if enforce_time_range && end <= start {
            errors.push(FieldError::new("endTime", "End time must be after start time."));
        }
    }

    if !has_photo {
        errors.push(FieldError::new(
            "photo",
            "A teaching photo is required as evidence.",
        ));
    }

    errors
}

pub fn validate_leave(request: &LeaveRequest, rules: &LeaveRules) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if request.start_date.is_none() {
        errors.push(FieldError::new("startDate", "Pick a start date."));
    }
    match (request.start_date, request.end_date) {
        (_, None) => errors.push(FieldError::new("endDate", "Pick an end date.")),
        (Some(start), Some(end)) if end < start => errors.push(FieldError::new(
            "endDate",
            "End date cannot be before the start date.",
        )),
        _ => {}
    }

    if request.reason.trim().chars().count() < rules.reason_min_len {
        errors.push(FieldError::new(
            "reason",
            format!("Reason must be at least {} characters.", rules.reason_min_len),
        ));
    }

    if let Some(attachment) = &request.attachment {
        if let Err(message) = check_attachment(attachment, rules.attachment_max_bytes) {
            errors.push(FieldError::new("attachment", message));
        }
    }

    errors
}

/// Dates of a leave request that already passed [`validate_leave`].
pub fn leave_dates(request: &LeaveRequest) -> Option<(NaiveDate, NaiveDate)> {
    Some((request.start_date?, request.end_date?))
}

fn parse_time(value: Option<&str>) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value?.trim(), "%H:%M").ok()
}

fn check_attachment(data_url: &str, max_bytes: usize) -> Result<(), String> {
    let (header, body) = data_url
        .split_once(',')
        .ok_or_else(|| "Attachment must be a data URL.".to_string())?;

    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err("Attachment must be a base64-encoded image.".to_string());
    }

    let decoded = STANDARD
        .decode(body.trim())
        .map_err(|_| "Attachment is not valid base64.".to_string())?;

    if decoded.len() > max_bytes {
        return Err(format!(
            "File too large (max {}MB).",
            max_bytes / (1024 * 1024)
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::geo::Coordinate;
    use crate::model::leave_request::LeaveType;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn leave(reason: &str) -> LeaveRequest {
        LeaveRequest {
            leave_type: LeaveType::Sick,
            start_date: NaiveDate::from_ymd_opt(2024, 5, 15),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 16),
            reason: reason.to_string(),
            attachment: None,
        }
    }

    fn rules() -> LeaveRules {
        LeaveRules {
            reason_min_len: 10,
            attachment_max_bytes: 16,
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn leave_reason_minimum_length() {
        assert_eq!(fields(&validate_leave(&leave("123456789"), &rules())), ["reason"]);
        assert!(validate_leave(&leave("1234567890"), &rules()).is_empty());
        // whitespace does not count
        assert_eq!(fields(&validate_leave(&leave("   12345678   "), &rules())), ["reason"]);
    }

    #[test]
    fn leave_dates_must_be_ordered() {
        let mut req = leave("demam tinggi sejak kemarin");
        req.end_date = NaiveDate::from_ymd_opt(2024, 5, 14);
        assert_eq!(fields(&validate_leave(&req, &rules())), ["endDate"]);

        req.start_date = None;
        req.end_date = None;
        assert_eq!(fields(&validate_leave(&req, &rules())), ["startDate", "endDate"]);
        assert!(leave_dates(&req).is_none());
    }

    #[test]
    fn leave_attachment_is_bounded_image() {
        let mut req = leave("demam tinggi sejak kemarin");
        req.attachment = Some(format!("data:image/png;base64,{}", STANDARD.encode([0u8; 8])));
        assert!(validate_leave(&req, &rules()).is_empty());

        req.attachment = Some(format!("data:image/png;base64,{}", STANDARD.encode([0u8; 32])));
        assert_eq!(fields(&validate_leave(&req, &rules())), ["attachment"]);

        req.attachment = Some("data:application/pdf;base64,AAAA".into());
        assert_eq!(fields(&validate_leave(&req, &rules())), ["attachment"]);
    }

    #[test]
    fn clock_requires_photo_regardless_of_location() {
        let fence = Geofence::new(Coordinate::new(0.0, 0.0), 50.0);
        let near = LocationState::Acquired {
            coordinate: Coordinate::new(0.0, 0.0),
            distance_m: 0.0,
        };
        assert_eq!(fields(&validate_clock(false, &near, &fence)), ["photo"]);
        assert!(validate_clock(true, &near, &fence).is_empty());

        let far = LocationState::Acquired {
            coordinate: Coordinate::new(0.0, 1.0),
            distance_m: 111_195.0,
        };
        assert_eq!(fields(&validate_clock(true, &far, &fence)), ["location"]);
        assert_eq!(
            fields(&validate_clock(true, &LocationState::Pending, &fence)),
            ["location"]
        );
    }

    #[test]
    fn clock_gates() {
        let cutoff = hm(14, 20);
        assert!(clock_gate(EventKind::ClockIn, AttendanceStatus::Idle, hm(7, 0), cutoff).is_none());
        assert!(clock_gate(EventKind::ClockIn, AttendanceStatus::Present, hm(7, 0), cutoff).is_some());
        assert!(clock_gate(EventKind::ClockOut, AttendanceStatus::Idle, hm(15, 0), cutoff).is_some());
        assert!(clock_gate(EventKind::ClockOut, AttendanceStatus::Present, hm(14, 0), cutoff).is_some());
        assert!(clock_gate(EventKind::ClockOut, AttendanceStatus::Present, hm(14, 20), cutoff).is_none());
        assert!(
            clock_gate(EventKind::TeachingSession, AttendanceStatus::Idle, hm(7, 0), cutoff).is_none()
        );
    }

    #[test]
    fn teaching_time_range_is_configurable() {
        let details = TeachingDetails {
            subject: "Matematika".into(),
            class_name: None,
            start_time: Some("09:30".into()),
            end_time: Some("08:00".into()),
        };
        assert_eq!(fields(&validate_teaching(true, Some(&details), true)), ["endTime"]);
        assert!(validate_teaching(true, Some(&details), false).is_empty());
        assert_eq!(
            fields(&validate_teaching(false, None, true)),
            ["subject", "startTime", "endTime", "photo"]
        );
    }
}
