use std::{env, fmt::Display, str::FromStr};

use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, NaiveTime};
use dotenvy::dotenv;
use tracing::info;

use crate::device::camera::PhotoSettings;
use crate::device::geo::{Coordinate, Geofence};
use crate::sink::SubmitPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    pub jwt_secret: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub log_dir: String,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // School / geofence
    pub school_name: String,
    pub geofence: Geofence,
    pub clock_out_after: NaiveTime,
    pub utc_offset: FixedOffset,

    // Form rules
    pub enforce_teaching_time_range: bool,
    pub leave_reason_min_len: usize,
    pub attachment_max_bytes: usize,

    // Remote sink
    pub submit_url: String,
    pub submit_policy: SubmitPolicy,
    pub submit_timeout_secs: u64,

    // Roster export
    pub roster_url: String,
    pub roster_ttl_secs: u64,

    pub capture_idle_secs: u64,
    pub photo: PhotoSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let latitude: f64 = load("SCHOOL_LAT", "-6.207717532534012")?;
        let longitude: f64 = load("SCHOOL_LNG", "105.97297020119038")?;
        let radius_m: f64 = load("GEOFENCE_RADIUS_M", "50")?;
        let offset_minutes: i32 = load("UTC_OFFSET_MINUTES", "420")?;

        let spreadsheet_id = require("ROSTER_SPREADSHEET_ID")?;
        let sheet: String = load("ROSTER_SHEET", "Sheet1")?;

        Ok(Self {
            server_addr: require("SERVER_ADDR")?,
            jwt_secret: require("JWT_SECRET")?,
            access_token_ttl: load("ACCESS_TOKEN_TTL", "900")?, // default 15 min
            refresh_token_ttl: load("REFRESH_TOKEN_TTL", "604800")?, // default 7 days
            log_dir: load("LOG_DIR", "logs")?,

            rate_login_per_min: load("RATE_LOGIN_PER_MIN", "60")?,
            rate_refresh_per_min: load("RATE_REFRESH_PER_MIN", "30")?,
            rate_protected_per_min: load("RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: load("API_PREFIX", "/api")?,

            school_name: load("SCHOOL_NAME", "SMPN 1 Padarincang")?,
            geofence: Geofence::new(Coordinate::new(latitude, longitude), radius_m),
            clock_out_after: parse_hhmm(&load::<String>("CLOCK_OUT_AFTER", "14:20")?)?,
            utc_offset: FixedOffset::east_opt(offset_minutes * 60)
                .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?,

            enforce_teaching_time_range: load("TEACHING_ENFORCE_TIME_RANGE", "true")?,
            leave_reason_min_len: load("LEAVE_REASON_MIN_LEN", "10")?,
            attachment_max_bytes: load("ATTACHMENT_MAX_BYTES", "5242880")?, // 5 MiB

            submit_url: require("SUBMIT_URL")?,
            submit_policy: load("SUBMIT_POLICY", "optimistic")?,
            submit_timeout_secs: load("SUBMIT_TIMEOUT_SECS", "15")?,

            roster_url: gviz_export_url(&spreadsheet_id, &sheet),
            roster_ttl_secs: load("ROSTER_TTL_SECS", "300")?,

            capture_idle_secs: load("CAPTURE_IDLE_SECS", "600")?,
            photo: PhotoSettings {
                width: load("PHOTO_WIDTH", "600")?,
                height: load("PHOTO_HEIGHT", "800")?,
                quality: load("PHOTO_QUALITY", "90")?,
                max_bytes: load("PHOTO_MAX_BYTES", "524288")?,
            },
        })
    }
}

/// Google Visualization JSON export of one sheet.
pub fn gviz_export_url(spreadsheet_id: &str, sheet: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{spreadsheet_id}/gviz/tq?tqx=out:json&sheet={sheet}")
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("expected HH:MM, got {value:?}"))
}

fn require(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow!("invalid {key} value {raw:?}: {e}"))
}

#[cfg(test)]
impl Config {
    /// Defaults matching the production school, with local-only endpoints.
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".into(),
            jwt_secret: "test-secret".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 604800,
            log_dir: "logs".into(),
            rate_login_per_min: 60,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            school_name: "SMPN 1 Padarincang".into(),
            geofence: Geofence::new(Coordinate::new(-6.207717532534012, 105.97297020119038), 50.0),
            clock_out_after: NaiveTime::from_hms_opt(14, 20, 0).unwrap(),
            utc_offset: FixedOffset::east_opt(7 * 3600).unwrap(),
            enforce_teaching_time_range: true,
            leave_reason_min_len: 10,
            attachment_max_bytes: 5 * 1024 * 1024,
            submit_url: "http://127.0.0.1:9/submit".into(),
            submit_policy: SubmitPolicy::Optimistic,
            submit_timeout_secs: 2,
            roster_url: "http://127.0.0.1:9/roster".into(),
            roster_ttl_secs: 300,
            capture_idle_secs: 600,
            photo: PhotoSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_gviz_url() {
        assert_eq!(
            gviz_export_url("abc", "Sheet1"),
            "https://docs.google.com/spreadsheets/d/abc/gviz/tq?tqx=out:json&sheet=Sheet1"
        );
    }

    #[test]
    fn parses_cutoff_time() {
        assert_eq!(
            parse_hhmm("14:20").unwrap(),
            NaiveTime::from_hms_opt(14, 20, 0).unwrap()
        );
        assert!(parse_hhmm("2pm").is_err());
    }
}
