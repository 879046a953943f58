use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use strum_macros::{Display, EnumString};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceEvent, EventKind};
use crate::model::leave_request::LeaveType;
use crate::model::user::Teacher;

/// How a submission counts as delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SubmitPolicy {
    /// Any HTTP answer is success; only transport errors fail.
    Optimistic,
    /// The sink must answer 2xx.
    Ack,
}

/// Body posted to the remote spreadsheet endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SinkPayload {
    Attendance {
        #[serde(rename = "type")]
        kind: EventKind,
        name: String,
        nip: String,
        timestamp: String,
        location: String,
        distance: f64,
        photo: String,
    },
    Teaching {
        name: String,
        nip: String,
        subject: String,
        class_name: Option<String>,
        start_time: Option<String>,
        end_time: Option<String>,
        timestamp: String,
        photo: String,
    },
    Leave {
        name: String,
        nip: String,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: String,
        attachment: Option<String>,
        timestamp: String,
    },
}

impl SinkPayload {
    pub fn from_event(event: &AttendanceEvent) -> Self {
        let timestamp = event.timestamp.to_rfc3339();
        match event.kind {
            EventKind::TeachingSession => {
                let teaching = event.teaching.clone().unwrap_or_default();
                SinkPayload::Teaching {
                    name: event.employee_name.clone(),
                    nip: event.employee_id.clone(),
                    subject: teaching.subject,
                    class_name: teaching.class_name,
                    start_time: teaching.start_time,
                    end_time: teaching.end_time,
                    timestamp,
                    photo: event.photo.data_url.clone(),
                }
            }
            kind => SinkPayload::Attendance {
                kind,
                name: event.employee_name.clone(),
                nip: event.employee_id.clone(),
                timestamp,
                location: event.coordinate.map(|c| c.to_string()).unwrap_or_default(),
                distance: event.distance_m.map(f64::round).unwrap_or_default(),
                photo: event.photo.data_url.clone(),
            },
        }
    }

    pub fn leave(
        teacher: &Teacher,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: &str,
        attachment: Option<String>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        SinkPayload::Leave {
            name: teacher.name.clone(),
            nip: teacher.employee_id.clone(),
            leave_type,
            start_date,
            end_date,
            reason: reason.trim().to_string(),
            attachment,
            timestamp: now.to_rfc3339(),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            SinkPayload::Attendance { .. } => "attendance",
            SinkPayload::Teaching { .. } => "teaching",
            SinkPayload::Leave { .. } => "leave",
        }
    }
}

/// Write-only destination for submissions.
pub trait RemoteSink: Send + Sync {
    fn submit<'a>(&'a self, payload: &'a SinkPayload) -> BoxFuture<'a, AppResult<()>>;
}

pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    policy: SubmitPolicy,
}

impl HttpSink {
    pub fn new(url: &str, policy: SubmitPolicy, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            policy,
        })
    }
}

impl RemoteSink for HttpSink {
    fn submit<'a>(&'a self, payload: &'a SinkPayload) -> BoxFuture<'a, AppResult<()>> {
        async move {
            let response = self.client.post(&self.url).json(payload).send().await?;
            let status = response.status();

            match self.policy {
                SubmitPolicy::Optimistic => {
                    debug!(category = payload.category(), %status, "submission dispatched");
                    Ok(())
                }
                SubmitPolicy::Ack if status.is_success() => Ok(()),
                SubmitPolicy::Ack => {
                    warn!(category = payload.category(), %status, "sink rejected submission");
                    Err(AppError::TransportFailure(format!(
                        "remote endpoint answered {status}"
                    )))
                }
            }
        }
        .boxed()
    }
}
