use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use strum_macros::Display;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::capture::status::StatusBoard;
use crate::capture::validation::{self, CaptureRules};
use crate::device::camera::{CameraCapturer, CapturedPhoto, StreamHandle};
use crate::device::geo::{Coordinate, GeoLocator, Geofence};
use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceEvent, EventKind, TeachingDetails};
use crate::model::user::Teacher;
use crate::sink::{RemoteSink, SinkPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureState {
    Idle,
    Open,
    PhotoReady,
    Submitting,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    Pending,
    Acquired {
        coordinate: Coordinate,
        distance_m: f64,
    },
    Unavailable(String),
}

/// Everything a submit needs besides the session itself.
pub struct SubmitInput<'a> {
    pub teacher: &'a Teacher,
    pub now: DateTime<FixedOffset>,
    pub rules: &'a CaptureRules,
    pub teaching: Option<TeachingDetails>,
    pub sink: &'a dyn RemoteSink,
    pub board: &'a StatusBoard,
}

/// One open attendance or teaching capture, from open to close/cancel.
pub struct CaptureSession<C: CameraCapturer> {
    id: Uuid,
    kind: EventKind,
    state: CaptureState,
    camera: Arc<C>,
    stream: Option<StreamHandle>,
    location: LocationState,
    photo: Option<CapturedPhoto>,
    camera_error: Option<String>,
    geofence: Geofence,
}

impl<C: CameraCapturer> CaptureSession<C> {
    pub fn new(kind: EventKind, camera: Arc<C>, geofence: Geofence) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: CaptureState::Idle,
            camera,
            stream: None,
            location: LocationState::Pending,
            photo: None,
            camera_error: None,
            geofence,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn camera_error(&self) -> Option<&str> {
        self.camera_error.as_deref()
    }

    pub fn stream_id(&self) -> Option<Uuid> {
        self.stream.as_ref().map(StreamHandle::id)
    }

    /// Opens the camera only; the position follows with [`Self::locate`].
    pub async fn open(&mut self) -> AppResult<()> {
        self.expect_state(&[CaptureState::Idle], "open")?;
        self.state = CaptureState::Open;
        let started = self.camera.start().await;
        self.on_camera_started(started);
        Ok(())
    }

    /// Opens the camera and acquires a position concurrently.
    pub async fn open_with<L: GeoLocator>(&mut self, locator: &L) -> AppResult<()> {
        self.expect_state(&[CaptureState::Idle], "open")?;
        self.state = CaptureState::Open;

        let camera = Arc::clone(&self.camera);
        let (fix, started) = futures::join!(locator.acquire(), camera.start());
        self.on_camera_started(started);
        self.on_fix(fix)
    }

    /// User-triggered (re-)acquisition of the position.
    pub async fn locate<L: GeoLocator>(&mut self, locator: &L) -> AppResult<()> {
        self.expect_state(&[CaptureState::Open, CaptureState::PhotoReady], "locate")?;
        let fix = locator.acquire().await;
        self.on_fix(fix)
    }

    /// Samples the current frame and releases the camera.
    pub async fn capture(&mut self) -> AppResult<&CapturedPhoto> {
        self.expect_state(&[CaptureState::Open], "capture")?;

        let stream = self.stream.as_ref().ok_or_else(|| {
            AppError::CameraUnavailable(
                self.camera_error
                    .clone()
                    .unwrap_or_else(|| "camera is not running".to_string()),
            )
        })?;
        let photo = self.camera.capture(stream).await?;

        self.release_camera();
        self.state = CaptureState::PhotoReady;
        Ok(&*self.photo.insert(photo))
    }

    /// Drops the photo and restarts the camera.
    pub async fn retake(&mut self) -> AppResult<()> {
        self.expect_state(&[CaptureState::PhotoReady], "retake")?;
        self.photo = None;
        self.state = CaptureState::Open;
        let started = self.camera.start().await;
        self.on_camera_started(started);
        Ok(())
    }

    /// The client could not get camera access; capture is blocked until retake.
    pub fn camera_failed(&mut self, reason: impl Into<String>) -> AppResult<()> {
        self.expect_state(&[CaptureState::Open], "report a camera failure")?;
        self.release_camera();
        self.camera_error = Some(reason.into());
        Ok(())
    }

    /// Back to idle from any state; transient capture data is discarded.
    pub fn cancel(&mut self) {
        self.release_camera();
        self.photo = None;
        self.location = LocationState::Pending;
        self.camera_error = None;
        self.state = CaptureState::Idle;
    }

    fn in_range(&self) -> bool {
        matches!(
            self.location,
            LocationState::Acquired { distance_m, .. } if self.geofence.contains_distance(distance_m)
        )
    }

    /// Submit is live once the photo exists and, for clock events, the fix is in range.
    pub fn can_submit(&self) -> bool {
        self.state == CaptureState::PhotoReady
            && self.photo.is_some()
            && (!self.kind.is_clock() || self.in_range())
    }

    pub async fn submit(&mut self, input: SubmitInput<'_>) -> AppResult<AttendanceEvent> {
        self.expect_state(&[CaptureState::Open, CaptureState::PhotoReady], "submit")?;

        let teacher = input.teacher;
        let day = input.now.date_naive();

        // gate, dispatch and record happen under one lock per teacher and day
        let _day_guard = if self.kind.is_clock() {
            Some(input.board.lock_day(&teacher.employee_id, day).await)
        } else {
            None
        };

        let errors = if self.kind.is_clock() {
            let status = input.board.status(&teacher.employee_id, day).await;
            let mut errors: Vec<_> = validation::clock_gate(
                self.kind,
                status,
                input.now.time(),
                input.rules.clock_out_after,
            )
            .into_iter()
            .collect();
            errors.extend(validation::validate_clock(
                self.photo.is_some(),
                &self.location,
                &self.geofence,
            ));
            errors
        } else {
            validation::validate_teaching(
                self.photo.is_some(),
                input.teaching.as_ref(),
                input.rules.enforce_teaching_time_range,
            )
        };
        if !errors.is_empty() {
            return Err(AppError::ValidationFailed(errors));
        }

        let photo = match &self.photo {
            Some(photo) => photo.clone(),
            None => return Err(AppError::invalid("photo", "A photo is required.")),
        };
        let (coordinate, distance_m) = match self.location {
            LocationState::Acquired {
                coordinate,
                distance_m,
            } => (Some(coordinate), Some(distance_m)),
            _ => (None, None),
        };

        let event = AttendanceEvent {
            employee_name: teacher.name.clone(),
            employee_id: teacher.employee_id.clone(),
            kind: self.kind,
            timestamp: input.now,
            coordinate,
            distance_m,
            photo,
            teaching: input.teaching.filter(|_| !self.kind.is_clock()),
        };

        self.state = CaptureState::Submitting;
        let payload = SinkPayload::from_event(&event);

        match input.sink.submit(&payload).await {
            Ok(()) => {
                input.board.record(&teacher.employee_id, day, self.kind).await;
                self.state = CaptureState::Closed;
                info!(session = %self.id, kind = %self.kind, employee_id = %teacher.employee_id, "capture submitted");
                Ok(event)
            }
            Err(e) => {
                self.state = CaptureState::PhotoReady;
                warn!(error = %e, session = %self.id, employee_id = %teacher.employee_id, "capture submission failed");
                Err(e)
            }
        }
    }

    fn expect_state(&self, allowed: &[CaptureState], action: &'static str) -> AppResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                action,
                state: self.state.to_string(),
            })
        }
    }

    fn on_camera_started(&mut self, started: AppResult<StreamHandle>) {
        match started {
            Ok(stream) => {
                self.release_camera();
                self.stream = Some(stream);
                self.camera_error = None;
            }
            Err(e) => {
                warn!(error = %e, session = %self.id, "camera start failed");
                self.camera_error = Some(e.to_string());
            }
        }
    }

    fn on_fix(&mut self, fix: AppResult<Coordinate>) -> AppResult<()> {
        match fix {
            Ok(coordinate) => {
                let distance_m = self.geofence.distance(&coordinate);
                self.location = LocationState::Acquired {
                    coordinate,
                    distance_m,
                };
                Ok(())
            }
            Err(AppError::LocationUnavailable(reason)) => {
                self.location = LocationState::Unavailable(reason);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn release_camera(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.camera.stop(stream);
        }
    }

    pub fn view(&self) -> CaptureView {
        let location = match &self.location {
            LocationState::Pending => LocationView {
                status: "pending",
                coordinate: None,
                distance_m: None,
                in_range: None,
                message: None,
            },
            LocationState::Acquired {
                coordinate,
                distance_m,
            } => {
                let in_range = self.geofence.contains_distance(*distance_m);
                LocationView {
                    status: "acquired",
                    coordinate: Some(*coordinate),
                    distance_m: Some(distance_m.round()),
                    in_range: Some(in_range),
                    message: (!in_range && self.kind.is_clock())
                        .then(|| self.geofence.out_of_range_message(*distance_m)),
                }
            }
            LocationState::Unavailable(reason) => LocationView {
                status: "unavailable",
                coordinate: None,
                distance_m: None,
                in_range: None,
                message: Some(format!(
                    "Could not get GPS coordinates ({reason}). Make sure location access is enabled."
                )),
            },
        };

        CaptureView {
            id: self.id,
            kind: self.kind,
            state: self.state,
            stream_id: self.stream_id(),
            location,
            photo: self.photo.clone(),
            camera_error: self.camera_error.clone(),
            can_submit: self.can_submit(),
        }
    }
}

impl<C: CameraCapturer> Drop for CaptureSession<C> {
    fn drop(&mut self) {
        self.release_camera();
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationView {
    #[schema(example = "acquired")]
    pub status: &'static str,
    pub coordinate: Option<Coordinate>,
    #[schema(example = 30.0)]
    pub distance_m: Option<f64>,
    pub in_range: Option<bool>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CaptureView {
    pub id: Uuid,
    pub kind: EventKind,
    pub state: CaptureState,
    /// Stream to feed frames into while the camera is live.
    pub stream_id: Option<Uuid>,
    pub location: LocationView,
    pub photo: Option<CapturedPhoto>,
    pub camera_error: Option<String>,
    pub can_submit: bool,
}
