use crate::api::attendance::{FrameUpload, OpenCapture, SubmitCapture, TodayStatus};
use crate::api::profile::ProfileResponse;
use crate::auth::handlers::{LoginRequest, LoginResponse};
use crate::auth::jwt::TokenPair;
use crate::capture::controller::{CaptureState, CaptureView, LocationView};
use crate::capture::status::Availability;
use crate::device::camera::CapturedPhoto;
use crate::device::geo::{Coordinate, LocationFailure};
use crate::error::FieldError;
use crate::model::attendance::{AttendanceStatus, EventKind, TeachingDetails};
use crate::model::leave_request::{LeaveRequest, LeaveType};
use crate::model::user::Teacher;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Presensi Guru API",
        version = "1.0.0",
        description = r#"
## Teacher Attendance

Geofenced clock-in/clock-out with a selfie, teaching-session evidence and
leave requests for school staff. Records are forwarded to the school's
attendance spreadsheet.

### Capture flow
1. `POST /api/capture` with the event kind and, if already known, the device position
2. `PUT /api/capture/{id}/frame` while the camera preview runs
3. `POST /api/capture/{id}/photo` to take the selfie (`DELETE` to retake)
4. `POST /api/capture/{id}/submit`

Clock events are only accepted inside the school radius.

### Security
All `/api` endpoints require a **JWT Bearer** access token from `/auth/login`.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::attendance::today_status,
        crate::api::attendance::open_capture,
        crate::api::attendance::get_capture,
        crate::api::attendance::report_location,
        crate::api::attendance::feed_frame,
        crate::api::attendance::capture_photo,
        crate::api::attendance::retake_photo,
        crate::api::attendance::submit_capture,
        crate::api::attendance::cancel_capture,

        crate::api::leave_request::create_leave,

        crate::api::profile::sync_profile
    ),
    components(
        schemas(
            LoginRequest,
            LoginResponse,
            TokenPair,
            Teacher,
            TodayStatus,
            Availability,
            AttendanceStatus,
            OpenCapture,
            FrameUpload,
            SubmitCapture,
            CaptureView,
            CaptureState,
            LocationView,
            Coordinate,
            LocationFailure,
            CapturedPhoto,
            EventKind,
            TeachingDetails,
            LeaveRequest,
            LeaveType,
            FieldError,
            ProfileResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token lifecycle"),
        (name = "Attendance", description = "Daily attendance status"),
        (name = "Capture", description = "Clock-in/out and teaching capture sessions"),
        (name = "Leave", description = "Leave requests"),
        (name = "Profile", description = "Signed-in teacher"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
