use crate::auth::auth::AuthUser;
use crate::capture::clock::Clock;
use crate::capture::controller::{CaptureSession, CaptureView, SubmitInput};
use crate::capture::registry::{CaptureRegistry, SharedSession};
use crate::capture::status::{Availability, StatusBoard};
use crate::capture::validation::{CaptureRules, clock_gate};
use crate::config::Config;
use crate::device::camera::FrameCamera;
use crate::device::geo::{LocationReport, ReportedLocator};
use crate::error::{AppError, AppResult};
use crate::model::attendance::{EventKind, TeachingDetails};
use crate::sink::RemoteSink;
use actix_web::{HttpResponse, web};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub struct TodayStatus {
    #[schema(example = "2024-05-24", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "07:15")]
    pub local_time: String,
    #[serde(flatten)]
    pub availability: Availability,
}

#[derive(Deserialize, ToSchema)]
pub struct OpenCapture {
    pub kind: EventKind,
    /// Fix or failure the device produced while the camera was starting.
    #[schema(value_type = Option<Object>, example = json!({"latitude": -6.2077, "longitude": 105.9729}))]
    pub location: Option<LocationReport>,
}

/// A frame from the live camera, or the reason there is none.
#[derive(Deserialize, ToSchema)]
pub struct FrameUpload {
    /// Base64 image, optionally as a data URL.
    pub frame: Option<String>,
    #[schema(example = "NotAllowedError: Permission denied")]
    pub error: Option<String>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct SubmitCapture {
    /// Required for teaching sessions, ignored for clock events.
    #[serde(default)]
    pub teaching: Option<TeachingDetails>,
}

async fn session_for(
    registry: &CaptureRegistry,
    id: Uuid,
    auth: &AuthUser,
) -> AppResult<SharedSession> {
    registry.get(id, auth.employee_id()).await
}

/// Today's attendance status
#[utoipa::path(
    get,
    path = "/api/attendance/status",
    responses(
        (status = 200, description = "Status and which clock actions are open", body = TodayStatus),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today_status(
    auth: AuthUser,
    board: web::Data<StatusBoard>,
    clock: web::Data<dyn Clock>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let now = clock.now();
    let date = now.date_naive();
    let status = board.status(auth.employee_id(), date).await;

    Ok(HttpResponse::Ok().json(TodayStatus {
        date,
        local_time: now.format("%H:%M").to_string(),
        availability: Availability::compute(status, now.time(), config.clock_out_after),
    }))
}

/// Open a capture session
#[utoipa::path(
    post,
    path = "/api/capture",
    request_body = OpenCapture,
    responses(
        (status = 201, description = "Session open, camera starting", body = CaptureView),
        (status = 400, description = "Clock action not available now", body = Object, example = json!({
            "message": "Validation failed",
            "errors": [{"field": "kind", "message": "Clock-out opens at 14:20."}]
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
#[allow(clippy::too_many_arguments)]
pub async fn open_capture(
    auth: AuthUser,
    body: web::Json<OpenCapture>,
    camera: web::Data<FrameCamera>,
    registry: web::Data<CaptureRegistry>,
    board: web::Data<StatusBoard>,
    clock: web::Data<dyn Clock>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let OpenCapture { kind, location } = body.into_inner();

    if kind.is_clock() {
        let now = clock.now();
        let status = board.status(auth.employee_id(), now.date_naive()).await;
        if let Some(err) = clock_gate(kind, status, now.time(), config.clock_out_after) {
            return Err(AppError::ValidationFailed(vec![err]));
        }
    }

    let mut session = CaptureSession::new(kind, camera.into_inner(), config.geofence);
    match location {
        Some(report) => session.open_with(&ReportedLocator(report)).await?,
        None => session.open().await?,
    }
    let view = session.view();

    registry.insert(auth.employee_id(), session).await;
    tracing::debug!(session = %view.id, %kind, employee_id = auth.employee_id(), "capture opened");

    Ok(HttpResponse::Created().json(view))
}

/// Current state of a capture session
#[utoipa::path(
    get,
    path = "/api/capture/{id}",
    params(("id" = Uuid, Path, description = "Capture session id")),
    responses(
        (status = 200, description = "Session view", body = CaptureView),
        (status = 404, description = "No such session for this teacher")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
pub async fn get_capture(
    auth: AuthUser,
    path: web::Path<Uuid>,
    registry: web::Data<CaptureRegistry>,
) -> AppResult<HttpResponse> {
    let session = session_for(&registry, path.into_inner(), &auth).await?;
    let view = session.lock().await.view();
    Ok(HttpResponse::Ok().json(view))
}

/// Report a position fix or a location failure
#[utoipa::path(
    put,
    path = "/api/capture/{id}/location",
    params(("id" = Uuid, Path, description = "Capture session id")),
    request_body(content = Object, example = json!({"error": "permission_denied"})),
    responses(
        (status = 200, description = "Distance recomputed", body = CaptureView),
        (status = 400, description = "Coordinate out of range"),
        (status = 409, description = "Session not open")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
pub async fn report_location(
    auth: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<LocationReport>,
    registry: web::Data<CaptureRegistry>,
) -> AppResult<HttpResponse> {
    let session = session_for(&registry, path.into_inner(), &auth).await?;
    let mut session = session.lock().await;
    session.locate(&ReportedLocator(body.into_inner())).await?;
    Ok(HttpResponse::Ok().json(session.view()))
}

/// Push the latest camera frame, or report that the camera failed
#[utoipa::path(
    put,
    path = "/api/capture/{id}/frame",
    params(("id" = Uuid, Path, description = "Capture session id")),
    request_body = FrameUpload,
    responses(
        (status = 200, description = "Frame stored or failure recorded", body = CaptureView),
        (status = 400, description = "Frame is not base64"),
        (status = 422, description = "Camera is not running")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
pub async fn feed_frame(
    auth: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<FrameUpload>,
    camera: web::Data<FrameCamera>,
    registry: web::Data<CaptureRegistry>,
) -> AppResult<HttpResponse> {
    let session = session_for(&registry, path.into_inner(), &auth).await?;
    let mut session = session.lock().await;

    match body.into_inner() {
        FrameUpload {
            error: Some(reason),
            ..
        } => session.camera_failed(reason)?,
        FrameUpload {
            frame: Some(frame), ..
        } => {
            let stream_id = session.stream_id().ok_or_else(|| {
                AppError::CameraUnavailable(
                    session
                        .camera_error()
                        .unwrap_or("camera is not running")
                        .to_string(),
                )
            })?;
            // accept both bare base64 and data URLs
            let encoded = frame.rsplit(',').next().unwrap_or_default();
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|_| AppError::invalid("frame", "Frame is not valid base64."))?;
            camera.feed(stream_id, bytes)?;
        }
        _ => return Err(AppError::invalid("frame", "Send a frame or an error.")),
    }

    Ok(HttpResponse::Ok().json(session.view()))
}

/// Capture the current frame as the selfie
#[utoipa::path(
    post,
    path = "/api/capture/{id}/photo",
    params(("id" = Uuid, Path, description = "Capture session id")),
    responses(
        (status = 200, description = "Photo taken, camera released", body = CaptureView),
        (status = 409, description = "Session not open"),
        (status = 422, description = "No usable frame")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
pub async fn capture_photo(
    auth: AuthUser,
    path: web::Path<Uuid>,
    registry: web::Data<CaptureRegistry>,
) -> AppResult<HttpResponse> {
    let session = session_for(&registry, path.into_inner(), &auth).await?;
    let mut session = session.lock().await;
    session.capture().await?;
    Ok(HttpResponse::Ok().json(session.view()))
}

/// Discard the photo and restart the camera
#[utoipa::path(
    delete,
    path = "/api/capture/{id}/photo",
    params(("id" = Uuid, Path, description = "Capture session id")),
    responses(
        (status = 200, description = "Camera live again", body = CaptureView),
        (status = 409, description = "No photo to retake")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
pub async fn retake_photo(
    auth: AuthUser,
    path: web::Path<Uuid>,
    registry: web::Data<CaptureRegistry>,
) -> AppResult<HttpResponse> {
    let session = session_for(&registry, path.into_inner(), &auth).await?;
    let mut session = session.lock().await;
    session.retake().await?;
    Ok(HttpResponse::Ok().json(session.view()))
}

/// Submit the capture to the attendance sheet
#[utoipa::path(
    post,
    path = "/api/capture/{id}/submit",
    params(("id" = Uuid, Path, description = "Capture session id")),
    request_body = SubmitCapture,
    responses(
        (status = 200, description = "Recorded", body = Object, example = json!({
            "message": "Attendance recorded",
            "kind": "clock-in",
            "timestamp": "2024-05-24T07:15:22+07:00",
            "distance_m": 30.0
        })),
        (status = 400, description = "Validation failed, session kept"),
        (status = 502, description = "Sheet unreachable, photo kept")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
#[allow(clippy::too_many_arguments)]
pub async fn submit_capture(
    auth: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<SubmitCapture>,
    registry: web::Data<CaptureRegistry>,
    board: web::Data<StatusBoard>,
    sink: web::Data<dyn RemoteSink>,
    clock: web::Data<dyn Clock>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let session = session_for(&registry, id, &auth).await?;
    let rules = CaptureRules::from(config.get_ref());

    let event = {
        let mut session = session.lock().await;
        session
            .submit(SubmitInput {
                teacher: &auth.teacher,
                now: clock.now(),
                rules: &rules,
                teaching: body.into_inner().teaching,
                sink: sink.get_ref(),
                board: &board,
            })
            .await?
    };
    registry.remove(id).await;

    let message = match event.kind {
        EventKind::TeachingSession => "Teaching session recorded",
        _ => "Attendance recorded",
    };

    Ok(HttpResponse::Ok().json(json!({
        "message": message,
        "kind": event.kind,
        "timestamp": event.timestamp.to_rfc3339(),
        "distance_m": event.distance_m.map(f64::round),
    })))
}

/// Close the capture without submitting
#[utoipa::path(
    delete,
    path = "/api/capture/{id}",
    params(("id" = Uuid, Path, description = "Capture session id")),
    responses(
        (status = 204, description = "Cancelled, camera released"),
        (status = 404, description = "No such session")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Capture"
)]
pub async fn cancel_capture(
    auth: AuthUser,
    path: web::Path<Uuid>,
    registry: web::Data<CaptureRegistry>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let session = session_for(&registry, id, &auth).await?;
    {
        let mut session = session.lock().await;
        tracing::debug!(session = %id, kind = %session.kind(), state = %session.state(), "capture cancelled");
        session.cancel();
    }
    registry.remove(id).await;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{TestState, bearer};
    use crate::capture::clock::tests::FixedClock;
    use crate::device::camera::tests::png_frame;
    use crate::device::geo::tests::{SCHOOL, north_of};
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    fn frame_json() -> Value {
        json!({ "frame": STANDARD.encode(png_frame(640, 480)) })
    }

    #[actix_web::test]
    async fn clock_in_flow_over_http() {
        let state = TestState::new(FixedClock::at(7, 15));
        let app = test::init_service(state.app()).await;
        let near = north_of(SCHOOL, 30.0);

        let req = test::TestRequest::post()
            .uri("/api/capture")
            .insert_header(bearer())
            .set_json(json!({
                "kind": "clock-in",
                "location": {"latitude": near.latitude, "longitude": near.longitude}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let view: Value = test::read_body_json(resp).await;
        let id = view["id"].as_str().unwrap().to_string();
        assert_eq!(view["state"], "OPEN");
        assert_eq!(view["location"]["in_range"], true);
        assert_eq!(view["can_submit"], false);

        let req = test::TestRequest::put()
            .uri(&format!("/api/capture/{id}/frame"))
            .insert_header(bearer())
            .set_json(frame_json())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri(&format!("/api/capture/{id}/photo"))
            .insert_header(bearer())
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["state"], "PHOTO_READY");
        assert_eq!(view["can_submit"], true);
        assert_eq!(state.camera.active_streams(), 0);

        let req = test::TestRequest::post()
            .uri(&format!("/api/capture/{id}/submit"))
            .insert_header(bearer())
            .set_json(json!({}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["kind"], "clock-in");
        assert_eq!(state.sink.count(), 1);

        let req = test::TestRequest::get()
            .uri("/api/attendance/status")
            .insert_header(bearer())
            .to_request();
        let status: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status["status"], "PRESENT");
        assert_eq!(status["can_clock_in"], false);
        assert_eq!(status["can_clock_out"], false);

        // submitted sessions are gone
        let req = test::TestRequest::get()
            .uri(&format!("/api/capture/{id}"))
            .insert_header(bearer())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn far_away_fix_cannot_submit() {
        let state = TestState::new(FixedClock::at(7, 15));
        let app = test::init_service(state.app()).await;
        let far = north_of(SCHOOL, 5000.0);

        let req = test::TestRequest::post()
            .uri("/api/capture")
            .insert_header(bearer())
            .set_json(json!({
                "kind": "clock-in",
                "location": {"latitude": far.latitude, "longitude": far.longitude}
            }))
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        let id = view["id"].as_str().unwrap().to_string();
        assert_eq!(view["location"]["in_range"], false);
        assert!(
            view["location"]["message"]
                .as_str()
                .unwrap()
                .contains("Maximum radius: 50m")
        );

        let req = test::TestRequest::put()
            .uri(&format!("/api/capture/{id}/frame"))
            .insert_header(bearer())
            .set_json(frame_json())
            .to_request();
        test::call_service(&app, req).await;
        let req = test::TestRequest::post()
            .uri(&format!("/api/capture/{id}/photo"))
            .insert_header(bearer())
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["can_submit"], false);

        let req = test::TestRequest::post()
            .uri(&format!("/api/capture/{id}/submit"))
            .insert_header(bearer())
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"][0]["field"], "location");
        assert_eq!(state.sink.count(), 0);
    }

    #[actix_web::test]
    async fn clock_out_is_gated_before_clock_in() {
        let state = TestState::new(FixedClock::at(15, 0));
        let app = test::init_service(state.app()).await;

        let req = test::TestRequest::post()
            .uri("/api/capture")
            .insert_header(bearer())
            .set_json(json!({"kind": "clock-out"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.camera.active_streams(), 0);
    }

    #[actix_web::test]
    async fn cancel_releases_camera_and_camera_failure_blocks_capture() {
        let state = TestState::new(FixedClock::at(9, 0));
        let app = test::init_service(state.app()).await;

        let req = test::TestRequest::post()
            .uri("/api/capture")
            .insert_header(bearer())
            .set_json(json!({"kind": "teaching"}))
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        let id = view["id"].as_str().unwrap().to_string();
        assert_eq!(state.camera.active_streams(), 1);

        let req = test::TestRequest::put()
            .uri(&format!("/api/capture/{id}/frame"))
            .insert_header(bearer())
            .set_json(json!({"error": "NotAllowedError"}))
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["camera_error"], "NotAllowedError");
        assert_eq!(state.camera.active_streams(), 0);

        let req = test::TestRequest::post()
            .uri(&format!("/api/capture/{id}/photo"))
            .insert_header(bearer())
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let req = test::TestRequest::delete()
            .uri(&format!("/api/capture/{id}"))
            .insert_header(bearer())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.camera.active_streams(), 0);
    }

    #[actix_web::test]
    async fn requires_bearer_token() {
        let state = TestState::new(FixedClock::at(7, 0));
        let app = test::init_service(state.app()).await;
        let req = test::TestRequest::get().uri("/api/attendance/status").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }
}
