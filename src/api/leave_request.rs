use crate::auth::auth::AuthUser;
use crate::capture::clock::Clock;
use crate::capture::validation::{LeaveRules, leave_dates, validate_leave};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::leave_request::LeaveRequest;
use crate::sink::{RemoteSink, SinkPayload};
use actix_web::{HttpResponse, web};
use serde_json::json;

/// Submit a leave request (permission, sick, official duty)
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body = LeaveRequest,
    responses(
        (status = 201, description = "Leave request sent to the school", body = Object, example = json!({
            "message": "Leave request submitted",
            "status": "pending"
        })),
        (status = 400, description = "Validation failed", body = Object, example = json!({
            "message": "Validation failed",
            "errors": [{"field": "reason", "message": "Reason must be at least 10 characters."}]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Sheet unreachable, nothing was recorded")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    payload: web::Json<LeaveRequest>,
    sink: web::Data<dyn RemoteSink>,
    clock: web::Data<dyn Clock>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let request = payload.into_inner();

    let errors = validate_leave(&request, &LeaveRules::from(config.get_ref()));
    if !errors.is_empty() {
        return Err(AppError::ValidationFailed(errors));
    }
    let (start_date, end_date) = leave_dates(&request)
        .ok_or_else(|| AppError::invalid("startDate", "Pick a start date."))?;

    let body = SinkPayload::leave(
        &auth.teacher,
        request.leave_type,
        start_date,
        end_date,
        &request.reason,
        request.attachment,
        clock.now(),
    );

    if let Err(e) = sink.submit(&body).await {
        tracing::error!(error = %e, employee_id = auth.employee_id(), "Leave submission failed");
        return Err(e);
    }

    tracing::info!(
        employee_id = auth.employee_id(),
        leave_type = %request.leave_type,
        %start_date,
        %end_date,
        "Leave request submitted"
    );

    Ok(HttpResponse::Created().json(json!({
        "message": "Leave request submitted",
        "status": "pending",
        "leave_type": request.leave_type,
        "start_date": start_date,
        "end_date": end_date,
    })))
}
