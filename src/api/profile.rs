use crate::auth::auth::AuthUser;
use crate::auth::jwt::issue_pair;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::user::Teacher;
use crate::roster::Roster;
use actix_web::{HttpResponse, web};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub teacher: Teacher,
    pub access_token: String,
    pub refresh_token: String,
}

/// Re-read the signed-in teacher from the roster and reissue tokens
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Fresh identity and tokens", body = ProfileResponse),
        (status = 401, description = "Account no longer on the roster"),
        (status = 503, description = "Roster unreachable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Profile"
)]
pub async fn sync_profile(
    auth: AuthUser,
    roster: web::Data<Roster>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let entry = roster
        .find(&auth.teacher.username)
        .await?
        .ok_or_else(|| {
            tracing::info!(username = %auth.teacher.username, "Profile sync for user missing from roster");
            AppError::Unauthorized("Account is no longer on the roster".into())
        })?;

    let teacher = entry.to_teacher(roster.school());
    let tokens = issue_pair(&teacher, &config).map_err(anyhow::Error::from)?;

    Ok(HttpResponse::Ok().json(ProfileResponse {
        teacher,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::tests::{TestState, bearer};
    use crate::auth::jwt::verify_token;
    use crate::capture::clock::tests::FixedClock;
    use actix_web::test;
    use serde_json::Value;

    #[actix_web::test]
    async fn picks_up_roster_changes() {
        let state = TestState::new(FixedClock::at(10, 0));
        let app = test::init_service(state.app()).await;

        let req = test::TestRequest::get()
            .uri("/api/profile")
            .insert_header(bearer())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        // the roster row carries a title the token did not have yet
        assert_eq!(body["teacher"]["name"], "Budi Santoso, S.Pd");
        let claims = verify_token(body["access_token"].as_str().unwrap(), "test-secret").unwrap();
        assert_eq!(claims.teacher.name, "Budi Santoso, S.Pd");
    }
}
