use crate::{
    auth::{
        auth::bearer_token,
        jwt::{TokenPair, TokenType, issue_pair, verify_token},
        revoked,
    },
    config::Config,
    error::{AppError, AppResult, FieldError},
    model::user::Teacher,
    roster::Roster,
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "budi")]
    pub username: String,
    #[schema(example = "rahasia123")]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Echoed back so the client can prefill the login form next time.
    pub username: String,
    pub teacher: Teacher,
}

/// Teacher login against the roster
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials", body = Object, example = json!({
            "message": "unauthorized: Invalid credentials"
        })),
        (status = 503, description = "Roster unreachable")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(roster, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginRequest>,
    roster: web::Data<Roster>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    // 1️⃣ Basic validation
    let username = user.username.trim();
    let mut errors = Vec::new();
    if username.is_empty() {
        errors.push(FieldError::new("username", "Username is required."));
    }
    if user.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required."));
    }
    if !errors.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(AppError::ValidationFailed(errors));
    }

    // 2️⃣ Roster lookup + password check
    debug!("Checking credentials against roster");
    let teacher = match roster.authenticate(username, &user.password).await? {
        Some(teacher) => teacher,
        None => {
            info!("Invalid credentials");
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
    };

    // 3️⃣ Issue tokens
    debug!(employee_id = %teacher.employee_id, "Generating tokens");
    let tokens = issue_pair(&teacher, &config).map_err(anyhow::Error::from)?;

    info!("Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        username: teacher.username.clone(),
        teacher,
    }))
}

/// Rotates a refresh token: the presented one is revoked, a new pair is issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let token =
        bearer_token(&req).ok_or_else(|| AppError::Unauthorized("No token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    if revoked::is_revoked(&claims.jti).await {
        info!(jti = %claims.jti, "Revoked refresh token presented");
        return Err(AppError::Unauthorized("Refresh token revoked".into()));
    }

    // 🔥 revoke old refresh token
    revoked::revoke(&claims.jti, claims.exp).await;

    let tokens = issue_pair(&claims.teacher, &config).map_err(anyhow::Error::from)?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// Logout. Always 204; a valid refresh token is revoked.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Signed out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(req: HttpRequest, config: web::Data<Config>) -> HttpResponse {
    // 1️⃣ extract + verify
    let claims = match bearer_token(&req).map(|t| verify_token(t, &config.jwt_secret)) {
        Some(Ok(c)) => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // 2️⃣ only refresh tokens can logout
    if claims.token_type == TokenType::Refresh {
        revoked::revoke(&claims.jti, claims.exp).await;
        debug!(jti = %claims.jti, "Refresh token revoked");
    }

    HttpResponse::NoContent().finish()
}
