use crate::{
    api::{attendance, leave_request, profile},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("period and burst size are both non-zero");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .configure(api_services),
    );
}

/// Everything behind the bearer token, relative to the API prefix.
pub fn api_services(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            // /attendance/status
            .service(web::resource("/status").route(web::get().to(attendance::today_status))),
    )
    .service(
        web::scope("/capture")
            // /capture
            .service(web::resource("").route(web::post().to(attendance::open_capture)))
            // /capture/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(attendance::get_capture))
                    .route(web::delete().to(attendance::cancel_capture)),
            )
            // /capture/{id}/location
            .service(
                web::resource("/{id}/location").route(web::put().to(attendance::report_location)),
            )
            // /capture/{id}/frame
            .service(web::resource("/{id}/frame").route(web::put().to(attendance::feed_frame)))
            // /capture/{id}/photo
            .service(
                web::resource("/{id}/photo")
                    .route(web::post().to(attendance::capture_photo))
                    .route(web::delete().to(attendance::retake_photo)),
            )
            // /capture/{id}/submit
            .service(
                web::resource("/{id}/submit").route(web::post().to(attendance::submit_capture)),
            ),
    )
    .service(web::resource("/leave").route(web::post().to(leave_request::create_leave)))
    .service(web::resource("/profile").route(web::get().to(profile::sync_profile)));
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token + rotated refresh_token
