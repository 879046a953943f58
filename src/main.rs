use actix_web::middleware::NormalizePath;
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer, Responder, get};
use std::sync::Arc;
use std::time::Duration;

mod api;
mod auth;
mod capture;
mod config;
mod device;
mod docs;
mod error;
mod model;
mod roster;
mod routes;
mod sink;

use auth::password::hash_password;
use capture::clock::{Clock, LocalClock};
use capture::registry::CaptureRegistry;
use capture::status::StatusBoard;
use config::Config;
use device::camera::FrameCamera;
use roster::Roster;
use sink::{HttpSink, RemoteSink};

use crate::docs::ApiDoc;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Presensi Guru"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // roster maintenance: `presensi hash-password <plain>`
    let args: Vec<String> = std::env::args().collect();
    if let [_, cmd, plain] = args.as_slice() {
        if cmd == "hash-password" {
            println!("{}", hash_password(plain).map_err(|e| anyhow::anyhow!("{e}"))?);
            return Ok(());
        }
    }

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(school = %config.school_name, radius_m = config.geofence.radius_m, policy = %config.submit_policy, "Server starting...");

    let camera = Data::new(FrameCamera::new(config.photo));
    let registry = Data::new(CaptureRegistry::new(config.capture_idle_secs));
    let sweeper = registry.clone();
    actix_web::rt::spawn(async move {
        let mut tick = actix_web::rt::time::interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            sweeper.sweep().await;
        }
    });
    let board = Data::new(StatusBoard::new());
    let roster = Data::new(Roster::remote(
        &config.roster_url,
        config.roster_ttl_secs,
        &config.school_name,
    )?);
    let sink: Arc<dyn RemoteSink> = Arc::new(HttpSink::new(
        &config.submit_url,
        config.submit_policy,
        config.submit_timeout_secs,
    )?);
    let sink = Data::from(sink);
    let clock: Arc<dyn Clock> = Arc::new(LocalClock::new(config.utc_offset));
    let clock = Data::from(clock);

    // leave attachments arrive base64-encoded inside JSON
    let json_limit = config.attachment_max_bytes / 3 * 4 + 64 * 1024;

    // Clone values for the closure (avoid move issues)
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(web::JsonConfig::default().limit(json_limit))
            .app_data(Data::new(config.clone()))
            .app_data(camera.clone())
            .app_data(registry.clone())
            .app_data(board.clone())
            .app_data(roster.clone())
            .app_data(sink.clone())
            .app_data(clock.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
