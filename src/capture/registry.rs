use std::sync::Arc;
use std::time::Duration;

use futures::lock::Mutex;
use moka::future::Cache;
use uuid::Uuid;

use crate::capture::controller::CaptureSession;
use crate::device::camera::FrameCamera;
use crate::error::{AppError, AppResult};

pub type SharedSession = Arc<Mutex<CaptureSession<FrameCamera>>>;

#[derive(Clone)]
struct Entry {
    owner: String,
    session: SharedSession,
}

/// Open capture sessions keyed by id. Idle sessions expire; dropping the last
/// reference releases any camera stream they still hold.
pub struct CaptureRegistry {
    sessions: Cache<Uuid, Entry>,
}

impl CaptureRegistry {
    pub fn new(idle_secs: u64) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(Duration::from_secs(idle_secs))
                .eviction_listener(|id, _entry, cause| {
                    tracing::debug!(session = %id, ?cause, "capture session dropped");
                })
                .build(),
        }
    }

    /// Drops expired sessions now. Expiry otherwise waits for cache traffic.
    pub async fn sweep(&self) {
        self.sessions.run_pending_tasks().await;
    }

    pub async fn insert(&self, owner: &str, session: CaptureSession<FrameCamera>) -> SharedSession {
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions
            .insert(
                id,
                Entry {
                    owner: owner.to_string(),
                    session: Arc::clone(&shared),
                },
            )
            .await;
        shared
    }

    /// Sessions of other teachers are reported as missing.
    pub async fn get(&self, id: Uuid, owner: &str) -> AppResult<SharedSession> {
        match self.sessions.get(&id).await {
            Some(entry) if entry.owner == owner => Ok(entry.session),
            _ => Err(AppError::NotFound(format!("capture session {id}"))),
        }
    }

    pub async fn remove(&self, id: Uuid) {
        self.sessions.invalidate(&id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::camera::PhotoSettings;
    use crate::device::geo::{Coordinate, Geofence};
    use crate::model::attendance::EventKind;

    #[actix_web::test]
    async fn sessions_are_scoped_to_owner() {
        let camera = Arc::new(FrameCamera::new(PhotoSettings::default()));
        let registry = CaptureRegistry::new(600);
        let session = CaptureSession::new(
            EventKind::ClockIn,
            Arc::clone(&camera),
            Geofence::new(Coordinate::new(0.0, 0.0), 50.0),
        );
        let id = session.id();
        registry.insert("1985", session).await;

        assert!(registry.get(id, "1985").await.is_ok());
        assert!(matches!(
            registry.get(id, "2001").await,
            Err(AppError::NotFound(_))
        ));

        registry.remove(id).await;
        assert!(registry.get(id, "1985").await.is_err());
    }

    #[actix_web::test]
    async fn removing_an_open_session_releases_its_stream() {
        let camera = Arc::new(FrameCamera::new(PhotoSettings::default()));
        let registry = CaptureRegistry::new(600);
        let mut session = CaptureSession::new(
            EventKind::TeachingSession,
            Arc::clone(&camera),
            Geofence::new(Coordinate::new(0.0, 0.0), 50.0),
        );
        session.open().await.unwrap();
        let id = session.id();
        drop(registry.insert("1985", session).await);
        assert_eq!(camera.active_streams(), 1);

        registry.remove(id).await;
        registry.sweep().await;
        assert_eq!(camera.active_streams(), 0);
    }

    #[actix_web::test]
    async fn sweep_releases_idle_sessions_without_traffic() {
        let camera = Arc::new(FrameCamera::new(PhotoSettings::default()));
        let registry = CaptureRegistry::new(1);
        let mut session = CaptureSession::new(
            EventKind::ClockIn,
            Arc::clone(&camera),
            Geofence::new(Coordinate::new(0.0, 0.0), 50.0),
        );
        session.open().await.unwrap();
        drop(registry.insert("1985", session).await);
        assert_eq!(camera.active_streams(), 1);

        actix_web::rt::time::sleep(Duration::from_millis(1500)).await;
        registry.sweep().await;
        assert_eq!(camera.active_streams(), 0);
    }
}
