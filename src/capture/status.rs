use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use futures::lock::{Mutex, OwnedMutexGuard};
use moka::future::Cache;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceStatus, EventKind};

/// Per-teacher, per-local-day attendance status, updated optimistically on submit.
pub struct StatusBoard {
    entries: Cache<(String, NaiveDate), AttendanceStatus>,
    day_locks: Cache<(String, NaiveDate), Arc<Mutex<()>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(50_000)
                .time_to_live(Duration::from_secs(48 * 3600))
                .build(),
            day_locks: Cache::builder()
                .time_to_idle(Duration::from_secs(48 * 3600))
                .build(),
        }
    }

    /// Serializes clock submissions of one teacher on one day. Hold the guard
    /// from the status check until the outcome is recorded.
    pub async fn lock_day(&self, employee_id: &str, day: NaiveDate) -> OwnedMutexGuard<()> {
        let lock = self
            .day_locks
            .get_with((employee_id.to_string(), day), async { Arc::new(Mutex::new(())) })
            .await;
        lock.lock_owned().await
    }

    pub async fn status(&self, employee_id: &str, day: NaiveDate) -> AttendanceStatus {
        self.entries
            .get(&(employee_id.to_string(), day))
            .await
            .unwrap_or_default()
    }

    /// Teaching sessions leave the day status alone.
    pub async fn record(&self, employee_id: &str, day: NaiveDate, kind: EventKind) {
        let status = match kind {
            EventKind::ClockIn => AttendanceStatus::Present,
            EventKind::ClockOut => AttendanceStatus::Out,
            EventKind::TeachingSession => return,
        };
        self.entries
            .insert((employee_id.to_string(), day), status)
            .await;
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Which clock buttons are live right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Availability {
    pub status: AttendanceStatus,
    pub can_clock_in: bool,
    pub can_clock_out: bool,
    #[schema(example = "14:20")]
    pub clock_out_after: String,
}

impl Availability {
    pub fn compute(status: AttendanceStatus, local_time: NaiveTime, cutoff: NaiveTime) -> Self {
        Self {
            status,
            can_clock_in: status == AttendanceStatus::Idle,
            can_clock_out: status == AttendanceStatus::Present && local_time >= cutoff,
            clock_out_after: cutoff.format("%H:%M").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 24).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[actix_web::test]
    async fn clock_in_then_out() {
        let board = StatusBoard::new();
        assert_eq!(board.status("1985", day()).await, AttendanceStatus::Idle);

        board.record("1985", day(), EventKind::ClockIn).await;
        assert_eq!(board.status("1985", day()).await, AttendanceStatus::Present);

        board.record("1985", day(), EventKind::TeachingSession).await;
        assert_eq!(board.status("1985", day()).await, AttendanceStatus::Present);

        board.record("1985", day(), EventKind::ClockOut).await;
        assert_eq!(board.status("1985", day()).await, AttendanceStatus::Out);

        // other teachers and other days are independent
        assert_eq!(board.status("2001", day()).await, AttendanceStatus::Idle);
        assert_eq!(
            board.status("1985", day().succ_opt().unwrap()).await,
            AttendanceStatus::Idle
        );
    }

    #[actix_web::test]
    async fn day_lock_is_per_teacher_and_day() {
        let board = StatusBoard::new();
        let held = board.lock_day("1985", day()).await;

        // a different teacher or day is not blocked
        drop(board.lock_day("2001", day()).await);
        drop(board.lock_day("1985", day().succ_opt().unwrap()).await);

        let mut waiting = Box::pin(board.lock_day("1985", day()));
        assert!(futures::poll!(waiting.as_mut()).is_pending());
        drop(held);
        drop(waiting.await);
    }

    #[test]
    fn clock_out_needs_clock_in_and_cutoff() {
        let cutoff = hm(14, 20);
        let idle = Availability::compute(AttendanceStatus::Idle, hm(15, 0), cutoff);
        assert!(idle.can_clock_in);
        assert!(!idle.can_clock_out);

        let early = Availability::compute(AttendanceStatus::Present, hm(14, 19), cutoff);
        assert!(!early.can_clock_in);
        assert!(!early.can_clock_out);

        let on_time = Availability::compute(AttendanceStatus::Present, hm(14, 20), cutoff);
        assert!(on_time.can_clock_out);

        let done = Availability::compute(AttendanceStatus::Out, hm(16, 0), cutoff);
        assert!(!done.can_clock_in && !done.can_clock_out);
    }
}
