use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::services::tutor::TutorService;

/// Ends tutor sessions left idle past `max_idle`; each one flushes its
/// summary through the experience recorder.
pub fn end_idle_sessions(tutor: &TutorService, max_idle: chrono::Duration) -> Result<usize, super::WorkerError> {
    let start = Instant::now();
    debug!("Starting idle session cleanup cycle");

    let ended = tutor.end_idle_sessions(Utc::now(), max_idle);

    if ended > 0 {
        info!(
            ended_sessions = ended,
            remaining = tutor.active_sessions(),
            duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
            "Idle session cleanup completed"
        );
    }
    Ok(ended)
}
