use std::time::Instant;

use tracing::debug;

use crate::cache::TtlCache;

pub fn sweep_completion_cache(cache: &TtlCache<String, String>) -> usize {
    let start = Instant::now();
    let removed = cache.sweep();
    debug!(
        removed,
        remaining = cache.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Completion cache sweep completed"
    );
    removed
}
