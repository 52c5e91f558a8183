//! Flags review attempts that land implausibly close together for the same
//! topic, so a cram session cannot inflate the ease factor like genuine
//! spaced retrieval would.

use chrono::{Duration, NaiveDateTime};

use crate::interval::MIN_EASE_FACTOR;
use crate::store::SrsStore;

/// Trailing window in which a repeat review of the same topic counts as
/// cramming.
pub const DEFAULT_CRAM_WINDOW_HOURS: i64 = 24;

/// Ease-factor reduction applied to a crammed review's input state.
pub const CRAM_EASE_PENALTY: f64 = 0.1;

/// True when the topic has already been reviewed inside the trailing window,
/// making the in-flight review the second-or-later one within it.
///
/// Fails open: the penalty is an optimization, not a correctness gate, so a
/// store error reads as "not cramming" and the review proceeds.
pub async fn detect_cramming<S: SrsStore + ?Sized>(
    store: &S,
    owner_user_id: i32,
    topic_id: i32,
    now: NaiveDateTime,
    hours_window: i64,
) -> bool {
    let since = now - Duration::hours(hours_window);

    match store.count_reviews_since(owner_user_id, topic_id, since).await {
        Ok(count) => count > 0,
        Err(e) => {
            log::warn!(
                "Cramming check failed for topic {}, treating as not cramming: {}",
                topic_id,
                e
            );
            false
        }
    }
}

/// Applies the cramming penalty to an ease factor, still floored at the
/// global minimum.
pub fn penalized_ease(ease_factor: f64) -> f64 {
    (ease_factor - CRAM_EASE_PENALTY).max(MIN_EASE_FACTOR)
}
