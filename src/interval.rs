//! SM-2 family interval and ease-factor update rule.
//!
//! All math in f64, single round at the end. No I/O.

/// Ease factor can never drop below this, no matter how many low-quality
/// ratings accumulate.
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Starting ease for a topic with no review history.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

/// Ratings below this count as a lapse.
pub const LAPSE_THRESHOLD: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalOutcome {
    pub next_interval_days: i32,
    pub ease_factor: f64,
}

/// Computes the next review interval and updated ease factor from a single
/// graded review.
///
/// Callers validate `quality_rating` before reaching this function; it still
/// clamps to 0..=5 and floors the incoming interval at one day so the output
/// contract (`next_interval_days >= 1`, `ease_factor >= 1.3`) holds for any
/// input.
pub fn compute_next_interval(
    quality_rating: i32,
    current_interval_days: i32,
    ease_factor: f64,
    repetition_number: i32,
) -> IntervalOutcome {
    let quality = quality_rating.clamp(0, 5);
    let interval = current_interval_days.max(1);

    let miss = (5 - quality) as f64;
    let ease = (ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE_FACTOR);

    let next_interval_days = if quality < LAPSE_THRESHOLD {
        // A failed recall forces an immediate short interval regardless of
        // how long the topic had been scheduled out.
        1
    } else {
        match repetition_number {
            r if r <= 1 => 1,
            2 => 6,
            _ => (interval as f64 * ease).round().max(1.0) as i32,
        }
    };

    IntervalOutcome {
        next_interval_days,
        ease_factor: ease,
    }
}
