//! Time-based marker interpolation.
//!
//! An [`Interpolation`] tweens a rendered position from where the marker
//! is to where the feed says it should be. It is a plain value stepped by
//! the frame loop; each one carries a [`CancelToken`] so the owner can
//! stop it without waiting for the next frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use trainwatch_geo::degree_distance;
use trainwatch_types::Coordinate;

use crate::config::MotionConfig;

/// Ease-in-out quadratic curve over `t` in `[0, 1]`.
///
/// `2t²` for the first half, `-1 + (4 - 2t)t` for the second.
pub fn ease_in_out_quad(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        (2.0f64.mul_add(-t, 4.0)).mul_add(t, -1.0)
    }
}

/// Animation length for a hop from `from` to `to`, clamped to the
/// configured range.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn duration_for(from: Coordinate, to: Coordinate, config: &MotionConfig) -> u64 {
    let raw = degree_distance(from, to) * config.ms_per_degree;
    let (min, max) = (config.min_duration_ms as f64, config.max_duration_ms as f64);
    let clamped = if raw.is_finite() { raw.max(min).min(max) } else { max };
    clamped.round() as u64
}

/// Shared cancellation flag for one interpolation.
///
/// Cancelling is idempotent and may happen after the animation already
/// finished.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the associated interpolation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One in-flight tween from `from` to `to`.
#[derive(Debug, Clone)]
pub struct Interpolation {
    from: Coordinate,
    to: Coordinate,
    started_at_ms: i64,
    duration_ms: u64,
    token: CancelToken,
    finished: bool,
}

impl Interpolation {
    /// Begin a tween at `now_ms`.
    pub fn start(from: Coordinate, to: Coordinate, now_ms: i64, duration_ms: u64) -> Self {
        Self {
            from,
            to,
            started_at_ms: now_ms,
            duration_ms,
            token: CancelToken::new(),
            finished: false,
        }
    }

    /// Cancel the tween. The last sampled position stays where it is.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the tween will still produce frames.
    pub fn is_active(&self) -> bool {
        !self.finished && !self.token.is_cancelled()
    }

    /// Position at `now_ms`, or `None` once cancelled or finished.
    ///
    /// The sample that reaches `t = 1` returns the exact target and marks
    /// the tween finished.
    pub fn sample(&mut self, now_ms: i64) -> Option<Coordinate> {
        if !self.is_active() {
            return None;
        }
        let elapsed = now_ms.saturating_sub(self.started_at_ms).max(0);
        #[allow(clippy::cast_precision_loss)]
        let t = if self.duration_ms == 0 {
            1.0
        } else {
            elapsed as f64 / self.duration_ms as f64
        };
        if t >= 1.0 {
            self.finished = true;
            return Some(self.to);
        }
        let k = ease_in_out_quad(t);
        Some(Coordinate::new(
            (self.to.lat - self.from.lat).mul_add(k, self.from.lat),
            (self.to.lng - self.from.lng).mul_add(k, self.from.lng),
        ))
    }
}
