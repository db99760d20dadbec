//! Animation primitives - fixed-duration eased transitions
//!
//! All animation state is advanced explicitly with `update(dt)` once per
//! frame; nothing here reads a clock.
//!
//! # Usage
//! ```ignore
//! let mut tween = Tween::new(0.75);
//! // Each frame:
//! match tween.update(dt) {
//!     TweenState::Running { eased } => apply(start.lerp(end, eased)),
//!     TweenState::Complete => apply(end),
//! }
//! ```

/// Cubic ease-out: fast start, gentle landing
pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// State returned by [`Tween::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TweenState {
    /// Still running; `eased` is the eased progress in `[0, 1)`
    Running { eased: f32 },
    /// Duration elapsed
    Complete,
}

/// Timer driving a single eased transition
#[derive(Debug, Clone)]
pub struct Tween {
    /// Time spent so far (seconds)
    elapsed: f32,
    /// Total length (seconds)
    duration: f32,
    complete: bool,
}

impl Tween {
    /// Create a transition lasting `duration` seconds
    ///
    /// A non-positive duration completes on the first update.
    pub fn new(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration: duration.max(0.0),
            complete: false,
        }
    }

    /// Advance by `dt` seconds
    pub fn update(&mut self, dt: f32) -> TweenState {
        if self.complete {
            return TweenState::Complete;
        }

        self.elapsed += dt.max(0.0);
        if self.elapsed >= self.duration {
            self.complete = true;
            return TweenState::Complete;
        }

        TweenState::Running {
            eased: ease_out_cubic(self.progress()),
        }
    }

    /// Linear progress in `[0, 1]`
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_out_cubic_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        // Ease-out is ahead of linear in the middle
        assert!(ease_out_cubic(0.5) > 0.5);
    }

    #[test]
    fn test_tween_runs_for_duration() {
        let mut tween = Tween::new(0.75);
        let mut frames = 0;
        while let TweenState::Running { eased } = tween.update(0.25) {
            assert!(eased > 0.0 && eased < 1.0);
            frames += 1;
        }
        assert_eq!(frames, 2);
        assert!(tween.is_complete());
        assert_eq!(tween.update(0.25), TweenState::Complete);
    }

    #[test]
    fn test_zero_duration_completes_immediately() {
        let mut tween = Tween::new(0.0);
        assert_eq!(tween.update(0.0), TweenState::Complete);
        assert_eq!(tween.progress(), 1.0);
    }
}
