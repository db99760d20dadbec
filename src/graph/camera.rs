//! Camera2D - pan/zoom transform with eased focus transitions
//!
//! The transform maps world to screen as `screen = world * scale + translation`.
//! Scale is clamped to the configured range on every change.
//!
//! # Rules
//! - Camera state is UI-only (never persisted)
//! - Call `update(dt)` at the start of a frame, then use the transforms
//! - A user pan or zoom cancels an in-flight focus transition; the camera
//!   stays where the gesture put it

use egui::{Pos2, Rect, Vec2};
use tracing::trace;

use super::animation::{Tween, TweenState};
use crate::config::CameraConfig;

/// In-flight focus animation
#[derive(Debug, Clone)]
struct FocusTransition {
    from_translation: Vec2,
    from_scale: f32,
    to_translation: Vec2,
    to_scale: f32,
    tween: Tween,
}

/// 2D camera with pan and zoom
#[derive(Debug, Clone)]
pub struct Camera2D {
    translation: Vec2,
    scale: f32,
    transition: Option<FocusTransition>,
    pub config: CameraConfig,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self::with_config(CameraConfig::default())
    }
}

impl Camera2D {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CameraConfig) -> Self {
        Self {
            translation: Vec2::ZERO,
            scale: 1.0,
            transition: None,
            config,
        }
    }

    // =========================================================================
    // CURRENT VALUES
    // =========================================================================

    /// Current zoom level (1.0 = 100%)
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn translation(&self) -> Vec2 {
        self.translation
    }

    /// Scale the running focus transition is heading to, or the current one
    pub fn target_scale(&self) -> f32 {
        self.transition
            .as_ref()
            .map_or(self.scale, |t| t.to_scale)
    }

    pub fn target_translation(&self) -> Vec2 {
        self.transition
            .as_ref()
            .map_or(self.translation, |t| t.to_translation)
    }

    fn clamp_scale(&self, scale: f32) -> f32 {
        scale.clamp(self.config.min_scale, self.config.max_scale)
    }

    // =========================================================================
    // ANIMATION UPDATE
    // =========================================================================

    /// Advance the focus transition (call every frame)
    pub fn update(&mut self, dt: f32) {
        let Some(transition) = self.transition.as_mut() else {
            return;
        };

        match transition.tween.update(dt) {
            TweenState::Running { eased } => {
                self.translation = transition.from_translation
                    + (transition.to_translation - transition.from_translation) * eased;
                self.scale =
                    transition.from_scale + (transition.to_scale - transition.from_scale) * eased;
            }
            TweenState::Complete => {
                self.translation = transition.to_translation;
                self.scale = transition.to_scale;
                self.transition = None;
                trace!("Camera focus complete");
            }
        }
    }

    /// Check if camera is still animating
    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    /// Jump to the end of a running transition
    pub fn snap_to_target(&mut self) {
        if let Some(transition) = self.transition.take() {
            self.translation = transition.to_translation;
            self.scale = transition.to_scale;
        }
    }

    // =========================================================================
    // CAMERA CONTROLS
    // =========================================================================

    /// Pan by delta in screen coordinates
    pub fn pan(&mut self, screen_delta: Vec2) {
        self.transition = None;
        self.translation += screen_delta;
    }

    /// Zoom by factor, keeping `screen_pos` fixed in view
    pub fn zoom_at(&mut self, factor: f32, screen_pos: Pos2) {
        self.transition = None;
        let new_scale = self.clamp_scale(self.scale * factor);
        if (new_scale - self.scale).abs() <= f32::EPSILON {
            return;
        }

        let anchor = self.screen_to_world(screen_pos);
        self.scale = new_scale;
        self.translation = screen_pos.to_vec2() - anchor.to_vec2() * new_scale;
    }

    /// Zoom one wheel step; negative `delta_y` (scroll up) zooms in
    pub fn wheel(&mut self, delta_y: f32, screen_pos: Pos2) {
        if delta_y == 0.0 {
            return;
        }
        let step = self.config.wheel_zoom_step;
        let factor = if delta_y < 0.0 { step } else { 1.0 / step };
        self.zoom_at(factor, screen_pos);
    }

    /// Set zoom level directly, anchored at the screen origin
    pub fn set_scale(&mut self, scale: f32) {
        self.transition = None;
        self.scale = self.clamp_scale(scale);
    }

    /// Reset to the identity transform
    pub fn reset(&mut self) {
        self.transition = None;
        self.translation = Vec2::ZERO;
        self.scale = 1.0;
    }

    // =========================================================================
    // FOCUS
    // =========================================================================

    /// Animate so `world_pos` lands at the viewport center at focus scale
    pub fn focus_on(&mut self, world_pos: Pos2, viewport: Vec2) {
        let to_scale = self.clamp_scale(self.config.focus_scale);
        let to_translation = viewport / 2.0 - world_pos.to_vec2() * to_scale;

        trace!(x = world_pos.x, y = world_pos.y, "Camera focus start");
        self.transition = Some(FocusTransition {
            from_translation: self.translation,
            from_scale: self.scale,
            to_translation,
            to_scale,
            tween: Tween::new(self.config.focus_duration().as_secs_f32()),
        });
    }

    // =========================================================================
    // COORDINATE TRANSFORMS
    // =========================================================================

    /// Transform world position to screen position
    pub fn world_to_screen(&self, world_pos: Pos2) -> Pos2 {
        (world_pos.to_vec2() * self.scale + self.translation).to_pos2()
    }

    /// Transform screen position to world position
    pub fn screen_to_world(&self, screen_pos: Pos2) -> Pos2 {
        ((screen_pos.to_vec2() - self.translation) / self.scale).to_pos2()
    }

    /// World-space rectangle visible in a viewport of the given size
    pub fn visible_bounds(&self, viewport: Vec2) -> Rect {
        Rect::from_min_max(
            self.screen_to_world(Pos2::ZERO),
            self.screen_to_world(viewport.to_pos2()),
        )
    }
}
