//! Canvas settings
//!
//! Loaded from `config/canvas_settings.yaml` (or `IDEA_SPARK_CONFIG`).
//! Every field has a default, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding an explicit settings path
pub const CONFIG_ENV_VAR: &str = "IDEA_SPARK_CONFIG";

/// Default settings location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/canvas_settings.yaml";

/// All canvas settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSettings {
    pub physics: PhysicsConfig,
    pub camera: CameraConfig,
    pub expansion: ExpansionConfig,
    pub viewport: ViewportConfig,
    pub storage: StorageConfig,
    pub documents: DocumentConfig,
}

/// Force simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Resting length of a link whose target has children
    pub trunk_link_distance: f32,
    /// Resting length of a link whose target is a leaf
    pub leaf_link_distance: f32,
    pub link_strength: f32,
    /// Many-body strength (negative = repulsion)
    pub charge_strength: f32,
    /// Beyond this distance nodes do not repel
    pub charge_distance_max: f32,
    pub center_strength: f32,
    /// Collision radius of level 0 nodes
    pub root_collision_radius: f32,
    /// Collision radius of every deeper node
    pub child_collision_radius: f32,
    pub collision_strength: f32,
    pub collision_iterations: usize,
    /// Rendered radius of level 0 nodes (hit testing)
    pub root_display_radius: f32,
    /// Rendered radius of deeper nodes (hit testing)
    pub child_display_radius: f32,
    /// Fraction of velocity lost per tick
    pub velocity_decay: f32,
    pub drift_amplitude: f32,
    /// Seconds per radian of the drift wave
    pub drift_period_secs: f32,
    /// Per-node phase offset of the drift wave
    pub drift_phase_step: f32,
    /// Alpha target the simulation never decays below
    pub alpha_floor: f32,
    /// Alpha target while a node is being dragged
    pub drag_alpha_target: f32,
    pub alpha_min: f32,
    /// Ticks per second of the fixed-timestep driver
    pub tick_rate: f32,
    /// Upper bound of ticks run by one `advance` call
    pub max_ticks_per_advance: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            trunk_link_distance: 180.0,
            leaf_link_distance: 100.0,
            link_strength: 0.5,
            charge_strength: -900.0,
            charge_distance_max: 1200.0,
            center_strength: 0.05,
            root_collision_radius: 90.0,
            child_collision_radius: 75.0,
            collision_strength: 0.9,
            collision_iterations: 4,
            root_display_radius: 65.0,
            child_display_radius: 55.0,
            velocity_decay: 0.6,
            drift_amplitude: 0.2,
            drift_period_secs: 3.0,
            drift_phase_step: 0.5,
            alpha_floor: 0.05,
            drag_alpha_target: 0.3,
            alpha_min: 0.001,
            tick_rate: 60.0,
            max_ticks_per_advance: 4,
        }
    }
}

impl PhysicsConfig {
    /// Per-tick alpha decay so a cold start reaches `alpha_min` in 300 ticks
    pub fn alpha_decay(&self) -> f32 {
        1.0 - self.alpha_min.powf(1.0 / 300.0)
    }
}

/// Camera parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub min_scale: f32,
    pub max_scale: f32,
    /// Scale applied when focusing a node
    pub focus_scale: f32,
    pub focus_duration_ms: u64,
    /// Multiplicative zoom per wheel notch
    pub wheel_zoom_step: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 4.0,
            focus_scale: 1.2,
            focus_duration_ms: 750,
            wheel_zoom_step: 1.1,
        }
    }
}

impl CameraConfig {
    pub fn focus_duration(&self) -> Duration {
        Duration::from_millis(self.focus_duration_ms)
    }
}

/// Node placement and collaborator timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub timeout_ms: u64,
    /// Full width of the random offset around the parent for expanded children
    pub child_jitter: f32,
    /// Full width of the random offset for nodes added by hand
    pub manual_jitter: f32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            child_jitter: 20.0,
            manual_jitter: 50.0,
        }
    }
}

impl ExpansionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Viewport size in screen pixels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Local snapshot persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub snapshot_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from(".idea-spark"),
        }
    }
}

/// Document generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub timeout_ms: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
        }
    }
}

impl DocumentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CanvasSettings {
    /// Load settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading canvas settings from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let settings: CanvasSettings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(settings)
    }

    /// Resolve settings from the environment
    ///
    /// Resolution order:
    /// 1. `IDEA_SPARK_CONFIG` environment variable
    /// 2. `config/canvas_settings.yaml` relative to the working directory
    /// 3. Built-in defaults
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        if !path.exists() {
            info!(
                "No canvas settings at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring canvas settings: {:#}", e);
                Self::default()
            }
        }
    }
}

static GLOBAL_CONFIG: OnceLock<CanvasSettings> = OnceLock::new();

/// Process-wide settings, resolved once via [`CanvasSettings::from_env`]
pub fn global_config() -> &'static CanvasSettings {
    GLOBAL_CONFIG.get_or_init(CanvasSettings::from_env)
}
