//! User settings, stored as JSON under the XDG config directory

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::hook::HookSettings;
use crate::physics::PhysicsParams;
use crate::satellite::LayoutSettings;
use crate::types::{Logical, Point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSettings {
    #[serde(default = "default_widget_size")]
    pub width: f64,
    #[serde(default = "default_widget_size")]
    pub height: f64,
}

fn default_widget_size() -> f64 {
    96.0
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            width: default_widget_size(),
            height: default_widget_size(),
        }
    }
}

/// X11 has no per-monitor scale, so it is configured here per RandR output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_scale")]
    pub default_scale: f64,
    /// Output name (e.g. "DP-1") to device pixel ratio
    #[serde(default)]
    pub scales: HashMap<String, f64>,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            default_scale: default_scale(),
            scales: HashMap::new(),
        }
    }
}

impl MonitorSettings {
    pub fn scale_for(&self, output: &str) -> f64 {
        self.scales.get(output).copied().unwrap_or(self.default_scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub physics: PhysicsParams,
    #[serde(default)]
    pub hook: HookSettings,
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub widget: WidgetSettings,
    #[serde(default)]
    pub monitors: MonitorSettings,
    /// tracing filter level used when neither --log-level nor LOG_LEVEL is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Last main actor position per monitor-configuration hash
    #[serde(default)]
    pub positions: HashMap<String, SavedPosition>,
}

impl Settings {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    /// Load settings from `path`, writing defaults there when the file is
    /// missing. A file that exists but doesn't parse is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No settings file found, writing defaults");
            let settings = Self::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .context(format!("Failed to read settings file {}", path.display()))?;
        let mut settings = Self::from_json(&contents)
            .context(format!("Failed to parse settings file {}", path.display()))?;
        settings.validate_and_clamp();
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Invalid settings JSON")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize settings to JSON")?;
        fs::write(path, contents).context(format!("Failed to write settings file to {}", path.display()))?;
        Ok(())
    }

    pub fn saved_position(&self, layout_hash: &str) -> Option<Point<Logical>> {
        self.positions
            .get(layout_hash)
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .map(|p| Point::new(p.x, p.y))
    }

    pub fn remember_position(&mut self, layout_hash: &str, position: Point<Logical>) {
        self.positions.insert(
            layout_hash.to_string(),
            SavedPosition {
                x: position.x.round(),
                y: position.y.round(),
            },
        );
    }

    /// Clamp values into ranges the integrator and layout can live with
    pub fn validate_and_clamp(&mut self) {
        use crate::constants::validation::*;

        let physics = &mut self.physics;
        physics.spring_constant = clamp_setting("physics.spring_constant", physics.spring_constant, MIN_SPRING, MAX_SPRING);
        physics.damping_factor = clamp_setting("physics.damping_factor", physics.damping_factor, MIN_DAMPING, MAX_DAMPING);
        physics.bounce_damping = clamp_setting("physics.bounce_damping", physics.bounce_damping, MIN_BOUNCE, MAX_BOUNCE);

        let hook = &mut self.hook;
        hook.proximity_top = clamp_setting("hook.proximity_top", hook.proximity_top, 0.0, MAX_DISTANCE);
        hook.proximity_bottom = clamp_setting("hook.proximity_bottom", hook.proximity_bottom, 0.0, MAX_DISTANCE);
        hook.offset_top = clamp_setting("hook.offset_top", hook.offset_top, -MAX_DISTANCE, MAX_DISTANCE);
        hook.offset_bottom = clamp_setting("hook.offset_bottom", hook.offset_bottom, -MAX_DISTANCE, MAX_DISTANCE);
        hook.unhook_distance = clamp_setting("hook.unhook_distance", hook.unhook_distance, 0.0, MAX_DISTANCE);
        hook.min_window_size = clamp_setting("hook.min_window_size", hook.min_window_size, 0.0, MAX_DISTANCE);

        // An unhook distance below the attach proximity would let the actor
        // flap between hooked and unhooked at the boundary
        let proximity = hook.proximity_top.max(hook.proximity_bottom);
        if hook.unhook_distance < proximity {
            warn!(
                unhook_distance = hook.unhook_distance,
                proximity,
                "unhook_distance below hook proximity, raising it"
            );
            hook.unhook_distance = proximity;
        }
        for name in &mut hook.denylist {
            *name = name.trim().to_lowercase();
        }

        let layout = &mut self.layout;
        layout.spacing = clamp_setting("layout.spacing", layout.spacing, 0.0, MAX_DISTANCE);
        layout.min_satellite_width =
            clamp_setting("layout.min_satellite_width", layout.min_satellite_width, MIN_WIDGET_SIZE, MAX_DISTANCE);

        let widget = &mut self.widget;
        widget.width = clamp_setting("widget.width", widget.width, MIN_WIDGET_SIZE, MAX_WIDGET_SIZE);
        widget.height = clamp_setting("widget.height", widget.height, MIN_WIDGET_SIZE, MAX_WIDGET_SIZE);

        let monitors = &mut self.monitors;
        monitors.default_scale = clamp_setting("monitors.default_scale", monitors.default_scale, MIN_SCALE, MAX_SCALE);
        for (output, scale) in &mut monitors.scales {
            let clamped = scale.clamp(MIN_SCALE, MAX_SCALE);
            if !scale.is_finite() || clamped != *scale {
                warn!(output = %output, scale = *scale, "Monitor scale out of range, clamping");
                *scale = if scale.is_finite() { clamped } else { 1.0 };
            }
        }
    }
}

/// Clamp one value, logging when it had to change. Non-finite values fall
/// to the lower bound.
fn clamp_setting(name: &str, value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        warn!(setting = name, using = min, "Setting is not a finite number, replacing");
        return min;
    }
    if value < min {
        warn!(setting = name, value, min, "Setting below minimum, clamping");
        min
    } else if value > max {
        warn!(setting = name, value, max, "Setting exceeds maximum, clamping");
        max
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellite::AnchorMode;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.physics.spring_constant, 0.1);
        assert_eq!(settings.physics.damping_factor, 0.55);
        assert_eq!(settings.physics.bounce_damping, 0.3);
        assert_eq!(settings.hook.proximity_top, 20.0);
        assert_eq!(settings.hook.unhook_distance, 50.0);
        assert_eq!(settings.layout.anchor, AnchorMode::Auto);
        assert_eq!(settings.layout.spacing, 5.0);
        assert_eq!(settings.layout.min_satellite_width, 200.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = Settings::from_json(r#"{ "hook": { "proximity_top": 35 }, "layout": { "anchor": "left" } }"#).unwrap();
        assert_eq!(settings.hook.proximity_top, 35.0);
        assert_eq!(settings.hook.proximity_bottom, 20.0);
        assert!(!settings.hook.denylist.is_empty());
        assert_eq!(settings.layout.anchor, AnchorMode::Left);
        assert_eq!(settings.widget, WidgetSettings::default());
    }

    #[test]
    fn test_unhook_distance_raised_to_proximity() {
        let mut settings = Settings::default();
        settings.hook.proximity_bottom = 80.0;
        settings.hook.unhook_distance = 30.0;
        settings.validate_and_clamp();
        assert_eq!(settings.hook.unhook_distance, 80.0);
    }

    #[test]
    fn test_physics_clamped_into_stable_range() {
        let mut settings = Settings::default();
        settings.physics.spring_constant = 7.0;
        settings.physics.damping_factor = f64::NAN;
        settings.physics.bounce_damping = -1.0;
        settings.validate_and_clamp();
        assert_eq!(settings.physics.spring_constant, 1.0);
        assert_eq!(settings.physics.damping_factor, 0.01);
        assert_eq!(settings.physics.bounce_damping, 0.0);
    }

    #[test]
    fn test_scales_and_denylist_normalized() {
        let mut settings = Settings::default();
        settings.monitors.scales.insert("DP-1".to_string(), 9.0);
        settings.hook.denylist = vec![" Polybar ".to_string()];
        settings.validate_and_clamp();
        assert_eq!(settings.monitors.scale_for("DP-1"), 4.0);
        assert_eq!(settings.monitors.scale_for("HDMI-1"), 1.0);
        assert_eq!(settings.hook.denylist, vec!["polybar".to_string()]);
    }

    #[test]
    fn test_positions_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("edgehook-test-{}", std::process::id()));
        let path = dir.join("settings.json");

        let mut settings = Settings::load_from(&path).unwrap();
        assert!(path.exists());
        settings.remember_position("abc", Point::new(120.4, 80.6));
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.saved_position("abc"), Some(Point::new(120.0, 81.0)));
        assert_eq!(loaded.saved_position("other"), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("edgehook-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
