//! Configuration management for edgehook
//!
//! A single JSON settings file holds the tunable thresholds, physics
//! coefficients, layout, per-output monitor scales and saved positions.

mod settings;

pub use settings::{MonitorSettings, Settings};
