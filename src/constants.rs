//! Application-wide constants
//!
//! This module contains the magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.
//! User-tunable values live in [`crate::config`]; these are the fixed ones.

/// Timer periods for the cooperative main loop
pub mod timing {
    /// Physics integration step (~60 Hz)
    pub const PHYSICS_TICK_MS: u64 = 16;

    /// Hook maintenance polling period
    pub const MAINTENANCE_TICK_MS: u64 = 50;

    /// Delay before the status panel re-evaluates its hint text
    pub const STATUS_RESET_DELAY_MS: u64 = 50;

    /// How long the "unhooked" notice stays up
    pub const UNHOOK_NOTICE_MS: u64 = 3000;

    /// Upper bound on a single idle sleep in the main loop
    pub const MAX_IDLE_SLEEP_MS: u64 = 4;
}

/// Spring-damper integrator constants
pub mod physics {
    /// Position error and velocity (manhattan) below which an actor is settled
    pub const SETTLE_EPSILON: f64 = 0.1;

    /// Upward velocity kick applied when the hook releases
    pub const UNHOOK_POP_VELOCITY: f64 = -2.0;

    /// Upward velocity kick applied when the widget is grabbed
    pub const GRAB_POP_VELOCITY: f64 = -2.0;
}

/// Region-of-interest selection constants
pub mod selection {
    /// Selections narrower or shorter than this (logical px) count as cancelled
    pub const MIN_SELECTION_SIZE: f64 = 5.0;

    /// Thickness of the highlight / rubber band frame strips (physical px)
    pub const FRAME_THICKNESS: u32 = 2;

    /// Glyph index of the crosshair in the X cursor font
    pub const CROSSHAIR_GLYPH: u16 = 34;
}

/// Satellite panel text metrics for the core `fixed` font
pub mod panel {
    /// Average glyph advance in logical px
    pub const CHAR_WIDTH: f64 = 6.0;

    /// Line height in logical px
    pub const LINE_HEIGHT: f64 = 13.0;

    /// Inner padding on every side in logical px
    pub const PADDING: f64 = 8.0;

    /// Panels never grow taller than this (logical px)
    pub const MAX_HEIGHT: f64 = 600.0;
}

/// Status panel texts
pub mod messages {
    pub const HOOKED_HINT: &str = "Trigger a capture to select an area";
    pub const UNHOOKED: &str = "Unhooked";
    pub const SELECTING: &str = "Drag to select an area (trigger again to cancel)";
    pub const READING: &str = "Reading...";
    pub const READING_AGAIN: &str = "Reading again...";
}

/// Monitor discovery fallbacks
pub mod monitor {
    pub const FALLBACK_WIDTH: f64 = 1920.0;
    pub const FALLBACK_HEIGHT: f64 = 1080.0;
}

/// X11 protocol and rendering constants
pub mod x11 {
    /// Override redirect flag for unmanaged windows
    pub const OVERRIDE_REDIRECT: u32 = 1;

    /// Size of PID property value in bytes
    pub const PID_PROPERTY_SIZE: usize = 4;

    /// Longest window title read, in 32-bit units
    pub const TITLE_PROPERTY_LENGTH: u32 = 1024;

    /// X keysym for Escape
    pub const XK_ESCAPE: u32 = 0xff1b;

    /// WM_CLASS for every window this process creates
    pub const WM_CLASS: &[u8] = b"edgehook\0edgehook\0";

    /// Core font used for panel text
    pub const PANEL_FONT: &[u8] = b"fixed";

    /// Core font holding cursor glyphs
    pub const CURSOR_FONT: &[u8] = b"cursor";

    /// Widget colors (24-bit TrueColor pixels)
    pub const MAIN_PIXEL: u32 = 0x00E9_8973;
    pub const PANEL_BACKGROUND_PIXEL: u32 = 0x0030_2A2E;
    pub const PANEL_TEXT_PIXEL: u32 = 0x00FF_FFFF;
    pub const FRAME_PIXEL: u32 = 0x00E9_8973;
}

/// Mouse button constants
pub mod mouse {
    /// Left mouse button number
    pub const BUTTON_LEFT: u8 = 1;

    /// Right mouse button number
    pub const BUTTON_RIGHT: u8 = 3;
}

/// Filesystem locations
pub mod paths {
    /// procfs mount point
    pub const PROC_DIR: &str = "/proc";

    /// Per-process file holding the short process name
    pub const COMM_FILE: &str = "comm";
}

/// Configuration file location
pub mod config {
    pub const APP_DIR: &str = "edgehook";
    pub const FILENAME: &str = "settings.json";
}

/// IPC socket location
pub mod ipc {
    pub const SOCKET_DIR: &str = "edgehook";
    pub const SOCKET_FILE: &str = "companion.sock";

    /// Maximum message size (1 MB) to prevent memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
}

/// Validation bounds for loaded settings
pub mod validation {
    pub const MIN_SPRING: f64 = 0.01;
    pub const MAX_SPRING: f64 = 1.0;
    pub const MIN_DAMPING: f64 = 0.01;
    pub const MAX_DAMPING: f64 = 1.0;
    pub const MIN_BOUNCE: f64 = 0.0;
    pub const MAX_BOUNCE: f64 = 2.0;
    pub const MIN_SCALE: f64 = 0.5;
    pub const MAX_SCALE: f64 = 4.0;
    pub const MIN_WIDGET_SIZE: f64 = 16.0;
    pub const MAX_WIDGET_SIZE: f64 = 1024.0;
    pub const MAX_DISTANCE: f64 = 2000.0;
}
