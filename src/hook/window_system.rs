//! The narrow seam between hook decisions and the OS
//!
//! Everything the hook engine knows about foreign windows comes through
//! [`WindowSystem`]. The X11 implementation lives in `x11_utils`; tests use
//! `FakeWindowSystem`.

use thiserror::Error;

use crate::types::{Physical, Point, Rect};

pub type WindowHandle = u32;

/// One enumerated top-level window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub pid: Option<u32>,
    /// Lowercase short process name, when it could be resolved
    pub process_name: Option<String>,
    pub rect: Rect<Physical>,
    pub visible: bool,
}

/// A geometry query failed. Always transient from the hook engine's point
/// of view: the window is treated as gone.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("window {0} no longer exists")]
    WindowGone(WindowHandle),

    #[error("query for window {handle} failed: {message}")]
    Query { handle: WindowHandle, message: String },

    #[error("window system unavailable: {0}")]
    Backend(String),
}

pub trait WindowSystem {
    /// Visible and hidden top-level windows of every client
    fn list_top_level_windows(&self) -> Result<Vec<WindowInfo>, GeometryError>;

    /// Current outer rectangle of `handle`
    fn window_rect(&self, handle: WindowHandle) -> Result<Rect<Physical>, GeometryError>;

    /// `Ok(false)` for hidden windows, `Err` for windows that vanished
    fn is_window_visible(&self, handle: WindowHandle) -> Result<bool, GeometryError>;

    /// The top-level window a click at `point` would land on
    fn top_level_at(&self, point: Point<Physical>) -> Result<Option<WindowHandle>, GeometryError> {
        Ok(topmost_at(&self.list_top_level_windows()?, point))
    }
}

/// Hit test against a bottom-to-top snapshot of the stack
pub fn topmost_at(stack: &[WindowInfo], point: Point<Physical>) -> Option<WindowHandle> {
    stack
        .iter()
        .rev()
        .find(|w| w.visible && w.rect.contains(point))
        .map(|w| w.handle)
}
