//! Scriptable in-memory window system for tests

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use super::window_system::{GeometryError, WindowHandle, WindowInfo, WindowSystem};
use crate::types::{Physical, Rect};

#[derive(Debug, Default)]
pub struct FakeWindowSystem {
    /// Bottom-to-top stacking order
    windows: RefCell<Vec<WindowInfo>>,
    failing: RefCell<HashSet<WindowHandle>>,
    listings: Cell<usize>,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a visible, titled window on top of the stack
    pub fn push(&self, handle: WindowHandle, process: &str, rect: Rect<Physical>) {
        self.windows.borrow_mut().push(WindowInfo {
            handle,
            title: format!("window {handle}"),
            pid: Some(1000 + handle),
            process_name: Some(process.to_string()),
            rect,
            visible: true,
        });
    }

    pub fn push_info(&self, info: WindowInfo) {
        self.windows.borrow_mut().push(info);
    }

    pub fn move_to(&self, handle: WindowHandle, rect: Rect<Physical>) {
        if let Some(w) = self.windows.borrow_mut().iter_mut().find(|w| w.handle == handle) {
            w.rect = rect;
        }
    }

    pub fn set_visible(&self, handle: WindowHandle, visible: bool) {
        if let Some(w) = self.windows.borrow_mut().iter_mut().find(|w| w.handle == handle) {
            w.visible = visible;
        }
    }

    pub fn destroy(&self, handle: WindowHandle) {
        self.windows.borrow_mut().retain(|w| w.handle != handle);
    }

    /// Make every rect query for `handle` fail
    pub fn fail_queries(&self, handle: WindowHandle) {
        self.failing.borrow_mut().insert(handle);
    }

    /// How many times the window list was enumerated
    pub fn listings(&self) -> usize {
        self.listings.get()
    }

    fn find(&self, handle: WindowHandle) -> Result<WindowInfo, GeometryError> {
        self.windows
            .borrow()
            .iter()
            .find(|w| w.handle == handle)
            .cloned()
            .ok_or(GeometryError::WindowGone(handle))
    }
}

impl WindowSystem for FakeWindowSystem {
    fn list_top_level_windows(&self) -> Result<Vec<WindowInfo>, GeometryError> {
        self.listings.set(self.listings.get() + 1);
        Ok(self.windows.borrow().clone())
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<Rect<Physical>, GeometryError> {
        if self.failing.borrow().contains(&handle) {
            return Err(GeometryError::Query {
                handle,
                message: "BadDrawable".to_string(),
            });
        }
        Ok(self.find(handle)?.rect)
    }

    fn is_window_visible(&self, handle: WindowHandle) -> Result<bool, GeometryError> {
        Ok(self.find(handle)?.visible)
    }
}
