//! Window hook state machine
//!
//! `Unhooked -> (discovery) -> Hooked -> (detach trigger) -> Unhooked`
//!
//! The engine decides; it never moves anything itself. Every transition hands
//! back the target position the caller should animate the main actor to.

mod discovery;
#[cfg(test)]
pub mod fake;
mod window_system;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::monitor::MonitorLayout;
use crate::roi::Roi;
use crate::types::{Logical, Physical, Point, Rect};

pub use discovery::{find_candidate, HookCandidate};
pub use window_system::{GeometryError, WindowHandle, WindowInfo, WindowSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookEdge {
    /// Actor sits on top of the window's top edge
    Top,
    /// Actor hangs below the window's bottom edge
    Bottom,
}

impl fmt::Display for HookEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEdge::Top => f.write_str("top"),
            HookEdge::Bottom => f.write_str("bottom"),
        }
    }
}

/// Hook thresholds, all in logical pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookSettings {
    #[serde(default = "default_proximity")]
    pub proximity_top: f64,
    #[serde(default = "default_proximity")]
    pub proximity_bottom: f64,
    #[serde(default)]
    pub offset_top: f64,
    #[serde(default)]
    pub offset_bottom: f64,
    #[serde(default = "default_unhook_distance")]
    pub unhook_distance: f64,
    #[serde(default = "default_min_window_size")]
    pub min_window_size: f64,
    /// Process names (as in /proc/<pid>/comm) never hooked
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

fn default_proximity() -> f64 {
    20.0
}

fn default_unhook_distance() -> f64 {
    50.0
}

fn default_min_window_size() -> f64 {
    200.0
}

fn default_denylist() -> Vec<String> {
    [
        "plasmashell",
        "krunner",
        "gnome-shell",
        "xfce4-panel",
        "xfdesktop",
        "nautilus-desktop",
        "polybar",
        "tint2",
        "lxpanel",
        "conky",
        "rofi",
        "dmenu",
        "ulauncher",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            proximity_top: default_proximity(),
            proximity_bottom: default_proximity(),
            offset_top: 0.0,
            offset_bottom: 0.0,
            unhook_distance: default_unhook_distance(),
            min_window_size: default_min_window_size(),
            denylist: default_denylist(),
        }
    }
}

impl HookSettings {
    pub fn is_denylisted(&self, process: &str) -> bool {
        let process = process.trim();
        self.denylist.iter().any(|d| d.eq_ignore_ascii_case(process))
    }

    fn offset(&self, edge: HookEdge) -> f64 {
        match edge {
            HookEdge::Top => self.offset_top,
            HookEdge::Bottom => self.offset_bottom,
        }
    }
}

/// Everything known about the window the actor is glued to
#[derive(Debug, Clone, PartialEq)]
pub struct Hooked {
    pub edge: HookEdge,
    pub handle: WindowHandle,
    /// Window rect as of the last maintenance tick
    pub rect_physical: Rect<Physical>,
    /// Actor position minus window top-left
    pub anchor_offset: Point<Logical>,
    pub roi: Option<Roi>,
}

impl Hooked {
    pub fn window_rect_logical(&self, layout: &MonitorLayout) -> Rect<Logical> {
        layout.to_logical_rect(self.rect_physical, self.rect_physical.top_left())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum HookState {
    #[default]
    Unhooked,
    Hooked(Hooked),
}

/// Wire-friendly view of the hook state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookSummary {
    pub hooked: bool,
    pub edge: Option<HookEdge>,
    pub window: Option<WindowHandle>,
    pub has_roi: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    WindowGone,
    WindowHidden,
    Occluded,
    DraggedAway,
}

impl fmt::Display for DetachReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DetachReason::WindowGone => "window gone",
            DetachReason::WindowHidden => "window hidden",
            DetachReason::Occluded => "window no longer on top",
            DetachReason::DraggedAway => "dragged away",
        };
        f.write_str(reason)
    }
}

/// A fresh attachment; animate the actor to `target`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub edge: HookEdge,
    pub handle: WindowHandle,
    pub target: Point<Logical>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaintainOutcome {
    /// Nothing is hooked
    Idle,
    Unchanged,
    /// The window moved; the actor should follow to `target`
    Moved {
        target: Point<Logical>,
        /// The re-projected ROI, when one exists
        roi: Option<Rect<Logical>>,
    },
    Detached(DetachReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    /// Not hooked, move freely
    Free(Point<Logical>),
    /// Still hooked, vertical movement pinned
    Clamped(Point<Logical>),
    /// Dragged past the unhook distance; the hook was released
    Detached(Point<Logical>),
}

pub struct HookEngine {
    state: HookState,
    settings: HookSettings,
    own_pid: u32,
}

impl HookEngine {
    pub fn new(settings: HookSettings, own_pid: u32) -> Self {
        Self {
            state: HookState::Unhooked,
            settings,
            own_pid,
        }
    }

    pub fn state(&self) -> &HookState {
        &self.state
    }

    pub fn hooked(&self) -> Option<&Hooked> {
        match &self.state {
            HookState::Hooked(h) => Some(h),
            HookState::Unhooked => None,
        }
    }

    pub fn hooked_mut(&mut self) -> Option<&mut Hooked> {
        match &mut self.state {
            HookState::Hooked(h) => Some(h),
            HookState::Unhooked => None,
        }
    }

    pub fn is_hooked(&self) -> bool {
        self.hooked().is_some()
    }

    pub fn edge(&self) -> Option<HookEdge> {
        self.hooked().map(|h| h.edge)
    }

    pub fn set_settings(&mut self, settings: HookSettings) {
        self.settings = settings;
    }

    pub fn summary(&self) -> HookSummary {
        match self.hooked() {
            Some(h) => HookSummary {
                hooked: true,
                edge: Some(h.edge),
                window: Some(h.handle),
                has_roi: h.roi.is_some(),
            },
            None => HookSummary {
                hooked: false,
                edge: None,
                window: None,
                has_roi: false,
            },
        }
    }

    /// Look for a window edge near `actor`. Only runs while unhooked; an
    /// enumeration failure is treated as "nothing found".
    pub fn discover(
        &mut self,
        windows: &dyn WindowSystem,
        layout: &MonitorLayout,
        actor: Rect<Logical>,
    ) -> Option<Attachment> {
        if self.is_hooked() {
            return None;
        }
        match find_candidate(windows, layout, actor, &self.settings, self.own_pid) {
            Ok(Some(candidate)) => Some(self.attach(candidate, layout, actor)),
            Ok(None) => {
                debug!(actor = ?actor, "No hookable window nearby");
                None
            }
            Err(e) => {
                warn!(error = %e, "Window enumeration failed during discovery");
                None
            }
        }
    }

    /// Glue the actor to `candidate`, replacing any previous hook
    pub fn attach(&mut self, candidate: HookCandidate, layout: &MonitorLayout, actor: Rect<Logical>) -> Attachment {
        let window = layout.to_logical_rect(candidate.rect, candidate.rect.top_left());
        let offset = self.settings.offset(candidate.edge);
        let y = match candidate.edge {
            HookEdge::Top => window.top() - actor.height + offset,
            HookEdge::Bottom => window.bottom() + offset,
        };
        let target = Point::new(actor.x, y);

        info!(
            window = candidate.handle,
            edge = %candidate.edge,
            gap = candidate.gap,
            "Hooked to window"
        );

        self.state = HookState::Hooked(Hooked {
            edge: candidate.edge,
            handle: candidate.handle,
            rect_physical: candidate.rect,
            anchor_offset: target - window.top_left(),
            roi: None,
        });

        Attachment {
            edge: candidate.edge,
            handle: candidate.handle,
            target,
        }
    }

    /// One maintenance poll. Any geometry error detaches immediately.
    pub fn maintain(&mut self, windows: &dyn WindowSystem, layout: &MonitorLayout) -> MaintainOutcome {
        let Some(hooked) = self.hooked() else {
            return MaintainOutcome::Idle;
        };
        let handle = hooked.handle;

        match windows.is_window_visible(handle) {
            Ok(true) => {}
            Ok(false) => return self.detached(DetachReason::WindowHidden),
            Err(e) => {
                debug!(window = handle, error = %e, "Visibility query failed");
                return self.detached(DetachReason::WindowGone);
            }
        }

        let rect = match windows.window_rect(handle) {
            Ok(rect) => rect,
            Err(e) => {
                debug!(window = handle, error = %e, "Geometry query failed");
                return self.detached(DetachReason::WindowGone);
            }
        };

        match windows.top_level_at(rect.center()) {
            Ok(Some(top)) if top == handle => {}
            Ok(_) => return self.detached(DetachReason::Occluded),
            Err(e) => {
                debug!(window = handle, error = %e, "Stacking query failed");
                return self.detached(DetachReason::WindowGone);
            }
        }

        let Some(hooked) = self.hooked_mut() else {
            return MaintainOutcome::Idle;
        };
        if rect == hooked.rect_physical {
            return MaintainOutcome::Unchanged;
        }

        hooked.rect_physical = rect;
        let window_top_left = layout.to_logical_point(rect.top_left(), rect.top_left());
        let target = window_top_left + hooked.anchor_offset;
        let roi = hooked.roi.as_mut().map(|roi| {
            roi.reproject(window_top_left, layout);
            roi.rect_logical()
        });

        MaintainOutcome::Moved { target, roi }
    }

    /// Filter a drag position through the hook. `resting_y` is where the
    /// actor currently rests against the edge.
    pub fn drag(&mut self, proposed: Point<Logical>, resting_y: f64) -> DragOutcome {
        if !self.is_hooked() {
            return DragOutcome::Free(proposed);
        }

        // Measured from the resting spot so edge offsets don't count as pull
        let distance = (proposed.y - resting_y).abs();
        if distance > self.settings.unhook_distance {
            self.detach(DetachReason::DraggedAway);
            DragOutcome::Detached(proposed)
        } else {
            DragOutcome::Clamped(Point::new(proposed.x, resting_y))
        }
    }

    /// Remember where the user left the actor relative to the window
    pub fn recapture_anchor(&mut self, layout: &MonitorLayout, position: Point<Logical>) {
        if let Some(hooked) = self.hooked_mut() {
            let top_left = hooked.window_rect_logical(layout).top_left();
            hooked.anchor_offset = position - top_left;
        }
    }

    /// Drop the hook (and its ROI). Returns the previous hook, if any.
    pub fn detach(&mut self, reason: DetachReason) -> Option<Hooked> {
        match std::mem::take(&mut self.state) {
            HookState::Hooked(previous) => {
                info!(window = previous.handle, %reason, "Unhooked from window");
                Some(previous)
            }
            HookState::Unhooked => None,
        }
    }

    fn detached(&mut self, reason: DetachReason) -> MaintainOutcome {
        self.detach(reason);
        MaintainOutcome::Detached(reason)
    }
}
