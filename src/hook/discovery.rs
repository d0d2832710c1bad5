//! Discovery scan: which foreign window edge, if any, is close enough to hook
//!
//! Runs once per drag release while unhooked, against a single snapshot of
//! the stack. Candidates are screened with cheap checks first and the
//! occlusion test last, then every surviving window is tested against both
//! hook edges; the smallest gap wins.

use std::fmt;

use tracing::debug;

use super::window_system::{topmost_at, GeometryError, WindowHandle, WindowInfo, WindowSystem};
use super::{HookEdge, HookSettings};
use crate::monitor::MonitorLayout;
use crate::types::{Logical, Physical, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HookCandidate {
    pub handle: WindowHandle,
    pub rect: Rect<Physical>,
    pub edge: HookEdge,
    /// Vertical distance in logical px between the facing edges
    pub gap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OwnProcess,
    Hidden,
    Untitled,
    TooSmall,
    Occluded,
    Denylisted,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::OwnProcess => "own process",
            Rejection::Hidden => "not visible",
            Rejection::Untitled => "no title",
            Rejection::TooSmall => "below minimum size",
            Rejection::Occluded => "not topmost at its center",
            Rejection::Denylisted => "denylisted process",
        };
        f.write_str(reason)
    }
}

/// Decide whether `window` may be hooked at all, ignoring proximity.
/// `stack` is the bottom-to-top snapshot `window` came from.
pub fn screen_window(
    stack: &[WindowInfo],
    layout: &MonitorLayout,
    window: &WindowInfo,
    settings: &HookSettings,
    own_pid: u32,
) -> Result<(), Rejection> {
    if window.pid == Some(own_pid) {
        return Err(Rejection::OwnProcess);
    }
    if !window.visible {
        return Err(Rejection::Hidden);
    }
    if window.title.trim().is_empty() {
        return Err(Rejection::Untitled);
    }

    let logical = layout.to_logical_rect(window.rect, window.rect.top_left());
    if logical.width < settings.min_window_size || logical.height < settings.min_window_size {
        return Err(Rejection::TooSmall);
    }

    if let Some(process) = &window.process_name {
        if settings.is_denylisted(process) {
            return Err(Rejection::Denylisted);
        }
    }

    // A window that isn't on top at its own center is covered or is shell
    // chrome that never receives input
    match topmost_at(stack, window.rect.center()) {
        Some(top) if top == window.handle => Ok(()),
        _ => Err(Rejection::Occluded),
    }
}

/// Gaps to both edges of `window`, filtered by the per-edge thresholds
fn edge_candidates(
    actor: Rect<Logical>,
    window: Rect<Logical>,
    settings: &HookSettings,
) -> impl Iterator<Item = (HookEdge, f64)> {
    let aligned = actor.overlaps_horizontally(&window);
    let top_gap = (actor.bottom() - window.top()).abs();
    let bottom_gap = (actor.top() - window.bottom()).abs();

    [
        (HookEdge::Top, top_gap, settings.proximity_top),
        (HookEdge::Bottom, bottom_gap, settings.proximity_bottom),
    ]
    .into_iter()
    .filter(move |(_, gap, threshold)| aligned && gap < threshold)
    .map(|(edge, gap, _)| (edge, gap))
}

/// Find the closest hookable edge to `actor`, if any
pub fn find_candidate(
    windows: &dyn WindowSystem,
    layout: &MonitorLayout,
    actor: Rect<Logical>,
    settings: &HookSettings,
    own_pid: u32,
) -> Result<Option<HookCandidate>, GeometryError> {
    let mut best: Option<HookCandidate> = None;

    let stack = windows.list_top_level_windows()?;
    for window in &stack {
        if let Err(reason) = screen_window(&stack, layout, window, settings, own_pid) {
            debug!(window = window.handle, title = %window.title, %reason, "Skipping hook candidate");
            continue;
        }

        let logical = layout.to_logical_rect(window.rect, window.rect.top_left());
        for (edge, gap) in edge_candidates(actor, logical, settings) {
            let candidate = HookCandidate {
                handle: window.handle,
                rect: window.rect,
                edge,
                gap,
            };
            // Keep this candidate if it's closer than the current best
            if best.as_ref().map_or(true, |b| candidate.gap < b.gap) {
                best = Some(candidate);
            }
        }
    }

    Ok(best)
}
