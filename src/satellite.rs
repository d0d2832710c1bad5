//! Satellite panels and their placement around the main actor
//!
//! Three fixed satellites exist for the whole session: a transient status
//! panel, a persistent result panel and the ROI highlight frame. Status and
//! result are laid out relative to the main actor; the highlight follows the
//! ROI instead.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::panel::{CHAR_WIDTH, LINE_HEIGHT, MAX_HEIGHT, PADDING};
use crate::hook::HookEdge;
use crate::physics::{FloatingActor, PhysicsParams};
use crate::types::{Logical, Point, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SatelliteRole {
    Status,
    Result,
    Highlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorMode {
    Up,
    Down,
    Left,
    Right,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSettings {
    #[serde(default)]
    pub anchor: AnchorMode,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    #[serde(default = "default_min_satellite_width")]
    pub min_satellite_width: f64,
}

fn default_spacing() -> f64 {
    5.0
}

fn default_min_satellite_width() -> f64 {
    200.0
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            anchor: AnchorMode::Auto,
            spacing: default_spacing(),
            min_satellite_width: default_min_satellite_width(),
        }
    }
}

/// `Auto` points away from the window edge the actor is hooked to
pub fn effective_anchor(mode: AnchorMode, edge: Option<HookEdge>) -> AnchorMode {
    match (mode, edge) {
        (AnchorMode::Auto, Some(HookEdge::Bottom)) => AnchorMode::Up,
        (AnchorMode::Auto, _) => AnchorMode::Down,
        (other, _) => other,
    }
}

/// Top-left for a satellite of `size` on the `anchor` side of `main`,
/// centered on the perpendicular axis
pub fn anchored_position(anchor: AnchorMode, main: Rect<Logical>, size: Size, spacing: f64) -> Point<Logical> {
    let centered_x = main.x + (main.width - size.width) / 2.0;
    let centered_y = main.y + (main.height - size.height) / 2.0;
    match anchor {
        AnchorMode::Up => Point::new(centered_x, main.top() - size.height - spacing),
        AnchorMode::Left => Point::new(main.left() - size.width - spacing, centered_y),
        AnchorMode::Right => Point::new(main.right() + spacing, centered_y),
        AnchorMode::Down | AnchorMode::Auto => Point::new(centered_x, main.bottom() + spacing),
    }
}

/// Word-wrap `text` to the character columns that fit in `width`
pub fn wrap_lines(text: &str, width: f64) -> Vec<String> {
    let columns = ((width - 2.0 * PADDING) / CHAR_WIDTH).floor().max(1.0) as usize;
    textwrap::wrap(text, columns)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

/// Panel size for `text` at a fixed `width`
pub fn measure(text: &str, width: f64) -> Size {
    let lines = wrap_lines(text, width).len().max(1);
    let height = (lines as f64 * LINE_HEIGHT + 2.0 * PADDING).min(MAX_HEIGHT);
    Size::new(width, height)
}

#[derive(Debug, Clone)]
pub struct SatelliteWindow {
    role: SatelliteRole,
    actor: FloatingActor,
    visible: bool,
    text: String,
    /// Bumped whenever pending deferred actions against this panel go stale
    generation: u64,
}

impl SatelliteWindow {
    pub fn new(role: SatelliteRole, params: PhysicsParams) -> Self {
        let mut actor = FloatingActor::new(Point::zero(), Size::new(1.0, 1.0), params);
        // The highlight tracks a region of a window, which may hang off-screen
        actor.constrain_to_monitor = role != SatelliteRole::Highlight;
        Self {
            role,
            actor,
            visible: false,
            text: String::new(),
            generation: 0,
        }
    }

    pub fn actor(&self) -> &FloatingActor {
        &self.actor
    }

    pub fn actor_mut(&mut self) -> &mut FloatingActor {
        &mut self.actor
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.generation += 1;
    }

    /// Move toward `position`: a hidden panel snaps so it never flies in
    /// from a stale spot, a visible one animates
    pub fn place(&mut self, position: Point<Logical>) {
        if self.visible {
            self.actor.set_animated_target(position);
        } else {
            self.actor.set_target_immediate(position);
        }
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        if self.visible {
            debug!(role = ?self.role, "Hiding satellite");
        }
        self.visible = false;
        self.actor.stop();
        self.generation += 1;
    }
}

/// The fixed set of satellites owned by the companion
#[derive(Debug, Clone)]
pub struct Satellites {
    pub status: SatelliteWindow,
    pub result: SatelliteWindow,
    pub highlight: SatelliteWindow,
}

impl Satellites {
    pub fn new(params: PhysicsParams) -> Self {
        Self {
            status: SatelliteWindow::new(SatelliteRole::Status, params),
            result: SatelliteWindow::new(SatelliteRole::Result, params),
            highlight: SatelliteWindow::new(SatelliteRole::Highlight, params),
        }
    }

    pub fn get(&self, role: SatelliteRole) -> &SatelliteWindow {
        match role {
            SatelliteRole::Status => &self.status,
            SatelliteRole::Result => &self.result,
            SatelliteRole::Highlight => &self.highlight,
        }
    }

    pub fn get_mut(&mut self, role: SatelliteRole) -> &mut SatelliteWindow {
        match role {
            SatelliteRole::Status => &mut self.status,
            SatelliteRole::Result => &mut self.result,
            SatelliteRole::Highlight => &mut self.highlight,
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SatelliteWindow> {
        [&mut self.status, &mut self.result, &mut self.highlight].into_iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SatelliteWindow> {
        [&self.status, &self.result, &self.highlight].into_iter()
    }

    /// Frame the ROI; snaps when first shown, follows smoothly afterwards
    pub fn place_highlight(&mut self, roi: Rect<Logical>) {
        self.highlight.actor.set_size(roi.size());
        self.highlight.place(roi.top_left());
    }
}

pub struct SatelliteLayout {
    settings: LayoutSettings,
}

impl SatelliteLayout {
    pub fn new(settings: LayoutSettings) -> Self {
        Self { settings }
    }

    pub fn set_settings(&mut self, settings: LayoutSettings) {
        self.settings = settings;
    }

    /// Place `role` relative to the main actor rect `main`. Status never
    /// covers a visible result panel: it is pushed past it, and placing the
    /// result nudges an overlapping status panel out of the way.
    pub fn position(
        &self,
        satellites: &mut Satellites,
        role: SatelliteRole,
        main: Rect<Logical>,
        edge: Option<HookEdge>,
    ) {
        if role == SatelliteRole::Highlight {
            return;
        }

        let spacing = self.settings.spacing;
        let width = self.settings.min_satellite_width.max(main.width);
        let size = measure(satellites.get(role).text(), width);
        let anchor = effective_anchor(self.settings.anchor, edge);
        let mut position = anchored_position(anchor, main, size, spacing);

        match role {
            SatelliteRole::Status if satellites.result.is_visible() => {
                let result = satellites.result.actor().target_rect();
                match anchor {
                    AnchorMode::Down => position.y = result.bottom() + spacing,
                    AnchorMode::Up => position.y = result.top() - size.height - spacing,
                    _ => {}
                }
            }
            SatelliteRole::Result if satellites.status.is_visible() => {
                let status = satellites.status.actor().target_rect();
                let placed = Rect::from_origin_size(position, size);
                if placed.intersects(&status) {
                    let pushed_y = match anchor {
                        AnchorMode::Down => Some(position.y + size.height + spacing),
                        AnchorMode::Up => Some(position.y - status.height - spacing),
                        _ => None,
                    };
                    if let Some(y) = pushed_y {
                        satellites
                            .status
                            .actor_mut()
                            .set_animated_target(Point::new(status.x, y));
                    }
                }
            }
            _ => {}
        }

        debug!(?role, ?anchor, ?position, "Positioning satellite");
        let satellite = satellites.get_mut(role);
        satellite.actor_mut().set_size(size);
        satellite.place(position);
    }

    /// Re-run placement for every visible panel, result first
    pub fn reposition_visible(&self, satellites: &mut Satellites, main: Rect<Logical>, edge: Option<HookEdge>) {
        for role in [SatelliteRole::Result, SatelliteRole::Status] {
            if satellites.get(role).is_visible() {
                self.position(satellites, role, main, edge);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_rect() -> Rect<Logical> {
        Rect::new(500.0, 300.0, 96.0, 96.0)
    }

    fn layout_with(anchor: AnchorMode) -> SatelliteLayout {
        SatelliteLayout::new(LayoutSettings {
            anchor,
            ..LayoutSettings::default()
        })
    }

    #[test]
    fn test_effective_anchor() {
        assert_eq!(effective_anchor(AnchorMode::Auto, None), AnchorMode::Down);
        assert_eq!(effective_anchor(AnchorMode::Auto, Some(HookEdge::Top)), AnchorMode::Down);
        assert_eq!(effective_anchor(AnchorMode::Auto, Some(HookEdge::Bottom)), AnchorMode::Up);
        assert_eq!(effective_anchor(AnchorMode::Left, Some(HookEdge::Bottom)), AnchorMode::Left);
    }

    #[test]
    fn test_anchored_positions() {
        let main = main_rect();
        let size = Size::new(200.0, 40.0);
        assert_eq!(anchored_position(AnchorMode::Down, main, size, 5.0), Point::new(448.0, 401.0));
        assert_eq!(anchored_position(AnchorMode::Up, main, size, 5.0), Point::new(448.0, 255.0));
        assert_eq!(anchored_position(AnchorMode::Left, main, size, 5.0), Point::new(295.0, 328.0));
        assert_eq!(anchored_position(AnchorMode::Right, main, size, 5.0), Point::new(601.0, 328.0));
    }

    #[test]
    fn test_measure_wraps_long_text() {
        let one_line = measure("ok", 200.0);
        assert_eq!(one_line, Size::new(200.0, LINE_HEIGHT + 2.0 * PADDING));

        let long = "lorem ipsum dolor sit amet ".repeat(10);
        let wrapped = measure(&long, 200.0);
        assert!(wrapped.height > one_line.height);
        assert!(wrapped.height <= MAX_HEIGHT);
    }

    #[test]
    fn test_width_is_at_least_main_width() {
        let layout = layout_with(AnchorMode::Down);
        let mut sats = Satellites::new(PhysicsParams::default());
        sats.status.set_text("hello");
        let wide = Rect::new(0.0, 0.0, 320.0, 96.0);
        layout.position(&mut sats, SatelliteRole::Status, wide, None);
        assert_eq!(sats.status.actor().size().width, 320.0);

        layout.position(&mut sats, SatelliteRole::Status, main_rect(), None);
        assert_eq!(sats.status.actor().size().width, 200.0);
    }

    #[test]
    fn test_first_show_snaps_then_animates() {
        let layout = layout_with(AnchorMode::Down);
        let mut sats = Satellites::new(PhysicsParams::default());
        sats.result.set_text("result");

        layout.position(&mut sats, SatelliteRole::Result, main_rect(), None);
        let first = sats.result.actor().current();
        assert_eq!(first, Point::new(448.0, 401.0));
        sats.result.show();

        let moved = main_rect().moved_to(Point::new(600.0, 300.0));
        layout.position(&mut sats, SatelliteRole::Result, moved, None);
        assert_eq!(sats.result.actor().current(), first);
        assert_eq!(sats.result.actor().target(), Point::new(548.0, 401.0));
    }

    #[test]
    fn test_status_stacks_below_result_when_both_down() {
        let layout = layout_with(AnchorMode::Down);
        let mut sats = Satellites::new(PhysicsParams::default());
        let main = main_rect();

        sats.result.set_text("recognized text");
        layout.position(&mut sats, SatelliteRole::Result, main, None);
        sats.result.show();

        sats.status.set_text("Reading...");
        layout.position(&mut sats, SatelliteRole::Status, main, None);
        sats.status.show();

        let result = sats.result.actor().target_rect();
        let status = sats.status.actor().target_rect();
        assert_eq!(result.top(), main.bottom() + 5.0);
        assert_eq!(status.top(), result.bottom() + 5.0);
        assert!(!result.intersects(&status));
    }

    #[test]
    fn test_status_stacks_above_result_when_hooked_to_bottom() {
        let layout = layout_with(AnchorMode::Auto);
        let mut sats = Satellites::new(PhysicsParams::default());
        let main = main_rect();
        let edge = Some(HookEdge::Bottom);

        sats.result.set_text("result");
        layout.position(&mut sats, SatelliteRole::Result, main, edge);
        sats.result.show();
        sats.status.set_text("status");
        layout.position(&mut sats, SatelliteRole::Status, main, edge);

        let result = sats.result.actor().target_rect();
        let status = sats.status.actor().target_rect();
        assert_eq!(result.bottom(), main.top() - 5.0);
        assert_eq!(status.bottom(), result.top() - 5.0);
    }

    #[test]
    fn test_result_pushes_only_overlapping_status() {
        let layout = layout_with(AnchorMode::Down);
        let mut sats = Satellites::new(PhysicsParams::default());
        let main = main_rect();

        sats.status.set_text("status");
        layout.position(&mut sats, SatelliteRole::Status, main, None);
        sats.status.show();
        let status_before = sats.status.actor().target_rect();

        sats.result.set_text("result");
        layout.position(&mut sats, SatelliteRole::Result, main, None);
        let result = sats.result.actor().target_rect();

        // Result keeps its anchor-computed spot
        assert_eq!(result.top(), main.bottom() + 5.0);
        // Status only had its target moved, keeping its x
        let status_after = sats.status.actor().target_rect();
        assert_eq!(status_after.x, status_before.x);
        assert_eq!(status_after.top(), result.bottom() + 5.0);
        assert_eq!(sats.status.actor().current(), status_before.top_left());
    }

    #[test]
    fn test_hide_bumps_generation() {
        let mut sat = SatelliteWindow::new(SatelliteRole::Status, PhysicsParams::default());
        let before = sat.generation();
        sat.show();
        sat.hide();
        assert!(!sat.is_visible());
        assert!(sat.generation() > before);
    }
}
