//! Region of interest tied to a hooked window
//!
//! A [`Roi`] remembers where the user's selection sits relative to the hooked
//! window's top-left corner, so it can be carried along as the window moves.
//! The physical rectangle is always re-derived from the logical one using the
//! monitor under the ROI's center.

use tracing::debug;

use crate::constants::selection::MIN_SELECTION_SIZE;
use crate::hook::Hooked;
use crate::monitor::MonitorLayout;
use crate::types::{Logical, Physical, Point, Rect};

#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    rect_logical: Rect<Logical>,
    rect_physical: Rect<Physical>,
    /// Selection top-left minus hooked window top-left
    offset: Point<Logical>,
}

impl Roi {
    /// Anchor a fresh selection (global logical coordinates) to a window
    pub fn capture(selection: Rect<Logical>, window_top_left: Point<Logical>, layout: &MonitorLayout) -> Self {
        Self {
            rect_logical: selection,
            rect_physical: physical_of(selection, layout),
            offset: selection.top_left() - window_top_left,
        }
    }

    /// Follow the hooked window to its new top-left corner
    pub fn reproject(&mut self, window_top_left: Point<Logical>, layout: &MonitorLayout) {
        self.rect_logical = self.rect_logical.moved_to(window_top_left + self.offset);
        self.rect_physical = physical_of(self.rect_logical, layout);
    }

    pub fn rect_logical(&self) -> Rect<Logical> {
        self.rect_logical
    }

    pub fn rect_physical(&self) -> Rect<Physical> {
        self.rect_physical
    }

    pub fn offset(&self) -> Point<Logical> {
        self.offset
    }
}

fn physical_of(rect: Rect<Logical>, layout: &MonitorLayout) -> Rect<Physical> {
    layout.to_physical_rect(rect, rect.center())
}

/// What a reprocess request turns into
#[derive(Debug, Clone, PartialEq)]
pub enum ReprocessAction {
    /// Not hooked, or a capture is still being processed
    Ignored,
    /// A selection was open; the request closes it instead
    CancelSelection,
    /// Re-emit the existing ROI for capture
    Repeat(Rect<Physical>),
    /// Open the interactive selection surface
    BeginSelection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// A new ROI was stored on the hook; emit this rect for capture
    Created(Rect<Physical>),
    Cancelled,
}

/// Tracks the interactive selection session. The ROI itself lives inside the
/// hook state so it cannot outlive the hook.
#[derive(Debug, Default)]
pub struct RoiTracker {
    selecting: bool,
}

impl RoiTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    /// Decide what a reprocess trigger should do in the current state
    pub fn request_repeat(&self, hooked: Option<&Hooked>, processing: bool) -> ReprocessAction {
        if self.selecting {
            return ReprocessAction::CancelSelection;
        }
        let Some(hooked) = hooked else {
            return ReprocessAction::Ignored;
        };
        if processing {
            return ReprocessAction::Ignored;
        }
        match &hooked.roi {
            Some(roi) => ReprocessAction::Repeat(roi.rect_physical()),
            None => ReprocessAction::BeginSelection,
        }
    }

    pub fn begin_selection(&mut self) {
        self.selecting = true;
    }

    pub fn cancel(&mut self) {
        self.selecting = false;
    }

    /// Finish the session with `selection` in global logical coordinates.
    /// Tiny selections and selections made after the hook went away count
    /// as cancellations.
    pub fn complete_selection(
        &mut self,
        selection: Rect<Logical>,
        hooked: Option<&mut Hooked>,
        layout: &MonitorLayout,
    ) -> SelectionOutcome {
        if !self.selecting {
            return SelectionOutcome::Cancelled;
        }
        self.selecting = false;

        let Some(hooked) = hooked else {
            debug!("Selection finished after the hook was released, discarding");
            return SelectionOutcome::Cancelled;
        };
        if selection.width < MIN_SELECTION_SIZE || selection.height < MIN_SELECTION_SIZE {
            debug!(width = selection.width, height = selection.height, "Selection too small, treating as cancel");
            return SelectionOutcome::Cancelled;
        }

        let window_top_left = hooked.window_rect_logical(layout).top_left();
        let roi = Roi::capture(selection, window_top_left, layout);
        let rect = roi.rect_physical();
        hooked.roi = Some(roi);
        SelectionOutcome::Created(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::HookEdge;
    use crate::monitor::MonitorDescriptor;
    use proptest::prelude::*;

    fn hidpi_layout() -> MonitorLayout {
        MonitorLayout::new(vec![
            MonitorDescriptor::from_physical("DP-1", Rect::new(0.0, 0.0, 1920.0, 1080.0), 1.0, true),
            MonitorDescriptor::from_physical("DP-2", Rect::new(1920.0, 0.0, 3840.0, 2160.0), 2.0, false),
        ])
    }

    fn hooked_to(rect: Rect<Physical>) -> Hooked {
        Hooked {
            edge: HookEdge::Top,
            handle: 42,
            rect_physical: rect,
            anchor_offset: Point::new(0.0, -96.0),
            roi: None,
        }
    }

    #[test]
    fn test_capture_records_offset_and_physical_rect() {
        let layout = hidpi_layout();
        let roi = Roi::capture(Rect::new(2020.0, 100.0, 200.0, 50.0), Point::new(1970.0, 60.0), &layout);
        assert_eq!(roi.offset(), Point::new(50.0, 40.0));
        // Centered on the 2x monitor: distances from its origin double
        assert_eq!(roi.rect_physical(), Rect::new(2120.0, 200.0, 400.0, 100.0));
    }

    #[test]
    fn test_reproject_follows_window() {
        let layout = MonitorLayout::single(Rect::new(0.0, 0.0, 2560.0, 1440.0), 1.0);
        let mut roi = Roi::capture(Rect::new(110.0, 220.0, 30.0, 40.0), Point::new(100.0, 200.0), &layout);
        roi.reproject(Point::new(300.0, 250.0), &layout);
        assert_eq!(roi.rect_logical(), Rect::new(310.0, 270.0, 30.0, 40.0));
        assert_eq!(roi.rect_physical(), Rect::new(310.0, 270.0, 30.0, 40.0));
    }

    #[test]
    fn test_reprocess_decisions() {
        let mut tracker = RoiTracker::new();
        let mut hooked = hooked_to(Rect::new(0.0, 0.0, 800.0, 600.0));

        assert_eq!(tracker.request_repeat(None, false), ReprocessAction::Ignored);
        assert_eq!(tracker.request_repeat(Some(&hooked), true), ReprocessAction::Ignored);
        assert_eq!(tracker.request_repeat(Some(&hooked), false), ReprocessAction::BeginSelection);

        tracker.begin_selection();
        assert_eq!(tracker.request_repeat(Some(&hooked), false), ReprocessAction::CancelSelection);

        let layout = hidpi_layout();
        let outcome = tracker.complete_selection(Rect::new(10.0, 10.0, 100.0, 100.0), Some(&mut hooked), &layout);
        assert_eq!(outcome, SelectionOutcome::Created(Rect::new(10.0, 10.0, 100.0, 100.0)));
        assert_eq!(
            tracker.request_repeat(Some(&hooked), false),
            ReprocessAction::Repeat(Rect::new(10.0, 10.0, 100.0, 100.0))
        );
    }

    #[test]
    fn test_tiny_selection_is_cancelled() {
        let mut tracker = RoiTracker::new();
        let mut hooked = hooked_to(Rect::new(0.0, 0.0, 800.0, 600.0));
        tracker.begin_selection();
        let outcome = tracker.complete_selection(
            Rect::new(10.0, 10.0, 4.0, 300.0),
            Some(&mut hooked),
            &hidpi_layout(),
        );
        assert_eq!(outcome, SelectionOutcome::Cancelled);
        assert!(hooked.roi.is_none());
        assert!(!tracker.is_selecting());
    }

    #[test]
    fn test_selection_without_hook_is_cancelled() {
        let mut tracker = RoiTracker::new();
        tracker.begin_selection();
        let outcome = tracker.complete_selection(Rect::new(0.0, 0.0, 50.0, 50.0), None, &hidpi_layout());
        assert_eq!(outcome, SelectionOutcome::Cancelled);
    }

    proptest! {
        #[test]
        fn prop_reproject_in_place_is_idempotent(
            x in 0.0f64..3500.0,
            y in 0.0f64..1000.0,
            w in 5.0f64..300.0,
            h in 5.0f64..300.0,
            wx in 0.0f64..3000.0,
            wy in 0.0f64..800.0,
        ) {
            let layout = hidpi_layout();
            let top_left = Point::new(wx, wy);
            let mut roi = Roi::capture(Rect::new(x, y, w, h), top_left, &layout);
            let before = roi.clone();
            for _ in 0..5 {
                roi.reproject(top_left, &layout);
            }
            let (a, b) = (before.rect_physical(), roi.rect_physical());
            prop_assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
            prop_assert!((a.width - b.width).abs() < 1e-6 && (a.height - b.height).abs() < 1e-6);
            let (a, b) = (before.rect_logical(), roi.rect_logical());
            prop_assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
        }
    }
}
