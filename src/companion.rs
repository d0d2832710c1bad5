//! The companion: main actor, hook, ROI and satellites wired together
//!
//! Everything here runs on the main loop's thread. Platform code feeds in
//! pointer input and timer ticks, then reads back actor positions to render
//! and drains [`CompanionEvent`]s for collaborators.

use tracing::{debug, info};

use crate::config::Settings;
use crate::constants::messages;
use crate::constants::physics::{GRAB_POP_VELOCITY, UNHOOK_POP_VELOCITY};
use crate::constants::timing::{STATUS_RESET_DELAY_MS, UNHOOK_NOTICE_MS};
use crate::hook::{Attachment, DetachReason, DragOutcome, HookEngine, HookSummary, MaintainOutcome, WindowSystem};
use crate::monitor::MonitorLayout;
use crate::physics::{FloatingActor, PhysicsParams, TickOutcome};
use crate::roi::{ReprocessAction, RoiTracker, SelectionOutcome};
use crate::satellite::{SatelliteLayout, SatelliteRole, Satellites};
use crate::types::{Logical, Physical, Point, Rect, Size};

#[derive(Debug, Clone, PartialEq)]
pub enum CompanionEvent {
    /// Capture this region (new or repeated ROI)
    AreaSelected(Rect<Physical>),
    HookChanged(HookSummary),
    /// Open the interactive selection surface
    SelectionRequested,
    /// Close the interactive selection surface
    SelectionClosed,
    /// The user let go of the main actor here
    PositionSettled(Point<Logical>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredAction {
    HideStatus { generation: u64 },
    ResetStatus,
}

#[derive(Debug, Clone, Copy)]
struct Deferred {
    due_ms: u64,
    action: DeferredAction,
}

pub struct Companion {
    main: FloatingActor,
    main_visible: bool,
    hook: HookEngine,
    roi: RoiTracker,
    satellites: Satellites,
    layout: SatelliteLayout,
    /// Pointer offset from the actor's top-left while dragging
    grab_offset: Option<Point<Logical>>,
    processing: bool,
    now_ms: u64,
    deferred: Vec<Deferred>,
    events: Vec<CompanionEvent>,
}

impl Companion {
    pub fn new(settings: &Settings, position: Point<Logical>, own_pid: u32) -> Self {
        let size = Size::new(settings.widget.width, settings.widget.height);
        Self {
            main: FloatingActor::new(position, size, settings.physics),
            main_visible: true,
            hook: HookEngine::new(settings.hook.clone(), own_pid),
            roi: RoiTracker::new(),
            satellites: Satellites::new(settings.physics),
            layout: SatelliteLayout::new(settings.layout.clone()),
            grab_offset: None,
            processing: false,
            now_ms: 0,
            deferred: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn main(&self) -> &FloatingActor {
        &self.main
    }

    pub fn is_main_visible(&self) -> bool {
        self.main_visible
    }

    pub fn satellites(&self) -> &Satellites {
        &self.satellites
    }

    pub fn hook(&self) -> &HookEngine {
        &self.hook
    }

    pub fn summary(&self) -> HookSummary {
        self.hook.summary()
    }

    pub fn is_dragging(&self) -> bool {
        self.grab_offset.is_some()
    }

    pub fn is_selecting(&self) -> bool {
        self.roi.is_selecting()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn drain_events(&mut self) -> Vec<CompanionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Left button down on the main actor
    pub fn press(&mut self, pointer: Point<Logical>) {
        if self.roi.is_selecting() {
            return;
        }
        self.grab_offset = Some(pointer - self.main.current());
        self.main.stop();
    }

    /// Right click on the main actor: a little hop, and the result panel
    /// is dismissed if it was up
    pub fn secondary_click(&mut self) {
        self.main.nudge(0.0, GRAB_POP_VELOCITY);
        if self.satellites.result.is_visible() {
            self.hide_result();
        }
    }

    pub fn drag_to(&mut self, pointer: Point<Logical>, layout: &MonitorLayout) {
        let Some(grab) = self.grab_offset else {
            return;
        };
        let proposed = pointer - grab;
        let resting_y = self.main.target().y;

        let target = match self.hook.drag(proposed, resting_y) {
            DragOutcome::Free(p) | DragOutcome::Clamped(p) => p,
            DragOutcome::Detached(p) => {
                self.on_detached(DetachReason::DraggedAway);
                p
            }
        };

        self.main.set_bounds(layout.monitor_at_logical(pointer).rect);
        self.main.set_animated_target(target);
        self.reposition_satellites();
    }

    pub fn release(&mut self, windows: &dyn WindowSystem, layout: &MonitorLayout) {
        if self.grab_offset.take().is_none() {
            return;
        }

        if self.hook.is_hooked() {
            self.hook.recapture_anchor(layout, self.main.target());
        } else if let Some(attachment) = self.hook.discover(windows, layout, self.main.target_rect()) {
            self.on_attached(attachment);
        }

        self.events.push(CompanionEvent::PositionSettled(self.main.target()));
    }

    /// Fixed-step integration of every visible actor. Returns whether
    /// anything moved.
    pub fn physics_tick(&mut self, layout: &MonitorLayout) -> bool {
        let mut moved = false;

        // Confined to the monitor the actor is heading for
        let bounds = layout.monitor_at_logical(self.main.target_rect().center()).rect;
        self.main.set_bounds(bounds);
        moved |= matches!(self.main.tick(), TickOutcome::Moved(_));

        for satellite in self.satellites.iter_mut() {
            if !satellite.is_visible() {
                continue;
            }
            let actor = satellite.actor_mut();
            let bounds = layout.monitor_at_logical(actor.target_rect().center()).rect;
            actor.set_bounds(bounds);
            moved |= matches!(actor.tick(), TickOutcome::Moved(_));
        }

        moved
    }

    /// Hook maintenance poll; suspended while dragging or selecting
    pub fn maintenance_tick(&mut self, windows: &dyn WindowSystem, layout: &MonitorLayout) {
        if self.is_dragging() || self.roi.is_selecting() {
            return;
        }

        match self.hook.maintain(windows, layout) {
            MaintainOutcome::Idle | MaintainOutcome::Unchanged => {}
            MaintainOutcome::Moved { target, roi } => {
                self.main.set_animated_target(target);
                self.reposition_satellites();
                if let Some(roi) = roi {
                    if self.satellites.highlight.is_visible() {
                        self.satellites.place_highlight(roi);
                    }
                }
            }
            MaintainOutcome::Detached(reason) => self.on_detached(reason),
        }
    }

    /// Run deferred actions that are due at `now_ms`
    pub fn run_deferred(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        let (due, pending): (Vec<Deferred>, Vec<Deferred>) =
            std::mem::take(&mut self.deferred).into_iter().partition(|d| d.due_ms <= now_ms);
        self.deferred = pending;

        for deferred in due {
            match deferred.action {
                DeferredAction::HideStatus { generation } => {
                    if generation != self.satellites.status.generation() {
                        debug!(generation, "Dropping stale status hide");
                        continue;
                    }
                    self.satellites.status.hide();
                }
                DeferredAction::ResetStatus => self.perform_reset_status(),
            }
        }
    }

    /// Trigger from a hotkey, signal or IPC client: re-run the existing ROI
    /// or start a selection
    pub fn request_reprocess(&mut self) {
        match self.roi.request_repeat(self.hook.hooked(), self.processing) {
            ReprocessAction::Ignored => {
                debug!(hooked = self.hook.is_hooked(), processing = self.processing, "Ignoring reprocess request");
            }
            ReprocessAction::CancelSelection => self.cancel_selection(),
            ReprocessAction::Repeat(rect) => {
                self.processing = true;
                self.show_status(messages::READING_AGAIN, 0);
                self.events.push(CompanionEvent::AreaSelected(rect));
            }
            ReprocessAction::BeginSelection => {
                if let Some(hooked) = self.hook.hooked_mut() {
                    hooked.roi = None;
                }
                self.satellites.highlight.hide();
                self.show_status(messages::SELECTING, 0);
                self.main_visible = false;
                self.roi.begin_selection();
                self.events.push(CompanionEvent::SelectionRequested);
            }
        }
    }

    /// The selection surface finished with `selection` in global logical
    /// coordinates
    pub fn complete_selection(&mut self, selection: Rect<Logical>, layout: &MonitorLayout) {
        if !self.roi.is_selecting() {
            return;
        }
        let outcome = self.roi.complete_selection(selection, self.hook.hooked_mut(), layout);
        self.main_visible = true;
        self.events.push(CompanionEvent::SelectionClosed);

        match outcome {
            SelectionOutcome::Created(rect) => {
                info!(x = rect.x, y = rect.y, width = rect.width, height = rect.height, "Area selected");
                self.processing = true;
                self.show_status(messages::READING, 0);
                self.satellites.place_highlight(selection);
                self.satellites.highlight.show();
                self.events.push(CompanionEvent::AreaSelected(rect));
                self.emit_hook_changed();
            }
            SelectionOutcome::Cancelled => self.reset_status(),
        }
    }

    pub fn cancel_selection(&mut self) {
        if !self.roi.is_selecting() {
            return;
        }
        debug!("Selection cancelled");
        self.roi.cancel();
        self.main_visible = true;
        self.events.push(CompanionEvent::SelectionClosed);
        self.reset_status();
    }

    /// Transient notification; `duration_ms == 0` keeps it until replaced
    pub fn show_status(&mut self, text: &str, duration_ms: u64) {
        self.satellites.status.set_text(text);
        self.layout.position(
            &mut self.satellites,
            SatelliteRole::Status,
            self.main.target_rect(),
            self.hook.edge(),
        );
        self.satellites.status.show();

        if duration_ms > 0 {
            self.deferred.push(Deferred {
                due_ms: self.now_ms + duration_ms,
                action: DeferredAction::HideStatus {
                    generation: self.satellites.status.generation(),
                },
            });
        }
    }

    /// Re-evaluate the status hint shortly
    pub fn reset_status(&mut self) {
        self.deferred.retain(|d| d.action != DeferredAction::ResetStatus);
        self.deferred.push(Deferred {
            due_ms: self.now_ms + STATUS_RESET_DELAY_MS,
            action: DeferredAction::ResetStatus,
        });
    }

    fn perform_reset_status(&mut self) {
        if self.processing || self.roi.is_selecting() {
            return;
        }
        if self.hook.is_hooked() {
            self.show_status(messages::HOOKED_HINT, 0);
        } else {
            self.satellites.status.hide();
        }
    }

    pub fn show_result(&mut self, text: &str) {
        self.satellites.result.set_text(text);
        self.layout.position(
            &mut self.satellites,
            SatelliteRole::Result,
            self.main.target_rect(),
            self.hook.edge(),
        );
        self.satellites.result.show();
    }

    pub fn hide_result(&mut self) {
        self.satellites.result.hide();
        // Status may have been stacked past the result
        self.reposition_satellites();
    }

    /// The capture collaborator finished with the last emitted area
    pub fn processing_complete(&mut self) {
        self.processing = false;
        self.reset_status();
    }

    pub fn set_physics_params(&mut self, params: PhysicsParams) {
        info!(
            spring = params.spring_constant,
            damping = params.damping_factor,
            bounce = params.bounce_damping,
            "Updating physics parameters"
        );
        self.main.set_params(params);
        for satellite in self.satellites.iter_mut() {
            satellite.actor_mut().set_params(params);
        }
    }

    /// Hot-swap thresholds, layout, widget size and physics
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.hook.set_settings(settings.hook.clone());
        self.layout.set_settings(settings.layout.clone());
        self.main.set_size(Size::new(settings.widget.width, settings.widget.height));
        self.set_physics_params(settings.physics);
        self.reposition_satellites();
    }

    fn reposition_satellites(&mut self) {
        self.layout
            .reposition_visible(&mut self.satellites, self.main.target_rect(), self.hook.edge());
    }

    fn on_attached(&mut self, attachment: Attachment) {
        self.main.set_animated_target(attachment.target);
        self.satellites.status.hide();
        self.satellites.highlight.hide();
        self.reposition_satellites();
        self.reset_status();
        self.emit_hook_changed();
    }

    fn on_detached(&mut self, reason: DetachReason) {
        debug!(%reason, "Handling detach");
        self.main.nudge(0.0, UNHOOK_POP_VELOCITY);
        self.satellites.highlight.hide();
        self.show_status(messages::UNHOOKED, UNHOOK_NOTICE_MS);
        self.emit_hook_changed();
    }

    fn emit_hook_changed(&mut self) {
        self.events.push(CompanionEvent::HookChanged(self.hook.summary()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::fake::FakeWindowSystem;
    use crate::monitor::MonitorDescriptor;

    fn layout() -> MonitorLayout {
        MonitorLayout::single(Rect::new(0.0, 0.0, 2560.0, 1440.0), 1.0)
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.widget.width = 50.0;
        settings.widget.height = 50.0;
        settings
    }

    fn companion() -> Companion {
        Companion::new(&settings(), Point::new(100.0, 100.0), 1)
    }

    /// Drag the actor by its top-left corner and drop it at `to`
    fn drag_and_drop(companion: &mut Companion, ws: &FakeWindowSystem, to: Point<Logical>) {
        let layout = layout();
        let from = companion.main().current();
        companion.press(from);
        companion.drag_to(to, &layout);
        companion.release(ws, &layout);
    }

    fn hooked_companion(ws: &FakeWindowSystem) -> Companion {
        ws.push(7, "firefox", Rect::new(50.0, 160.0, 800.0, 600.0));
        let mut companion = companion();
        drag_and_drop(&mut companion, ws, Point::new(100.0, 100.0));
        assert!(companion.hook().is_hooked());
        companion.drain_events();
        companion
    }

    #[test]
    fn test_release_near_window_hooks() {
        let ws = FakeWindowSystem::new();
        ws.push(7, "firefox", Rect::new(50.0, 160.0, 800.0, 600.0));
        let mut companion = companion();

        drag_and_drop(&mut companion, &ws, Point::new(100.0, 102.0));

        assert!(companion.hook().is_hooked());
        assert_eq!(companion.main().target(), Point::new(100.0, 110.0));
        let events = companion.drain_events();
        assert!(events.iter().any(|e| matches!(e, CompanionEvent::HookChanged(s) if s.hooked)));
        assert!(events.contains(&CompanionEvent::PositionSettled(Point::new(100.0, 110.0))));

        // Hint appears after the deferred reset
        companion.run_deferred(STATUS_RESET_DELAY_MS);
        assert!(companion.satellites().status.is_visible());
        assert_eq!(companion.satellites().status.text(), messages::HOOKED_HINT);
    }

    #[test]
    fn test_release_far_from_windows_stays_free() {
        let ws = FakeWindowSystem::new();
        ws.push(7, "firefox", Rect::new(50.0, 600.0, 800.0, 600.0));
        let mut companion = companion();
        drag_and_drop(&mut companion, &ws, Point::new(120.0, 140.0));
        assert!(!companion.hook().is_hooked());
        assert_eq!(companion.main().target(), Point::new(120.0, 140.0));
    }

    #[test]
    fn test_maintenance_follows_window_and_satellites() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);
        let layout = layout();
        companion.show_result("text");

        ws.move_to(7, Rect::new(250.0, 460.0, 800.0, 600.0));
        companion.maintenance_tick(&ws, &layout);

        assert_eq!(companion.main().target(), Point::new(300.0, 410.0));
        let result = companion.satellites().result.actor().target_rect();
        assert_eq!(result.top(), 410.0 + 50.0 + 5.0);
    }

    #[test]
    fn test_drag_onto_second_monitor_crosses_over() {
        let ws = FakeWindowSystem::new();
        let layout = MonitorLayout::new(vec![
            MonitorDescriptor::from_physical("DP-1", Rect::new(0.0, 0.0, 1920.0, 1080.0), 1.0, true),
            MonitorDescriptor::from_physical("DP-2", Rect::new(1920.0, 0.0, 1920.0, 1080.0), 1.0, false),
        ]);
        let mut companion = Companion::new(&settings(), Point::new(1000.0, 500.0), 1);

        companion.press(Point::new(1000.0, 500.0));
        companion.drag_to(Point::new(2500.0, 500.0), &layout);
        companion.release(&ws, &layout);
        for _ in 0..2000 {
            companion.physics_tick(&layout);
        }

        assert!(companion.main().current().x > 1920.0);
        assert!((companion.main().current().x - 2500.0).abs() < 1.0);
    }

    #[test]
    fn test_maintenance_paused_while_dragging() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);
        companion.press(companion.main().current());
        ws.destroy(7);
        companion.maintenance_tick(&ws, &layout());
        assert!(companion.hook().is_hooked());
    }

    #[test]
    fn test_window_close_detaches_with_notice() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);

        ws.destroy(7);
        companion.maintenance_tick(&ws, &layout());

        assert!(!companion.hook().is_hooked());
        assert_eq!(companion.main().velocity().y, UNHOOK_POP_VELOCITY);
        assert_eq!(companion.satellites().status.text(), messages::UNHOOKED);
        assert!(companion.satellites().status.is_visible());

        companion.run_deferred(UNHOOK_NOTICE_MS);
        assert!(!companion.satellites().status.is_visible());
    }

    #[test]
    fn test_drag_past_unhook_distance_detaches() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);
        let layout = layout();

        let start = companion.main().current();
        companion.press(start);
        companion.drag_to(start.offset(30.0, 20.0), &layout);
        assert!(companion.hook().is_hooked());
        assert_eq!(companion.main().target().y, 110.0);

        // Bottom edge now 60 px past the window top
        companion.drag_to(start.offset(30.0, 70.0), &layout);
        assert!(!companion.hook().is_hooked());
        assert_eq!(companion.main().target(), start.offset(30.0, 70.0));
    }

    #[test]
    fn test_selection_and_repeat_flow() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);
        let layout = layout();

        companion.request_reprocess();
        assert!(companion.is_selecting());
        assert!(!companion.is_main_visible());
        assert_eq!(companion.drain_events(), vec![CompanionEvent::SelectionRequested]);

        let selection = Rect::new(200.0, 300.0, 120.0, 40.0);
        companion.complete_selection(selection, &layout);
        assert!(companion.is_main_visible());
        assert!(companion.is_processing());
        assert!(companion.satellites().highlight.is_visible());
        let events = companion.drain_events();
        assert!(events.contains(&CompanionEvent::AreaSelected(Rect::new(200.0, 300.0, 120.0, 40.0))));

        // Busy: further triggers are ignored
        companion.request_reprocess();
        assert!(companion.drain_events().is_empty());

        companion.processing_complete();
        companion.request_reprocess();
        assert_eq!(
            companion.drain_events(),
            vec![CompanionEvent::AreaSelected(Rect::new(200.0, 300.0, 120.0, 40.0))]
        );
    }

    #[test]
    fn test_roi_follows_window() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);
        let layout = layout();
        companion.request_reprocess();
        companion.complete_selection(Rect::new(200.0, 300.0, 120.0, 40.0), &layout);
        companion.processing_complete();

        ws.move_to(7, Rect::new(150.0, 160.0, 800.0, 600.0));
        companion.maintenance_tick(&ws, &layout);
        assert_eq!(companion.satellites().highlight.actor().target(), Point::new(300.0, 300.0));

        companion.drain_events();
        companion.request_reprocess();
        assert_eq!(
            companion.drain_events(),
            vec![CompanionEvent::AreaSelected(Rect::new(300.0, 300.0, 120.0, 40.0))]
        );
    }

    #[test]
    fn test_reprocess_while_selecting_cancels() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);
        companion.request_reprocess();
        companion.drain_events();

        companion.request_reprocess();
        assert!(!companion.is_selecting());
        assert!(companion.is_main_visible());
        assert_eq!(companion.drain_events(), vec![CompanionEvent::SelectionClosed]);
    }

    #[test]
    fn test_tiny_selection_emits_nothing() {
        let ws = FakeWindowSystem::new();
        let mut companion = hooked_companion(&ws);
        companion.request_reprocess();
        companion.drain_events();

        companion.complete_selection(Rect::new(10.0, 10.0, 3.0, 3.0), &layout());
        assert_eq!(companion.drain_events(), vec![CompanionEvent::SelectionClosed]);
        assert!(!companion.is_processing());
        assert!(companion.hook().hooked().unwrap().roi.is_none());
    }

    #[test]
    fn test_reprocess_ignored_when_unhooked() {
        let mut companion = companion();
        companion.request_reprocess();
        assert!(!companion.is_selecting());
        assert!(companion.drain_events().is_empty());
    }

    #[test]
    fn test_newer_status_survives_stale_hide() {
        let mut companion = companion();
        companion.run_deferred(1000);
        companion.show_status("first", 500);
        companion.show_status("second", 0);
        companion.run_deferred(2000);
        assert!(companion.satellites().status.is_visible());
        assert_eq!(companion.satellites().status.text(), "second");
    }

    #[test]
    fn test_reset_status_hides_when_unhooked() {
        let mut companion = companion();
        companion.show_status("hello", 0);
        companion.reset_status();
        companion.run_deferred(STATUS_RESET_DELAY_MS - 1);
        assert!(companion.satellites().status.is_visible());
        companion.run_deferred(STATUS_RESET_DELAY_MS);
        assert!(!companion.satellites().status.is_visible());
    }

    #[test]
    fn test_secondary_click_dismisses_result() {
        let mut companion = companion();
        companion.show_result("text");
        companion.secondary_click();
        assert!(!companion.satellites().result.is_visible());
        assert_eq!(companion.main().velocity().y, GRAB_POP_VELOCITY);
    }

    #[test]
    fn test_set_physics_params_reaches_every_actor() {
        let mut companion = companion();
        let params = PhysicsParams {
            spring_constant: 0.3,
            damping_factor: 0.4,
            bounce_damping: 0.1,
        };
        companion.set_physics_params(params);
        assert_eq!(companion.main().params(), params);
        assert!(companion.satellites().iter().all(|s| s.actor().params() == params));
    }
}
