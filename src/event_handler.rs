use anyhow::Result;
use tracing::debug;
use x11rb::protocol::Event;

use crate::companion::Companion;
use crate::constants::mouse;
use crate::hook::WindowSystem;
use crate::monitor::MonitorLayout;
use crate::selection::{SelectionEvent, SelectionOverlay};
use crate::surface::Renderer;
use crate::types::{Logical, Physical, Point};

/// Whether the caller needs to re-query monitors after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Done,
    MonitorsChanged,
}

/// Everything an X event may act on
pub struct EventTargets<'r, 'a> {
    pub companion: &'r mut Companion,
    pub renderer: &'r Renderer<'a>,
    pub overlay: &'r mut SelectionOverlay<'a>,
    pub windows: &'r dyn WindowSystem,
    pub layout: &'r MonitorLayout,
}

pub fn handle_event(event: Event, targets: &mut EventTargets) -> Result<Handled> {
    if let Event::Expose(e) = &event {
        if e.count == 0 {
            targets.renderer.handle_expose(e.window)?;
        }
        return Ok(Handled::Done);
    }
    if let Event::RandrScreenChangeNotify(_) = &event {
        debug!("Screen configuration changed");
        return Ok(Handled::MonitorsChanged);
    }

    if targets.overlay.is_open() {
        match targets.overlay.handle_event(&event)? {
            Some(SelectionEvent::Finished(rect)) => {
                let logical = targets.layout.to_logical_rect(rect, rect.center());
                targets.companion.complete_selection(logical, targets.layout);
            }
            Some(SelectionEvent::Cancelled) => targets.companion.cancel_selection(),
            None => {}
        }
        return Ok(Handled::Done);
    }

    let main = targets.renderer.main_window();
    match event {
        Event::ButtonPress(e) if e.event == main => match e.detail {
            mouse::BUTTON_LEFT => {
                let pointer = logical_pointer(targets.layout, e.root_x, e.root_y);
                targets.companion.press(pointer);
            }
            mouse::BUTTON_RIGHT => targets.companion.secondary_click(),
            _ => {}
        },
        Event::MotionNotify(e) if e.event == main => {
            let pointer = logical_pointer(targets.layout, e.root_x, e.root_y);
            targets.companion.drag_to(pointer, targets.layout);
        }
        Event::ButtonRelease(e) if e.event == main && e.detail == mouse::BUTTON_LEFT => {
            targets.companion.release(targets.windows, targets.layout);
        }
        // Clicking the result panel dismisses it
        Event::ButtonPress(e) if e.event == targets.renderer.result_window() => {
            targets.companion.hide_result();
        }
        _ => {}
    }
    Ok(Handled::Done)
}

fn logical_pointer(layout: &MonitorLayout, x: i16, y: i16) -> Point<Logical> {
    let physical: Point<Physical> = Point::new(x.into(), y.into());
    layout.to_logical_point(physical, physical)
}
