//! Interactive area selection
//!
//! An input-only window covers the whole root while a selection is open and
//! holds both grabs, so every press, drag and key goes here regardless of
//! what is underneath. A [`FrameSurface`] draws the rubber band.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::constants::mouse;
use crate::constants::selection::CROSSHAIR_GLYPH;
use crate::constants::x11;
use crate::surface::FrameSurface;
use crate::types::{Physical, Point, Rect};
use crate::x11_utils::AppContext;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    Finished(Rect<Physical>),
    Cancelled,
}

/// Press, drag, release bookkeeping in root coordinates
#[derive(Debug, Default)]
pub struct RubberBand {
    anchor: Option<Point<Physical>>,
}

impl RubberBand {
    pub fn press(&mut self, p: Point<Physical>) {
        self.anchor = Some(p);
    }

    /// Current band while the button is held
    pub fn motion(&self, p: Point<Physical>) -> Option<Rect<Physical>> {
        self.anchor.map(|anchor| Rect::from_corners(anchor, p))
    }

    pub fn release(&mut self, p: Point<Physical>) -> Option<Rect<Physical>> {
        self.anchor.take().map(|anchor| Rect::from_corners(anchor, p))
    }

    pub fn reset(&mut self) {
        self.anchor = None;
    }
}

pub struct SelectionOverlay<'a> {
    window: Window,
    cursor: Cursor,
    band: FrameSurface<'a>,
    rubber: RubberBand,
    escape: Option<Keycode>,
    open: bool,
    root: Window,
    conn: &'a RustConnection,
}

impl<'a> SelectionOverlay<'a> {
    pub fn new(ctx: &AppContext<'a>, escape: Option<Keycode>) -> Result<Self> {
        let cursor = create_crosshair(ctx.conn)?;

        let window = ctx.conn.generate_id()
            .context("Failed to generate X11 window ID for selection overlay")?;
        ctx.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            ctx.screen.root,
            0,
            0,
            ctx.screen.width_in_pixels,
            ctx.screen.height_in_pixels,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .override_redirect(x11::OVERRIDE_REDIRECT)
                .event_mask(EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION | EventMask::KEY_PRESS)
                .cursor(cursor),
        )
        .context("Failed to create selection overlay window")?;

        if escape.is_none() {
            warn!("No keycode maps to Escape; cancel a selection with the right button");
        }

        Ok(Self {
            window,
            cursor,
            band: FrameSurface::new(ctx, "rubber band")?,
            rubber: RubberBand::default(),
            escape,
            open: false,
            root: ctx.screen.root,
            conn: ctx.conn,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        // The root may have been resized by RandR since the overlay was built
        let root = self.conn
            .get_geometry(self.root)
            .context("Failed to send root geometry request")?
            .reply()
            .context("Failed to get reply for root geometry")?;
        self.conn.configure_window(self.window, &covering(root.width, root.height))
            .context("Failed to size selection overlay")?;
        self.conn.map_window(self.window)
            .context("Failed to map selection overlay")?;
        self.open = true;
        self.rubber.reset();

        let pointer = self.conn
            .grab_pointer(
                false,
                self.window,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                self.cursor,
                x11rb::CURRENT_TIME,
            )
            .context("Failed to send pointer grab")?
            .reply()
            .context("Failed to get reply for pointer grab")?;
        if pointer.status != GrabStatus::SUCCESS {
            self.close()?;
            anyhow::bail!("Pointer grab refused: {:?}", pointer.status);
        }

        let keyboard = self.conn
            .grab_keyboard(false, self.window, x11rb::CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .context("Failed to send keyboard grab")?
            .reply()
            .context("Failed to get reply for keyboard grab")?;
        if keyboard.status != GrabStatus::SUCCESS {
            // The pointer alone still allows selecting and right-click cancel
            warn!(status = ?keyboard.status, "Keyboard grab refused");
        }

        info!("Selection overlay open");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.rubber.reset();
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)
            .context("Failed to release pointer grab")?;
        self.conn.ungrab_keyboard(x11rb::CURRENT_TIME)
            .context("Failed to release keyboard grab")?;
        self.conn.unmap_window(self.window)
            .context("Failed to unmap selection overlay")?;
        self.band.set_visible(false)?;
        debug!("Selection overlay closed");
        Ok(())
    }

    /// Feed an X event; returns a result once the user finished or cancelled
    pub fn handle_event(&mut self, event: &Event) -> Result<Option<SelectionEvent>> {
        if !self.open {
            return Ok(None);
        }
        match event {
            Event::ButtonPress(e) if e.detail == mouse::BUTTON_LEFT => {
                self.rubber.press(root_point(e.root_x, e.root_y));
            }
            Event::ButtonPress(e) if e.detail == mouse::BUTTON_RIGHT => {
                return Ok(Some(SelectionEvent::Cancelled));
            }
            Event::MotionNotify(e) => {
                if let Some(band) = self.rubber.motion(root_point(e.root_x, e.root_y)) {
                    self.band.set_rect(band)?;
                    self.band.set_visible(true)?;
                }
            }
            Event::ButtonRelease(e) if e.detail == mouse::BUTTON_LEFT => {
                if let Some(rect) = self.rubber.release(root_point(e.root_x, e.root_y)) {
                    self.band.set_visible(false)?;
                    return Ok(Some(SelectionEvent::Finished(rect)));
                }
            }
            Event::KeyPress(e) if Some(e.detail) == self.escape => {
                return Ok(Some(SelectionEvent::Cancelled));
            }
            _ => {}
        }
        Ok(None)
    }
}

impl Drop for SelectionOverlay<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close selection overlay during cleanup");
        }
        if let Err(e) = self.conn.free_cursor(self.cursor) {
            warn!(error = %e, "Failed to free crosshair cursor");
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            warn!(error = %e, "Failed to destroy selection overlay window");
        }
    }
}

/// Place the overlay over the whole root, above everything else
fn covering(width: u16, height: u16) -> ConfigureWindowAux {
    ConfigureWindowAux::new()
        .x(0)
        .y(0)
        .width(u32::from(width))
        .height(u32::from(height))
        .stack_mode(StackMode::ABOVE)
}

fn root_point(x: i16, y: i16) -> Point<Physical> {
    Point::new(x.into(), y.into())
}

fn create_crosshair(conn: &RustConnection) -> Result<Cursor> {
    let font = conn.generate_id().context("Failed to generate ID for cursor font")?;
    conn.open_font(font, x11::CURSOR_FONT)
        .context("Failed to open cursor font")?;
    let cursor = conn.generate_id().context("Failed to generate ID for crosshair cursor")?;
    conn.create_glyph_cursor(
        cursor,
        font,
        font,
        CROSSHAIR_GLYPH,
        CROSSHAIR_GLYPH + 1,
        0,
        0,
        0,
        u16::MAX,
        u16::MAX,
        u16::MAX,
    )
    .context("Failed to create crosshair cursor")?;
    conn.close_font(font).context("Failed to close cursor font")?;
    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rubber_band_normalizes_drag_direction() {
        let mut band = RubberBand::default();
        band.press(Point::new(300.0, 200.0));
        assert_eq!(band.motion(Point::new(250.0, 260.0)), Some(Rect::new(250.0, 200.0, 50.0, 60.0)));
        assert_eq!(band.release(Point::new(100.0, 50.0)), Some(Rect::new(100.0, 50.0, 200.0, 150.0)));
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut band = RubberBand::default();
        assert_eq!(band.motion(Point::new(10.0, 10.0)), None);
        assert_eq!(band.release(Point::new(10.0, 10.0)), None);
    }

    #[test]
    fn test_covering_uses_current_root_size() {
        let aux = covering(3840, 1080);
        assert_eq!((aux.x, aux.y), (Some(0), Some(0)));
        assert_eq!((aux.width, aux.height), (Some(3840), Some(1080)));
        assert_eq!(aux.stack_mode, Some(StackMode::ABOVE));
    }

    #[test]
    fn test_reset_drops_anchor() {
        let mut band = RubberBand::default();
        band.press(Point::new(1.0, 1.0));
        band.reset();
        assert_eq!(band.release(Point::new(9.0, 9.0)), None);
    }
}
