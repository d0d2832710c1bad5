//! X11 surfaces that render the companion's actors
//!
//! Every actor is an override-redirect window so the window manager never
//! frames, moves or stacks it. Panels draw their wrapped text with the core
//! `fixed` font; the highlight is four thin strips so the region it frames
//! stays clickable.

use anyhow::{Context, Result};
use tracing::{debug, error};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::companion::Companion;
use crate::constants::panel::{LINE_HEIGHT, PADDING};
use crate::constants::selection::FRAME_THICKNESS;
use crate::constants::x11;
use crate::monitor::MonitorLayout;
use crate::physics::FloatingActor;
use crate::satellite::{wrap_lines, SatelliteWindow};
use crate::types::{Physical, Rect};
use crate::x11_utils::AppContext;

/// The core font shared by every text panel
pub struct PanelFont<'a> {
    pub font: Font,
    conn: &'a RustConnection,
}

impl<'a> PanelFont<'a> {
    pub fn open(conn: &'a RustConnection) -> Result<Self> {
        let font = conn.generate_id().context("Failed to generate ID for panel font")?;
        conn.open_font(font, x11::PANEL_FONT)
            .context("Failed to open core font 'fixed'")?;
        Ok(Self { font, conn })
    }
}

impl Drop for PanelFont<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.close_font(self.font) {
            error!(font = self.font, error = %e, "Failed to close panel font");
        }
    }
}

/// One override-redirect window, optionally holding text
pub struct Surface<'a> {
    pub window: Window,
    name: &'static str,
    gc: Gcontext,
    geometry: Option<(i32, i32, u32, u32)>,
    visible: bool,
    lines: Vec<String>,
    /// Physical px per logical px the text was laid out for
    text_scale: f64,
    conn: &'a RustConnection,
}

impl<'a> Surface<'a> {
    pub fn new(
        ctx: &AppContext<'a>,
        name: &'static str,
        background: u32,
        font: Option<&PanelFont>,
        event_mask: EventMask,
    ) -> Result<Self> {
        let window = ctx.conn.generate_id()
            .context(format!("Failed to generate X11 window ID for {} surface", name))?;
        ctx.conn.create_window(
            ctx.screen.root_depth,
            window,
            ctx.screen.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            ctx.screen.root_visual,
            &CreateWindowAux::new()
                .background_pixel(background)
                .override_redirect(x11::OVERRIDE_REDIRECT)
                .event_mask(event_mask),
        )
        .context(format!("Failed to create {} surface window", name))?;

        ctx.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            x11::WM_CLASS,
        )
        .context(format!("Failed to set WM_CLASS for {} surface", name))?;

        let gc = ctx.conn.generate_id()
            .context(format!("Failed to generate ID for {} graphics context", name))?;
        let mut gc_aux = CreateGCAux::new()
            .foreground(x11::PANEL_TEXT_PIXEL)
            .background(background);
        if let Some(font) = font {
            gc_aux = gc_aux.font(font.font);
        }
        ctx.conn.create_gc(gc, window, &gc_aux)
            .context(format!("Failed to create graphics context for {} surface", name))?;

        debug!(surface = name, window, "Created surface");
        Ok(Self {
            window,
            name,
            gc,
            geometry: None,
            visible: false,
            lines: Vec::new(),
            text_scale: 1.0,
            conn: ctx.conn,
        })
    }

    pub fn set_geometry(&mut self, rect: Rect<Physical>) -> Result<()> {
        let (x, y, width, height) = rect.rounded();
        let geometry = (x, y, width.max(1), height.max(1));
        if self.geometry == Some(geometry) {
            return Ok(());
        }
        let resized = self.geometry.is_none_or(|(_, _, w, h)| (w, h) != (geometry.2, geometry.3));
        self.geometry = Some(geometry);

        self.conn.configure_window(
            self.window,
            &ConfigureWindowAux::new()
                .x(geometry.0)
                .y(geometry.1)
                .width(geometry.2)
                .height(geometry.3),
        )
        .context(format!("Failed to move {} surface to {:?}", self.name, rect))?;

        if resized && !self.lines.is_empty() {
            self.redraw()?;
        }
        Ok(())
    }

    pub fn set_visible(&mut self, visible: bool) -> Result<()> {
        if visible == self.visible {
            return Ok(());
        }
        self.visible = visible;
        if visible {
            self.conn.map_window(self.window)
                .context(format!("Failed to map {} surface", self.name))?;
            self.conn.configure_window(
                self.window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )
            .context(format!("Failed to raise {} surface", self.name))?;
        } else {
            self.conn.unmap_window(self.window)
                .context(format!("Failed to unmap {} surface", self.name))?;
        }
        Ok(())
    }

    /// Replace the text; redraws only when it actually changed
    pub fn set_lines(&mut self, lines: Vec<String>, text_scale: f64) -> Result<()> {
        if lines == self.lines && text_scale == self.text_scale {
            return Ok(());
        }
        self.lines = lines;
        self.text_scale = text_scale;
        self.redraw()
    }

    /// Repaint the background and text, e.g. after an Expose
    pub fn redraw(&self) -> Result<()> {
        if !self.visible {
            return Ok(());
        }
        self.conn.clear_area(false, self.window, 0, 0, 0, 0)
            .context(format!("Failed to clear {} surface", self.name))?;
        for (index, line) in self.lines.iter().enumerate() {
            let (x, y) = text_origin(index, self.text_scale);
            self.conn.image_text8(self.window, self.gc, x, y, &latin1(line))
                .context(format!("Failed to draw text on {} surface", self.name))?;
        }
        Ok(())
    }
}

impl Drop for Surface<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.free_gc(self.gc) {
            error!("Failed to free GC {}: {}", self.gc, e);
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!("Failed to destroy {} surface window {}: {}", self.name, self.window, e);
        }
    }
}

/// Baseline origin of text line `index`, in physical px within the panel
fn text_origin(index: usize, scale: f64) -> (i16, i16) {
    let x = PADDING * scale;
    // Baselines sit one line height below each line's top
    let y = (PADDING + LINE_HEIGHT * (index as f64 + 1.0)) * scale - 2.0;
    (x.round() as i16, y.round() as i16)
}

/// Encode for an 8-bit core font; each request carries at most 255 bytes
fn latin1(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .take(usize::from(u8::MAX))
        .collect()
}

/// Top, bottom, left and right strips of a `thickness`-px frame
pub fn frame_strips(rect: Rect<Physical>, thickness: f64) -> [Rect<Physical>; 4] {
    let t = thickness.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    [
        Rect::new(rect.x, rect.y, rect.width, t),
        Rect::new(rect.x, rect.bottom() - t, rect.width, t),
        Rect::new(rect.x, rect.y + t, t, rect.height - 2.0 * t),
        Rect::new(rect.right() - t, rect.y + t, t, rect.height - 2.0 * t),
    ]
}

/// A hollow rectangle built from four strip windows
pub struct FrameSurface<'a> {
    strips: [Surface<'a>; 4],
}

impl<'a> FrameSurface<'a> {
    pub fn new(ctx: &AppContext<'a>, name: &'static str) -> Result<Self> {
        let strip = || Surface::new(ctx, name, x11::FRAME_PIXEL, None, EventMask::NO_EVENT);
        Ok(Self {
            strips: [strip()?, strip()?, strip()?, strip()?],
        })
    }

    pub fn set_rect(&mut self, rect: Rect<Physical>) -> Result<()> {
        for (strip, strip_rect) in self.strips.iter_mut().zip(frame_strips(rect, f64::from(FRAME_THICKNESS))) {
            strip.set_geometry(strip_rect)?;
        }
        Ok(())
    }

    pub fn set_visible(&mut self, visible: bool) -> Result<()> {
        for strip in &mut self.strips {
            strip.set_visible(visible)?;
        }
        Ok(())
    }
}

/// Mirrors the companion's actors onto X11 surfaces once per frame
pub struct Renderer<'a> {
    main: Surface<'a>,
    status: Surface<'a>,
    result: Surface<'a>,
    highlight: FrameSurface<'a>,
    // Declared last so it outlives the GCs that reference it
    _font: PanelFont<'a>,
}

impl<'a> Renderer<'a> {
    pub fn new(ctx: &AppContext<'a>) -> Result<Self> {
        let font = PanelFont::open(ctx.conn)?;
        let panel_events = EventMask::EXPOSURE | EventMask::BUTTON_PRESS;
        Ok(Self {
            main: Surface::new(
                ctx,
                "main",
                x11::MAIN_PIXEL,
                None,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
            )?,
            status: Surface::new(ctx, "status", x11::PANEL_BACKGROUND_PIXEL, Some(&font), panel_events)?,
            result: Surface::new(ctx, "result", x11::PANEL_BACKGROUND_PIXEL, Some(&font), panel_events)?,
            highlight: FrameSurface::new(ctx, "highlight")?,
            _font: font,
        })
    }

    pub fn main_window(&self) -> Window {
        self.main.window
    }

    pub fn result_window(&self) -> Window {
        self.result.window
    }

    pub fn handle_expose(&self, window: Window) -> Result<()> {
        if window == self.status.window {
            self.status.redraw()
        } else if window == self.result.window {
            self.result.redraw()
        } else {
            Ok(())
        }
    }

    /// Push every actor's current position, visibility and text to X
    pub fn sync(&mut self, companion: &Companion, layout: &MonitorLayout) -> Result<()> {
        let main = companion.main();
        self.main.set_geometry(physical_rect(main, layout))?;
        self.main.set_visible(companion.is_main_visible())?;

        let satellites = companion.satellites();
        sync_panel(&mut self.status, &satellites.status, layout)?;
        sync_panel(&mut self.result, &satellites.result, layout)?;

        let highlight = &satellites.highlight;
        if highlight.is_visible() {
            self.highlight.set_rect(physical_rect(highlight.actor(), layout))?;
        }
        self.highlight.set_visible(highlight.is_visible())?;
        Ok(())
    }
}

fn physical_rect(actor: &FloatingActor, layout: &MonitorLayout) -> Rect<Physical> {
    let rect = actor.rect();
    layout.to_physical_rect(rect, rect.center())
}

fn sync_panel(surface: &mut Surface, panel: &SatelliteWindow, layout: &MonitorLayout) -> Result<()> {
    if panel.is_visible() {
        let actor = panel.actor();
        let ratio = layout.monitor_at_logical(actor.rect().center()).ratio;
        surface.set_geometry(physical_rect(actor, layout))?;
        surface.set_visible(true)?;
        surface.set_lines(wrap_lines(panel.text(), actor.size().width), ratio)?;
    } else {
        surface.set_visible(false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_strips_cover_border_only() {
        let [top, bottom, left, right] = frame_strips(Rect::new(10.0, 20.0, 100.0, 50.0), 2.0);
        assert_eq!(top, Rect::new(10.0, 20.0, 100.0, 2.0));
        assert_eq!(bottom, Rect::new(10.0, 68.0, 100.0, 2.0));
        assert_eq!(left, Rect::new(10.0, 22.0, 2.0, 46.0));
        assert_eq!(right, Rect::new(108.0, 22.0, 2.0, 46.0));
    }

    #[test]
    fn test_frame_strips_on_tiny_rect() {
        let strips = frame_strips(Rect::new(0.0, 0.0, 3.0, 3.0), 2.0);
        for strip in strips {
            assert!(strip.width >= 0.0 && strip.height >= 0.0);
        }
    }

    #[test]
    fn test_latin1_replaces_wide_chars_and_truncates() {
        assert_eq!(latin1("café ✓"), vec![b'c', b'a', b'f', 0xe9, b' ', b'?']);
        assert_eq!(latin1(&"x".repeat(400)).len(), 255);
    }

    #[test]
    fn test_text_origin_scales() {
        assert_eq!(text_origin(0, 1.0), (8, 19));
        assert_eq!(text_origin(1, 2.0), (16, 66));
    }
}
