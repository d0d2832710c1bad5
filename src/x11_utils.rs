use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::cookie::Cookie;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::protocol::xproto::*;
use x11rb::protocol::ErrorKind;
use x11rb::rust_connection::RustConnection;

use crate::config::MonitorSettings;
use crate::constants::{paths, x11};
use crate::hook::{GeometryError, WindowHandle, WindowInfo, WindowSystem};
use crate::monitor::{MonitorDescriptor, MonitorLayout};
use crate::types::{Physical, Rect};

/// Application context holding immutable shared state
pub struct AppContext<'a> {
    pub conn: &'a RustConnection,
    pub screen: &'a Screen,
    pub atoms: &'a CachedAtoms,
}

impl<'a> AppContext<'a> {
    pub fn window_system(&self) -> X11WindowSystem<'a> {
        X11WindowSystem {
            conn: self.conn,
            root: self.screen.root,
            atoms: self.atoms,
        }
    }
}

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub wm_name: Atom,
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
    pub net_wm_pid: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_hidden: Atom,
    pub net_client_list_stacking: Atom,
    pub net_frame_extents: Atom,
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            wm_name: intern(conn, "WM_NAME")?,
            net_wm_name: intern(conn, "_NET_WM_NAME")?,
            utf8_string: intern(conn, "UTF8_STRING")?,
            net_wm_pid: intern(conn, "_NET_WM_PID")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_hidden: intern(conn, "_NET_WM_STATE_HIDDEN")?,
            net_client_list_stacking: intern(conn, "_NET_CLIENT_LIST_STACKING")?,
            net_frame_extents: intern(conn, "_NET_FRAME_EXTENTS")?,
        })
    }
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .context(format!("Failed to intern {} atom", name))?
        .reply()
        .context(format!("Failed to get reply for {} atom", name))?
        .atom)
}

/// [`WindowSystem`] backed by EWMH properties on a live X connection
pub struct X11WindowSystem<'a> {
    conn: &'a RustConnection,
    root: Window,
    atoms: &'a CachedAtoms,
}

/// Every request describing one window, sent before any reply is awaited
struct PendingInfo<'c> {
    handle: WindowHandle,
    pid: Cookie<'c, RustConnection, GetPropertyReply>,
    net_wm_name: Cookie<'c, RustConnection, GetPropertyReply>,
    wm_name: Cookie<'c, RustConnection, GetPropertyReply>,
    geometry: Cookie<'c, RustConnection, GetGeometryReply>,
    origin: Cookie<'c, RustConnection, TranslateCoordinatesReply>,
    extents: Cookie<'c, RustConnection, GetPropertyReply>,
    attributes: Cookie<'c, RustConnection, GetWindowAttributesReply>,
    state: Cookie<'c, RustConnection, GetPropertyReply>,
}

impl PendingInfo<'_> {
    fn resolve(self, atoms: &CachedAtoms) -> Result<WindowInfo, GeometryError> {
        let handle = self.handle;
        let reply_err = |e| reply_error(handle, e);

        let pid = decode_pid(handle, &self.pid.reply().map_err(reply_err)?)?;
        let title = decode_title(
            &self.net_wm_name.reply().map_err(reply_err)?,
            &self.wm_name.reply().map_err(reply_err)?,
        );
        let geometry = self.geometry.reply().map_err(reply_err)?;
        let origin = self.origin.reply().map_err(reply_err)?;
        let extents = self.extents.reply().map_err(reply_err)?;
        let attributes = self.attributes.reply().map_err(reply_err)?;
        let state = self.state.reply().map_err(reply_err)?;

        Ok(WindowInfo {
            handle,
            title,
            pid,
            process_name: pid.and_then(process_name),
            rect: outer_rect(
                origin.dst_x.into(),
                origin.dst_y.into(),
                geometry.width.into(),
                geometry.height.into(),
                &frame_extents(&extents),
            ),
            visible: attributes.map_state == MapState::VIEWABLE
                && !has_state(&state, atoms.net_wm_state_hidden),
        })
    }
}

impl<'a> X11WindowSystem<'a> {
    fn request_property(
        &self,
        handle: WindowHandle,
        property: Atom,
        type_: impl Into<Atom>,
        length: u32,
    ) -> Result<Cookie<'a, RustConnection, GetPropertyReply>, GeometryError> {
        self.conn
            .get_property(false, handle, property, type_, 0, length)
            .map_err(backend_error)
    }

    fn property(
        &self,
        handle: WindowHandle,
        property: Atom,
        type_: impl Into<Atom>,
        length: u32,
    ) -> Result<GetPropertyReply, GeometryError> {
        self.request_property(handle, property, type_, length)?
            .reply()
            .map_err(|e| reply_error(handle, e))
    }

    /// Client windows from bottom to top of the stack
    fn stacking_order(&self) -> Result<Vec<WindowHandle>, GeometryError> {
        let reply = self.property(self.root, self.atoms.net_client_list_stacking, AtomEnum::WINDOW, u32::MAX)?;
        Ok(reply.value32().map(|v| v.collect()).unwrap_or_default())
    }

    fn request_info(&self, handle: WindowHandle) -> Result<PendingInfo<'a>, GeometryError> {
        let atoms = self.atoms;
        Ok(PendingInfo {
            handle,
            pid: self.request_property(handle, atoms.net_wm_pid, AtomEnum::CARDINAL, 1)?,
            net_wm_name: self.request_property(handle, atoms.net_wm_name, atoms.utf8_string, x11::TITLE_PROPERTY_LENGTH)?,
            wm_name: self.request_property(handle, atoms.wm_name, AtomEnum::ANY, x11::TITLE_PROPERTY_LENGTH)?,
            geometry: self.conn.get_geometry(handle).map_err(backend_error)?,
            origin: self.conn.translate_coordinates(handle, self.root, 0, 0).map_err(backend_error)?,
            extents: self.request_property(handle, atoms.net_frame_extents, AtomEnum::CARDINAL, 4)?,
            attributes: self.conn.get_window_attributes(handle).map_err(backend_error)?,
            state: self.request_property(handle, atoms.net_wm_state, AtomEnum::ATOM, 64)?,
        })
    }
}

impl WindowSystem for X11WindowSystem<'_> {
    /// One snapshot: all requests for every window go out before the first
    /// reply is read, so a scan costs a single round trip
    fn list_top_level_windows(&self) -> Result<Vec<WindowInfo>, GeometryError> {
        let pending = self
            .stacking_order()?
            .into_iter()
            .map(|handle| self.request_info(handle))
            .collect::<Result<Vec<_>, _>>()?;

        let mut windows = Vec::with_capacity(pending.len());
        for info in pending {
            let handle = info.handle;
            match info.resolve(self.atoms) {
                Ok(info) => windows.push(info),
                // Windows routinely vanish between listing and querying
                Err(e) => debug!(window = handle, error = %e, "Skipping window"),
            }
        }
        Ok(windows)
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<Rect<Physical>, GeometryError> {
        let geometry = self.conn.get_geometry(handle).map_err(backend_error)?;
        let origin = self
            .conn
            .translate_coordinates(handle, self.root, 0, 0)
            .map_err(backend_error)?;
        let extents = self.request_property(handle, self.atoms.net_frame_extents, AtomEnum::CARDINAL, 4)?;

        let geometry = geometry.reply().map_err(|e| reply_error(handle, e))?;
        let origin = origin.reply().map_err(|e| reply_error(handle, e))?;
        let extents = extents.reply().map_err(|e| reply_error(handle, e))?;

        Ok(outer_rect(
            origin.dst_x.into(),
            origin.dst_y.into(),
            geometry.width.into(),
            geometry.height.into(),
            &frame_extents(&extents),
        ))
    }

    fn is_window_visible(&self, handle: WindowHandle) -> Result<bool, GeometryError> {
        let attributes = self.conn.get_window_attributes(handle).map_err(backend_error)?;
        let state = self.request_property(handle, self.atoms.net_wm_state, AtomEnum::ATOM, 64)?;

        let attributes = attributes.reply().map_err(|e| reply_error(handle, e))?;
        let state = state.reply().map_err(|e| reply_error(handle, e))?;
        Ok(attributes.map_state == MapState::VIEWABLE && !has_state(&state, self.atoms.net_wm_state_hidden))
    }
}

fn decode_pid(handle: WindowHandle, reply: &GetPropertyReply) -> Result<Option<u32>, GeometryError> {
    if reply.value.len() < x11::PID_PROPERTY_SIZE {
        return Ok(None);
    }
    let bytes: [u8; x11::PID_PROPERTY_SIZE] = reply.value[..x11::PID_PROPERTY_SIZE]
        .try_into()
        .map_err(|_| GeometryError::Query {
            handle,
            message: "malformed _NET_WM_PID".to_string(),
        })?;
    Ok(Some(u32::from_ne_bytes(bytes)))
}

/// `_NET_WM_NAME`, falling back to the legacy `WM_NAME`
fn decode_title(utf8: &GetPropertyReply, legacy: &GetPropertyReply) -> String {
    let value = if utf8.value.is_empty() { &legacy.value } else { &utf8.value };
    String::from_utf8_lossy(value).into_owned()
}

fn frame_extents(reply: &GetPropertyReply) -> Vec<u32> {
    reply.value32().map(|v| v.collect()).unwrap_or_default()
}

fn has_state(reply: &GetPropertyReply, atom: Atom) -> bool {
    reply.value32().is_some_and(|mut atoms| atoms.any(|a| a == atom))
}

fn backend_error(e: ConnectionError) -> GeometryError {
    GeometryError::Backend(e.to_string())
}

fn reply_error(handle: WindowHandle, e: ReplyError) -> GeometryError {
    match e {
        ReplyError::X11Error(err) if matches!(err.error_kind, ErrorKind::Window | ErrorKind::Drawable) => {
            GeometryError::WindowGone(handle)
        }
        ReplyError::ConnectionError(err) => backend_error(err),
        other => GeometryError::Query {
            handle,
            message: other.to_string(),
        },
    }
}

/// Client rectangle grown by `_NET_FRAME_EXTENTS` (left, right, top, bottom)
fn outer_rect(x: f64, y: f64, width: f64, height: f64, extents: &[u32]) -> Rect<Physical> {
    let [left, right, top, bottom] = match extents {
        [l, r, t, b, ..] => [*l, *r, *t, *b].map(f64::from),
        _ => [0.0; 4],
    };
    Rect::new(x - left, y - top, width + left + right, height + top + bottom)
}

fn process_name(pid: u32) -> Option<String> {
    let path = Path::new(paths::PROC_DIR).join(pid.to_string()).join(paths::COMM_FILE);
    fs::read_to_string(path)
        .ok()
        .map(|comm| normalize_process_name(&comm))
        .filter(|name| !name.is_empty())
}

fn normalize_process_name(comm: &str) -> String {
    comm.trim().to_lowercase()
}

/// Query RandR monitors, applying configured per-output scales. Falls back to
/// the root window as one monitor when RandR is unavailable.
pub fn query_monitors(conn: &RustConnection, screen: &Screen, settings: &MonitorSettings) -> MonitorLayout {
    match randr_monitors(conn, screen.root, settings) {
        Ok(monitors) if !monitors.is_empty() => MonitorLayout::new(monitors),
        Ok(_) => {
            warn!("RandR reported no monitors, using root window bounds");
            root_layout(screen, settings)
        }
        Err(e) => {
            warn!(error = %e, "RandR monitor query failed, using root window bounds");
            root_layout(screen, settings)
        }
    }
}

fn randr_monitors(conn: &RustConnection, root: Window, settings: &MonitorSettings) -> Result<Vec<MonitorDescriptor>> {
    // GetMonitors needs RandR 1.5 to be announced first
    let version = conn
        .randr_query_version(1, 5)
        .context("Failed to query RandR version")?
        .reply()
        .context("Failed to get reply for RandR version query")?;
    debug!(major = version.major_version, minor = version.minor_version, "RandR version");

    let reply = conn
        .randr_get_monitors(root, true)
        .context("Failed to query RandR monitors")?
        .reply()
        .context("Failed to get reply for RandR monitors query")?;

    let mut monitors = Vec::with_capacity(reply.monitors.len());
    for info in reply.monitors {
        let name = conn
            .get_atom_name(info.name)
            .context(format!("Failed to query name of monitor atom {}", info.name))?
            .reply()
            .context(format!("Failed to get reply for monitor atom {}", info.name))?
            .name;
        let name = String::from_utf8_lossy(&name).into_owned();
        let ratio = settings.scale_for(&name);
        let rect = Rect::new(info.x.into(), info.y.into(), info.width.into(), info.height.into());
        debug!(monitor = %name, rect = ?rect, ratio, primary = info.primary, "Discovered monitor");
        monitors.push(MonitorDescriptor::from_physical(name, rect, ratio, info.primary));
    }
    Ok(monitors)
}

fn root_layout(screen: &Screen, settings: &MonitorSettings) -> MonitorLayout {
    let rect = Rect::new(
        0.0,
        0.0,
        screen.width_in_pixels.into(),
        screen.height_in_pixels.into(),
    );
    MonitorLayout::single(rect, settings.default_scale)
}

/// Keycode producing Escape, if the keyboard has one
pub fn escape_keycode(conn: &RustConnection) -> Result<Option<Keycode>> {
    let setup = conn.setup();
    let min = setup.min_keycode;
    let count = setup.max_keycode.saturating_sub(min).saturating_add(1);
    let mapping = conn
        .get_keyboard_mapping(min, count)
        .context("Failed to query keyboard mapping")?
        .reply()
        .context("Failed to get reply for keyboard mapping")?;
    Ok(find_keycode(min, mapping.keysyms_per_keycode, &mapping.keysyms, x11::XK_ESCAPE))
}

fn find_keycode(min_keycode: Keycode, per_keycode: u8, keysyms: &[Keysym], wanted: Keysym) -> Option<Keycode> {
    if per_keycode == 0 {
        return None;
    }
    let index = keysyms.iter().position(|&k| k == wanted)?;
    let offset = index / usize::from(per_keycode);
    Keycode::try_from(usize::from(min_keycode) + offset).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outer_rect_adds_frame_extents() {
        let rect = outer_rect(100.0, 50.0, 800.0, 600.0, &[2, 2, 30, 4]);
        assert_eq!(rect, Rect::new(98.0, 20.0, 804.0, 634.0));
    }

    #[test]
    fn test_outer_rect_without_extents() {
        let rect = outer_rect(10.0, 20.0, 300.0, 200.0, &[]);
        assert_eq!(rect, Rect::new(10.0, 20.0, 300.0, 200.0));
    }

    #[test]
    fn test_find_keycode() {
        // Two keysyms per keycode starting at 8: keycode 9 holds Escape
        let keysyms = [0x61, 0x41, x11::XK_ESCAPE, 0, 0x62, 0x42];
        assert_eq!(find_keycode(8, 2, &keysyms, x11::XK_ESCAPE), Some(9));
        assert_eq!(find_keycode(8, 2, &keysyms, 0xffff), None);
        assert_eq!(find_keycode(8, 0, &keysyms, x11::XK_ESCAPE), None);
    }

    #[test]
    fn test_process_name_normalized() {
        assert_eq!(normalize_process_name("Firefox\n"), "firefox");
    }
}
