//! Per-monitor coordinate normalization
//!
//! Converts between physical and logical pixels using the device-pixel-ratio
//! of whichever monitor contains the caller's reference point. Ratios are
//! never cached globally: a window spanning two monitors with different
//! ratios is converted with the ratio valid at the reference point the
//! caller chose.
//!
//! Each monitor keeps its top-left corner in both spaces and scales distances
//! from that corner, so logical monitor rectangles stay disjoint when ratios
//! differ.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::constants::monitor::{FALLBACK_HEIGHT, FALLBACK_WIDTH};
use crate::types::{Logical, Physical, Point, Rect};

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorDescriptor {
    pub name: String,
    /// Monitor bounds in logical pixels
    pub rect: Rect<Logical>,
    /// Physical pixels per logical pixel
    pub ratio: f64,
    pub primary: bool,
}

impl MonitorDescriptor {
    /// Build a descriptor from the physical bounds the X server reports
    pub fn from_physical(name: impl Into<String>, physical: Rect<Physical>, ratio: f64, primary: bool) -> Self {
        let ratio = sanitize_ratio(ratio);
        Self {
            name: name.into(),
            rect: Rect::new(
                physical.x,
                physical.y,
                physical.width / ratio,
                physical.height / ratio,
            ),
            ratio,
            primary,
        }
    }

    pub fn physical_rect(&self) -> Rect<Physical> {
        Rect::new(
            self.rect.x,
            self.rect.y,
            self.rect.width * self.ratio,
            self.rect.height * self.ratio,
        )
    }

    pub fn to_logical(&self, p: Point<Physical>) -> Point<Logical> {
        Point::new(
            self.rect.x + (p.x - self.rect.x) / self.ratio,
            self.rect.y + (p.y - self.rect.y) / self.ratio,
        )
    }

    pub fn to_physical(&self, p: Point<Logical>) -> Point<Physical> {
        Point::new(
            self.rect.x + (p.x - self.rect.x) * self.ratio,
            self.rect.y + (p.y - self.rect.y) * self.ratio,
        )
    }
}

fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        warn!(ratio, "Invalid device pixel ratio, using 1.0");
        1.0
    }
}

/// The set of monitors currently attached, with a guaranteed primary
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorLayout {
    monitors: Vec<MonitorDescriptor>,
    primary: usize,
}

impl MonitorLayout {
    /// An empty list falls back to a single unscaled monitor so geometry
    /// queries always have an answer.
    pub fn new(mut monitors: Vec<MonitorDescriptor>) -> Self {
        if monitors.is_empty() {
            warn!("No monitors reported, assuming a single {FALLBACK_WIDTH}x{FALLBACK_HEIGHT} display");
            monitors.push(MonitorDescriptor::from_physical(
                "fallback",
                Rect::new(0.0, 0.0, FALLBACK_WIDTH, FALLBACK_HEIGHT),
                1.0,
                true,
            ));
        }
        let primary = monitors.iter().position(|m| m.primary).unwrap_or(0);
        Self { monitors, primary }
    }

    pub fn single(rect: Rect<Physical>, ratio: f64) -> Self {
        Self::new(vec![MonitorDescriptor::from_physical("default", rect, ratio, true)])
    }

    pub fn monitors(&self) -> &[MonitorDescriptor] {
        &self.monitors
    }

    pub fn primary(&self) -> &MonitorDescriptor {
        &self.monitors[self.primary]
    }

    pub fn monitor_at_logical(&self, p: Point<Logical>) -> &MonitorDescriptor {
        self.monitors
            .iter()
            .find(|m| m.rect.contains(p))
            .unwrap_or_else(|| self.primary())
    }

    pub fn monitor_at_physical(&self, p: Point<Physical>) -> &MonitorDescriptor {
        self.monitors
            .iter()
            .find(|m| m.physical_rect().contains(p))
            .unwrap_or_else(|| self.primary())
    }

    pub fn to_logical_point(&self, p: Point<Physical>, reference: Point<Physical>) -> Point<Logical> {
        self.monitor_at_physical(reference).to_logical(p)
    }

    pub fn to_physical_point(&self, p: Point<Logical>, reference: Point<Logical>) -> Point<Physical> {
        self.monitor_at_logical(reference).to_physical(p)
    }

    pub fn to_logical_rect(&self, r: Rect<Physical>, reference: Point<Physical>) -> Rect<Logical> {
        let monitor = self.monitor_at_physical(reference);
        Rect::from_origin_size(
            monitor.to_logical(r.top_left()),
            crate::types::Size::new(r.width / monitor.ratio, r.height / monitor.ratio),
        )
    }

    pub fn to_physical_rect(&self, r: Rect<Logical>, reference: Point<Logical>) -> Rect<Physical> {
        let monitor = self.monitor_at_logical(reference);
        Rect::from_origin_size(
            monitor.to_physical(r.top_left()),
            crate::types::Size::new(r.width * monitor.ratio, r.height * monitor.ratio),
        )
    }

    /// Stable identifier of the monitor arrangement, used to key saved
    /// positions so the widget resumes near its last spot per layout.
    pub fn config_hash(&self) -> String {
        let mut sorted: Vec<&MonitorDescriptor> = self.monitors.iter().collect();
        sorted.sort_by(|a, b| {
            a.rect
                .x
                .total_cmp(&b.rect.x)
                .then(a.rect.y.total_cmp(&b.rect.y))
        });
        let description = sorted
            .iter()
            .map(|m| {
                let (x, y, w, h) = m.physical_rect().rounded();
                format!("{}:{x},{y},{w},{h}", m.name)
            })
            .collect::<Vec<_>>()
            .join(";");

        let digest = Sha256::digest(description.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}
