//! Spring-damper integrator for floating actors
//!
//! Every on-screen actor (the main widget and each satellite panel) eases
//! toward its target with the same fixed-step spring model:
//!
//! ```text
//! force    = (target - current) * spring - velocity * damping
//! velocity += force
//! current  += velocity
//! ```
//!
//! The step is unitless (one call per 16 ms tick). For damping in (0, 2) and
//! spring in (0, 4 - 2 * damping) the system is stable; the settings layer
//! clamps coefficients well inside that region.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::physics::SETTLE_EPSILON;
use crate::types::{Logical, Point, Rect, Size};

/// Spring coefficients, hot-swappable at runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    #[serde(default = "default_spring_constant")]
    pub spring_constant: f64,
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f64,
    /// Fraction of velocity kept (and reversed) on hitting a monitor edge
    #[serde(default = "default_bounce_damping")]
    pub bounce_damping: f64,
}

fn default_spring_constant() -> f64 {
    0.1
}

fn default_damping_factor() -> f64 {
    0.55
}

fn default_bounce_damping() -> f64 {
    0.3
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            spring_constant: default_spring_constant(),
            damping_factor: default_damping_factor(),
            bounce_damping: default_bounce_damping(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing visible changed this tick
    Settled,
    /// The actor moved to this position
    Moved(Point<Logical>),
}

#[derive(Debug, Clone)]
pub struct FloatingActor {
    current: Point<Logical>,
    target: Point<Logical>,
    velocity: Point<Logical>,
    size: Size,
    params: PhysicsParams,
    /// Keep the actor inside `bounds`, bouncing off its edges
    pub constrain_to_monitor: bool,
    bounds: Option<Rect<Logical>>,
}

impl FloatingActor {
    pub fn new(position: Point<Logical>, size: Size, params: PhysicsParams) -> Self {
        Self {
            current: position,
            target: position,
            velocity: Point::zero(),
            size,
            params,
            constrain_to_monitor: true,
            bounds: None,
        }
    }

    pub fn current(&self) -> Point<Logical> {
        self.current
    }

    pub fn target(&self) -> Point<Logical> {
        self.target
    }

    pub fn velocity(&self) -> Point<Logical> {
        self.velocity
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn params(&self) -> PhysicsParams {
        self.params
    }

    /// Where the actor is drawn right now
    pub fn rect(&self) -> Rect<Logical> {
        Rect::from_origin_size(self.current, self.size)
    }

    /// Where the actor will come to rest
    pub fn target_rect(&self) -> Rect<Logical> {
        Rect::from_origin_size(self.target, self.size)
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    pub fn set_params(&mut self, params: PhysicsParams) {
        self.params = params;
    }

    /// Monitor rectangle used for edge collisions
    pub fn set_bounds(&mut self, bounds: Rect<Logical>) {
        self.bounds = Some(bounds);
    }

    /// Teleport: current = target = `position`, velocity cleared
    pub fn set_target_immediate(&mut self, position: Point<Logical>) {
        self.current = position;
        self.target = position;
        self.velocity = Point::zero();
    }

    /// Let the integrator ease toward `position`
    pub fn set_animated_target(&mut self, position: Point<Logical>) {
        self.target = position;
    }

    pub fn nudge(&mut self, dx: f64, dy: f64) {
        self.velocity = self.velocity.offset(dx, dy);
    }

    pub fn stop(&mut self) {
        self.velocity = Point::zero();
    }

    pub fn is_settled(&self) -> bool {
        (self.target - self.current).manhattan_length() < SETTLE_EPSILON
            && self.velocity.manhattan_length() < SETTLE_EPSILON
    }

    /// Advance one fixed step
    pub fn tick(&mut self) -> TickOutcome {
        if self.is_settled() {
            return TickOutcome::Settled;
        }

        let last_good = self.current;
        let force = (self.target - self.current).scale(self.params.spring_constant)
            - self.velocity.scale(self.params.damping_factor);
        self.velocity = self.velocity + force;
        self.current = self.current + self.velocity;

        if !self.current.is_finite() || !self.velocity.is_finite() {
            warn!(
                current = ?self.current,
                target = ?self.target,
                "Numeric instability in actor integration, resetting velocity"
            );
            self.current = last_good;
            self.velocity = Point::zero();
            if !self.target.is_finite() {
                self.target = last_good;
            }
            return TickOutcome::Settled;
        }

        if self.constrain_to_monitor {
            if let Some(bounds) = self.bounds {
                self.bounce_off(bounds);
            }
        }

        TickOutcome::Moved(self.current)
    }

    fn bounce_off(&mut self, bounds: Rect<Logical>) {
        let bounce = self.params.bounce_damping;

        if self.current.x < bounds.left() {
            self.current.x = bounds.left();
            self.velocity.x = -self.velocity.x * bounce;
        } else if self.current.x + self.size.width > bounds.right() {
            self.current.x = bounds.right() - self.size.width;
            self.velocity.x = -self.velocity.x * bounce;
        }

        if self.current.y < bounds.top() {
            self.current.y = bounds.top();
            self.velocity.y = -self.velocity.y * bounce;
        } else if self.current.y + self.size.height > bounds.bottom() {
            self.current.y = bounds.bottom() - self.size.height;
            self.velocity.y = -self.velocity.y * bounce;
        }
    }
}
