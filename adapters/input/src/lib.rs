#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pointer adapter translating screen-space input into ground-plane positions.

use std::cell::Cell;

use bastion_core::Cursor;
use glam::{Vec2, Vec3};
use serde::Deserialize;

/// World position reported while no pointer is over the viewport.
///
/// It snaps to a cell far outside any grid, so placement queries see an
/// invalid position rather than a stale one.
pub const OFF_GRID: Vec3 = Vec3::new(f32::MAX, 0.0, f32::MAX);

/// Top-down orthographic camera looking at the ground plane.
///
/// Screen x grows towards world +x and screen y grows towards world +z. The
/// viewport centre looks at `focus`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraProjection {
    /// Viewport size in pixels.
    pub viewport: Vec2,
    /// World units covered by one pixel.
    pub world_per_pixel: f32,
    /// Ground-plane point under the viewport centre.
    pub focus: Vec3,
}

impl CameraProjection {
    /// Creates a projection centred on `focus`.
    #[must_use]
    pub const fn new(viewport: Vec2, world_per_pixel: f32, focus: Vec3) -> Self {
        Self {
            viewport,
            world_per_pixel,
            focus,
        }
    }

    /// Reports whether the pixel lies inside the viewport.
    #[must_use]
    pub fn contains(&self, screen: Vec2) -> bool {
        screen.x >= 0.0
            && screen.y >= 0.0
            && screen.x < self.viewport.x
            && screen.y < self.viewport.y
    }

    /// Projects a pixel onto the ground plane.
    ///
    /// Returns `None` for a degenerate scale.
    #[must_use]
    pub fn screen_to_world(&self, screen: Vec2) -> Option<Vec3> {
        if self.world_per_pixel <= f32::EPSILON {
            return None;
        }
        let offset = (screen - self.viewport * 0.5) * self.world_per_pixel;
        Some(Vec3::new(
            self.focus.x + offset.x,
            self.focus.y,
            self.focus.z + offset.y,
        ))
    }

    /// Projects a ground-plane point back to pixels. Height is ignored.
    #[must_use]
    pub fn world_to_screen(&self, world: Vec3) -> Option<Vec2> {
        if self.world_per_pixel <= f32::EPSILON {
            return None;
        }
        let offset = Vec2::new(world.x - self.focus.x, world.z - self.focus.z);
        Some(offset / self.world_per_pixel + self.viewport * 0.5)
    }
}

impl Default for CameraProjection {
    fn default() -> Self {
        Self::new(Vec2::new(1280.0, 720.0), 1.0 / 40.0, Vec3::new(8.0, 0.0, 8.0))
    }
}

/// Cursor driven by a screen-space pointer that may leave the window.
#[derive(Debug)]
pub struct PointerCursor {
    camera: CameraProjection,
    pointer: Cell<Option<Vec2>>,
}

impl PointerCursor {
    /// Creates a cursor with no pointer over the viewport.
    #[must_use]
    pub fn new(camera: CameraProjection) -> Self {
        Self {
            camera,
            pointer: Cell::new(None),
        }
    }

    /// Camera used for projection.
    #[must_use]
    pub const fn camera(&self) -> &CameraProjection {
        &self.camera
    }

    /// Pointer pixel, when one is over the viewport.
    #[must_use]
    pub fn pointer(&self) -> Option<Vec2> {
        self.pointer.get()
    }

    /// Moves the pointer. Pixels outside the viewport count as leaving it.
    pub fn move_to(&self, screen: Vec2) {
        if self.camera.contains(screen) {
            self.pointer.set(Some(screen));
        } else {
            tracing::trace!(x = screen.x, y = screen.y, "pointer outside the viewport");
            self.pointer.set(None);
        }
    }

    /// Moves the pointer onto the pixel above a world point.
    ///
    /// Returns `false` when the point is not visible.
    pub fn move_over(&self, world: Vec3) -> bool {
        match self.camera.world_to_screen(world) {
            Some(screen) if self.camera.contains(screen) => {
                self.pointer.set(Some(screen));
                true
            }
            _ => {
                self.pointer.set(None);
                false
            }
        }
    }

    /// Removes the pointer from the viewport.
    pub fn leave(&self) {
        self.pointer.set(None);
    }
}

impl Cursor for PointerCursor {
    fn world_position(&self) -> Vec3 {
        self.pointer
            .get()
            .and_then(|screen| self.camera.screen_to_world(screen))
            .unwrap_or(OFF_GRID)
    }
}
