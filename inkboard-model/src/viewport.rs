// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The canvas↔screen transform and zoom helpers.

use inkboard_geom::{Mat33, Rect2, Vec2};

use crate::event::EventDispatcher;

/// Viewport event kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ViewportEventKind {
    /// The canvas→screen transform changed.
    ViewportChanged,
}

/// Payload of [`ViewportEventKind::ViewportChanged`].
#[derive(Clone, Copy, Debug)]
pub struct ViewportChange {
    /// The transform before the update.
    pub old_transform: Mat33,
    /// The transform after the update.
    pub new_transform: Mat33,
}

/// Maps between canvas space and screen space.
///
/// The inverse transform is re-derived on every update; a non-invertible
/// update is discarded with a warning and replaced by the identity.
pub struct Viewport {
    screen_rect: Rect2,
    canvas_to_screen: Mat33,
    screen_to_canvas: Mat33,
    events: EventDispatcher<ViewportEventKind, ViewportChange>,
}

impl Viewport {
    /// Creates a viewport over `screen_rect` with an identity transform.
    pub fn new(screen_rect: Rect2) -> Self {
        Viewport {
            screen_rect,
            canvas_to_screen: Mat33::IDENTITY,
            screen_to_canvas: Mat33::IDENTITY,
            events: EventDispatcher::new(),
        }
    }

    /// The event bus for transform changes.
    pub fn events(&self) -> &EventDispatcher<ViewportEventKind, ViewportChange> {
        &self.events
    }

    /// The visible screen rectangle (screen coordinates).
    #[inline]
    pub fn screen_rect(&self) -> Rect2 {
        self.screen_rect
    }

    /// Updates the screen rectangle (e.g. on window resize).
    pub fn set_screen_rect(&mut self, rect: Rect2) {
        self.screen_rect = rect;
    }

    /// The canvas→screen transform.
    #[inline]
    pub fn canvas_to_screen_transform(&self) -> &Mat33 {
        &self.canvas_to_screen
    }

    /// The screen→canvas transform.
    #[inline]
    pub fn screen_to_canvas_transform(&self) -> &Mat33 {
        &self.screen_to_canvas
    }

    /// Replaces the canvas→screen transform.
    ///
    /// Singular transforms are discarded: the viewport resets to the
    /// identity and the event still fires so observers can re-render.
    pub fn reset_transform(&mut self, transform: Mat33) {
        let old = self.canvas_to_screen;
        match transform.inverse() {
            Ok(inverse) => {
                self.canvas_to_screen = transform;
                self.screen_to_canvas = inverse;
            }
            Err(_) => {
                log::warn!("discarding a non-invertible viewport transform");
                self.canvas_to_screen = Mat33::IDENTITY;
                self.screen_to_canvas = Mat33::IDENTITY;
            }
        }

        let change = ViewportChange {
            old_transform: old,
            new_transform: self.canvas_to_screen,
        };
        self.events
            .dispatch(ViewportEventKind::ViewportChanged, &change);
    }

    /// Applies a canvas-space update: the region `update` maps into the
    /// current visible rect becomes the new visible content.
    pub fn apply_canvas_transform(&mut self, update: Mat33) {
        self.reset_transform(self.canvas_to_screen.right_mul(&update));
    }

    /// Maps a canvas point to screen space.
    #[inline]
    pub fn canvas_to_screen(&self, p: Vec2) -> Vec2 {
        self.canvas_to_screen.transform_point(p)
    }

    /// Maps a screen point to canvas space.
    #[inline]
    pub fn screen_to_canvas(&self, p: Vec2) -> Vec2 {
        self.screen_to_canvas.transform_point(p)
    }

    /// The canvas-space region currently visible.
    pub fn visible_rect(&self) -> Rect2 {
        self.screen_rect
            .transformed_bounding_box(&self.screen_to_canvas)
    }

    /// How many screen pixels one canvas unit occupies.
    pub fn scale_factor(&self) -> f64 {
        self.canvas_to_screen.scale_factor()
    }

    /// Computes a transform that places `rect` inside the center 4/5 of
    /// the visible area.
    ///
    /// Zooms out when `rect` is larger than the current window, zooms in
    /// when it occupies less than a third of it, then translates to
    /// center. A singular result is discarded and replaced with the
    /// identity, with a warning.
    pub fn zoom_to(&self, rect: Rect2, allow_zoom_in: bool, allow_zoom_out: bool) -> Mat33 {
        let visible = self.visible_rect();
        if rect.w <= 0.0 || rect.h <= 0.0 || visible.w <= 0.0 || visible.h <= 0.0 {
            log::warn!("zoom_to: degenerate target or viewport, ignoring");
            return Mat33::IDENTITY;
        }

        let target_fraction = 4.0 / 5.0;
        let mut scale = 1.0;

        let too_big = rect.w > visible.w || rect.h > visible.h;
        let too_small = rect.w < visible.w / 3.0 && rect.h < visible.h / 3.0;
        if (too_big && allow_zoom_out) || (too_small && allow_zoom_in) {
            scale = (visible.w * target_fraction / rect.w)
                .min(visible.h * target_fraction / rect.h);
        }

        let scaled = Mat33::scaling_2d(scale, rect.center());
        let translate = Mat33::translation(visible.center() - rect.center());
        let update = translate.right_mul(&scaled);

        // The viewport applies updates in canvas space; verify the final
        // transform stays invertible.
        let candidate = self.canvas_to_screen.right_mul(&update);
        if update.inverse().is_err() || candidate.inverse().is_err() {
            log::warn!("zoom_to: produced a singular transform, ignoring");
            return Mat33::IDENTITY;
        }

        update
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_geom::FuzzyEq;

    #[test]
    fn transforms_stay_mutually_inverse() {
        let mut viewport = Viewport::new(Rect2::new(0.0, 0.0, 800.0, 600.0));
        viewport.reset_transform(
            Mat33::translation(Vec2::new(13.0, -7.0))
                .right_mul(&Mat33::scaling_2d(2.5, Vec2::ZERO)),
        );

        let p = Vec2::new(17.0, 23.0);
        let roundtrip = viewport.screen_to_canvas(viewport.canvas_to_screen(p));
        assert!((roundtrip - p).length() < 1e-9);
    }

    #[test]
    fn singular_transform_resets_to_identity() {
        let mut viewport = Viewport::default();
        viewport.reset_transform(Mat33::new(
            0.0, 0.0, 0.0,
            0.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
        ));
        assert!(viewport.canvas_to_screen_transform().is_identity());
    }

    #[test]
    fn viewport_change_event_carries_old_and_new() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut viewport = Viewport::default();
        let seen: Rc<RefCell<Vec<ViewportChange>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = Rc::clone(&seen);
            viewport
                .events()
                .subscribe(ViewportEventKind::ViewportChanged, move |change| {
                    seen.borrow_mut().push(*change);
                });
        }

        let new = Mat33::translation(Vec2::new(5.0, 5.0));
        viewport.reset_transform(new);

        let changes = seen.borrow();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].old_transform.is_identity());
        assert!(changes[0].new_transform.fuzzy_eq(&new));
    }

    #[test]
    fn zoom_to_centers_small_targets() {
        let viewport = Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
        let target = Rect2::new(1000.0, 1000.0, 10.0, 10.0);
        let update = viewport.zoom_to(target, true, true);

        // After applying the update in canvas space, the target's center
        // should land at the viewport center.
        let mapped = update.transform_point(target.center());
        assert!((mapped - Vec2::new(300.0, 300.0)).length() < 1e-6);

        // It zoomed in: the target should now fill a large part of the
        // window.
        let mapped_rect = target.transformed_bounding_box(&update);
        assert!(mapped_rect.w > 300.0 && mapped_rect.w <= 600.0);
    }

    #[test]
    fn zoom_to_respects_flags() {
        let viewport = Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
        let small = Rect2::new(0.0, 0.0, 10.0, 10.0);
        let update = viewport.zoom_to(small, false, true);
        // Zoom-in denied: pure translation.
        let size_before = small.size();
        let size_after = small.transformed_bounding_box(&update).size();
        assert!((size_after - size_before).length() < 1e-9);
    }
}
