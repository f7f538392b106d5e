// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint-state evaluation and change tracking.
//!
//! Evaluation walks the stack once from top to bottom:
//!
//! 1. **Bounding**: windows whose geometry or shape changed get their
//!    screen-space bounding shape rebuilt, with and without rounded corners.
//! 2. **Paint state**: every window gets a fresh `to_paint` verdict and a
//!    [`WindowMode`].
//! 3. **Ignore regions**: `reg_ignore` is the union of what the windows
//!    above paint opaquely. It is only recomputed for windows drained from
//!    the [`IGNORE`](crate::dirty::IGNORE) channel; clean windows reuse the
//!    accumulator cached from the previous frame.
//! 4. **Damage**: windows that changed damage both their old and new
//!    extents, shadows included.
//!
//! [`StackChanges`] uses raw slot indices, matching the `*_at()` accessors on
//! [`WindowStack`].

use alloc::vec::Vec;

use super::id::INVALID;
use super::store::WindowStack;
use crate::dirty;
use crate::geom::{Point, Rect};
use crate::region::Region;

/// How a window's pixels combine with what is underneath.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WindowMode {
    /// Fully opaque.
    #[default]
    Solid,
    /// Opaque body with a translucent frame.
    FrameTrans,
    /// Translucent, or has an alpha channel.
    Trans,
}

/// Shadow placement, shared by every window that casts one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShadowGeometry {
    /// Blur radius in pixels.
    pub radius: u32,
    /// Offset of the shadow image's top-left corner from the window origin.
    pub offset: Point,
}

impl ShadowGeometry {
    /// Screen rectangle covered by the shadow of a window at `geometry`.
    #[must_use]
    pub fn rect(self, geometry: Rect) -> Rect {
        let pad = self.radius.saturating_mul(2);
        Rect::from_xywh(
            geometry.x1.saturating_add(self.offset.x),
            geometry.y1.saturating_add(self.offset.y),
            geometry.width().saturating_add(pad),
            geometry.height().saturating_add(pad),
        )
    }
}

/// Frame-wide inputs to evaluation.
///
/// Changing any of these invalidates every window and damages the whole
/// screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StackParams {
    /// Screen rectangle.
    pub screen: Rect,
    /// Shadow geometry, or `None` if shadows are disabled.
    pub shadow: Option<ShadowGeometry>,
    /// Treat translucent windows as opaque for occlusion.
    pub transparent_clipping: bool,
    /// Blend every window as if it were translucent.
    pub force_win_blend: bool,
}

impl StackParams {
    /// Parameters for a screen with no shadows and default blending.
    #[must_use]
    pub fn new(screen: Rect) -> Self {
        Self {
            screen,
            shadow: None,
            transparent_clipping: false,
            force_win_blend: false,
        }
    }
}

/// The set of changes produced by a single [`WindowStack::evaluate`] call.
#[derive(Clone, Debug, Default)]
pub struct StackChanges {
    /// Windows whose geometry, frame or corner radius changed.
    pub geometry: Vec<u32>,
    /// Windows whose opacity changed.
    pub opacity: Vec<u32>,
    /// Windows whose bounding shape changed.
    pub shape: Vec<u32>,
    /// Windows whose surface changed or that reported damage.
    pub content: Vec<u32>,
    /// Windows whose flags changed.
    pub flags: Vec<u32>,
    /// Windows that started being painted.
    pub shown: Vec<u32>,
    /// Windows that stopped being painted.
    pub hidden: Vec<u32>,
    /// Windows added since the last evaluate.
    pub added: Vec<u32>,
    /// Windows removed since the last evaluate.
    pub removed: Vec<u32>,
    /// Whether the stacking order changed.
    pub restacked: bool,
    /// Screen damage produced by this frame's changes, clipped to the screen.
    pub damage: Region,
}

impl StackChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.opacity.clear();
        self.shape.clear();
        self.content.clear();
        self.flags.clear();
        self.shown.clear();
        self.hidden.clear();
        self.added.clear();
        self.removed.clear();
        self.restacked = false;
        self.damage.clear();
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
            && self.opacity.is_empty()
            && self.shape.is_empty()
            && self.content.is_empty()
            && self.flags.is_empty()
            && self.shown.is_empty()
            && self.hidden.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
            && !self.restacked
            && self.damage.is_empty()
    }
}

impl WindowStack {
    /// Evaluates paint state for the whole stack and returns what changed.
    pub fn evaluate(&mut self, params: &StackParams) -> StackChanges {
        let mut changes = StackChanges::default();
        self.evaluate_into(params, &mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided buffer.
    pub fn evaluate_into(&mut self, params: &StackParams, changes: &mut StackChanges) {
        changes.clear();

        let params_changed = self.last_params.as_ref() != Some(params);
        if params_changed {
            self.last_params = Some(*params);
            self.pending_damage.union_with(&Region::from_rect(params.screen));
        }

        changes.geometry = self.drain_local(dirty::GEOMETRY);
        changes.shape = self.drain_local(dirty::SHAPE);
        changes.opacity = self.drain_local(dirty::OPACITY);
        changes.content = self.drain_local(dirty::CONTENT);
        changes.flags = self.drain_local(dirty::FLAGS);
        changes.restacked = !self.drain_local(dirty::STACKING).is_empty();
        let ignore_dirty: Vec<u32> = self
            .dirty
            .drain(dirty::IGNORE)
            .affected()
            .deterministic()
            .run()
            .collect();

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);

        // Slots touched in a way that can move pixels on screen.
        let mut touched = alloc::vec![params_changed; self.len as usize];
        let mut reshaped = alloc::vec![params_changed; self.len as usize];
        for &idx in changes
            .geometry
            .iter()
            .chain(&changes.shape)
            .chain(&changes.added)
        {
            reshaped[idx as usize] = true;
        }
        for &idx in changes
            .geometry
            .iter()
            .chain(&changes.shape)
            .chain(&changes.opacity)
            .chain(&changes.flags)
            .chain(&changes.added)
        {
            touched[idx as usize] = true;
        }
        let mut ignore_stale = alloc::vec![params_changed; self.len as usize];
        for &idx in &ignore_dirty {
            ignore_stale[idx as usize] = true;
        }

        let mut damage = core::mem::take(&mut self.pending_damage);
        let mut acc = Region::new();
        let mut invalid_below = false;
        self.paint_order.clear();

        let mut idx = self.top;
        while idx != INVALID {
            let i = idx as usize;
            if reshaped[i] {
                self.rebuild_bounding(idx);
            }

            let old_to_paint = self.to_paint[i];
            let to_paint = self.compute_to_paint(idx, params);
            self.to_paint[i] = to_paint;
            self.mode[i] = self.compute_mode(idx);
            if to_paint != old_to_paint {
                invalid_below = true;
                if to_paint {
                    changes.shown.push(idx);
                } else {
                    changes.hidden.push(idx);
                }
            }

            if ignore_stale[i] || invalid_below {
                self.reg_ignore[i] = acc.clone();
                if to_paint {
                    let contribution = self.opaque_contribution(idx, params);
                    acc.union_with(&contribution);
                }
                self.ignore_after[i] = acc.clone();
            } else {
                acc.clone_from(&self.ignore_after[i]);
            }

            let extents = if to_paint {
                self.extents(idx, params)
            } else {
                Region::new()
            };
            if touched[i] || to_paint != old_to_paint || (changes.restacked && to_paint) {
                damage.union_with(&self.painted_extents[i]);
                damage.union_with(&extents);
            }
            self.painted_extents[i] = extents;

            if to_paint {
                self.paint_order.push(idx);
            }
            idx = self.below[i];
        }

        let painted = u32::try_from(self.paint_order.len()).unwrap_or(u32::MAX);
        for (rank, &idx) in (0..painted).rev().zip(&self.paint_order) {
            self.stacking_rank[idx as usize] = rank;
        }
        self.coverage = acc;
        changes.damage = damage.intersect_rect(params.screen);
    }

    /// Painted windows from top to bottom, as raw slot indices.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn paint_order(&self) -> &[u32] {
        &self.paint_order
    }

    /// Union of every painted window's opaque region.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn coverage(&self) -> &Region {
        &self.coverage
    }

    /// Screen extents of the window at raw slot `idx`, shadow included, as
    /// of the last evaluate. Empty if the window was not painted.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    #[must_use]
    pub fn painted_extents_at(&self, idx: u32) -> &Region {
        self.check_index(idx);
        &self.painted_extents[idx as usize]
    }

    fn drain_local(&mut self, channel: understory_dirty::Channel) -> Vec<u32> {
        self.dirty.drain(channel).deterministic().run().collect()
    }

    fn rebuild_bounding(&mut self, idx: u32) {
        let i = idx as usize;
        let geometry = self.geometry[i];
        let bounding = match &self.shape[i] {
            Some(shape) => shape
                .translate(geometry.x1, geometry.y1)
                .intersect_rect(geometry),
            None => Region::from_rect(geometry),
        };
        let radius = self.corner_radius[i];
        self.rounded_bounding[i] = if radius == 0 {
            bounding.clone()
        } else {
            bounding.intersect(&Region::from_rounded_rect(geometry, radius))
        };
        self.bounding[i] = bounding;
    }

    fn compute_to_paint(&self, idx: u32, params: &StackParams) -> bool {
        let i = idx as usize;
        let flags = self.flags[i];
        if !flags.mapped || flags.paint_excluded || self.image_error[i] {
            return false;
        }
        if self.surface[i].is_none() || self.bounding[i].is_empty() {
            return false;
        }
        if self.geometry[i].intersect(params.screen).is_empty() {
            return false;
        }
        // Invisible unless it still blurs what is behind it.
        self.opacity[i] * 255.0 >= 1.0 || flags.blur_background
    }

    fn compute_mode(&self, idx: u32) -> WindowMode {
        let i = idx as usize;
        if self.opacity[i] < 1.0 || self.flags[i].has_alpha {
            WindowMode::Trans
        } else if self.frame_opacity[i] < 1.0 && !self.frame_extents[i].is_zero() {
            WindowMode::FrameTrans
        } else {
            WindowMode::Solid
        }
    }

    /// Screen area this window paints opaquely, for the windows below.
    fn opaque_contribution(&self, idx: u32, params: &StackParams) -> Region {
        let i = idx as usize;
        let mode = self.mode[i];
        let blended = mode == WindowMode::Trans || params.force_win_blend;
        if blended && !params.transparent_clipping {
            return Region::new();
        }
        if mode == WindowMode::Solid && !params.force_win_blend {
            return self.rounded_bounding[i].clone();
        }
        let body = self.geometry[i].inset(self.frame_extents[i]);
        let radius = self.corner_radius[i];
        let body = if radius == 0 {
            Region::from_rect(body)
        } else {
            Region::from_rounded_rect(body, radius)
        };
        body.intersect(&self.bounding[i])
    }

    fn extents(&self, idx: u32, params: &StackParams) -> Region {
        let i = idx as usize;
        let mut extents = Region::from_rect(self.bounding[i].extents());
        if let Some(shadow) = params.shadow
            && self.flags[i].shadow
        {
            extents = extents.union_rect(shadow.rect(self.geometry[i]));
        }
        extents
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::geom::Margins;
    use crate::stack::{SurfaceId, WindowFlags, WindowId};

    const SCREEN: Rect = Rect::new(0, 0, 200, 200);

    fn params() -> StackParams {
        StackParams::new(SCREEN)
    }

    fn window(stack: &mut WindowStack, rect: Rect) -> WindowId {
        let id = stack.create_window(rect);
        stack.set_surface(id, Some(SurfaceId(id.index())));
        id
    }

    #[test]
    fn reg_ignore_accumulates_opaque_windows_above() {
        let mut stack = WindowStack::new();
        // Bottom to top: C, B, A.
        let c = window(&mut stack, Rect::new(0, 0, 200, 200));
        let b = window(&mut stack, Rect::new(50, 50, 150, 150));
        let a = window(&mut stack, Rect::new(0, 0, 60, 60));
        let _ = stack.evaluate(&params());

        assert!(stack.reg_ignore(a).is_empty());
        assert_eq!(stack.reg_ignore(b), stack.bounding(a));
        let expected = stack.bounding(a).union(stack.bounding(b));
        assert_eq!(stack.reg_ignore(c), &expected);
    }

    #[test]
    fn translucent_windows_do_not_occlude() {
        let mut stack = WindowStack::new();
        let bottom = window(&mut stack, Rect::new(0, 0, 100, 100));
        let top = window(&mut stack, Rect::new(0, 0, 50, 50));
        stack.set_opacity(top, 0.5);
        let _ = stack.evaluate(&params());

        assert_eq!(stack.mode(top), WindowMode::Trans);
        assert!(stack.reg_ignore(bottom).is_empty());
    }

    #[test]
    fn transparent_clipping_makes_translucent_windows_occlude() {
        let mut stack = WindowStack::new();
        let bottom = window(&mut stack, Rect::new(0, 0, 100, 100));
        let top = window(&mut stack, Rect::new(0, 0, 50, 50));
        stack.set_opacity(top, 0.5);
        let p = StackParams {
            transparent_clipping: true,
            ..params()
        };
        let _ = stack.evaluate(&p);
        assert_eq!(stack.reg_ignore(bottom), &Region::from_rect(Rect::new(0, 0, 50, 50)));
    }

    #[test]
    fn frame_trans_occludes_only_body() {
        let mut stack = WindowStack::new();
        let bottom = window(&mut stack, Rect::new(0, 0, 100, 100));
        let top = window(&mut stack, Rect::new(0, 0, 50, 50));
        stack.set_frame_extents(top, Margins::new(2, 2, 10, 2));
        stack.set_frame_opacity(top, 0.5);
        let _ = stack.evaluate(&params());

        assert_eq!(stack.mode(top), WindowMode::FrameTrans);
        assert_eq!(stack.reg_ignore(bottom), &Region::from_rect(Rect::new(2, 10, 48, 48)));
    }

    #[test]
    fn rounded_corners_are_not_occluding() {
        let mut stack = WindowStack::new();
        let bottom = window(&mut stack, Rect::new(0, 0, 100, 100));
        let top = window(&mut stack, Rect::new(0, 0, 50, 50));
        stack.set_corner_radius(top, 8);
        let _ = stack.evaluate(&params());

        let ignore = stack.reg_ignore(bottom);
        assert!(!ignore.contains_point(0, 0));
        assert!(ignore.contains_point(25, 25));
        assert!(stack.bounding(top).contains_point(0, 0));
    }

    #[test]
    fn unpainted_windows_are_skipped() {
        let mut stack = WindowStack::new();
        let no_surface = stack.create_window(Rect::new(0, 0, 10, 10));
        let unmapped = window(&mut stack, Rect::new(0, 0, 10, 10));
        stack.set_mapped(unmapped, false);
        let offscreen = window(&mut stack, Rect::new(300, 300, 310, 310));
        let invisible = window(&mut stack, Rect::new(0, 0, 10, 10));
        stack.set_opacity(invisible, 0.0);
        let errored = window(&mut stack, Rect::new(0, 0, 10, 10));
        stack.set_image_error(errored, true);
        let _ = stack.evaluate(&params());

        for id in [no_surface, unmapped, offscreen, invisible, errored] {
            assert!(!stack.to_paint(id), "{id:?} should not be painted");
        }
        assert!(stack.paint_order().is_empty());
    }

    #[test]
    fn content_damage_retries_a_failed_window() {
        let mut stack = WindowStack::new();
        let id = window(&mut stack, Rect::new(0, 0, 10, 10));
        stack.set_image_error(id, true);
        let _ = stack.evaluate(&params());
        assert!(!stack.to_paint(id));

        stack.add_damage(id, &Region::from_rect(Rect::new(0, 0, 4, 4)));
        let changes = stack.evaluate(&params());
        assert!(stack.to_paint(id));
        assert!(changes.content.contains(&id.index()));
    }

    #[test]
    fn invisible_window_with_blur_is_painted() {
        let mut stack = WindowStack::new();
        let id = window(&mut stack, Rect::new(0, 0, 10, 10));
        stack.set_opacity(id, 0.0);
        stack.set_flags(
            id,
            WindowFlags {
                mapped: true,
                blur_background: true,
                ..WindowFlags::default()
            },
        );
        let _ = stack.evaluate(&params());
        assert!(stack.to_paint(id));
    }

    #[test]
    fn paint_order_and_ranks() {
        let mut stack = WindowStack::new();
        let a = window(&mut stack, Rect::new(0, 0, 10, 10));
        let hidden = window(&mut stack, Rect::new(0, 0, 10, 10));
        stack.set_mapped(hidden, false);
        let c = window(&mut stack, Rect::new(0, 0, 10, 10));
        let _ = stack.evaluate(&params());

        assert_eq!(stack.paint_order(), &[c.index(), a.index()]);
        assert_eq!(stack.stacking_rank_at(a.index()), 0);
        assert_eq!(stack.stacking_rank_at(c.index()), 1);
    }

    #[test]
    fn clean_evaluate_has_no_damage() {
        let mut stack = WindowStack::new();
        let _a = window(&mut stack, Rect::new(0, 0, 10, 10));
        let first = stack.evaluate(&params());
        assert_eq!(first.damage, Region::from_rect(SCREEN));

        let second = stack.evaluate(&params());
        assert!(second.is_empty());
    }

    #[test]
    fn move_damages_old_and_new_position() {
        let mut stack = WindowStack::new();
        let a = window(&mut stack, Rect::new(0, 0, 10, 10));
        let _ = stack.evaluate(&params());

        stack.set_geometry(a, Rect::new(50, 50, 60, 60));
        let changes = stack.evaluate(&params());
        assert_eq!(changes.geometry, vec![a.index()]);
        let expected = Region::from_rects(&[Rect::new(0, 0, 10, 10), Rect::new(50, 50, 60, 60)]);
        assert_eq!(changes.damage, expected);
    }

    #[test]
    fn shadow_extends_damage() {
        let mut stack = WindowStack::new();
        let a = window(&mut stack, Rect::new(50, 50, 60, 60));
        stack.set_flags(
            a,
            WindowFlags {
                mapped: true,
                shadow: true,
                ..WindowFlags::default()
            },
        );
        let p = StackParams {
            shadow: Some(ShadowGeometry {
                radius: 4,
                offset: Point::new(-6, -6),
            }),
            ..params()
        };
        let _ = stack.evaluate(&p);
        assert_eq!(
            stack.painted_extents_at(a.index()).extents(),
            Rect::new(44, 44, 62, 62)
        );

        stack.set_mapped(a, false);
        let changes = stack.evaluate(&p);
        assert_eq!(changes.hidden, vec![a.index()]);
        assert_eq!(changes.damage.extents(), Rect::new(44, 44, 62, 62));
    }

    #[test]
    fn client_damage_is_translated_and_clipped() {
        let mut stack = WindowStack::new();
        let a = window(&mut stack, Rect::new(20, 20, 40, 40));
        let _ = stack.evaluate(&params());

        stack.add_damage(a, &Region::from_rect(Rect::new(15, 0, 30, 5)));
        let changes = stack.evaluate(&params());
        assert_eq!(changes.content, vec![a.index()]);
        assert_eq!(changes.damage.rects(), &[Rect::new(35, 20, 40, 25)]);
    }

    #[test]
    fn destroy_damages_last_painted_extents() {
        let mut stack = WindowStack::new();
        let a = window(&mut stack, Rect::new(20, 20, 40, 40));
        let _ = stack.evaluate(&params());
        stack.destroy_window(a);
        let changes = stack.evaluate(&params());
        assert_eq!(changes.removed, vec![a.index()]);
        assert_eq!(changes.damage.rects(), &[Rect::new(20, 20, 40, 40)]);
    }

    #[test]
    fn restack_recomputes_ignore_regions() {
        let mut stack = WindowStack::new();
        let a = window(&mut stack, Rect::new(0, 0, 50, 50));
        let b = window(&mut stack, Rect::new(25, 25, 75, 75));
        let _ = stack.evaluate(&params());
        assert_eq!(stack.reg_ignore(a), stack.bounding(b));

        stack.raise(a);
        let changes = stack.evaluate(&params());
        assert!(changes.restacked);
        assert!(stack.reg_ignore(a).is_empty());
        assert_eq!(stack.reg_ignore(b), stack.bounding(a));
    }

    #[test]
    fn opacity_change_below_keeps_upper_cache() {
        let mut stack = WindowStack::new();
        let bottom = window(&mut stack, Rect::new(0, 0, 100, 100));
        let middle = window(&mut stack, Rect::new(10, 10, 40, 40));
        let top = window(&mut stack, Rect::new(50, 50, 80, 80));
        let _ = stack.evaluate(&params());

        stack.set_opacity(middle, 0.5);
        let _ = stack.evaluate(&params());
        assert_eq!(stack.reg_ignore(middle), stack.bounding(top));
        assert_eq!(stack.reg_ignore(bottom), stack.bounding(top));
    }

    #[test]
    fn param_change_damages_screen() {
        let mut stack = WindowStack::new();
        let _a = window(&mut stack, Rect::new(0, 0, 10, 10));
        let _ = stack.evaluate(&params());
        let p = StackParams {
            force_win_blend: true,
            ..params()
        };
        let changes = stack.evaluate(&p);
        assert_eq!(changes.damage, Region::from_rect(SCREEN));
    }

    #[test]
    fn force_win_blend_disables_occlusion() {
        let mut stack = WindowStack::new();
        let bottom = window(&mut stack, Rect::new(0, 0, 100, 100));
        let _top = window(&mut stack, Rect::new(0, 0, 50, 50));
        let p = StackParams {
            force_win_blend: true,
            ..params()
        };
        let _ = stack.evaluate(&p);
        assert!(stack.reg_ignore(bottom).is_empty());
    }

    #[test]
    fn coverage_is_union_of_opaque_windows() {
        let mut stack = WindowStack::new();
        let _a = window(&mut stack, Rect::new(0, 0, 10, 10));
        let _b = window(&mut stack, Rect::new(20, 0, 30, 10));
        let _ = stack.evaluate(&params());
        assert_eq!(
            stack.coverage(),
            &Region::from_rects(&[Rect::new(0, 0, 10, 10), Rect::new(20, 0, 30, 10)])
        );
    }
}
