// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays window storage with allocation, stacking, and property management.

use alloc::vec::Vec;

use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use super::evaluate::WindowMode;
use super::id::{INVALID, SurfaceId, WindowId};
use super::iter::StackIter;
use crate::dirty;
use crate::geom::{Margins, Rect};
use crate::region::Region;

/// Per-window boolean state.
///
/// New windows start with only [`mapped`](Self::mapped) set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WindowFlags {
    /// The window is mapped (shown) by the window system.
    pub mapped: bool,
    /// Draw a drop shadow.
    pub shadow: bool,
    /// Blur whatever shows through translucent parts of the window.
    pub blur_background: bool,
    /// Shadows of windows below must not be drawn over this window.
    pub clip_shadow_above: bool,
    /// Draw the shadow under the window body too, not only around it.
    pub full_shadow: bool,
    /// Paint the window with inverted colors.
    pub invert_color: bool,
    /// The window is inactive and should be dimmed.
    pub dim: bool,
    /// The window content has an alpha channel.
    pub has_alpha: bool,
    /// The window is excluded from painting.
    pub paint_excluded: bool,
}

/// Struct-of-arrays storage for all windows, plus their stacking order.
///
/// Windows are addressed by [`WindowId`] handles. Each window occupies a slot
/// in parallel arrays; destroyed windows are recycled through a free list and
/// generation counters reject stale handles.
///
/// Stacking order is a doubly linked list from the topmost window
/// ([`top`](Self::top)) down to the bottom one.
#[derive(Debug)]
pub struct WindowStack {
    // -- Stacking --
    pub(crate) above: Vec<u32>,
    pub(crate) below: Vec<u32>,
    pub(crate) top: u32,
    pub(crate) bottom: u32,

    // -- Properties (set by callers) --
    pub(crate) geometry: Vec<Rect>,
    pub(crate) shape: Vec<Option<Region>>,
    pub(crate) opacity: Vec<f32>,
    pub(crate) frame_opacity: Vec<f32>,
    pub(crate) blur_opacity: Vec<f32>,
    pub(crate) frame_extents: Vec<Margins>,
    pub(crate) corner_radius: Vec<u32>,
    pub(crate) border_width: Vec<u32>,
    pub(crate) monitor: Vec<Option<u32>>,
    pub(crate) surface: Vec<Option<SurfaceId>>,
    pub(crate) flags: Vec<WindowFlags>,
    pub(crate) image_error: Vec<bool>,

    // -- Computed (written by evaluate) --
    pub(crate) bounding: Vec<Region>,
    pub(crate) rounded_bounding: Vec<Region>,
    pub(crate) mode: Vec<WindowMode>,
    pub(crate) to_paint: Vec<bool>,
    pub(crate) reg_ignore: Vec<Region>,
    pub(crate) ignore_after: Vec<Region>,
    pub(crate) painted_extents: Vec<Region>,
    pub(crate) stacking_rank: Vec<u32>,
    pub(crate) paint_order: Vec<u32>,
    pub(crate) coverage: Region,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,
    pub(crate) pending_damage: Region,
    pub(crate) last_params: Option<super::StackParams>,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,
}

impl Default for WindowStack {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            above: Vec::new(),
            below: Vec::new(),
            top: INVALID,
            bottom: INVALID,
            geometry: Vec::new(),
            shape: Vec::new(),
            opacity: Vec::new(),
            frame_opacity: Vec::new(),
            blur_opacity: Vec::new(),
            frame_extents: Vec::new(),
            corner_radius: Vec::new(),
            border_width: Vec::new(),
            monitor: Vec::new(),
            surface: Vec::new(),
            flags: Vec::new(),
            image_error: Vec::new(),
            bounding: Vec::new(),
            rounded_bounding: Vec::new(),
            mode: Vec::new(),
            to_paint: Vec::new(),
            reg_ignore: Vec::new(),
            ignore_after: Vec::new(),
            painted_extents: Vec::new(),
            stacking_rank: Vec::new(),
            paint_order: Vec::new(),
            coverage: Region::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            pending_damage: Region::new(),
            last_params: None,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Creates a mapped window on top of the stack.
    ///
    /// The window starts fully opaque, with no frame, no shape, no surface
    /// and square corners. It is not painted until a surface is bound with
    /// [`set_surface`](Self::set_surface).
    pub fn create_window(&mut self, geometry: Rect) -> WindowId {
        let flags = WindowFlags {
            mapped: true,
            ..WindowFlags::default()
        };
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.generation[i] += 1;
            self.alive[i] = true;
            self.above[i] = INVALID;
            self.below[i] = INVALID;
            self.geometry[i] = geometry;
            self.shape[i] = None;
            self.opacity[i] = 1.0;
            self.frame_opacity[i] = 1.0;
            self.blur_opacity[i] = 1.0;
            self.frame_extents[i] = Margins::ZERO;
            self.corner_radius[i] = 0;
            self.border_width[i] = 0;
            self.monitor[i] = None;
            self.surface[i] = None;
            self.flags[i] = flags;
            self.image_error[i] = false;
            self.bounding[i] = Region::new();
            self.rounded_bounding[i] = Region::new();
            self.mode[i] = WindowMode::Solid;
            self.to_paint[i] = false;
            self.reg_ignore[i] = Region::new();
            self.ignore_after[i] = Region::new();
            self.painted_extents[i] = Region::new();
            self.stacking_rank[i] = 0;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.above.push(INVALID);
            self.below.push(INVALID);
            self.geometry.push(geometry);
            self.shape.push(None);
            self.opacity.push(1.0);
            self.frame_opacity.push(1.0);
            self.blur_opacity.push(1.0);
            self.frame_extents.push(Margins::ZERO);
            self.corner_radius.push(0);
            self.border_width.push(0);
            self.monitor.push(None);
            self.surface.push(None);
            self.flags.push(flags);
            self.image_error.push(false);
            self.bounding.push(Region::new());
            self.rounded_bounding.push(Region::new());
            self.mode.push(WindowMode::Solid);
            self.to_paint.push(false);
            self.reg_ignore.push(Region::new());
            self.ignore_after.push(Region::new());
            self.painted_extents.push(Region::new());
            self.stacking_rank.push(0);
            self.generation.push(0);
            self.alive.push(true);
            idx
        };

        self.insert_between(idx, INVALID, self.top);
        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::STACKING);
        self.dirty.mark(idx, dirty::GEOMETRY);
        self.dirty.mark_with(idx, dirty::IGNORE, &EagerPolicy);

        WindowId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Destroys a window, freeing its slot for reuse.
    ///
    /// Whatever the window painted last frame is damaged.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_window(&mut self, id: WindowId) {
        self.validate(id);
        let idx = id.idx;
        let below = self.below[idx as usize];

        self.unlink(idx);
        self.dirty.remove_key(idx);
        if below != INVALID {
            self.dirty.mark_with(below, dirty::IGNORE, &EagerPolicy);
        }

        let i = idx as usize;
        let painted = core::mem::take(&mut self.painted_extents[i]);
        self.pending_damage.union_with(&painted);
        self.to_paint[i] = false;
        self.bounding[i] = Region::new();
        self.rounded_bounding[i] = Region::new();
        self.reg_ignore[i] = Region::new();
        self.ignore_after[i] = Region::new();
        self.shape[i] = None;

        // Bump generation so old handles immediately fail validation.
        self.generation[i] += 1;
        self.alive[i] = false;

        self.free_list.push(idx);
        self.pending_removed.push(idx);
    }

    /// Returns whether the handle refers to a live window.
    #[must_use]
    pub fn is_alive(&self, id: WindowId) -> bool {
        id.idx < self.len
            && self.generation[id.idx as usize] == id.generation
            && self.alive[id.idx as usize]
    }

    /// Number of live windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }

    /// Returns `true` if the stack holds no live windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top == INVALID
    }

    /// Handle for the live window at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range or the slot is free.
    #[must_use]
    pub fn id_at(&self, idx: u32) -> WindowId {
        self.check_index(idx);
        assert!(self.alive[idx as usize], "slot {idx} holds no live window");
        WindowId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    // -- Stacking API --

    /// The topmost window, if any.
    #[must_use]
    pub fn top(&self) -> Option<WindowId> {
        self.handle(self.top)
    }

    /// The bottom window, if any.
    #[must_use]
    pub fn bottom(&self) -> Option<WindowId> {
        self.handle(self.bottom)
    }

    /// The window directly above `id`.
    #[must_use]
    pub fn above(&self, id: WindowId) -> Option<WindowId> {
        self.validate(id);
        self.handle(self.above[id.idx as usize])
    }

    /// The window directly below `id`.
    #[must_use]
    pub fn below(&self, id: WindowId) -> Option<WindowId> {
        self.validate(id);
        self.handle(self.below[id.idx as usize])
    }

    /// Iterates all windows from top to bottom.
    #[must_use]
    pub fn iter(&self) -> StackIter<'_> {
        StackIter::new(self, self.top)
    }

    /// Moves `id` to the top of the stack.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn raise(&mut self, id: WindowId) {
        self.validate(id);
        if self.top == id.idx {
            return;
        }
        let top = self.top;
        self.restack(id.idx, INVALID, top);
    }

    /// Moves `id` to the bottom of the stack.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn lower(&mut self, id: WindowId) {
        self.validate(id);
        if self.bottom == id.idx {
            return;
        }
        let bottom = self.bottom;
        self.restack(id.idx, bottom, INVALID);
    }

    /// Places `id` directly above `sibling`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale or they are the same window.
    pub fn restack_above(&mut self, id: WindowId, sibling: WindowId) {
        self.validate(id);
        self.validate(sibling);
        assert!(id != sibling, "cannot restack a window relative to itself");
        if self.below[id.idx as usize] == sibling.idx {
            return;
        }
        let above = self.above[sibling.idx as usize];
        self.restack(id.idx, above, sibling.idx);
    }

    /// Places `id` directly below `sibling`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale or they are the same window.
    pub fn restack_below(&mut self, id: WindowId, sibling: WindowId) {
        self.validate(id);
        self.validate(sibling);
        assert!(id != sibling, "cannot restack a window relative to itself");
        if self.above[id.idx as usize] == sibling.idx {
            return;
        }
        let below = self.below[sibling.idx as usize];
        self.restack(id.idx, sibling.idx, below);
    }

    // -- Property getters (read-only, no dirty marking) --

    /// Outer rectangle of the window, frame included.
    #[must_use]
    pub fn geometry(&self, id: WindowId) -> Rect {
        self.validate(id);
        self.geometry[id.idx as usize]
    }

    /// Bounding shape in window-local coordinates, if any.
    #[must_use]
    pub fn shape(&self, id: WindowId) -> Option<&Region> {
        self.validate(id);
        self.shape[id.idx as usize].as_ref()
    }

    /// Body opacity.
    #[must_use]
    pub fn opacity(&self, id: WindowId) -> f32 {
        self.validate(id);
        self.opacity[id.idx as usize]
    }

    /// Frame opacity.
    #[must_use]
    pub fn frame_opacity(&self, id: WindowId) -> f32 {
        self.validate(id);
        self.frame_opacity[id.idx as usize]
    }

    /// Frame extents.
    #[must_use]
    pub fn frame_extents(&self, id: WindowId) -> Margins {
        self.validate(id);
        self.frame_extents[id.idx as usize]
    }

    /// Corner radius.
    #[must_use]
    pub fn corner_radius(&self, id: WindowId) -> u32 {
        self.validate(id);
        self.corner_radius[id.idx as usize]
    }

    /// Bound surface, if any.
    #[must_use]
    pub fn surface(&self, id: WindowId) -> Option<SurfaceId> {
        self.validate(id);
        self.surface[id.idx as usize]
    }

    /// Window flags.
    #[must_use]
    pub fn flags(&self, id: WindowId) -> WindowFlags {
        self.validate(id);
        self.flags[id.idx as usize]
    }

    /// Whether the window is painted this frame.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn to_paint(&self, id: WindowId) -> bool {
        self.validate(id);
        self.to_paint[id.idx as usize]
    }

    /// Paint mode of the window.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn mode(&self, id: WindowId) -> WindowMode {
        self.validate(id);
        self.mode[id.idx as usize]
    }

    /// Screen area painted opaquely by the windows above this one.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn reg_ignore(&self, id: WindowId) -> &Region {
        self.validate(id);
        &self.reg_ignore[id.idx as usize]
    }

    /// Bounding shape in screen coordinates, corners included.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn bounding(&self, id: WindowId) -> &Region {
        self.validate(id);
        &self.bounding[id.idx as usize]
    }

    // -- Mutation API (auto-marks dirty) --

    /// Moves or resizes the window.
    pub fn set_geometry(&mut self, id: WindowId, geometry: Rect) {
        self.validate(id);
        if self.geometry[id.idx as usize] == geometry {
            return;
        }
        self.geometry[id.idx as usize] = geometry;
        self.mark_paint_state(id.idx, dirty::GEOMETRY);
    }

    /// Sets the bounding shape, in window-local coordinates.
    ///
    /// `None` means the full window rectangle.
    pub fn set_shape(&mut self, id: WindowId, shape: Option<Region>) {
        self.validate(id);
        self.shape[id.idx as usize] = shape;
        self.mark_paint_state(id.idx, dirty::SHAPE);
    }

    /// Sets the body opacity (clamped to `0..=1`).
    pub fn set_opacity(&mut self, id: WindowId, opacity: f32) {
        self.validate(id);
        self.opacity[id.idx as usize] = opacity.clamp(0.0, 1.0);
        self.mark_paint_state(id.idx, dirty::OPACITY);
    }

    /// Sets the frame opacity (clamped to `0..=1`).
    pub fn set_frame_opacity(&mut self, id: WindowId, opacity: f32) {
        self.validate(id);
        self.frame_opacity[id.idx as usize] = opacity.clamp(0.0, 1.0);
        self.mark_paint_state(id.idx, dirty::OPACITY);
    }

    /// Sets the opacity of the window's background blur (clamped to `0..=1`).
    pub fn set_blur_opacity(&mut self, id: WindowId, opacity: f32) {
        self.validate(id);
        self.blur_opacity[id.idx as usize] = opacity.clamp(0.0, 1.0);
        self.dirty.mark(id.idx, dirty::OPACITY);
    }

    /// Sets the frame extents.
    pub fn set_frame_extents(&mut self, id: WindowId, extents: Margins) {
        self.validate(id);
        self.frame_extents[id.idx as usize] = extents;
        self.mark_paint_state(id.idx, dirty::GEOMETRY);
    }

    /// Sets the corner radius.
    pub fn set_corner_radius(&mut self, id: WindowId, radius: u32) {
        self.validate(id);
        self.corner_radius[id.idx as usize] = radius;
        self.mark_paint_state(id.idx, dirty::GEOMETRY);
    }

    /// Sets the explicit border width used for rounded-corner borders.
    pub fn set_border_width(&mut self, id: WindowId, width: u32) {
        self.validate(id);
        self.border_width[id.idx as usize] = width;
        self.dirty.mark(id.idx, dirty::GEOMETRY);
    }

    /// Sets the monitor the window belongs to.
    pub fn set_monitor(&mut self, id: WindowId, monitor: Option<u32>) {
        self.validate(id);
        self.monitor[id.idx as usize] = monitor;
        self.dirty.mark(id.idx, dirty::FLAGS);
    }

    /// Binds (or unbinds) the surface holding the window's pixels.
    ///
    /// The whole window is damaged and any image error is cleared.
    pub fn set_surface(&mut self, id: WindowId, surface: Option<SurfaceId>) {
        self.validate(id);
        let i = id.idx as usize;
        self.surface[i] = surface;
        self.image_error[i] = false;
        self.pending_damage.union_with(&Region::from_rect(self.geometry[i]));
        self.mark_paint_state(id.idx, dirty::CONTENT);
    }

    /// Sets the window flags.
    pub fn set_flags(&mut self, id: WindowId, flags: WindowFlags) {
        self.validate(id);
        self.flags[id.idx as usize] = flags;
        self.mark_paint_state(id.idx, dirty::FLAGS);
    }

    /// Shorthand for toggling [`WindowFlags::mapped`].
    pub fn set_mapped(&mut self, id: WindowId, mapped: bool) {
        let flags = WindowFlags {
            mapped,
            ..self.flags(id)
        };
        self.set_flags(id, flags);
    }

    /// Records that binding the window's surface failed (or recovered).
    ///
    /// Windows with an image error are not painted.
    pub fn set_image_error(&mut self, id: WindowId, error: bool) {
        self.validate(id);
        if self.image_error[id.idx as usize] == error {
            return;
        }
        self.image_error[id.idx as usize] = error;
        self.mark_paint_state(id.idx, dirty::FLAGS);
    }

    /// Reports client damage, in window-local coordinates.
    ///
    /// New content clears an image error so the next frame binds again.
    pub fn add_damage(&mut self, id: WindowId, local: &Region) {
        self.validate(id);
        let i = id.idx as usize;
        let g = self.geometry[i];
        let damage = local.translate(g.x1, g.y1).intersect_rect(g);
        self.pending_damage.union_with(&damage);
        if self.image_error[i] {
            self.image_error[i] = false;
            self.mark_paint_state(id.idx, dirty::CONTENT);
        } else {
            self.dirty.mark(id.idx, dirty::CONTENT);
        }
    }

    /// Damages an arbitrary screen region, for example after the root
    /// background changed.
    pub fn add_screen_damage(&mut self, damage: &Region) {
        self.pending_damage.union_with(damage);
    }

    // -- Raw-index accessors for the compositor --
    //
    // These take raw slot indices (from `StackChanges` or `paint_order()`)
    // and skip generation validation.

    /// Outer rectangle at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn geometry_at(&self, idx: u32) -> Rect {
        self.check_index(idx);
        self.geometry[idx as usize]
    }

    /// Screen-space bounding shape at raw slot `idx`, corners included.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn bounding_at(&self, idx: u32) -> &Region {
        self.check_index(idx);
        &self.bounding[idx as usize]
    }

    /// Screen-space bounding shape at raw slot `idx` with rounded corners cut
    /// off.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn rounded_bounding_at(&self, idx: u32) -> &Region {
        self.check_index(idx);
        &self.rounded_bounding[idx as usize]
    }

    /// `reg_ignore` at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn reg_ignore_at(&self, idx: u32) -> &Region {
        self.check_index(idx);
        &self.reg_ignore[idx as usize]
    }

    /// Paint mode at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn mode_at(&self, idx: u32) -> WindowMode {
        self.check_index(idx);
        self.mode[idx as usize]
    }

    /// Body opacity at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn opacity_at(&self, idx: u32) -> f32 {
        self.check_index(idx);
        self.opacity[idx as usize]
    }

    /// Frame opacity at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn frame_opacity_at(&self, idx: u32) -> f32 {
        self.check_index(idx);
        self.frame_opacity[idx as usize]
    }

    /// Blur opacity at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn blur_opacity_at(&self, idx: u32) -> f32 {
        self.check_index(idx);
        self.blur_opacity[idx as usize]
    }

    /// Frame extents at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn frame_extents_at(&self, idx: u32) -> Margins {
        self.check_index(idx);
        self.frame_extents[idx as usize]
    }

    /// Corner radius at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn corner_radius_at(&self, idx: u32) -> u32 {
        self.check_index(idx);
        self.corner_radius[idx as usize]
    }

    /// Explicit border width at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn border_width_at(&self, idx: u32) -> u32 {
        self.check_index(idx);
        self.border_width[idx as usize]
    }

    /// Monitor at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn monitor_at(&self, idx: u32) -> Option<u32> {
        self.check_index(idx);
        self.monitor[idx as usize]
    }

    /// Bound surface at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn surface_at(&self, idx: u32) -> Option<SurfaceId> {
        self.check_index(idx);
        self.surface[idx as usize]
    }

    /// Flags at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn flags_at(&self, idx: u32) -> WindowFlags {
        self.check_index(idx);
        self.flags[idx as usize]
    }

    /// Position among painted windows at raw slot `idx`, 0 being the bottom.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn stacking_rank_at(&self, idx: u32) -> u32 {
        self.check_index(idx);
        self.stacking_rank[idx as usize]
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: WindowId) {
        assert!(
            id.idx < self.len && self.generation[id.idx as usize] == id.generation,
            "stale WindowId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    pub(crate) fn check_index(&self, idx: u32) {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
    }

    fn handle(&self, idx: u32) -> Option<WindowId> {
        (idx != INVALID).then(|| WindowId {
            idx,
            generation: self.generation[idx as usize],
        })
    }

    /// Marks `channel` and invalidates `reg_ignore` from this window down.
    fn mark_paint_state(&mut self, idx: u32, channel: understory_dirty::Channel) {
        self.dirty.mark(idx, channel);
        self.dirty.mark_with(idx, dirty::IGNORE, &EagerPolicy);
    }

    /// Moves `idx` between `above` and `below` (either may be [`INVALID`]).
    fn restack(&mut self, idx: u32, above: u32, below: u32) {
        let old_below = self.below[idx as usize];
        self.unlink(idx);
        self.insert_between(idx, above, below);

        self.dirty.mark(idx, dirty::STACKING);
        self.dirty.mark_with(idx, dirty::IGNORE, &EagerPolicy);
        if old_below != INVALID {
            self.dirty.mark_with(old_below, dirty::IGNORE, &EagerPolicy);
        }
    }

    /// Links `idx` between `above` and `below`, which must be adjacent.
    fn insert_between(&mut self, idx: u32, above: u32, below: u32) {
        if above != INVALID && below != INVALID {
            self.dirty.remove_dependency(below, above, dirty::IGNORE);
        }

        self.above[idx as usize] = above;
        self.below[idx as usize] = below;
        if above == INVALID {
            self.top = idx;
        } else {
            self.below[above as usize] = idx;
            let _ = self.dirty.add_dependency(idx, above, dirty::IGNORE);
        }
        if below == INVALID {
            self.bottom = idx;
        } else {
            self.above[below as usize] = idx;
            let _ = self.dirty.add_dependency(below, idx, dirty::IGNORE);
        }
    }

    /// Removes `idx` from the stacking list, joining its neighbours.
    fn unlink(&mut self, idx: u32) {
        let above = self.above[idx as usize];
        let below = self.below[idx as usize];

        if above == INVALID {
            self.top = below;
        } else {
            self.dirty.remove_dependency(idx, above, dirty::IGNORE);
            self.below[above as usize] = below;
        }
        if below == INVALID {
            self.bottom = above;
        } else {
            self.dirty.remove_dependency(below, idx, dirty::IGNORE);
            self.above[below as usize] = above;
        }
        if above != INVALID && below != INVALID {
            let _ = self.dirty.add_dependency(below, above, dirty::IGNORE);
        }

        self.above[idx as usize] = INVALID;
        self.below[idx as usize] = INVALID;
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    fn order(stack: &WindowStack) -> Vec<WindowId> {
        stack.iter().collect()
    }

    #[test]
    fn create_and_destroy() {
        let mut stack = WindowStack::new();
        let id = stack.create_window(Rect::from_xywh(0, 0, 10, 10));
        assert!(stack.is_alive(id));
        assert_eq!(stack.len(), 1);
        stack.destroy_window(id);
        assert!(!stack.is_alive(id));
        assert!(stack.is_empty());
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut stack = WindowStack::new();
        let id1 = stack.create_window(Rect::EMPTY);
        stack.destroy_window(id1);
        let id2 = stack.create_window(Rect::EMPTY);
        assert!(!stack.is_alive(id1));
        assert!(stack.is_alive(id2));
        assert_eq!(id1.index(), id2.index());
        assert_ne!(id1.generation(), id2.generation());
    }

    #[test]
    fn new_windows_go_on_top() {
        let mut stack = WindowStack::new();
        let a = stack.create_window(Rect::EMPTY);
        let b = stack.create_window(Rect::EMPTY);
        let c = stack.create_window(Rect::EMPTY);
        assert_eq!(order(&stack), vec![c, b, a]);
        assert_eq!(stack.top(), Some(c));
        assert_eq!(stack.bottom(), Some(a));
        assert_eq!(stack.below(c), Some(b));
        assert_eq!(stack.above(a), Some(b));
    }

    #[test]
    fn raise_and_lower() {
        let mut stack = WindowStack::new();
        let a = stack.create_window(Rect::EMPTY);
        let b = stack.create_window(Rect::EMPTY);
        let c = stack.create_window(Rect::EMPTY);

        stack.raise(a);
        assert_eq!(order(&stack), vec![a, c, b]);
        stack.lower(c);
        assert_eq!(order(&stack), vec![a, b, c]);
        stack.lower(c);
        assert_eq!(order(&stack), vec![a, b, c]);
    }

    #[test]
    fn restack_relative_to_sibling() {
        let mut stack = WindowStack::new();
        let a = stack.create_window(Rect::EMPTY);
        let b = stack.create_window(Rect::EMPTY);
        let c = stack.create_window(Rect::EMPTY);
        // c, b, a
        stack.restack_above(a, b);
        assert_eq!(order(&stack), vec![c, a, b]);
        stack.restack_below(c, b);
        assert_eq!(order(&stack), vec![a, b, c]);
        stack.restack_above(c, a);
        assert_eq!(order(&stack), vec![c, a, b]);
    }

    #[test]
    fn destroy_joins_neighbours() {
        let mut stack = WindowStack::new();
        let a = stack.create_window(Rect::EMPTY);
        let b = stack.create_window(Rect::EMPTY);
        let c = stack.create_window(Rect::EMPTY);
        stack.destroy_window(b);
        assert_eq!(order(&stack), vec![c, a]);
        assert_eq!(stack.below(c), Some(a));
        assert_eq!(stack.above(a), Some(c));
    }

    #[test]
    fn opacity_is_clamped() {
        let mut stack = WindowStack::new();
        let a = stack.create_window(Rect::EMPTY);
        stack.set_opacity(a, 1.5);
        assert_eq!(stack.opacity(a), 1.0);
        stack.set_frame_opacity(a, -0.5);
        assert_eq!(stack.frame_opacity(a), 0.0);
    }

    #[test]
    #[should_panic(expected = "stale WindowId")]
    fn destroyed_handle_panics_on_get() {
        let mut stack = WindowStack::new();
        let id = stack.create_window(Rect::EMPTY);
        stack.destroy_window(id);
        let _ = stack.geometry(id);
    }

    #[test]
    #[should_panic(expected = "stale WindowId")]
    fn destroyed_handle_panics_on_set() {
        let mut stack = WindowStack::new();
        let id = stack.create_window(Rect::EMPTY);
        stack.destroy_window(id);
        stack.set_opacity(id, 0.5);
    }

    #[test]
    #[should_panic(expected = "stale WindowId")]
    fn destroyed_handle_panics_on_raise() {
        let mut stack = WindowStack::new();
        let keep = stack.create_window(Rect::EMPTY);
        let id = stack.create_window(Rect::EMPTY);
        stack.destroy_window(id);
        stack.restack_above(id, keep);
    }

    #[test]
    #[should_panic(expected = "relative to itself")]
    fn restack_against_self_panics() {
        let mut stack = WindowStack::new();
        let id = stack.create_window(Rect::EMPTY);
        stack.restack_above(id, id);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn raw_accessor_checks_bounds() {
        let stack = WindowStack::new();
        let _ = stack.geometry_at(3);
    }
}
