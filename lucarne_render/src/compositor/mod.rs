// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The damage-driven compositor.
//!
//! A [`Compositor`] turns a [`WindowStack`] into backend draw calls, one
//! frame at a time. Each call to [`Compositor::paint_frame`]:
//!
//! 1. evaluates the stack and folds its damage into the [`DamageRing`],
//! 2. bails out if the device is resetting or busy,
//! 3. derives the repaint region from the back buffer's age, grown for
//!    blur sampling,
//! 4. paints the background where no opaque window covers it,
//! 5. paints windows bottom to top, each with its shadow, background blur
//!    and body, clipped to what is not hidden behind opaque windows above,
//! 6. presents.
//!
//! Everything the compositor holds on the backend (bound surfaces, shadow
//! masks, the background image, blur contexts, the high-precision buffer) is
//! dropped by [`Compositor::device_reset`] and rebuilt on demand once
//! [`Compositor::reset_complete`] is called.
//!
//! [`WindowStack`]: lucarne_core::stack::WindowStack

mod binding;
mod frame;
mod margins;

use std::time::Instant;

use lucarne_core::damage::DamageRing;
use lucarne_core::geom::{Point, Rect, Size};
use lucarne_core::region::Region;
use lucarne_core::stack::{StackChanges, StackParams, SurfaceId};
use lucarne_core::trace::{DeviceResetEvent, FrameSummary, SkipReason, Tracer};

use crate::backend::Backend;
use crate::blur::BlurEngine;
use crate::error::OptionsError;
use crate::image::ImageHandle;
use crate::options::CompositorOptions;
use crate::shadow::ShadowGenerator;

use binding::WindowImages;

/// Whether the compositor is waiting for the backend to come back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceState {
    /// Frames are painted.
    #[default]
    Normal,
    /// Backend resources were dropped; frames are skipped until
    /// [`Compositor::reset_complete`].
    Resetting,
}

/// What [`Compositor::paint_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was drawn and handed to the backend.
    Presented {
        /// Whether the backend accepted the present.
        ok: bool,
    },
    /// Nothing was drawn.
    Skipped(SkipReason),
}

#[derive(Debug, Default)]
struct Background {
    surface: Option<SurfaceId>,
    image: Option<ImageHandle>,
}

#[derive(Debug, Default)]
struct HighBuffer {
    image: Option<ImageHandle>,
    unsupported: bool,
}

/// Paints a window stack through a [`Backend`].
#[derive(Debug)]
pub struct Compositor {
    options: CompositorOptions,
    params: StackParams,
    monitors: Vec<Rect>,
    shadow_exclude: Region,
    ring: DamageRing,
    changes: StackChanges,
    blur: BlurEngine,
    shadows: ShadowGenerator,
    windows: WindowImages,
    background: Background,
    high: HighBuffer,
    invert_disabled: bool,
    state: DeviceState,
    full_redraw: bool,
    frame_index: u64,
    epoch: Instant,
    last_summary: Option<FrameSummary>,
    released_surfaces: Vec<SurfaceId>,
}

impl Compositor {
    /// Creates a compositor for a `screen`-sized output drawn by `backend`.
    ///
    /// The damage ring is sized from the backend's maximum buffer age.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError`] if `options` do not validate.
    pub fn new(
        options: CompositorOptions,
        screen: Size,
        backend: &dyn Backend,
    ) -> Result<Self, OptionsError> {
        options.validate()?;
        let blur = BlurEngine::new(options.blur_params()?);
        let mut params = StackParams::new(Rect::from_origin_size(Point::ZERO, screen));
        params.shadow = options.shadow.geometry();
        params.transparent_clipping = options.transparent_clipping;
        params.force_win_blend = options.force_win_blend;
        log::debug!(
            "compositor on `{}` backend, screen {screen:?}, blur {:?}",
            backend.name(),
            options.blur.method
        );
        Ok(Self {
            params,
            monitors: Vec::new(),
            shadow_exclude: options.shadow.exclude_region(),
            ring: DamageRing::new(backend.max_buffer_age()),
            changes: StackChanges::default(),
            blur,
            shadows: ShadowGenerator::new(&options.shadow),
            windows: WindowImages::default(),
            background: Background::default(),
            high: HighBuffer::default(),
            invert_disabled: false,
            state: DeviceState::Normal,
            full_redraw: true,
            frame_index: 0,
            epoch: Instant::now(),
            last_summary: None,
            released_surfaces: Vec::new(),
            options,
        })
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &CompositorOptions {
        &self.options
    }

    /// Screen rectangle.
    #[must_use]
    pub fn screen(&self) -> Rect {
        self.params.screen
    }

    /// Parameters the stack is evaluated with.
    #[must_use]
    pub fn stack_params(&self) -> &StackParams {
        &self.params
    }

    /// Changes reported by the last evaluation.
    #[must_use]
    pub fn last_changes(&self) -> &StackChanges {
        &self.changes
    }

    /// Damage history.
    #[must_use]
    pub fn damage_ring(&self) -> &DamageRing {
        &self.ring
    }

    /// Current device state.
    #[must_use]
    pub fn device_state(&self) -> DeviceState {
        self.state
    }

    /// Summary of the last painted frame.
    #[must_use]
    pub fn last_summary(&self) -> Option<&FrameSummary> {
        self.last_summary.as_ref()
    }

    /// Index the next frame will get.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Backend images currently owned by the compositor.
    #[must_use]
    pub fn held_images(&self) -> usize {
        self.windows.len()
            + self.shadows.held_images()
            + usize::from(self.background.image.is_some())
            + usize::from(self.high.image.is_some())
    }

    /// Whether a background blur context is held.
    #[must_use]
    pub fn has_blur_context(&self) -> bool {
        self.blur.has_context()
    }

    /// Platform surfaces the backend handed back since the last call. The
    /// host owns them again and may free them.
    pub fn take_released_surfaces(&mut self) -> Vec<SurfaceId> {
        core::mem::take(&mut self.released_surfaces)
    }

    /// Forces the next frame to repaint the whole screen.
    pub fn request_full_redraw(&mut self) {
        self.full_redraw = true;
    }

    /// Damages a screen area directly, outside of any window change.
    pub fn add_damage(&mut self, damage: &Region) {
        self.ring.add(&damage.intersect_rect(self.params.screen));
    }

    /// Sets the monitor rectangles used to crop shadows, indexed by
    /// [`WindowStack::set_monitor`](lucarne_core::stack::WindowStack::set_monitor).
    pub fn set_monitors(&mut self, monitors: Vec<Rect>) {
        self.monitors = monitors;
        self.full_redraw = true;
    }

    /// Resizes the output. The backend is told through
    /// [`Backend::root_change`] and the next frame is a full redraw.
    ///
    /// Returns `false` if the backend could not follow.
    pub fn resize(&mut self, backend: &mut dyn Backend, size: Size) -> bool {
        self.params.screen = Rect::from_origin_size(Point::ZERO, size);
        if let Some(image) = self.high.image.take() {
            backend.release_image(image);
        }
        self.ring.clear();
        self.full_redraw = true;
        let ok = backend.root_change(size);
        if !ok {
            log::warn!("backend `{}` failed to resize to {size:?}", backend.name());
        }
        ok
    }

    /// Sets the platform surface painted as the desktop background, or
    /// `None` to fill with [`CompositorOptions::background_color`].
    pub fn set_root_surface(&mut self, backend: &mut dyn Backend, surface: Option<SurfaceId>) {
        if self.background.surface == surface {
            return;
        }
        self.release_background(backend);
        self.background.surface = surface;
        self.full_redraw = true;
    }

    /// Drops every backend resource and enters [`DeviceState::Resetting`].
    ///
    /// Called by [`paint_frame`](Self::paint_frame) when the backend reports
    /// a reset. Frames are skipped until [`reset_complete`](Self::reset_complete).
    pub fn device_reset(&mut self, backend: &mut dyn Backend, tracer: &mut Tracer<'_>) {
        let mut images = self
            .windows
            .release_all(backend, &mut self.released_surfaces);
        let (shadow_images, mut contexts) = self.shadows.release_all(backend);
        images += shadow_images;
        images += u32::from(self.background.image.is_some());
        self.release_background(backend);
        if let Some(image) = self.high.image.take() {
            backend.release_image(image);
            images += 1;
        }
        if self.blur.has_context() {
            self.blur.release(backend);
            contexts += 1;
        }
        self.ring.clear();
        self.state = DeviceState::Resetting;
        self.full_redraw = true;
        log::error!(
            "device reset on `{}`: released {images} images and {contexts} blur contexts",
            backend.name()
        );
        tracer.device_reset(&DeviceResetEvent {
            frame_index: self.frame_index,
            images_released: images,
            blur_contexts_released: contexts,
        });
    }

    /// Resumes painting on a backend that finished resetting, or on a fresh
    /// one. The next frame repaints the whole screen.
    pub fn reset_complete(&mut self, backend: &dyn Backend) {
        self.ring.resize(backend.max_buffer_age());
        self.state = DeviceState::Normal;
        self.full_redraw = true;
        log::info!("device ready on `{}`; resuming", backend.name());
    }

    fn release_background(&mut self, backend: &mut dyn Backend) {
        if let Some(image) = self.background.image.take() {
            let surface = backend.release_image(image);
            self.released_surfaces.extend(surface);
        }
    }
}
