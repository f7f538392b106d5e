// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painting one frame.

use lucarne_core::geom::{Point, Rect, Size};
use lucarne_core::region::Region;
use lucarne_core::stack::{WindowMode, WindowStack};
#[cfg(feature = "trace-rich")]
use lucarne_core::trace::{DamageRect, WindowChange};
use lucarne_core::trace::{
    Feature, FeatureDisabledEvent, FrameBeginEvent, FrameSkippedEvent, FrameSummaryBuilder,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, SkipReason, Tracer,
};

use super::margins::frame_pieces;
use super::{Compositor, DeviceState, FrameOutcome};
use crate::backend::{Backend, BlitArgs, BlurArgs, DeviceStatus};
use crate::blur::{BlurEngine, ContextState};
use crate::error::CompositorError;
use crate::image::{
    BlurContextId, Color, FormatInfo, ImageCaps, ImageFormat, ImageHandle, MaskImage,
};
use crate::shadow::solid_image;

/// Windows below this alpha neither paint nor clip shadows.
const MIN_ALPHA: f64 = 1.0 / 255.0;

/// Overlay drawn over the repaint region with `monitor_repaint`.
const REPAINT_TINT: Color = Color::new(1.0, 0.0, 0.0, 1.0);
const REPAINT_TINT_OPACITY: f64 = 0.25;

/// Per-frame state shared by the paint steps.
struct Frame {
    index: u64,
    /// Where windows are drawn: the back buffer, or the high-precision
    /// buffer when dithering.
    target: ImageHandle,
    paint: Region,
    blur: Option<BlurContextId>,
    summary: FrameSummaryBuilder,
}

impl Compositor {
    /// Evaluates `stack` and paints one frame.
    ///
    /// Skipped frames keep their damage for the next one.
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::BackBufferUnavailable`] if the back buffer
    /// is missing and cannot be recreated. Every other failure is handled
    /// inside the frame by skipping the affected step.
    pub fn paint_frame(
        &mut self,
        backend: &mut dyn Backend,
        stack: &mut WindowStack,
        tracer: &mut Tracer<'_>,
    ) -> Result<FrameOutcome, CompositorError> {
        let outcome = self.run_frame(backend, stack, tracer);
        self.frame_index += 1;
        outcome
    }

    fn run_frame(
        &mut self,
        backend: &mut dyn Backend,
        stack: &mut WindowStack,
        tracer: &mut Tracer<'_>,
    ) -> Result<FrameOutcome, CompositorError> {
        let index = self.frame_index;

        // Evaluate even when the frame is skipped so no damage is lost.
        let eval_start = self.epoch.elapsed();
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: index,
            phase: PhaseKind::Evaluate,
            timestamp: eval_start,
        });
        stack.evaluate_into(&self.params, &mut self.changes);
        let eval_end = self.epoch.elapsed();
        tracer.phase_end(&PhaseEndEvent {
            frame_index: index,
            phase: PhaseKind::Evaluate,
            timestamp: eval_end,
        });
        #[cfg(feature = "trace-rich")]
        {
            let mut records = Vec::new();
            WindowChange::collect(&self.changes, &mut records);
            if !records.is_empty() {
                tracer.window_changes(index, &records);
            }
        }
        self.apply_changes(backend, stack);

        if self.state == DeviceState::Resetting {
            return Ok(self.skip(tracer, SkipReason::DeviceReset));
        }
        if backend.device_status() == DeviceStatus::Resetting {
            self.device_reset(backend, tracer);
            return Ok(self.skip(tracer, SkipReason::DeviceReset));
        }
        if backend.is_busy() {
            return Ok(self.skip(tracer, SkipReason::Busy));
        }

        let screen = self.params.screen;
        let age = backend.buffer_age();
        // The repaint tint only shows this frame's work on a fully repainted buffer.
        let mut damage =
            if self.full_redraw || !self.options.use_damage || self.options.monitor_repaint {
                Region::from_rect(screen)
            } else {
                self.ring.collect(age, screen)
            };
        let grow = self.options.resize_damage;
        if grow > 0 {
            damage = damage.inflate(grow, grow).intersect_rect(screen);
        }
        if damage.is_empty() {
            return Ok(self.skip(tracer, SkipReason::NothingToPaint));
        }

        let back_buffer = self.ensure_back_buffer(backend)?;
        let (target, format) = match self.high_buffer(backend, tracer) {
            Some((image, fresh)) => {
                if fresh {
                    damage = Region::from_rect(screen);
                }
                (image, ImageFormat::PixmapHigh)
            }
            None => (back_buffer, ImageFormat::Pixmap),
        };
        let blur = match self.blur.context(backend, format) {
            ContextState::Ready(ctx) => Some(ctx),
            ContextState::Off => None,
            ContextState::JustDisabled => {
                tracer.feature_disabled(&FeatureDisabledEvent {
                    frame_index: index,
                    feature: Feature::Blur,
                });
                None
            }
        };
        let (repaint, paint) = match blur {
            Some(ctx) => {
                let size = backend.blur_size(ctx);
                let windows = stack.paint_order().len();
                let repaint = BlurEngine::expand(&damage, size, windows, screen);
                let paint = BlurEngine::expand(&repaint, size, windows, screen);
                (repaint, paint)
            }
            None => (damage.clone(), damage),
        };

        let mut summary = FrameSummaryBuilder::new(index, age);
        summary.set_repaint(&repaint);
        summary.phase_begin(PhaseKind::Evaluate, eval_start);
        summary.phase_end(PhaseKind::Evaluate, eval_end);
        tracer.frame_begin(&FrameBeginEvent {
            frame_index: index,
            buffer_age: age,
            repaint_rects: u32::try_from(repaint.rects().len()).unwrap_or(u32::MAX),
            repaint_area: repaint.area(),
        });
        #[cfg(feature = "trace-rich")]
        {
            let rects: Vec<DamageRect> = repaint
                .rects()
                .iter()
                .copied()
                .map(DamageRect::from)
                .collect();
            tracer.damage_rects(index, &rects);
        }

        let paint_start = self.epoch.elapsed();
        summary.phase_begin(PhaseKind::Paint, paint_start);
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: index,
            phase: PhaseKind::Paint,
            timestamp: paint_start,
        });

        let mut frame = Frame {
            index,
            target,
            paint,
            blur,
            summary,
        };
        backend.prepare(&repaint);
        self.paint_background(backend, stack, &mut frame);
        self.paint_windows(backend, stack, tracer, &mut frame);
        if self.options.monitor_repaint {
            self.paint_repaint_tint(backend, &repaint, &mut frame);
        }
        if frame.target != back_buffer
            && !backend.copy_area_quantize(Point::ZERO, back_buffer, frame.target, &frame.paint)
        {
            log::warn!("dithered copy to the back buffer failed");
        }

        let paint_end = self.epoch.elapsed();
        frame.summary.phase_end(PhaseKind::Paint, paint_end);
        tracer.phase_end(&PhaseEndEvent {
            frame_index: index,
            phase: PhaseKind::Paint,
            timestamp: paint_end,
        });

        self.ring.advance();
        self.full_redraw = false;

        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: index,
            phase: PhaseKind::Present,
            timestamp: self.epoch.elapsed(),
        });
        let ok = backend.present();
        if !ok {
            log::warn!("present failed on frame {index}");
        }
        tracer.phase_end(&PhaseEndEvent {
            frame_index: index,
            phase: PhaseKind::Present,
            timestamp: self.epoch.elapsed(),
        });

        let summary = frame.summary.finish(ok, backend.last_render_time());
        log::trace!(
            "frame {index}: age {age}, {} px, {} windows, {} blits, {} blurs, {} shadows",
            summary.repaint_area,
            summary.windows_painted,
            summary.blits,
            summary.blurs,
            summary.shadows
        );
        tracer.frame_summary(&summary);
        self.last_summary = Some(summary);
        Ok(FrameOutcome::Presented { ok })
    }

    fn skip(&self, tracer: &mut Tracer<'_>, reason: SkipReason) -> FrameOutcome {
        log::trace!("frame {} skipped: {reason:?}", self.frame_index);
        tracer.frame_skipped(&FrameSkippedEvent {
            frame_index: self.frame_index,
            reason,
        });
        FrameOutcome::Skipped(reason)
    }

    /// Drops resources of removed windows, unbinds windows with new
    /// contents or size, and records the stack's damage.
    fn apply_changes(&mut self, backend: &mut dyn Backend, stack: &WindowStack) {
        for &idx in &self.changes.removed {
            self.windows
                .release_slot(backend, idx, &mut self.released_surfaces);
            self.shadows.invalidate_slot(backend, idx);
        }
        for &idx in self.changes.content.iter().chain(&self.changes.geometry) {
            if self.changes.removed.contains(&idx) {
                continue;
            }
            self.windows.refresh_slot(
                backend,
                idx,
                stack.surface_at(idx),
                &mut self.released_surfaces,
            );
        }
        self.ring.add(&self.changes.damage);
    }

    fn ensure_back_buffer(
        &mut self,
        backend: &mut dyn Backend,
    ) -> Result<ImageHandle, CompositorError> {
        let valid = |backend: &dyn Backend| {
            backend
                .back_buffer()
                .filter(|&bb| backend.image_capabilities(bb).contains(ImageCaps::DST))
        };
        if let Some(bb) = valid(backend) {
            return Ok(bb);
        }
        log::warn!("back buffer missing; recreating");
        let size = self.params.screen.size();
        if backend.root_change(size)
            && let Some(bb) = valid(backend)
        {
            self.full_redraw = true;
            return Ok(bb);
        }
        log::error!("cannot allocate a {size:?} back buffer");
        Err(CompositorError::BackBufferUnavailable)
    }

    /// The high-precision render target when dithering is on, and whether
    /// it was allocated just now. `None` means windows go straight to the
    /// back buffer.
    fn high_buffer(
        &mut self,
        backend: &mut dyn Backend,
        tracer: &mut Tracer<'_>,
    ) -> Option<(ImageHandle, bool)> {
        if !self.options.dithered_present || self.high.unsupported {
            return None;
        }
        if let Some(image) = self.high.image {
            return Some((image, false));
        }
        let image = backend
            .is_format_supported(ImageFormat::PixmapHigh)
            .then(|| backend.new_image(ImageFormat::PixmapHigh, self.params.screen.size()))
            .flatten();
        match image {
            Some(image) => {
                self.high.image = Some(image);
                Some((image, true))
            }
            None => {
                self.disable_high_precision(backend.name(), tracer);
                None
            }
        }
    }

    fn disable_high_precision(&mut self, backend: &str, tracer: &mut Tracer<'_>) {
        log::warn!("backend `{backend}` has no high-precision images; dithering disabled");
        self.high.unsupported = true;
        tracer.feature_disabled(&FeatureDisabledEvent {
            frame_index: self.frame_index,
            feature: Feature::HighPrecision,
        });
    }

    fn background_image(&mut self, backend: &mut dyn Backend) -> Option<ImageHandle> {
        if let Some(image) = self.background.image {
            return Some(image);
        }
        let image = match self.background.surface {
            Some(surface) => {
                let image = backend.bind_external_surface(surface, &FormatInfo::RGB24);
                if image.is_none() {
                    log::warn!("cannot bind root surface {surface:?}; using the background color");
                }
                image
            }
            None => None,
        };
        let image = match image {
            Some(image) => image,
            None => solid_image(backend, self.options.background_color)?,
        };
        self.background.image = Some(image);
        Some(image)
    }

    fn paint_background(&mut self, backend: &mut dyn Backend, stack: &WindowStack, frame: &mut Frame) {
        let region = if self.options.transparent_clipping {
            frame.paint.clone()
        } else {
            frame.paint.subtract(stack.coverage())
        };
        if region.is_empty() {
            return;
        }
        let Some(image) = self.background_image(backend) else {
            log::warn!("no background image; leaving the background unpainted");
            return;
        };
        let screen = self.params.screen;
        let args = BlitArgs::new(image, region, screen.size());
        if backend.blit(screen.origin(), frame.target, &args) {
            frame.summary.blit();
        } else {
            log::warn!("background blit failed");
        }
    }

    fn paint_windows(
        &mut self,
        backend: &mut dyn Backend,
        stack: &mut WindowStack,
        tracer: &mut Tracer<'_>,
        frame: &mut Frame,
    ) {
        let order: Vec<u32> = stack.paint_order().to_vec();
        let mut shadow_clip = Region::new();
        for &idx in order.iter().rev() {
            let geometry = stack.geometry_at(idx);
            let flags = stack.flags_at(idx);
            let opacity = f64::from(stack.opacity_at(idx));
            let visible = frame.paint.subtract(stack.reg_ignore_at(idx));

            if flags.shadow
                && let Some(shadow) = self.params.shadow
            {
                let mut region = visible
                    .subtract(&self.shadow_exclude)
                    .subtract(&shadow_clip)
                    .intersect_rect(shadow.rect(geometry));
                if !flags.full_shadow {
                    region.subtract_with(stack.rounded_bounding_at(idx));
                }
                if self.options.shadow.crop_to_monitor {
                    let monitor = stack
                        .monitor_at(idx)
                        .and_then(|m| self.monitors.get(m as usize).copied())
                        .unwrap_or(self.params.screen);
                    region = region.intersect_rect(monitor);
                }
                if !region.is_empty() {
                    self.paint_shadow(backend, stack, idx, region, tracer, frame);
                }
            }

            if opacity >= MIN_ALPHA {
                if flags.clip_shadow_above {
                    shadow_clip.union_with(stack.bounding_at(idx));
                } else {
                    shadow_clip.subtract_with(stack.bounding_at(idx));
                }
            }

            // `visible` already lies inside the screen, so transparent
            // clipping adds nothing here.
            let region = visible.intersect(stack.bounding_at(idx));
            if region.is_empty() {
                continue;
            }

            if flags.blur_background
                && let Some(ctx) = frame.blur
            {
                self.blur_behind(backend, stack, idx, ctx, &region, frame);
            }

            if opacity < MIN_ALPHA {
                continue;
            }
            self.paint_body(backend, stack, idx, region, tracer, frame);
        }
    }

    fn paint_shadow(
        &mut self,
        backend: &mut dyn Backend,
        stack: &WindowStack,
        idx: u32,
        region: Region,
        tracer: &mut Tracer<'_>,
        frame: &mut Frame,
    ) {
        let Some(geometry) = self.params.shadow.map(|s| s.rect(stack.geometry_at(idx))) else {
            return;
        };
        let shadow = self.shadows.shadow_for(
            backend,
            stack.id_at(idx),
            stack.geometry_at(idx).size(),
            stack.corner_radius_at(idx),
            stack.flags_at(idx).full_shadow,
        );
        if self.shadows.take_blur_disabled() {
            tracer.feature_disabled(&FeatureDisabledEvent {
                frame_index: frame.index,
                feature: Feature::ShadowBlur,
            });
        }
        let Some(shadow) = shadow else {
            return;
        };
        let args = BlitArgs {
            source_mask: Some(MaskImage::from_image(shadow.mask, Point::ZERO, shadow.size)),
            opacity: f64::from(stack.opacity_at(idx)),
            ..BlitArgs::new(shadow.color, region, shadow.size)
        };
        if backend.blit(geometry.origin(), frame.target, &args) {
            frame.summary.blit();
            frame.summary.shadow();
        } else {
            log::warn!("shadow blit failed for window {idx}");
        }
    }

    fn blur_behind(
        &mut self,
        backend: &mut dyn Backend,
        stack: &WindowStack,
        idx: u32,
        ctx: BlurContextId,
        region: &Region,
        frame: &mut Frame,
    ) {
        let blur_opacity = f64::from(stack.blur_opacity_at(idx));
        if blur_opacity < MIN_ALPHA {
            return;
        }
        let geometry = stack.geometry_at(idx);
        let target_mask = match stack.mode_at(idx) {
            _ if self.params.force_win_blend => region.clone(),
            WindowMode::Trans => region.clone(),
            WindowMode::FrameTrans if self.options.blur.background_frame => {
                let pieces = frame_pieces(geometry, stack.frame_extents_at(idx));
                let frame_region = Region::from_rects(&pieces.margins);
                region.intersect(&frame_region)
            }
            _ => return,
        };
        if target_mask.is_empty() {
            return;
        }
        let radius = stack.corner_radius_at(idx);
        let source_mask = (radius > 0).then(|| MaskImage {
            origin: geometry.origin(),
            ..MaskImage::from_region(stack.bounding_at(idx).clone())
                .with_corner_radius(f64::from(radius))
        });
        let args = BlurArgs {
            blur_context: ctx,
            source_mask,
            target_mask,
            source: frame.target,
            opacity: blur_opacity,
        };
        if backend.blur(Point::ZERO, frame.target, &args) {
            frame.summary.blur();
        } else {
            log::warn!("background blur failed for window {idx}");
        }
    }

    fn paint_body(
        &mut self,
        backend: &mut dyn Backend,
        stack: &mut WindowStack,
        idx: u32,
        region: Region,
        tracer: &mut Tracer<'_>,
        frame: &mut Frame,
    ) {
        let id = stack.id_at(idx);
        let geometry = stack.geometry_at(idx);
        let flags = stack.flags_at(idx);
        let opacity = f64::from(stack.opacity_at(idx));
        let Some(surface) = stack.surface_at(idx) else {
            return;
        };
        let info = if flags.has_alpha {
            FormatInfo::ARGB32
        } else {
            FormatInfo::RGB24
        };
        let Some(image) =
            self.windows
                .image_for(backend, id, surface, &info, &mut self.released_surfaces)
        else {
            log::warn!("cannot bind surface {surface:?} of window {idx}; excluding it");
            stack.set_image_error(id, true);
            return;
        };
        frame.summary.window_painted();

        let size = geometry.size();
        let inverted = if flags.invert_color && !self.invert_disabled {
            let scratch = self.invert_image(backend, image, size, frame);
            if scratch.is_none() {
                log::warn!("color inversion failed; painting windows uninverted");
                self.invert_disabled = true;
                tracer.feature_disabled(&FeatureDisabledEvent {
                    frame_index: frame.index,
                    feature: Feature::ColorInversion,
                });
            }
            scratch
        } else {
            None
        };

        let extents = stack.frame_extents_at(idx);
        let mut border_width = stack.border_width_at(idx);
        if border_width == 0 {
            let side = extents.left.min(extents.right).min(extents.bottom).max(0);
            border_width = u32::try_from(side).unwrap_or(0);
        }
        let dim = if flags.dim {
            let scale = if self.options.inactive_dim_fixed {
                1.0
            } else {
                opacity
            };
            self.options.inactive_dim * scale
        } else {
            0.0
        };
        let base = BlitArgs {
            opacity,
            dim,
            max_brightness: self.options.max_brightness,
            corner_radius: f64::from(stack.corner_radius_at(idx)),
            border_width,
            ..BlitArgs::new(inverted.unwrap_or(image), region, size)
        };

        let frame_opacity = f64::from(stack.frame_opacity_at(idx));
        let origin = geometry.origin();
        // Margins and body share one opacity once the frame factor reaches 1.
        if frame_opacity >= 1.0 || extents.is_zero() {
            self.blit(backend, origin, &base, frame);
        } else {
            let pieces = frame_pieces(geometry, extents);
            for margin in pieces.margins {
                let args = BlitArgs {
                    target_mask: base.target_mask.intersect_rect(margin),
                    opacity: opacity * frame_opacity,
                    ..base.clone()
                };
                if !args.target_mask.is_empty() {
                    self.blit(backend, origin, &args, frame);
                }
            }
            let body = BlitArgs {
                target_mask: base.target_mask.intersect_rect(pieces.body),
                ..base
            };
            if !body.target_mask.is_empty() {
                self.blit(backend, origin, &body, frame);
            }
        }

        if let Some(scratch) = inverted {
            backend.release_image(scratch);
        }
    }

    fn blit(&self, backend: &mut dyn Backend, origin: Point, args: &BlitArgs, frame: &mut Frame) {
        if backend.blit(origin, frame.target, args) {
            frame.summary.blit();
        } else {
            log::warn!("blit of {:?} at {origin:?} failed", args.source);
        }
    }

    /// Copies `image` into a scratch image with its colors inverted.
    fn invert_image(
        &self,
        backend: &mut dyn Backend,
        image: ImageHandle,
        size: Size,
        frame: &mut Frame,
    ) -> Option<ImageHandle> {
        let scratch = backend.new_image(ImageFormat::Pixmap, size)?;
        let args = BlitArgs {
            color_inverted: true,
            ..BlitArgs::new(
                image,
                Region::from_rect(Rect::from_origin_size(Point::ZERO, size)),
                size,
            )
        };
        if backend.clear(scratch, Color::TRANSPARENT) && backend.blit(Point::ZERO, scratch, &args) {
            frame.summary.blit();
            Some(scratch)
        } else {
            backend.release_image(scratch);
            None
        }
    }

    fn paint_repaint_tint(&self, backend: &mut dyn Backend, repaint: &Region, frame: &mut Frame) {
        let Some(tint) = solid_image(backend, REPAINT_TINT) else {
            return;
        };
        let screen = self.params.screen;
        let args = BlitArgs {
            opacity: REPAINT_TINT_OPACITY,
            ..BlitArgs::new(tint, repaint.clone(), screen.size())
        };
        self.blit(backend, screen.origin(), &args, frame);
        backend.release_image(tint);
    }
}
