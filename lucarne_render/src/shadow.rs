// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drop shadows.
//!
//! A shadow is a blurred copy of the window rectangle, padded by the shadow
//! radius on every side, drawn in the shadow color. The generator keeps one
//! coverage mask per window and paints it as a repeated 1×1 color image
//! masked by that coverage.
//!
//! Masks are built one of two ways:
//!
//! - **Analytic**: coverage is computed on the CPU from the summed-area
//!   table of a gaussian kernel and uploaded with
//!   [`Backend::upload_mask`]. Used when the backend reports
//!   [`Quirks::SLOW_BLUR`] or has no gaussian blur for masks.
//! - **Blurred**: the window rectangle is drawn into a mask image and blurred
//!   on the backend with a gaussian context.
//!
//! Windows with rounded corners get the rounded body cut out of their mask,
//! so no shadow shows through the corners, unless they ask for a full
//! shadow.

use hashbrown::HashMap;
use lucarne_core::geom::{Point, Rect, Size};
use lucarne_core::kernel::{Kernel, gaussian_std_for_size};
use lucarne_core::region::Region;
use lucarne_core::stack::WindowId;

use crate::backend::{Backend, BlitArgs, BlurArgs, Quirks};
use crate::blur::{BlurKind, BlurParams};
use crate::image::{BlurContextId, Color, ImageFormat, ImageHandle};
use crate::options::ShadowOptions;

/// Row-sum threshold used to pick the gaussian deviation for a radius.
const ROW_LIMIT: f64 = 0.5 / 256.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ShadowKey {
    size: Size,
    corner_radius: u32,
    full_shadow: bool,
}

#[derive(Clone, Copy, Debug)]
struct ShadowEntry {
    key: ShadowKey,
    mask: ImageHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlurState {
    Untried,
    Ready(BlurContextId),
    Unavailable,
}

/// What the compositor needs to draw one shadow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowImage {
    /// 1×1 image in the shadow color.
    pub color: ImageHandle,
    /// Coverage mask of the padded shadow size.
    pub mask: ImageHandle,
    /// Padded shadow size.
    pub size: Size,
}

/// Builds and caches per-window shadow masks.
#[derive(Debug)]
pub struct ShadowGenerator {
    radius: u32,
    offset: Point,
    opacity: f64,
    color: Color,
    kernel: Kernel,
    entries: HashMap<WindowId, ShadowEntry>,
    color_image: Option<ImageHandle>,
    white_image: Option<ImageHandle>,
    blur: BlurState,
    blur_just_disabled: bool,
}

impl ShadowGenerator {
    /// Creates a generator for the given settings.
    #[must_use]
    pub fn new(options: &ShadowOptions) -> Self {
        let mut kernel = Kernel::gaussian_autodetect(options.radius);
        kernel.prepare_sums();
        Self {
            radius: options.radius,
            offset: Point::new(options.offset_x, options.offset_y),
            opacity: options.opacity,
            color: Color {
                a: 1.0,
                ..options.color
            },
            kernel,
            entries: HashMap::new(),
            color_image: None,
            white_image: None,
            blur: BlurState::Untried,
            blur_just_disabled: false,
        }
    }

    /// Shadow radius.
    #[must_use]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Padded size of the shadow of a `window`-sized window.
    #[must_use]
    pub fn shadow_size(&self, window: Size) -> Size {
        let pad = self.radius.saturating_mul(2);
        Size::new(
            window.width.saturating_add(pad),
            window.height.saturating_add(pad),
        )
    }

    /// Number of cached masks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no mask is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of backend images currently held, masks and color images
    /// included.
    #[must_use]
    pub fn held_images(&self) -> usize {
        self.entries.len()
            + usize::from(self.color_image.is_some())
            + usize::from(self.white_image.is_some())
    }

    /// Analytic coverage of a window of `window` size, row-major over the
    /// padded shadow size, scaled by the shadow opacity.
    #[must_use]
    pub fn coverage(&self, window: Size) -> Vec<u8> {
        let size = self.shadow_size(window);
        let d = i32::try_from(self.kernel.width()).unwrap_or(i32::MAX);
        let w = i32::try_from(window.width).unwrap_or(i32::MAX);
        let h = i32::try_from(window.height).unwrap_or(i32::MAX);
        let mut out = Vec::with_capacity(usize::try_from(size.area()).unwrap_or(0));
        for y in 0..i32::try_from(size.height).unwrap_or(0) {
            for x in 0..i32::try_from(size.width).unwrap_or(0) {
                let sum = self.kernel.sum_clamped(d - x - 1, d - y - 1, w, h);
                out.push(to_byte(sum * self.opacity));
            }
        }
        out
    }

    /// Region of a window's rounded body in shadow-local coordinates, the
    /// part cut out of the mask.
    fn cutout(&self, key: ShadowKey) -> Option<Region> {
        if key.full_shadow || key.corner_radius == 0 {
            return None;
        }
        let body = Rect::from_origin_size(Point::new(-self.offset.x, -self.offset.y), key.size);
        Some(Region::from_rounded_rect(body, key.corner_radius))
    }

    /// The shadow of window `id`, building its mask if needed.
    ///
    /// Returns `None` if the mask or color image cannot be created; the
    /// caller skips the shadow for this frame.
    pub fn shadow_for(
        &mut self,
        backend: &mut dyn Backend,
        id: WindowId,
        window: Size,
        corner_radius: u32,
        full_shadow: bool,
    ) -> Option<ShadowImage> {
        let key = ShadowKey {
            size: window,
            corner_radius,
            full_shadow,
        };
        let color = self.color_image(backend)?;
        let mask = match self.entries.get(&id).copied() {
            Some(entry) if entry.key == key => entry.mask,
            _ => {
                self.invalidate(backend, id);
                let mask = self.build(backend, key)?;
                self.entries.insert(id, ShadowEntry { key, mask });
                mask
            }
        };
        Some(ShadowImage {
            color,
            mask,
            size: self.shadow_size(window),
        })
    }

    /// Whether the blurred build path was found unusable since the last call.
    pub fn take_blur_disabled(&mut self) -> bool {
        core::mem::take(&mut self.blur_just_disabled)
    }

    fn color_image(&mut self, backend: &mut dyn Backend) -> Option<ImageHandle> {
        if let Some(image) = self.color_image {
            return Some(image);
        }
        let image = solid_image(backend, self.color)?;
        self.color_image = Some(image);
        Some(image)
    }

    fn build(&mut self, backend: &mut dyn Backend, key: ShadowKey) -> Option<ImageHandle> {
        let use_blur = !backend.quirks().contains(Quirks::SLOW_BLUR);
        if use_blur && let Some(ctx) = self.blur_context(backend) {
            if let Some(mask) = self.build_blurred(backend, ctx, key) {
                return Some(mask);
            }
            log::warn!("blurred shadow failed for {:?}; using analytic shadow", key.size);
        }
        let mask = self.build_analytic(backend, key);
        if mask.is_none() {
            log::warn!("cannot build a {:?} shadow; skipping", key.size);
        }
        mask
    }

    fn build_analytic(&self, backend: &mut dyn Backend, key: ShadowKey) -> Option<ImageHandle> {
        let size = self.shadow_size(key.size);
        let mut coverage = self.coverage(key.size);
        if let Some(cutout) = self.cutout(key) {
            let clip = Rect::from_origin_size(Point::ZERO, size);
            let stride = size.width as usize;
            for r in cutout.intersect_rect(clip).rects() {
                for y in r.y1..r.y2 {
                    let row = usize::try_from(y).unwrap_or(0) * stride;
                    let (x1, x2) = (
                        usize::try_from(r.x1).unwrap_or(0),
                        usize::try_from(r.x2).unwrap_or(0),
                    );
                    coverage[row + x1..row + x2].fill(0);
                }
            }
        }
        backend.upload_mask(size, &coverage)
    }

    fn build_blurred(
        &mut self,
        backend: &mut dyn Backend,
        ctx: BlurContextId,
        key: ShadowKey,
    ) -> Option<ImageHandle> {
        let size = self.shadow_size(key.size);
        let white = self.white_image(backend)?;
        let mask = backend.new_image(ImageFormat::Mask, size)?;
        let full = Region::from_rect(Rect::from_origin_size(Point::ZERO, size));
        let r = i32::try_from(self.radius).unwrap_or(i32::MAX);
        let body = Rect::from_origin_size(Point::new(r, r), key.size);

        let fill = BlitArgs::new(white, Region::from_rect(body), key.size);
        let blur = BlurArgs {
            blur_context: ctx,
            source_mask: None,
            target_mask: full.clone(),
            source: mask,
            opacity: 1.0,
        };
        let ok = backend.clear(mask, Color::TRANSPARENT)
            && backend.blit(Point::ZERO, mask, &fill)
            && backend.blur(Point::ZERO, mask, &blur)
            && backend.apply_alpha(mask, self.opacity, &full)
            && self
                .cutout(key)
                .is_none_or(|cutout| backend.apply_alpha(mask, 0.0, &cutout.intersect(&full)));
        if ok {
            Some(mask)
        } else {
            backend.release_image(mask);
            None
        }
    }

    fn blur_context(&mut self, backend: &mut dyn Backend) -> Option<BlurContextId> {
        match self.blur {
            BlurState::Ready(ctx) => return Some(ctx),
            BlurState::Unavailable => return None,
            BlurState::Untried => {}
        }
        if self.radius == 0 {
            self.blur = BlurState::Unavailable;
            return None;
        }
        let params = BlurParams {
            kind: BlurKind::Gaussian {
                size: self.radius,
                deviation: gaussian_std_for_size(f64::from(self.radius), ROW_LIMIT),
            },
            fixed: true,
        };
        match backend.create_blur_context(&params, ImageFormat::Mask) {
            Some(ctx) => {
                self.blur = BlurState::Ready(ctx);
                Some(ctx)
            }
            None => {
                log::warn!(
                    "backend `{}` cannot blur masks; shadows use the analytic path",
                    backend.name()
                );
                self.blur = BlurState::Unavailable;
                self.blur_just_disabled = true;
                None
            }
        }
    }

    fn white_image(&mut self, backend: &mut dyn Backend) -> Option<ImageHandle> {
        if let Some(image) = self.white_image {
            return Some(image);
        }
        let image = solid_image(backend, Color::WHITE)?;
        self.white_image = Some(image);
        Some(image)
    }

    /// Drops the mask of window `id`.
    pub fn invalidate(&mut self, backend: &mut dyn Backend, id: WindowId) {
        if let Some(entry) = self.entries.remove(&id) {
            backend.release_image(entry.mask);
        }
    }

    /// Drops the mask of whatever window occupied slot `idx`.
    pub fn invalidate_slot(&mut self, backend: &mut dyn Backend, idx: u32) {
        self.entries.retain(|id, entry| {
            if id.index() == idx {
                backend.release_image(entry.mask);
                false
            } else {
                true
            }
        });
    }

    /// Releases every image and the blur context. Returns
    /// `(images released, blur contexts destroyed)`.
    pub fn release_all(&mut self, backend: &mut dyn Backend) -> (u32, u32) {
        let mut images = 0;
        for (_, entry) in self.entries.drain() {
            backend.release_image(entry.mask);
            images += 1;
        }
        for image in [self.color_image.take(), self.white_image.take()]
            .into_iter()
            .flatten()
        {
            backend.release_image(image);
            images += 1;
        }
        let mut contexts = 0;
        if let BlurState::Ready(ctx) = self.blur {
            backend.destroy_blur_context(ctx);
            contexts += 1;
        }
        self.blur = BlurState::Untried;
        (images, contexts)
    }
}

/// A 1×1 pixmap filled with `color`, blitted with repeat.
pub(crate) fn solid_image(backend: &mut dyn Backend, color: Color) -> Option<ImageHandle> {
    let image = backend.new_image(ImageFormat::Pixmap, Size::new(1, 1))?;
    if backend.clear(image, color) {
        Some(image)
    } else {
        backend.release_image(image);
        None
    }
}

fn to_byte(v: f64) -> u8 {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "clamped to the u8 range first"
    )]
    let byte = (v * 255.0).clamp(0.0, 255.0) as u8;
    byte
}

#[cfg(test)]
mod tests {
    use lucarne_core::stack::WindowStack;

    use super::*;
    use crate::dummy::{DummyBackend, Op};

    fn options(radius: u32) -> ShadowOptions {
        ShadowOptions {
            enabled: true,
            radius,
            opacity: 1.0,
            ..ShadowOptions::default()
        }
    }

    fn window_id() -> WindowId {
        let mut stack = WindowStack::new();
        stack.create_window(Rect::from_xywh(0, 0, 10, 10))
    }

    #[test]
    fn analytic_coverage_is_full_in_the_middle_and_fades_out() {
        let r#gen = ShadowGenerator::new(&options(3));
        let window = Size::new(20, 20);
        let cov = r#gen.coverage(window);
        let size = r#gen.shadow_size(window);
        assert_eq!(size, Size::new(26, 26));
        assert_eq!(cov.len(), 26 * 26);
        let at = |x: usize, y: usize| cov[y * 26 + x];
        assert!(at(13, 13) >= 254, "fully covered in the middle");
        assert!(at(0, 0) < at(3, 3), "corners fade");
        assert!(at(0, 13) < at(6, 13), "edges fade");
        assert_eq!(at(0, 0), at(25, 25), "symmetric");
    }

    #[test]
    fn opacity_scales_coverage() {
        let mut opts = options(2);
        opts.opacity = 0.5;
        let r#gen = ShadowGenerator::new(&opts);
        let cov = r#gen.coverage(Size::new(10, 10));
        let centre = cov[7 * 14 + 7];
        assert!((126..=128).contains(&centre), "got {centre}");
    }

    #[test]
    fn slow_blur_backends_use_uploaded_masks() {
        let mut backend = DummyBackend::new(Size::new(100, 100));
        backend.set_quirks(Quirks::SLOW_BLUR);
        let mut r#gen = ShadowGenerator::new(&options(4));
        let shadow = r#gen
            .shadow_for(&mut backend, window_id(), Size::new(10, 10), 0, false)
            .unwrap();
        assert_eq!(shadow.size, Size::new(18, 18));
        assert!(
            !backend.ops().iter().any(|op| matches!(op, Op::Blur { .. })),
            "no blur on slow-blur backends"
        );
        assert_eq!(backend.image_format(shadow.mask), Some(ImageFormat::Mask));
    }

    #[test]
    fn blurred_build_draws_then_blurs_the_mask() {
        let mut backend = DummyBackend::new(Size::new(100, 100));
        let mut r#gen = ShadowGenerator::new(&options(4));
        let shadow = r#gen
            .shadow_for(&mut backend, window_id(), Size::new(10, 10), 3, false)
            .unwrap();
        let on_mask: Vec<&Op> = backend
            .ops()
            .iter()
            .filter(|op| match op {
                Op::Blit { target, .. }
                | Op::Blur { target, .. }
                | Op::ApplyAlpha { target, .. }
                | Op::Clear { target, .. } => *target == shadow.mask,
                _ => false,
            })
            .collect();
        assert!(matches!(on_mask[0], Op::Clear { .. }));
        assert!(matches!(on_mask[1], Op::Blit { .. }));
        assert!(matches!(on_mask[2], Op::Blur { .. }));
        assert!(matches!(on_mask[3], Op::ApplyAlpha { alpha, .. } if *alpha == 1.0));
        assert!(
            matches!(on_mask[4], Op::ApplyAlpha { alpha, .. } if *alpha == 0.0),
            "rounded body is cut out"
        );
    }

    #[test]
    fn full_shadow_skips_the_cutout() {
        let mut backend = DummyBackend::new(Size::new(100, 100));
        let mut r#gen = ShadowGenerator::new(&options(4));
        r#gen.shadow_for(&mut backend, window_id(), Size::new(10, 10), 3, true)
            .unwrap();
        let zeroing = backend
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::ApplyAlpha { alpha, .. } if *alpha == 0.0))
            .count();
        assert_eq!(zeroing, 0);
    }

    #[test]
    fn failed_blur_context_falls_back_once() {
        let mut backend = DummyBackend::new(Size::new(100, 100));
        backend.set_fail_blur_context(true);
        let mut r#gen = ShadowGenerator::new(&options(4));
        assert!(r#gen
            .shadow_for(&mut backend, window_id(), Size::new(10, 10), 0, false)
            .is_some());
        assert!(r#gen.take_blur_disabled());
        assert!(!r#gen.take_blur_disabled(), "reported once");
    }

    #[test]
    fn masks_are_cached_and_rebuilt_on_resize() {
        let mut backend = DummyBackend::new(Size::new(100, 100));
        let mut r#gen = ShadowGenerator::new(&options(4));
        let id = window_id();
        let a = r#gen.shadow_for(&mut backend, id, Size::new(10, 10), 0, false).unwrap();
        let b = r#gen.shadow_for(&mut backend, id, Size::new(10, 10), 0, false).unwrap();
        assert_eq!(a, b);
        let c = r#gen.shadow_for(&mut backend, id, Size::new(12, 10), 0, false).unwrap();
        assert_ne!(a.mask, c.mask);
        assert!(backend.image_size(a.mask).is_none(), "old mask released");
        assert_eq!(r#gen.len(), 1);
    }

    #[test]
    fn analytic_cutout_zeroes_the_rounded_body() {
        let mut backend = DummyBackend::new(Size::new(100, 100));
        backend.set_quirks(Quirks::SLOW_BLUR);
        let opts = ShadowOptions {
            offset_x: 0,
            offset_y: 0,
            ..options(2)
        };
        let r#gen = ShadowGenerator::new(&opts);
        let key = ShadowKey {
            size: Size::new(10, 10),
            corner_radius: 3,
            full_shadow: false,
        };
        let cutout = r#gen.cutout(key).unwrap();
        assert!(cutout.contains_point(5, 5));
        assert!(!cutout.contains_point(0, 0), "corner stays outside the body");
        assert!(r#gen.build_analytic(&mut backend, key).is_some());
    }

    #[test]
    fn release_all_frees_everything() {
        let mut backend = DummyBackend::new(Size::new(100, 100));
        let mut r#gen = ShadowGenerator::new(&options(4));
        r#gen.shadow_for(&mut backend, window_id(), Size::new(10, 10), 0, false)
            .unwrap();
        let (images, contexts) = r#gen.release_all(&mut backend);
        assert_eq!((images, contexts), (3, 1), "mask, color and white images");
        assert_eq!(r#gen.held_images(), 0);
        assert_eq!(backend.live_images(), 1, "only the back buffer is left");
    }
}
