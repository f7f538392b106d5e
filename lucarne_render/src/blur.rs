// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Background blur: method parameters, backend-side contexts and the
//! compositor-side engine.
//!
//! A blur has two halves. Backends keep a [`BlurContext`] per handle they
//! return from [`Backend::create_blur_context`]: it owns the cached
//! intermediate images and normalized kernels. The compositor holds a
//! [`BlurEngine`], which creates the context lazily, disables blur for good
//! if that fails, and tells the frame loop how far damage must grow so
//! blurred pixels are re-sampled.

use hashbrown::HashMap;
use lucarne_core::geom::{Rect, Size};
use lucarne_core::kernel::{
    DualKawaseParams, Kernel, blur_center_factor, box_blur_kernels, gaussian_blur_kernels,
    kawase_level_extent, kernels_blur_size,
};
use lucarne_core::region::Region;
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::image::{BlurContextId, ImageFormat, ImageHandle};

/// Blur algorithm selected in the options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurMethod {
    /// No blur.
    #[default]
    None,
    /// User-supplied convolution kernels applied as chained passes.
    Kernel,
    /// Separable box filter.
    Box,
    /// Separable gaussian filter.
    Gaussian,
    /// Downsample/upsample pyramid.
    DualKawase,
}

/// Method-specific blur parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum BlurKind {
    /// Explicit kernels, one pass each.
    Kernel(Vec<Kernel>),
    /// Box passes of width `2 * size + 1`.
    Box {
        /// Half width.
        size: u32,
    },
    /// Gaussian passes of width `2 * size + 1`.
    Gaussian {
        /// Half width.
        size: u32,
        /// Standard deviation.
        deviation: f64,
    },
    /// Dual-Kawase pyramid.
    DualKawase {
        /// Gaussian radius to imitate when `strength` is zero.
        size: u32,
        /// Strength level, `1..=20`, or zero to derive it from `size`.
        strength: u32,
    },
}

/// Everything a backend needs to create a blur context.
#[derive(Clone, Debug, PartialEq)]
pub struct BlurParams {
    /// Method and its parameters.
    pub kind: BlurKind,
    /// Blur with constant strength regardless of window opacity.
    pub fixed: bool,
}

impl BlurParams {
    /// Creates parameters with opacity-dependent strength.
    #[must_use]
    pub fn new(kind: BlurKind) -> Self {
        Self { kind, fixed: false }
    }

    /// The method these parameters select.
    #[must_use]
    pub fn method(&self) -> BlurMethod {
        match self.kind {
            BlurKind::Kernel(_) => BlurMethod::Kernel,
            BlurKind::Box { .. } => BlurMethod::Box,
            BlurKind::Gaussian { .. } => BlurMethod::Gaussian,
            BlurKind::DualKawase { .. } => BlurMethod::DualKawase,
        }
    }

    /// Convolution passes, or `None` for dual-Kawase.
    #[must_use]
    pub fn convolution_kernels(&self) -> Option<Vec<Kernel>> {
        match &self.kind {
            BlurKind::Kernel(kernels) => Some(kernels.clone()),
            BlurKind::Box { size } => Some(box_blur_kernels(*size).to_vec()),
            BlurKind::Gaussian { size, deviation } => {
                Some(gaussian_blur_kernels(*size, *deviation).to_vec())
            }
            BlurKind::DualKawase { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend side
// ---------------------------------------------------------------------------

/// Image allocation used by [`BlurContext`] for its intermediates.
///
/// Backends implement this on their image store, so a context can be
/// borrowed mutably alongside it.
pub trait ScratchImages {
    /// Allocates an image.
    fn new_image(&mut self, format: ImageFormat, size: Size) -> Option<ImageHandle>;
    /// Frees an image.
    fn release_image(&mut self, image: ImageHandle);
}

#[derive(Clone, Debug)]
enum Plan {
    Convolution {
        kernels: Vec<Kernel>,
        normalized: Vec<Kernel>,
        factor: Option<f64>,
    },
    DualKawase(DualKawaseParams),
}

/// Backend-side state behind a [`BlurContextId`].
#[derive(Clone, Debug)]
pub struct BlurContext {
    format: ImageFormat,
    plan: Plan,
    fixed: bool,
    intermediates: Vec<ImageHandle>,
    /// Padded size and level count the intermediates were made for.
    cached: Option<(Size, u32)>,
}

impl BlurContext {
    /// Builds a context, or `None` if the parameters describe no blur (an
    /// empty kernel list).
    #[must_use]
    pub fn new(params: &BlurParams, format: ImageFormat) -> Option<Self> {
        let plan = match &params.kind {
            BlurKind::DualKawase { size, strength } => {
                Plan::DualKawase(DualKawaseParams::new(*size, *strength))
            }
            _ => {
                let kernels = params.convolution_kernels()?;
                if kernels.is_empty() {
                    return None;
                }
                Plan::Convolution {
                    kernels,
                    normalized: Vec::new(),
                    factor: None,
                }
            }
        };
        Some(Self {
            format,
            plan,
            fixed: params.fixed,
            intermediates: Vec::new(),
            cached: None,
        })
    }

    /// Format of the images this context blurs.
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Extra pixels sampled beyond the blurred area, `(horizontal, vertical)`.
    #[must_use]
    pub fn blur_size(&self) -> (u32, u32) {
        match &self.plan {
            Plan::Convolution { kernels, .. } => kernels_blur_size(kernels),
            Plan::DualKawase(p) => (p.expand(), p.expand()),
        }
    }

    /// Dual-Kawase parameters, if this is a dual-Kawase context.
    #[must_use]
    pub fn dual_kawase(&self) -> Option<DualKawaseParams> {
        match self.plan {
            Plan::DualKawase(p) => Some(p),
            Plan::Convolution { .. } => None,
        }
    }

    /// Iterations to run for a blurred area of `area`.
    ///
    /// Halves stop once a level would be smaller than a pixel: the count is
    /// reduced while either dimension is below `2^(iterations - 1)`.
    #[must_use]
    pub fn kawase_iterations(&self, area: Size) -> u32 {
        let Plan::DualKawase(p) = self.plan else {
            return 0;
        };
        let mut iterations = p.iterations;
        while iterations > 1 {
            let min = 1_u32 << (iterations - 1);
            if area.width >= min && area.height >= min {
                break;
            }
            iterations -= 1;
        }
        iterations
    }

    /// Convolution passes normalized for a window of `opacity`.
    ///
    /// The normalized set is cached and only rebuilt when the centre factor
    /// changes. Fixed-strength contexts reuse any existing cache.
    pub fn kernels_for(&mut self, opacity: f64) -> &[Kernel] {
        let fixed = self.fixed;
        match &mut self.plan {
            Plan::Convolution {
                kernels,
                normalized,
                factor,
            } => {
                let wanted = blur_center_factor(opacity, fixed);
                let stale = match *factor {
                    None => true,
                    Some(_) if fixed => false,
                    Some(f) => f != wanted,
                };
                if stale {
                    *normalized = kernels.iter().map(|k| k.normalized(wanted)).collect();
                    *factor = Some(wanted);
                }
                normalized.as_slice()
            }
            Plan::DualKawase(_) => &[],
        }
    }

    /// Intermediate images sized for blurring `area` (without the sampling
    /// margin, which is added here).
    ///
    /// Convolution uses two ping-pong images. Dual-Kawase uses one image per
    /// pyramid level. When the size changes every old image is released
    /// before any new one is allocated. Returns `None` if allocation fails,
    /// leaving no intermediates behind.
    pub fn ensure_intermediates(
        &mut self,
        images: &mut dyn ScratchImages,
        area: Size,
    ) -> Option<&[ImageHandle]> {
        let (bw, bh) = self.blur_size();
        let padded = Size::new(
            area.width.saturating_add(bw.saturating_mul(2)),
            area.height.saturating_add(bh.saturating_mul(2)),
        );
        let levels = match self.plan {
            Plan::Convolution { .. } => 2,
            Plan::DualKawase(_) => self.kawase_iterations(area),
        };
        if self.cached == Some((padded, levels)) && !self.intermediates.is_empty() {
            return Some(&self.intermediates);
        }
        self.release(images);
        for level in 0..levels {
            let size = match self.plan {
                Plan::Convolution { .. } => padded,
                Plan::DualKawase(_) => Size::new(
                    kawase_level_extent(padded.width, level),
                    kawase_level_extent(padded.height, level),
                ),
            };
            let Some(image) = images.new_image(self.format, size) else {
                log::warn!("failed to allocate {size:?} blur intermediate");
                self.release(images);
                return None;
            };
            self.intermediates.push(image);
        }
        self.cached = Some((padded, levels));
        Some(&self.intermediates)
    }

    /// Currently cached intermediates.
    #[must_use]
    pub fn intermediates(&self) -> &[ImageHandle] {
        &self.intermediates
    }

    /// Releases every cached image.
    pub fn release(&mut self, images: &mut dyn ScratchImages) {
        for image in self.intermediates.drain(..) {
            images.release_image(image);
        }
        self.cached = None;
    }
}

/// Slab of blur contexts for backends.
#[derive(Clone, Debug, Default)]
pub struct BlurContexts {
    next: u32,
    contexts: HashMap<BlurContextId, BlurContext>,
}

impl BlurContexts {
    /// Creates an empty slab.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a context and returns its handle.
    pub fn insert(&mut self, ctx: BlurContext) -> BlurContextId {
        self.next += 1;
        let id = BlurContextId(self.next);
        self.contexts.insert(id, ctx);
        id
    }

    /// Looks up a context.
    #[must_use]
    pub fn get(&self, id: BlurContextId) -> Option<&BlurContext> {
        self.contexts.get(&id)
    }

    /// Looks up a context mutably.
    pub fn get_mut(&mut self, id: BlurContextId) -> Option<&mut BlurContext> {
        self.contexts.get_mut(&id)
    }

    /// Removes a context; the caller releases its images.
    pub fn remove(&mut self, id: BlurContextId) -> Option<BlurContext> {
        self.contexts.remove(&id)
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if no context is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Removes every context, releasing their images.
    pub fn clear(&mut self, images: &mut dyn ScratchImages) {
        for (_, mut ctx) in self.contexts.drain() {
            ctx.release(images);
        }
    }
}

// ---------------------------------------------------------------------------
// Compositor side
// ---------------------------------------------------------------------------

/// Outcome of [`BlurEngine::context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ContextState {
    /// Blur is usable with this context.
    Ready(BlurContextId),
    /// Blur is off, by configuration or an earlier failure.
    Off,
    /// Creation failed just now; blur is disabled from here on.
    JustDisabled,
}

/// The compositor's handle on background blur.
#[derive(Clone, Debug)]
pub struct BlurEngine {
    params: Option<BlurParams>,
    context: Option<BlurContextId>,
    disabled: bool,
}

impl BlurEngine {
    /// Creates an engine. `None` means blur is not configured.
    #[must_use]
    pub fn new(params: Option<BlurParams>) -> Self {
        Self {
            params,
            context: None,
            disabled: false,
        }
    }

    /// Whether blur is configured and has not been disabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.params.is_some() && !self.disabled
    }

    /// Parameters blur was configured with.
    #[must_use]
    pub fn params(&self) -> Option<&BlurParams> {
        self.params.as_ref()
    }

    /// Returns the context, creating it on first use.
    pub(crate) fn context(&mut self, backend: &mut dyn Backend, format: ImageFormat) -> ContextState {
        if !self.is_enabled() {
            return ContextState::Off;
        }
        if let Some(ctx) = self.context {
            return ContextState::Ready(ctx);
        }
        let Some(params) = &self.params else {
            return ContextState::Off;
        };
        match backend.create_blur_context(params, format) {
            Some(ctx) => {
                log::debug!("created {:?} blur context {ctx:?}", params.method());
                self.context = Some(ctx);
                ContextState::Ready(ctx)
            }
            None => {
                log::warn!(
                    "backend `{}` cannot blur with {:?}; blur disabled",
                    backend.name(),
                    params.method()
                );
                self.disabled = true;
                ContextState::JustDisabled
            }
        }
    }

    /// Sampling margin of the current context, `(0, 0)` if there is none.
    #[must_use]
    pub fn blur_size(&self, backend: &dyn Backend) -> (u32, u32) {
        self.context.map_or((0, 0), |ctx| backend.blur_size(ctx))
    }

    /// Grows `region` by `blur_size * windows` on each axis and clips it to
    /// `screen`.
    #[must_use]
    pub fn expand(region: &Region, blur_size: (u32, u32), windows: usize, screen: Rect) -> Region {
        if region.is_empty() || blur_size == (0, 0) || windows == 0 {
            return region.intersect_rect(screen);
        }
        let n = u32::try_from(windows).unwrap_or(u32::MAX);
        let grow = |v: u32| i32::try_from(v.saturating_mul(n)).unwrap_or(i32::MAX / 2);
        region
            .inflate(grow(blur_size.0), grow(blur_size.1))
            .intersect_rect(screen)
    }

    /// Destroys the backend context, if any. Blur stays enabled and a new
    /// context is created on next use.
    pub fn release(&mut self, backend: &mut dyn Backend) {
        if let Some(ctx) = self.context.take() {
            backend.destroy_blur_context(ctx);
        }
    }

    /// Whether a backend context is currently held.
    #[must_use]
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        next: u32,
        live: Vec<ImageHandle>,
        log: Vec<(&'static str, u32)>,
    }

    impl ScratchImages for Recorder {
        fn new_image(&mut self, _format: ImageFormat, _size: Size) -> Option<ImageHandle> {
            self.next += 1;
            self.live.push(ImageHandle(self.next));
            self.log.push(("new", self.next));
            Some(ImageHandle(self.next))
        }

        fn release_image(&mut self, image: ImageHandle) {
            self.live.retain(|i| *i != image);
            self.log.push(("release", image.0));
        }
    }

    fn five_by_five() -> BlurParams {
        let k = Kernel::new(5, 5, vec![1.0; 25]);
        BlurParams::new(BlurKind::Kernel(vec![k.clone(), k]))
    }

    #[test]
    fn two_pass_5x5_samples_four_pixels() {
        let ctx = BlurContext::new(&five_by_five(), ImageFormat::Pixmap).unwrap();
        assert_eq!(ctx.blur_size(), (4, 4), "each 5x5 pass reaches 2 pixels");
    }

    #[test]
    fn box_and_gaussian_blur_size() {
        let b = BlurContext::new(&BlurParams::new(BlurKind::Box { size: 3 }), ImageFormat::Pixmap)
            .unwrap();
        assert_eq!(b.blur_size(), (3, 3));
        let g = BlurContext::new(
            &BlurParams::new(BlurKind::Gaussian {
                size: 2,
                deviation: 0.84,
            }),
            ImageFormat::Pixmap,
        )
        .unwrap();
        assert_eq!(g.blur_size(), (2, 2));
    }

    #[test]
    fn dual_kawase_blur_size_uses_expand() {
        let params = BlurParams::new(BlurKind::DualKawase {
            size: 0,
            strength: 1,
        });
        let ctx = BlurContext::new(&params, ImageFormat::Pixmap).unwrap();
        // One iteration, offset 1.25: 2 * 2 * 2 + 1.
        assert_eq!(ctx.blur_size(), (9, 9));
    }

    #[test]
    fn empty_kernel_list_is_no_blur() {
        let params = BlurParams::new(BlurKind::Kernel(Vec::new()));
        assert!(BlurContext::new(&params, ImageFormat::Pixmap).is_none());
    }

    #[test]
    fn intermediates_are_freed_before_reallocation() {
        let mut images = Recorder::default();
        let mut ctx = BlurContext::new(&five_by_five(), ImageFormat::Pixmap).unwrap();

        let first = ctx
            .ensure_intermediates(&mut images, Size::new(10, 10))
            .unwrap()
            .to_vec();
        assert_eq!(first.len(), 2, "convolution ping-pongs between two images");

        // Same size: reused.
        ctx.ensure_intermediates(&mut images, Size::new(10, 10));
        assert_eq!(images.log.len(), 2, "no new allocation for the same size");

        ctx.ensure_intermediates(&mut images, Size::new(20, 10));
        let tail: Vec<&str> = images.log[2..].iter().map(|(op, _)| *op).collect();
        assert_eq!(tail, ["release", "release", "new", "new"]);
        assert_eq!(images.live.len(), 2, "old intermediates are gone");
    }

    #[test]
    fn kawase_iterations_shrink_for_small_areas() {
        let params = BlurParams::new(BlurKind::DualKawase {
            size: 0,
            strength: 20,
        });
        let ctx = BlurContext::new(&params, ImageFormat::Pixmap).unwrap();
        assert_eq!(ctx.kawase_iterations(Size::new(1000, 1000)), 5);
        assert_eq!(ctx.kawase_iterations(Size::new(1000, 9)), 4);
        assert_eq!(ctx.kawase_iterations(Size::new(3, 3)), 2);
        assert_eq!(ctx.kawase_iterations(Size::new(1, 1)), 1);
    }

    #[test]
    fn kawase_intermediates_follow_level_sizes() {
        let mut images = Recorder::default();
        let params = BlurParams::new(BlurKind::DualKawase {
            size: 0,
            strength: 3,
        });
        let mut ctx = BlurContext::new(&params, ImageFormat::Pixmap).unwrap();
        let n = ctx
            .ensure_intermediates(&mut images, Size::new(100, 100))
            .map(<[ImageHandle]>::len);
        assert_eq!(n, Some(2), "strength 3 runs two iterations");
    }

    #[test]
    fn normalized_kernels_are_cached_per_factor() {
        let mut ctx = BlurContext::new(&five_by_five(), ImageFormat::Pixmap).unwrap();
        let a = ctx.kernels_for(1.0).to_vec();
        let b = ctx.kernels_for(1.0).to_vec();
        assert_eq!(a, b);
        let c = ctx.kernels_for(0.5).to_vec();
        assert_ne!(a, c, "a different opacity changes the centre factor");
    }

    #[test]
    fn fixed_contexts_reuse_the_cache() {
        let mut params = five_by_five();
        params.fixed = true;
        let mut ctx = BlurContext::new(&params, ImageFormat::Pixmap).unwrap();
        let a = ctx.kernels_for(1.0).to_vec();
        let b = ctx.kernels_for(0.2).to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn expansion_scales_with_window_count() {
        let screen = Rect::new(0, 0, 100, 100);
        let damage = Region::from_rect(Rect::new(40, 40, 50, 50));
        let grown = BlurEngine::expand(&damage, (4, 4), 2, screen);
        assert_eq!(grown.extents(), Rect::new(32, 32, 58, 58));
        let clipped = BlurEngine::expand(&damage, (40, 40), 2, screen);
        assert_eq!(clipped.extents(), screen);
    }

    #[test]
    fn slab_hands_out_distinct_ids() {
        let mut slab = BlurContexts::new();
        let ctx = BlurContext::new(&five_by_five(), ImageFormat::Pixmap).unwrap();
        let a = slab.insert(ctx.clone());
        let b = slab.insert(ctx);
        assert_ne!(a, b);
        assert_eq!(slab.len(), 2);
        assert!(slab.remove(a).is_some());
        assert!(slab.get(a).is_none());
    }
}
