// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A backend that draws nothing and records everything.
//!
//! [`DummyBackend`] validates the calls it receives the way a real engine
//! would (capability bits, aliasing, unknown handles) and logs each accepted
//! operation as an [`Op`]. Tests drive the compositor against it and inspect
//! the log. Its failure switches simulate a lost device, a busy swapchain or
//! missing features.

use core::time::Duration;

use hashbrown::HashMap;
use lucarne_core::geom::{Point, Size};
use lucarne_core::region::Region;
use lucarne_core::stack::SurfaceId;

use crate::backend::{Backend, BackendTarget, BlitArgs, BlurArgs, DeviceStatus, Quirks};
use crate::blur::{BlurContext, BlurContexts, BlurParams, ScratchImages};
use crate::error::BackendError;
use crate::image::{BlurContextId, Color, FormatInfo, ImageCaps, ImageFormat, ImageHandle};

/// One accepted backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// `prepare`.
    Prepare(Region),
    /// `blit`.
    Blit {
        /// Where the source lands.
        origin: Point,
        /// Target image.
        target: ImageHandle,
        /// Arguments as passed.
        args: BlitArgs,
    },
    /// `blur`.
    Blur {
        /// Where the source lands.
        origin: Point,
        /// Target image.
        target: ImageHandle,
        /// Arguments as passed.
        args: BlurArgs,
    },
    /// `copy_area` or `copy_area_quantize`.
    CopyArea {
        /// Target image.
        target: ImageHandle,
        /// Source image.
        source: ImageHandle,
        /// Copied region.
        region: Region,
        /// Whether the quantizing variant was used.
        quantize: bool,
    },
    /// `apply_alpha`.
    ApplyAlpha {
        /// Target image.
        target: ImageHandle,
        /// Alpha factor.
        alpha: f64,
        /// Affected region.
        region: Region,
    },
    /// `clear`.
    Clear {
        /// Target image.
        target: ImageHandle,
        /// Fill color.
        color: Color,
    },
    /// An image was created by `new_image`, `upload_mask` or
    /// `bind_external_surface`, or internally for the back buffer.
    NewImage {
        /// The new handle.
        image: ImageHandle,
        /// Its format.
        format: ImageFormat,
        /// Its size.
        size: Size,
    },
    /// `release_image`, including blur intermediates released internally.
    ReleaseImage(ImageHandle),
    /// `create_blur_context`.
    CreateBlurContext(BlurContextId),
    /// `destroy_blur_context`.
    DestroyBlurContext(BlurContextId),
    /// `root_change`.
    RootChange(Size),
    /// `present`.
    Present,
}

#[derive(Clone, Copy, Debug)]
struct ImageInfo {
    format: ImageFormat,
    size: Size,
    caps: ImageCaps,
    surface: Option<SurfaceId>,
}

#[derive(Debug, Default)]
struct Store {
    next: u32,
    images: HashMap<ImageHandle, ImageInfo>,
    ops: Vec<Op>,
}

impl Store {
    fn insert(
        &mut self,
        format: ImageFormat,
        size: Size,
        caps: ImageCaps,
        surface: Option<SurfaceId>,
    ) -> ImageHandle {
        self.next += 1;
        let image = ImageHandle(self.next);
        self.images.insert(
            image,
            ImageInfo {
                format,
                size,
                caps,
                surface,
            },
        );
        self.ops.push(Op::NewImage {
            image,
            format,
            size,
        });
        image
    }

    fn remove(&mut self, image: ImageHandle) -> Option<ImageInfo> {
        let info = self.images.remove(&image)?;
        self.ops.push(Op::ReleaseImage(image));
        Some(info)
    }

    fn caps(&self, image: ImageHandle) -> ImageCaps {
        self.images.get(&image).map_or(ImageCaps::empty(), |i| i.caps)
    }
}

impl ScratchImages for Store {
    fn new_image(&mut self, format: ImageFormat, size: Size) -> Option<ImageHandle> {
        Some(self.insert(format, size, ImageCaps::SRC | ImageCaps::DST, None))
    }

    fn release_image(&mut self, image: ImageHandle) {
        self.remove(image);
    }
}

/// Recording, validating backend with configurable failures.
#[derive(Debug)]
pub struct DummyBackend {
    size: Size,
    buffer_count: u32,
    store: Store,
    contexts: BlurContexts,
    back_buffer: Option<ImageHandle>,
    presents: u32,
    forced_age: Option<i32>,
    busy: bool,
    status: DeviceStatus,
    quirks: Quirks,
    fail_back_buffer: bool,
    fail_blur_context: bool,
    fail_bind: bool,
    high_precision: bool,
    rejected: u32,
}

impl DummyBackend {
    /// Creates a backend for a screen of `size`.
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self::with_target(&BackendTarget::new(size))
    }

    /// Creates a backend for `target`.
    #[must_use]
    pub fn with_target(target: &BackendTarget) -> Self {
        let mut backend = Self {
            size: target.size,
            buffer_count: target.buffer_count.max(1),
            store: Store::default(),
            contexts: BlurContexts::new(),
            back_buffer: None,
            presents: 0,
            forced_age: None,
            busy: false,
            status: DeviceStatus::Normal,
            quirks: Quirks::empty(),
            fail_back_buffer: false,
            fail_blur_context: false,
            fail_bind: false,
            high_precision: true,
            rejected: 0,
        };
        backend.allocate_back_buffer();
        backend
    }

    /// Registry constructor.
    ///
    /// # Errors
    ///
    /// Fails for an empty target.
    pub fn create(target: &BackendTarget) -> Result<Box<dyn Backend>, BackendError> {
        if target.size.is_empty() {
            return Err(BackendError::UnsupportedTarget(format!(
                "empty target {:?}",
                target.size
            )));
        }
        Ok(Box::new(Self::with_target(target)))
    }

    // -- Inspection --

    /// Every accepted operation, oldest first.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.store.ops
    }

    /// Returns and clears the operation log.
    pub fn take_ops(&mut self) -> Vec<Op> {
        core::mem::take(&mut self.store.ops)
    }

    /// Blits in the log, as `(origin, target, args)`.
    pub fn blits(&self) -> impl Iterator<Item = (Point, ImageHandle, &BlitArgs)> {
        self.store.ops.iter().filter_map(|op| match op {
            Op::Blit {
                origin,
                target,
                args,
            } => Some((*origin, *target, args)),
            _ => None,
        })
    }

    /// Number of live images, back buffer included.
    #[must_use]
    pub fn live_images(&self) -> usize {
        self.store.images.len()
    }

    /// Number of live blur contexts.
    #[must_use]
    pub fn live_blur_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Size of a live image.
    #[must_use]
    pub fn image_size(&self, image: ImageHandle) -> Option<Size> {
        self.store.images.get(&image).map(|i| i.size)
    }

    /// Format of a live image.
    #[must_use]
    pub fn image_format(&self, image: ImageHandle) -> Option<ImageFormat> {
        self.store.images.get(&image).map(|i| i.format)
    }

    /// Calls rejected by validation.
    #[must_use]
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    // -- Failure switches --

    /// Overrides the reported buffer age. `None` follows the swapchain.
    pub fn set_buffer_age(&mut self, age: Option<i32>) {
        self.forced_age = age;
    }

    /// Marks a present as outstanding.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Sets the reported device status.
    pub fn set_device_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }

    /// Sets the reported quirks.
    pub fn set_quirks(&mut self, quirks: Quirks) {
        self.quirks = quirks;
    }

    /// Makes the back buffer unavailable, including after `root_change`.
    pub fn set_fail_back_buffer(&mut self, fail: bool) {
        self.fail_back_buffer = fail;
        if fail {
            if let Some(bb) = self.back_buffer.take() {
                self.store.remove(bb);
            }
        } else if self.back_buffer.is_none() {
            self.allocate_back_buffer();
        }
    }

    /// Makes `create_blur_context` fail.
    pub fn set_fail_blur_context(&mut self, fail: bool) {
        self.fail_blur_context = fail;
    }

    /// Makes `bind_external_surface` fail.
    pub fn set_fail_bind(&mut self, fail: bool) {
        self.fail_bind = fail;
    }

    /// Toggles support for [`ImageFormat::PixmapHigh`].
    pub fn set_high_precision(&mut self, supported: bool) {
        self.high_precision = supported;
    }

    fn allocate_back_buffer(&mut self) {
        if self.fail_back_buffer {
            return;
        }
        let caps = ImageCaps::SRC | ImageCaps::DST;
        self.back_buffer = Some(self.store.insert(ImageFormat::Pixmap, self.size, caps, None));
    }

    fn reject(&mut self, what: &str) -> bool {
        log::debug!("dummy backend rejected {what}");
        self.rejected += 1;
        false
    }

    fn can_draw_into(&self, target: ImageHandle) -> bool {
        self.store.caps(target).contains(ImageCaps::DST)
    }

    fn can_read(&self, source: ImageHandle) -> bool {
        self.store.caps(source).contains(ImageCaps::SRC)
    }
}

impl Backend for DummyBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn deinit(&mut self) {
        self.contexts.clear(&mut self.store);
        let images: Vec<ImageHandle> = self.store.images.keys().copied().collect();
        for image in images {
            self.store.remove(image);
        }
        self.back_buffer = None;
    }

    fn root_change(&mut self, size: Size) -> bool {
        self.store.ops.push(Op::RootChange(size));
        self.size = size;
        self.presents = 0;
        if let Some(bb) = self.back_buffer.take() {
            self.store.remove(bb);
        }
        self.allocate_back_buffer();
        self.back_buffer.is_some()
    }

    fn prepare(&mut self, damage: &Region) {
        self.store.ops.push(Op::Prepare(damage.clone()));
    }

    fn present(&mut self) -> bool {
        if self.back_buffer.is_none() {
            return self.reject("present without a back buffer");
        }
        self.store.ops.push(Op::Present);
        self.presents = self.presents.saturating_add(1);
        true
    }

    fn buffer_age(&self) -> i32 {
        if let Some(age) = self.forced_age {
            return age;
        }
        if self.presents < self.buffer_count {
            -1
        } else {
            i32::try_from(self.buffer_count).unwrap_or(-1)
        }
    }

    fn max_buffer_age(&self) -> u32 {
        self.buffer_count.max(5)
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn blit(&mut self, origin: Point, target: ImageHandle, args: &BlitArgs) -> bool {
        if target == args.source {
            return self.reject("aliased blit");
        }
        if !self.can_draw_into(target) || !self.can_read(args.source) {
            return self.reject("blit with missing capabilities");
        }
        if let Some(mask) = args.source_mask.as_ref().and_then(|m| m.image)
            && !self.can_read(mask)
        {
            return self.reject("blit with unreadable mask");
        }
        self.store.ops.push(Op::Blit {
            origin,
            target,
            args: args.clone(),
        });
        true
    }

    fn blur(&mut self, origin: Point, target: ImageHandle, args: &BlurArgs) -> bool {
        if !self.can_draw_into(target) || !self.can_read(args.source) {
            return self.reject("blur with missing capabilities");
        }
        let Some(ctx) = self.contexts.get_mut(args.blur_context) else {
            return self.reject("blur with unknown context");
        };
        let area = args.target_mask.extents().size();
        if ctx.ensure_intermediates(&mut self.store, area).is_none() {
            return false;
        }
        self.store.ops.push(Op::Blur {
            origin,
            target,
            args: args.clone(),
        });
        true
    }

    fn copy_area(
        &mut self,
        origin: Point,
        target: ImageHandle,
        source: ImageHandle,
        region: &Region,
    ) -> bool {
        _ = origin;
        if !self.can_draw_into(target) || !self.can_read(source) {
            return self.reject("copy with missing capabilities");
        }
        self.store.ops.push(Op::CopyArea {
            target,
            source,
            region: region.clone(),
            quantize: false,
        });
        true
    }

    fn copy_area_quantize(
        &mut self,
        origin: Point,
        target: ImageHandle,
        source: ImageHandle,
        region: &Region,
    ) -> bool {
        _ = origin;
        if !self.can_draw_into(target) || !self.can_read(source) {
            return self.reject("quantizing copy with missing capabilities");
        }
        self.store.ops.push(Op::CopyArea {
            target,
            source,
            region: region.clone(),
            quantize: true,
        });
        true
    }

    fn apply_alpha(&mut self, target: ImageHandle, alpha: f64, region: &Region) -> bool {
        if !self.can_draw_into(target) {
            return self.reject("apply_alpha on a read-only image");
        }
        self.store.ops.push(Op::ApplyAlpha {
            target,
            alpha,
            region: region.clone(),
        });
        true
    }

    fn clear(&mut self, target: ImageHandle, color: Color) -> bool {
        if !self.can_draw_into(target) {
            return self.reject("clear on a read-only image");
        }
        self.store.ops.push(Op::Clear { target, color });
        true
    }

    fn new_image(&mut self, format: ImageFormat, size: Size) -> Option<ImageHandle> {
        if !self.is_format_supported(format) {
            return None;
        }
        ScratchImages::new_image(&mut self.store, format, size)
    }

    fn bind_external_surface(
        &mut self,
        surface: SurfaceId,
        info: &FormatInfo,
    ) -> Option<ImageHandle> {
        _ = info;
        if self.fail_bind {
            self.reject("bind");
            return None;
        }
        Some(self.store.insert(
            ImageFormat::Pixmap,
            Size::new(1, 1),
            ImageCaps::SRC,
            Some(surface),
        ))
    }

    fn upload_mask(&mut self, size: Size, coverage: &[u8]) -> Option<ImageHandle> {
        if u64::try_from(coverage.len()).ok() != Some(size.area()) {
            self.reject("mask upload with wrong length");
            return None;
        }
        Some(self.store.insert(ImageFormat::Mask, size, ImageCaps::SRC, None))
    }

    fn release_image(&mut self, image: ImageHandle) -> Option<SurfaceId> {
        if Some(image) == self.back_buffer {
            self.reject("releasing the back buffer");
            return None;
        }
        self.store.remove(image).and_then(|info| info.surface)
    }

    fn back_buffer(&self) -> Option<ImageHandle> {
        self.back_buffer
    }

    fn image_capabilities(&self, image: ImageHandle) -> ImageCaps {
        self.store.caps(image)
    }

    fn is_format_supported(&self, format: ImageFormat) -> bool {
        format != ImageFormat::PixmapHigh || self.high_precision
    }

    fn quirks(&self) -> Quirks {
        self.quirks
    }

    fn device_status(&self) -> DeviceStatus {
        self.status
    }

    fn last_render_time(&self) -> Option<Duration> {
        (self.presents > 0).then_some(Duration::from_micros(250))
    }

    fn create_blur_context(
        &mut self,
        params: &BlurParams,
        format: ImageFormat,
    ) -> Option<BlurContextId> {
        if self.fail_blur_context || !self.is_format_supported(format) {
            return None;
        }
        let id = self.contexts.insert(BlurContext::new(params, format)?);
        self.store.ops.push(Op::CreateBlurContext(id));
        Some(id)
    }

    fn destroy_blur_context(&mut self, ctx: BlurContextId) {
        if let Some(mut context) = self.contexts.remove(ctx) {
            context.release(&mut self.store);
            self.store.ops.push(Op::DestroyBlurContext(ctx));
        }
    }

    fn blur_size(&self, ctx: BlurContextId) -> (u32, u32) {
        self.contexts.get(ctx).map_or((0, 0), BlurContext::blur_size)
    }
}
