// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::time::Duration;
use std::time::Instant;

use lucarne_core::geom::{Point, Size};
use lucarne_core::region::Region;
use lucarne_core::stack::SurfaceId;
use lucarne_render::backend::{
    BACKEND_INTERFACE_VERSION, Backend, BackendTarget, BlitArgs, BlurArgs, DeviceStatus, Quirks,
};
use lucarne_render::blur::{BlurContext, BlurContexts, BlurParams, ScratchImages};
use lucarne_render::error::{BackendError, RegistryError};
use lucarne_render::image::{BlurContextId, Color, FormatInfo, ImageCaps, ImageFormat, ImageHandle};
use lucarne_render::registry::BackendRegistry;

use crate::pixel::Rgba;
use crate::raster::{self, MaskSampler};
use crate::store::{Image, ImageStore, SurfacePool};
use crate::swapchain::Swapchain;

/// A backend that rasterizes on the CPU.
///
/// Window contents are read from the [`SurfacePool`] it was created with
/// when a surface is bound. Everything else lives in the backend's own image
/// store.
#[derive(Debug)]
pub struct SoftBackend {
    size: Size,
    buffer_count: u32,
    store: ImageStore,
    contexts: BlurContexts,
    swapchain: Option<Swapchain>,
    pool: SurfacePool,
    status: DeviceStatus,
    quirks: Quirks,
    high_precision: bool,
    paused: bool,
    render_start: Option<Instant>,
    last_render: Option<Duration>,
    presents: u64,
}

impl SoftBackend {
    /// Name the backend registers under.
    pub const NAME: &'static str = "soft";

    /// Creates a backend for `target` that binds surfaces from `pool`.
    ///
    /// # Errors
    ///
    /// Fails for an empty target.
    pub fn new(target: &BackendTarget, pool: SurfacePool) -> Result<Self, BackendError> {
        if target.size.is_empty() {
            return Err(BackendError::UnsupportedTarget(format!(
                "empty target {:?}",
                target.size
            )));
        }
        let buffer_count = target.buffer_count.max(1);
        let mut store = ImageStore::default();
        let swapchain = Swapchain::new(&mut store, target.size, buffer_count).ok_or_else(|| {
            BackendError::InitFailed(format!("cannot allocate {buffer_count} buffers"))
        })?;
        log::debug!(
            "soft backend: {:?} with {buffer_count} buffers",
            target.size
        );
        Ok(Self {
            size: target.size,
            buffer_count,
            store,
            contexts: BlurContexts::new(),
            swapchain: Some(swapchain),
            pool,
            status: DeviceStatus::Normal,
            quirks: Quirks::SLOW_BLUR,
            high_precision: true,
            paused: false,
            render_start: None,
            last_render: None,
            presents: 0,
        })
    }

    /// A registry constructor binding surfaces from `pool`.
    pub fn factory(
        pool: SurfacePool,
    ) -> impl Fn(&BackendTarget) -> Result<Box<dyn Backend>, BackendError> + 'static {
        move |target: &BackendTarget| {
            let backend: Box<dyn Backend> = Box::new(Self::new(target, pool.clone())?);
            Ok(backend)
        }
    }

    /// Registers the backend as [`NAME`](Self::NAME).
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken.
    pub fn register(
        registry: &mut BackendRegistry,
        pool: SurfacePool,
    ) -> Result<(), RegistryError> {
        registry.register_backend(Self::NAME, BACKEND_INTERFACE_VERSION, Self::factory(pool))
    }

    // -- Inspection --

    /// Pixels of a live image, row-major.
    #[must_use]
    pub fn pixels(&self, image: ImageHandle) -> Option<&[Rgba]> {
        self.store.get(image).map(|i| i.pixels.as_slice())
    }

    /// Raw bytes of a live image: four native-endian `f32` per pixel.
    #[must_use]
    pub fn bytes(&self, image: ImageHandle) -> Option<&[u8]> {
        self.pixels(image).map(bytemuck::cast_slice)
    }

    /// One pixel of a live image.
    #[must_use]
    pub fn pixel(&self, image: ImageHandle, x: i32, y: i32) -> Option<Rgba> {
        let img = self.store.get(image)?;
        img.bounds().contains(x, y).then(|| img.get(x, y))
    }

    /// Size of a live image.
    #[must_use]
    pub fn image_size(&self, image: ImageHandle) -> Option<Size> {
        self.store.get(image).map(|i| i.size)
    }

    /// Format of a live image.
    #[must_use]
    pub fn image_format(&self, image: ImageHandle) -> Option<ImageFormat> {
        self.store.get(image).map(|i| i.format)
    }

    /// The buffer shown by the last present.
    #[must_use]
    pub fn front_buffer(&self) -> Option<ImageHandle> {
        self.swapchain.as_ref().and_then(Swapchain::front)
    }

    /// Number of live images, swapchain included.
    #[must_use]
    pub fn live_images(&self) -> usize {
        self.store.len()
    }

    /// Number of live blur contexts.
    #[must_use]
    pub fn live_blur_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Number of successful presents.
    #[must_use]
    pub fn presents(&self) -> u64 {
        self.presents
    }

    // -- Switches --

    /// Sets the reported quirks. Defaults to [`Quirks::SLOW_BLUR`].
    pub fn set_quirks(&mut self, quirks: Quirks) {
        self.quirks = quirks;
    }

    /// Toggles support for [`ImageFormat::PixmapHigh`].
    pub fn set_high_precision(&mut self, supported: bool) {
        self.high_precision = supported;
    }

    /// Caps the total pixel count of live images; allocations past it fail.
    pub fn set_pixel_budget(&mut self, budget: Option<u64>) {
        self.store.set_budget(budget);
    }

    /// Loses the device: every image and blur context is gone and the
    /// status reads [`DeviceStatus::Resetting`] until [`recover`](Self::recover).
    pub fn simulate_device_loss(&mut self) {
        log::warn!("soft backend: device lost");
        self.status = DeviceStatus::Resetting;
        self.contexts = BlurContexts::new();
        self.swapchain = None;
        self.store.clear();
    }

    /// Brings the device back with a fresh swapchain.
    pub fn recover(&mut self) -> bool {
        self.swapchain = Swapchain::new(&mut self.store, self.size, self.buffer_count);
        if self.swapchain.is_some() {
            self.status = DeviceStatus::Normal;
        }
        self.swapchain.is_some()
    }

    fn reject(&self, what: &str) -> bool {
        log::warn!("soft backend rejected {what}");
        false
    }

    fn can_draw_into(&self, target: ImageHandle) -> bool {
        self.store.caps(target).contains(ImageCaps::DST)
    }

    fn can_read(&self, source: ImageHandle) -> bool {
        self.store.caps(source).contains(ImageCaps::SRC)
    }

    fn copy(
        &mut self,
        origin: Point,
        target: ImageHandle,
        source: ImageHandle,
        region: &Region,
        dither: bool,
    ) -> bool {
        if !self.can_draw_into(target) || !self.can_read(source) {
            return self.reject("copy with missing capabilities");
        }
        if target == source {
            let Some(snapshot) = self.store.get(source).cloned() else {
                return false;
            };
            return self.store.get_mut(target).is_some_and(|dst| {
                raster::copy(dst, origin, &snapshot, region, dither);
                true
            });
        }
        self.store
            .with_image(target, |dst, store| {
                store.get(source).is_some_and(|src| {
                    raster::copy(dst, origin, src, region, dither);
                    true
                })
            })
            .unwrap_or(false)
    }
}

impl Backend for SoftBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn deinit(&mut self) {
        self.contexts.clear(&mut self.store);
        if let Some(chain) = self.swapchain.take() {
            chain.release(&mut self.store);
        }
        self.store.clear();
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn root_change(&mut self, size: Size) -> bool {
        if size.is_empty() {
            return self.reject("resize to an empty target");
        }
        if let Some(chain) = self.swapchain.take() {
            chain.release(&mut self.store);
        }
        self.size = size;
        self.swapchain = Swapchain::new(&mut self.store, size, self.buffer_count);
        self.swapchain.is_some()
    }

    fn prepare(&mut self, damage: &Region) {
        log::trace!("soft backend: painting {} px", damage.area());
        self.render_start = Some(Instant::now());
        self.last_render = None;
    }

    fn present(&mut self) -> bool {
        if self.paused {
            log::debug!("soft backend: present while paused");
            return false;
        }
        if self.status == DeviceStatus::Resetting {
            return self.reject("present on a lost device");
        }
        let Some(chain) = self.swapchain.as_mut() else {
            return self.reject("present without a back buffer");
        };
        chain.present();
        self.presents += 1;
        self.last_render = self.render_start.take().map(|start| start.elapsed());
        true
    }

    fn buffer_age(&self) -> i32 {
        self.swapchain.as_ref().map_or(-1, Swapchain::age)
    }

    fn max_buffer_age(&self) -> u32 {
        self.buffer_count
    }

    fn blit(&mut self, origin: Point, target: ImageHandle, args: &BlitArgs) -> bool {
        if target == args.source {
            return self.reject("aliased blit");
        }
        if !self.can_draw_into(target) || !self.can_read(args.source) {
            return self.reject("blit with missing capabilities");
        }
        if let Some(mask) = args.source_mask.as_ref().and_then(|m| m.image)
            && (mask == target || !self.can_read(mask))
        {
            return self.reject("blit with unusable mask");
        }
        self.store
            .with_image(target, |dst, store| {
                let Some(src) = store.get(args.source) else {
                    return false;
                };
                let sampler = match &args.source_mask {
                    Some(mask) => match MaskSampler::new(mask, store) {
                        Some(sampler) => Some(sampler),
                        None => return false,
                    },
                    None => None,
                };
                raster::blit(dst, origin, src, sampler.as_ref(), args);
                true
            })
            .unwrap_or(false)
    }

    fn blur(&mut self, origin: Point, target: ImageHandle, args: &BlurArgs) -> bool {
        if !self.can_draw_into(target) || !self.can_read(args.source) {
            return self.reject("blur with missing capabilities");
        }
        crate::blur::blur(&mut self.store, &mut self.contexts, origin, target, args)
    }

    fn copy_area(
        &mut self,
        origin: Point,
        target: ImageHandle,
        source: ImageHandle,
        region: &Region,
    ) -> bool {
        self.copy(origin, target, source, region, false)
    }

    fn copy_area_quantize(
        &mut self,
        origin: Point,
        target: ImageHandle,
        source: ImageHandle,
        region: &Region,
    ) -> bool {
        self.copy(origin, target, source, region, true)
    }

    fn apply_alpha(&mut self, target: ImageHandle, alpha: f64, region: &Region) -> bool {
        if !self.can_draw_into(target) {
            return self.reject("apply_alpha on a read-only image");
        }
        self.store.get_mut(target).is_some_and(|dst| {
            raster::apply_alpha(dst, alpha, region);
            true
        })
    }

    fn clear(&mut self, target: ImageHandle, color: Color) -> bool {
        if !self.can_draw_into(target) {
            return self.reject("clear on a read-only image");
        }
        self.store.get_mut(target).is_some_and(|dst| {
            dst.fill(color);
            true
        })
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
        let Some(contents) = self.pool.get(surface) else {
            log::warn!("soft backend: no contents for {surface:?}");
            return None;
        };
        let mut image = Image::new(ImageFormat::Pixmap, contents.size, ImageCaps::SRC);
        image.surface = Some(surface);
        image.pixels = if info.has_alpha() {
            contents.pixels
        } else {
            contents.pixels.into_iter().map(Rgba::opaque).collect()
        };
        self.store.insert(image)
    }

    fn upload_mask(&mut self, size: Size, coverage: &[u8]) -> Option<ImageHandle> {
        if u64::try_from(coverage.len()).ok() != Some(size.area()) {
            self.reject("mask upload with wrong length");
            return None;
        }
        let mut image = Image::new(ImageFormat::Mask, size, ImageCaps::SRC);
        image.pixels = coverage
            .iter()
            .map(|&c| Rgba::splat(f32::from(c) / 255.0))
            .collect();
        self.store.insert(image)
    }

    fn release_image(&mut self, image: ImageHandle) -> Option<SurfaceId> {
        if self.swapchain.as_ref().is_some_and(|c| c.contains(image)) {
            self.reject("releasing a swapchain buffer");
            return None;
        }
        self.store.remove(image).and_then(|i| i.surface)
    }

    fn back_buffer(&self) -> Option<ImageHandle> {
        self.swapchain.as_ref().map(Swapchain::back)
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
        self.last_render
    }

    fn create_blur_context(
        &mut self,
        params: &BlurParams,
        format: ImageFormat,
    ) -> Option<BlurContextId> {
        if !self.is_format_supported(format) {
            return None;
        }
        let ctx = BlurContext::new(params, format)?;
        Some(self.contexts.insert(ctx))
    }

    fn destroy_blur_context(&mut self, ctx: BlurContextId) {
        if let Some(mut ctx) = self.contexts.remove(ctx) {
            ctx.release(&mut self.store);
        }
    }

    fn blur_size(&self, ctx: BlurContextId) -> (u32, u32) {
        self.contexts.get(ctx).map_or((0, 0), BlurContext::blur_size)
    }
}
