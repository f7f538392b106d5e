// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Image storage and the host-side surface pool.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use lucarne_core::geom::{Point, Rect, Size};
use lucarne_core::stack::SurfaceId;
use lucarne_render::blur::ScratchImages;
use lucarne_render::image::{Color, ImageCaps, ImageFormat, ImageHandle};

use crate::pixel::Rgba;

/// Pixel storage behind an [`ImageHandle`].
#[derive(Clone, Debug)]
pub(crate) struct Image {
    pub(crate) format: ImageFormat,
    pub(crate) size: Size,
    pub(crate) caps: ImageCaps,
    pub(crate) surface: Option<SurfaceId>,
    pub(crate) pixels: Vec<Rgba>,
}

impl Image {
    pub(crate) fn new(format: ImageFormat, size: Size, caps: ImageCaps) -> Self {
        Self {
            format,
            size,
            caps,
            surface: None,
            pixels: vec![Rgba::TRANSPARENT; pixel_count(size)],
        }
    }

    pub(crate) fn bounds(&self) -> Rect {
        Rect::from_origin_size(Point::ZERO, self.size)
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let x = usize::try_from(x).ok()?;
        let y = usize::try_from(y).ok()?;
        let (w, h) = (self.size.width as usize, self.size.height as usize);
        (x < w && y < h).then_some(y * w + x)
    }

    /// Pixel at `(x, y)`, transparent outside the image.
    pub(crate) fn get(&self, x: i32, y: i32) -> Rgba {
        self.index(x, y)
            .map_or(Rgba::TRANSPARENT, |i| self.pixels[i])
    }

    /// Pixel at `(x, y)` with coordinates clamped to the edges.
    pub(crate) fn get_clamped(&self, x: i32, y: i32) -> Rgba {
        if self.pixels.is_empty() {
            return Rgba::TRANSPARENT;
        }
        let max_x = i32::try_from(self.size.width).unwrap_or(i32::MAX) - 1;
        let max_y = i32::try_from(self.size.height).unwrap_or(i32::MAX) - 1;
        self.get(x.clamp(0, max_x), y.clamp(0, max_y))
    }

    /// Pixel at `(x, y)` with the image tiled in both directions.
    pub(crate) fn get_wrapped(&self, x: i32, y: i32) -> Rgba {
        if self.pixels.is_empty() {
            return Rgba::TRANSPARENT;
        }
        let w = i32::try_from(self.size.width).unwrap_or(i32::MAX);
        let h = i32::try_from(self.size.height).unwrap_or(i32::MAX);
        self.get(x.rem_euclid(w), y.rem_euclid(h))
    }

    /// Bilinear sample at a continuous position, where pixel `(x, y)` covers
    /// `[x, x + 1) × [y, y + 1)`. Clamps to the edges.
    pub(crate) fn sample(&self, fx: f32, fy: f32) -> Rgba {
        let (x, y) = (fx - 0.5, fy - 0.5);
        let (x0, y0) = (x.floor(), y.floor());
        let (tx, ty) = (x - x0, y - y0);
        let (ix, iy) = (to_i32(x0), to_i32(y0));
        let top = self
            .get_clamped(ix, iy)
            .lerp(self.get_clamped(ix + 1, iy), tx);
        let bottom = self
            .get_clamped(ix, iy + 1)
            .lerp(self.get_clamped(ix + 1, iy + 1), tx);
        top.lerp(bottom, ty)
    }

    /// Stores a pixel, rounding to 8 bits unless the image is high
    /// precision. Writes outside the image are dropped.
    pub(crate) fn put(&mut self, x: i32, y: i32, px: Rgba) {
        let Some(i) = self.index(x, y) else {
            return;
        };
        self.pixels[i] = match self.format {
            ImageFormat::PixmapHigh => px,
            ImageFormat::Pixmap | ImageFormat::Mask => px.quantized(0.5),
        };
    }

    /// Fills the whole image. Masks keep only the alpha.
    pub(crate) fn fill(&mut self, color: Color) {
        let px = Rgba::from_color(color);
        let px = match self.format {
            ImageFormat::Mask => Rgba::splat(px.a).quantized(0.5),
            ImageFormat::Pixmap => px.quantized(0.5),
            ImageFormat::PixmapHigh => px,
        };
        self.pixels.fill(px);
    }
}

/// Number of pixels in an image of `size`.
pub(crate) fn pixel_count(size: Size) -> usize {
    usize::try_from(size.area()).unwrap_or(usize::MAX)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "sample positions are far inside the i32 range"
)]
fn to_i32(v: f32) -> i32 {
    v as i32
}

/// Every live image, with an optional budget on the total pixel count.
#[derive(Debug, Default)]
pub(crate) struct ImageStore {
    next: u32,
    images: HashMap<ImageHandle, Image>,
    budget: Option<u64>,
    used: u64,
}

impl ImageStore {
    pub(crate) fn insert(&mut self, image: Image) -> Option<ImageHandle> {
        let area = image.size.area();
        if let Some(budget) = self.budget
            && self.used.saturating_add(area) > budget
        {
            log::warn!(
                "soft backend out of memory: {area} more pixels with {} of {budget} in use",
                self.used
            );
            return None;
        }
        self.used += area;
        self.next += 1;
        let handle = ImageHandle(self.next);
        self.images.insert(handle, image);
        Some(handle)
    }

    pub(crate) fn remove(&mut self, handle: ImageHandle) -> Option<Image> {
        let image = self.images.remove(&handle)?;
        self.used = self.used.saturating_sub(image.size.area());
        Some(image)
    }

    pub(crate) fn get(&self, handle: ImageHandle) -> Option<&Image> {
        self.images.get(&handle)
    }

    pub(crate) fn get_mut(&mut self, handle: ImageHandle) -> Option<&mut Image> {
        self.images.get_mut(&handle)
    }

    /// Runs `f` with `handle` taken out of the store, so it can be written
    /// while every other image is read.
    pub(crate) fn with_image<R>(
        &mut self,
        handle: ImageHandle,
        f: impl FnOnce(&mut Image, &Self) -> R,
    ) -> Option<R> {
        let mut image = self.images.remove(&handle)?;
        let out = f(&mut image, self);
        self.images.insert(handle, image);
        Some(out)
    }

    pub(crate) fn caps(&self, handle: ImageHandle) -> ImageCaps {
        self.images
            .get(&handle)
            .map_or(ImageCaps::empty(), |i| i.caps)
    }

    pub(crate) fn len(&self) -> usize {
        self.images.len()
    }

    pub(crate) fn set_budget(&mut self, budget: Option<u64>) {
        self.budget = budget;
    }

    /// Drops every image at once, as a lost device does.
    pub(crate) fn clear(&mut self) {
        self.images.clear();
        self.used = 0;
    }
}

impl ScratchImages for ImageStore {
    fn new_image(&mut self, format: ImageFormat, size: Size) -> Option<ImageHandle> {
        self.insert(Image::new(format, size, ImageCaps::SRC | ImageCaps::DST))
    }

    fn release_image(&mut self, image: ImageHandle) {
        self.remove(image);
    }
}

/// Contents of one platform surface.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfacePixels {
    /// Surface size.
    pub size: Size,
    /// Premultiplied pixels, row-major.
    pub pixels: Vec<Rgba>,
}

/// Platform surfaces the host draws into and the backend binds.
///
/// Clones share the same surfaces, so the host keeps one handle and passes
/// another to the backend constructor.
#[derive(Clone, Debug, Default)]
pub struct SurfacePool {
    surfaces: Rc<RefCell<HashMap<SurfaceId, SurfacePixels>>>,
}

impl SurfacePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the contents of `surface`.
    ///
    /// # Panics
    ///
    /// Panics if `pixels` does not hold exactly `size.area()` pixels.
    pub fn set(&self, surface: SurfaceId, size: Size, pixels: Vec<Rgba>) {
        assert_eq!(
            pixels.len(),
            pixel_count(size),
            "surface {surface:?} pixel count does not match {size:?}"
        );
        self.surfaces
            .borrow_mut()
            .insert(surface, SurfacePixels { size, pixels });
    }

    /// Sets the contents of `surface` from straight-alpha 8-bit RGBA bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not `4 * size.area()` long.
    pub fn set_rgba8(&self, surface: SurfaceId, size: Size, bytes: &[u8]) {
        let texels: &[[u8; 4]] = bytemuck::try_cast_slice(bytes)
            .unwrap_or_else(|e| panic!("surface {surface:?} bytes are not RGBA texels: {e}"));
        let pixels = texels.iter().map(|&t| Rgba::from_rgba8(t)).collect();
        self.set(surface, size, pixels);
    }

    /// Fills `surface` with a single color.
    pub fn fill(&self, surface: SurfaceId, size: Size, color: Color) {
        self.set(
            surface,
            size,
            vec![Rgba::from_color(color); pixel_count(size)],
        );
    }

    /// Forgets `surface`.
    pub fn remove(&self, surface: SurfaceId) -> Option<SurfacePixels> {
        self.surfaces.borrow_mut().remove(&surface)
    }

    /// A copy of the contents of `surface`.
    #[must_use]
    pub fn get(&self, surface: SurfaceId) -> Option<SurfacePixels> {
        self.surfaces.borrow().get(&surface).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_and_wrapped_reads() {
        let mut img = Image::new(ImageFormat::PixmapHigh, Size::new(2, 1), ImageCaps::SRC);
        img.put(0, 0, Rgba::splat(0.25));
        img.put(1, 0, Rgba::splat(0.75));
        assert_eq!(img.get(5, 0), Rgba::TRANSPARENT);
        assert_eq!(img.get_clamped(5, -3), Rgba::splat(0.75));
        assert_eq!(img.get_wrapped(2, 0), Rgba::splat(0.25));
        assert_eq!(img.get_wrapped(-1, 7), Rgba::splat(0.75));
    }

    #[test]
    fn bilinear_sample_between_pixel_centres() {
        let mut img = Image::new(ImageFormat::PixmapHigh, Size::new(2, 1), ImageCaps::SRC);
        img.put(0, 0, Rgba::splat(0.0));
        img.put(1, 0, Rgba::splat(1.0));
        assert_eq!(img.sample(1.0, 0.5), Rgba::splat(0.5));
        assert_eq!(img.sample(0.5, 0.5), Rgba::splat(0.0));
        assert_eq!(img.sample(-4.0, 0.5), Rgba::splat(0.0), "clamped");
    }

    #[test]
    fn eight_bit_images_round_on_write() {
        let mut img = Image::new(ImageFormat::Pixmap, Size::new(1, 1), ImageCaps::DST);
        img.put(0, 0, Rgba::splat(0.5));
        assert_eq!(img.get(0, 0), Rgba::splat(128.0 / 255.0));
    }

    #[test]
    fn budget_limits_allocation() {
        let mut store = ImageStore::default();
        store.set_budget(Some(100));
        let a = ScratchImages::new_image(&mut store, ImageFormat::Pixmap, Size::new(8, 8));
        assert!(a.is_some(), "64 pixels fit");
        let b = ScratchImages::new_image(&mut store, ImageFormat::Pixmap, Size::new(8, 8));
        assert!(b.is_none(), "128 pixels do not");
        store.release_image(a.unwrap());
        assert!(ScratchImages::new_image(&mut store, ImageFormat::Pixmap, Size::new(8, 8)).is_some());
    }

    #[test]
    fn pool_is_shared_between_clones() {
        let pool = SurfacePool::new();
        let backend_side = pool.clone();
        pool.set_rgba8(SurfaceId(1), Size::new(1, 1), &[255, 0, 0, 255]);
        let got = backend_side.get(SurfaceId(1)).unwrap();
        assert_eq!(got.pixels, vec![Rgba::new(1.0, 0.0, 0.0, 1.0)]);
    }

    #[test]
    #[should_panic(expected = "pixel count does not match")]
    fn pool_rejects_short_pixel_data() {
        SurfacePool::new().set(SurfaceId(1), Size::new(2, 2), vec![Rgba::TRANSPARENT]);
    }
}
