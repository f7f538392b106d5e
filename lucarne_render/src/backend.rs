// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The drawing contract every rendering engine implements.
//!
//! A backend owns one device and one back buffer. The compositor talks to it
//! only through [`Backend`], so engines are interchangeable: the software
//! rasterizer, the recording [`DummyBackend`](crate::dummy::DummyBackend), or
//! a GPU implementation.
//!
//! # Failure contract
//!
//! Drawing operations return `bool` and resource operations return
//! `Option`. A failed operation never panics; the compositor logs it and
//! skips the sub-step that needed it.
//!
//! # Coordinates
//!
//! Every drawing operation takes an `origin`: the position in the target
//! where the source's top-left pixel lands. Target masks are regions in
//! target coordinates. Source masks ([`MaskImage`]) are in source
//! coordinates.

use core::fmt;
use core::time::Duration;

use bitflags::bitflags;
use kurbo::Vec2;
use lucarne_core::geom::{Point, Size};
use lucarne_core::region::Region;
use lucarne_core::stack::SurfaceId;

use crate::blur::BlurParams;
use crate::image::{
    BlurContextId, Color, FormatInfo, ImageCaps, ImageFormat, ImageHandle, MaskImage, ShaderId,
};

/// A `major.minor` interface version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendVersion {
    /// Incremented on incompatible changes.
    pub major: u32,
    /// Incremented on backwards-compatible additions.
    pub minor: u32,
}

impl BackendVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether something implementing `self` satisfies a requirement of
    /// `required`: same major, at least the required minor.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        self.major == required.major && self.minor >= required.minor
    }
}

impl fmt::Display for BackendVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Version of the [`Backend`] trait implemented by this crate.
pub const BACKEND_INTERFACE_VERSION: BackendVersion = BackendVersion::new(1, 0);

/// Whether the backend's device is usable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Normal operation.
    #[default]
    Normal,
    /// The device was lost; every handle is about to become invalid.
    Resetting,
}

bitflags! {
    /// Performance characteristics the compositor should work around.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Quirks: u8 {
        /// Blur is expensive; avoid it when a CPU path exists, for example
        /// when generating shadows.
        const SLOW_BLUR = 1 << 0;
    }
}

/// What a backend is created against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendTarget {
    /// Size of the screen surface.
    pub size: Size,
    /// Number of buffers in the presentation swapchain.
    pub buffer_count: u32,
}

impl BackendTarget {
    /// A double-buffered target of the given size.
    #[must_use]
    pub const fn new(size: Size) -> Self {
        Self {
            size,
            buffer_count: 2,
        }
    }
}

/// Arguments of [`Backend::blit`].
#[derive(Clone, Debug, PartialEq)]
pub struct BlitArgs {
    /// Image to sample. Repeats when the mask extends past its bounds.
    pub source: ImageHandle,
    /// Only source pixels covered by this mask participate.
    pub source_mask: Option<MaskImage>,
    /// Target pixels that may be modified, in target coordinates.
    pub target_mask: Region,
    /// Custom shader, if the backend supports them.
    pub shader: Option<ShaderId>,
    /// Opacity of the source.
    pub opacity: f64,
    /// Dim level in `0..=1`.
    pub dim: f64,
    /// Brightness cap; brighter pixels are scaled down to this value.
    pub max_brightness: f64,
    /// Horizontal and vertical scale factor.
    pub scale: Vec2,
    /// Corner radius of the source, before scaling.
    pub corner_radius: f64,
    /// Size at which the source's corners are rounded, before scaling.
    pub effective_size: Size,
    /// Border width used with `corner_radius` to draw rounded borders.
    pub border_width: u32,
    /// Invert the source colors.
    pub color_inverted: bool,
}

impl BlitArgs {
    /// A plain opaque blit of `source` into `target_mask`.
    #[must_use]
    pub fn new(source: ImageHandle, target_mask: Region, effective_size: Size) -> Self {
        Self {
            source,
            source_mask: None,
            target_mask,
            shader: None,
            opacity: 1.0,
            dim: 0.0,
            max_brightness: 1.0,
            scale: Vec2::new(1.0, 1.0),
            corner_radius: 0.0,
            effective_size,
            border_width: 0,
            color_inverted: false,
        }
    }
}

/// Arguments of [`Backend::blur`].
#[derive(Clone, Debug, PartialEq)]
pub struct BlurArgs {
    /// Context created by [`Backend::create_blur_context`].
    pub blur_context: BlurContextId,
    /// Only source pixels covered by this mask participate.
    pub source_mask: Option<MaskImage>,
    /// Area to blur, in source coordinates.
    pub target_mask: Region,
    /// Image to blur. May be the target itself.
    pub source: ImageHandle,
    /// Opacity of the blurred result over the original pixels.
    pub opacity: f64,
}

/// A rendering engine.
///
/// Lifecycle: the registry calls the backend's constructor with a
/// [`BackendTarget`], the compositor drives it frame by frame, and
/// [`deinit`](Self::deinit) runs before it is dropped.
pub trait Backend {
    // -- Identity --

    /// Backend name, as registered.
    fn name(&self) -> &str;

    /// Interface version this backend implements.
    fn version(&self) -> BackendVersion {
        BACKEND_INTERFACE_VERSION
    }

    // -- Lifecycle --

    /// Releases device resources before the backend is dropped.
    fn deinit(&mut self) {}

    /// Stops rendering, for example while the screen is off.
    fn pause(&mut self) {}

    /// Resumes rendering after [`pause`](Self::pause).
    fn resume(&mut self) {}

    /// The target surface changed size. Previously returned handles stay
    /// valid; the back buffer is reallocated.
    fn root_change(&mut self, size: Size) -> bool;

    // -- Frame --

    /// Advisory: the region about to be painted this frame.
    fn prepare(&mut self, damage: &Region) {
        _ = damage;
    }

    /// Shows the back buffer. Called at most once per frame.
    fn present(&mut self) -> bool;

    /// Age of the back buffer in frames, or `-1` if unknown.
    fn buffer_age(&self) -> i32;

    /// Upper bound for [`buffer_age`](Self::buffer_age).
    fn max_buffer_age(&self) -> u32;

    /// Whether a present is still outstanding.
    fn is_busy(&self) -> bool {
        false
    }

    // -- Drawing --

    /// Blends `args.source` into `target` at `origin`.
    ///
    /// Fails if `target` lacks [`ImageCaps::DST`], the source lacks
    /// [`ImageCaps::SRC`], or they are the same image.
    fn blit(&mut self, origin: Point, target: ImageHandle, args: &BlitArgs) -> bool;

    /// Blurs `args.target_mask` of `args.source` into `target`.
    ///
    /// Samples up to [`blur_size`](Self::blur_size) pixels beyond the mask,
    /// clamped to the source's bounds. Source and target may be the same.
    fn blur(&mut self, origin: Point, target: ImageHandle, args: &BlurArgs) -> bool;

    /// Copies `region` of `source` into `target` without blending.
    /// Samples outside the source clamp to its edges.
    fn copy_area(
        &mut self,
        origin: Point,
        target: ImageHandle,
        source: ImageHandle,
        region: &Region,
    ) -> bool;

    /// Like [`copy_area`](Self::copy_area), but may dither when narrowing
    /// precision.
    fn copy_area_quantize(
        &mut self,
        origin: Point,
        target: ImageHandle,
        source: ImageHandle,
        region: &Region,
    ) -> bool {
        self.copy_area(origin, target, source, region)
    }

    /// Multiplies the alpha of `region` of `target` by `alpha`.
    fn apply_alpha(&mut self, target: ImageHandle, alpha: f64, region: &Region) -> bool;

    /// Fills `target` with `color`. Mask targets only take the alpha.
    fn clear(&mut self, target: ImageHandle, color: Color) -> bool;

    // -- Resources --

    /// Allocates an image.
    fn new_image(&mut self, format: ImageFormat, size: Size) -> Option<ImageHandle>;

    /// Wraps a platform surface as a [`ImageFormat::Pixmap`] image.
    fn bind_external_surface(
        &mut self,
        surface: SurfaceId,
        info: &FormatInfo,
    ) -> Option<ImageHandle>;

    /// Creates a mask image from 8-bit coverage values, row-major.
    fn upload_mask(&mut self, size: Size, coverage: &[u8]) -> Option<ImageHandle> {
        _ = (size, coverage);
        None
    }

    /// Frees an image. Returns the platform surface it wrapped, if any, for
    /// the caller to release.
    fn release_image(&mut self, image: ImageHandle) -> Option<SurfaceId>;

    /// The image to draw the frame into, if it exists.
    fn back_buffer(&self) -> Option<ImageHandle>;

    /// Capability bits of an image; empty for unknown handles.
    fn image_capabilities(&self, image: ImageHandle) -> ImageCaps;

    /// Whether images of `format` can be created.
    fn is_format_supported(&self, format: ImageFormat) -> bool;

    // -- Queries --

    /// Performance quirks.
    fn quirks(&self) -> Quirks {
        Quirks::empty()
    }

    /// Device status.
    fn device_status(&self) -> DeviceStatus {
        DeviceStatus::Normal
    }

    /// Time spent rendering the last presented frame; `None` while still
    /// rendering or if unknown.
    fn last_render_time(&self) -> Option<Duration> {
        None
    }

    // -- Blur contexts --

    /// Creates a context for blurring images of `format`, or `None` if the
    /// method or format is unsupported.
    fn create_blur_context(
        &mut self,
        params: &BlurParams,
        format: ImageFormat,
    ) -> Option<BlurContextId>;

    /// Destroys a context and its cached images.
    fn destroy_blur_context(&mut self, ctx: BlurContextId);

    /// Extra pixels sampled beyond the blurred area, `(horizontal, vertical)`.
    fn blur_size(&self, ctx: BlurContextId) -> (u32, u32);
}

impl fmt::Debug for dyn Backend + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_compatibility() {
        let required = BackendVersion::new(1, 2);
        assert!(BackendVersion::new(1, 2).satisfies(required));
        assert!(BackendVersion::new(1, 5).satisfies(required));
        assert!(!BackendVersion::new(1, 1).satisfies(required));
        assert!(!BackendVersion::new(2, 2).satisfies(required));
        assert!(!BackendVersion::new(0, 9).satisfies(required));
    }

    #[test]
    fn version_display() {
        assert_eq!(BACKEND_INTERFACE_VERSION.to_string(), "1.0");
    }

    #[test]
    fn blit_args_defaults_are_identity() {
        let args = BlitArgs::new(ImageHandle(1), Region::new(), Size::new(1, 1));
        assert_eq!(args.opacity, 1.0);
        assert_eq!(args.dim, 0.0);
        assert_eq!(args.scale, Vec2::new(1.0, 1.0));
        assert!(!args.color_inverted);
    }
}
