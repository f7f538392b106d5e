// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend image model: handles, formats, capability bits and masks.

use core::fmt;

use bitflags::bitflags;
use lucarne_core::geom::{Point, Rect, Size};
use lucarne_core::region::Region;
use serde::{Deserialize, Serialize};

/// An opaque reference to backend-owned pixel storage.
///
/// Handles are assigned by the backend that created them and are meaningless
/// to any other backend.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageHandle(pub u32);

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageHandle({})", self.0)
    }
}

/// An opaque reference to a backend blur context.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlurContextId(pub u32);

impl fmt::Debug for BlurContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlurContextId({})", self.0)
    }
}

/// An opaque reference to a backend shader.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

impl fmt::Debug for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShaderId({})", self.0)
    }
}

/// Storage format of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Normal render target, also used for bound window surfaces.
    Pixmap,
    /// Higher-precision render target. Support is optional.
    PixmapHigh,
    /// Single-channel coverage, only valid as a mask input.
    Mask,
}

bitflags! {
    /// What an image may be used for.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ImageCaps: u8 {
        /// The image can be read from (blit or copy source).
        const SRC = 1 << 0;
        /// The image can be drawn into.
        const DST = 1 << 1;
    }
}

/// Pixel layout of a platform surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FormatInfo {
    /// Bits of red.
    pub red_bits: u8,
    /// Bits of green.
    pub green_bits: u8,
    /// Bits of blue.
    pub blue_bits: u8,
    /// Bits of alpha; zero for opaque surfaces.
    pub alpha_bits: u8,
    /// Visual depth.
    pub depth: u8,
}

impl FormatInfo {
    /// 8-bit RGB without alpha, depth 24.
    pub const RGB24: Self = Self {
        red_bits: 8,
        green_bits: 8,
        blue_bits: 8,
        alpha_bits: 0,
        depth: 24,
    };

    /// 8-bit RGBA, depth 32.
    pub const ARGB32: Self = Self {
        red_bits: 8,
        green_bits: 8,
        blue_bits: 8,
        alpha_bits: 8,
        depth: 32,
    };

    /// Whether the surface carries an alpha channel.
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.alpha_bits > 0
    }
}

/// A straight-alpha RGBA color with components in `0..=1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red.
    pub r: f64,
    /// Green.
    pub g: f64,
    /// Blue.
    pub b: f64,
    /// Alpha.
    pub a: f64,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a color.
    #[must_use]
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// A coverage mask applied to the source of a blit or blur.
///
/// Coverage at a source point `p` is zero outside [`region`](Self::region).
/// Inside it, coverage comes from [`image`](Self::image) placed at
/// [`origin`](Self::origin) (zero outside the image, one everywhere if there
/// is no image). A positive [`corner_radius`](Self::corner_radius) rounds the
/// corners of the image rectangle, or of the region's extents when there is
/// no image. [`inverted`](Self::inverted) flips the result.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskImage {
    /// Area where the mask applies, in source coordinates.
    pub region: Region,
    /// Mask-format image, if any.
    pub image: Option<ImageHandle>,
    /// Position of the image's top-left corner, in source coordinates.
    pub origin: Point,
    /// Corner rounding radius.
    pub corner_radius: f64,
    /// Invert the coverage inside the region.
    pub inverted: bool,
}

impl MaskImage {
    /// A mask that is exactly `region`.
    #[must_use]
    pub fn from_region(region: Region) -> Self {
        Self {
            region,
            image: None,
            origin: Point::ZERO,
            corner_radius: 0.0,
            inverted: false,
        }
    }

    /// A mask covering `image` placed at `origin`.
    #[must_use]
    pub fn from_image(image: ImageHandle, origin: Point, size: Size) -> Self {
        Self {
            region: Region::from_rect(Rect::from_origin_size(origin, size)),
            image: Some(image),
            origin,
            corner_radius: 0.0,
            inverted: false,
        }
    }

    /// Rounds the corners of the mask shape.
    #[must_use]
    pub fn with_corner_radius(mut self, radius: f64) -> Self {
        self.corner_radius = radius;
        self
    }

    /// Inverts the mask inside its region.
    #[must_use]
    pub fn inverted(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_combine() {
        let caps = ImageCaps::SRC | ImageCaps::DST;
        assert!(caps.contains(ImageCaps::DST));
        assert!(!ImageCaps::SRC.contains(ImageCaps::DST));
    }

    #[test]
    fn mask_from_image_covers_image_bounds() {
        let mask = MaskImage::from_image(ImageHandle(3), Point::new(2, 4), Size::new(10, 5));
        assert_eq!(mask.region.extents(), Rect::new(2, 4, 12, 9));
        assert_eq!(mask.image, Some(ImageHandle(3)));
        assert!(!mask.inverted().with_corner_radius(2.0).region.is_empty());
    }

    #[test]
    fn format_alpha() {
        assert!(FormatInfo::ARGB32.has_alpha());
        assert!(!FormatInfo::RGB24.has_alpha());
    }

    #[test]
    fn handle_debug() {
        assert_eq!(format!("{:?}", ImageHandle(7)), "ImageHandle(7)");
    }
}
