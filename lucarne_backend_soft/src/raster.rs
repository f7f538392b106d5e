// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-pixel drawing: blits, copies and coverage.

use kurbo::Insets;
use lucarne_core::geom::{Point, Rect};
use lucarne_core::region::Region;
use lucarne_render::backend::BlitArgs;
use lucarne_render::image::{ImageFormat, MaskImage};

use crate::pixel::Rgba;
use crate::store::{Image, ImageStore};

/// 4×4 Bayer matrix, as rounding thresholds in `0..1`.
const BAYER: [[f32; 4]; 4] = [
    [0.5 / 16.0, 8.5 / 16.0, 2.5 / 16.0, 10.5 / 16.0],
    [12.5 / 16.0, 4.5 / 16.0, 14.5 / 16.0, 6.5 / 16.0],
    [3.5 / 16.0, 11.5 / 16.0, 1.5 / 16.0, 9.5 / 16.0],
    [15.5 / 16.0, 7.5 / 16.0, 13.5 / 16.0, 5.5 / 16.0],
];

/// A rectangle with rounded corners, evaluated as a signed distance field
/// so the curve is antialiased over one pixel.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RoundedCorners {
    inner: kurbo::Rect,
    radius: f64,
}

impl RoundedCorners {
    /// `None` when the radius is too small to round anything.
    pub(crate) fn new(rect: Rect, radius: f64) -> Option<Self> {
        let outer = kurbo::Rect::new(
            f64::from(rect.x1),
            f64::from(rect.y1),
            f64::from(rect.x2),
            f64::from(rect.y2),
        );
        let radius = radius.min(outer.width() / 2.0).min(outer.height() / 2.0);
        (radius >= 0.5).then(|| Self {
            inner: outer - Insets::uniform(radius),
            radius,
        })
    }

    /// Coverage of pixel `(x, y)`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "coverage is clamped to 0..=1"
    )]
    pub(crate) fn coverage(&self, x: i32, y: i32) -> f32 {
        let p = kurbo::Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
        let nearest = kurbo::Point::new(
            p.x.clamp(self.inner.x0, self.inner.x1),
            p.y.clamp(self.inner.y0, self.inner.y1),
        );
        (self.radius - p.distance(nearest) + 0.5).clamp(0.0, 1.0) as f32
    }
}

/// Evaluates a [`MaskImage`] against the store it refers to.
#[derive(Debug)]
pub(crate) struct MaskSampler<'a> {
    mask: &'a MaskImage,
    image: Option<&'a Image>,
    corners: Option<RoundedCorners>,
}

impl<'a> MaskSampler<'a> {
    /// `None` if the mask names an image that does not exist.
    pub(crate) fn new(mask: &'a MaskImage, store: &'a ImageStore) -> Option<Self> {
        let image = match mask.image {
            Some(handle) => Some(store.get(handle)?),
            None => None,
        };
        let shape = image.map_or_else(
            || mask.region.extents(),
            |img| Rect::from_origin_size(mask.origin, img.size),
        );
        Some(Self {
            mask,
            image,
            corners: RoundedCorners::new(shape, mask.corner_radius),
        })
    }

    /// Coverage of source pixel `(x, y)`.
    pub(crate) fn coverage(&self, x: i32, y: i32) -> f32 {
        if !self.mask.region.contains_point(x, y) {
            return 0.0;
        }
        let mut c = self.image.map_or(1.0, |img| {
            img.get(x - self.mask.origin.x, y - self.mask.origin.y).a
        });
        if let Some(corners) = &self.corners {
            c *= corners.coverage(x, y);
        }
        if self.mask.inverted { 1.0 - c } else { c }
    }
}

/// Source pixel for target offset `d` at `scale`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "scaled offsets stay within the target's i32 range"
)]
fn source_coord(d: i32, scale: f64) -> i32 {
    if scale == 1.0 || scale <= 0.0 {
        d
    } else {
        ((f64::from(d) + 0.5) / scale).floor() as i32
    }
}

/// Blends `source` into `target` with the effects in `args`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "effect parameters are clamped to 0..=1 before narrowing"
)]
pub(crate) fn blit(
    target: &mut Image,
    origin: Point,
    source: &Image,
    mask: Option<&MaskSampler<'_>>,
    args: &BlitArgs,
) {
    let opacity = args.opacity.clamp(0.0, 1.0) as f32;
    let dim = args.dim.clamp(0.0, 1.0) as f32;
    let max_brightness = args.max_brightness.clamp(0.0, 1.0) as f32;
    let corners = RoundedCorners::new(
        Rect::from_origin_size(Point::ZERO, args.effective_size),
        args.corner_radius,
    );
    let clip = args.target_mask.intersect_rect(target.bounds());
    for r in clip.rects() {
        for y in r.y1..r.y2 {
            let sy = source_coord(y - origin.y, args.scale.y);
            for x in r.x1..r.x2 {
                let sx = source_coord(x - origin.x, args.scale.x);
                let mut coverage = opacity;
                if let Some(mask) = mask {
                    coverage *= mask.coverage(sx, sy);
                }
                if let Some(corners) = &corners {
                    coverage *= corners.coverage(sx, sy);
                }
                if coverage <= 0.0 {
                    continue;
                }
                let mut px = source.get_wrapped(sx, sy);
                if args.color_inverted {
                    px = px.inverted();
                }
                if dim > 0.0 {
                    px = px.dimmed(dim);
                }
                if max_brightness < 1.0 {
                    px = px.capped(max_brightness);
                }
                let dst = target.get(x, y);
                target.put(x, y, px.scale(coverage).over(dst));
            }
        }
    }
}

/// Copies `region` (target coordinates) from `source` placed at `origin`,
/// clamping reads to the source's edges. Narrowing from a high-precision
/// source is dithered when `dither` is set.
pub(crate) fn copy(
    target: &mut Image,
    origin: Point,
    source: &Image,
    region: &Region,
    dither: bool,
) {
    let dither = dither
        && source.format == ImageFormat::PixmapHigh
        && target.format != ImageFormat::PixmapHigh;
    for r in region.intersect_rect(target.bounds()).rects() {
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                let mut px = source.get_clamped(x - origin.x, y - origin.y);
                if dither {
                    px = px.quantized(BAYER[(y & 3) as usize][(x & 3) as usize]);
                }
                target.put(x, y, px);
            }
        }
    }
}

/// Multiplies `region` of `target` by `alpha`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "alpha is clamped to 0..=1 before narrowing"
)]
pub(crate) fn apply_alpha(target: &mut Image, alpha: f64, region: &Region) {
    let alpha = alpha.clamp(0.0, 1.0) as f32;
    for r in region.intersect_rect(target.bounds()).rects() {
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                let px = target.get(x, y);
                target.put(x, y, px.scale(alpha));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lucarne_core::geom::Size;
    use lucarne_render::image::{Color, ImageCaps, ImageHandle};

    use super::*;

    fn image(format: ImageFormat, w: u32, h: u32, color: Color) -> Image {
        let mut img = Image::new(format, Size::new(w, h), ImageCaps::SRC | ImageCaps::DST);
        img.fill(color);
        img
    }

    fn region(x1: i32, y1: i32, x2: i32, y2: i32) -> Region {
        Region::from_rect(Rect::new(x1, y1, x2, y2))
    }

    #[test]
    fn blit_repeats_the_source_inside_the_target_mask() {
        let mut target = image(ImageFormat::Pixmap, 6, 6, Color::BLACK);
        let source = image(ImageFormat::Pixmap, 1, 1, Color::WHITE);
        let args = BlitArgs::new(ImageHandle(0), region(1, 1, 4, 3), Size::new(1, 1));
        blit(&mut target, Point::new(1, 1), &source, None, &args);
        assert_eq!(target.get(3, 2), Rgba::splat(1.0));
        assert_eq!(target.get(4, 2), Rgba::new(0.0, 0.0, 0.0, 1.0), "outside mask");
    }

    #[test]
    fn blit_applies_opacity_and_dim() {
        let mut target = image(ImageFormat::PixmapHigh, 1, 1, Color::BLACK);
        let source = image(ImageFormat::PixmapHigh, 1, 1, Color::WHITE);
        let mut args = BlitArgs::new(ImageHandle(0), region(0, 0, 1, 1), Size::new(1, 1));
        args.opacity = 0.5;
        args.dim = 0.5;
        blit(&mut target, Point::ZERO, &source, None, &args);
        let px = target.get(0, 0);
        assert!((px.r - 0.25).abs() < 1e-6, "{px:?}");
        assert!((px.a - 1.0).abs() < 1e-6, "{px:?}");
    }

    #[test]
    fn blit_rounds_corners_in_source_space() {
        let mut target = image(ImageFormat::Pixmap, 10, 10, Color::TRANSPARENT);
        let source = image(ImageFormat::Pixmap, 10, 10, Color::WHITE);
        let mut args = BlitArgs::new(ImageHandle(0), region(0, 0, 10, 10), Size::new(10, 10));
        args.corner_radius = 4.0;
        blit(&mut target, Point::ZERO, &source, None, &args);
        assert_eq!(target.get(0, 0).a, 0.0, "corner cut");
        assert_eq!(target.get(5, 5).a, 1.0, "centre kept");
        assert_eq!(target.get(0, 5).a, 1.0, "edge midpoint kept");
        let edge = target.get(1, 1).a;
        assert!(edge > 0.0 && edge < 1.0, "antialiased edge, got {edge}");
    }

    #[test]
    fn mask_image_and_inversion() {
        let mut store = ImageStore::default();
        let mut mask_img = Image::new(ImageFormat::Mask, Size::new(2, 1), ImageCaps::SRC);
        mask_img.put(0, 0, Rgba::splat(1.0));
        let handle = store.insert(mask_img).unwrap();

        let mask = MaskImage::from_image(handle, Point::new(3, 0), Size::new(2, 1));
        let sampler = MaskSampler::new(&mask, &store).unwrap();
        assert_eq!(sampler.coverage(3, 0), 1.0);
        assert_eq!(sampler.coverage(4, 0), 0.0);
        assert_eq!(sampler.coverage(0, 0), 0.0, "outside the region");

        let inverted = mask.clone().inverted();
        let sampler = MaskSampler::new(&inverted, &store).unwrap();
        assert_eq!(sampler.coverage(4, 0), 1.0);
        assert_eq!(sampler.coverage(0, 0), 0.0, "inversion stays inside the region");

        let missing = MaskImage::from_image(ImageHandle(99), Point::ZERO, Size::new(1, 1));
        assert!(MaskSampler::new(&missing, &store).is_none());
    }

    #[test]
    fn scaled_blit_samples_nearest() {
        let mut target = image(ImageFormat::PixmapHigh, 4, 1, Color::TRANSPARENT);
        let mut source = Image::new(ImageFormat::PixmapHigh, Size::new(2, 1), ImageCaps::SRC);
        source.put(0, 0, Rgba::splat(1.0));
        let mut args = BlitArgs::new(ImageHandle(0), region(0, 0, 4, 1), Size::new(2, 1));
        args.scale = kurbo::Vec2::new(2.0, 1.0);
        blit(&mut target, Point::ZERO, &source, None, &args);
        let alphas: Vec<f32> = (0..4).map(|x| target.get(x, 0).a).collect();
        assert_eq!(alphas, [1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn copy_clamps_reads_and_dithers_high_sources() {
        let mut source = Image::new(ImageFormat::PixmapHigh, Size::new(1, 1), ImageCaps::SRC);
        source.put(0, 0, Rgba::splat(100.5 / 255.0));
        let mut target = image(ImageFormat::Pixmap, 4, 4, Color::TRANSPARENT);
        copy(&mut target, Point::ZERO, &source, &region(0, 0, 4, 4), true);
        let lows = (0..16)
            .filter(|i| target.get(i % 4, i / 4).a < 100.9 / 255.0)
            .count();
        assert_eq!(lows, 8, "half the pixels round down");

        copy(&mut target, Point::ZERO, &source, &region(0, 0, 4, 4), false);
        assert!((0..16).all(|i| target.get(i % 4, i / 4) == target.get(0, 0)));
    }

    #[test]
    fn apply_alpha_scales_premultiplied_pixels() {
        let mut target = image(ImageFormat::PixmapHigh, 2, 1, Color::WHITE);
        apply_alpha(&mut target, 0.25, &region(1, 0, 2, 1));
        assert_eq!(target.get(0, 0), Rgba::splat(1.0));
        assert_eq!(target.get(1, 0), Rgba::splat(0.25));
    }
}
