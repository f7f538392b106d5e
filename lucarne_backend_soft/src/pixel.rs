// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Premultiplied floating-point pixels.

use bytemuck::{Pod, Zeroable};
use lucarne_render::image::Color;

/// Rec. 709 luma weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// A premultiplied RGBA pixel with channels in `0..=1`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Rgba {
    /// Red, premultiplied.
    pub r: f32,
    /// Green, premultiplied.
    pub g: f32,
    /// Blue, premultiplied.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Rgba {
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a pixel from premultiplied channels.
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Premultiplied white with coverage `a`, the way masks store alpha.
    #[must_use]
    pub const fn splat(a: f32) -> Self {
        Self::new(a, a, a, a)
    }

    /// Premultiplies a straight-alpha color.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "channels are clamped to 0..=1 before narrowing"
    )]
    pub fn from_color(color: Color) -> Self {
        let a = color.a.clamp(0.0, 1.0);
        Self::new(
            (color.r.clamp(0.0, 1.0) * a) as f32,
            (color.g.clamp(0.0, 1.0) * a) as f32,
            (color.b.clamp(0.0, 1.0) * a) as f32,
            a as f32,
        )
    }

    /// Premultiplies an 8-bit straight-alpha pixel.
    #[must_use]
    pub fn from_rgba8([r, g, b, a]: [u8; 4]) -> Self {
        let a = f32::from(a) / 255.0;
        Self::new(
            f32::from(r) / 255.0 * a,
            f32::from(g) / 255.0 * a,
            f32::from(b) / 255.0 * a,
            a,
        )
    }

    /// The straight-alpha color of this pixel.
    #[must_use]
    pub fn to_color(self) -> Color {
        if self.a <= 0.0 {
            return Color::TRANSPARENT;
        }
        let a = f64::from(self.a);
        Color::new(
            f64::from(self.r) / a,
            f64::from(self.g) / a,
            f64::from(self.b) / a,
            a,
        )
    }

    /// Multiplies every channel by `k`.
    #[must_use]
    pub fn scale(self, k: f32) -> Self {
        Self::new(self.r * k, self.g * k, self.b * k, self.a * k)
    }

    /// Channel-wise sum.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self::new(
            self.r + other.r,
            self.g + other.g,
            self.b + other.b,
            self.a + other.a,
        )
    }

    /// Porter-Duff source-over.
    #[must_use]
    pub fn over(self, dst: Self) -> Self {
        self.add(dst.scale(1.0 - self.a))
    }

    /// Linear interpolation from `self` towards `to`.
    #[must_use]
    pub fn lerp(self, to: Self, t: f32) -> Self {
        self.scale(1.0 - t).add(to.scale(t))
    }

    /// Inverts the color channels, keeping alpha.
    #[must_use]
    pub fn inverted(self) -> Self {
        Self::new(self.a - self.r, self.a - self.g, self.a - self.b, self.a)
    }

    /// Darkens the color channels by `dim` in `0..=1`.
    #[must_use]
    pub fn dimmed(self, dim: f32) -> Self {
        let k = 1.0 - dim;
        Self::new(self.r * k, self.g * k, self.b * k, self.a)
    }

    /// Scales the color down so its luma does not exceed `max`.
    #[must_use]
    pub fn capped(self, max: f32) -> Self {
        if self.a <= 0.0 {
            return self;
        }
        let luma = (LUMA[0] * self.r + LUMA[1] * self.g + LUMA[2] * self.b) / self.a;
        if luma <= max {
            return self;
        }
        let k = max / luma;
        Self::new(self.r * k, self.g * k, self.b * k, self.a)
    }

    /// Forces alpha to one, for surfaces without an alpha channel.
    #[must_use]
    pub fn opaque(self) -> Self {
        Self::new(self.r, self.g, self.b, 1.0)
    }

    /// Rounds every channel to 8 bits. `bias` in `0..1` is the rounding
    /// threshold: `0.5` rounds to nearest, a dither matrix entry dithers.
    #[must_use]
    pub fn quantized(self, bias: f32) -> Self {
        let q = |v: f32| ((v * 255.0 + bias).floor() / 255.0).clamp(0.0, 1.0);
        Self::new(q(self.r), q(self.g), q(self.b), q(self.a))
    }

    /// Straight-alpha 8-bit channels.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "values are clamped to the u8 range first"
    )]
    pub fn to_rgba8(self) -> [u8; 4] {
        let c = self.to_color();
        let byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;
        [byte(c.r), byte(c.g), byte(c.b), byte(c.a)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Rgba, b: Rgba) -> bool {
        [a.r - b.r, a.g - b.g, a.b - b.b, a.a - b.a]
            .iter()
            .all(|d| d.abs() < 1e-5)
    }

    #[test]
    fn premultiplies_colors() {
        let p = Rgba::from_color(Color::new(1.0, 0.5, 0.0, 0.5));
        assert!(close(p, Rgba::new(0.5, 0.25, 0.0, 0.5)), "{p:?}");
        assert_eq!(Rgba::from_rgba8([255, 255, 255, 0]), Rgba::TRANSPARENT);
    }

    #[test]
    fn source_over() {
        let half_red = Rgba::new(0.5, 0.0, 0.0, 0.5);
        let blue = Rgba::new(0.0, 0.0, 1.0, 1.0);
        assert!(close(half_red.over(blue), Rgba::new(0.5, 0.0, 0.5, 1.0)));
        assert!(close(Rgba::TRANSPARENT.over(blue), blue));
    }

    #[test]
    fn inversion_stays_premultiplied() {
        let p = Rgba::new(0.25, 0.0, 0.5, 0.5).inverted();
        assert!(close(p, Rgba::new(0.25, 0.5, 0.0, 0.5)), "{p:?}");
    }

    #[test]
    fn brightness_cap_uses_luma() {
        let white = Rgba::new(1.0, 1.0, 1.0, 1.0);
        let capped = white.capped(0.5);
        assert!(close(capped, Rgba::new(0.5, 0.5, 0.5, 1.0)), "{capped:?}");
        let dark = Rgba::new(0.1, 0.1, 0.1, 1.0);
        assert_eq!(dark.capped(0.5), dark);
    }

    #[test]
    fn quantization_rounds_or_dithers() {
        let v = Rgba::splat(100.4 / 255.0);
        assert!(close(v.quantized(0.5), Rgba::splat(100.0 / 255.0)));
        assert!(close(v.quantized(0.7), Rgba::splat(101.0 / 255.0)));
        assert!(close(Rgba::splat(1.2).quantized(0.5), Rgba::splat(1.0)));
    }

    #[test]
    fn rgba8_round_trips_opaque_pixels() {
        assert_eq!(Rgba::from_rgba8([10, 20, 30, 255]).to_rgba8(), [10, 20, 30, 255]);
    }
}
