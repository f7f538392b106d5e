// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Convolution kernels for blur and shadow generation.
//!
//! - [`Kernel::gaussian_autodetect`] builds the square kernel used for
//!   analytic shadows. Its summed-area table lets the shadow generator read
//!   the coverage of any window-sized window of the kernel in O(1).
//! - [`box_blur_kernels`] and [`gaussian_blur_kernels`] build the separable
//!   pass pairs used by convolution blur.
//! - [`Kernel::normalized`] rescales a kernel around a centre weight, the
//!   convention convolution filters expect.
//! - [`DualKawaseParams`] maps a blur strength (or a gaussian radius to
//!   imitate) to iteration count and sample offset.

use alloc::vec::Vec;
use core::fmt;

/// A rectangular convolution kernel of `f64` weights.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    width: usize,
    height: usize,
    data: Vec<f64>,
    /// Summed-area table: `rsum[y * w + x]` is the sum of `(0, 0)..=(x, y)`.
    rsum: Option<Vec<f64>>,
}

impl Kernel {
    /// Creates a kernel from row-major weights.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != width * height`.
    #[must_use]
    pub fn new(width: usize, height: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "kernel data does not match {width}x{height}"
        );
        Self {
            width,
            height,
            data,
            rsum: None,
        }
    }

    /// A `size`×`size` gaussian kernel with standard deviation `deviation`,
    /// normalized to sum to one.
    ///
    /// A deviation of zero produces a flat kernel (a sharp shadow edge).
    ///
    /// # Panics
    ///
    /// Panics if `size` is even.
    #[must_use]
    pub fn gaussian(deviation: f64, size: usize) -> Self {
        assert!(size % 2 == 1, "gaussian kernel size must be odd, got {size}");
        let center = (size / 2) as f64;
        let mut data = Vec::with_capacity(size * size);
        let mut total = 0.0;
        for y in 0..size {
            for x in 0..size {
                let g = gaussian(deviation, x as f64 - center, y as f64 - center);
                total += g;
                data.push(g);
            }
        }
        for v in &mut data {
            *v /= total;
        }
        Self::new(size, size, data)
    }

    /// A shadow kernel of width `2 * radius + 1` whose deviation is chosen so
    /// the outermost rows fade to (almost) nothing.
    #[must_use]
    pub fn gaussian_autodetect(radius: u32) -> Self {
        let size = radius as usize * 2 + 1;
        if radius == 0 {
            return Self::gaussian(0.0, size);
        }
        let deviation = gaussian_std_for_size(f64::from(radius), 0.5 / 256.0);
        Self::gaussian(deviation, size)
    }

    /// Kernel width.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Kernel height.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major weights.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Weight at `(x, y)`.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Index of the centre element.
    #[inline]
    #[must_use]
    pub fn center_index(&self) -> usize {
        self.height / 2 * self.width + self.width / 2
    }

    /// Extra pixels this kernel samples on each side, `(w / 2, h / 2)`.
    #[inline]
    #[must_use]
    pub fn reach(&self) -> (u32, u32) {
        (half_extent(self.width), half_extent(self.height))
    }

    /// Builds the summed-area table used by [`sum`](Self::sum).
    pub fn prepare_sums(&mut self) {
        let (w, h) = (self.width, self.height);
        let mut sum = alloc::vec![0.0; w * h];
        for y in 0..h {
            let mut row = 0.0;
            for x in 0..w {
                row += self.data[y * w + x];
                sum[y * w + x] = row + if y > 0 { sum[(y - 1) * w + x] } else { 0.0 };
            }
        }
        self.rsum = Some(sum);
    }

    /// Sum of the weights in the `width`×`height` window whose top-left corner
    /// is `(x, y)`. The window is clipped to the kernel.
    #[must_use]
    pub fn sum(&self, x: i32, y: i32, width: i32, height: i32) -> f64 {
        let x0 = clamp_index(x, self.width);
        let x1 = clamp_index(x.saturating_add(width), self.width);
        let y0 = clamp_index(y, self.height);
        let y1 = clamp_index(y.saturating_add(height), self.height);
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        let d = self.width;
        if let Some(rsum) = &self.rsum {
            let at = |x: usize, y: usize| rsum[y * d + x];
            let v1 = if x0 > 0 { at(x0 - 1, y1 - 1) } else { 0.0 };
            let v2 = if y0 > 0 { at(x1 - 1, y0 - 1) } else { 0.0 };
            let v3 = if x0 > 0 && y0 > 0 {
                at(x0 - 1, y0 - 1)
            } else {
                0.0
            };
            return at(x1 - 1, y1 - 1) - v1 - v2 + v3;
        }
        (y0..y1)
            .flat_map(|yi| (x0..x1).map(move |xi| (xi, yi)))
            .map(|(xi, yi)| self.data[yi * d + xi])
            .sum()
    }

    /// Like [`sum`](Self::sum), clamped to `[0, 1]`.
    #[must_use]
    pub fn sum_clamped(&self, x: i32, y: i32, width: i32, height: i32) -> f64 {
        self.sum(x, y, width, height).clamp(0.0, 1.0)
    }

    /// Rescales the kernel so its weights, with the centre replaced by
    /// `center`, sum to one.
    ///
    /// The stored centre value is ignored. If the resulting sum is zero the
    /// weights are left unscaled.
    #[must_use]
    pub fn normalized(&self, center: f64) -> Self {
        let ci = self.center_index();
        let sum: f64 = center
            + self
                .data
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != ci)
                .map(|(_, v)| v)
                .sum::<f64>();
        let factor = if sum == 0.0 { 1.0 } else { 1.0 / sum };
        let mut data: Vec<f64> = self.data.iter().map(|v| v * factor).collect();
        data[ci] = center * factor;
        Self::new(self.width, self.height, data)
    }

    /// Parses one or more `;`-separated kernels.
    ///
    /// Each kernel is `width,height,` followed by every weight except the
    /// centre, which is implied to be 1. Whitespace around separators is
    /// ignored. The names `3x3box`, `5x5box`, `7x7box`, `3x3gaussian` and
    /// `5x5gaussian` select built-in kernels.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelParseError`] describing the first problem found.
    pub fn parse_list(src: &str) -> Result<Vec<Self>, KernelParseError> {
        let src = match preset(src.trim()) {
            Some(p) => p,
            None => src,
        };
        let mut out = Vec::new();
        for (i, part) in src.split(';').enumerate() {
            if part.trim().is_empty() {
                if i == 0 {
                    return Err(KernelParseError::Empty);
                }
                continue;
            }
            out.push(parse_one(part)?);
        }
        Ok(out)
    }
}

/// Parses a single kernel description.
fn parse_one(src: &str) -> Result<Kernel, KernelParseError> {
    let mut fields = src.split(',').map(str::trim).filter(|f| !f.is_empty());
    let mut number = |what: &'static str| -> Result<f64, KernelParseError> {
        let field = fields.next().ok_or(KernelParseError::MissingValue(what))?;
        field
            .parse::<f64>()
            .map_err(|_| KernelParseError::InvalidNumber)
    };
    let width = number("width")?;
    let height = number("height")?;
    if width <= 0.0 || height <= 0.0 || width.fract() != 0.0 || height.fract() != 0.0 {
        return Err(KernelParseError::BadDimensions);
    }
    #[expect(
        clippy::cast_possible_truncation,
        reason = "dimensions are positive integers checked above"
    )]
    let (w, h) = (width as usize, height as usize);
    if w % 2 == 0 || h % 2 == 0 {
        return Err(KernelParseError::EvenDimensions);
    }
    let skip = h / 2 * w + w / 2;
    let mut data = Vec::with_capacity(w * h);
    for i in 0..w * h {
        if i == skip {
            data.push(1.0);
        } else {
            data.push(number("weight")?);
        }
    }
    if fields.next().is_some() {
        return Err(KernelParseError::TrailingValues);
    }
    Ok(Kernel::new(w, h, data))
}

fn preset(name: &str) -> Option<&'static str> {
    Some(match name {
        "3x3box" => "3,3,1,1,1,1,1,1,1,1",
        "5x5box" => "5,5,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1",
        "7x7box" => {
            "7,7,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,\
             1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1"
        }
        "3x3gaussian" => {
            "3,3,0.243117,0.493069,0.243117,0.493069,0.493069,0.243117,0.493069,0.243117"
        }
        "5x5gaussian" => {
            "5,5,0.003493,0.029143,0.059106,0.029143,0.003493,0.029143,0.243117,\
             0.493069,0.243117,0.029143,0.059106,0.493069,0.493069,0.059106,0.029143,\
             0.243117,0.493069,0.243117,0.029143,0.003493,0.029143,0.059106,0.029143,\
             0.003493"
        }
        _ => return None,
    })
}

/// Error returned by [`Kernel::parse_list`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelParseError {
    /// The description was empty.
    Empty,
    /// A field was missing.
    MissingValue(&'static str),
    /// A field was not a number.
    InvalidNumber,
    /// Width or height was not a positive integer.
    BadDimensions,
    /// Width or height was even.
    EvenDimensions,
    /// More weights than `width * height - 1`.
    TrailingValues,
}

impl fmt::Display for KernelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty blur kernel"),
            Self::MissingValue(what) => write!(f, "blur kernel is missing its {what}"),
            Self::InvalidNumber => f.write_str("blur kernel contains a non-numeric value"),
            Self::BadDimensions => {
                f.write_str("blur kernel width/height must be positive integers")
            }
            Self::EvenDimensions => f.write_str("blur kernel width/height must be odd"),
            Self::TrailingValues => f.write_str("trailing values after blur kernel"),
        }
    }
}

impl core::error::Error for KernelParseError {}

// ---------------------------------------------------------------------------
// Gaussian helpers
// ---------------------------------------------------------------------------

/// 2-D gaussian density. Deviation zero yields a constant.
fn gaussian(r: f64, x: f64, y: f64) -> f64 {
    if r == 0.0 {
        return 1.0;
    }
    libm::exp(-0.5 * (x * x + y * y) / (r * r)) / (2.0 * core::f64::consts::PI * r * r)
}

/// Approximate sum of the first row of a normalized gaussian kernel of
/// half-size `size` and deviation `r`.
fn estimate_first_row_sum(size: f64, r: f64) -> f64 {
    let factor = libm::erf(size / r / core::f64::consts::SQRT_2);
    let a = libm::exp(-0.5 * size * size / (r * r))
        / libm::sqrt(2.0 * core::f64::consts::PI)
        / r;
    a / factor
}

/// Largest deviation (at most `size * 2`) for which no kernel row sums to
/// less than `row_limit`, found by bisection to 0.01.
///
/// # Panics
///
/// Panics if `size` is not positive.
#[must_use]
pub fn gaussian_std_for_size(size: f64, row_limit: f64) -> f64 {
    assert!(size > 0.0, "kernel size must be positive");
    if row_limit >= 1.0 / 2.0 / size {
        return size * 2.0;
    }
    let (mut lo, mut hi) = (0.0, size * 2.0);
    while hi - lo > 1e-2 {
        let mid = (lo + hi) / 2.0;
        if estimate_first_row_sum(size, mid) > row_limit {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    (lo + hi) / 2.0
}

// ---------------------------------------------------------------------------
// Blur kernels
// ---------------------------------------------------------------------------

/// Horizontal and vertical box passes of width `2 * size + 1`.
#[must_use]
pub fn box_blur_kernels(size: u32) -> [Kernel; 2] {
    let r = size as usize * 2 + 1;
    [
        Kernel::new(r, 1, alloc::vec![1.0; r]),
        Kernel::new(1, r, alloc::vec![1.0; r]),
    ]
}

/// Horizontal and vertical gaussian passes of width `2 * size + 1`.
///
/// Weights are not normalized; convolution backends normalize them with
/// [`Kernel::normalized`].
#[must_use]
pub fn gaussian_blur_kernels(size: u32, deviation: f64) -> [Kernel; 2] {
    let s = size as usize;
    let r = s * 2 + 1;
    let mut row = alloc::vec![0.0; r];
    for i in 0..=s {
        let d = (s - i) as f64;
        let v = 1.0 / (libm::sqrt(2.0 * core::f64::consts::PI) * deviation)
            * libm::exp(-(d * d) / (2.0 * deviation * deviation));
        row[i] = v;
        row[r - i - 1] = v;
    }
    [Kernel::new(r, 1, row.clone()), Kernel::new(1, r, row)]
}

/// Sampling margin of a chain of convolution passes: the sum of each pass's
/// [`reach`](Kernel::reach).
#[must_use]
pub fn kernels_blur_size(kernels: &[Kernel]) -> (u32, u32) {
    kernels.iter().fold((0, 0), |(w, h), k| {
        let (kw, kh) = k.reach();
        (w + kw, h + kh)
    })
}

/// Centre weight used when normalizing blur kernels for a window of the given
/// opacity.
///
/// Fixed-strength blur always uses 1. Otherwise more transparent windows get a
/// heavier centre, so their background is blurred less.
#[must_use]
pub fn blur_center_factor(opacity: f64, fixed: bool) -> f64 {
    if fixed {
        return 1.0;
    }
    let pct = 1.0 - opacity * (1.0 - 1.0 / 9.0);
    pct * 8.0 / (1.1 - pct)
}

// ---------------------------------------------------------------------------
// Dual Kawase
// ---------------------------------------------------------------------------

/// (iterations, offset, gaussian radius approximated) per strength level.
const KAWASE_LEVELS: [(u32, f64, u32); 20] = [
    (1, 1.25, 1),
    (1, 2.25, 6),
    (2, 2.00, 11),
    (2, 3.00, 17),
    (2, 4.25, 24),
    (3, 2.50, 32),
    (3, 3.25, 40),
    (3, 4.25, 51),
    (3, 5.50, 67),
    (4, 3.25, 83),
    (4, 4.00, 101),
    (4, 5.00, 123),
    (4, 6.00, 148),
    (4, 7.25, 178),
    (4, 8.25, 208),
    (5, 4.50, 236),
    (5, 5.25, 269),
    (5, 6.25, 309),
    (5, 7.25, 357),
    (5, 8.50, 417),
];

/// Default strength level when neither strength nor size is given.
pub const DEFAULT_KAWASE_STRENGTH: u32 = 5;

/// Parameters of a dual-Kawase blur.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualKawaseParams {
    /// Strength level in `1..=20`.
    pub strength: u32,
    /// Number of downsample (and upsample) passes.
    pub iterations: u32,
    /// Sample offset in half pixels.
    pub offset: f64,
}

impl DualKawaseParams {
    /// Picks parameters for `strength`, or, when `strength` is zero, for the
    /// weakest level that approximates a gaussian of radius `size`.
    ///
    /// Strength above 20 is clamped.
    #[must_use]
    pub fn new(size: u32, strength: u32) -> Self {
        let mut strength = strength.min(20);
        if strength == 0 && size > 0 {
            strength = KAWASE_LEVELS
                .iter()
                .position(|&(_, _, min_radius)| min_radius >= size)
                .and_then(|lvl| u32::try_from(lvl + 1).ok())
                .unwrap_or(20);
        }
        if strength == 0 {
            strength = DEFAULT_KAWASE_STRENGTH;
        }
        let (iterations, offset, _) = KAWASE_LEVELS[strength as usize - 1];
        Self {
            strength,
            iterations,
            offset,
        }
    }

    /// Extra pixels sampled beyond the blurred area on each side.
    #[must_use]
    pub fn expand(&self) -> u32 {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "offsets in the level table are below 10"
        )]
        let offset = libm::ceil(self.offset) as u32;
        (1 << self.iterations) * 2 * offset + 1
    }
}

/// Size of the `level`-th (0-based) downsampled texture for a source extent.
#[must_use]
pub const fn kawase_level_extent(extent: u32, level: u32) -> u32 {
    if extent == 0 {
        return 0;
    }
    1 + ((extent - 1) >> (level + 1))
}

fn half_extent(n: usize) -> u32 {
    u32::try_from(n / 2).unwrap_or(u32::MAX)
}

fn clamp_index(v: i32, len: usize) -> usize {
    usize::try_from(v.max(0)).map_or(0, |v| v.min(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn gaussian_kernel_sums_to_one() {
        let k = Kernel::gaussian(2.0, 7);
        let total: f64 = k.data().iter().sum();
        assert!(approx(total, 1.0), "sum was {total}");
        assert!(k.get(3, 3) > k.get(0, 0), "centre is heaviest");
    }

    #[test]
    fn zero_radius_is_single_pixel() {
        let k = Kernel::gaussian_autodetect(0);
        assert_eq!((k.width(), k.height()), (1, 1));
        assert!(approx(k.get(0, 0), 1.0));
    }

    #[test]
    fn autodetect_fades_edges() {
        let mut k = Kernel::gaussian_autodetect(12);
        assert_eq!(k.width(), 25);
        k.prepare_sums();
        let first_row = k.sum(0, 0, 25, 1);
        assert!(first_row < 0.01, "first row sum {first_row}");
        assert!(approx(k.sum(0, 0, 25, 25), 1.0));
    }

    #[test]
    fn summed_area_table_matches_direct_sum() {
        let raw = Kernel::gaussian(1.5, 9);
        let mut fast = raw.clone();
        fast.prepare_sums();
        for &(x, y, w, h) in &[(0, 0, 9, 9), (2, 3, 4, 2), (-3, -3, 5, 5), (7, 7, 10, 10)] {
            let a = raw.sum(x, y, w, h);
            let b = fast.sum(x, y, w, h);
            assert!(approx(a, b), "({x}, {y}, {w}, {h}): {a} vs {b}");
        }
        assert!(approx(fast.sum(20, 20, 3, 3), 0.0));
    }

    #[test]
    fn std_for_size_returns_cap_for_loose_limit() {
        assert!(approx(gaussian_std_for_size(4.0, 0.5), 8.0));
        let std = gaussian_std_for_size(4.0, 0.5 / 256.0);
        assert!(std > 0.0 && std < 8.0, "std {std}");
    }

    #[test]
    fn normalize_replaces_center() {
        let [h, _] = box_blur_kernels(1);
        let n = h.normalized(1.0);
        for v in n.data() {
            assert!(approx(*v, 1.0 / 3.0));
        }
        let heavy = h.normalized(4.0);
        assert!(approx(heavy.data()[1], 4.0 / 6.0));
        assert!(approx(heavy.data()[0], 1.0 / 6.0));
    }

    #[test]
    fn normalize_zero_sum_keeps_weights() {
        let k = Kernel::new(3, 1, alloc::vec![1.0, 5.0, -1.0]);
        let n = k.normalized(0.0);
        assert_eq!(n.data(), &[1.0, 0.0, -1.0]);
    }

    #[test]
    fn center_factor_depends_on_opacity() {
        assert!(approx(blur_center_factor(0.3, true), 1.0));
        let opaque = blur_center_factor(1.0, false);
        let faint = blur_center_factor(0.2, false);
        assert!(faint > opaque, "fainter windows keep more of the centre");
    }

    #[test]
    fn two_pass_five_wide_kernel_reaches_four() {
        let kernels = Kernel::parse_list("5x5box").unwrap();
        let twice = [kernels[0].clone(), kernels[0].clone()];
        assert_eq!(kernels_blur_size(&twice), (4, 4));
        assert_eq!(kernels_blur_size(&box_blur_kernels(3)), (3, 3));
    }

    #[test]
    fn parse_explicit_kernel() {
        let k = Kernel::parse_list("3,3,1,1,1,1,1,1,1,1").unwrap();
        assert_eq!(k.len(), 1);
        assert_eq!((k[0].width(), k[0].height()), (3, 3));
        assert!(approx(k[0].get(1, 1), 1.0));
    }

    #[test]
    fn parse_multiple_kernels() {
        let k = Kernel::parse_list("3,1,0.5,0.5; 1,3,0.25,0.25;").unwrap();
        assert_eq!(k.len(), 2);
        assert_eq!(k[0].data(), &[0.5, 1.0, 0.5]);
        assert_eq!(k[1].data(), &[0.25, 1.0, 0.25]);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Kernel::parse_list(""), Err(KernelParseError::Empty));
        assert_eq!(
            Kernel::parse_list("2,3,1,1,1,1,1"),
            Err(KernelParseError::EvenDimensions)
        );
        assert_eq!(
            Kernel::parse_list("3,1,1"),
            Err(KernelParseError::MissingValue("weight"))
        );
        assert_eq!(
            Kernel::parse_list("3,1,1,1,1"),
            Err(KernelParseError::TrailingValues)
        );
        assert_eq!(
            Kernel::parse_list("3,1,x,1"),
            Err(KernelParseError::InvalidNumber)
        );
    }

    #[test]
    fn gaussian_pass_is_symmetric() {
        let [h, v] = gaussian_blur_kernels(3, 0.84);
        assert_eq!(h.width(), 7);
        assert_eq!(v.height(), 7);
        for i in 0..3 {
            assert!(approx(h.data()[i], h.data()[6 - i]));
        }
        assert_eq!(h.data(), v.data());
    }

    #[test]
    fn kawase_strength_selection() {
        let p = DualKawaseParams::new(0, 0);
        assert_eq!(p.strength, DEFAULT_KAWASE_STRENGTH);
        assert_eq!(p.iterations, 2);

        let p = DualKawaseParams::new(12, 0);
        assert_eq!(p.strength, 4, "first level reaching radius 12 is 17");

        let p = DualKawaseParams::new(10_000, 0);
        assert_eq!(p.strength, 20);

        let p = DualKawaseParams::new(0, 1);
        assert_eq!(p.expand(), 2 * 2 * 2 + 1);
    }

    #[test]
    fn kawase_level_sizes_halve() {
        assert_eq!(kawase_level_extent(100, 0), 50);
        assert_eq!(kawase_level_extent(100, 1), 25);
        assert_eq!(kawase_level_extent(101, 0), 51);
        assert_eq!(kawase_level_extent(1, 3), 1);
    }
}
