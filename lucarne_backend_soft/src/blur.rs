// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU blur passes.
//!
//! Both methods work on the padded area: the bounding box of the blurred
//! region grown by the context's blur size, read from the source with
//! clamped edges. Convolution ping-pongs between two padded intermediates,
//! one pass per kernel. Dual-Kawase halves the area once per iteration and
//! doubles it back, each step blending five (down) or eight (up) bilinear
//! taps.

use lucarne_core::geom::{Point, Rect};
use lucarne_core::kernel::Kernel;
use lucarne_render::backend::BlurArgs;
use lucarne_render::blur::BlurContexts;
use lucarne_render::image::ImageHandle;

use crate::pixel::Rgba;
use crate::raster::MaskSampler;
use crate::store::{Image, ImageStore};

/// Where the blurred pixels of the padded area end up.
#[derive(Clone, Copy, Debug)]
enum Blurred {
    /// Full resolution, in this intermediate.
    Image(ImageHandle),
    /// Half resolution in this intermediate; the last upsample runs while
    /// compositing.
    Kawase { top: ImageHandle, offset: f32 },
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Blurs `args.target_mask` of `args.source` into `target` at `origin`.
pub(crate) fn blur(
    store: &mut ImageStore,
    contexts: &mut BlurContexts,
    origin: Point,
    target: ImageHandle,
    args: &BlurArgs,
) -> bool {
    let Some(ctx) = contexts.get_mut(args.blur_context) else {
        log::warn!("blur with unknown context {:?}", args.blur_context);
        return false;
    };
    let area = args.target_mask.extents();
    if area.is_empty() {
        return true;
    }
    let (bw, bh) = ctx.blur_size();
    let padded = area.inflate(to_i32(bw), to_i32(bh));
    let Some(intermediates) = ctx.ensure_intermediates(store, area.size()).map(<[_]>::to_vec)
    else {
        return false;
    };
    #[expect(
        clippy::cast_possible_truncation,
        reason = "opacity is clamped to 0..=1"
    )]
    let weight = args.opacity.clamp(0.0, 1.0) as f32;
    let blurred = match ctx.dual_kawase() {
        Some(params) => {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "kawase offsets are small"
            )]
            let offset = params.offset as f32;
            let Some(top) = kawase(store, &intermediates, args.source, padded, offset) else {
                return false;
            };
            Blurred::Kawase { top, offset }
        }
        None => {
            let kernels = ctx.kernels_for(args.opacity).to_vec();
            let Some(out) = convolve(store, &intermediates, args.source, padded, &kernels) else {
                return false;
            };
            Blurred::Image(out)
        }
    };
    composite(store, origin, target, args, padded.origin(), blurred, weight)
}

/// Copies the padded area of `source` into `dst`, clamping at the edges.
fn load(store: &mut ImageStore, dst: ImageHandle, source: ImageHandle, padded: Rect) -> bool {
    store.with_image(dst, |dst, store| {
        let Some(src) = store.get(source) else {
            return false;
        };
        for y in 0..to_i32(dst.size.height) {
            for x in 0..to_i32(dst.size.width) {
                dst.put(x, y, src.get_clamped(padded.x1 + x, padded.y1 + y));
            }
        }
        true
    })
    .unwrap_or(false)
}

fn convolve(
    store: &mut ImageStore,
    intermediates: &[ImageHandle],
    source: ImageHandle,
    padded: Rect,
    kernels: &[Kernel],
) -> Option<ImageHandle> {
    let &[mut input, mut output] = intermediates else {
        return None;
    };
    if !load(store, input, source, padded) {
        return None;
    }
    for kernel in kernels {
        let ok = store.with_image(output, |dst, store| {
            let Some(src) = store.get(input) else {
                return false;
            };
            convolve_pass(src, dst, kernel);
            true
        });
        if ok != Some(true) {
            return None;
        }
        core::mem::swap(&mut input, &mut output);
    }
    Some(input)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "normalized weights fit f32"
)]
fn convolve_pass(src: &Image, dst: &mut Image, kernel: &Kernel) {
    let (rx, ry) = kernel.reach();
    let taps: Vec<(i32, i32, f32)> = (0..kernel.height())
        .flat_map(|ky| (0..kernel.width()).map(move |kx| (kx, ky)))
        .filter_map(|(kx, ky)| {
            let w = kernel.get(kx, ky);
            (w != 0.0).then(|| {
                let dx = i32::try_from(kx).unwrap_or(0) - to_i32(rx);
                let dy = i32::try_from(ky).unwrap_or(0) - to_i32(ry);
                (dx, dy, w as f32)
            })
        })
        .collect();
    for y in 0..to_i32(dst.size.height) {
        for x in 0..to_i32(dst.size.width) {
            let sum = taps.iter().fold(Rgba::TRANSPARENT, |acc, &(dx, dy, w)| {
                acc.add(src.get_clamped(x + dx, y + dy).scale(w))
            });
            dst.put(x, y, sum);
        }
    }
}

/// Downsample tap: the centre four times plus four diagonal neighbours half
/// an offset away, averaged.
fn down_sample(src: &Image, cx: f32, cy: f32, offset: f32) -> Rgba {
    let h = offset * 0.5;
    [(-h, -h), (h, h), (h, -h), (-h, h)]
        .iter()
        .fold(src.sample(cx, cy).scale(4.0), |acc, &(dx, dy)| {
            acc.add(src.sample(cx + dx, cy + dy))
        })
        .scale(1.0 / 8.0)
}

/// Upsample tap: four axial neighbours one offset away and four diagonal
/// ones half an offset away at double weight, averaged.
fn up_sample(src: &Image, cx: f32, cy: f32, offset: f32) -> Rgba {
    let h = offset * 0.5;
    let axial = [(-offset, 0.0), (offset, 0.0), (0.0, -offset), (0.0, offset)]
        .iter()
        .fold(Rgba::TRANSPARENT, |acc, &(dx, dy)| {
            acc.add(src.sample(cx + dx, cy + dy))
        });
    let diagonal = [(-h, -h), (h, h), (h, -h), (-h, h)]
        .iter()
        .fold(Rgba::TRANSPARENT, |acc, &(dx, dy)| {
            acc.add(src.sample(cx + dx, cy + dy))
        });
    axial.add(diagonal.scale(2.0)).scale(1.0 / 12.0)
}

fn centre(v: i32) -> f32 {
    v as f32 + 0.5
}

/// Runs the down and up passes, leaving the half-resolution result in the
/// first intermediate.
fn kawase(
    store: &mut ImageStore,
    intermediates: &[ImageHandle],
    source: ImageHandle,
    padded: Rect,
    offset: f32,
) -> Option<ImageHandle> {
    let (&top, _) = intermediates.split_first()?;
    let base = (padded.x1 as f32, padded.y1 as f32);
    let mut input = source;
    for (level, &output) in intermediates.iter().enumerate() {
        let shift = if level == 0 { base } else { (0.0, 0.0) };
        let ok = store.with_image(output, |dst, store| {
            let Some(src) = store.get(input) else {
                return false;
            };
            for y in 0..to_i32(dst.size.height) {
                for x in 0..to_i32(dst.size.width) {
                    let (cx, cy) = (centre(x) * 2.0 + shift.0, centre(y) * 2.0 + shift.1);
                    dst.put(x, y, down_sample(src, cx, cy, offset));
                }
            }
            true
        });
        if ok != Some(true) {
            return None;
        }
        input = output;
    }
    for pair in intermediates.windows(2).rev() {
        let (output, input) = (pair[0], pair[1]);
        let ok = store.with_image(output, |dst, store| {
            let Some(src) = store.get(input) else {
                return false;
            };
            for y in 0..to_i32(dst.size.height) {
                for x in 0..to_i32(dst.size.width) {
                    dst.put(x, y, up_sample(src, centre(x) / 2.0, centre(y) / 2.0, offset));
                }
            }
            true
        });
        if ok != Some(true) {
            return None;
        }
    }
    Some(top)
}

/// Blends the blurred pixels over the target inside the source mask.
fn composite(
    store: &mut ImageStore,
    origin: Point,
    target: ImageHandle,
    args: &BlurArgs,
    padded_origin: Point,
    blurred: Blurred,
    weight: f32,
) -> bool {
    store.with_image(target, |dst, store| {
        let sampler = match &args.source_mask {
            Some(mask) => match MaskSampler::new(mask, store) {
                Some(sampler) => Some(sampler),
                None => return false,
            },
            None => None,
        };
        let handle = match blurred {
            Blurred::Image(handle) | Blurred::Kawase { top: handle, .. } => handle,
        };
        let Some(src) = store.get(handle) else {
            return false;
        };
        let clip = args
            .target_mask
            .translate(origin.x, origin.y)
            .intersect_rect(dst.bounds());
        for r in clip.rects() {
            for ty in r.y1..r.y2 {
                for tx in r.x1..r.x2 {
                    let (sx, sy) = (tx - origin.x, ty - origin.y);
                    let w = weight * sampler.as_ref().map_or(1.0, |m| m.coverage(sx, sy));
                    if w <= 0.0 {
                        continue;
                    }
                    let (lx, ly) = (sx - padded_origin.x, sy - padded_origin.y);
                    let value = match blurred {
                        Blurred::Image(_) => src.get_clamped(lx, ly),
                        Blurred::Kawase { offset, .. } => {
                            up_sample(src, centre(lx) / 2.0, centre(ly) / 2.0, offset)
                        }
                    };
                    let below = dst.get(tx, ty);
                    dst.put(tx, ty, below.lerp(value, w));
                }
            }
        }
        true
    })
    .unwrap_or(false)
}
