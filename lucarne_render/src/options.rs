// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor configuration.
//!
//! Every field has a default, so a host can load a partial JSON document:
//!
//! ```
//! use lucarne_render::options::CompositorOptions;
//!
//! let opts = CompositorOptions::from_json(r#"{ "shadow": { "enabled": true } }"#).unwrap();
//! assert!(opts.shadow.enabled);
//! assert_eq!(opts.shadow.radius, 12);
//! ```

use lucarne_core::geom::{Point, Rect};
use lucarne_core::kernel::Kernel;
use lucarne_core::region::Region;
use lucarne_core::stack::ShadowGeometry;
use serde::{Deserialize, Serialize};

use crate::blur::{BlurKind, BlurMethod, BlurParams};
use crate::error::OptionsError;
use crate::image::Color;

/// Background blur settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurOptions {
    /// Algorithm.
    pub method: BlurMethod,
    /// Half width for box and gaussian, radius to imitate for dual-Kawase.
    pub size: u32,
    /// Gaussian standard deviation.
    pub deviation: f64,
    /// Dual-Kawase strength, `0..=20`. Zero derives it from `size`.
    pub strength: u32,
    /// Kernel list for [`BlurMethod::Kernel`], for example `"3x3box"` or
    /// `"3,3,1,1,1,1,1,1,1,1"`.
    pub kernel: String,
    /// Blur with the same strength regardless of window opacity.
    pub background_fixed: bool,
    /// Also blur behind windows whose frame alone is translucent.
    pub background_frame: bool,
}

impl Default for BlurOptions {
    fn default() -> Self {
        Self {
            method: BlurMethod::None,
            size: 3,
            deviation: 0.84,
            strength: 5,
            kernel: String::from("3x3box"),
            background_fixed: false,
            background_frame: false,
        }
    }
}

/// Drop shadow settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowOptions {
    /// Draw shadows for windows that request one.
    pub enabled: bool,
    /// Blur radius.
    pub radius: u32,
    /// Horizontal offset of the shadow relative to the window.
    pub offset_x: i32,
    /// Vertical offset of the shadow relative to the window.
    pub offset_y: i32,
    /// Shadow opacity, `0..=1`.
    pub opacity: f64,
    /// Shadow color; its alpha is ignored in favor of `opacity`.
    pub color: Color,
    /// Keep shadows on the window's monitor.
    pub crop_to_monitor: bool,
    /// Screen areas that never receive shadow, as `[x, y, width, height]`.
    pub exclude: Vec<[i32; 4]>,
}

impl Default for ShadowOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 12,
            offset_x: -15,
            offset_y: -15,
            opacity: 0.75,
            color: Color::BLACK,
            crop_to_monitor: false,
            exclude: Vec::new(),
        }
    }
}

impl ShadowOptions {
    /// Shadow placement handed to the window stack, `None` when disabled.
    #[must_use]
    pub fn geometry(&self) -> Option<ShadowGeometry> {
        self.enabled.then_some(ShadowGeometry {
            radius: self.radius,
            offset: Point::new(self.offset_x, self.offset_y),
        })
    }

    /// The exclusion rectangles as a region.
    #[must_use]
    pub fn exclude_region(&self) -> Region {
        self.exclude
            .iter()
            .map(|&[x, y, w, h]| Rect::new(x, y, x.saturating_add(w), y.saturating_add(h)))
            .collect()
    }
}

/// Everything the compositor can be configured with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorOptions {
    /// Background blur.
    pub blur: BlurOptions,
    /// Drop shadows.
    pub shadow: ShadowOptions,
    /// Dim level of windows flagged as dimmed, `0..=1`.
    pub inactive_dim: f64,
    /// Do not scale the dim level by window opacity.
    pub inactive_dim_fixed: bool,
    /// Brightness cap applied to every window, `0..=1`.
    pub max_brightness: f64,
    /// Extra pixels repainted around every damaged area.
    pub resize_damage: i32,
    /// Translucent windows clip what is below them.
    pub transparent_clipping: bool,
    /// Blend every window as if it were translucent.
    pub force_win_blend: bool,
    /// Tint the repainted area of every frame.
    pub monitor_repaint: bool,
    /// Repaint only damaged areas. When off, every frame is a full redraw.
    pub use_damage: bool,
    /// Render into a high-precision buffer and dither on present.
    pub dithered_present: bool,
    /// Fill for areas no window covers when there is no root surface.
    pub background_color: Color,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            blur: BlurOptions::default(),
            shadow: ShadowOptions::default(),
            inactive_dim: 0.0,
            inactive_dim_fixed: false,
            max_brightness: 1.0,
            resize_damage: 0,
            transparent_clipping: false,
            force_win_blend: false,
            monitor_repaint: false,
            use_damage: true,
            dithered_present: false,
            background_color: Color::BLACK,
        }
    }
}

impl CompositorOptions {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError`] if the document does not parse, a value is
    /// out of range, or the blur kernel is malformed.
    pub fn from_json(src: &str) -> Result<Self, OptionsError> {
        let opts: Self = serde_json::from_str(src)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Serializes the options back to JSON.
    ///
    /// # Errors
    ///
    /// Only fails if serialization itself fails.
    pub fn to_json(&self) -> Result<String, OptionsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks ranges and parses the blur kernel.
    ///
    /// # Errors
    ///
    /// See [`from_json`](Self::from_json).
    pub fn validate(&self) -> Result<(), OptionsError> {
        unit_range("inactive_dim", self.inactive_dim)?;
        unit_range("max_brightness", self.max_brightness)?;
        unit_range("shadow.opacity", self.shadow.opacity)?;
        if self.blur.strength > 20 {
            return Err(OptionsError::OutOfRange {
                field: "blur.strength",
                value: f64::from(self.blur.strength),
            });
        }
        if self.blur.method == BlurMethod::Gaussian && self.blur.deviation <= 0.0 {
            return Err(OptionsError::OutOfRange {
                field: "blur.deviation",
                value: self.blur.deviation,
            });
        }
        self.blur_params().map(|_| ())
    }

    /// Blur parameters for the configured method, `None` when blur is off.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::Kernel`] if the kernel list does not parse.
    pub fn blur_params(&self) -> Result<Option<BlurParams>, OptionsError> {
        let b = &self.blur;
        let kind = match b.method {
            BlurMethod::None => return Ok(None),
            BlurMethod::Kernel => BlurKind::Kernel(Kernel::parse_list(&b.kernel)?),
            BlurMethod::Box => BlurKind::Box { size: b.size },
            BlurMethod::Gaussian => BlurKind::Gaussian {
                size: b.size,
                deviation: b.deviation,
            },
            BlurMethod::DualKawase => BlurKind::DualKawase {
                size: b.size,
                strength: b.strength,
            },
        };
        Ok(Some(BlurParams {
            kind,
            fixed: b.background_fixed,
        }))
    }
}

fn unit_range(field: &'static str, value: f64) -> Result<(), OptionsError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OptionsError::OutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = CompositorOptions::default();
        assert_eq!(o.blur.method, BlurMethod::None);
        assert_eq!(o.blur.size, 3);
        assert_eq!(o.blur.deviation, 0.84);
        assert_eq!(o.shadow.radius, 12);
        assert_eq!((o.shadow.offset_x, o.shadow.offset_y), (-15, -15));
        assert_eq!(o.shadow.opacity, 0.75);
        assert!(o.use_damage, "damage tracking is on by default");
        assert!(o.shadow.geometry().is_none(), "shadows are off by default");
    }

    #[test]
    fn empty_document_is_default() {
        let o = CompositorOptions::from_json("{}").unwrap();
        assert_eq!(o, CompositorOptions::default());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let o = CompositorOptions::from_json(
            r#"{ "blur": { "method": "dual_kawase", "strength": 7 }, "inactive_dim": 0.2 }"#,
        )
        .unwrap();
        assert_eq!(o.blur.method, BlurMethod::DualKawase);
        assert_eq!(o.blur.strength, 7);
        assert_eq!(o.blur.size, 3);
        assert_eq!(o.inactive_dim, 0.2);
        let params = o.blur_params().unwrap().unwrap();
        assert_eq!(
            params.kind,
            BlurKind::DualKawase {
                size: 3,
                strength: 7
            }
        );
    }

    #[test]
    fn json_round_trip() {
        let mut o = CompositorOptions::default();
        o.shadow.enabled = true;
        o.shadow.exclude.push([0, 0, 10, 10]);
        let back = CompositorOptions::from_json(&o.to_json().unwrap()).unwrap();
        assert_eq!(back, o);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = CompositorOptions::from_json(r#"{ "max_brightness": 1.5 }"#).unwrap_err();
        assert!(matches!(
            err,
            OptionsError::OutOfRange {
                field: "max_brightness",
                ..
            }
        ));
        let err = CompositorOptions::from_json(r#"{ "blur": { "strength": 21 } }"#).unwrap_err();
        assert!(matches!(err, OptionsError::OutOfRange { .. }));
    }

    #[test]
    fn malformed_kernel_is_rejected() {
        let err = CompositorOptions::from_json(r#"{ "blur": { "method": "kernel", "kernel": "3,3,1" } }"#)
            .unwrap_err();
        assert!(matches!(err, OptionsError::Kernel(_)), "got {err:?}");
    }

    #[test]
    fn kernel_method_parses_list() {
        let o = CompositorOptions::from_json(
            r#"{ "blur": { "method": "kernel", "kernel": "3,3,1,1,1,1,1,1,1,1" } }"#,
        )
        .unwrap();
        let Some(BlurParams {
            kind: BlurKind::Kernel(kernels),
            ..
        }) = o.blur_params().unwrap()
        else {
            panic!("expected kernel blur");
        };
        assert_eq!(kernels.len(), 1);
        assert_eq!((kernels[0].width(), kernels[0].height()), (3, 3));
        assert_eq!(kernels[0].get(1, 1), 1.0, "centre is implied");
    }

    #[test]
    fn exclude_region_uses_width_and_height() {
        let mut s = ShadowOptions::default();
        s.exclude.push([10, 20, 5, 5]);
        assert_eq!(s.exclude_region().extents(), Rect::new(10, 20, 15, 25));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            CompositorOptions::from_json("{"),
            Err(OptionsError::Json(_))
        ));
    }
}
