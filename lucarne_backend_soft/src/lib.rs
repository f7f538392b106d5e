// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software rendering backend for lucarne.
//!
//! Everything is drawn on the CPU into premultiplied `f32` pixel buffers, so
//! the crate runs anywhere and frames can be inspected pixel by pixel:
//!
//! - [`SoftBackend`]: the [`Backend`] implementation, with an emulated
//!   swapchain that reports real buffer ages
//! - [`SurfacePool`]: window contents shared with the host; binding a
//!   surface copies its current pixels into a backend image
//! - [`Rgba`]: the pixel type
//!
//! Blur covers every [`BlurKind`](lucarne_render::blur::BlurKind): chained
//! convolution passes for kernel, box and gaussian blur, and a
//! downsample/upsample pyramid for dual kawase.
//!
//! ```
//! use lucarne_core::geom::Size;
//! use lucarne_render::backend::{Backend, BackendTarget};
//! use lucarne_render::registry::BackendRegistry;
//! use lucarne_backend_soft::{SoftBackend, SurfacePool};
//!
//! let mut registry = BackendRegistry::new();
//! SoftBackend::register(&mut registry, SurfacePool::new()).unwrap();
//! let backend = registry
//!     .create("soft", &BackendTarget::new(Size::new(320, 200)))
//!     .unwrap();
//! assert_eq!(backend.max_buffer_age(), 2);
//! ```

mod blur;
mod engine;
mod pixel;
mod raster;
mod store;
mod swapchain;

#[cfg(test)]
mod scenarios;

pub use engine::SoftBackend;
pub use lucarne_render::backend::Backend;
pub use pixel::Rgba;
pub use store::{SurfacePixels, SurfacePool};
