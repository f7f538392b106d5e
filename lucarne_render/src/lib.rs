// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backends, effects and the per-frame paint algorithm.
//!
//! `lucarne_render` drives a [`Backend`](backend::Backend) from the window
//! state kept in [`lucarne_core`].
//!
//! ```text
//!   BackendRegistry::create(name) ──► Box<dyn Backend>
//!                                          │
//!   WindowStack ──► Compositor::paint_frame(backend, stack, tracer)
//!                        │  shadows: ShadowGenerator
//!                        │  blur:    BlurEngine ──► BlurContext (backend side)
//!                        ▼
//!                   FrameOutcome + FrameSummary
//! ```
//!
//! **[`backend`]**: the drawing contract, with interface versioning,
//! device status and quirks.
//!
//! **[`image`]**: image handles, formats, capability bits and masks.
//!
//! **[`registry`]**: backends by name, version checks and plugins.
//!
//! **[`blur`]**: blur parameters, the backend-side [`BlurContext`](blur::BlurContext)
//! that plans passes and caches intermediates, and the compositor-side
//! [`BlurEngine`](blur::BlurEngine).
//!
//! **[`shadow`]**: cached per-window shadow masks.
//!
//! **[`compositor`]**: the frame algorithm.
//!
//! **[`session`]**: a compositor that re-creates its backend after a device
//! reset.
//!
//! **[`options`]**: serde-backed configuration.
//!
//! **[`dummy`]**: a backend that records every call, for tests.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies.
//! - `trace-rich` (disabled by default, implies `trace`): Emits per-window
//!   change and damage-rect events.

pub mod backend;
pub mod blur;
pub mod compositor;
pub mod dummy;
pub mod error;
pub mod image;
pub mod options;
pub mod registry;
pub mod session;
pub mod shadow;

pub use lucarne_core::trace::SkipReason;
