// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for damage-driven window compositing.
//!
//! `lucarne_core` holds everything the compositor needs that does not touch a
//! rendering backend. It is `no_std` compatible (with `alloc`).
//!
//! # Architecture
//!
//! ```text
//!   window system events
//!       │
//!       ▼
//!   WindowStack mutations ──► WindowStack::evaluate() ──► StackChanges
//!                                   │                        │ damage
//!                                   │ reg_ignore, to_paint   ▼
//!                                   │                   DamageRing::add()
//!                                   ▼                        │
//!                            compositor paint pass ◄─────────┘
//!                                                  DamageRing::collect(age)
//! ```
//!
//! **[`geom`]**: Integer points, sizes, half-open rectangles and margins.
//!
//! **[`region`]**: Canonical rectangle sets. Every occlusion and damage
//! computation is a region operation.
//!
//! **[`damage`]**: Damage history for buffer-age partial repaint.
//!
//! **[`kernel`]**: Blur and shadow kernels, summed-area tables, textual
//! kernel parsing and the dual-Kawase strength table.
//!
//! **[`stack`]**: Struct-of-arrays window list with generational handles.
//! Evaluation computes each window's paint mode, bounding shape and
//! `reg_ignore`, the area already painted opaquely by the windows above.
//!
//! **[`dirty`]**: Dirty channels used by the window stack.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) and event types for frame
//! instrumentation, with the zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies.
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-window
//!   change and damage-rect events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod damage;
pub mod dirty;
pub mod geom;
pub mod kernel;
pub mod region;
pub mod stack;
pub mod trace;
