// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Window stack and per-frame paint state.
//!
//! A *window* is a rectangle of client pixels in the stacking order. Each
//! window has:
//!
//! - An identity ([`WindowId`]), a generational handle that goes stale when
//!   the window is destroyed.
//! - A place in the stacking order, a doubly linked list from top to bottom.
//! - **Inputs** set by the caller: geometry, shape, opacity, frame extents,
//!   corner radius, bound surface and [`WindowFlags`].
//! - **Paint state** produced by [`evaluate`](WindowStack::evaluate):
//!   `to_paint`, [`WindowMode`], the screen-space bounding shape and
//!   `reg_ignore`, the area already covered opaquely by windows above.
//!
//! # Dirty tracking
//!
//! Mutations mark the matching channel (see [`dirty`](crate::dirty)). Any
//! change that can alter a window's opaque contribution also marks
//! [`IGNORE`](crate::dirty::IGNORE), which propagates to every window below,
//! so `reg_ignore` is only rebuilt from the first changed window downwards.

mod evaluate;
mod id;
mod iter;
mod store;

pub use evaluate::{ShadowGeometry, StackChanges, StackParams, WindowMode};
pub use id::{INVALID, SurfaceId, WindowId};
pub use iter::StackIter;
pub use store::{WindowFlags, WindowStack};
