// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants for the window stack.
//!
//! Each channel is an independent category of change, tracked with
//! [`understory_dirty`].
//!
//! # Propagation semantics
//!
//! - **Local**: [`GEOMETRY`], [`OPACITY`], [`SHAPE`], [`CONTENT`] and
//!   [`FLAGS`] are marked with the default policy. Only the window that was
//!   mutated shows up in the drain. Evaluation damages its old and new
//!   extents and recomputes its derived regions.
//!
//! - **Structural**: [`STACKING`] is marked on creation, destruction and
//!   restacking. It makes evaluation rebuild the paint order.
//!
//! - **Propagating**: [`IGNORE`] uses
//!   [`EagerPolicy`](understory_dirty::EagerPolicy). Every window has an edge
//!   to the window directly above it, so marking a window marks everything
//!   underneath. A window's `reg_ignore` is the union of what the windows
//!   above it paint opaquely, so any change that alters a window's opaque
//!   contribution invalidates every `reg_ignore` below it.
//!
//! # Consumption
//!
//! Callers never query dirty state directly.
//! [`WindowStack::evaluate`](crate::stack::WindowStack::evaluate) drains all
//! channels and reports the result as
//! [`StackChanges`](crate::stack::StackChanges).

use understory_dirty::Channel;

/// Position, size, frame extents or corner radius changed.
pub const GEOMETRY: Channel = Channel::new(0);

/// Body, frame or blur opacity changed.
pub const OPACITY: Channel = Channel::new(1);

/// Bounding shape changed.
pub const SHAPE: Channel = Channel::new(2);

/// Bound surface changed or the client reported damage.
pub const CONTENT: Channel = Channel::new(3);

/// Mapped, shadow, blur, exclusion or image-error state changed.
pub const FLAGS: Channel = Channel::new(4);

/// Window created, destroyed or restacked.
pub const STACKING: Channel = Channel::new(5);

/// `reg_ignore` must be recomputed for this window and all windows below.
pub const IGNORE: Channel = Channel::new(6);
