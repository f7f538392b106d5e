// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Window and surface identity types.

use core::fmt;

/// Sentinel for "no window" in link fields.
pub const INVALID: u32 = u32::MAX;

/// A handle to a window in a [`WindowStack`](super::WindowStack).
///
/// Holds a slot index and a generation counter, so a handle kept after its
/// window was destroyed is detected even when the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl WindowId {
    /// Raw slot index, as found in [`StackChanges`](super::StackChanges) and
    /// [`paint_order`](super::WindowStack::paint_order).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowId({}@gen{})", self.idx, self.generation)
    }
}

/// An opaque reference to a platform surface holding a window's pixels.
///
/// The platform owns the surface. Backends turn it into an image with
/// `bind_external_surface` and hand it back when the image is released.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

impl fmt::Debug for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceId({})", self.0)
    }
}
