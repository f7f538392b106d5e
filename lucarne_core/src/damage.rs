// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame damage history for buffer-age repainting.
//!
//! A swapchain hands back buffers whose contents are `age` frames old. To
//! bring such a buffer up to date it is enough to repaint everything that
//! changed during those `age` frames. [`DamageRing`] keeps that history:
//!
//! ```text
//!   head ──► [ current frame ] ◄── add() accumulates here
//!            [ 1 frame ago   ]
//!            [ 2 frames ago  ]
//!            ...
//! ```
//!
//! [`advance`](DamageRing::advance) rotates the ring once the frame has been
//! painted, retiring the oldest entry.

use alloc::vec::Vec;

use crate::geom::Rect;
use crate::region::Region;

/// Fixed-capacity circular history of damage regions.
#[derive(Clone, Debug)]
pub struct DamageRing {
    entries: Vec<Region>,
    head: usize,
    /// Frames advanced since the ring was last reset, capped at capacity.
    depth: usize,
}

impl DamageRing {
    /// Creates a ring able to answer buffer ages up to `max_age`.
    ///
    /// A `max_age` of zero still keeps one entry for the frame being built.
    #[must_use]
    pub fn new(max_age: u32) -> Self {
        let capacity = usize::try_from(max_age).unwrap_or(usize::MAX - 1).max(1);
        Self {
            entries: alloc::vec![Region::new(); capacity + 1],
            head: 0,
            depth: 0,
        }
    }

    /// Largest buffer age that can be answered from history.
    #[must_use]
    pub fn max_age(&self) -> usize {
        self.entries.len() - 1
    }

    /// Number of frames of history currently held.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Damage accumulated for the frame being built.
    #[must_use]
    pub fn current(&self) -> &Region {
        &self.entries[self.head]
    }

    /// Adds `damage` to the frame being built.
    pub fn add(&mut self, damage: &Region) {
        self.entries[self.head].union_with(damage);
    }

    /// Adds a single rectangle to the frame being built.
    pub fn add_rect(&mut self, rect: Rect) {
        self.add(&Region::from_rect(rect));
    }

    /// Union of the damage of the last `age` frames, current frame included.
    ///
    /// Returns `None` when the history cannot answer for `age`: the age is
    /// unknown (`<= 0`), larger than the ring, or older than the frames
    /// recorded since the last reset.
    #[must_use]
    pub fn history(&self, age: i32) -> Option<Region> {
        let age = usize::try_from(age).ok().filter(|&a| a > 0)?;
        if age > self.depth || age > self.max_age() {
            return None;
        }
        let len = self.entries.len();
        let mut out = Region::new();
        for i in 0..age {
            out.union_with(&self.entries[(self.head + i) % len]);
        }
        Some(out)
    }

    /// The region a buffer of the given age must repaint, clipped to `screen`.
    ///
    /// Unknown or too-old ages repaint the whole screen.
    #[must_use]
    pub fn collect(&self, age: i32, screen: Rect) -> Region {
        match self.history(age) {
            Some(damage) => damage.intersect_rect(screen),
            None => Region::from_rect(screen),
        }
    }

    /// Moves to the next frame, retiring the oldest entry.
    pub fn advance(&mut self) {
        let len = self.entries.len();
        self.head = (self.head + len - 1) % len;
        self.entries[self.head].clear();
        self.depth = (self.depth + 1).min(self.max_age());
    }

    /// Forgets all history so the next collect repaints everything.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.clear();
        }
        self.head = 0;
        self.depth = 0;
    }

    /// Rebuilds the ring for a backend with a different maximum age.
    pub fn resize(&mut self, max_age: u32) {
        *self = Self::new(max_age);
    }
}
