// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An emulated presentation swapchain.
//!
//! Buffers rotate on every present. A buffer's age is the number of presents
//! since its contents were last shown, or zero if it was never shown; the
//! backend reports zero as `-1`, "unknown". With `N` buffers the age settles
//! at `N` once each buffer was presented once.

use lucarne_core::geom::Size;
use lucarne_render::image::{ImageCaps, ImageFormat, ImageHandle};

use crate::store::{Image, ImageStore};

#[derive(Clone, Copy, Debug)]
struct Slot {
    image: ImageHandle,
    age: u32,
}

#[derive(Debug)]
pub(crate) struct Swapchain {
    slots: Vec<Slot>,
    current: usize,
    front: Option<ImageHandle>,
}

impl Swapchain {
    /// Allocates `count` buffers, or nothing if any allocation fails.
    pub(crate) fn new(store: &mut ImageStore, size: Size, count: u32) -> Option<Self> {
        let mut slots: Vec<Slot> = Vec::new();
        for _ in 0..count.max(1) {
            let image = Image::new(ImageFormat::Pixmap, size, ImageCaps::SRC | ImageCaps::DST);
            let Some(image) = store.insert(image) else {
                for slot in slots {
                    store.remove(slot.image);
                }
                return None;
            };
            slots.push(Slot { image, age: 0 });
        }
        Some(Self {
            slots,
            current: 0,
            front: None,
        })
    }

    pub(crate) fn back(&self) -> ImageHandle {
        self.slots[self.current].image
    }

    /// The buffer shown by the last present.
    pub(crate) fn front(&self) -> Option<ImageHandle> {
        self.front
    }

    pub(crate) fn age(&self) -> i32 {
        match self.slots[self.current].age {
            0 => -1,
            age => i32::try_from(age).unwrap_or(-1),
        }
    }

    pub(crate) fn len(&self) -> u32 {
        u32::try_from(self.slots.len()).unwrap_or(u32::MAX)
    }

    pub(crate) fn contains(&self, image: ImageHandle) -> bool {
        self.slots.iter().any(|s| s.image == image)
    }

    /// Shows the back buffer and moves on to the next one.
    pub(crate) fn present(&mut self) {
        for slot in &mut self.slots {
            if slot.age > 0 {
                slot.age = slot.age.saturating_add(1);
            }
        }
        let shown = &mut self.slots[self.current];
        shown.age = 1;
        self.front = Some(shown.image);
        self.current = (self.current + 1) % self.slots.len();
    }

    pub(crate) fn release(self, store: &mut ImageStore) {
        for slot in self.slots {
            store.remove(slot.image);
        }
    }
}
