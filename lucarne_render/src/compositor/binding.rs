// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-window surface bindings.

use hashbrown::HashMap;
use lucarne_core::stack::{SurfaceId, WindowId};

use crate::backend::Backend;
use crate::image::{FormatInfo, ImageHandle};

#[derive(Clone, Copy, Debug)]
struct Binding {
    surface: SurfaceId,
    image: ImageHandle,
}

/// Backend images bound to window surfaces, created on first paint.
#[derive(Debug, Default)]
pub(crate) struct WindowImages {
    bound: HashMap<WindowId, Binding>,
}

impl WindowImages {
    /// The image for `surface` of window `id`, binding it if needed.
    ///
    /// A binding for a different surface is released first. Surfaces handed
    /// back by the backend are pushed to `released`.
    pub(crate) fn image_for(
        &mut self,
        backend: &mut dyn Backend,
        id: WindowId,
        surface: SurfaceId,
        info: &FormatInfo,
        released: &mut Vec<SurfaceId>,
    ) -> Option<ImageHandle> {
        match self.bound.get(&id).copied() {
            Some(b) if b.surface == surface => return Some(b.image),
            Some(_) => self.release(backend, id, released),
            None => {}
        }
        let image = backend.bind_external_surface(surface, info)?;
        self.bound.insert(id, Binding { surface, image });
        Some(image)
    }

    /// Releases the binding of window `id`.
    pub(crate) fn release(
        &mut self,
        backend: &mut dyn Backend,
        id: WindowId,
        released: &mut Vec<SurfaceId>,
    ) {
        if let Some(b) = self.bound.remove(&id) {
            released.extend(backend.release_image(b.image));
        }
    }

    /// Releases the binding of whatever window occupied slot `idx`.
    pub(crate) fn release_slot(
        &mut self,
        backend: &mut dyn Backend,
        idx: u32,
        released: &mut Vec<SurfaceId>,
    ) {
        self.bound.retain(|id, b| {
            if id.index() == idx {
                released.extend(backend.release_image(b.image));
                false
            } else {
                true
            }
        });
    }

    /// Drops the binding of slot `idx` so its next paint binds fresh
    /// contents.
    ///
    /// The surface handed back is queued only when the window no longer
    /// shows it.
    pub(crate) fn refresh_slot(
        &mut self,
        backend: &mut dyn Backend,
        idx: u32,
        current: Option<SurfaceId>,
        released: &mut Vec<SurfaceId>,
    ) {
        self.bound.retain(|id, b| {
            if id.index() != idx {
                return true;
            }
            if let Some(surface) = backend.release_image(b.image)
                && Some(surface) != current
            {
                released.push(surface);
            }
            false
        });
    }

    /// Releases every binding and returns how many there were.
    pub(crate) fn release_all(
        &mut self,
        backend: &mut dyn Backend,
        released: &mut Vec<SurfaceId>,
    ) -> u32 {
        let mut n = 0;
        for (_, b) in self.bound.drain() {
            released.extend(backend.release_image(b.image));
            n += 1;
        }
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.bound.len()
    }
}
