// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A compositor bound to a backend it can re-create.

use lucarne_core::geom::Size;
use lucarne_core::stack::WindowStack;
use lucarne_core::trace::{SkipReason, Tracer};

use crate::backend::{Backend, BackendTarget};
use crate::compositor::{Compositor, DeviceState, FrameOutcome};
use crate::error::CompositorError;
use crate::options::CompositorOptions;
use crate::registry::BackendRegistry;

/// Owns the registry, the live backend and the compositor driving it.
///
/// When the backend reports a device reset, the session drops it, creates a
/// new one under the same name and resumes painting on the next frame.
#[derive(Debug)]
pub struct Session {
    registry: BackendRegistry,
    backend_name: String,
    target: BackendTarget,
    backend: Box<dyn Backend>,
    compositor: Compositor,
}

impl Session {
    /// Creates backend `name` from `registry` and a compositor on top of it.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be created or the options are invalid.
    pub fn new(
        mut registry: BackendRegistry,
        name: &str,
        target: BackendTarget,
        options: CompositorOptions,
    ) -> Result<Self, CompositorError> {
        let backend = registry.create(name, &target)?;
        let compositor = Compositor::new(options, target.size, backend.as_ref())?;
        Ok(Self {
            registry,
            backend_name: name.into(),
            target,
            backend,
            compositor,
        })
    }

    /// Paints one frame, re-creating the backend after a device reset.
    ///
    /// # Errors
    ///
    /// See [`Compositor::paint_frame`]. Also fails if the backend cannot be
    /// re-created after a reset.
    pub fn frame(
        &mut self,
        stack: &mut WindowStack,
        tracer: &mut Tracer<'_>,
    ) -> Result<FrameOutcome, CompositorError> {
        let outcome = self
            .compositor
            .paint_frame(self.backend.as_mut(), stack, tracer)?;
        if outcome == FrameOutcome::Skipped(SkipReason::DeviceReset)
            && self.compositor.device_state() == DeviceState::Resetting
        {
            self.recreate_backend()?;
        }
        Ok(outcome)
    }

    /// Resizes the output.
    pub fn resize(&mut self, size: Size) -> bool {
        self.target.size = size;
        self.compositor.resize(self.backend.as_mut(), size)
    }

    fn recreate_backend(&mut self) -> Result<(), CompositorError> {
        log::info!("re-creating backend `{}`", self.backend_name);
        self.backend.deinit();
        self.backend = self.registry.create(&self.backend_name, &self.target)?;
        self.compositor.reset_complete(self.backend.as_ref());
        Ok(())
    }

    /// The live backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// The live backend, mutably.
    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    /// The compositor.
    #[must_use]
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// The compositor, mutably.
    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    /// Name of the live backend.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }
}
