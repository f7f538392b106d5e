// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the compositing loop.
//!
//! [`TraceSink`] has one method per event, all defaulting to no-ops, so a sink
//! only implements what it cares about. The compositor reports through a
//! [`Tracer`], which wraps an optional `&mut dyn TraceSink`. With the `trace`
//! feature **off** every `Tracer` method compiles to nothing; with it **on**
//! each call costs one `Option` branch.
//!
//! [`FrameSummaryBuilder`] counts the work done during a frame and produces a
//! [`FrameSummary`] at the end.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies.
//! - `trace-rich` (implies `trace`) adds [`WindowChange`] and [`DamageRect`]
//!   events plus the matching `TraceSink` methods.

use core::time::Duration;

use crate::region::Region;

#[cfg(feature = "trace-rich")]
use crate::geom::Rect;
#[cfg(feature = "trace-rich")]
use crate::stack::StackChanges;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a frame is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Window stack evaluation (`reg_ignore`, paint state, damage).
    Evaluate,
    /// Issuing draw operations to the backend.
    Paint,
    /// Presenting the back buffer.
    Present,
}

/// Why a frame ended without drawing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The backend is resetting its device.
    DeviceReset,
    /// A previous present is still outstanding.
    Busy,
    /// The repaint region was empty.
    NothingToPaint,
}

/// An optional feature that can be turned off at run time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Background blur.
    Blur,
    /// Blur-based shadow generation.
    ShadowBlur,
    /// High-precision intermediate images.
    HighPrecision,
    /// Color inversion pre-pass.
    ColorInversion,
}

/// Which property of a window changed.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowField {
    /// Geometry, frame extents or corner radius.
    Geometry,
    /// Body, frame or blur opacity.
    Opacity,
    /// Bounding shape.
    Shape,
    /// Surface or client damage.
    Content,
    /// Window flags.
    Flags,
    /// Started or stopped being painted.
    Visibility,
    /// Created.
    Added,
    /// Destroyed.
    Removed,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted once the repaint region of a frame is known.
#[derive(Clone, Copy, Debug)]
pub struct FrameBeginEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// Buffer age reported by the backend (`-1` if unknown).
    pub buffer_age: i32,
    /// Number of rectangles in the repaint region.
    pub repaint_rects: u32,
    /// Pixel area of the repaint region.
    pub repaint_area: u64,
}

/// Marks the beginning of a frame phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Time since the compositor started.
    pub timestamp: Duration,
}

/// Marks the end of a frame phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Time since the compositor started.
    pub timestamp: Duration,
}

/// Emitted when a frame ends without drawing.
#[derive(Clone, Copy, Debug)]
pub struct FrameSkippedEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Why nothing was drawn.
    pub reason: SkipReason,
}

/// Emitted when an optional feature is disabled for the rest of the session.
#[derive(Clone, Copy, Debug)]
pub struct FeatureDisabledEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// The feature that was turned off.
    pub feature: Feature,
}

/// Emitted when the compositor drops every backend resource after a device
/// reset.
#[derive(Clone, Copy, Debug)]
pub struct DeviceResetEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Number of image handles released.
    pub images_released: u32,
    /// Number of blur contexts destroyed.
    pub blur_contexts_released: u32,
}

/// Per-frame work summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Buffer age used for the repaint region.
    pub buffer_age: i32,
    /// Pixel area of the repaint region.
    pub repaint_area: u64,
    /// Windows whose body was painted.
    pub windows_painted: u32,
    /// Blit operations issued.
    pub blits: u32,
    /// Blur operations issued.
    pub blurs: u32,
    /// Shadows drawn.
    pub shadows: u32,
    /// Whether the frame was presented successfully.
    pub presented: bool,
    /// Evaluate phase duration (zero if not measured).
    pub evaluate_time: Duration,
    /// Paint phase duration (zero if not measured).
    pub paint_time: Duration,
    /// GPU or raster time of the previous frame, as reported by the backend.
    pub last_render_time: Option<Duration>,
}

/// A per-frame window change record.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowChange {
    /// Slot index of the window that changed.
    pub window_index: u32,
    /// Which field changed.
    pub field: WindowField,
}

#[cfg(feature = "trace-rich")]
impl WindowChange {
    /// Flattens [`StackChanges`] into `out`, appending one record per change.
    pub fn collect(changes: &StackChanges, out: &mut alloc::vec::Vec<Self>) {
        let lists: [(&[u32], WindowField); 8] = [
            (&changes.added, WindowField::Added),
            (&changes.removed, WindowField::Removed),
            (&changes.geometry, WindowField::Geometry),
            (&changes.opacity, WindowField::Opacity),
            (&changes.shape, WindowField::Shape),
            (&changes.content, WindowField::Content),
            (&changes.flags, WindowField::Flags),
            (&changes.shown, WindowField::Visibility),
        ];
        for (indices, field) in lists {
            out.extend(indices.iter().map(|&window_index| Self {
                window_index,
                field,
            }));
        }
        out.extend(changes.hidden.iter().map(|&window_index| Self {
            window_index,
            field: WindowField::Visibility,
        }));
    }
}

/// An axis-aligned damage rectangle.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

#[cfg(feature = "trace-rich")]
impl From<Rect> for DamageRect {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x1,
            y: r.y1,
            width: r.width(),
            height: r.height(),
        }
    }
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the compositor.
///
/// All methods have default no-op implementations.
pub trait TraceSink {
    /// Called once the repaint region of a frame is known.
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        _ = e;
    }

    /// Called at the beginning of a frame phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a frame phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when a frame is skipped.
    fn on_frame_skipped(&mut self, e: &FrameSkippedEvent) {
        _ = e;
    }

    /// Called when a feature is disabled.
    fn on_feature_disabled(&mut self, e: &FeatureDisabledEvent) {
        _ = e;
    }

    /// Called after a device reset dropped all backend resources.
    fn on_device_reset(&mut self, e: &DeviceResetEvent) {
        _ = e;
    }

    /// Called with the per-frame summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }

    /// Called with per-frame window changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_window_changes(&mut self, frame_index: u64, changes: &[WindowChange]) {
        _ = (frame_index, changes);
    }

    /// Called with the repaint rectangles (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        _ = (frame_index, rects);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`FrameBeginEvent`].
    #[inline]
    pub fn frame_begin(&mut self, e: &FrameBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameSkippedEvent`].
    #[inline]
    pub fn frame_skipped(&mut self, e: &FrameSkippedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_skipped(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FeatureDisabledEvent`].
    #[inline]
    pub fn feature_disabled(&mut self, e: &FeatureDisabledEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_feature_disabled(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`DeviceResetEvent`].
    #[inline]
    pub fn device_reset(&mut self, e: &DeviceResetEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_device_reset(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_frame_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }

    /// Emits window changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn window_changes(&mut self, frame_index: u64, changes: &[WindowChange]) {
        if let Some(s) = &mut self.sink {
            s.on_window_changes(frame_index, changes);
        }
    }

    /// Emits damage rectangles (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        if let Some(s) = &mut self.sink {
            s.on_damage_rects(frame_index, rects);
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Counts the work done during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    summary: FrameSummary,
    phase_starts: [Option<Duration>; 3],
    phase_ends: [Option<Duration>; 3],
}

impl FrameSummaryBuilder {
    /// Starts a summary for the given frame.
    #[must_use]
    pub fn new(frame_index: u64, buffer_age: i32) -> Self {
        Self {
            summary: FrameSummary {
                frame_index,
                buffer_age,
                ..FrameSummary::default()
            },
            phase_starts: [None; 3],
            phase_ends: [None; 3],
        }
    }

    /// Records the repaint region.
    pub fn set_repaint(&mut self, region: &Region) {
        self.summary.repaint_area = region.area();
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: Duration) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: Duration) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Counts a painted window body.
    pub fn window_painted(&mut self) {
        self.summary.windows_painted += 1;
    }

    /// Counts a blit.
    pub fn blit(&mut self) {
        self.summary.blits += 1;
    }

    /// Counts a blur.
    pub fn blur(&mut self) {
        self.summary.blurs += 1;
    }

    /// Counts a drawn shadow.
    pub fn shadow(&mut self) {
        self.summary.shadows += 1;
    }

    /// Work counted so far.
    #[must_use]
    pub fn current(&self) -> &FrameSummary {
        &self.summary
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self, presented: bool, last_render_time: Option<Duration>) -> FrameSummary {
        FrameSummary {
            presented,
            last_render_time,
            evaluate_time: self.phase_duration(PhaseKind::Evaluate),
            paint_time: self.phase_duration(PhaseKind::Paint),
            ..self.summary
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> Duration {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => Duration::ZERO,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Evaluate => 0,
        PhaseKind::Paint => 1,
        PhaseKind::Present => 2,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
