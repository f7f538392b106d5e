// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are printed in microseconds since the compositor started.

use core::time::Duration;
use std::io::Write;

use lucarne_core::trace::{
    DamageRect, DeviceResetEvent, FeatureDisabledEvent, FrameBeginEvent, FrameSkippedEvent,
    FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink, WindowChange,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its destination.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn us(d: Duration) -> f64 {
    d.as_secs_f64() * 1e6
}

pub(crate) fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Evaluate => "eval",
        PhaseKind::Paint => "paint",
        PhaseKind::Present => "present",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[frame] frame={} age={} repaint={}px in {} rects",
            e.frame_index, e.buffer_age, e.repaint_area, e.repaint_rects,
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            us(e.timestamp),
        );
    }

    fn on_frame_skipped(&mut self, e: &FrameSkippedEvent) {
        let _ = writeln!(
            self.writer,
            "[skip] frame={} reason={:?}",
            e.frame_index, e.reason,
        );
    }

    fn on_feature_disabled(&mut self, e: &FeatureDisabledEvent) {
        let _ = writeln!(
            self.writer,
            "[disabled] frame={} feature={:?}",
            e.frame_index, e.feature,
        );
    }

    fn on_device_reset(&mut self, e: &DeviceResetEvent) {
        let _ = writeln!(
            self.writer,
            "[reset] frame={} images={} blur_contexts={}",
            e.frame_index, e.images_released, e.blur_contexts_released,
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let presented = if s.presented { "ok" } else { "FAILED" };
        let render = s
            .last_render_time
            .map_or_else(|| "?".to_owned(), |d| format!("{:.1}µs", us(d)));
        let _ = writeln!(
            self.writer,
            "[summary] frame={} windows={} blits={} blurs={} shadows={} \
             eval={:.1}µs paint={:.1}µs render={render} present={presented}",
            s.frame_index,
            s.windows_painted,
            s.blits,
            s.blurs,
            s.shadows,
            us(s.evaluate_time),
            us(s.paint_time),
        );
    }

    fn on_window_changes(&mut self, frame_index: u64, changes: &[WindowChange]) {
        let _ = writeln!(
            self.writer,
            "[windows] frame={frame_index} changes={}",
            changes.len(),
        );
    }

    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        let _ = writeln!(
            self.writer,
            "[damage] frame={frame_index} rects={}",
            rects.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use lucarne_core::trace::SkipReason;

    use super::*;

    fn printed(f: impl FnOnce(&mut PrettyPrintSink<Vec<u8>>)) -> String {
        let mut sink = PrettyPrintSink::with_writer(Vec::new());
        f(&mut sink);
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn frame_begin_line() {
        let output = printed(|s| {
            s.on_frame_begin(&FrameBeginEvent {
                frame_index: 1,
                buffer_age: -1,
                repaint_rects: 2,
                repaint_area: 300,
            });
        });
        assert!(output.starts_with("[frame]"), "got: {output}");
        assert!(output.contains("frame=1 age=-1"), "got: {output}");
        assert!(output.contains("300px in 2 rects"), "got: {output}");
    }

    #[test]
    fn phase_timestamps_are_microseconds() {
        let output = printed(|s| {
            s.on_phase_end(&PhaseEndEvent {
                frame_index: 4,
                phase: PhaseKind::Paint,
                timestamp: Duration::from_nanos(2_500),
            });
        });
        assert_eq!(output, "[phase:end] frame=4 paint at 2.5µs\n");
    }

    #[test]
    fn skipped_and_failed_frames_are_visible() {
        let output = printed(|s| {
            s.on_frame_skipped(&FrameSkippedEvent {
                frame_index: 9,
                reason: SkipReason::NothingToPaint,
            });
            s.on_frame_summary(&FrameSummary::default());
        });
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "[skip] frame=9 reason=NothingToPaint");
        assert!(lines[1].ends_with("render=? present=FAILED"), "got: {output}");
    }
}
