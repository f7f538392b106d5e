// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. Timestamps and durations
//! are stored as nanoseconds. [`decode`] reads them back as an iterator of
//! [`RecordedEvent`].
//!
//! Rich events ([`on_window_changes`](TraceSink::on_window_changes),
//! [`on_damage_rects`](TraceSink::on_damage_rects)) store only the count.

use core::time::Duration;

use lucarne_core::trace::{
    DamageRect, DeviceResetEvent, Feature, FeatureDisabledEvent, FrameBeginEvent,
    FrameSkippedEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind, SkipReason,
    TraceSink, WindowChange,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_BEGIN: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_FRAME_SKIPPED: u8 = 4;
const TAG_FEATURE_DISABLED: u8 = 5;
const TAG_DEVICE_RESET: u8 = 6;
const TAG_FRAME_SUMMARY: u8 = 7;
const TAG_WINDOW_CHANGES_COUNT: u8 = 8;
const TAG_DAMAGE_RECTS_COUNT: u8 = 9;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_count(&mut self, len: usize) {
        self.write_u32(u32::try_from(len).unwrap_or(u32::MAX));
    }

    fn write_duration(&mut self, d: Duration) {
        self.write_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
    }

    fn write_option_duration(&mut self, d: Option<Duration>) {
        match d {
            Some(d) => {
                self.write_u8(1);
                self.write_duration(d);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Evaluate => 0,
            PhaseKind::Paint => 1,
            PhaseKind::Present => 2,
        });
    }

    fn write_reason(&mut self, r: SkipReason) {
        self.write_u8(match r {
            SkipReason::DeviceReset => 0,
            SkipReason::Busy => 1,
            SkipReason::NothingToPaint => 2,
        });
    }

    fn write_feature(&mut self, f: Feature) {
        self.write_u8(match f {
            Feature::Blur => 0,
            Feature::ShadowBlur => 1,
            Feature::HighPrecision => 2,
            Feature::ColorInversion => 3,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.write_u8(TAG_FRAME_BEGIN);
        self.write_u64(e.frame_index);
        self.write_i32(e.buffer_age);
        self.write_u32(e.repaint_rects);
        self.write_u64(e.repaint_area);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_duration(e.timestamp);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_duration(e.timestamp);
    }

    fn on_frame_skipped(&mut self, e: &FrameSkippedEvent) {
        self.write_u8(TAG_FRAME_SKIPPED);
        self.write_u64(e.frame_index);
        self.write_reason(e.reason);
    }

    fn on_feature_disabled(&mut self, e: &FeatureDisabledEvent) {
        self.write_u8(TAG_FEATURE_DISABLED);
        self.write_u64(e.frame_index);
        self.write_feature(e.feature);
    }

    fn on_device_reset(&mut self, e: &DeviceResetEvent) {
        self.write_u8(TAG_DEVICE_RESET);
        self.write_u64(e.frame_index);
        self.write_u32(e.images_released);
        self.write_u32(e.blur_contexts_released);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_i32(s.buffer_age);
        self.write_u64(s.repaint_area);
        self.write_u32(s.windows_painted);
        self.write_u32(s.blits);
        self.write_u32(s.blurs);
        self.write_u32(s.shadows);
        self.write_u8(u8::from(s.presented));
        self.write_duration(s.evaluate_time);
        self.write_duration(s.paint_time);
        self.write_option_duration(s.last_render_time);
    }

    fn on_window_changes(&mut self, frame_index: u64, changes: &[WindowChange]) {
        self.write_u8(TAG_WINDOW_CHANGES_COUNT);
        self.write_u64(frame_index);
        self.write_count(changes.len());
    }

    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        self.write_u8(TAG_DAMAGE_RECTS_COUNT);
        self.write_u64(frame_index);
        self.write_count(rects.len());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`FrameBeginEvent`].
    FrameBegin(FrameBeginEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`FrameSkippedEvent`].
    FrameSkipped(FrameSkippedEvent),
    /// A [`FeatureDisabledEvent`].
    FeatureDisabled(FeatureDisabledEvent),
    /// A [`DeviceResetEvent`].
    DeviceReset(DeviceResetEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
    /// Window-change count for a frame.
    WindowChangesCount {
        /// Frame counter.
        frame_index: u64,
        /// Number of window changes.
        count: u32,
    },
    /// Damage-rect count for a frame.
    DamageRectsCount {
        /// Frame counter.
        frame_index: u64,
        /// Number of repaint rectangles.
        count: u32,
    },
}

impl RecordedEvent {
    /// Frame counter the event belongs to.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        match self {
            Self::FrameBegin(e) => e.frame_index,
            Self::PhaseBegin(e) => e.frame_index,
            Self::PhaseEnd(e) => e.frame_index,
            Self::FrameSkipped(e) => e.frame_index,
            Self::FeatureDisabled(e) => e.frame_index,
            Self::DeviceReset(e) => e.frame_index,
            Self::FrameSummary(s) => s.frame_index,
            Self::WindowChangesCount { frame_index, .. }
            | Self::DamageRectsCount { frame_index, .. } => *frame_index,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
///
/// Stops at the first unknown tag or truncated record.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_duration(&mut self) -> Option<Duration> {
        self.read_u64().map(Duration::from_nanos)
    }

    fn read_option_duration(&mut self) -> Option<Option<Duration>> {
        let present = self.read_u8()?;
        let d = self.read_duration()?;
        Some((present != 0).then_some(d))
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Evaluate,
            1 => PhaseKind::Paint,
            _ => PhaseKind::Present,
        })
    }

    fn read_reason(&mut self) -> Option<SkipReason> {
        Some(match self.read_u8()? {
            0 => SkipReason::DeviceReset,
            1 => SkipReason::Busy,
            _ => SkipReason::NothingToPaint,
        })
    }

    fn read_feature(&mut self) -> Option<Feature> {
        Some(match self.read_u8()? {
            0 => Feature::Blur,
            1 => Feature::ShadowBlur,
            2 => Feature::HighPrecision,
            _ => Feature::ColorInversion,
        })
    }

    fn decode_frame_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameBegin(FrameBeginEvent {
            frame_index: self.read_u64()?,
            buffer_age: self.read_i32()?,
            repaint_rects: self.read_u32()?,
            repaint_area: self.read_u64()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_duration()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_duration()?,
        }))
    }

    fn decode_frame_skipped(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSkipped(FrameSkippedEvent {
            frame_index: self.read_u64()?,
            reason: self.read_reason()?,
        }))
    }

    fn decode_feature_disabled(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FeatureDisabled(FeatureDisabledEvent {
            frame_index: self.read_u64()?,
            feature: self.read_feature()?,
        }))
    }

    fn decode_device_reset(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DeviceReset(DeviceResetEvent {
            frame_index: self.read_u64()?,
            images_released: self.read_u32()?,
            blur_contexts_released: self.read_u32()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u64()?,
            buffer_age: self.read_i32()?,
            repaint_area: self.read_u64()?,
            windows_painted: self.read_u32()?,
            blits: self.read_u32()?,
            blurs: self.read_u32()?,
            shadows: self.read_u32()?,
            presented: self.read_u8()? != 0,
            evaluate_time: self.read_duration()?,
            paint_time: self.read_duration()?,
            last_render_time: self.read_option_duration()?,
        }))
    }

    fn decode_count(&mut self) -> Option<(u64, u32)> {
        Some((self.read_u64()?, self.read_u32()?))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_FRAME_BEGIN => self.decode_frame_begin(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_FRAME_SKIPPED => self.decode_frame_skipped(),
            TAG_FEATURE_DISABLED => self.decode_feature_disabled(),
            TAG_DEVICE_RESET => self.decode_device_reset(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            TAG_WINDOW_CHANGES_COUNT => self
                .decode_count()
                .map(|(frame_index, count)| RecordedEvent::WindowChangesCount { frame_index, count }),
            TAG_DAMAGE_RECTS_COUNT => self
                .decode_count()
                .map(|(frame_index, count)| RecordedEvent::DamageRectsCount { frame_index, count }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lucarne_core::trace::WindowField;

    use super::*;

    fn sample_summary() -> FrameSummary {
        FrameSummary {
            frame_index: 7,
            buffer_age: 2,
            repaint_area: 4096,
            windows_painted: 3,
            blits: 5,
            blurs: 1,
            shadows: 2,
            presented: true,
            evaluate_time: Duration::from_micros(40),
            paint_time: Duration::from_micros(1_250),
            last_render_time: Some(Duration::from_micros(900)),
        }
    }

    #[test]
    fn frame_summary_survives_recording() {
        let mut rec = RecorderSink::new();
        let orig = sample_summary();
        rec.on_frame_summary(&orig);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RecordedEvent::FrameSummary(s) => assert_eq!(*s, orig),
            other => panic!("expected FrameSummary, got {other:?}"),
        }
    }

    #[test]
    fn unknown_buffer_age_is_kept() {
        let mut rec = RecorderSink::new();
        rec.on_frame_begin(&FrameBeginEvent {
            frame_index: 0,
            buffer_age: -1,
            repaint_rects: 1,
            repaint_area: 100,
        });
        match decode(rec.as_bytes()).next() {
            Some(RecordedEvent::FrameBegin(e)) => {
                assert_eq!(e.buffer_age, -1);
                assert_eq!(e.repaint_area, 100);
            }
            other => panic!("expected FrameBegin, got {other:?}"),
        }
    }

    #[test]
    fn frame_sequence_keeps_order() {
        let mut rec = RecorderSink::new();
        rec.on_phase_begin(&PhaseBeginEvent {
            frame_index: 3,
            phase: PhaseKind::Evaluate,
            timestamp: Duration::from_micros(10),
        });
        rec.on_phase_end(&PhaseEndEvent {
            frame_index: 3,
            phase: PhaseKind::Evaluate,
            timestamp: Duration::from_micros(25),
        });
        rec.on_frame_skipped(&FrameSkippedEvent {
            frame_index: 3,
            reason: SkipReason::Busy,
        });
        rec.on_feature_disabled(&FeatureDisabledEvent {
            frame_index: 4,
            feature: Feature::HighPrecision,
        });
        rec.on_device_reset(&DeviceResetEvent {
            frame_index: 5,
            images_released: 6,
            blur_contexts_released: 1,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 5);
        match &events[1] {
            RecordedEvent::PhaseEnd(e) => {
                assert_eq!(e.phase, PhaseKind::Evaluate);
                assert_eq!(e.timestamp, Duration::from_micros(25));
            }
            other => panic!("expected PhaseEnd, got {other:?}"),
        }
        assert!(matches!(
            events[2],
            RecordedEvent::FrameSkipped(FrameSkippedEvent {
                reason: SkipReason::Busy,
                ..
            })
        ));
        assert!(matches!(
            events[3],
            RecordedEvent::FeatureDisabled(FeatureDisabledEvent {
                feature: Feature::HighPrecision,
                ..
            })
        ));
        match &events[4] {
            RecordedEvent::DeviceReset(e) => {
                assert_eq!(e.images_released, 6);
                assert_eq!(e.blur_contexts_released, 1);
            }
            other => panic!("expected DeviceReset, got {other:?}"),
        }
        let frames: Vec<u64> = events.iter().map(RecordedEvent::frame_index).collect();
        assert_eq!(frames, [3, 3, 3, 4, 5]);
    }

    #[test]
    fn rich_events_store_counts() {
        let mut rec = RecorderSink::new();
        let changes = [
            WindowChange {
                window_index: 0,
                field: WindowField::Geometry,
            },
            WindowChange {
                window_index: 1,
                field: WindowField::Opacity,
            },
        ];
        rec.on_window_changes(42, &changes);
        rec.on_damage_rects(42, &[]);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert!(matches!(
            events[..],
            [
                RecordedEvent::WindowChangesCount {
                    frame_index: 42,
                    count: 2
                },
                RecordedEvent::DamageRectsCount {
                    frame_index: 42,
                    count: 0
                }
            ]
        ));
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_frame_summary(&sample_summary());
        rec.on_frame_summary(&sample_summary());
        let bytes = rec.into_bytes();
        let cut = &bytes[..bytes.len() - 3];
        assert_eq!(decode(cut).count(), 1);
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        assert_eq!(decode(&[]).count(), 0);
    }
}
