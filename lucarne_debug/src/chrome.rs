// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use core::time::Duration;
use std::io::{self, Write};

use serde_json::{Value, json};

use crate::pretty::phase_name;
use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Phases become duration slices. Events without a timestamp of their own
/// are placed at the most recent phase boundary.
///
/// # Errors
///
/// Returns any error from writing to `writer`.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut now = 0.0;

    for recorded in decode(bytes) {
        let frame_index = recorded.frame_index();
        let event = match recorded {
            RecordedEvent::PhaseBegin(e) => {
                now = us(e.timestamp);
                json!({
                    "ph": "B",
                    "name": phase_name(e.phase),
                    "cat": "Frame",
                    "ts": now,
                    "pid": 0,
                    "tid": 0,
                    "args": { "frame_index": frame_index }
                })
            }
            RecordedEvent::PhaseEnd(e) => {
                now = us(e.timestamp);
                json!({
                    "ph": "E",
                    "name": phase_name(e.phase),
                    "cat": "Frame",
                    "ts": now,
                    "pid": 0,
                    "tid": 0,
                    "args": { "frame_index": frame_index }
                })
            }
            RecordedEvent::FrameBegin(e) => instant(
                "FrameBegin",
                "Frame",
                now,
                json!({
                    "frame_index": frame_index,
                    "buffer_age": e.buffer_age,
                    "repaint_rects": e.repaint_rects,
                    "repaint_area": e.repaint_area,
                }),
            ),
            RecordedEvent::FrameSkipped(e) => instant(
                "FrameSkipped",
                "Frame",
                now,
                json!({
                    "frame_index": frame_index,
                    "reason": format!("{:?}", e.reason),
                }),
            ),
            RecordedEvent::FeatureDisabled(e) => instant(
                "FeatureDisabled",
                "Device",
                now,
                json!({
                    "frame_index": frame_index,
                    "feature": format!("{:?}", e.feature),
                }),
            ),
            RecordedEvent::DeviceReset(e) => instant(
                "DeviceReset",
                "Device",
                now,
                json!({
                    "frame_index": frame_index,
                    "images_released": e.images_released,
                    "blur_contexts_released": e.blur_contexts_released,
                }),
            ),
            RecordedEvent::FrameSummary(s) => instant(
                "FrameSummary",
                "Summary",
                now,
                json!({
                    "frame_index": frame_index,
                    "buffer_age": s.buffer_age,
                    "repaint_area": s.repaint_area,
                    "windows_painted": s.windows_painted,
                    "blits": s.blits,
                    "blurs": s.blurs,
                    "shadows": s.shadows,
                    "presented": s.presented,
                    "eval_us": us(s.evaluate_time),
                    "paint_us": us(s.paint_time),
                    "render_us": s.last_render_time.map(us),
                }),
            ),
            RecordedEvent::WindowChangesCount { count, .. } => instant(
                "WindowChanges",
                "Rich",
                now,
                json!({ "frame_index": frame_index, "count": count }),
            ),
            RecordedEvent::DamageRectsCount { count, .. } => instant(
                "DamageRects",
                "Rich",
                now,
                json!({ "frame_index": frame_index, "count": count }),
            ),
        };
        events.push(event);
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn instant(name: &str, cat: &str, ts: f64, args: Value) -> Value {
    json!({
        "ph": "i",
        "name": name,
        "cat": cat,
        "ts": ts,
        "pid": 0,
        "tid": 0,
        "s": "t",
        "args": args,
    })
}

fn us(d: Duration) -> f64 {
    d.as_secs_f64() * 1e6
}

#[cfg(test)]
mod tests {
    use lucarne_core::trace::{
        FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink,
    };

    use super::*;
    use crate::recorder::RecorderSink;

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Paint,
            timestamp: Duration::from_micros(1_000),
        });
        rec.on_frame_begin(&FrameBeginEvent {
            frame_index: 0,
            buffer_age: 2,
            repaint_rects: 3,
            repaint_area: 640,
        });
        rec.on_phase_end(&PhaseEndEvent {
            frame_index: 0,
            phase: PhaseKind::Paint,
            timestamp: Duration::from_micros(1_100),
        });
        rec.on_frame_summary(&FrameSummary::default());

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 4);

        assert_eq!(parsed[0]["ph"], "B");
        assert_eq!(parsed[0]["name"], "paint");

        // Placed at the phase start it was reported in.
        assert_eq!(parsed[1]["ph"], "i");
        assert_eq!(parsed[1]["name"], "FrameBegin");
        assert_eq!(parsed[1]["ts"], parsed[0]["ts"]);
        assert_eq!(parsed[1]["args"]["repaint_area"], 640);

        assert_eq!(parsed[2]["ph"], "E");
        assert_eq!(parsed[3]["args"]["render_us"], Value::Null);
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert!(parsed.is_empty());
    }
}
