// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless compositing loop that exercises the tracing and diagnostics
//! pipeline.
//!
//! Composites 60 frames of a small animated window stack on the software
//! backend, recording events to both a
//! [`PrettyPrintSink`](lucarne_debug::pretty::PrettyPrintSink) and a
//! [`RecorderSink`](lucarne_debug::recorder::RecorderSink), then exports a
//! Chrome trace JSON file.
//!
//! Pass a path to a JSON options document to override the built-in
//! configuration. Set `RUST_LOG=debug` for backend and compositor logs.

use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;

use lucarne_backend_soft::{SoftBackend, SurfacePool};
use lucarne_core::geom::{Point, Rect, Size};
use lucarne_core::stack::{SurfaceId, WindowId, WindowStack};
use lucarne_core::trace::{
    DamageRect, DeviceResetEvent, FeatureDisabledEvent, FrameBeginEvent, FrameSkippedEvent,
    FrameSummary, PhaseBeginEvent, PhaseEndEvent, TraceSink, Tracer, WindowChange,
};
use lucarne_debug::pretty::PrettyPrintSink;
use lucarne_debug::recorder::RecorderSink;
use lucarne_render::backend::BackendTarget;
use lucarne_render::blur::BlurMethod;
use lucarne_render::compositor::FrameOutcome;
use lucarne_render::image::Color;
use lucarne_render::options::CompositorOptions;
use lucarne_render::registry::BackendRegistry;
use lucarne_render::session::Session;

const FRAME_COUNT: u64 = 60;
const SCREEN: Size = Size::new(320, 200);

/// Forwards every event to both sinks.
struct Sinks {
    pretty: PrettyPrintSink,
    recorder: RecorderSink,
}

impl TraceSink for Sinks {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.pretty.on_frame_begin(e);
        self.recorder.on_frame_begin(e);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.pretty.on_phase_begin(e);
        self.recorder.on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.pretty.on_phase_end(e);
        self.recorder.on_phase_end(e);
    }

    fn on_frame_skipped(&mut self, e: &FrameSkippedEvent) {
        self.pretty.on_frame_skipped(e);
        self.recorder.on_frame_skipped(e);
    }

    fn on_feature_disabled(&mut self, e: &FeatureDisabledEvent) {
        self.pretty.on_feature_disabled(e);
        self.recorder.on_feature_disabled(e);
    }

    fn on_device_reset(&mut self, e: &DeviceResetEvent) {
        self.pretty.on_device_reset(e);
        self.recorder.on_device_reset(e);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.pretty.on_frame_summary(s);
        self.recorder.on_frame_summary(s);
    }

    fn on_window_changes(&mut self, frame_index: u64, changes: &[WindowChange]) {
        self.pretty.on_window_changes(frame_index, changes);
        self.recorder.on_window_changes(frame_index, changes);
    }

    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        self.pretty.on_damage_rects(frame_index, rects);
        self.recorder.on_damage_rects(frame_index, rects);
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match load_options() {
        Ok(options) => options,
        Err(message) => {
            log::error!("{message}");
            return ExitCode::FAILURE;
        }
    };

    // -- backend -----------------------------------------------------------
    let pool = SurfacePool::new();
    let mut registry = BackendRegistry::new();
    if let Err(e) = SoftBackend::register(&mut registry, pool.clone()) {
        log::error!("cannot register the software backend: {e}");
        return ExitCode::FAILURE;
    }
    let mut session = match Session::new(
        registry,
        SoftBackend::NAME,
        BackendTarget::new(SCREEN),
        options,
    ) {
        Ok(session) => session,
        Err(e) => {
            log::error!("cannot start the compositor: {e}");
            return ExitCode::FAILURE;
        }
    };

    // -- windows -----------------------------------------------------------
    let mut stack = WindowStack::new();
    let desktop = stack.create_window(Rect::from_origin_size(Point::ZERO, SCREEN));
    pool.set_rgba8(SurfaceId(1), SCREEN, &gradient(SCREEN));
    stack.set_surface(desktop, Some(SurfaceId(1)));

    let paper = Color::new(0.9, 0.9, 0.85, 1.0);
    let editor = window(&mut stack, &pool, Rect::new(24, 20, 184, 150), 2, paper);
    stack.set_corner_radius(editor, 8);
    let navy = Color::new(0.1, 0.3, 0.6, 1.0);
    let panel = window(&mut stack, &pool, Rect::new(0, 0, 96, 72), 3, navy);
    stack.set_opacity(panel, 0.7);
    let mut flags = stack.flags(panel);
    flags.shadow = true;
    flags.blur_background = true;
    stack.set_flags(panel, flags);

    // -- loop --------------------------------------------------------------
    let mut sinks = Sinks {
        pretty: PrettyPrintSink::new(Box::new(std::io::stdout())),
        recorder: RecorderSink::new(),
    };
    let mut skipped = 0;
    for frame_index in 0..FRAME_COUNT {
        // The panel slides right across the editor, which is raised now and then.
        let step = i32::try_from(frame_index).unwrap_or(i32::MAX);
        stack.set_geometry(panel, Rect::from_xywh(120 + step * 2, 90, 96, 72));
        if frame_index % 20 == 10 {
            stack.raise(editor);
        }

        let outcome = session.frame(&mut stack, &mut Tracer::new(&mut sinks));
        match outcome {
            Ok(FrameOutcome::Presented { ok: true }) => {}
            Ok(FrameOutcome::Presented { ok: false }) => {
                log::warn!("frame {frame_index}: present failed");
            }
            Ok(FrameOutcome::Skipped(reason)) => {
                log::debug!("frame {frame_index}: skipped ({reason:?})");
                skipped += 1;
            }
            Err(e) => {
                log::error!("frame {frame_index}: {e}");
                return ExitCode::FAILURE;
            }
        }
        for surface in session.compositor_mut().take_released_surfaces() {
            log::debug!("surface {surface:?} released");
        }
    }

    // -- export Chrome trace -----------------------------------------------
    let path = "trace.json";
    let written = File::create(path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        lucarne_debug::chrome::export(sinks.recorder.as_bytes(), &mut writer)
    });
    if let Err(e) = written {
        log::error!("cannot write {path}: {e}");
        return ExitCode::FAILURE;
    }

    println!("Wrote {path} ({FRAME_COUNT} frames, {skipped} skipped)");
    ExitCode::SUCCESS
}

fn load_options() -> Result<CompositorOptions, String> {
    if let Some(path) = std::env::args().nth(1) {
        let src =
            std::fs::read_to_string(&path).map_err(|e| format!("cannot read {path}: {e}"))?;
        return CompositorOptions::from_json(&src).map_err(|e| format!("{path}: {e}"));
    }
    let mut options = CompositorOptions::default();
    options.shadow.enabled = true;
    options.blur.method = BlurMethod::DualKawase;
    options.blur.strength = 3;
    Ok(options)
}

fn window(
    stack: &mut WindowStack,
    pool: &SurfacePool,
    rect: Rect,
    surface: u32,
    color: Color,
) -> WindowId {
    let id = stack.create_window(rect);
    pool.fill(SurfaceId(surface), rect.size(), color);
    stack.set_surface(id, Some(SurfaceId(surface)));
    id
}

/// A diagonal gradient as straight-alpha RGBA bytes.
fn gradient(size: Size) -> Vec<u8> {
    let (w, h) = (size.width.max(1), size.height.max(1));
    let mut bytes = Vec::with_capacity(size.width as usize * size.height as usize * 4);
    for y in 0..size.height {
        for x in 0..size.width {
            let r = u8::try_from(x * 255 / w).unwrap_or(u8::MAX);
            let b = u8::try_from(y * 255 / h).unwrap_or(u8::MAX);
            bytes.extend_from_slice(&[r, 64, b, 255]);
        }
    }
    bytes
}
