// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Whole frames painted by the compositor into the software backend.

use lucarne_core::geom::{Rect, Size};
use lucarne_core::region::Region;
use lucarne_core::stack::{SurfaceId, WindowId, WindowStack};
use lucarne_core::trace::{SkipReason, Tracer};
use lucarne_render::backend::{Backend, BackendTarget, Quirks};
use lucarne_render::blur::BlurMethod;
use lucarne_render::compositor::{Compositor, DeviceState, FrameOutcome};
use lucarne_render::image::Color;
use lucarne_render::options::CompositorOptions;
use lucarne_render::registry::BackendRegistry;
use lucarne_render::session::Session;

use crate::{Rgba, SoftBackend, SurfacePool};

const SCREEN: Size = Size::new(64, 48);
const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);
const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);

struct Scene {
    pool: SurfacePool,
    backend: SoftBackend,
    compositor: Compositor,
    stack: WindowStack,
}

impl Scene {
    fn new(options: CompositorOptions) -> Self {
        Self::with_backend(options, |_| {})
    }

    fn with_backend(options: CompositorOptions, setup: impl FnOnce(&mut SoftBackend)) -> Self {
        let pool = SurfacePool::new();
        let mut backend = SoftBackend::new(&BackendTarget::new(SCREEN), pool.clone()).unwrap();
        setup(&mut backend);
        let compositor = Compositor::new(options, SCREEN, &backend).unwrap();
        Self {
            pool,
            backend,
            compositor,
            stack: WindowStack::new(),
        }
    }

    fn window(&mut self, rect: Rect, surface: u32, color: Color) -> WindowId {
        let id = self.stack.create_window(rect);
        self.pool.fill(SurfaceId(surface), rect.size(), color);
        self.stack.set_surface(id, Some(SurfaceId(surface)));
        id
    }

    fn frame(&mut self) -> FrameOutcome {
        self.compositor
            .paint_frame(&mut self.backend, &mut self.stack, &mut Tracer::none())
            .unwrap()
    }

    fn front(&self) -> &[Rgba] {
        self.backend
            .pixels(self.backend.front_buffer().unwrap())
            .unwrap()
    }

    fn pixel(&self, x: i32, y: i32) -> Rgba {
        self.backend
            .pixel(self.backend.front_buffer().unwrap(), x, y)
            .unwrap()
    }
}

fn white_background() -> CompositorOptions {
    CompositorOptions {
        background_color: Color::WHITE,
        ..CompositorOptions::default()
    }
}

const PRESENTED: FrameOutcome = FrameOutcome::Presented { ok: true };

#[test]
fn windows_over_the_background_color() {
    let mut scene = Scene::new(CompositorOptions::default());
    scene.window(Rect::new(10, 10, 30, 30), 1, RED);

    assert_eq!(scene.frame(), PRESENTED);
    assert_eq!(scene.pixel(15, 15), Rgba::new(1.0, 0.0, 0.0, 1.0));
    assert_eq!(scene.pixel(5, 5), Rgba::new(0.0, 0.0, 0.0, 1.0));
    assert_eq!(scene.pixel(30, 30), Rgba::new(0.0, 0.0, 0.0, 1.0), "exclusive corner");
}

#[test]
fn translucent_window_blends_with_what_is_below() {
    let mut scene = Scene::new(white_background());
    let w = scene.window(Rect::new(10, 10, 30, 30), 1, RED);
    scene.stack.set_opacity(w, 0.5);

    scene.frame();
    assert_eq!(scene.pixel(20, 20).to_rgba8(), [255, 128, 128, 255]);
    assert_eq!(scene.pixel(40, 20).to_rgba8(), [255, 255, 255, 255]);
}

#[test]
fn upper_window_hides_the_lower_one() {
    let mut scene = Scene::new(CompositorOptions::default());
    scene.window(Rect::new(0, 0, 40, 40), 1, RED);
    scene.window(Rect::new(20, 20, 60, 44), 2, BLUE);

    scene.frame();
    assert_eq!(scene.pixel(10, 10).to_rgba8(), [255, 0, 0, 255]);
    assert_eq!(scene.pixel(25, 25).to_rgba8(), [0, 0, 255, 255]);
    assert_eq!(scene.pixel(50, 43).to_rgba8(), [0, 0, 255, 255]);
    assert_eq!(scene.pixel(50, 10).to_rgba8(), [0, 0, 0, 255]);
}

#[test]
fn root_surface_is_the_background() {
    let mut scene = Scene::new(CompositorOptions::default());
    scene.pool.fill(SurfaceId(100), SCREEN, GREEN);
    scene
        .compositor
        .set_root_surface(&mut scene.backend, Some(SurfaceId(100)));
    scene.window(Rect::new(10, 10, 20, 20), 1, RED);

    scene.frame();
    assert_eq!(scene.pixel(0, 0).to_rgba8(), [0, 255, 0, 255]);
    assert_eq!(scene.pixel(12, 12).to_rgba8(), [255, 0, 0, 255]);
}

#[test]
fn redrawn_contents_reach_the_screen() {
    let mut scene = Scene::new(white_background());
    let w = scene.window(Rect::new(10, 10, 30, 30), 1, RED);
    assert_eq!(scene.frame(), PRESENTED);
    assert_eq!(scene.pixel(15, 15), Rgba::new(1.0, 0.0, 0.0, 1.0));

    scene.pool.fill(SurfaceId(1), Size::new(20, 20), GREEN);
    scene
        .stack
        .add_damage(w, &Region::from_rect(Rect::new(0, 0, 20, 20)));
    assert_eq!(scene.frame(), PRESENTED);
    assert_eq!(scene.pixel(15, 15), Rgba::new(0.0, 1.0, 0.0, 1.0));
    assert!(
        scene.compositor.take_released_surfaces().is_empty(),
        "the window still shows its surface"
    );
}

#[test]
fn resized_windows_show_their_new_contents() {
    let mut scene = Scene::new(white_background());
    let w = scene.window(Rect::new(0, 0, 10, 10), 1, RED);
    assert_eq!(scene.frame(), PRESENTED);

    // Left half blue, right half green at the new size.
    let size = Size::new(40, 10);
    let mut bytes = Vec::new();
    for _ in 0..size.height {
        for x in 0..size.width {
            let px = if x < 20 { [0, 0, 255, 255] } else { [0, 255, 0, 255] };
            bytes.extend_from_slice(&px);
        }
    }
    scene.pool.set_rgba8(SurfaceId(1), size, &bytes);
    scene.stack.set_geometry(w, Rect::new(0, 0, 40, 10));
    assert_eq!(scene.frame(), PRESENTED);

    assert_eq!(scene.pixel(5, 5), Rgba::new(0.0, 0.0, 1.0, 1.0));
    assert_eq!(scene.pixel(30, 5), Rgba::new(0.0, 1.0, 0.0, 1.0));
}

#[test]
fn damage_driven_frames_match_full_repaints() {
    let mut damaged = Scene::new(white_background());
    let mut full = Scene::new(CompositorOptions {
        use_damage: false,
        ..white_background()
    });

    let steps: [fn(&mut Scene); 6] = [
        |s| {
            s.window(Rect::new(10, 10, 30, 30), 1, RED);
            let b = s.window(Rect::new(20, 20, 50, 40), 2, GREEN);
            s.stack.set_opacity(b, 0.6);
        },
        |_| {},
        |s| {
            let a = s.stack.bottom().unwrap();
            s.stack.set_geometry(a, Rect::new(25, 5, 45, 25));
        },
        |s| {
            let b = s.stack.top().unwrap();
            s.stack.set_opacity(b, 0.3);
        },
        |s| {
            let a = s.stack.bottom().unwrap();
            s.stack.destroy_window(a);
        },
        |s| {
            s.window(Rect::new(40, 30, 60, 48), 3, BLUE);
        },
    ];

    let mut partial_frames = 0;
    for (i, step) in steps.iter().enumerate() {
        step(&mut damaged);
        step(&mut full);
        let outcome = damaged.frame();
        assert_eq!(full.frame(), PRESENTED);
        if outcome == PRESENTED {
            let summary = damaged.compositor.last_summary().unwrap();
            if summary.repaint_area < u64::from(SCREEN.width) * u64::from(SCREEN.height) {
                partial_frames += 1;
            }
        } else {
            assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::NothingToPaint));
        }
        assert!(damaged.front() == full.front(), "step {i} diverged");
    }
    assert!(partial_frames > 0, "some frames reused buffer contents");
}

#[test]
fn dithered_present_spreads_rounding() {
    let mut scene = Scene::new(CompositorOptions {
        dithered_present: true,
        ..white_background()
    });
    let w = scene.window(Rect::new(8, 8, 24, 24), 1, RED);
    scene.stack.set_opacity(w, 0.5);

    assert_eq!(scene.frame(), PRESENTED);
    let mut greens = Vec::new();
    for y in 8..24 {
        for x in 8..24 {
            greens.push(scene.pixel(x, y).to_rgba8()[1]);
        }
    }
    assert!(greens.iter().all(|&g| g == 127 || g == 128), "{greens:?}");
    assert!(greens.contains(&127) && greens.contains(&128));
}

#[test]
fn dithering_falls_back_without_high_precision() {
    let mut scene = Scene::with_backend(
        CompositorOptions {
            dithered_present: true,
            ..white_background()
        },
        |b| b.set_high_precision(false),
    );
    let w = scene.window(Rect::new(8, 8, 24, 24), 1, RED);
    scene.stack.set_opacity(w, 0.5);

    assert_eq!(scene.frame(), PRESENTED);
    for y in 8..24 {
        for x in 8..24 {
            assert_eq!(scene.pixel(x, y).to_rgba8()[1], 128);
        }
    }
}

/// A transparent window blurring a white-left, black-right root surface.
fn blur_over_stripes(options: CompositorOptions) -> (Scene, WindowId) {
    let mut scene = Scene::new(options);
    let pixels = (0..SCREEN.height)
        .flat_map(|_| 0..SCREEN.width)
        .map(|x| {
            if x < 32 {
                Rgba::new(1.0, 1.0, 1.0, 1.0)
            } else {
                Rgba::new(0.0, 0.0, 0.0, 1.0)
            }
        })
        .collect();
    scene.pool.set(SurfaceId(100), SCREEN, pixels);
    scene
        .compositor
        .set_root_surface(&mut scene.backend, Some(SurfaceId(100)));

    let w = scene.window(Rect::new(16, 8, 48, 40), 1, Color::TRANSPARENT);
    let mut flags = scene.stack.flags(w);
    flags.has_alpha = true;
    flags.blur_background = true;
    scene.stack.set_flags(w, flags);
    (scene, w)
}

fn box_blur() -> CompositorOptions {
    let mut options = CompositorOptions::default();
    options.blur.method = BlurMethod::Box;
    options.blur.size = 2;
    options
}

#[test]
fn background_blur_softens_edges_behind_a_window() {
    let (mut scene, _) = blur_over_stripes(box_blur());

    assert_eq!(scene.frame(), PRESENTED);
    assert!(scene.compositor.has_blur_context());
    let edge = scene.pixel(31, 20);
    assert!(edge.r > 0.0 && edge.r < 1.0, "{edge:?}");
    assert!(scene.pixel(32, 20).r > 0.0);
    assert_eq!(scene.pixel(31, 44).r, 1.0, "below the window");
    assert_eq!(scene.pixel(20, 20).r, 1.0, "far from the edge");
}

#[test]
fn fixed_strength_blur_still_fades_with_opacity() {
    let mut options = box_blur();
    options.blur.background_fixed = true;

    let (mut opaque, _) = blur_over_stripes(options.clone());
    assert_eq!(opaque.frame(), PRESENTED);
    let (mut faint, w) = blur_over_stripes(options);
    faint.stack.set_blur_opacity(w, 0.05);
    assert_eq!(faint.frame(), PRESENTED);

    let strong = opaque.pixel(31, 20).r;
    let weak = faint.pixel(31, 20).r;
    assert!(strong < 0.9, "full blur darkens the edge: {strong}");
    assert!(weak > 0.95 && weak < 1.0, "faint blur barely shows: {weak}");
}

#[test]
fn shadows_darken_around_windows() {
    for quirks in [Quirks::SLOW_BLUR, Quirks::empty()] {
        let mut options = white_background();
        options.shadow.enabled = true;
        options.shadow.radius = 6;
        options.shadow.offset_x = -6;
        options.shadow.offset_y = -6;
        let mut scene = Scene::with_backend(options, |b| b.set_quirks(quirks));
        let w = scene.window(Rect::new(20, 20, 40, 40), 1, RED);
        let mut flags = scene.stack.flags(w);
        flags.shadow = true;
        scene.stack.set_flags(w, flags);

        assert_eq!(scene.frame(), PRESENTED);
        let near = scene.pixel(40, 30);
        let far = scene.pixel(44, 30);
        assert!(near.r < far.r, "{quirks:?}: {near:?} vs {far:?}");
        assert!(near.r < 1.0, "{quirks:?}");
        assert_eq!(scene.pixel(2, 2).to_rgba8(), [255, 255, 255, 255]);
        assert_eq!(scene.pixel(30, 30).to_rgba8(), [255, 0, 0, 255]);
    }
}

#[test]
fn device_loss_repaints_after_recovery() {
    let mut scene = Scene::new(CompositorOptions::default());
    scene.window(Rect::new(10, 10, 30, 30), 1, RED);
    assert_eq!(scene.frame(), PRESENTED);

    scene.backend.simulate_device_loss();
    assert_eq!(scene.frame(), FrameOutcome::Skipped(SkipReason::DeviceReset));
    assert_eq!(scene.compositor.device_state(), DeviceState::Resetting);
    assert_eq!(scene.compositor.held_images(), 0);
    assert_eq!(scene.frame(), FrameOutcome::Skipped(SkipReason::DeviceReset));

    assert!(scene.backend.recover());
    scene.compositor.reset_complete(&scene.backend);
    assert_eq!(scene.frame(), PRESENTED);
    assert_eq!(scene.pixel(15, 15).to_rgba8(), [255, 0, 0, 255]);
    assert_eq!(scene.pixel(40, 40).to_rgba8(), [0, 0, 0, 255]);
}

#[test]
fn session_creates_the_backend_from_the_registry() {
    let pool = SurfacePool::new();
    let mut registry = BackendRegistry::new();
    SoftBackend::register(&mut registry, pool.clone()).unwrap();
    let mut session = Session::new(
        registry,
        SoftBackend::NAME,
        BackendTarget::new(SCREEN),
        CompositorOptions::default(),
    )
    .unwrap();

    let mut stack = WindowStack::new();
    let w = stack.create_window(Rect::new(0, 0, 8, 8));
    pool.fill(SurfaceId(1), Size::new(8, 8), RED);
    stack.set_surface(w, Some(SurfaceId(1)));

    assert_eq!(session.frame(&mut stack, &mut Tracer::none()).unwrap(), PRESENTED);
    assert_eq!(session.backend_name(), "soft");
    assert_eq!(session.backend().name(), "soft");
    assert_eq!(session.backend().buffer_age(), -1, "second buffer never shown");
    assert_eq!(session.compositor().held_images(), 2, "window and background");
}
