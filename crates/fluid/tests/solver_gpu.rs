//! Headless GPU tests for the solver loop.
//!
//! Each test acquires its own device and skips cleanly when the machine has
//! no compatible adapter, so the suite stays green on CI runners without a
//! GPU.

use fluid::gpu::readback::{channel_count, read_field_f32};
use fluid::gpu::GpuContext;
use fluid::{ConfigOverrides, FluidEngine, FluidError, MAX_DT};

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Small grids keep every test comfortably under a second.
fn test_overrides() -> ConfigOverrides {
    ConfigOverrides {
        sim_resolution: Some(64),
        dye_resolution: Some(64),
        capture_resolution: Some(64),
        bloom_resolution: Some(32),
        sunrays_resolution: Some(32),
        ..Default::default()
    }
}

/// Builds an engine against a headless device, or None when the machine has
/// no compatible adapter.
fn init_engine(width: u32, height: u32, overrides: ConfigOverrides) -> Option<FluidEngine> {
    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = match GpuContext::acquire_headless() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("no GPU context ({e}); skipping test");
            return None;
        }
    };
    match FluidEngine::new(ctx, width, height, OUTPUT_FORMAT, &overrides) {
        Ok(engine) => Some(engine),
        Err(e) => {
            eprintln!("engine init failed ({e}); skipping test");
            None
        }
    }
}

/// Velocity magnitudes per texel, row-major over the simulation grid.
fn velocity_magnitudes(engine: &FluidEngine) -> Vec<f32> {
    let pool = engine.pool().expect("engine not disposed");
    let field = pool.velocity.read();
    let channels = channel_count(field.format()).unwrap() as usize;
    let data = read_field_f32(engine.context(), field).expect("velocity readback");
    data.chunks_exact(channels)
        .map(|texel| (texel[0] * texel[0] + texel[1] * texel[1]).sqrt())
        .collect()
}

fn dye_total(engine: &FluidEngine) -> f32 {
    let pool = engine.pool().expect("engine not disposed");
    let field = pool.dye.read();
    let channels = channel_count(field.format()).unwrap() as usize;
    let data = read_field_f32(engine.context(), field).expect("dye readback");
    data.chunks_exact(channels)
        .map(|texel| texel[0] + texel[1] + texel[2])
        .sum()
}

#[test]
fn splat_adds_velocity_and_dye_near_its_center() {
    let Some(mut engine) = init_engine(256, 256, test_overrides()) else {
        return;
    };
    engine.start();
    engine.queue_splat(0.5, 0.5, 100.0, 0.0, [0.5, 0.2, 0.1]);
    engine.advance(1.0 / 60.0);

    let magnitudes = velocity_magnitudes(&engine);
    let pool = engine.pool().unwrap();
    let (w, h) = (pool.velocity.width() as usize, pool.velocity.height() as usize);

    let center = magnitudes[(h / 2) * w + w / 2];
    let corner = magnitudes[0];
    assert!(
        center > 1.0,
        "expected a strong impulse at the splat center, got {center}"
    );
    // Gaussian falloff: the far corner sees essentially nothing.
    assert!(
        corner < center * 0.01,
        "corner magnitude {corner} not small next to center {center}"
    );

    assert!(dye_total(&engine) > 0.0, "splat deposited no dye");
}

#[test]
fn fields_decay_without_input() {
    let Some(mut engine) = init_engine(256, 256, test_overrides()) else {
        return;
    };
    engine.start();
    engine.queue_splat(0.5, 0.5, 0.0, 0.0, [1.0, 1.0, 1.0]);
    engine.advance(1.0 / 60.0);
    let before = dye_total(&engine);

    for _ in 0..30 {
        engine.advance(1.0 / 60.0);
    }
    let after = dye_total(&engine);
    assert!(before > 0.0);
    assert!(
        after < before,
        "dye should dissipate frame over frame ({before} -> {after})"
    );
}

#[test]
fn large_timesteps_are_clamped() {
    let Some(mut engine) = init_engine(128, 128, test_overrides()) else {
        return;
    };
    engine.start();
    engine.queue_splat(0.5, 0.5, 500.0, 0.0, [0.3, 0.3, 0.3]);
    // A five second frame, as if the tab was backgrounded.
    engine.advance(5.0);
    assert_eq!(engine.last_dt(), MAX_DT);

    // The clamped step keeps the field finite.
    for magnitude in velocity_magnitudes(&engine) {
        assert!(magnitude.is_finite());
    }
}

#[test]
fn nonsense_timesteps_fall_back_to_the_clamp() {
    let Some(mut engine) = init_engine(128, 128, test_overrides()) else {
        return;
    };
    engine.start();
    engine.advance(f32::NAN);
    assert_eq!(engine.last_dt(), MAX_DT);
    engine.advance(-1.0);
    assert_eq!(engine.last_dt(), MAX_DT);
}

#[test]
fn zero_pressure_iterations_is_a_valid_configuration() {
    let overrides = ConfigOverrides {
        pressure_iterations: Some(0),
        ..test_overrides()
    };
    let Some(mut engine) = init_engine(128, 128, overrides) else {
        return;
    };
    engine.start();
    engine.queue_splat(0.4, 0.6, 200.0, -100.0, [0.2, 0.4, 0.1]);
    for _ in 0..5 {
        engine.advance(1.0 / 60.0);
    }
    for magnitude in velocity_magnitudes(&engine) {
        assert!(magnitude.is_finite(), "projection-free step went non-finite");
    }
}

#[test]
fn resize_with_unchanged_dimensions_keeps_buffers() {
    let Some(mut engine) = init_engine(300, 200, test_overrides()) else {
        return;
    };
    let (w, h) = {
        let pool = engine.pool().unwrap();
        (pool.velocity.width(), pool.velocity.height())
    };
    engine.resize(300, 200);
    let pool = engine.pool().unwrap();
    assert_eq!(pool.velocity.width(), w);
    assert_eq!(pool.velocity.height(), h);
}

#[test]
fn resize_reallocates_and_keeps_the_solver_running() {
    let Some(mut engine) = init_engine(200, 200, test_overrides()) else {
        return;
    };
    engine.start();
    engine.queue_splat(0.5, 0.5, 100.0, 100.0, [0.4, 0.1, 0.2]);
    engine.advance(1.0 / 60.0);

    engine.resize(400, 200);
    let pool = engine.pool().unwrap();
    assert!(pool.velocity.width() > pool.velocity.height());

    engine.advance(1.0 / 60.0);
    for magnitude in velocity_magnitudes(&engine) {
        assert!(magnitude.is_finite());
    }
}

#[test]
fn stopped_engine_ignores_advance() {
    let Some(mut engine) = init_engine(128, 128, test_overrides()) else {
        return;
    };
    engine.queue_splat(0.5, 0.5, 100.0, 0.0, [0.3, 0.3, 0.3]);
    // Never started: the queue must stay untouched.
    engine.advance(1.0 / 60.0);
    assert_eq!(engine.pending_splats(), 1);

    engine.start();
    engine.advance(1.0 / 60.0);
    assert_eq!(engine.pending_splats(), 0);
}

#[test]
fn dispose_is_final() {
    let Some(mut engine) = init_engine(128, 128, test_overrides()) else {
        return;
    };
    engine.start();
    engine.dispose();
    assert!(engine.is_disposed());
    assert!(!engine.is_running());
    assert!(engine.pool().is_none());

    // Late frame callbacks are harmless no-ops.
    engine.advance(1.0 / 60.0);
    engine.on_pointer_move(10.0, 10.0);
    engine.start();
    assert!(!engine.is_running());
    assert!(matches!(engine.capture(), Err(FluidError::Disposed)));
}

#[test]
fn capture_produces_an_rgba_snapshot() {
    let Some(mut engine) = init_engine(256, 128, test_overrides()) else {
        return;
    };
    engine.start();
    engine.queue_splat(0.5, 0.5, 0.0, 0.0, [1.0, 0.5, 0.2]);
    engine.advance(1.0 / 60.0);

    let image = engine.capture().expect("capture");
    assert_eq!(
        image.pixels.len(),
        (image.width * image.height * 4) as usize
    );
    // Wide screen: the capture grid is wide too.
    assert!(image.width > image.height);
    // Opaque composite: every alpha byte is 255.
    assert!(image.pixels.chunks_exact(4).all(|px| px[3] == 255));
    // The splat must be visible somewhere.
    assert!(image.pixels.chunks_exact(4).any(|px| px[0] > 0));
}

#[test]
fn pointer_movement_stirs_the_field() {
    let Some(mut engine) = init_engine(256, 256, test_overrides()) else {
        return;
    };
    engine.start();
    engine.on_pointer_move(128.0, 128.0);
    engine.advance(1.0 / 60.0);
    // Second event produces a delta from the established position.
    engine.on_pointer_move(160.0, 128.0);
    engine.advance(1.0 / 60.0);

    let total: f32 = velocity_magnitudes(&engine).iter().sum();
    assert!(total > 0.0, "pointer drag left the velocity field at rest");
}
