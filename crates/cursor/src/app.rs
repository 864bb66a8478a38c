//! Window loop driving the fluid engine: one `advance` + `render` per
//! redraw, pointer events forwarded straight into the engine's sinks.

use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::Window,
};

use fluid::{ConfigOverrides, FluidEngine, GpuContext};

struct State {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    engine: FluidEngine,
    last_frame: Instant,
}

pub fn run() {
    let event_loop = EventLoop::new().expect("event loop");
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App::default();
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop error: {e}");
    }
}

#[derive(Default)]
struct App {
    state: Option<State>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("fluid cursor")
                        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720)),
                )
                .expect("window"),
        );

        let instance = fluid::create_instance();
        let surface = instance
            .create_surface(window.clone())
            .expect("surface");
        let ctx = pollster::block_on(GpuContext::acquire(&instance, Some(&surface)))
            .expect("GPU context");

        let size = window.inner_size();
        let caps = surface.get_capabilities(&ctx.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(caps.formats[0]);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &surface_config);

        let mut engine = FluidEngine::new(
            ctx,
            surface_config.width,
            surface_config.height,
            format,
            &ConfigOverrides::default(),
        )
        .expect("engine");
        engine.start();
        engine.splat_burst(5 + rand::random::<usize>() % 10);

        window.request_redraw();
        self.state = Some(State {
            window,
            surface,
            surface_config,
            engine,
            last_frame: Instant::now(),
        });
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_none() {
            self.init(event_loop);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                state.engine.dispose();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                state.surface_config.width = size.width.max(1);
                state.surface_config.height = size.height.max(1);
                state
                    .surface
                    .configure(&state.engine.context().device, &state.surface_config);
                state
                    .engine
                    .resize(state.surface_config.width, state.surface_config.height);
            }
            WindowEvent::CursorMoved { position, .. } => {
                state
                    .engine
                    .on_pointer_move(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => match button_state {
                ElementState::Pressed => {
                    state.engine.on_pointer_down();
                    state.engine.splat_burst(3 + rand::random::<usize>() % 5);
                }
                ElementState::Released => state.engine.on_pointer_up(),
            },
            WindowEvent::Touch(touch) => {
                let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                match touch.phase {
                    TouchPhase::Started => {
                        state.engine.on_pointer_move(x, y);
                        state.engine.on_pointer_down();
                    }
                    TouchPhase::Moved => state.engine.on_pointer_move(x, y),
                    TouchPhase::Ended | TouchPhase::Cancelled => state.engine.on_pointer_up(),
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    match event.logical_key {
                        Key::Named(NamedKey::Escape) => {
                            state.engine.dispose();
                            event_loop.exit();
                        }
                        Key::Named(NamedKey::Space) => {
                            state.engine.splat_burst(5 + rand::random::<usize>() % 10);
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - state.last_frame).as_secs_f32();
                state.last_frame = now;
                state.engine.advance(dt);

                match state.surface.get_current_texture() {
                    Ok(frame) => {
                        let view = frame
                            .texture
                            .create_view(&wgpu::TextureViewDescriptor::default());
                        state.engine.render(&view);
                        frame.present();
                    }
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        state
                            .surface
                            .configure(&state.engine.context().device, &state.surface_config);
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        log::warn!("surface frame timed out");
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("surface out of memory");
                        event_loop.exit();
                    }
                }
                state.window.request_redraw();
            }
            _ => {}
        }
    }
}
