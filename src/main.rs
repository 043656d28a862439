//! Wind particle demo.
//!
//! ```text
//! windgl [FIELD.png [CONFIG.json]]
//! ```
//!
//! `FIELD.png` needs a `FIELD.json` sidecar with the velocity bounds. Without
//! arguments a synthetic pair of vortices is advected. Up/Down double or halve
//! the particle count, Escape quits. Set `RUST_LOG=windgl=debug` for resource
//! tracing.

use std::sync::Arc;

use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use windgl::prelude::*;

fn synthetic_field() -> windgl::Result<WindFieldDescriptor> {
    let bounds = VelocityBounds::new(-25.0, 25.0, -25.0, 25.0);
    WindFieldDescriptor::from_fn(360, 180, bounds, |x, y| {
        // Two counter-rotating vortices over a westerly drift.
        let vortex = |cx: f32, cy: f32, spin: f32| {
            let (dx, dy) = ((x - cx) * 2.0, y - cy);
            let falloff = (-(dx * dx + dy * dy) * 12.0).exp();
            (-dy * spin * falloff, dx * spin * falloff)
        };
        let (u1, v1) = vortex(0.3, 0.45, 60.0);
        let (u2, v2) = vortex(0.7, 0.55, -60.0);
        (u1 + u2 + 4.0, v1 + v2)
    })
}

fn load_inputs() -> windgl::Result<(WindFieldDescriptor, EngineConfig)> {
    let mut args = std::env::args().skip(1);
    let field = match args.next() {
        Some(path) => ImageFieldLoader::from_image_path(path).load()?,
        None => synthetic_field()?,
    };
    let config = match args.next() {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    Ok((field, config))
}

struct Running {
    window: Arc<Window>,
    backend: WgpuBackend,
    simulation: WindSimulation,
}

struct App {
    field: WindFieldDescriptor,
    config: EngineConfig,
    running: Option<Running>,
}

impl App {
    fn new(field: WindFieldDescriptor, config: EngineConfig) -> Self {
        Self {
            field,
            config,
            running: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> windgl::Result<Running> {
        let window_attrs = Window::default_attributes()
            .with_title("windgl")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 640));
        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => return Err(WindError::UnsupportedSurface(e.to_string())),
        };

        let mut backend = pollster::block_on(WgpuBackend::new(window.clone()))?;
        let mut simulation = WindSimulation::new(&mut backend, self.config.clone())?;

        let size = window.inner_size();
        let scale = window.scale_factor() as f32;
        simulation.on_viewport_changed(
            &mut backend,
            size.width as f32 / scale,
            size.height as f32 / scale,
            scale,
        )?;
        simulation.set_field(&mut backend, self.field.clone())?;

        Ok(Running {
            window,
            backend,
            simulation,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_mut() {
            running.simulation.dispose(&mut running.backend);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(e) => {
                error!("failed to start: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => self.shutdown(event_loop),
                KeyCode::ArrowUp | KeyCode::ArrowDown => {
                    let current = running.simulation.draw_count();
                    let count = if code == KeyCode::ArrowUp {
                        current.saturating_mul(2)
                    } else {
                        (current / 2).max(1)
                    };
                    match running.simulation.configure(&mut running.backend, count) {
                        Ok(()) => info!("particle count: {count}"),
                        Err(e) => warn!("keeping {current} particles: {e}"),
                    }
                }
                _ => {}
            },
            WindowEvent::Resized(size) => {
                let scale = running.window.scale_factor() as f32;
                if let Err(e) = running.simulation.on_viewport_changed(
                    &mut running.backend,
                    size.width as f32 / scale,
                    size.height as f32 / scale,
                    scale,
                ) {
                    warn!("resize failed: {e}");
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Err(e) = running
                    .simulation
                    .set_pixel_density(&mut running.backend, scale_factor as f32)
                {
                    warn!("pixel density change failed: {e}");
                }
            }
            WindowEvent::RedrawRequested => {
                if running.simulation.is_disposed() {
                    return;
                }
                match running.simulation.step(&mut running.backend) {
                    Ok(_) => {}
                    Err(e) if e.is_recoverable() => warn!("frame dropped: {e}"),
                    Err(e) => {
                        error!("render error: {e}");
                        self.shutdown(event_loop);
                        return;
                    }
                }
                running.window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("windgl=info")).init();

    let (field, config) = match load_inputs() {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(field, config);
    if let Err(e) = event_loop.run_app(&mut app) {
        error!("event loop error: {e}");
    }
}
