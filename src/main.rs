use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use pollster::block_on;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::WindowBuilder;

use pixelbox_host::{
    panic_message, run_headless, Button, Controller, GameHost, HostConfig, HostOptions,
    LocalPlayer, WindowPresenter, WindowViewport,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let config = match &options.config {
        Some(path) => HostConfig::from_file(path)?,
        None => HostConfig::default(),
    };

    if options.headless {
        return run_headless_game(&options, config);
    }
    match run_interactive(&options, config.clone()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode (set DISPLAY or install a GPU driver to enable rendering)."
                );
                run_headless_game(&options, config)
            } else {
                Err(err)
            }
        }
    }
}

fn boot(options: &CliOptions, config: HostConfig, viewport: Arc<WindowViewport>) -> Result<GameHost> {
    let player = LocalPlayer::from_dir(&options.game_dir, viewport)?;
    let host = block_on(GameHost::boot(
        Box::new(player),
        HostOptions::default().with_config(config),
    ))
    .with_context(|| format!("failed to boot {}", options.game_dir.display()))?;
    Ok(host)
}

/// Viewport a game is ideally shown at: its base resolution divided by the
/// configured scale.
fn preferred_viewport(config: &HostConfig) -> (u32, u32) {
    let (width, height) = config.base_resolution();
    let scale = if config.scale > 0.0 { config.scale } else { 1.0 };
    (
        (width as f32 / scale).round() as u32,
        (height as f32 / scale).round() as u32,
    )
}

fn run_headless_game(options: &CliOptions, config: HostConfig) -> Result<()> {
    let (width, height) = preferred_viewport(&config);
    let viewport = Arc::new(WindowViewport::new(width, height));
    let mut host = boot(options, config, viewport)?;
    let summary = run_headless(&mut host, options.frames, 1.0 / 60.0)?;
    println!("{summary}");
    Ok(())
}

fn run_interactive(options: &CliOptions, config: HostConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop =
        event_loop.map_err(|panic| WindowInitError::from_panic("event loop", panic))?;

    let (width, height) = preferred_viewport(&config);
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("pixelbox")
            .with_inner_size(LogicalSize::new(width as f64, height as f64))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let presenter = block_on(WindowPresenter::new(Arc::clone(&window)))
        .map_err(|err| WindowInitError::from_error("GPU presenter", err))?;
    let size = window.inner_size();
    let viewport = Arc::new(WindowViewport::new(size.width, size.height));
    let mut host = boot(options, config, Arc::clone(&viewport))?;
    host.play();

    let mut app = AppState {
        presenter,
        host,
        viewport,
        controller: Controller::new(),
        last_frame: Instant::now(),
        last_error: None,
    };

    let mut event_loop = event_loop;
    event_loop.run_return(|event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        if let Err(err) = app.process_event(&event, control_flow) {
            app.last_error = Some(err);
            control_flow.set_exit();
        }
    });

    app.shutdown();

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    presenter: WindowPresenter,
    host: GameHost,
    viewport: Arc<WindowViewport>,
    controller: Controller,
    last_frame: Instant,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

impl AppState {
    fn process_event(&mut self, event: &Event<()>, control_flow: &mut ControlFlow) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.presenter.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        control_flow.set_exit();
                    }
                    WindowEvent::Resized(size) => self.resize(*size),
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        self.resize(**new_inner_size);
                    }
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.virtual_keycode == Some(VirtualKeyCode::Escape) {
                            control_flow.set_exit();
                        } else {
                            self.handle_keyboard(input);
                        }
                    }
                    _ => {}
                }
            }
            Event::RedrawRequested(window_id) if *window_id == self.presenter.window_id() => {
                self.redraw()?;
            }
            Event::MainEventsCleared => {
                self.presenter.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.presenter.resize(size);
        self.viewport.update(size.width, size.height);
        self.host.resize(size.width, size.height);
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;
        self.host
            .frame(std::slice::from_ref(&self.controller), delta, true);

        let renderer = self.host.renderer().borrow();
        let Some(pixels) = renderer.pixels(None) else {
            return Ok(());
        };
        let (width, height) = renderer.screen_size();
        if let Err(err) = self.presenter.present(pixels, width, height) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.presenter.window().inner_size();
                    drop(renderer);
                    self.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("Surface timeout; retrying next frame");
                }
            }
        }
        Ok(())
    }

    fn handle_keyboard(&mut self, input: &KeyboardInput) {
        let Some(button) = input.virtual_keycode.and_then(map_keycode) else {
            return;
        };
        match input.state {
            ElementState::Pressed => self.controller.press(button),
            ElementState::Released => self.controller.release(button),
        }
    }

    fn shutdown(&mut self) {
        let state = self.host.state();
        info!(
            "ran {} frame(s), {:.1}s of game time",
            state.frames(),
            state.elapsed()
        );
        if state.fault_reported() {
            warn!("game raised {} tick fault(s)", state.faults());
        }
        self.host.stop();
    }
}

fn map_keycode(code: VirtualKeyCode) -> Option<Button> {
    use VirtualKeyCode as Key;
    Some(match code {
        Key::Left => Button::Left,
        Key::Right => Button::Right,
        Key::Up => Button::Up,
        Key::Down => Button::Down,
        Key::Z => Button::A,
        Key::X => Button::B,
        Key::A => Button::X,
        Key::S => Button::Y,
        Key::Return => Button::Start,
        Key::RShift => Button::Select,
        _ => return None,
    })
}

struct CliOptions {
    game_dir: PathBuf,
    headless: bool,
    frames: u32,
    config: Option<PathBuf>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        const USAGE: &str =
            "Usage: pixelbox-host <game-dir> [--headless] [--frames N] [--config FILE]";
        let mut args = env::args().skip(1);
        let Some(game_dir) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut options = Self {
            game_dir: PathBuf::from(game_dir),
            headless: false,
            frames: 60,
            config: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a value"))?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value:?}"))?;
                }
                "--config" => {
                    let value = args.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                    options.config = Some(PathBuf::from(value));
                }
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }
        Ok(options)
    }
}
