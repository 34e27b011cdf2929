//! # DUPLEX Frame Demo
//!
//! Headless run of the full frame loop:
//! - a feeder thread posts synthetic mouse input from outside the owner thread
//! - the input system translates it into GUI pointer messages
//! - a GUI system counts clicks and records draw commands
//! - the headless backend executes them on the render thread
//!
//! ```bash
//! # Default settings, 120 frames
//! cargo run -p duplex_engine --bin frame_demo
//!
//! # With a config file and verbose logs
//! RUST_LOG=duplex_engine=debug cargo run -p duplex_engine --bin frame_demo -- demos/frame_demo.toml
//! ```

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use duplex_engine::{
    Application, EngineConfig, EngineResult, HeadlessBackend, InputSystem, Message, MessageKind,
    MessagePoster, MouseButton, RenderCommand, RenderRecorder, System, SystemId,
};

/// Frames run when no config file sets `max_frames`.
const DEFAULT_FRAMES: u64 = 120;

const GUI_SYSTEM_ID: SystemId = 256;

/// Consumes GUI pointer messages and draws one quad per click.
struct GuiSystem {
    render: RenderRecorder,
    clicks: Arc<AtomicU64>,
    pending_draws: u32,
    pointer: (i32, i32),
}

impl GuiSystem {
    fn record(&self, command: RenderCommand) {
        if let Err(err) = self.render.push(command) {
            tracing::warn!(%err, ?command, "render command dropped");
        }
    }
}

impl System for GuiSystem {
    fn id(&self) -> SystemId {
        GUI_SYSTEM_ID
    }

    fn name(&self) -> &str {
        "gui"
    }

    fn handle_message(&mut self, message: &mut Message) {
        match *message.kind() {
            MessageKind::GuiPointerMove { x, y } => {
                self.pointer = (x, y);
                message.set_handled();
            }
            MessageKind::GuiPointerDown { x, y } => {
                tracing::debug!(x, y, hover = ?self.pointer, "click");
                self.clicks.fetch_add(1, Ordering::Relaxed);
                self.pending_draws += 1;
                message.set_handled();
            }
            MessageKind::GuiPointerUp { .. } => message.set_handled(),
            _ => {}
        }
    }

    fn render(&mut self) {
        self.record(RenderCommand::Clear {
            color: [0.1, 0.1, 0.1, 1.0],
        });
        for quad in 0..std::mem::take(&mut self.pending_draws) {
            self.record(RenderCommand::DrawIndexed {
                mesh: 1,
                material: quad,
                index_count: 6,
            });
        }
    }
}

/// Posts a click every few milliseconds until told to stop.
fn spawn_feeder(poster: MessagePoster, stop: Arc<AtomicBool>) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let mut posted = 0;
        let mut x = 0;
        while !stop.load(Ordering::Acquire) {
            x = (x + 7) % 640;
            let y = 240;
            let burst = [
                MessageKind::MouseMove { x, y },
                MessageKind::MouseButtonDown {
                    button: MouseButton::Left,
                    x,
                    y,
                },
                MessageKind::MouseButtonUp {
                    button: MouseButton::Left,
                    x,
                    y,
                },
            ];
            for kind in burst {
                if poster.post(kind).is_ok() {
                    posted += 1;
                }
            }
            thread::sleep(Duration::from_millis(5));
        }
        posted
    })
}

fn load_config() -> EngineResult<EngineConfig> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if config.frame.max_frames.is_some() {
        Ok(config)
    } else {
        Ok(config.max_frames(DEFAULT_FRAMES))
    }
}

fn run() -> EngineResult<()> {
    let config = load_config()?;
    let backend = HeadlessBackend::new();
    let mut app = Application::new(config, backend.clone())?;

    app.push_system(Box::new(InputSystem::with_pointer_bindings(app.poster())))?;
    let clicks = Arc::new(AtomicU64::new(0));
    app.push_system(Box::new(GuiSystem {
        render: app.render_recorder(),
        clicks: Arc::clone(&clicks),
        pending_draws: 0,
        pointer: (0, 0),
    }))?;

    let stop = Arc::new(AtomicBool::new(false));
    let feeder = spawn_feeder(app.poster(), Arc::clone(&stop));

    let frames = app.run()?;

    stop.store(true, Ordering::Release);
    let posted = feeder.join().unwrap_or_default();
    drop(app);

    let log = backend.snapshot();
    tracing::info!(
        frames,
        posted,
        clicks = clicks.load(Ordering::Relaxed),
        rendered_frames = log.frames,
        draws = log.draws(),
        presents = log.presents(),
        "demo finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "frame demo failed");
            ExitCode::FAILURE
        }
    }
}
