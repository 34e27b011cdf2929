//! # Application Frame Driver
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. DISPATCH                                                         │
//! │    └─ Messages registered during frame N-1, front to back           │
//! │                                                                     │
//! │ 2. UPDATE                                                           │
//! │    └─ Every system, front to back                                   │
//! │                                                                     │
//! │ 3. RENDER                                                           │
//! │    └─ Every system, back to front, recording render commands        │
//! │                                                                     │
//! │ 4. END FRAME                                                        │
//! │    ├─ Sync: wait for the render thread to finish frame N-1          │
//! │    ├─ Submit SwapWindow                                             │
//! │    ├─ Swap render queue, swap message bus                           │
//! │    └─ Continue: render thread executes frame N                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The application is an ordinary value. Nothing here is global, so tests
//! can run several applications side by side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use duplex_core::BufferResult;

use crate::bus::{DispatchStats, MessageBus, MessagePoster};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::{Message, MessageKind};
use crate::render::{RenderBackend, RenderCommand, RenderQueue, RenderRecorder, RenderThread};
use crate::system::{System, SystemId, SystemStack};

/// Stack id of the built-in application system.
pub const APPLICATION_SYSTEM_ID: SystemId = 0;

/// Longest frame delta handed to `update`, in seconds.
pub const MAX_DELTA_TIME: f32 = 0.1;

/// Front-most system: turns `Quit` and `WindowClose` into a quit request.
struct ApplicationSystem {
    quit: Arc<AtomicBool>,
}

impl System for ApplicationSystem {
    fn id(&self) -> SystemId {
        APPLICATION_SYSTEM_ID
    }

    fn name(&self) -> &str {
        "application"
    }

    fn handle_message(&mut self, message: &mut Message) {
        if matches!(message.kind(), MessageKind::Quit | MessageKind::WindowClose) {
            tracing::info!(id = ?message.id(), "quit requested");
            self.quit.store(true, Ordering::Release);
            message.set_handled();
        }
    }
}

/// Handle for requesting quit from another thread or a system.
#[derive(Clone, Debug)]
pub struct QuitHandle {
    quit: Arc<AtomicBool>,
}

impl QuitHandle {
    /// Stops the run loop after the current frame.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
    }

    /// Returns true once quit was requested.
    #[must_use]
    pub fn is_quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }
}

/// What `end_frame` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EndFrameReport {
    /// Commands the render thread executed for the previous frame.
    pub rendered_previous: Option<usize>,
    /// Render commands handed to the render thread, including `SwapWindow`.
    pub render_commands: usize,
    /// False if `SwapWindow` did not fit in the render arena.
    pub presented: bool,
    /// Messages that will be dispatched next frame.
    pub messages_ready: usize,
    /// Time spent waiting for producers in both swaps.
    pub swap_wait: Duration,
}

/// Timing and counts of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Delta time handed to `update`, in seconds.
    pub delta_time: f32,
    /// Message dispatch outcome.
    pub dispatch: DispatchStats,
    /// End-of-frame handoff outcome.
    pub end: EndFrameReport,
    /// Wall time of the whole frame.
    pub total: Duration,
}

/// Explicitly constructed application context.
///
/// Owns the message bus, the system stack, the render queue and the render
/// thread. Drop order stops the render thread before the stack detaches.
pub struct Application {
    config: EngineConfig,
    render_thread: RenderThread,
    systems: SystemStack,
    bus: MessageBus,
    render_queue: Arc<RenderQueue>,
    quit: Arc<AtomicBool>,
    frame: u64,
    started: bool,
    last_frame: Instant,
    stats: FrameStatsAccumulator,
}

impl Application {
    /// Builds the bus, the render queue, the render thread and the built-in
    /// application system.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate or the render thread
    /// cannot be spawned.
    pub fn new<B: RenderBackend>(config: EngineConfig, backend: B) -> EngineResult<Self> {
        config.validate()?;

        let bus = MessageBus::new(&config.messages)?;
        let render_queue = Arc::new(RenderQueue::new(&config.render)?);
        let render_thread = RenderThread::spawn(Arc::clone(&render_queue), backend)?;

        let quit = Arc::new(AtomicBool::new(false));
        let mut systems = SystemStack::new();
        systems.push_system(Box::new(ApplicationSystem {
            quit: Arc::clone(&quit),
        }));

        tracing::info!(
            message_capacity = config.messages.capacity,
            render_capacity = config.render.capacity,
            target_fps = config.frame.target_fps,
            "application initialised"
        );

        Ok(Self {
            config,
            render_thread,
            systems,
            bus,
            render_queue,
            quit,
            frame: 0,
            started: false,
            last_frame: Instant::now(),
            stats: FrameStatsAccumulator::new(),
        })
    }

    /// Appends `system` to the stack.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateSystem`] if the id is taken.
    pub fn push_system(&mut self, system: Box<dyn System>) -> EngineResult<()> {
        let id = system.id();
        if self.systems.push_system(system) {
            Ok(())
        } else {
            Err(EngineError::DuplicateSystem(id))
        }
    }

    /// Removes a system from the stack.
    pub fn pop_system(&mut self, id: SystemId) -> Option<Box<dyn System>> {
        self.systems.pop_system(id)
    }

    /// Looks up a system.
    #[must_use]
    pub fn system(&self, id: SystemId) -> Option<&dyn System> {
        self.systems.get_system(id)
    }

    /// The system stack.
    #[must_use]
    pub fn systems(&self) -> &SystemStack {
        &self.systems
    }

    /// The message bus.
    #[must_use]
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Producer handle for the message bus.
    #[must_use]
    pub fn poster(&self) -> MessagePoster {
        self.bus.poster()
    }

    /// Push-only handle to the render queue, for systems that record commands.
    #[must_use]
    pub fn render_recorder(&self) -> RenderRecorder {
        RenderRecorder::new(Arc::clone(&self.render_queue))
    }

    /// Handle for requesting quit.
    #[must_use]
    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            quit: Arc::clone(&self.quit),
        }
    }

    /// Stops the run loop after the current frame.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
    }

    /// Returns true once quit was requested.
    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    /// Frames completed so far.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// The configuration the application was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Accumulated frame statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Runs one frame: dispatch, update, render, end frame.
    ///
    /// The first call also flushes what was registered before it, so
    /// messages posted during setup are dispatched in frame 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the render thread died, or
    /// [`BufferError::OutOfCapacity`](duplex_core::BufferError::OutOfCapacity)
    /// if `SwapWindow` did not fit in the render arena. In the latter case the
    /// frame is still handed off and counted, and the next frame starts from
    /// empty queues.
    pub fn run_frame(&mut self) -> EngineResult<FrameStats> {
        if !self.started {
            let (_, present) = self.end_frame()?;
            self.started = true;
            self.last_frame = Instant::now();
            present?;
        }

        let start = Instant::now();
        let delta_time = start
            .duration_since(self.last_frame)
            .as_secs_f32()
            .min(MAX_DELTA_TIME);
        self.last_frame = start;

        let dispatch = self.bus.dispatch_all(&mut self.systems);
        self.systems.update_all(delta_time);
        self.systems.render_all();
        let (end, present) = self.end_frame()?;

        let stats = FrameStats {
            frame: self.frame,
            delta_time,
            dispatch,
            end,
            total: start.elapsed(),
        };
        self.frame += 1;
        self.stats.record(&stats, self.config.frame.frame_budget());
        tracing::trace!(
            frame = stats.frame,
            dispatched = dispatch.dispatched,
            render_commands = end.render_commands,
            "frame complete"
        );
        present?;
        Ok(stats)
    }

    /// Runs frames until quit is requested or `frame.max_frames` is reached,
    /// pacing to `frame.target_fps`. Returns the number of frames run.
    ///
    /// # Errors
    ///
    /// Stops at the first failing frame and returns its error.
    pub fn run(&mut self) -> EngineResult<u64> {
        let budget = self.config.frame.frame_budget();
        let max_frames = self.config.frame.max_frames;
        let mut frames = 0;

        tracing::info!(?max_frames, "run loop started");
        while !self.should_quit() && max_frames.map_or(true, |max| frames < max) {
            let stats = self.run_frame()?;
            frames += 1;
            if let Some(remaining) = budget.and_then(|budget| budget.checked_sub(stats.total)) {
                std::thread::sleep(remaining);
            }
        }
        tracing::info!(
            frames,
            avg_frame_ms = self.stats.avg_frame_ms(),
            over_budget = self.stats.frames_over_budget,
            "run loop stopped"
        );
        Ok(frames)
    }

    /// Hands the frame to the render thread and makes this frame's messages
    /// ready for the next dispatch.
    ///
    /// Both swaps happen even when `SwapWindow` does not fit; the failed
    /// push is returned alongside the report.
    fn end_frame(&mut self) -> EngineResult<(EndFrameReport, BufferResult<()>)> {
        let rendered_previous = self.render_thread.sync()?;
        let present = self.render_queue.push(RenderCommand::SwapWindow);
        if let Err(err) = &present {
            tracing::warn!(%err, frame = self.frame, "render queue full, frame not presented");
        }
        let render = self.render_queue.swap();
        let messages = self.bus.swap_buffers();
        self.render_thread.continue_frame()?;

        let report = EndFrameReport {
            rendered_previous,
            render_commands: render.entries,
            presented: present.is_ok(),
            messages_ready: messages.entries,
            swap_wait: render.drain_wait + messages.drain_wait,
        };
        Ok((report, present))
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("frame", &self.frame)
            .field("systems", &self.systems)
            .field("render_thread", &self.render_thread)
            .field("should_quit", &self.should_quit())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Accumulator for frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of frame times in microseconds.
    pub total_us_sum: u64,
    /// Min frame time in microseconds.
    pub min_frame_us: u64,
    /// Max frame time in microseconds.
    pub max_frame_us: u64,
    /// Frames that exceeded the frame budget.
    pub frames_over_budget: u64,
    /// Messages dispatched.
    pub messages_dispatched: u64,
    /// Render commands handed to the render thread.
    pub render_commands: u64,
}

impl FrameStatsAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            messages_dispatched: 0,
            render_commands: 0,
        }
    }

    /// Records one frame.
    pub fn record(&mut self, stats: &FrameStats, budget: Option<Duration>) {
        let total_us = u64::try_from(stats.total.as_micros()).unwrap_or(u64::MAX);
        self.frames_recorded += 1;
        self.total_us_sum = self.total_us_sum.saturating_add(total_us);
        self.min_frame_us = self.min_frame_us.min(total_us);
        self.max_frame_us = self.max_frame_us.max(total_us);
        self.messages_dispatched += stats.dispatch.dispatched as u64;
        self.render_commands += stats.end.render_commands as u64;

        if budget.is_some_and(|budget| stats.total > budget) {
            self.frames_over_budget += 1;
        }
    }

    /// Average frame time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Average frames per second, ignoring pacing sleeps.
    #[must_use]
    pub fn avg_fps(&self) -> f64 {
        let avg_ms = self.avg_frame_ms();
        if avg_ms <= 0.0 {
            return 0.0;
        }
        1000.0 / avg_ms
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use duplex_core::{BufferConfig, BufferError};

    fn config() -> EngineConfig {
        EngineConfig::default().target_fps(0)
    }

    #[test]
    fn test_application_creation() {
        let app = Application::new(config(), HeadlessBackend::new()).unwrap();
        assert_eq!(app.frame_count(), 0);
        assert_eq!(app.systems().len(), 1);
        assert!(app.system(APPLICATION_SYSTEM_ID).is_some());
        assert!(!app.should_quit());
    }

    #[test]
    fn test_quit_message_stops_run() {
        let mut app = Application::new(config().max_frames(100), HeadlessBackend::new()).unwrap();
        app.poster().post(MessageKind::Quit).unwrap();

        let frames = app.run().unwrap();
        assert_eq!(frames, 1);
        assert!(app.should_quit());
    }

    #[test]
    fn test_window_close_is_handled_by_application() {
        let mut app = Application::new(config(), HeadlessBackend::new()).unwrap();
        app.poster().post(MessageKind::WindowClose).unwrap();

        let stats = app.run_frame().unwrap();
        assert_eq!(stats.dispatch, DispatchStats { dispatched: 1, handled: 1 });
        assert!(app.should_quit());
    }

    #[test]
    fn test_max_frames() {
        let mut app = Application::new(config().max_frames(5), HeadlessBackend::new()).unwrap();
        assert_eq!(app.run().unwrap(), 5);
        assert_eq!(app.frame_count(), 5);
        assert_eq!(app.stats().frames_recorded, 5);
    }

    #[test]
    fn test_quit_handle() {
        let mut app = Application::new(config().max_frames(10), HeadlessBackend::new()).unwrap();
        let handle = app.quit_handle();
        handle.request_quit();
        assert!(handle.is_quit_requested());
        assert_eq!(app.run().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_system_refused() {
        struct Named(SystemId);
        impl System for Named {
            fn id(&self) -> SystemId {
                self.0
            }
        }

        let mut app = Application::new(config(), HeadlessBackend::new()).unwrap();
        app.push_system(Box::new(Named(7))).unwrap();
        let err = app.push_system(Box::new(Named(7))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSystem(7)));

        let err = app.push_system(Box::new(Named(APPLICATION_SYSTEM_ID))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSystem(APPLICATION_SYSTEM_ID)));
    }

    /// Floods the render queue once, leaving no room for `SwapWindow`.
    struct Flood {
        render: RenderRecorder,
        armed: bool,
    }

    impl System for Flood {
        fn id(&self) -> SystemId {
            50
        }

        fn render(&mut self) {
            if std::mem::take(&mut self.armed) {
                while self
                    .render
                    .push(RenderCommand::Clear { color: [1.0; 4] })
                    .is_ok()
                {}
            }
        }
    }

    #[test]
    fn test_render_overflow_recovers_next_frame() {
        let mut config = config();
        config.render = BufferConfig::with_capacity(256);
        let backend = HeadlessBackend::new();
        let mut app = Application::new(config, backend.clone()).unwrap();
        app.push_system(Box::new(Flood {
            render: app.render_recorder(),
            armed: true,
        }))
        .unwrap();

        let err = app.run_frame().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Buffer(BufferError::OutOfCapacity { capacity: 256, .. })
        ));
        assert_eq!(app.frame_count(), 1);

        app.poster().post(MessageKind::Quit).unwrap();
        let stats = app.run_frame().unwrap();
        assert!(stats.end.presented);
        assert_eq!(stats.end.messages_ready, 1);

        assert_eq!(app.run().unwrap(), 1);
        assert!(app.should_quit());
        assert_eq!(app.bus().message_count(), 0);
        drop(app);

        // Startup flush and the two frames after the flooded one.
        assert_eq!(backend.snapshot().presents(), 3);
    }

    #[test]
    fn test_stats_accumulator() {
        let mut acc = FrameStatsAccumulator::new();
        for i in 0..100 {
            let stats = FrameStats {
                frame: i,
                total: Duration::from_micros(10_000 + i * 100),
                ..FrameStats::default()
            };
            acc.record(&stats, Some(Duration::from_micros(16_666)));
        }

        assert_eq!(acc.frames_recorded, 100);
        // 16_700us and up, i.e. frames 67..100.
        assert_eq!(acc.frames_over_budget, 33);
        assert!(acc.avg_fps() > 50.0);
        assert!(acc.avg_fps() < 100.0);
    }
}
