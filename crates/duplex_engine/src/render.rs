//! # Render Command Handoff
//!
//! Systems record [`RenderCommand`]s into a double-buffered [`RenderQueue`]
//! through a push-only [`RenderRecorder`] during frame N. At the end of
//! frame N the owner swaps the queue and lets the render thread execute those
//! commands while frame N+1 is recorded.
//!
//! ```text
//! Owner thread                         Render thread
//! ────────────                         ─────────────
//! frame N: record commands
//! end_frame:
//!   sync()       ── wait "done" ──<──  finished frame N-1
//!   push SwapWindow
//!   queue.swap()
//!   continue_frame() ── "go" ──>──     drain frame N → backend
//! frame N+1: record commands           ...
//! ```
//!
//! `sync` before `swap` keeps the render thread's drain and the owner's
//! swap from overlapping.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use duplex_core::{BufferResult, FrameQueue};
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};

/// One unit of work for the render backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RenderCommand {
    /// Clear the target to a color.
    Clear {
        /// RGBA, 0.0 to 1.0.
        color: [f32; 4],
    },
    /// Set the viewport rectangle.
    SetViewport {
        /// Left edge in pixels.
        x: u32,
        /// Top edge in pixels.
        y: u32,
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Draw an indexed mesh with a material.
    DrawIndexed {
        /// Mesh handle.
        mesh: u32,
        /// Material handle.
        material: u32,
        /// Number of indices to draw.
        index_count: u32,
    },
    /// Present the frame. Submitted by the frame driver at the end of every frame.
    SwapWindow,
}

/// Double-buffered queue of render commands.
pub type RenderQueue = FrameQueue<RenderCommand>;

/// Push-only handle to a [`RenderQueue`].
///
/// Swapping and draining stay with the frame driver and the render thread.
#[derive(Clone)]
pub struct RenderRecorder {
    queue: Arc<RenderQueue>,
}

impl RenderRecorder {
    /// Wraps a shared render queue.
    #[must_use]
    pub fn new(queue: Arc<RenderQueue>) -> Self {
        Self { queue }
    }

    /// Records a command for the current frame.
    ///
    /// # Errors
    ///
    /// Returns an error if this frame's render arena is full. The command is
    /// dropped.
    #[inline]
    pub fn push(&self, command: RenderCommand) -> BufferResult<()> {
        self.queue.push(command)
    }

    /// Commands recorded for the current frame so far.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }
}

impl std::fmt::Debug for RenderRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRecorder")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Executes render commands on the render thread.
pub trait RenderBackend: Send + 'static {
    /// Executes one command.
    fn execute(&mut self, command: &RenderCommand);

    /// Called after the last command of a frame.
    fn end_frame(&mut self) {}
}

// ============================================================================
// RENDER THREAD
// ============================================================================

/// Render worker thread and its frame handshake.
///
/// Dropping the handle waits for the frame in flight, stops the worker and
/// joins it.
pub struct RenderThread {
    go: Option<Sender<()>>,
    done: Receiver<usize>,
    worker: Option<JoinHandle<()>>,
    in_flight: bool,
    frames: u64,
}

impl RenderThread {
    /// Spawns the worker. It drains `queue` into `backend` once per
    /// [`continue_frame`](Self::continue_frame).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RenderThreadSpawn`] if the OS refuses the thread.
    pub fn spawn<B: RenderBackend>(queue: Arc<RenderQueue>, mut backend: B) -> EngineResult<Self> {
        let (go_tx, go_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<usize>(1);

        let worker = std::thread::Builder::new()
            .name("duplex-render".to_string())
            .spawn(move || {
                tracing::debug!("render thread started");
                for () in go_rx {
                    let executed = queue.drain(|command| backend.execute(command));
                    backend.end_frame();
                    if done_tx.send(executed).is_err() {
                        break;
                    }
                }
                tracing::debug!("render thread stopped");
            })
            .map_err(EngineError::RenderThreadSpawn)?;

        Ok(Self {
            go: Some(go_tx),
            done: done_rx,
            worker: Some(worker),
            in_flight: false,
            frames: 0,
        })
    }

    /// Waits until the worker finished the frame it was last given.
    ///
    /// Returns the number of commands it executed, or `None` if no frame was
    /// in flight.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RenderThreadDisconnected`] if the worker died.
    pub fn sync(&mut self) -> EngineResult<Option<usize>> {
        if !self.in_flight {
            return Ok(None);
        }
        let executed = self
            .done
            .recv()
            .map_err(|_| EngineError::RenderThreadDisconnected)?;
        self.in_flight = false;
        Ok(Some(executed))
    }

    /// Lets the worker execute the freshly swapped side of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RenderThreadDisconnected`] if the worker died.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not [`sync`](Self::sync)ed.
    pub fn continue_frame(&mut self) -> EngineResult<()> {
        assert!(!self.in_flight, "Cannot continue the render thread before sync!");
        let go = self.go.as_ref().ok_or(EngineError::RenderThreadDisconnected)?;
        go.send(()).map_err(|_| EngineError::RenderThreadDisconnected)?;
        self.in_flight = true;
        self.frames += 1;
        Ok(())
    }

    /// Returns true while the worker is executing a frame.
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Frames handed to the worker so far.
    #[inline]
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if self.in_flight {
            let _ = self.done.recv();
        }
        // Closing the channel ends the worker loop.
        self.go.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("render thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for RenderThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderThread")
            .field("in_flight", &self.in_flight)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HEADLESS BACKEND
// ============================================================================

/// What a [`HeadlessBackend`] has executed so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadlessLog {
    /// Every command, in execution order.
    pub commands: Vec<RenderCommand>,
    /// Completed frames.
    pub frames: u64,
}

impl HeadlessLog {
    /// Number of [`RenderCommand::SwapWindow`] commands seen.
    #[must_use]
    pub fn presents(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, RenderCommand::SwapWindow))
            .count()
    }

    /// Number of [`RenderCommand::DrawIndexed`] commands seen.
    #[must_use]
    pub fn draws(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, RenderCommand::DrawIndexed { .. }))
            .count()
    }
}

/// Backend that records commands instead of drawing.
///
/// Clones share one log, so a clone kept by the caller observes what the
/// render thread executed.
#[derive(Clone, Debug, Default)]
pub struct HeadlessBackend {
    log: Arc<Mutex<HeadlessLog>>,
}

impl HeadlessBackend {
    /// Creates a backend with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the log.
    #[must_use]
    pub fn snapshot(&self) -> HeadlessLog {
        self.log.lock().clone()
    }
}

impl RenderBackend for HeadlessBackend {
    fn execute(&mut self, command: &RenderCommand) {
        self.log.lock().commands.push(*command);
    }

    fn end_frame(&mut self) {
        self.log.lock().frames += 1;
    }
}
