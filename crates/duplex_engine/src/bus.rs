//! # Message Bus
//!
//! Double-buffered message queue with handler-chain dispatch.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ register ┌──────────────────────┐ dispatch_all ┌─────────────┐
//! │  Producers  │─────────>│  producer side (N+1) │              │  Handler 0  │
//! │ (any thread)│          ├──────────────────────┤─────────────>│  Handler 1  │
//! └─────────────┘          │  consumer side (N)   │  stop at     │     ...     │
//!                          └──────────────────────┘  "handled"   └─────────────┘
//! ```
//!
//! Messages registered during frame N are dispatched in frame N+1, after the
//! owner's `swap_buffers`. Handlers may register new messages while they are
//! being dispatched; those land on the producer side.

use std::sync::Arc;

use duplex_core::{BufferConfig, BufferResult, FrameQueue, SwapReport};

use crate::message::{Message, MessageKind};

// ============================================================================
// HANDLERS
// ============================================================================

/// A consumer of messages.
///
/// A handler consumes a message by calling [`Message::set_handled`].
pub trait MessageHandler {
    /// Offers `message` to the handler.
    fn handle_message(&mut self, message: &mut Message);
}

impl<H: MessageHandler + ?Sized> MessageHandler for Box<H> {
    fn handle_message(&mut self, message: &mut Message) {
        (**self).handle_message(message);
    }
}

impl<H: MessageHandler + ?Sized> MessageHandler for &mut H {
    fn handle_message(&mut self, message: &mut Message) {
        (**self).handle_message(message);
    }
}

/// Handler built from a closure by [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F> MessageHandler for FnHandler<F>
where
    F: FnMut(&mut Message) -> bool,
{
    fn handle_message(&mut self, message: &mut Message) {
        if (self.0)(message) {
            message.set_handled();
        }
    }
}

/// Wraps a closure as a handler. Returning `true` consumes the message.
///
/// ```rust
/// use duplex_engine::{handler_fn, Message, MessageHandler, MessageKind};
///
/// let mut quit = handler_fn(|msg: &mut Message| matches!(msg.kind(), MessageKind::Quit));
/// let mut msg = Message::new(MessageKind::Quit);
/// quit.handle_message(&mut msg);
/// assert!(msg.is_handled());
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&mut Message) -> bool,
{
    FnHandler(f)
}

/// An ordered sequence of handlers.
///
/// Earlier handlers see a message first; the first one to mark it handled
/// stops the walk.
pub trait HandlerChain {
    /// Offers `message` to each handler in order. Returns true if one
    /// consumed it.
    fn offer(&mut self, message: &mut Message) -> bool;
}

impl<H: MessageHandler> HandlerChain for [H] {
    fn offer(&mut self, message: &mut Message) -> bool {
        for handler in self.iter_mut() {
            handler.handle_message(message);
            if message.is_handled() {
                return true;
            }
        }
        false
    }
}

impl<H: MessageHandler> HandlerChain for Vec<H> {
    fn offer(&mut self, message: &mut Message) -> bool {
        self.as_mut_slice().offer(message)
    }
}

impl<H: MessageHandler, const N: usize> HandlerChain for [H; N] {
    fn offer(&mut self, message: &mut Message) -> bool {
        self.as_mut_slice().offer(message)
    }
}

// ============================================================================
// BUS
// ============================================================================

/// Outcome of one [`MessageBus::dispatch_all`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages offered to the chain.
    pub dispatched: usize,
    /// Messages some handler consumed.
    pub handled: usize,
}

impl DispatchStats {
    /// Messages no handler consumed.
    #[inline]
    #[must_use]
    pub fn unhandled(&self) -> usize {
        self.dispatched - self.handled
    }
}

/// Double-buffered message queue.
///
/// One owner thread calls [`swap_buffers`](Self::swap_buffers) and
/// [`dispatch_all`](Self::dispatch_all); any thread may register messages,
/// directly or through a [`MessagePoster`].
pub struct MessageBus {
    queue: Arc<FrameQueue<Message>>,
}

impl MessageBus {
    /// Creates a bus with two message arenas sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(config: &BufferConfig) -> BufferResult<Self> {
        Ok(Self {
            queue: Arc::new(FrameQueue::new(config)?),
        })
    }

    /// Copies `message` onto the producer side with its flags cleared.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfCapacity`](duplex_core::BufferError::OutOfCapacity)
    /// if this frame's message arena is full. The message is dropped.
    #[inline]
    pub fn register(&self, message: &Message) -> BufferResult<()> {
        register(&self.queue, message)
    }

    /// Registers a new message of `kind`.
    ///
    /// # Errors
    ///
    /// As [`register`](Self::register).
    #[inline]
    pub fn post(&self, kind: MessageKind) -> BufferResult<()> {
        self.register(&Message::new(kind))
    }

    /// Creates a producer handle (clone for multiple producers).
    #[must_use]
    pub fn poster(&self) -> MessagePoster {
        MessagePoster {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Messages registered on the producer side so far this frame.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.queue.pending()
    }

    /// Messages waiting for the next [`dispatch_all`](Self::dispatch_all).
    ///
    /// # Panics
    ///
    /// Panics if called from inside a handler during dispatch.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.queue.consumer_len()
    }

    /// Makes this frame's messages ready for dispatch.
    ///
    /// Blocks until every in-flight `register` on the outgoing side finished.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a handler during dispatch.
    pub fn swap_buffers(&self) -> SwapReport {
        let report = self.queue.swap();
        tracing::trace!(
            generation = report.generation,
            messages = report.entries,
            "message buffers swapped"
        );
        report
    }

    /// Offers every ready message to `chain`, in registration order, then
    /// clears the consumer side.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from a handler.
    pub fn dispatch_all<C>(&self, chain: &mut C) -> DispatchStats
    where
        C: HandlerChain + ?Sized,
    {
        let mut handled = 0;
        let dispatched = self.queue.drain(|message| {
            if chain.offer(message) {
                handled += 1;
            }
        });

        let stats = DispatchStats { dispatched, handled };
        if dispatched > 0 {
            tracing::debug!(
                dispatched,
                handled,
                unhandled = stats.unhandled(),
                "messages dispatched"
            );
        }
        stats
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("pending", &self.message_count())
            .finish_non_exhaustive()
    }
}

/// Handle for registering messages from any thread.
#[derive(Clone)]
pub struct MessagePoster {
    queue: Arc<FrameQueue<Message>>,
}

impl MessagePoster {
    /// As [`MessageBus::register`].
    ///
    /// # Errors
    ///
    /// Returns an error if this frame's message arena is full.
    #[inline]
    pub fn register(&self, message: &Message) -> BufferResult<()> {
        register(&self.queue, message)
    }

    /// As [`MessageBus::post`].
    ///
    /// # Errors
    ///
    /// Returns an error if this frame's message arena is full.
    #[inline]
    pub fn post(&self, kind: MessageKind) -> BufferResult<()> {
        self.register(&Message::new(kind))
    }
}

impl std::fmt::Debug for MessagePoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePoster").finish_non_exhaustive()
    }
}

fn register(queue: &FrameQueue<Message>, message: &Message) -> BufferResult<()> {
    let mut copy = *message;
    copy.clear_flags();
    queue.push(copy).map_err(|err| {
        tracing::warn!(id = ?message.id(), %err, "message dropped");
        err
    })
}
