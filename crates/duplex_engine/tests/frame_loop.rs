//! # Frame Loop Tests
//!
//! End-to-end scenarios across the message bus, the system stack, the input
//! bindings and the render thread.
//!
//! Run with: cargo test -p duplex_engine --test frame_loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use duplex_engine::core::BufferConfig;
use duplex_engine::{
    handler_fn, Application, EngineConfig, HeadlessBackend, InputSystem, Message, MessageBus,
    MessageHandler, MessageId, MessageKind, MouseButton, RenderCommand, RenderRecorder, System,
    SystemId,
};

// ============================================================================
// MESSAGE BUS
// ============================================================================

#[test]
fn pointer_down_reaches_its_handler_exactly_once() {
    let bus = MessageBus::new(&BufferConfig::with_capacity(4096)).unwrap();
    bus.post(MessageKind::GuiPointerDown { x: 10, y: 20 }).unwrap();
    let _ = bus.swap_buffers();

    let mut calls = Vec::new();
    let mut chain = [handler_fn(|msg: &mut Message| {
        if let MessageKind::GuiPointerDown { x, y } = *msg.kind() {
            calls.push((x, y));
            true
        } else {
            false
        }
    })];

    let stats = bus.dispatch_all(&mut chain);
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.handled, 1);
    assert_eq!(calls, vec![(10, 20)]);

    // The cleared side stays empty, and nothing was registered for the other.
    let _ = bus.swap_buffers();
    assert_eq!(bus.ready_count(), 0);
    let mut empty = [handler_fn(|_: &mut Message| -> bool {
        unreachable!("no message was registered for this side")
    })];
    assert_eq!(bus.dispatch_all(&mut empty).dispatched, 0);
}

/// Counts what reaches it and consumes one kind.
struct Layer {
    seen: usize,
    consumes: Option<MessageId>,
}

impl MessageHandler for Layer {
    fn handle_message(&mut self, message: &mut Message) {
        self.seen += 1;
        if self.consumes == Some(message.id()) {
            message.set_handled();
        }
    }
}

#[test]
fn handled_messages_skip_later_layers() {
    let bus = MessageBus::new(&BufferConfig::with_capacity(4096)).unwrap();
    for _ in 0..3 {
        bus.post(MessageKind::GuiSelect).unwrap();
        bus.post(MessageKind::WindowShown).unwrap();
    }
    let _ = bus.swap_buffers();

    let mut chain = [
        Layer {
            seen: 0,
            consumes: None,
        },
        Layer {
            seen: 0,
            consumes: Some(MessageId::GuiSelect),
        },
        Layer {
            seen: 0,
            consumes: None,
        },
    ];
    let stats = bus.dispatch_all(&mut chain);

    assert_eq!(stats.dispatched, 6);
    assert_eq!(stats.handled, 3);
    assert_eq!(chain[0].seen, 6);
    assert_eq!(chain[1].seen, 6);
    assert_eq!(chain[2].seen, 3);
}

#[test]
fn concurrent_registration_keeps_per_thread_order() {
    const THREADS: i32 = 4;
    const PER_THREAD: i32 = 250;

    let bus = MessageBus::new(&BufferConfig::with_capacity(256 * 1024)).unwrap();
    let start = Barrier::new(4);

    thread::scope(|scope| {
        for thread_id in 0..THREADS {
            let poster = bus.poster();
            let start = &start;
            scope.spawn(move || {
                start.wait();
                for seq in 0..PER_THREAD {
                    poster
                        .post(MessageKind::WindowMoved { x: thread_id, y: seq })
                        .unwrap();
                }
            });
        }
    });

    let report = bus.swap_buffers();
    assert_eq!(report.entries, 1_000);

    let mut next = [0; 4];
    let mut chain = [handler_fn(|msg: &mut Message| {
        if let MessageKind::WindowMoved { x, y } = *msg.kind() {
            let slot = usize::try_from(x).unwrap();
            assert_eq!(y, next[slot]);
            next[slot] += 1;
        }
        false
    })];
    assert_eq!(bus.dispatch_all(&mut chain).dispatched, 1_000);
    assert_eq!(next, [PER_THREAD; 4]);
}

// ============================================================================
// APPLICATION
// ============================================================================

const CLICK_SYSTEM_ID: SystemId = 100;

struct ClickCounter {
    clicks: Arc<AtomicUsize>,
    render: RenderRecorder,
    pending: u32,
}

impl System for ClickCounter {
    fn id(&self) -> SystemId {
        CLICK_SYSTEM_ID
    }

    fn handle_message(&mut self, message: &mut Message) {
        if matches!(message.kind(), MessageKind::GuiPointerDown { .. }) {
            self.clicks.fetch_add(1, Ordering::SeqCst);
            self.pending += 1;
            message.set_handled();
        }
    }

    fn render(&mut self) {
        for material in 0..std::mem::take(&mut self.pending) {
            self.render
                .push(RenderCommand::DrawIndexed {
                    mesh: 0,
                    material,
                    index_count: 6,
                })
                .unwrap();
        }
    }
}

#[test]
fn click_flows_from_input_to_backend() {
    let backend = HeadlessBackend::new();
    let config = EngineConfig::default().target_fps(0).max_frames(4);
    let mut app = Application::new(config, backend.clone()).unwrap();

    app.push_system(Box::new(InputSystem::with_pointer_bindings(app.poster())))
        .unwrap();
    let clicks = Arc::new(AtomicUsize::new(0));
    app.push_system(Box::new(ClickCounter {
        clicks: Arc::clone(&clicks),
        render: app.render_recorder(),
        pending: 0,
    }))
    .unwrap();

    app.poster()
        .post(MessageKind::MouseButtonDown {
            button: MouseButton::Left,
            x: 10,
            y: 20,
        })
        .unwrap();
    app.poster()
        .post(MessageKind::MouseButtonDown {
            button: MouseButton::Right,
            x: 10,
            y: 20,
        })
        .unwrap();

    // Frame 0: raw input dispatched, translation posted.
    let frame0 = app.run_frame().unwrap();
    assert_eq!(frame0.dispatch.dispatched, 2);
    assert_eq!(frame0.end.messages_ready, 1);
    assert_eq!(clicks.load(Ordering::SeqCst), 0);

    // Frame 1: GUI pointer down dispatched and drawn.
    let frame1 = app.run_frame().unwrap();
    assert_eq!(frame1.dispatch.handled, 1);
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert_eq!(frame1.end.render_commands, 2);

    let frames = app.run().unwrap();
    assert_eq!(frames, 4);
    drop(app);

    let log = backend.snapshot();
    assert_eq!(log.draws(), 1);
    // The startup flush plus six frames.
    assert_eq!(log.presents(), 7);
    let draw = log
        .commands
        .iter()
        .position(|command| matches!(command, RenderCommand::DrawIndexed { .. }))
        .unwrap();
    assert_eq!(log.commands[draw + 1], RenderCommand::SwapWindow);
}

#[test]
fn independent_applications_do_not_share_state() {
    let config = EngineConfig::default().target_fps(0).max_frames(3);
    let mut first = Application::new(config.clone(), HeadlessBackend::new()).unwrap();
    let mut second = Application::new(config, HeadlessBackend::new()).unwrap();

    first.poster().post(MessageKind::Quit).unwrap();
    assert_eq!(first.run().unwrap(), 1);
    assert_eq!(second.run().unwrap(), 3);
    assert!(first.should_quit());
    assert!(!second.should_quit());
}
