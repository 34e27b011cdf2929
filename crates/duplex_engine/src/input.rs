//! # Input Bindings
//!
//! Translates raw input messages into other messages, usually GUI pointer
//! messages. Translated messages are posted back to the bus and arrive the
//! following frame. Bindings observe messages; they never consume them.

use std::collections::HashMap;

use crate::bus::MessagePoster;
use crate::message::{Message, MessageId, MessageKind, MouseButton};
use crate::system::{System, SystemId};

/// Stack id of the [`InputSystem`].
pub const INPUT_SYSTEM_ID: SystemId = 1;

/// Callback run for every message of the kind it is bound to.
pub type InputBinding = Box<dyn FnMut(&Message, &MessagePoster) + Send>;

/// System that runs input bindings.
pub struct InputSystem {
    poster: MessagePoster,
    bindings: HashMap<MessageId, Vec<InputBinding>>,
}

impl InputSystem {
    /// Creates an input system with no bindings.
    #[must_use]
    pub fn new(poster: MessagePoster) -> Self {
        Self {
            poster,
            bindings: HashMap::new(),
        }
    }

    /// Creates an input system with the standard pointer translation:
    ///
    /// | Input                     | Posted            |
    /// |---------------------------|-------------------|
    /// | `MouseMove`               | `GuiPointerMove`  |
    /// | `MouseButtonDown` (left)  | `GuiPointerDown`  |
    /// | `MouseButtonUp` (left)    | `GuiPointerUp`    |
    ///
    /// Other buttons are ignored.
    #[must_use]
    pub fn with_pointer_bindings(poster: MessagePoster) -> Self {
        let mut input = Self::new(poster);
        input.bind(MessageId::MouseMove, |message, poster| {
            if let MessageKind::MouseMove { x, y } = *message.kind() {
                forward(poster, MessageKind::GuiPointerMove { x, y });
            }
        });
        input.bind(MessageId::MouseButtonDown, |message, poster| {
            if let MessageKind::MouseButtonDown {
                button: MouseButton::Left,
                x,
                y,
            } = *message.kind()
            {
                forward(poster, MessageKind::GuiPointerDown { x, y });
            }
        });
        input.bind(MessageId::MouseButtonUp, |message, poster| {
            if let MessageKind::MouseButtonUp {
                button: MouseButton::Left,
                x,
                y,
            } = *message.kind()
            {
                forward(poster, MessageKind::GuiPointerUp { x, y });
            }
        });
        input
    }

    /// Adds a binding for messages of kind `id`.
    ///
    /// Bindings for the same kind run in the order they were added.
    pub fn bind<F>(&mut self, id: MessageId, binding: F)
    where
        F: FnMut(&Message, &MessagePoster) + Send + 'static,
    {
        self.bindings.entry(id).or_default().push(Box::new(binding));
    }

    /// Removes every binding for `id`. Returns how many were removed.
    pub fn unbind(&mut self, id: MessageId) -> usize {
        self.bindings.remove(&id).map_or(0, |list| list.len())
    }

    /// Number of bindings for `id`.
    #[must_use]
    pub fn binding_count(&self, id: MessageId) -> usize {
        self.bindings.get(&id).map_or(0, Vec::len)
    }
}

impl System for InputSystem {
    fn id(&self) -> SystemId {
        INPUT_SYSTEM_ID
    }

    fn name(&self) -> &str {
        "input"
    }

    fn handle_message(&mut self, message: &mut Message) {
        if let Some(bindings) = self.bindings.get_mut(&message.id()) {
            for binding in bindings {
                binding(&*message, &self.poster);
            }
        }
    }
}

impl std::fmt::Debug for InputSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bound: Vec<_> = self.bindings.iter().map(|(id, list)| (*id, list.len())).collect();
        bound.sort_unstable();
        f.debug_struct("InputSystem").field("bindings", &bound).finish()
    }
}

fn forward(poster: &MessagePoster, kind: MessageKind) {
    // A full arena drops the message; `register` already logged it.
    let _ = poster.post(kind);
}
