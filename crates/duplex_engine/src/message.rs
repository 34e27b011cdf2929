//! # Messages
//!
//! The closed set of messages that travel over the [`MessageBus`](crate::MessageBus).
//!
//! Messages are plain `Copy` values: the bus moves them into arena memory
//! and never runs destructors, so no variant may own heap data.
//!
//! ```text
//! Category      Messages
//! ───────────   ─────────────────────────────────────────────
//! Application   Quit
//! Window        Shown, Hidden, Resized, Moved, Close, Focus*
//! Input         KeyDown/Up, TextInput, MouseButtonDown/Up,
//!               MouseMove, MouseWheel
//! Gui           PointerDown/Up/Move, Select
//! ```

use std::fmt;

/// Broad grouping of message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    /// Application lifecycle.
    Application,
    /// Window events.
    Window,
    /// Raw device input.
    Input,
    /// Translated pointer input for the GUI.
    Gui,
}

/// Mouse buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Wheel button.
    Middle,
    /// Secondary button.
    Right,
    /// First extra button.
    X1,
    /// Second extra button.
    X2,
}

/// Platform key code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

/// Payload of a message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MessageKind {
    // =========================================================================
    // Application
    // =========================================================================
    /// Stop the run loop after the current frame.
    Quit,

    // =========================================================================
    // Window
    // =========================================================================
    /// The window became visible.
    WindowShown,
    /// The window was hidden.
    WindowHidden,
    /// The window client area changed size.
    WindowResized {
        /// New width in pixels.
        width: u32,
        /// New height in pixels.
        height: u32,
    },
    /// The window moved.
    WindowMoved {
        /// New left edge in screen coordinates.
        x: i32,
        /// New top edge in screen coordinates.
        y: i32,
    },
    /// The user asked to close the window.
    WindowClose,
    /// The window gained keyboard focus.
    WindowFocusGained,
    /// The window lost keyboard focus.
    WindowFocusLost,

    // =========================================================================
    // Input
    // =========================================================================
    /// A key was pressed.
    KeyDown {
        /// Key pressed.
        key: KeyCode,
        /// True for auto-repeat.
        repeat: bool,
    },
    /// A key was released.
    KeyUp {
        /// Key released.
        key: KeyCode,
    },
    /// A character of text input.
    TextInput {
        /// Character entered.
        ch: char,
    },
    /// A mouse button was pressed.
    MouseButtonDown {
        /// Button pressed.
        button: MouseButton,
        /// Cursor x in window pixels.
        x: i32,
        /// Cursor y in window pixels.
        y: i32,
    },
    /// A mouse button was released.
    MouseButtonUp {
        /// Button released.
        button: MouseButton,
        /// Cursor x in window pixels.
        x: i32,
        /// Cursor y in window pixels.
        y: i32,
    },
    /// The cursor moved.
    MouseMove {
        /// Cursor x in window pixels.
        x: i32,
        /// Cursor y in window pixels.
        y: i32,
    },
    /// The wheel scrolled.
    MouseWheel {
        /// Horizontal scroll steps.
        dx: i32,
        /// Vertical scroll steps.
        dy: i32,
    },

    // =========================================================================
    // Gui
    // =========================================================================
    /// Pointer pressed over the GUI.
    GuiPointerDown {
        /// Pointer x in window pixels.
        x: i32,
        /// Pointer y in window pixels.
        y: i32,
    },
    /// Pointer released over the GUI.
    GuiPointerUp {
        /// Pointer x in window pixels.
        x: i32,
        /// Pointer y in window pixels.
        y: i32,
    },
    /// Pointer moved over the GUI.
    GuiPointerMove {
        /// Pointer x in window pixels.
        x: i32,
        /// Pointer y in window pixels.
        y: i32,
    },
    /// Select action (enter, gamepad A) on the focused widget.
    GuiSelect,
}

/// Identifier of a message kind, without payload.
///
/// Used as a lookup key, e.g. for input bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum MessageId {
    Quit,
    WindowShown,
    WindowHidden,
    WindowResized,
    WindowMoved,
    WindowClose,
    WindowFocusGained,
    WindowFocusLost,
    KeyDown,
    KeyUp,
    TextInput,
    MouseButtonDown,
    MouseButtonUp,
    MouseMove,
    MouseWheel,
    GuiPointerDown,
    GuiPointerUp,
    GuiPointerMove,
    GuiSelect,
}

impl MessageId {
    /// Category of the kind.
    #[must_use]
    pub const fn category(self) -> MessageCategory {
        match self {
            Self::Quit => MessageCategory::Application,
            Self::WindowShown
            | Self::WindowHidden
            | Self::WindowResized
            | Self::WindowMoved
            | Self::WindowClose
            | Self::WindowFocusGained
            | Self::WindowFocusLost => MessageCategory::Window,
            Self::KeyDown
            | Self::KeyUp
            | Self::TextInput
            | Self::MouseButtonDown
            | Self::MouseButtonUp
            | Self::MouseMove
            | Self::MouseWheel => MessageCategory::Input,
            Self::GuiPointerDown
            | Self::GuiPointerUp
            | Self::GuiPointerMove
            | Self::GuiSelect => MessageCategory::Gui,
        }
    }
}

impl MessageKind {
    /// Identifier of this kind.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        match self {
            Self::Quit => MessageId::Quit,
            Self::WindowShown => MessageId::WindowShown,
            Self::WindowHidden => MessageId::WindowHidden,
            Self::WindowResized { .. } => MessageId::WindowResized,
            Self::WindowMoved { .. } => MessageId::WindowMoved,
            Self::WindowClose => MessageId::WindowClose,
            Self::WindowFocusGained => MessageId::WindowFocusGained,
            Self::WindowFocusLost => MessageId::WindowFocusLost,
            Self::KeyDown { .. } => MessageId::KeyDown,
            Self::KeyUp { .. } => MessageId::KeyUp,
            Self::TextInput { .. } => MessageId::TextInput,
            Self::MouseButtonDown { .. } => MessageId::MouseButtonDown,
            Self::MouseButtonUp { .. } => MessageId::MouseButtonUp,
            Self::MouseMove { .. } => MessageId::MouseMove,
            Self::MouseWheel { .. } => MessageId::MouseWheel,
            Self::GuiPointerDown { .. } => MessageId::GuiPointerDown,
            Self::GuiPointerUp { .. } => MessageId::GuiPointerUp,
            Self::GuiPointerMove { .. } => MessageId::GuiPointerMove,
            Self::GuiSelect => MessageId::GuiSelect,
        }
    }

    /// Category of this kind.
    #[must_use]
    pub const fn category(&self) -> MessageCategory {
        self.id().category()
    }
}

/// Per-message flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageFlag {
    /// A handler consumed the message; later handlers do not see it.
    Handled = 1 << 0,
}

/// A message plus its dispatch flags.
#[derive(Clone, Copy, PartialEq)]
pub struct Message {
    kind: MessageKind,
    flags: u32,
}

impl Message {
    /// Creates a message with no flags set.
    #[inline]
    #[must_use]
    pub const fn new(kind: MessageKind) -> Self {
        Self { kind, flags: 0 }
    }

    /// The payload.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Kind identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.kind.id()
    }

    /// Kind category.
    #[inline]
    #[must_use]
    pub const fn category(&self) -> MessageCategory {
        self.kind.category()
    }

    /// Returns true if `flag` is set.
    #[inline]
    #[must_use]
    pub const fn query_flag(&self, flag: MessageFlag) -> bool {
        self.flags & flag as u32 != 0
    }

    /// Sets `flag`.
    #[inline]
    pub fn set_flag(&mut self, flag: MessageFlag) {
        self.flags |= flag as u32;
    }

    /// Clears every flag.
    #[inline]
    pub fn clear_flags(&mut self) {
        self.flags = 0;
    }

    /// Returns true once a handler has consumed the message.
    #[inline]
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        self.query_flag(MessageFlag::Handled)
    }

    /// Marks the message consumed.
    #[inline]
    pub fn set_handled(&mut self) {
        self.set_flag(MessageFlag::Handled);
    }
}

impl From<MessageKind> for Message {
    fn from(kind: MessageKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("handled", &self.is_handled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_unhandled() {
        let mut message = Message::new(MessageKind::GuiPointerDown { x: 10, y: 20 });
        assert!(!message.is_handled());

        message.set_handled();
        assert!(message.is_handled());
        assert!(message.query_flag(MessageFlag::Handled));

        message.clear_flags();
        assert!(!message.is_handled());
    }

    #[test]
    fn test_categories() {
        assert_eq!(Message::new(MessageKind::Quit).category(), MessageCategory::Application);
        assert_eq!(
            MessageKind::WindowResized { width: 1, height: 1 }.category(),
            MessageCategory::Window
        );
        assert_eq!(MessageKind::TextInput { ch: 'a' }.category(), MessageCategory::Input);
        assert_eq!(MessageKind::GuiSelect.category(), MessageCategory::Gui);
    }

    #[test]
    fn test_id_ignores_payload() {
        let left = MessageKind::MouseButtonDown {
            button: MouseButton::Left,
            x: 0,
            y: 0,
        };
        let right = MessageKind::MouseButtonDown {
            button: MouseButton::Right,
            x: 5,
            y: 5,
        };
        assert_eq!(left.id(), right.id());
        assert_ne!(left.id(), MessageId::MouseButtonUp);
    }
}
