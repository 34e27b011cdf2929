//! # Systems
//!
//! A [`System`] is one layer of the application: it receives messages,
//! updates once per frame and renders once per frame. The [`SystemStack`]
//! orders the layers. Messages walk it front to back and stop at the first
//! layer that handles them; rendering walks it back to front.

use crate::bus::HandlerChain;
use crate::message::Message;

/// Identifier of a system on the stack.
pub type SystemId = u32;

/// One layer of the application.
pub trait System {
    /// Stable id, unique within a stack.
    fn id(&self) -> SystemId;

    /// Name used in logs.
    fn name(&self) -> &str {
        "system"
    }

    /// Called when the system is pushed onto a stack.
    fn on_attach(&mut self) {}

    /// Called when the system is removed from a stack.
    fn on_detach(&mut self) {}

    /// Offers a message. Call [`Message::set_handled`] to consume it.
    fn handle_message(&mut self, message: &mut Message) {
        let _ = message;
    }

    /// Advances the system by `dt` seconds.
    fn update(&mut self, dt: f32) {
        let _ = dt;
    }

    /// Submits this frame's render work.
    fn render(&mut self) {}
}

/// Ordered stack of systems.
///
/// Index 0 is the front: it sees messages first and renders last.
#[derive(Default)]
pub struct SystemStack {
    systems: Vec<Box<dyn System>>,
}

impl SystemStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `system` at the back and attaches it.
    ///
    /// Returns false, without attaching, if a system with the same id is
    /// already on the stack.
    pub fn push_system(&mut self, mut system: Box<dyn System>) -> bool {
        let id = system.id();
        if self.position(id).is_some() {
            tracing::warn!(id, name = system.name(), "system id already on the stack");
            return false;
        }
        system.on_attach();
        tracing::debug!(id, name = system.name(), "system attached");
        self.systems.push(system);
        true
    }

    /// Detaches and removes the system with `id`.
    pub fn pop_system(&mut self, id: SystemId) -> Option<Box<dyn System>> {
        let index = self.position(id)?;
        let mut system = self.systems.remove(index);
        system.on_detach();
        tracing::debug!(id, name = system.name(), "system detached");
        Some(system)
    }

    /// Looks up a system by id.
    #[must_use]
    pub fn get_system(&self, id: SystemId) -> Option<&dyn System> {
        self.position(id).map(|index| self.systems[index].as_ref())
    }

    /// Looks up a system by id for mutation.
    #[must_use]
    pub fn get_system_mut(&mut self, id: SystemId) -> Option<&mut (dyn System + 'static)> {
        let index = self.position(id)?;
        Some(self.systems[index].as_mut())
    }

    /// Detaches and removes every system, back to front.
    pub fn clear(&mut self) {
        while let Some(mut system) = self.systems.pop() {
            system.on_detach();
        }
    }

    /// Iterates front to back.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &dyn System> + '_ {
        self.systems.iter().map(|system| &**system)
    }

    /// Updates every system, front to back.
    pub fn update_all(&mut self, dt: f32) {
        for system in &mut self.systems {
            system.update(dt);
        }
    }

    /// Renders every system, back to front.
    pub fn render_all(&mut self) {
        for system in self.systems.iter_mut().rev() {
            system.render();
        }
    }

    /// Number of systems.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns true if the stack is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    fn position(&self, id: SystemId) -> Option<usize> {
        self.systems.iter().position(|system| system.id() == id)
    }
}

impl HandlerChain for SystemStack {
    fn offer(&mut self, message: &mut Message) -> bool {
        for system in &mut self.systems {
            system.handle_message(message);
            if message.is_handled() {
                return true;
            }
        }
        false
    }
}

impl Drop for SystemStack {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for SystemStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.systems.iter().map(|system| (system.id(), system.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Layer {
        id: SystemId,
        journal: Journal,
        consume: bool,
    }

    impl Layer {
        fn boxed(id: SystemId, journal: &Journal, consume: bool) -> Box<dyn System> {
            Box::new(Self {
                id,
                journal: Arc::clone(journal),
                consume,
            })
        }

        fn log(&self, event: &str) {
            self.journal.lock().push(format!("{event}:{}", self.id));
        }
    }

    impl System for Layer {
        fn id(&self) -> SystemId {
            self.id
        }

        fn on_attach(&mut self) {
            self.log("attach");
        }

        fn on_detach(&mut self) {
            self.log("detach");
        }

        fn handle_message(&mut self, message: &mut Message) {
            self.log("message");
            if self.consume {
                message.set_handled();
            }
        }

        fn update(&mut self, _dt: f32) {
            self.log("update");
        }

        fn render(&mut self) {
            self.log("render");
        }
    }

    fn take(journal: &Journal) -> Vec<String> {
        std::mem::take(&mut *journal.lock())
    }

    #[test]
    fn test_push_attaches_and_rejects_duplicates() {
        let journal = Journal::default();
        let mut stack = SystemStack::new();

        assert!(stack.push_system(Layer::boxed(1, &journal, false)));
        assert!(stack.push_system(Layer::boxed(2, &journal, false)));
        assert!(!stack.push_system(Layer::boxed(1, &journal, false)));

        assert_eq!(stack.len(), 2);
        assert_eq!(take(&journal), vec!["attach:1", "attach:2"]);
    }

    #[test]
    fn test_pop_detaches() {
        let journal = Journal::default();
        let mut stack = SystemStack::new();
        stack.push_system(Layer::boxed(1, &journal, false));
        stack.push_system(Layer::boxed(2, &journal, false));
        take(&journal);

        let popped = stack.pop_system(1).unwrap();
        assert_eq!(popped.id(), 1);
        assert!(stack.pop_system(1).is_none());
        assert!(stack.get_system(1).is_none());
        assert!(stack.get_system(2).is_some());
        assert_eq!(take(&journal), vec!["detach:1"]);
    }

    #[test]
    fn test_update_front_to_back_render_back_to_front() {
        let journal = Journal::default();
        let mut stack = SystemStack::new();
        for id in 1..=3 {
            stack.push_system(Layer::boxed(id, &journal, false));
        }
        take(&journal);

        stack.update_all(0.016);
        stack.render_all();
        assert_eq!(
            take(&journal),
            vec!["update:1", "update:2", "update:3", "render:3", "render:2", "render:1"]
        );
    }

    #[test]
    fn test_offer_stops_at_consumer() {
        let journal = Journal::default();
        let mut stack = SystemStack::new();
        stack.push_system(Layer::boxed(1, &journal, false));
        stack.push_system(Layer::boxed(2, &journal, true));
        stack.push_system(Layer::boxed(3, &journal, false));
        take(&journal);

        let mut message = Message::new(MessageKind::GuiSelect);
        assert!(stack.offer(&mut message));
        assert_eq!(take(&journal), vec!["message:1", "message:2"]);
    }

    #[test]
    fn test_clear_and_drop_detach_back_to_front() {
        let journal = Journal::default();
        {
            let mut stack = SystemStack::new();
            stack.push_system(Layer::boxed(1, &journal, false));
            stack.push_system(Layer::boxed(2, &journal, false));
            take(&journal);
        }
        assert_eq!(take(&journal), vec!["detach:2", "detach:1"]);
    }

    #[test]
    fn test_iter_and_get_mut() {
        let journal = Journal::default();
        let mut stack = SystemStack::new();
        stack.push_system(Layer::boxed(7, &journal, false));
        stack.push_system(Layer::boxed(9, &journal, false));

        let ids: Vec<SystemId> = stack.iter().map(System::id).collect();
        assert_eq!(ids, vec![7, 9]);

        take(&journal);
        stack.get_system_mut(9).unwrap().update(1.0);
        assert_eq!(take(&journal), vec!["update:9"]);
    }
}
