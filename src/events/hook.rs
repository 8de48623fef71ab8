use std::sync::{Arc, Mutex};

type Listener<T> = Box<dyn Fn(&T) + Send + 'static>;

/// A synchronous multicast event hook.
///
/// Consumers register listeners with [`Event::subscribe`]; producers call
/// [`Event::emit`], which invokes every listener on the emitting thread, in
/// subscription order, before returning. Cloning an `Event` shares the
/// listener registry, so a clone handed to a producer reaches the same
/// subscribers as the original.
///
/// Listeners run on whichever thread emits, which for engine callbacks is the
/// engine's own execution context. Listeners that own collections or UI state
/// must marshal onto their own single-writer context themselves.
pub struct Event<T> {
    listeners: Arc<Mutex<Vec<Listener<T>>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a listener. Listeners are never unregistered; an `Event`
    /// lives as long as the component exposing it.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + 'static) {
        self.listeners.lock().unwrap().push(Box::new(listener));
    }

    /// Invokes every listener with `value`, synchronously.
    ///
    /// The registry lock is held for the duration of the dispatch, so
    /// listeners must not subscribe to the same event from inside a callback.
    pub fn emit(&self, value: &T) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}
