use std::{any::Any, collections::HashMap};

/// Per-request bookkeeping threaded through incremental chunk→event
/// conversion (spec §3.2).
///
/// Created once by the dispatcher per request, passed by mutable reference
/// to the source normalizer (parsing upstream chunks) and the target
/// normalizer (rendering client-bound chunks), and discarded when the
/// request completes. `message_id`/`model` are seeded with the *client's*
/// values so the response carries the name the client asked for rather than
/// whatever the upstream mapped it to.
///
/// Each normalizer owns a private substate struct (accumulated text, the
/// next block index to allocate, a tool-call index map, started/stopped
/// flags per block...) stored here under its own format id so unrelated
/// normalizers never see each other's bookkeeping.
pub struct StreamState {
    pub message_id: String,
    pub model: String,
    substates: HashMap<&'static str, Box<dyn Any + Send>>,
}

impl StreamState {
    pub fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            model: model.into(),
            substates: HashMap::new(),
        }
    }

    /// Get this normalizer's substate, initializing it with `T::default()`
    /// on first access.
    pub fn substate<T>(&mut self, key: &'static str) -> &mut T
    where
        T: Default + Send + 'static,
    {
        self.substates
            .entry(key)
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("substate type mismatch for key")
    }
}
