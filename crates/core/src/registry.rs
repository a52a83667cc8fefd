use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::ids::CorrelationId;

/// Abort capability for one in-flight request.
pub type AbortHandle = oneshot::Sender<()>;

/// Tracks in-flight requests so a later cancel can stop the right stream.
///
/// Every per-id operation takes the same lock, so a cancel and a terminal
/// emission for one id are serialized: whichever runs first wins.
#[derive(Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<CorrelationId, AbortHandle>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: CorrelationId, handle: AbortHandle) {
        let previous = self.entries.lock().insert(id, handle);
        if previous.is_some() {
            tracing::error!(correlation_id = %id, "abort handle registered twice for one request");
            debug_assert!(false, "abort handle registered twice for {id}");
        }
    }

    /// Signals the handle and removes it. Returns false when `id` was not live.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        let Some(handle) = self.entries.lock().remove(&id) else {
            tracing::debug!(correlation_id = %id, "cancel for unknown or finished request ignored");
            return false;
        };

        // The worker may already be gone; a dropped receiver is fine.
        let _ = handle.send(());
        tracing::debug!(correlation_id = %id, "request cancelled");
        true
    }

    /// Removes the entry without signalling.
    pub fn clear(&self, id: CorrelationId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    pub fn is_live(&self, id: CorrelationId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Runs `emit` only while `id` is still live, holding the registry lock.
    pub fn emit_if_live(&self, id: CorrelationId, emit: impl FnOnce()) -> bool {
        let entries = self.entries.lock();
        if !entries.contains_key(&id) {
            return false;
        }
        emit();
        true
    }

    /// Deregisters `id` and runs `emit` atomically. Returns false if a cancel got there first.
    pub fn finish(&self, id: CorrelationId, emit: impl FnOnce()) -> bool {
        let mut entries = self.entries.lock();
        if entries.remove(&id).is_none() {
            return false;
        }
        emit();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signals_handle_and_removes_entry() {
        let registry = CancellationRegistry::new();
        let id = CorrelationId::new_v4();
        let (handle, mut cancel_rx) = oneshot::channel();

        registry.register(id, handle);
        assert!(registry.is_live(id));

        assert!(registry.cancel(id));
        assert!(!registry.is_live(id));
        assert_eq!(cancel_rx.try_recv(), Ok(()));
    }

    #[test]
    fn cancel_of_unknown_id_is_a_noop() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel(CorrelationId::new_v4()));
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_removes_without_signalling() {
        let registry = CancellationRegistry::new();
        let id = CorrelationId::new_v4();
        let (handle, mut cancel_rx) = oneshot::channel();

        registry.register(id, handle);
        assert!(registry.clear(id));
        assert!(!registry.clear(id));
        // Sender dropped without a value.
        assert!(cancel_rx.try_recv().is_err());
    }

    #[test]
    fn cancel_after_finish_is_a_noop() {
        let registry = CancellationRegistry::new();
        let id = CorrelationId::new_v4();
        let (handle, _cancel_rx) = oneshot::channel();
        registry.register(id, handle);

        let mut delivered = 0;
        assert!(registry.finish(id, || delivered += 1));
        assert!(!registry.cancel(id));
        assert_eq!(delivered, 1);
    }

    #[test]
    fn terminal_after_cancel_is_suppressed() {
        let registry = CancellationRegistry::new();
        let id = CorrelationId::new_v4();
        let (handle, _cancel_rx) = oneshot::channel();
        registry.register(id, handle);

        assert!(registry.cancel(id));

        let mut delivered = 0;
        assert!(!registry.emit_if_live(id, || delivered += 1));
        assert!(!registry.finish(id, || delivered += 1));
        assert_eq!(delivered, 0);
    }

    #[test]
    fn ids_are_independent() {
        let registry = CancellationRegistry::new();
        let first = CorrelationId::new_v4();
        let second = CorrelationId::new_v4();
        let (first_handle, _first_rx) = oneshot::channel();
        let (second_handle, _second_rx) = oneshot::channel();
        registry.register(first, first_handle);
        registry.register(second, second_handle);

        assert!(registry.cancel(first));
        assert!(registry.is_live(second));
        assert_eq!(registry.len(), 1);
    }
}
